//! NATS JetStream integration module
//!
//! Broker binding for the event pipeline: acknowledged publishing and durable
//! per-topic consumers

pub mod client;

pub use client::{durable_name, NatsClient, NatsSource};
