//! Event ingestion pipeline
//!
//! HTTP producer surface that publishes typed domain events to per-kind topics,
//! and the per-topic consumer loops that read them back.

pub mod model;
pub mod publisher;
pub mod handlers;
pub mod consumer;
pub mod memory;

pub use model::{decode_event, DomainEvent, MovieEvent, PaymentEvent, Topic, UserEvent};
pub use publisher::{publish_event, EventPublisher, PublishError};
pub use handlers::{build_router, AppError, AppState};
pub use consumer::{
    run_consumer, supervise, ConsumeError, ConsumerExit, MessageSource, ReceivedMessage,
};
pub use memory::{InMemoryBroker, MemorySource};
