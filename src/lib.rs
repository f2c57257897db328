//! # Strangler: incremental monolith migration
//!
//! Two independently deployable services built from this crate:
//!
//! - **Gateway** (`strangler-proxy`): classifies every inbound request by path
//!   prefix and forwards it unmodified to the monolith, the movies service or
//!   the events service. Movies traffic can be shifted to the new service by a
//!   configurable percentage, decided per request.
//! - **Events service** (`events-service`): accepts movie, user and payment
//!   events over HTTP, publishes each to its own NATS JetStream topic, and runs
//!   one consumer loop per topic that logs what it reads.
//!
//! ## Example: routing decisions
//!
//! ```
//! use strangler::config::MigrationConfig;
//! use strangler::gateway::{Origin, PathRouter, SequenceRoll};
//!
//! let router = PathRouter::new(
//!     MigrationConfig::new(true, 100),
//!     Box::new(SequenceRoll::full_cycle()),
//! );
//! assert_eq!(router.route("/api/movies/7").origin, Origin::MoviesService);
//! assert_eq!(router.route("/api/events/movie").origin, Origin::EventsService);
//! assert_eq!(router.route("/api/users").origin, Origin::Monolith);
//! ```

pub mod config;
pub mod observability;

// Strangler fig gateway
pub mod gateway;

// Event ingestion pipeline
pub mod events;

// NATS JetStream integration
pub mod nats;

// Re-export key types
pub use config::{ConfigError, EventsConfig, GatewayConfig, MigrationConfig, RestartPolicy};
pub use gateway::{GatewayState, Origin, PathRouter, RoutingDecision, Upstreams};
pub use events::{EventPublisher, InMemoryBroker, MovieEvent, PaymentEvent, Topic, UserEvent};
pub use nats::NatsClient;
