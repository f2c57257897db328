//! Strangler fig gateway
//!
//! Classifies inbound requests by path prefix and forwards them to the
//! monolith, the movies service or the events service.

pub mod router;
pub mod proxy;
pub mod server;

pub use router::{MigrationRoll, Origin, PathRouter, RoutingDecision, SeededRoll, SequenceRoll};
pub use proxy::{ProxyError, Upstreams};
pub use server::{build_router, GatewayState, HEALTH_BODY};
