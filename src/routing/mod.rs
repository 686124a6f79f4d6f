//! Message routing in both directions.
//!
//! Outbound messages go through the `MessageRouter` and its `RoutingPolicy`;
//! inbound messages go through the `MessageDistributor`.

/// Inbound fan-out.
pub mod distributor;
/// Outbound policy and dispatch.
pub mod router;

pub use distributor::{Delivery, MessageDistributor};
pub use router::{DefaultPolicy, MessageRouter, RoutingPolicy};
