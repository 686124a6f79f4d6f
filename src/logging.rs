//! Logging configuration using tracing.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding application. [`init`] is a convenience for binaries and
//! tests that just want readable output on stderr.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{PeerError, PeerResult};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "PEERLINK_LOG";

const DEFAULT_FILTER: &str = "peerlink=info,warn";

/// Installs a global fmt subscriber filtered by `PEERLINK_LOG`.
///
/// # Examples
/// ```bash
/// PEERLINK_LOG=peerlink=debug cargo test
/// ```
pub fn init() -> PeerResult<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()
        .map_err(|e| PeerError::internal(format!("failed to install tracing subscriber: {e}")))
}

/// Canonical structured event names.
pub mod events {
    // Registry lifecycle.
    pub const SUBSCRIBER_REGISTERED: &str = "subscriber_registered";
    pub const SUBSCRIBER_REMOVED: &str = "subscriber_removed";
    pub const SUBSCRIBER_REMOVED_TWICE: &str = "subscriber_removed_twice";
    pub const SUBSCRIBER_PRUNED: &str = "subscriber_pruned";
    pub const REGISTRY_CLOSED: &str = "registry_closed";
    pub const PROGRAMMING_ERROR: &str = "programming_error";

    // State manager.
    pub const STATE_APPLIED: &str = "state_applied";
    pub const STATE_UNCHANGED: &str = "state_unchanged";
    pub const TRANSITION_REJECTED: &str = "transition_rejected";
    pub const ACTIVATION_COMPLETED: &str = "activation_completed";
    pub const ACTIVATION_REQUESTED: &str = "activation_requested";

    // Messaging.
    pub const MESSAGE_RECEIVED: &str = "message_received";
    pub const MESSAGE_DECODE_FAILED: &str = "message_decode_failed";
    pub const MESSAGE_TYPE_MISMATCH: &str = "message_type_mismatch";
    pub const CODEC_HINT_CONFLICT: &str = "codec_hint_conflict";
    pub const SEND_ROUTED: &str = "send_routed";
    pub const SEND_OK: &str = "send_ok";
    pub const SEND_FAILED: &str = "send_failed";

    // Worker.
    pub const WORKER_START: &str = "worker_start";
    pub const WORKER_STOP: &str = "worker_stop";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_reports_error_instead_of_panicking() {
        // Another test in this binary may have installed one already.
        let _ = init();
        assert!(init().is_err());
    }
}
