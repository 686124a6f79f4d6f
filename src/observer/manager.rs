//! Connectivity state manager.
//!
//! Holds the canonical `ConnectivityState`, enforces that `Deactivated` is
//! terminal, and publishes every accepted change through the coordinator.
//! Owned by the observer worker, so mutations never interleave.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink, ObserverMetrics};
use crate::error::ActivationError;
use crate::logging::events;
use crate::state::{ActivationCompletion, ActivationState, ConnectivityState};
use crate::stream::StreamCoordinator;

use super::config::PublishPolicy;

/// What `begin_activation` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationRequest {
    /// Moved to `Activating`; the session must now be asked to activate.
    Started,
    /// An earlier request is still pending.
    AlreadyActivating,
    /// Nothing to do.
    AlreadyActivated,
}

/// Outcome of one applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The snapshot was replaced and published.
    Published(ConnectivityState),
    /// Accepted, but nothing changed and the policy skips republishing.
    Unchanged,
    /// Dropped because the session is already deactivated.
    Rejected,
}

#[derive(Debug)]
pub struct ConnectivityStateManager {
    state: ConnectivityState,
    shared: Arc<RwLock<ConnectivityState>>,
    policy: PublishPolicy,
    diagnostics: Arc<dyn DiagnosticsSink>,
    metrics: Arc<ObserverMetrics>,
}

impl ConnectivityStateManager {
    pub fn new(policy: PublishPolicy, diagnostics: Arc<dyn DiagnosticsSink>, metrics: Arc<ObserverMetrics>) -> Self {
        let state = ConnectivityState::default();
        Self {
            state,
            shared: Arc::new(RwLock::new(state)),
            policy,
            diagnostics,
            metrics,
        }
    }

    /// Latest snapshot.
    #[must_use]
    pub const fn current_state(&self) -> ConnectivityState {
        self.state
    }

    /// Read handle that always holds a complete snapshot.
    pub(crate) fn shared_state(&self) -> Arc<RwLock<ConnectivityState>> {
        Arc::clone(&self.shared)
    }

    /// Moves `NotActivated` to `Activating` before the session is asked to
    /// activate. Rejected once `Deactivated`.
    pub fn begin_activation(&mut self, coordinator: &mut StreamCoordinator) -> Result<ActivationRequest, ActivationError> {
        let from = self.state.activation_state;
        match from {
            ActivationState::Deactivated => {
                self.reject("activate");
                Err(ActivationError::InvalidTransition {
                    from,
                    attempted: ActivationState::Activating,
                })
            }
            ActivationState::NotActivated => {
                debug!(event = events::ACTIVATION_REQUESTED, component = "state_manager");
                self.commit(self.state.with_activation(ActivationState::Activating), coordinator, Publish::State);
                Ok(ActivationRequest::Started)
            }
            ActivationState::Activating => Ok(ActivationRequest::AlreadyActivating),
            ActivationState::Activated => Ok(ActivationRequest::AlreadyActivated),
        }
    }

    /// Applies an activation result from the session.
    ///
    /// Success replaces the activation state and publishes it. Failure leaves
    /// the state alone, except that a pending `Activating` falls back to
    /// `NotActivated`. Either way exactly one completion is published, and a
    /// result arriving after `Deactivated` completes with `InvalidTransition`.
    pub fn apply_activation(
        &mut self,
        result: Result<ActivationState, ActivationError>,
        coordinator: &mut StreamCoordinator,
    ) -> Transition {
        let from = self.state.activation_state;
        if from.is_terminal() {
            let attempted = result.as_ref().map_or(ActivationState::Activating, |s| *s);
            self.reject("activation");
            self.complete(Err(ActivationError::InvalidTransition { from, attempted }), coordinator);
            return Transition::Rejected;
        }

        match result {
            Ok(activation_state) => {
                let transition = self.commit(self.state.with_activation(activation_state), coordinator, Publish::State);
                self.complete(Ok(self.state), coordinator);
                transition
            }
            Err(err) => {
                let transition = if from == ActivationState::Activating {
                    self.commit(
                        self.state.with_activation(ActivationState::NotActivated),
                        coordinator,
                        Publish::State,
                    )
                } else {
                    self.metrics.event_applied();
                    Transition::Unchanged
                };
                self.complete(Err(err), coordinator);
                transition
            }
        }
    }

    pub fn apply_reachability(&mut self, reachable: bool, coordinator: &mut StreamCoordinator) -> Transition {
        if self.state.is_terminal() {
            self.reject("reachability");
            return Transition::Rejected;
        }
        self.commit(self.state.with_reachability(reachable), coordinator, Publish::Reachability)
    }

    pub fn apply_pairing(&mut self, paired: bool, installed: bool, coordinator: &mut StreamCoordinator) -> Transition {
        if self.state.is_terminal() {
            self.reject("pairing");
            return Transition::Rejected;
        }
        self.commit(self.state.with_pairing(paired, installed), coordinator, Publish::State)
    }

    fn commit(&mut self, next: ConnectivityState, coordinator: &mut StreamCoordinator, publish: Publish) -> Transition {
        self.metrics.event_applied();
        let changed = next != self.state;
        if changed {
            self.state = next;
            *self.shared.write().unwrap_or_else(PoisonError::into_inner) = next;
        }

        if !changed && self.policy == PublishPolicy::OnChange {
            debug!(event = events::STATE_UNCHANGED, component = "state_manager");
            return Transition::Unchanged;
        }

        let delivered = match publish {
            Publish::State => coordinator.publish_state(next),
            Publish::Reachability => coordinator.publish_reachability(next.is_reachable),
        };
        debug!(
            event = events::STATE_APPLIED,
            component = "state_manager",
            activation = %next.activation_state,
            reachable = next.is_reachable,
            paired = next.is_paired,
            installed = next.is_installed,
            delivered,
        );
        Transition::Published(next)
    }

    fn complete(&self, completion: ActivationCompletion, coordinator: &mut StreamCoordinator) {
        let delivered = coordinator.publish_completion(&completion);
        debug!(
            event = events::ACTIVATION_COMPLETED,
            component = "state_manager",
            ok = completion.is_ok(),
            delivered,
        );
    }

    fn reject(&self, event: &str) {
        self.metrics.transition_rejected();
        self.diagnostics.report(&Diagnostic::new(DiagnosticKind::TransitionRejected {
            event: event.to_string(),
            state: self.state.activation_state,
        }));
    }
}

#[derive(Debug, Clone, Copy)]
enum Publish {
    State,
    Reachability,
}
