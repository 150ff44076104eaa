//! Dispatch state machine.
//!
//! `process_event` is the single source of truth for phase transitions.
//! The controller feeds it events; presentation only reads snapshots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::location::{LocationError, LocationErrorCode};
use super::sms::SendError;

/// Why an attempt ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum FailureReason {
    #[error("location and SMS permissions are required")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    LocationUnavailable(LocationError),
    #[error("no signed-in user email")]
    IdentityUnavailable,
    #[error("emergency contact number is not configured")]
    MisconfiguredDestination,
    #[error("delivery failed: {0}")]
    DeliveryFailed(SendError),
}

impl FailureReason {
    /// Whether pressing the control again can succeed without a config change
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MisconfiguredDestination)
    }

    /// Message shown to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Location and SMS permissions are required to send an SOS.",
            Self::LocationUnavailable(_) => "Could not get your location. Press SOS to try again.",
            Self::IdentityUnavailable => "Unable to retrieve user email. Please sign in again.",
            Self::MisconfiguredDestination => "Emergency contact number is not configured.",
            Self::DeliveryFailed(_) => "Failed to send the SOS message. Press SOS to try again.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "phase", content = "reason")]
pub enum DispatchPhase {
    #[default]
    Idle,
    CheckingPermission,
    Locating,
    Sending,
    Succeeded,
    Failed(FailureReason),
}

impl DispatchPhase {
    /// A new trigger is accepted only from rest states
    pub fn accepts_trigger(&self) -> bool {
        matches!(self, Self::Idle | Self::Succeeded | Self::Failed(_))
    }

    /// An attempt owns the state until it reaches a rest state
    pub fn is_in_flight(&self) -> bool {
        !self.accepts_trigger()
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Trigger,
    /// Destination was missing when the controller was built
    Misconfigured,
    PermissionResolved { ready: bool },
    FixAcquired,
    LocationFailed(LocationError),
    IdentityMissing,
    Delivered,
    SendFailed(SendError),
    /// The attempt was dropped before it reached a rest state
    Abandoned,
}

/// Compute the next phase. Events that do not apply to the current phase
/// leave it unchanged.
pub fn process_event(current: DispatchPhase, event: DispatchEvent) -> DispatchPhase {
    use DispatchEvent as E;
    use DispatchPhase as P;

    match (current, event) {
        (state, E::Trigger) if state.accepts_trigger() => P::CheckingPermission,
        (state, E::Misconfigured) if state.accepts_trigger() => {
            P::Failed(FailureReason::MisconfiguredDestination)
        }

        (P::CheckingPermission, E::PermissionResolved { ready: true }) => P::Locating,
        (P::CheckingPermission, E::PermissionResolved { ready: false }) => {
            P::Failed(FailureReason::PermissionDenied)
        }

        // Encoding is synchronous, so a fix moves straight on to sending
        (P::Locating, E::FixAcquired) => P::Sending,
        (P::Locating, E::LocationFailed(err)) => P::Failed(FailureReason::LocationUnavailable(err)),
        (P::Locating, E::IdentityMissing) => P::Failed(FailureReason::IdentityUnavailable),

        (P::Sending, E::Delivered) => P::Succeeded,
        (P::Sending, E::SendFailed(err)) => P::Failed(FailureReason::DeliveryFailed(err)),

        (P::CheckingPermission, E::Abandoned) => P::Failed(FailureReason::PermissionDenied),
        (P::Locating, E::Abandoned) => P::Failed(FailureReason::LocationUnavailable(
            LocationError::new(LocationErrorCode::Cancelled, "attempt abandoned"),
        )),
        // The message may or may not have left the device
        (P::Sending, E::Abandoned) => P::Failed(FailureReason::DeliveryFailed(SendError::new(
            "attempt abandoned before delivery was confirmed",
        ))),

        (state, _) => state,
    }
}

/// Read-only state handed to presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DispatchSnapshot {
    /// Incremented on every accepted trigger; 0 before the first one
    pub attempt: u64,
    pub phase: DispatchPhase,
}

/// What the SOS screen renders for a given snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    pub button_label: &'static str,
    pub button_enabled: bool,
    pub status: Option<&'static str>,
}

impl From<&DispatchSnapshot> for ViewModel {
    fn from(snapshot: &DispatchSnapshot) -> Self {
        let (button_label, status) = match &snapshot.phase {
            DispatchPhase::Idle => ("SOS", None),
            DispatchPhase::CheckingPermission => ("SOS", Some("Checking permissions...")),
            DispatchPhase::Locating => ("SOS", Some("Getting your location...")),
            DispatchPhase::Sending => ("Sending…", Some("Sending SOS message...")),
            DispatchPhase::Succeeded => ("SOS", Some("SOS message sent.")),
            DispatchPhase::Failed(reason) => ("SOS", Some(reason.user_message())),
        };

        let button_enabled = match &snapshot.phase {
            DispatchPhase::Failed(reason) => reason.is_retryable(),
            phase => phase.accepts_trigger(),
        };

        Self {
            button_label,
            button_enabled,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_phase_is_idle() {
        assert_eq!(DispatchPhase::default(), DispatchPhase::Idle);
    }

    #[test]
    fn test_happy_path() {
        let mut phase = DispatchPhase::Idle;
        for event in [
            DispatchEvent::Trigger,
            DispatchEvent::PermissionResolved { ready: true },
            DispatchEvent::FixAcquired,
            DispatchEvent::Delivered,
        ] {
            phase = process_event(phase, event);
        }
        assert_eq!(phase, DispatchPhase::Succeeded);
    }

    #[test]
    fn test_trigger_ignored_while_in_flight() {
        for phase in [
            DispatchPhase::CheckingPermission,
            DispatchPhase::Locating,
            DispatchPhase::Sending,
        ] {
            assert_eq!(process_event(phase.clone(), DispatchEvent::Trigger), phase);
        }
    }

    #[test]
    fn test_terminal_states_accept_trigger() {
        let failed = DispatchPhase::Failed(FailureReason::PermissionDenied);
        assert_eq!(
            process_event(failed, DispatchEvent::Trigger),
            DispatchPhase::CheckingPermission
        );
        assert_eq!(
            process_event(DispatchPhase::Succeeded, DispatchEvent::Trigger),
            DispatchPhase::CheckingPermission
        );
    }

    #[test]
    fn test_failures_map_to_reasons() {
        assert_eq!(
            process_event(
                DispatchPhase::CheckingPermission,
                DispatchEvent::PermissionResolved { ready: false }
            ),
            DispatchPhase::Failed(FailureReason::PermissionDenied)
        );

        let err = LocationError::new(LocationErrorCode::Timeout, "too slow");
        assert_eq!(
            process_event(DispatchPhase::Locating, DispatchEvent::LocationFailed(err.clone())),
            DispatchPhase::Failed(FailureReason::LocationUnavailable(err))
        );

        let err = SendError::new("no signal");
        assert_eq!(
            process_event(DispatchPhase::Sending, DispatchEvent::SendFailed(err.clone())),
            DispatchPhase::Failed(FailureReason::DeliveryFailed(err))
        );
    }

    #[test]
    fn test_out_of_order_events_ignored() {
        assert_eq!(
            process_event(DispatchPhase::Idle, DispatchEvent::Delivered),
            DispatchPhase::Idle
        );
        assert_eq!(
            process_event(DispatchPhase::Sending, DispatchEvent::FixAcquired),
            DispatchPhase::Sending
        );
    }

    #[test]
    fn test_abandoned_attempt_comes_to_rest() {
        for phase in [
            DispatchPhase::CheckingPermission,
            DispatchPhase::Locating,
            DispatchPhase::Sending,
        ] {
            let next = process_event(phase, DispatchEvent::Abandoned);
            assert!(!next.is_in_flight(), "{:?} still in flight", next);
            assert!(matches!(next, DispatchPhase::Failed(ref reason) if reason.is_retryable()));
        }

        let cancelled = process_event(DispatchPhase::Locating, DispatchEvent::Abandoned);
        let DispatchPhase::Failed(FailureReason::LocationUnavailable(err)) = &cancelled else {
            panic!("expected location failure, got {:?}", cancelled);
        };
        assert_eq!(err.code, LocationErrorCode::Cancelled);

        // Rest states are left alone
        assert_eq!(
            process_event(DispatchPhase::Succeeded, DispatchEvent::Abandoned),
            DispatchPhase::Succeeded
        );
    }

    #[test]
    fn test_view_model() {
        let in_flight = DispatchSnapshot {
            attempt: 1,
            phase: DispatchPhase::Locating,
        };
        assert!(!ViewModel::from(&in_flight).button_enabled);

        let misconfigured = DispatchSnapshot {
            attempt: 1,
            phase: DispatchPhase::Failed(FailureReason::MisconfiguredDestination),
        };
        let view = ViewModel::from(&misconfigured);
        assert!(!view.button_enabled);
        assert_eq!(view.status, Some("Emergency contact number is not configured."));

        let sending = ViewModel::from(&DispatchSnapshot {
            attempt: 1,
            phase: DispatchPhase::Sending,
        });
        assert_eq!(sending.button_label, "Sending…");
        assert!(!sending.button_enabled);

        let idle = ViewModel::from(&DispatchSnapshot::default());
        assert!(idle.button_enabled);
        assert_eq!(idle.button_label, "SOS");
    }

    #[test]
    fn test_snapshot_serializes_for_webview() {
        let snapshot = DispatchSnapshot {
            attempt: 2,
            phase: DispatchPhase::Failed(FailureReason::PermissionDenied),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["phase"]["phase"], "Failed");
        assert_eq!(json["phase"]["reason"]["kind"], "PermissionDenied");
    }
}
