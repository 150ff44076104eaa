//! Alert dispatch controller.
//!
//! Sequences permission check, location fix, encoding and SMS send for one
//! user trigger at a time. The current `DispatchSnapshot` lives in a watch
//! channel owned by the controller; presentation only gets receivers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::config::Settings;
use super::encoder::AlertEncoder;
use super::identity::IdentityProvider;
use super::location::{LocationProbe, LocationSource};
use super::model::{AlertPayload, DeliveryReceipt, Identity, PermissionState};
use super::permissions::{PermissionGate, PermissionPlatform};
use super::sms::{SmsDispatcher, SmsTransport};
use super::state::{process_event, DispatchEvent, DispatchPhase, DispatchSnapshot, FailureReason};

/// Result of one press of the SOS control
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Another attempt was in flight; nothing happened
    Ignored,
    Completed(Result<DeliveryReceipt, FailureReason>),
}

pub struct AlertController {
    gate: PermissionGate,
    probe: LocationProbe,
    encoder: AlertEncoder,
    dispatcher: SmsDispatcher,
    identity: Arc<dyn IdentityProvider>,
    /// Read once at construction
    destination: Option<String>,
    location_timeout_ms: u64,
    session_primed: AtomicBool,
    state: watch::Sender<DispatchSnapshot>,
}

impl AlertController {
    pub fn new(
        settings: &Settings,
        platform: Box<dyn PermissionPlatform>,
        source: Box<dyn LocationSource>,
        transport: Box<dyn SmsTransport>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let destination = settings.destination();
        if destination.is_none() {
            log::error!("Emergency phone number is not configured");
        }

        let (state, _) = watch::channel(DispatchSnapshot::default());
        Self {
            gate: PermissionGate::new(platform, settings.permission_rationales.clone()),
            probe: LocationProbe::new(source),
            encoder: AlertEncoder::new(settings.message_tag.clone(), settings.encoding),
            dispatcher: SmsDispatcher::new(transport),
            identity,
            destination,
            location_timeout_ms: settings.location_timeout_ms,
            session_primed: AtomicBool::new(false),
            state,
        }
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchSnapshot> {
        self.state.subscribe()
    }

    pub fn permissions(&self) -> PermissionState {
        self.gate.cached()
    }

    /// Automatic permission request, once per app session
    pub async fn enter_dispatch_screen(&self) -> PermissionState {
        if self.session_primed.swap(true, Ordering::SeqCst) {
            return self.gate.cached();
        }
        self.gate.request_all().await
    }

    /// Run one dispatch attempt from scratch.
    pub async fn trigger(&self) -> TriggerOutcome {
        let Some(attempt) = self.begin_attempt() else {
            log::debug!("SOS trigger ignored, attempt already in flight");
            return TriggerOutcome::Ignored;
        };

        // Dropping this future mid-attempt must not leave the phase in flight
        let _guard = AttemptGuard {
            controller: self,
            attempt,
        };
        let result = self.run_attempt().await;
        match &result {
            Ok(_) => log::info!("Attempt {} delivered", attempt),
            Err(reason) => log::warn!("Attempt {} failed: {}", attempt, reason),
        }
        TriggerOutcome::Completed(result)
    }

    /// Atomically claim the live attempt slot. Returns the new attempt number,
    /// or None while another attempt is in flight.
    fn begin_attempt(&self) -> Option<u64> {
        let event = if self.destination.is_some() {
            DispatchEvent::Trigger
        } else {
            DispatchEvent::Misconfigured
        };

        let mut claimed = None;
        self.state.send_if_modified(|snapshot| {
            if !snapshot.phase.accepts_trigger() {
                return false;
            }
            snapshot.attempt += 1;
            let previous = std::mem::take(&mut snapshot.phase);
            snapshot.phase = process_event(previous, event.clone());
            claimed = Some(snapshot.attempt);
            true
        });

        if let Some(attempt) = claimed {
            log::info!("Attempt {} started: {:?}", attempt, self.state.borrow().phase);
        }
        claimed
    }

    fn apply(&self, event: DispatchEvent) {
        self.state.send_modify(|snapshot| {
            let previous = std::mem::take(&mut snapshot.phase);
            snapshot.phase = process_event(previous, event);
            log::info!("Attempt {}: {:?}", snapshot.attempt, snapshot.phase);
        });
    }

    async fn run_attempt(&self) -> Result<DeliveryReceipt, FailureReason> {
        let Some(destination) = self.destination.as_deref() else {
            return Err(FailureReason::MisconfiguredDestination);
        };

        let permissions = self.gate.ensure_ready().await;
        self.apply(DispatchEvent::PermissionResolved {
            ready: permissions.ready(),
        });
        if !permissions.ready() {
            return Err(FailureReason::PermissionDenied);
        }

        let fix = match self.probe.fetch(self.location_timeout_ms).await {
            Ok(fix) => fix,
            Err(e) => {
                log::warn!("Location request failed: {}", e);
                self.apply(DispatchEvent::LocationFailed(e.clone()));
                return Err(FailureReason::LocationUnavailable(e));
            }
        };

        let Some(identity) = self.identity.current_user().filter(Identity::has_email) else {
            log::error!("Email unavailable, SOS not encoded");
            self.apply(DispatchEvent::IdentityMissing);
            return Err(FailureReason::IdentityUnavailable);
        };

        let payload = AlertPayload {
            encoded_body: self.encoder.encode(&identity, &fix),
            identity,
            fix,
        };
        log::info!(
            "Encoded {:?} alert for {}",
            self.encoder.mode(),
            payload.identity.masked_email()
        );
        self.apply(DispatchEvent::FixAcquired);

        match self.dispatcher.send(destination, &payload.encoded_body).await {
            Ok(receipt) => {
                self.apply(DispatchEvent::Delivered);
                Ok(receipt)
            }
            Err(e) => {
                self.apply(DispatchEvent::SendFailed(e.clone()));
                Err(FailureReason::DeliveryFailed(e))
            }
        }
    }
}

/// Brings an attempt to rest if its future is dropped before it finished.
struct AttemptGuard<'a> {
    controller: &'a AlertController,
    attempt: u64,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let attempt = self.attempt;
        self.controller.state.send_if_modified(|snapshot| {
            if snapshot.attempt != attempt || !snapshot.phase.is_in_flight() {
                return false;
            }
            let previous = std::mem::take(&mut snapshot.phase);
            snapshot.phase = process_event(previous, DispatchEvent::Abandoned);
            log::warn!("Attempt {} abandoned: {:?}", attempt, snapshot.phase);
            true
        });
    }
}
