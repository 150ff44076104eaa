//! Permission gate for the two capabilities a dispatch needs.
//!
//! Permission absence is an expected outcome: the gate never fails, it
//! only reports a `PermissionState` whose `ready()` may be false.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::{Capability, Grant, PermissionState};

/// Text shown by the OS alongside a permission prompt.
/// Passed through to the platform unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rationale {
    pub title: String,
    pub message: String,
    pub button_neutral: String,
    pub button_negative: String,
    pub button_positive: String,
}

impl Rationale {
    fn with_text(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            button_neutral: "Ask Me Later".to_string(),
            button_negative: "Cancel".to_string(),
            button_positive: "OK".to_string(),
        }
    }
}

/// Prompt configuration for both capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRationales {
    pub location: Rationale,
    pub sms: Rationale,
}

impl PermissionRationales {
    pub fn for_capability(&self, capability: Capability) -> &Rationale {
        match capability {
            Capability::Location => &self.location,
            Capability::Sms => &self.sms,
        }
    }
}

impl Default for PermissionRationales {
    fn default() -> Self {
        Self {
            location: Rationale::with_text(
                "Location Permission",
                "Please allow location access to use the app.",
            ),
            sms: Rationale::with_text(
                "SMS Permission",
                "App needs SMS permission to send messages.",
            ),
        }
    }
}

/// OS-level permission prompt surface.
///
/// An `Err` means the platform could not show the prompt at all; the gate
/// records that capability as `Unknown`.
#[async_trait]
pub trait PermissionPlatform: Send + Sync {
    async fn request(&self, capability: Capability, rationale: &Rationale) -> Result<Grant, String>;
}

pub struct PermissionGate {
    platform: Box<dyn PermissionPlatform>,
    rationales: PermissionRationales,
    state: Mutex<PermissionState>,
    /// Held across the prompt loop so prompts never overlap
    prompting: tokio::sync::Mutex<()>,
}

impl PermissionGate {
    pub fn new(platform: Box<dyn PermissionPlatform>, rationales: PermissionRationales) -> Self {
        Self {
            platform,
            rationales,
            state: Mutex::new(PermissionState::default()),
            prompting: tokio::sync::Mutex::new(()),
        }
    }

    /// Last known state, without prompting
    pub fn cached(&self) -> PermissionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prompt for every capability that is not yet granted and wait for all
    /// outcomes. Already granted capabilities are not prompted again.
    /// Concurrent callers wait for the running prompt loop and reuse its result.
    pub async fn request_all(&self) -> PermissionState {
        let _prompting = self.prompting.lock().await;
        for capability in Capability::all() {
            if self.cached().get(*capability).is_granted() {
                continue;
            }

            let rationale = self.rationales.for_capability(*capability);
            let grant = match self.platform.request(*capability, rationale).await {
                Ok(grant) => grant,
                Err(e) => {
                    log::warn!("Permission prompt for {:?} failed: {}", capability, e);
                    Grant::Unknown
                }
            };

            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(*capability, grant);
        }

        let state = self.cached();
        if state.ready() {
            log::info!("Permissions granted");
        } else {
            log::info!(
                "Permissions not ready (location: {:?}, sms: {:?})",
                state.location,
                state.sms
            );
        }
        state
    }

    /// Re-check before a trigger: prompts only when the cached state is not ready.
    pub async fn ensure_ready(&self) -> PermissionState {
        let cached = self.cached();
        if cached.ready() {
            return cached;
        }
        self.request_all().await
    }
}
