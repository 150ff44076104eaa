//! Single-shot position fix with a bounded wait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::PositionFix;

/// Default time the platform gets to produce a fix
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Extra wait on top of the transport timeout before fetch gives up on its own
const BACKSTOP_GRACE: Duration = Duration::from_secs(2);

/// Platform location error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationErrorCode {
    Cancelled,
    Unavailable,
    Timeout,
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct LocationError {
    pub code: LocationErrorCode,
    pub message: String,
}

impl LocationError {
    pub fn new(code: LocationErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Request handed to the platform location service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
}

/// Platform location service. Implementations are expected to honour
/// `request.timeout_ms` and report `LocationErrorCode::Timeout` themselves.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_position(&self, request: LocationRequest) -> Result<PositionFix, LocationError>;
}

pub struct LocationProbe {
    source: Box<dyn LocationSource>,
}

impl LocationProbe {
    pub fn new(source: Box<dyn LocationSource>) -> Self {
        Self { source }
    }

    /// Request exactly one highest-accuracy fix. No polling, no fallback.
    pub async fn fetch(&self, timeout_ms: u64) -> Result<PositionFix, LocationError> {
        let request = LocationRequest {
            enable_high_accuracy: true,
            timeout_ms,
        };
        let backstop = Duration::from_millis(timeout_ms) + BACKSTOP_GRACE;

        let fix = match tokio::time::timeout(backstop, self.source.current_position(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LocationError::new(
                    LocationErrorCode::Timeout,
                    format!("Location request timed out after {timeout_ms} ms"),
                ))
            }
        };

        if !fix.is_valid() {
            return Err(LocationError::new(
                LocationErrorCode::Unavailable,
                format!("Platform returned an invalid fix ({}, {})", fix.latitude, fix.longitude),
            ));
        }

        let captured = fix
            .captured_at()
            .map_or_else(|| fix.captured_at_epoch_ms.to_string(), |at| at.to_rfc3339());
        log::info!("Position fix acquired at {}", captured);
        Ok(fix)
    }
}
