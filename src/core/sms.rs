//! Outbound SMS dispatch. One send per call; no retry, no queue.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{mask_number, DeliveryReceipt};

/// Bodies beyond this are split into multipart messages by the carrier
const SINGLE_SEGMENT_CHARS: usize = 160;

/// What the platform SMS API reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub success: bool,
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("SMS send failed: {reason}")]
pub struct SendError {
    pub reason: String,
}

impl SendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// `Err` is a transport-level failure (e.g. the native module threw)
    async fn send(&self, number: &str, body: &str) -> Result<TransportResponse, String>;
}

pub struct SmsDispatcher {
    transport: Box<dyn SmsTransport>,
}

impl SmsDispatcher {
    pub fn new(transport: Box<dyn SmsTransport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, destination: &str, body: &str) -> Result<DeliveryReceipt, SendError> {
        let chars = body.chars().count();
        if chars > SINGLE_SEGMENT_CHARS {
            log::warn!("Alert body is {} chars and will be sent as multipart SMS", chars);
        }

        let response = self.transport.send(destination, body).await.map_err(|e| {
            log::error!("Failed to send SMS to {}: {}", mask_number(destination), e);
            SendError::new(e)
        })?;

        if !response.success {
            log::error!("SMS transport rejected message to {}", mask_number(destination));
            let reason = response
                .raw
                .as_ref()
                .map_or_else(|| "transport reported failure".to_string(), ToString::to_string);
            return Err(SendError::new(reason));
        }

        log::info!("Message sent to {}", mask_number(destination));
        Ok(DeliveryReceipt {
            destination: destination.to_string(),
            sent_at: Utc::now(),
            raw: response.raw,
        })
    }
}
