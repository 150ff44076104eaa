//! Device capabilities served by the webview.
//!
//! Each call is emitted as a `device-request` event carrying an id. The
//! webview runs the native call and answers through the `device_response`
//! command; the awaiting future is woken through a oneshot channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rakshak::core::location::{LocationError, LocationErrorCode, LocationRequest, LocationSource};
use rakshak::core::model::{Capability, Grant, PositionFix};
use rakshak::core::permissions::{PermissionPlatform, Rationale};
use rakshak::core::sms::{SmsTransport, TransportResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tauri::{AppHandle, Emitter};
use tokio::sync::oneshot;

type Reply = Result<Value, String>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeviceCall {
    Permission {
        capability: Capability,
        rationale: Rationale,
    },
    Location {
        request: LocationRequest,
    },
    Sms {
        number: String,
        body: String,
    },
}

#[derive(Debug, Clone, Serialize)]
struct DeviceRequestEvent {
    id: u64,
    call: DeviceCall,
}

/// What the webview sends back for a location call
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocationReply {
    Fix(PositionFix),
    Failed(LocationError),
}

/// Calls waiting for a webview answer, keyed by request id
#[derive(Default)]
struct PendingCalls {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
}

impl PendingCalls {
    fn register(&self) -> PendingCall<'_> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        PendingCall { owner: self, id, rx }
    }

    fn resolve(&self, id: u64, reply: Reply) -> bool {
        let sender = self
            .waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                log::warn!("Device response for unknown request {}", id);
                false
            }
        }
    }

    fn forget(&self, id: u64) {
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// One registered call. Dropping it unregisters the id, so an abandoned
/// request leaves nothing behind.
struct PendingCall<'a> {
    owner: &'a PendingCalls,
    id: u64,
    rx: oneshot::Receiver<Reply>,
}

impl PendingCall<'_> {
    async fn answer(&mut self) -> Reply {
        let id = self.id;
        (&mut self.rx)
            .await
            .map_err(|_| format!("device request {id} was dropped"))?
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.owner.forget(self.id);
    }
}

pub struct DeviceBridge {
    app: AppHandle,
    pending: PendingCalls,
}

impl DeviceBridge {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            pending: PendingCalls::default(),
        }
    }

    /// Complete a pending call. Returns false for unknown or already answered ids.
    pub fn resolve(&self, id: u64, reply: Reply) -> bool {
        self.pending.resolve(id, reply)
    }

    async fn call<T: DeserializeOwned>(&self, call: DeviceCall) -> Result<T, String> {
        let mut pending = self.pending.register();
        let id = pending.id;

        self.app
            .emit("device-request", DeviceRequestEvent { id, call })
            .map_err(|e| e.to_string())?;

        let value = pending.answer().await?;
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// Shared handle the controller owns one of per capability
pub struct BridgePort(pub Arc<DeviceBridge>);

#[async_trait]
impl PermissionPlatform for BridgePort {
    async fn request(&self, capability: Capability, rationale: &Rationale) -> Result<Grant, String> {
        let result: String = self
            .0
            .call(DeviceCall::Permission {
                capability,
                rationale: rationale.clone(),
            })
            .await?;
        Ok(parse_grant(&result))
    }
}

#[async_trait]
impl LocationSource for BridgePort {
    async fn current_position(&self, request: LocationRequest) -> Result<PositionFix, LocationError> {
        let reply = self
            .0
            .call::<LocationReply>(DeviceCall::Location { request })
            .await
            .map_err(|e| LocationError::new(LocationErrorCode::Unavailable, e))?;
        match reply {
            LocationReply::Fix(fix) => Ok(fix),
            LocationReply::Failed(err) => Err(err),
        }
    }
}

#[async_trait]
impl SmsTransport for BridgePort {
    async fn send(&self, number: &str, body: &str) -> Result<TransportResponse, String> {
        self.0
            .call(DeviceCall::Sms {
                number: number.to_string(),
                body: body.to_string(),
            })
            .await
    }
}

/// Map the platform's permission result strings
fn parse_grant(result: &str) -> Grant {
    match result.to_ascii_lowercase().as_str() {
        "granted" => Grant::Granted,
        "denied" | "never_ask_again" => Grant::Denied,
        _ => Grant::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grant() {
        assert_eq!(parse_grant("granted"), Grant::Granted);
        assert_eq!(parse_grant("GRANTED"), Grant::Granted);
        assert_eq!(parse_grant("never_ask_again"), Grant::Denied);
        assert_eq!(parse_grant("denied"), Grant::Denied);
        assert_eq!(parse_grant("ask later"), Grant::Unknown);
    }

    #[test]
    fn test_location_reply_shapes() {
        let fix: LocationReply = serde_json::from_value(serde_json::json!({
            "latitude": 12.9716,
            "longitude": 77.5946,
            "capturedAtEpochMs": 1_700_000_000_000_i64
        }))
        .unwrap();
        assert!(matches!(fix, LocationReply::Fix(f) if f.latitude == 12.9716));

        let failed: LocationReply = serde_json::from_value(serde_json::json!({
            "code": "TIMEOUT",
            "message": "Location not available"
        }))
        .unwrap();
        assert!(matches!(
            failed,
            LocationReply::Failed(e) if e.code == LocationErrorCode::Timeout
        ));
    }

    #[tokio::test]
    async fn test_answered_call_receives_reply() {
        let pending = PendingCalls::default();
        let mut call = pending.register();

        assert!(pending.resolve(call.id, Ok(serde_json::json!("granted"))));
        assert_eq!(call.answer().await, Ok(serde_json::json!("granted")));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_dropped_call_is_unregistered() {
        let pending = PendingCalls::default();
        let call = pending.register();
        let id = call.id;
        assert_eq!(pending.len(), 1);

        drop(call);
        assert_eq!(pending.len(), 0);
        // A late answer from the webview finds nothing to wake
        assert!(!pending.resolve(id, Ok(Value::Null)));
    }

    #[tokio::test]
    async fn test_cancelled_call_future_is_unregistered() {
        let pending = PendingCalls::default();
        let waiting = async {
            let mut call = pending.register();
            call.answer().await
        };

        let result = tokio::time::timeout(std::time::Duration::from_millis(10), waiting).await;
        assert!(result.is_err());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_call_serializes_with_kind() {
        let json = serde_json::to_value(DeviceCall::Sms {
            number: "+911234567890".to_string(),
            body: "Rakshak".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "sms");
        assert_eq!(json["number"], "+911234567890");
    }
}
