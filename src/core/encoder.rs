// Alert body encoding.
//
// Every body starts with the message tag on its own line. The second line is
// either a map link (default, fits a single SMS segment) or a base64 JSON
// block carrying email, timestamp and coordinates.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Identity, PositionFix};

pub const DEFAULT_TAG: &str = "Rakshak";

const MAP_LINK_BASE: &str = "https://maps.google.com/?q=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EncodingMode {
    #[default]
    MapLink,
    PackedJson,
}

/// JSON document carried by the PackedJson mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PackedAlert {
    email: String,
    /// Epoch milliseconds as an ASCII decimal string
    timestamp: String,
    /// `"<lat>,<lon>"`
    coordinates: String,
}

/// Result of decoding a PackedJson body
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAlert {
    pub email: String,
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("body does not start with tag {0:?}")]
    MissingTag(String),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("invalid coordinates {0:?}")]
    Coordinates(String),
}

#[derive(Debug, Clone)]
pub struct AlertEncoder {
    tag: String,
    mode: EncodingMode,
}

impl AlertEncoder {
    pub fn new(tag: impl Into<String>, mode: EncodingMode) -> Self {
        Self {
            tag: tag.into(),
            mode,
        }
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    /// Build the outbound body. Pure; the caller guarantees a valid fix and
    /// an identity with a non-empty email.
    pub fn encode(&self, identity: &Identity, fix: &PositionFix) -> String {
        debug_assert!(fix.is_valid(), "encode called with invalid fix");
        debug_assert!(identity.has_email(), "encode called without email");

        match self.mode {
            EncodingMode::MapLink => format!("{}\n{}", self.tag, map_link(fix)),
            EncodingMode::PackedJson => format!("{}\n{}", self.tag, pack(identity, fix)),
        }
    }
}

impl Default for AlertEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_TAG, EncodingMode::default())
    }
}

/// Six decimals is roughly 0.1 m, enough for street-level resolution
pub fn map_link(fix: &PositionFix) -> String {
    format!("{}{:.6},{:.6}", MAP_LINK_BASE, fix.latitude, fix.longitude)
}

fn pack(identity: &Identity, fix: &PositionFix) -> String {
    let packed = PackedAlert {
        email: identity.email.clone(),
        timestamp: fix.captured_at_epoch_ms.to_string(),
        coordinates: format!("{},{}", fix.latitude, fix.longitude),
    };
    // Serializing a struct of plain strings cannot fail
    let json = serde_json::to_string(&packed).unwrap_or_default();
    BASE64.encode(json)
}

/// Invert `EncodingMode::PackedJson`
pub fn decode_packed(tag: &str, body: &str) -> Result<DecodedAlert, DecodeError> {
    let block = body
        .strip_prefix(tag)
        .and_then(|rest| rest.strip_prefix('\n'))
        .ok_or_else(|| DecodeError::MissingTag(tag.to_string()))?;

    let json = BASE64.decode(block.trim())?;
    let packed: PackedAlert = serde_json::from_slice(&json)?;

    let timestamp_ms = packed
        .timestamp
        .parse()
        .map_err(|_| DecodeError::Timestamp(packed.timestamp.clone()))?;

    let (lat, lon) = packed
        .coordinates
        .split_once(',')
        .ok_or_else(|| DecodeError::Coordinates(packed.coordinates.clone()))?;
    let latitude = lat
        .trim()
        .parse()
        .map_err(|_| DecodeError::Coordinates(packed.coordinates.clone()))?;
    let longitude = lon
        .trim()
        .parse()
        .map_err(|_| DecodeError::Coordinates(packed.coordinates.clone()))?;

    Ok(DecodedAlert {
        email: packed.email,
        timestamp_ms,
        latitude,
        longitude,
    })
}
