// Data model shared by the dispatch pipeline.
//
// NOTE: the webview mirrors DispatchSnapshot/FailureReason as JSON.
// Keep serde names stable when modifying these types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single OS permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Grant {
    Granted,
    Denied,
    #[default]
    Unknown,
}

impl Grant {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

/// Device capabilities the dispatch pipeline depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Coarse/fine location
    Location,
    /// Direct SMS sending
    Sms,
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        &[Self::Location, Self::Sms]
    }
}

/// Combined grant state for both capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PermissionState {
    pub location: Grant,
    pub sms: Grant,
}

impl PermissionState {
    /// Dispatch may proceed only when both capabilities are granted
    pub fn ready(&self) -> bool {
        self.location.is_granted() && self.sms.is_granted()
    }

    pub fn get(&self, capability: Capability) -> Grant {
        match capability {
            Capability::Location => self.location,
            Capability::Sms => self.sms,
        }
    }

    /// Record a fresh outcome. A Granted capability is never downgraded.
    pub fn record(&mut self, capability: Capability, grant: Grant) {
        let slot = match capability {
            Capability::Location => &mut self.location,
            Capability::Sms => &mut self.sms,
        };
        if !slot.is_granted() {
            *slot = grant;
        }
    }
}

/// A single geolocation reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at_epoch_ms: i64,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, captured_at_epoch_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at_epoch_ms,
        }
    }

    /// Finite coordinates inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.captured_at_epoch_ms).single()
    }
}

/// Authenticated user, as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }

    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// `a***@b.com` style form for log lines
    pub fn masked_email(&self) -> String {
        match self.email.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{first}***@{domain}")
            }
            None => "***".to_string(),
        }
    }
}

/// Message built for one dispatch attempt. Write-once.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPayload {
    pub identity: Identity,
    pub fix: PositionFix,
    pub encoded_body: String,
}

/// Acknowledgement from the SMS transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub destination: String,
    pub sent_at: DateTime<Utc>,
    /// Whatever the transport returned alongside its success flag
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

/// Keep the country code and the last two digits of a phone number
pub fn mask_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(char::is_ascii_digit).collect();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }
    let prefix = if number.starts_with('+') { "+" } else { "" };
    let head: String = digits[..2].iter().collect();
    let tail: String = digits[digits.len() - 2..].iter().collect();
    format!("{prefix}{head}{}{tail}", "*".repeat(digits.len() - 4))
}
