//! Request signing.
//!
//! Every venue authentication scheme reduces to (i) a deterministic
//! canonical-message constructor and (ii) a signature primitive. The
//! [`Signer`] trait captures that: drivers hand it the request parts, and
//! get back the headers/params/body the venue expects.
//!
//! Secret material is held in [`Secret`] wrappers that redact on `Debug`
//! and never appear in errors or logs. Any failure inside a signing path
//! surfaces as [`ErrorKind::InvalidSignature`].

use kestrel_markets::{ErrorKind, VenueError, VenueResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;

pub mod cosmos;
pub mod ecdsa;
pub mod ed25519;
pub mod eip712;
pub mod hmac;
pub mod solana;

pub use cosmos::CosmosWallet;
pub use ecdsa::EcdsaSha3Signer;
pub use ed25519::{Ed25519ParamsSigner, Ed25519PathSigner};
pub use eip712::{Eip712Domain, Eip712Signer, Eip712Type, Eip712Value};
pub use hmac::{HmacQuerySigner, SignaturePlacement};
pub use solana::SolanaSigner;

/// Opaque holder for secret material.
///
/// Redacts in `Debug` and `Serialize`; the raw value is only reachable
/// inside this crate.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret::new)
    }
}

/// The request parts a scheme may fold into its canonical message.
#[derive(Debug, Clone, Default)]
pub struct SignRequest {
    pub method: SmolStr,
    pub path: String,
    /// Query parameters, in caller order; schemes sort as required.
    pub params: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Venue-specific instruction tag (e.g. `orderExecute`).
    pub instruction: Option<String>,
    /// Millisecond timestamp; schemes default to the current clock.
    pub timestamp: Option<i64>,
}

impl SignRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: SmolStr::new(method.to_ascii_uppercase()),
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// The signed request parts to merge into the outbound call.
#[derive(Debug, Clone, Default)]
pub struct SignedRequest {
    pub headers: Vec<(SmolStr, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

/// Uniform signing contract.
pub trait Signer: Send + Sync + std::fmt::Debug {
    /// Produce the authenticated form of `req`.
    fn sign(&self, req: SignRequest) -> VenueResult<SignedRequest>;

    /// Headers attached to every request regardless of signing.
    fn static_headers(&self) -> Vec<(SmolStr, String)> {
        Vec::new()
    }

    fn has_credentials(&self) -> bool;

    /// Refresh derived credentials (token-based schemes). Default no-op.
    fn refresh(&self) -> VenueResult<()> {
        Ok(())
    }
}

/// Error constructor used by every scheme so signing failures are uniform.
pub(crate) fn signing_error(message: impl Into<String>) -> VenueError {
    VenueError::new(ErrorKind::InvalidSignature, message)
}

/// Decode private-key material supplied as hex (with or without `0x`) or
/// base64 — auto-detected.
pub fn decode_key_material(raw: &Secret) -> VenueResult<Vec<u8>> {
    use base64::Engine;

    let trimmed = raw.expose().trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if !stripped.is_empty()
        && stripped.len() % 2 == 0
        && stripped.chars().all(|c| c.is_ascii_hexdigit())
    {
        return hex::decode(stripped).map_err(|_| signing_error("malformed hex key"));
    }
    base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|_| signing_error("key is neither hex nor base64"))
}

/// Current wall-clock in milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `k=v&...` over the entries sorted ascending by key, without percent
/// encoding. Used by schemes that sign the raw parameter string.
pub(crate) fn joined_sorted(entries: &mut Vec<(String, String)>) -> String {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Render a JSON value the way canonical parameter strings expect:
/// bare strings unquoted, everything else as compact JSON.
pub(crate) fn param_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacts() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"***\"");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_decode_key_material_auto_detects() {
        let decode = |raw: &str| decode_key_material(&Secret::new(raw));
        assert_eq!(decode("0xdeadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        // "3q2+7w==" is base64 for the same bytes.
        assert_eq!(decode("3q2+7w==").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(decode("!!not-a-key!!").is_err());
    }

    #[test]
    fn test_joined_sorted() {
        let mut entries = vec![
            ("symbol".to_string(), "BTCUSDT".to_string()),
            ("price".to_string(), "50000".to_string()),
        ];
        assert_eq!(joined_sorted(&mut entries), "price=50000&symbol=BTCUSDT");
    }

    #[test]
    fn test_param_value_rendering() {
        assert_eq!(param_value(&serde_json::json!("abc")), "abc");
        assert_eq!(param_value(&serde_json::json!(1.5)), "1.5");
        assert_eq!(param_value(&serde_json::json!(true)), "true");
        assert_eq!(param_value(&serde_json::json!({"a": 1})), r#"{"a":1}"#);
    }
}
