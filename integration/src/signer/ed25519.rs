//! Ed25519 signing schemes.
//!
//! Two canonical-message layouts share the same primitive:
//!
//! * [`Ed25519ParamsSigner`] — alphabetized `k=v&` over all body/query
//!   params plus `instruction`, `timestamp` and `window` (Backpack style).
//! * [`Ed25519PathSigner`] — `METHOD || PATH || timestamp || window ||
//!   body` concatenation (Paradex/Lighter style).

use super::{
    decode_key_material, now_millis, param_value, signing_error, Secret, SignRequest,
    SignedRequest, Signer,
};
use base64::Engine;
use ed25519_dalek::{Signer as _, SigningKey};
use kestrel_markets::VenueResult;
use smol_str::SmolStr;

pub(crate) fn signing_key_from_raw(raw: &Secret) -> VenueResult<SigningKey> {
    let bytes = decode_key_material(raw)?;
    match bytes.len() {
        // 32-byte seed.
        32 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        // 64-byte keypair: seed || public.
        64 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes[..32]);
            Ok(SigningKey::from_bytes(&seed))
        }
        other => Err(signing_error(format!(
            "ed25519 key must be 32 or 64 bytes, got {other}"
        ))),
    }
}

fn standard_headers(
    verifying_key_b64: &str,
    signature_b64: String,
    timestamp: i64,
    window_ms: u64,
) -> Vec<(SmolStr, String)> {
    vec![
        (SmolStr::new("X-API-KEY"), verifying_key_b64.to_string()),
        (SmolStr::new("X-SIGNATURE"), signature_b64),
        (SmolStr::new("X-TIMESTAMP"), timestamp.to_string()),
        (SmolStr::new("X-WINDOW"), window_ms.to_string()),
    ]
}

/// Ed25519 over alphabetized parameters.
#[derive(Clone)]
pub struct Ed25519ParamsSigner {
    key: SigningKey,
    verifying_key_b64: String,
    window_ms: u64,
}

impl std::fmt::Debug for Ed25519ParamsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519ParamsSigner")
            .field("verifying_key", &self.verifying_key_b64)
            .field("window_ms", &self.window_ms)
            .finish()
    }
}

impl Ed25519ParamsSigner {
    /// `private_key` may be hex (`0x`-tolerant) or base64; 32-byte seed or
    /// 64-byte keypair.
    pub fn new(private_key: &Secret) -> VenueResult<Self> {
        let key = signing_key_from_raw(private_key)?;
        let verifying_key_b64 =
            base64::engine::general_purpose::STANDARD.encode(key.verifying_key().to_bytes());
        Ok(Self {
            key,
            verifying_key_b64,
            window_ms: 5_000,
        })
    }

    pub fn with_window(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn verifying_key_b64(&self) -> &str {
        &self.verifying_key_b64
    }
}

impl Signer for Ed25519ParamsSigner {
    fn sign(&self, req: SignRequest) -> VenueResult<SignedRequest> {
        let timestamp = req.timestamp.unwrap_or_else(now_millis);

        let mut entries: Vec<(String, String)> = req.params.clone();
        if let Some(serde_json::Value::Object(map)) = &req.body {
            for (key, value) in map {
                entries.push((key.clone(), param_value(value)));
            }
        }
        if let Some(instruction) = &req.instruction {
            entries.push(("instruction".to_string(), instruction.clone()));
        }
        entries.push(("timestamp".to_string(), timestamp.to_string()));
        entries.push(("window".to_string(), self.window_ms.to_string()));
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let message = entries
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature =
            base64::engine::general_purpose::STANDARD.encode(self.key.sign(message.as_bytes()).to_bytes());

        Ok(SignedRequest {
            headers: standard_headers(&self.verifying_key_b64, signature, timestamp, self.window_ms),
            params: req.params,
            body: req.body,
        })
    }

    fn has_credentials(&self) -> bool {
        true
    }
}

/// Ed25519 over `METHOD || PATH || timestamp || window || body`.
#[derive(Clone)]
pub struct Ed25519PathSigner {
    key: SigningKey,
    verifying_key_b64: String,
    window_ms: u64,
}

impl std::fmt::Debug for Ed25519PathSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519PathSigner")
            .field("verifying_key", &self.verifying_key_b64)
            .field("window_ms", &self.window_ms)
            .finish()
    }
}

impl Ed25519PathSigner {
    pub fn new(private_key: &Secret) -> VenueResult<Self> {
        let key = signing_key_from_raw(private_key)?;
        let verifying_key_b64 =
            base64::engine::general_purpose::STANDARD.encode(key.verifying_key().to_bytes());
        Ok(Self {
            key,
            verifying_key_b64,
            window_ms: 5_000,
        })
    }

    pub fn with_window(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn verifying_key_b64(&self) -> &str {
        &self.verifying_key_b64
    }

    pub(crate) fn canonical(&self, req: &SignRequest, timestamp: i64) -> String {
        let body = req
            .body
            .as_ref()
            .map(|value| value.to_string())
            .unwrap_or_default();
        format!(
            "{}{}{}{}{}",
            req.method, req.path, timestamp, self.window_ms, body
        )
    }
}

impl Signer for Ed25519PathSigner {
    fn sign(&self, req: SignRequest) -> VenueResult<SignedRequest> {
        let timestamp = req.timestamp.unwrap_or_else(now_millis);
        let message = self.canonical(&req, timestamp);
        let signature =
            base64::engine::general_purpose::STANDARD.encode(self.key.sign(message.as_bytes()).to_bytes());

        Ok(SignedRequest {
            headers: standard_headers(&self.verifying_key_b64, signature, timestamp, self.window_ms),
            params: req.params,
            body: req.body,
        })
    }

    fn has_credentials(&self) -> bool {
        true
    }
}
