//! HMAC-SHA256 query-string signing (Binance/Bybit style).

use super::{now_millis, signing_error, Secret, SignRequest, SignedRequest, Signer};
use hmac::{Hmac, Mac};
use kestrel_markets::VenueResult;
use sha2::Sha256;
use smol_str::SmolStr;

type HmacSha256 = Hmac<Sha256>;

/// Where the computed signature is placed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SignaturePlacement {
    /// Appended as a `signature` query parameter.
    Query,
    /// Carried in a venue-named header.
    Header,
}

/// Signs the sorted query string plus `timestamp` and `recvWindow` with
/// HMAC-SHA256, hex-encoded.
///
/// Clock drift tolerance is carried as `recvWindow` (default 5000 ms).
#[derive(Debug, Clone)]
pub struct HmacQuerySigner {
    api_key: String,
    secret: Secret,
    recv_window_ms: u64,
    placement: SignaturePlacement,
    api_key_header: SmolStr,
    signature_header: SmolStr,
}

impl HmacQuerySigner {
    pub fn new(api_key: impl Into<String>, secret: Secret) -> Self {
        Self {
            api_key: api_key.into(),
            secret,
            recv_window_ms: 5_000,
            placement: SignaturePlacement::Query,
            api_key_header: SmolStr::new("X-MBX-APIKEY"),
            signature_header: SmolStr::new("X-Signature"),
        }
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    pub fn with_placement(mut self, placement: SignaturePlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_api_key_header(mut self, header: impl Into<SmolStr>) -> Self {
        self.api_key_header = header.into();
        self
    }

    pub fn with_signature_header(mut self, header: impl Into<SmolStr>) -> Self {
        self.signature_header = header.into();
        self
    }

    fn signature(&self, canonical: &str) -> VenueResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose().as_bytes())
            .map_err(|_| signing_error("hmac key rejected"))?;
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl Signer for HmacQuerySigner {
    fn sign(&self, req: SignRequest) -> VenueResult<SignedRequest> {
        let timestamp = req.timestamp.unwrap_or_else(now_millis);

        // Sorted caller params first, then timestamp and recvWindow
        // appended, exactly as signed.
        let mut params = req.params.clone();
        params.sort_by(|a, b| a.0.cmp(&b.0));
        params.push(("timestamp".to_string(), timestamp.to_string()));
        params.push(("recvWindow".to_string(), self.recv_window_ms.to_string()));

        let canonical = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.signature(&canonical)?;

        let mut headers = self.static_headers();
        match self.placement {
            SignaturePlacement::Query => {
                params.push(("signature".to_string(), signature));
            }
            SignaturePlacement::Header => {
                headers.push((self.signature_header.clone(), signature));
            }
        }

        Ok(SignedRequest {
            headers,
            params,
            body: req.body,
        })
    }

    fn static_headers(&self) -> Vec<(SmolStr, String)> {
        vec![(self.api_key_header.clone(), self.api_key.clone())]
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret.is_empty()
    }
}
