//! ECDSA over SHA3-256 (edgeX/StarkEx-adjacent venues).
//!
//! Canonical message: `timestamp || METHOD || basePath || sortedQuery`,
//! hashed with SHA3-256 and signed with a secp256k1 key; rendered as
//! `0x{r}{s}` hex.

use super::{decode_key_material, now_millis, signing_error, Secret, SignRequest, SignedRequest, Signer};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use kestrel_markets::VenueResult;
use sha3::{Digest, Sha3_256};
use smol_str::SmolStr;

#[derive(Clone)]
pub struct EcdsaSha3Signer {
    key: SigningKey,
    signature_header: SmolStr,
    timestamp_header: SmolStr,
}

impl std::fmt::Debug for EcdsaSha3Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaSha3Signer")
            .field("signature_header", &self.signature_header)
            .field("timestamp_header", &self.timestamp_header)
            .finish()
    }
}

impl EcdsaSha3Signer {
    pub fn new(private_key: &Secret) -> VenueResult<Self> {
        let bytes = decode_key_material(private_key)?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| signing_error("invalid secp256k1 private key"))?;
        Ok(Self {
            key,
            signature_header: SmolStr::new("X-Signature"),
            timestamp_header: SmolStr::new("X-Timestamp"),
        })
    }

    pub fn with_headers(
        mut self,
        signature_header: impl Into<SmolStr>,
        timestamp_header: impl Into<SmolStr>,
    ) -> Self {
        self.signature_header = signature_header.into();
        self.timestamp_header = timestamp_header.into();
        self
    }

    pub(crate) fn canonical(req: &SignRequest, timestamp: i64) -> String {
        let mut params = req.params.clone();
        params.sort_by(|a, b| a.0.cmp(&b.0));
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}{}{}{}", timestamp, req.method, req.path, query)
    }
}

impl Signer for EcdsaSha3Signer {
    fn sign(&self, req: SignRequest) -> VenueResult<SignedRequest> {
        let timestamp = req.timestamp.unwrap_or_else(now_millis);
        let canonical = Self::canonical(&req, timestamp);

        let digest = Sha3_256::digest(canonical.as_bytes());
        let signature: Signature = self
            .key
            .sign_prehash(&digest)
            .map_err(|_| signing_error("ecdsa signing failed"))?;
        let rendered = format!("0x{}", hex::encode(signature.to_bytes()));

        Ok(SignedRequest {
            headers: vec![
                (self.signature_header.clone(), rendered),
                (self.timestamp_header.clone(), timestamp.to_string()),
            ],
            params: req.params,
            body: req.body,
        })
    }

    fn has_credentials(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::hazmat::PrehashVerifier;

    const KEY_HEX: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

    #[test]
    fn test_canonical_layout() {
        let request = SignRequest::new("GET", "/api/v1/private/account")
            .with_params(vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ])
            .with_timestamp(1_700_000_000_000);
        assert_eq!(
            EcdsaSha3Signer::canonical(&request, 1_700_000_000_000),
            "1700000000000GET/api/v1/private/accounta=1&b=2"
        );
    }

    #[test]
    fn test_signature_verifies_and_is_hex_r_s() {
        let signer = EcdsaSha3Signer::new(&Secret::new(KEY_HEX)).unwrap();
        let request = SignRequest::new("POST", "/api/v1/private/order").with_timestamp(99);
        let signed = signer.sign(request.clone()).unwrap();

        let rendered = signed
            .headers
            .iter()
            .find(|(key, _)| key == "X-Signature")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert!(rendered.starts_with("0x"));
        assert_eq!(rendered.len(), 2 + 128);

        let digest = Sha3_256::digest(EcdsaSha3Signer::canonical(&request, 99).as_bytes());
        let signature =
            Signature::from_slice(&hex::decode(&rendered[2..]).unwrap()).unwrap();
        signer
            .key
            .verifying_key()
            .verify_prehash(&digest, &signature)
            .unwrap();
    }

    #[test]
    fn test_rejects_malformed_keys() {
        assert!(EcdsaSha3Signer::new(&Secret::new("0x00")).is_err());
        assert!(EcdsaSha3Signer::new(&Secret::new("zzzz")).is_err());
    }
}
