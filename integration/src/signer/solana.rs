//! Solana Ed25519 signing.
//!
//! The canonical message is identical to the
//! [`Ed25519PathSigner`](super::Ed25519PathSigner) scheme; the wallet is a
//! Solana keypair (64-byte `seed || pubkey` or bare 32-byte seed, hex or
//! base64).

use super::{Ed25519PathSigner, Secret, SignRequest, SignedRequest, Signer};
use kestrel_markets::VenueResult;
use smol_str::SmolStr;

#[derive(Debug, Clone)]
pub struct SolanaSigner {
    inner: Ed25519PathSigner,
}

impl SolanaSigner {
    pub fn new(keypair: &Secret) -> VenueResult<Self> {
        Ok(Self {
            inner: Ed25519PathSigner::new(keypair)?,
        })
    }

    pub fn with_window(mut self, window_ms: u64) -> Self {
        self.inner = self.inner.with_window(window_ms);
        self
    }

    /// Base64 of the wallet's public key.
    pub fn pubkey_b64(&self) -> &str {
        self.inner.verifying_key_b64()
    }
}

impl Signer for SolanaSigner {
    fn sign(&self, req: SignRequest) -> VenueResult<SignedRequest> {
        self.inner.sign(req)
    }

    fn static_headers(&self) -> Vec<(SmolStr, String)> {
        self.inner.static_headers()
    }

    fn has_credentials(&self) -> bool {
        self.inner.has_credentials()
    }
}
