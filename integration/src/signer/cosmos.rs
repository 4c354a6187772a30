//! Cosmos SDK secp256k1 wallet — read-only path.
//!
//! Derives the account address from a BIP-39 mnemonic via the standard
//! Cosmos HD path `m/44'/118'/0'/0/0` and bech32-encodes
//! `ripemd160(sha256(pubkey))` under the chain prefix. Transaction signing
//! is delegated to an external collaborator; drivers only need the address
//! and public key for read endpoints and subscriptions.

use super::{signing_error, Secret};
use bech32::{ToBase32, Variant};
use bip39::{Language, Mnemonic, Seed};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{Field, PrimeField};
use k256::{FieldBytes, ProjectivePoint, Scalar};
use kestrel_markets::VenueResult;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

const HARDENED: u32 = 0x8000_0000;
/// `m/44'/118'/0'/0/0`
const COSMOS_HD_PATH: [u32; 5] = [44 | HARDENED, 118 | HARDENED, HARDENED, 0, 0];

/// A derived Cosmos account.
#[derive(Clone)]
pub struct CosmosWallet {
    address: String,
    public_key: [u8; 33],
    secret: Secret,
}

impl std::fmt::Debug for CosmosWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosWallet")
            .field("address", &self.address)
            .finish()
    }
}

struct ExtendedKey {
    scalar: Scalar,
    chain_code: [u8; 32],
}

impl ExtendedKey {
    fn master(seed: &[u8]) -> VenueResult<Self> {
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|_| signing_error("hmac key rejected"))?;
        mac.update(seed);
        let digest = mac.finalize().into_bytes();
        Self::from_parts(&digest[..32], &digest[32..])
    }

    fn from_parts(key: &[u8], chain_code: &[u8]) -> VenueResult<Self> {
        let scalar: Option<Scalar> =
            Scalar::from_repr(FieldBytes::clone_from_slice(key)).into();
        let scalar = scalar
            .filter(|scalar| scalar != &Scalar::ZERO)
            .ok_or_else(|| signing_error("derived key outside curve order"))?;
        let mut code = [0u8; 32];
        code.copy_from_slice(chain_code);
        Ok(Self { scalar, chain_code: code })
    }

    fn public_compressed(&self) -> [u8; 33] {
        let point = (ProjectivePoint::GENERATOR * self.scalar).to_encoded_point(true);
        let mut compressed = [0u8; 33];
        compressed.copy_from_slice(point.as_bytes());
        compressed
    }

    fn derive_child(&self, index: u32) -> VenueResult<Self> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|_| signing_error("hmac key rejected"))?;
        if index & HARDENED != 0 {
            mac.update(&[0u8]);
            mac.update(&self.scalar.to_bytes());
        } else {
            mac.update(&self.public_compressed());
        }
        mac.update(&index.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let tweak: Option<Scalar> =
            Scalar::from_repr(FieldBytes::clone_from_slice(&digest[..32])).into();
        let tweak = tweak.ok_or_else(|| signing_error("derived key outside curve order"))?;
        let child = tweak + self.scalar;
        if child == Scalar::ZERO {
            return Err(signing_error("derived key outside curve order"));
        }

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);
        Ok(Self { scalar: child, chain_code })
    }
}

impl CosmosWallet {
    /// Derive from a 12/24-word BIP-39 mnemonic under the given bech32
    /// prefix (`cosmos`, `dydx`, ...).
    pub fn from_mnemonic(mnemonic: &Secret, bech_prefix: &str) -> VenueResult<Self> {
        let parsed = Mnemonic::from_phrase(mnemonic.expose().trim(), Language::English)
            .map_err(|_| signing_error("invalid mnemonic"))?;
        let seed = Seed::new(&parsed, "");

        let mut key = ExtendedKey::master(seed.as_bytes())?;
        for index in COSMOS_HD_PATH {
            key = key.derive_child(index)?;
        }

        let public_key = key.public_compressed();
        let sha = Sha256::digest(public_key);
        let hash = Ripemd160::digest(sha);
        let address = bech32::encode(bech_prefix, hash.to_base32(), Variant::Bech32)
            .map_err(|_| signing_error("bech32 encoding failed"))?;

        Ok(Self {
            address,
            public_key,
            secret: Secret::new(hex::encode(key.scalar.to_bytes())),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    pub fn has_credentials(&self) -> bool {
        !self.secret.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon about";

    #[test]
    fn test_derivation_is_deterministic() {
        let first = CosmosWallet::from_mnemonic(&Secret::new(MNEMONIC), "cosmos").unwrap();
        let second = CosmosWallet::from_mnemonic(&Secret::new(MNEMONIC), "cosmos").unwrap();
        assert_eq!(first.address(), second.address());
        assert_eq!(first.public_key(), second.public_key());
        assert!(first.has_credentials());
    }

    #[test]
    fn test_prefix_is_respected() {
        let cosmos = CosmosWallet::from_mnemonic(&Secret::new(MNEMONIC), "cosmos").unwrap();
        let dydx = CosmosWallet::from_mnemonic(&Secret::new(MNEMONIC), "dydx").unwrap();
        assert!(cosmos.address().starts_with("cosmos1"));
        assert!(dydx.address().starts_with("dydx1"));

        let (_, cosmos_data, _) = bech32::decode(cosmos.address()).unwrap();
        let (_, dydx_data, _) = bech32::decode(dydx.address()).unwrap();
        // Same key material under both prefixes.
        assert_eq!(cosmos_data, dydx_data);
    }

    #[test]
    fn test_address_payload_is_ripemd160_of_sha256() {
        use bech32::FromBase32;

        let wallet = CosmosWallet::from_mnemonic(&Secret::new(MNEMONIC), "cosmos").unwrap();
        let (_, data, _) = bech32::decode(wallet.address()).unwrap();
        let payload = Vec::<u8>::from_base32(&data).unwrap();
        let expected = Ripemd160::digest(Sha256::digest(wallet.public_key()));
        assert_eq!(payload, expected.as_slice());
    }

    #[test]
    fn test_rejects_bad_mnemonic() {
        assert!(CosmosWallet::from_mnemonic(&Secret::new("not a mnemonic"), "cosmos").is_err());
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let wallet = CosmosWallet::from_mnemonic(&Secret::new(MNEMONIC), "cosmos").unwrap();
        let rendered = format!("{wallet:?}");
        assert!(rendered.contains("cosmos1"));
        assert!(!rendered.to_lowercase().contains("secret("));
    }
}
