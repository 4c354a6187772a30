//! EIP-712 typed-data signing (Hyperliquid/GRVT style venues).
//!
//! Implements the typed-data envelope directly: domain separator, type
//! hash, struct hash, and `keccak256(0x1901 || domain || struct)` signed
//! with a recoverable secp256k1 signature (65 bytes, `v = 27 + recid`).

use super::{decode_key_material, now_millis, signing_error, Secret, SignRequest, SignedRequest, Signer};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use kestrel_markets::VenueResult;
use sha3::{Digest, Keccak256};
use smol_str::SmolStr;

/// `keccak256` digest, the hash underpinning every EIP-712 construction.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&Keccak256::digest(data));
    output
}

/// EIP-712 domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: [u8; 20],
}

impl Eip712Domain {
    pub fn new(name: &str, version: &str, chain_id: u64, verifying_contract: [u8; 20]) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> [u8; 32] {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(&type_hash);
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        encoded.extend_from_slice(&uint_word(self.chain_id));
        encoded.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(&encoded)
    }
}

/// A struct type: name plus `(field_name, solidity_type)` pairs, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Type {
    pub name: &'static str,
    pub fields: Vec<(&'static str, &'static str)>,
}

impl Eip712Type {
    pub fn new(name: &'static str, fields: Vec<(&'static str, &'static str)>) -> Self {
        Self { name, fields }
    }

    fn encoding(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|(field, ty)| format!("{ty} {field}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({fields})", self.name)
    }

    pub fn type_hash(&self) -> [u8; 32] {
        keccak256(self.encoding().as_bytes())
    }
}

/// A value for one field of a typed struct.
#[derive(Debug, Clone, PartialEq)]
pub enum Eip712Value {
    String(String),
    Uint(u64),
    Address([u8; 20]),
    Bytes32([u8; 32]),
    Bool(bool),
}

impl Eip712Value {
    fn encode(&self) -> [u8; 32] {
        match self {
            Eip712Value::String(value) => keccak256(value.as_bytes()),
            Eip712Value::Uint(value) => uint_word(*value),
            Eip712Value::Address(value) => address_word(value),
            Eip712Value::Bytes32(value) => *value,
            Eip712Value::Bool(value) => uint_word(u64::from(*value)),
        }
    }
}

fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

/// Deterministic verifying contract for venues that derive it from a
/// numeric product id rather than deploying per-market contracts.
pub fn verifying_contract_for_product(product_id: u32) -> [u8; 20] {
    let digest = keccak256(format!("product:{product_id}").as_bytes());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

/// Recoverable secp256k1 signer over EIP-712 typed data.
#[derive(Clone)]
pub struct Eip712Signer {
    key: SigningKey,
    domain: Eip712Domain,
}

impl std::fmt::Debug for Eip712Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eip712Signer")
            .field("domain", &self.domain)
            .field("address", &format!("0x{}", hex::encode(self.address())))
            .finish()
    }
}

impl Eip712Signer {
    pub fn new(private_key: &Secret, domain: Eip712Domain) -> VenueResult<Self> {
        let bytes = decode_key_material(private_key)?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| signing_error("invalid secp256k1 private key"))?;
        Ok(Self { key, domain })
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// The Ethereum address of the signing key.
    pub fn address(&self) -> [u8; 20] {
        let point = self.key.verifying_key().to_encoded_point(false);
        let digest = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[12..]);
        address
    }

    pub fn address_hex(&self) -> String {
        format!("0x{}", hex::encode(self.address()))
    }

    /// `keccak256(typeHash || encoded values)`.
    pub fn struct_hash(ty: &Eip712Type, values: &[Eip712Value]) -> VenueResult<[u8; 32]> {
        if ty.fields.len() != values.len() {
            return Err(signing_error(format!(
                "{} expects {} fields, got {}",
                ty.name,
                ty.fields.len(),
                values.len()
            )));
        }
        let mut encoded = Vec::with_capacity((values.len() + 1) * 32);
        encoded.extend_from_slice(&ty.type_hash());
        for value in values {
            encoded.extend_from_slice(&value.encode());
        }
        Ok(keccak256(&encoded))
    }

    /// Sign a typed-data message; returns the 65-byte `r || s || v`
    /// signature, hex with `0x` prefix.
    pub fn sign_typed(&self, ty: &Eip712Type, values: &[Eip712Value]) -> VenueResult<String> {
        let struct_hash = Self::struct_hash(ty, values)?;
        let mut preimage = Vec::with_capacity(2 + 64);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&self.domain.separator());
        preimage.extend_from_slice(&struct_hash);
        let digest = keccak256(&preimage);

        let (signature, recovery) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|_| signing_error("eip712 signing failed"))?;

        let mut rendered = [0u8; 65];
        rendered[..64].copy_from_slice(&signature.to_bytes());
        rendered[64] = 27 + recovery.to_byte();
        Ok(format!("0x{}", hex::encode(rendered)))
    }
}

impl Signer for Eip712Signer {
    /// Header-auth form for REST endpoints: signs a `Request` struct over
    /// the venue domain. Action payloads (orders, cancels) go through
    /// [`Eip712Signer::sign_typed`] with their own types.
    fn sign(&self, req: SignRequest) -> VenueResult<SignedRequest> {
        let timestamp = req.timestamp.unwrap_or_else(now_millis);
        let ty = Eip712Type::new(
            "Request",
            vec![
                ("method", "string"),
                ("path", "string"),
                ("timestamp", "uint64"),
            ],
        );
        let signature = self.sign_typed(
            &ty,
            &[
                Eip712Value::String(req.method.to_string()),
                Eip712Value::String(req.path.clone()),
                Eip712Value::Uint(timestamp as u64),
            ],
        )?;

        Ok(SignedRequest {
            headers: vec![
                (SmolStr::new("X-Signature"), signature),
                (SmolStr::new("X-Timestamp"), timestamp.to_string()),
                (SmolStr::new("X-Address"), self.address_hex()),
            ],
            params: req.params,
            body: req.body,
        })
    }

    fn has_credentials(&self) -> bool {
        true
    }
}
