use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

/// Length of an encoded signature (r || s)
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of an encoded public key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Hashes bytes with SHA-256
pub fn hash(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Represents a wallet address (public key in base58 format)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Address(bs58::encode(public_key.as_bytes()).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

/// Raw public key bytes, hex encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(PublicKey(bytes))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_verifying_key(self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl From<&VerifyingKey> for PublicKey {
    fn from(key: &VerifyingKey) -> Self {
        PublicKey(key.to_bytes())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_hex(&encoded).map_err(de::Error::custom)
    }
}

/// Represents a digital signature as a fixed 64-byte r || s encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigitalSignature([u8; SIGNATURE_LENGTH]);

impl DigitalSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(DigitalSignature(bytes))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for DigitalSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DigitalSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        DigitalSignature::from_hex(&encoded).map_err(de::Error::custom)
    }
}

/// Key custody as seen by the ledger: something that can sign on behalf of
/// one public key. The wallet layer decides where the secret lives.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;

    fn sign(&self, message: &[u8]) -> DigitalSignature;
}

/// Exported key material for a freshly created wallet
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyMaterial {
    /// Address derived from the public key
    pub address: String,

    /// Hex encoded public key
    pub public_key: String,

    /// Hex encoded private key
    pub private_key: String,
}

/// Represents a wallet with a keypair held in memory
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key: PublicKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::from(&signing_key.verifying_key());
        let address = Address::from_public_key(&public_key);

        Wallet {
            signing_key,
            public_key,
            address,
        }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Exports the wallet's secret key as bytes
    #[cfg(test)]
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Exports address and both keys in their wire encodings
    pub fn export(&self) -> KeyMaterial {
        KeyMaterial {
            address: self.address.0.clone(),
            public_key: self.public_key.to_hex(),
            private_key: hex::encode(self.signing_key.to_bytes()),
        }
    }
}

impl Signer for Wallet {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    fn sign(&self, message: &[u8]) -> DigitalSignature {
        DigitalSignature(self.signing_key.sign(message).to_bytes())
    }
}

/// Generates a new keypair and the address derived from it
pub fn generate_keypair() -> Wallet {
    Wallet::generate()
}

/// Signs a message with a raw 32-byte private key
pub fn sign(private_key: &[u8], message: &[u8]) -> Result<DigitalSignature, CryptoError> {
    let wallet = Wallet::from_secret_key(private_key)?;
    Ok(Signer::sign(&wallet, message))
}

/// Verifies a signature against a message and public key.
///
/// Uses strict verification: non-canonical scalars and weak keys are
/// rejected, so a signature has a single accepted encoding.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &DigitalSignature) -> bool {
    let verifying_key = match public_key.to_verifying_key() {
        Ok(key) => key,
        Err(_) => return false,
    };

    let signature = Signature::from_bytes(signature.as_bytes());
    verifying_key.verify_strict(message, &signature).is_ok()
}
