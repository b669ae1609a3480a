//! RSA key providers
//!
//! Two independent encodings of the same RSA capability:
//! - [`ArmoredEnvelopeProvider`]: OpenPGP key packets and an armored,
//!   session-key-wrapped `ENCRYPTED` envelope
//! - [`RawEncodingProvider`]: PKCS#1 / SPKI PEM keys and bare RSA-OAEP
//!   (SHA-512) ciphertext
//!
//! Keys and ciphertexts of one provider are never accepted by the other.

pub mod armored;
pub mod raw;

pub use armored::ArmoredEnvelopeProvider;
pub use raw::RawEncodingProvider;

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

/// Smallest modulus `generate_key_pair` will produce.
pub const MIN_KEY_BITS: usize = 1024;
/// Largest modulus; `rsa` refuses bigger public keys by default.
pub const MAX_KEY_BITS: usize = 4096;
pub const DEFAULT_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyProviderError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Envelope type mismatch: expected {expected:?}, found {found:?}")]
    EnvelopeTypeMismatch { expected: String, found: String },
}

/// RSA key pair. The private half zeroizes itself on drop.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh pair with a `bits`-sized modulus (e = 65537).
    pub fn generate(bits: usize) -> Result<Self, KeyProviderError> {
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) || bits % 8 != 0 {
            return Err(KeyProviderError::KeyGeneration(format!(
                "unsupported modulus size {} bits (expected a multiple of 8 in {}..={})",
                bits, MIN_KEY_BITS, MAX_KEY_BITS
            )));
        }

        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyProviderError::KeyGeneration(e.to_string()))?;

        log::debug!("Generated {}-bit RSA key pair", bits);
        Ok(Self::from_private_key(private))
    }

    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { private, public }
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// Which provider produced (and can consume) a key or ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    Armored,
    Raw,
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScheme::Armored => write!(f, "armored"),
            KeyScheme::Raw => write!(f, "raw"),
        }
    }
}

impl FromStr for KeyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "armored" | "pgp" => Ok(KeyScheme::Armored),
            "raw" | "pkcs" => Ok(KeyScheme::Raw),
            other => Err(format!("unknown key scheme {:?} (expected armored or raw)", other)),
        }
    }
}

/// Generation, serialization and encryption for one RSA encoding.
pub trait RsaKeyProvider {
    /// What `import_private_key` yields.
    type PrivateKey;
    /// What `import_public_key` yields.
    type PublicKey;

    fn scheme(&self) -> KeyScheme;

    fn generate_key_pair(&self, bits: usize) -> Result<KeyPair, KeyProviderError> {
        KeyPair::generate(bits)
    }

    fn export_private_key(&self, pair: &KeyPair) -> Result<Zeroizing<Vec<u8>>, KeyProviderError>;

    fn export_public_key(&self, pair: &KeyPair) -> Result<Vec<u8>, KeyProviderError>;

    fn import_private_key(&self, bytes: &[u8]) -> Result<Self::PrivateKey, KeyProviderError>;

    fn import_public_key(&self, bytes: &[u8]) -> Result<Self::PublicKey, KeyProviderError>;

    /// Encrypt `message` to the exported public key `public_key`.
    fn encrypt(&self, message: &[u8], public_key: &[u8]) -> Result<Vec<u8>, KeyProviderError>;

    /// Decrypt an envelope from [`RsaKeyProvider::encrypt`] with the exported private key.
    fn decrypt(
        &self,
        envelope: &[u8],
        private_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KeyProviderError>;
}

/// Provider chosen at runtime. Imports yield bare RSA key material.
#[derive(Debug, Clone)]
pub enum KeyProvider {
    Armored(ArmoredEnvelopeProvider),
    Raw(RawEncodingProvider),
}

impl KeyProvider {
    pub fn new(scheme: KeyScheme) -> Self {
        match scheme {
            KeyScheme::Armored => KeyProvider::Armored(ArmoredEnvelopeProvider::new()),
            KeyScheme::Raw => KeyProvider::Raw(RawEncodingProvider::new()),
        }
    }

    pub fn scheme(&self) -> KeyScheme {
        match self {
            KeyProvider::Armored(p) => p.scheme(),
            KeyProvider::Raw(p) => p.scheme(),
        }
    }

    pub fn generate_key_pair(&self, bits: usize) -> Result<KeyPair, KeyProviderError> {
        match self {
            KeyProvider::Armored(p) => p.generate_key_pair(bits),
            KeyProvider::Raw(p) => p.generate_key_pair(bits),
        }
    }

    pub fn export_private_key(&self, pair: &KeyPair) -> Result<Zeroizing<Vec<u8>>, KeyProviderError> {
        match self {
            KeyProvider::Armored(p) => p.export_private_key(pair),
            KeyProvider::Raw(p) => p.export_private_key(pair),
        }
    }

    pub fn export_public_key(&self, pair: &KeyPair) -> Result<Vec<u8>, KeyProviderError> {
        match self {
            KeyProvider::Armored(p) => p.export_public_key(pair),
            KeyProvider::Raw(p) => p.export_public_key(pair),
        }
    }

    pub fn import_private_key(&self, bytes: &[u8]) -> Result<RsaPrivateKey, KeyProviderError> {
        match self {
            KeyProvider::Armored(p) => Ok(p.import_private_key(bytes)?.into_key()),
            KeyProvider::Raw(p) => p.import_private_key(bytes),
        }
    }

    pub fn import_public_key(&self, bytes: &[u8]) -> Result<RsaPublicKey, KeyProviderError> {
        match self {
            KeyProvider::Armored(p) => Ok(p.import_public_key(bytes)?.into_key()),
            KeyProvider::Raw(p) => p.import_public_key(bytes),
        }
    }

    pub fn encrypt(&self, message: &[u8], public_key: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        match self {
            KeyProvider::Armored(p) => p.encrypt(message, public_key),
            KeyProvider::Raw(p) => p.encrypt(message, public_key),
        }
    }

    pub fn decrypt(
        &self,
        envelope: &[u8],
        private_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KeyProviderError> {
        match self {
            KeyProvider::Armored(p) => p.decrypt(envelope, private_key),
            KeyProvider::Raw(p) => p.decrypt(envelope, private_key),
        }
    }
}
