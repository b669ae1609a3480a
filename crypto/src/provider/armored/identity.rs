//! Ephemeral OpenPGP identity built around a single RSA key.
//!
//! Nothing here is serialized. The identity only exists so that key
//! selection for encryption follows the usual rules: a subkey whose binding
//! carries encryption flags and whose lifetime has not run out. The user id
//! is empty and the self-certification does not mark it primary.

use super::key::{KeyId, PublicKeyPacket, SecretKeyPacket};
use rsa::RsaPrivateKey;

pub const SIG_TYPE_POSITIVE_CERT: u8 = 0x13;
pub const SIG_TYPE_SUBKEY_BINDING: u8 = 0x18;

pub const FLAG_CERTIFY: u8 = 0x01;
pub const FLAG_SIGN: u8 = 0x02;
pub const FLAG_ENCRYPT_COMMS: u8 = 0x04;
pub const FLAG_ENCRYPT_STORAGE: u8 = 0x08;

pub const SYM_AES128: u8 = 7;
pub const SYM_AES192: u8 = 8;
pub const SYM_AES256: u8 = 9;
pub const HASH_SHA256: u8 = 8;
pub const COMPRESSION_NONE: u8 = 0;
pub const COMPRESSION_ZIP: u8 = 1;
pub const COMPRESSION_ZLIB: u8 = 2;

/// Validity window of the encryption subkey, counted from its binding.
pub const SUBKEY_LIFETIME_SECS: u32 = 86_400 * 365;

/// Algorithms used when producing an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeConfig {
    pub cipher: u8,
    pub(crate) hash: u8,
    pub compression: u8,
    pub compression_level: u32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            cipher: SYM_AES256,
            hash: HASH_SHA256,
            compression: COMPRESSION_ZLIB,
            compression_level: 9,
        }
    }
}

/// Self-signature metadata binding a user id or subkey to the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub(crate) sig_type: u8,
    pub created: u32,
    pub(crate) hash: u8,
    pub flags: u8,
    pub(crate) issuer: KeyId,
    pub(crate) preferred_hashes: Vec<u8>,
    pub key_lifetime: Option<u32>,
}

impl Binding {
    pub fn can_encrypt(&self) -> bool {
        self.flags & (FLAG_ENCRYPT_COMMS | FLAG_ENCRYPT_STORAGE) != 0
    }
}

#[derive(Debug, Clone)]
pub struct Subkey {
    pub public: PublicKeyPacket,
    pub binding: Binding,
}

impl Subkey {
    /// True once `now` is past the binding time plus the bound lifetime.
    pub fn is_expired(&self, now: u32) -> bool {
        match self.binding.key_lifetime {
            Some(lifetime) => now as u64 > self.binding.created as u64 + lifetime as u64,
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct Identity {
    primary: PublicKeyPacket,
    secret: Option<SecretKeyPacket>,
    self_signature: Binding,
    subkeys: Vec<Subkey>,
    config: EnvelopeConfig,
}

impl Identity {
    pub fn from_public(primary: PublicKeyPacket, now: u32) -> Self {
        Self::build(primary, None, now)
    }

    pub fn from_secret(secret: SecretKeyPacket, now: u32) -> Self {
        let primary = secret.public().clone();
        Self::build(primary, Some(secret), now)
    }

    fn build(primary: PublicKeyPacket, secret: Option<SecretKeyPacket>, now: u32) -> Self {
        let config = EnvelopeConfig::default();
        let issuer = primary.key_id();

        let self_signature = Binding {
            sig_type: SIG_TYPE_POSITIVE_CERT,
            created: now,
            hash: config.hash,
            flags: FLAG_SIGN | FLAG_CERTIFY,
            issuer,
            preferred_hashes: Vec::new(),
            key_lifetime: None,
        };

        // Same key material doubles as the encryption subkey
        let subkey = Subkey {
            public: primary.clone(),
            binding: Binding {
                sig_type: SIG_TYPE_SUBKEY_BINDING,
                created: now,
                hash: config.hash,
                flags: FLAG_ENCRYPT_STORAGE | FLAG_ENCRYPT_COMMS,
                issuer,
                preferred_hashes: vec![HASH_SHA256],
                key_lifetime: Some(SUBKEY_LIFETIME_SECS),
            },
        };

        Self {
            primary,
            secret,
            self_signature,
            subkeys: vec![subkey],
            config,
        }
    }

    pub fn primary(&self) -> &PublicKeyPacket {
        &self.primary
    }

    pub fn subkeys(&self) -> &[Subkey] {
        &self.subkeys
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// A binding counts only if the primary key issued it with the
    /// expected type and the configured hash.
    fn honours(&self, binding: &Binding, sig_type: u8) -> bool {
        binding.sig_type == sig_type
            && binding.issuer == self.primary.key_id()
            && binding.hash == self.config.hash
            && (binding.preferred_hashes.is_empty()
                || binding.preferred_hashes.contains(&self.config.hash))
    }

    fn bound_for_encryption(&self) -> impl Iterator<Item = &Subkey> {
        let certified = self.honours(&self.self_signature, SIG_TYPE_POSITIVE_CERT);
        self.subkeys
            .iter()
            .filter(move |s| {
                certified
                    && self.honours(&s.binding, SIG_TYPE_SUBKEY_BINDING)
                    && s.binding.can_encrypt()
            })
    }

    /// Newest unexpired subkey bound for encryption.
    pub fn encryption_key(&self, now: u32) -> Option<&PublicKeyPacket> {
        self.bound_for_encryption()
            .filter(|s| !s.is_expired(now))
            .max_by_key(|s| s.binding.created)
            .map(|s| &s.public)
    }

    /// Key ids and private keys usable for unwrapping session keys.
    /// Expiry is not checked on this side.
    pub fn decryption_keys(&self) -> Vec<(KeyId, &RsaPrivateKey)> {
        let secret = match &self.secret {
            Some(secret) => secret,
            None => return Vec::new(),
        };

        self.bound_for_encryption()
            .map(|s| (s.public.key_id(), secret.key()))
            .collect()
    }
}
