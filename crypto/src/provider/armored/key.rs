//! Version 4 RSA key packets (RFC 4880 §5.5).

use super::packet::{checksum16, write_mpi, Cursor, PacketError};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use std::fmt;
use zeroize::Zeroizing;

pub const KEY_VERSION: u8 = 4;
/// RSA (encrypt or sign)
pub const ALGO_RSA: u8 = 1;
const ALGO_RSA_ENCRYPT_ONLY: u8 = 2;
const ALGO_RSA_SIGN_ONLY: u8 = 3;

/// S2K usage octet for unprotected secret material.
const S2K_USAGE_NONE: u8 = 0;

/// Seconds since the Unix epoch as a packet timestamp.
pub fn now_timestamp() -> u32 {
    chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Low 64 bits of a V4 fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(pub [u8; 8]);

impl KeyId {
    /// Recipient placeholder meaning "try every key".
    pub const WILDCARD: KeyId = KeyId([0u8; 8]);

    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPacket {
    created: u32,
    key: RsaPublicKey,
}

impl PublicKeyPacket {
    pub fn new(key: RsaPublicKey, created: u32) -> Self {
        Self { created, key }
    }

    pub fn created(&self) -> u32 {
        self.created
    }

    pub fn key(&self) -> &RsaPublicKey {
        &self.key
    }

    pub fn into_key(self) -> RsaPublicKey {
        self.key
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key.size() + 16);
        out.push(KEY_VERSION);
        out.extend_from_slice(&self.created.to_be_bytes());
        out.push(ALGO_RSA);
        write_mpi(&mut out, &self.key.n().to_bytes_be());
        write_mpi(&mut out, &self.key.e().to_bytes_be());
        out
    }

    pub fn fingerprint(&self) -> [u8; 20] {
        let body = self.to_bytes();
        let mut hasher = Sha1::new();
        hasher.update([0x99u8]);
        hasher.update((body.len() as u16).to_be_bytes());
        hasher.update(&body);

        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    pub fn key_id(&self) -> KeyId {
        let fp = self.fingerprint();
        let mut id = [0u8; 8];
        id.copy_from_slice(&fp[12..]);
        KeyId(id)
    }

    pub fn parse(body: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = Cursor::new(body);
        Self::read(&mut cursor)
    }

    fn read(cursor: &mut Cursor<'_>) -> Result<Self, PacketError> {
        let version = cursor.read_u8()?;
        if version != KEY_VERSION {
            return Err(PacketError::Unsupported(format!("key packet version {}", version)));
        }

        let created = cursor.read_u32()?;
        let algo = cursor.read_u8()?;
        if !matches!(algo, ALGO_RSA | ALGO_RSA_ENCRYPT_ONLY | ALGO_RSA_SIGN_ONLY) {
            return Err(PacketError::Unsupported(format!("public key algorithm {}", algo)));
        }

        let n = BigUint::from_bytes_be(cursor.read_mpi()?);
        let e = BigUint::from_bytes_be(cursor.read_mpi()?);
        let key = RsaPublicKey::new(n, e).map_err(|e| PacketError::Malformed(e.to_string()))?;

        Ok(Self { created, key })
    }
}

/// Unprotected secret key packet. The RSA key zeroizes on drop.
#[derive(Clone)]
pub struct SecretKeyPacket {
    public: PublicKeyPacket,
    key: RsaPrivateKey,
}

impl SecretKeyPacket {
    pub fn new(key: RsaPrivateKey, created: u32) -> Self {
        Self {
            public: PublicKeyPacket::new(key.to_public_key(), created),
            key,
        }
    }

    pub fn public(&self) -> &PublicKeyPacket {
        &self.public
    }

    pub fn key(&self) -> &RsaPrivateKey {
        &self.key
    }

    pub fn into_key(self) -> RsaPrivateKey {
        self.key
    }

    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, PacketError> {
        let primes = self.key.primes();
        if primes.len() != 2 {
            return Err(PacketError::Unsupported(format!("{}-prime RSA key", primes.len())));
        }
        // p < q, u = p^-1 mod q
        let (p, q) = if primes[0] < primes[1] {
            (&primes[0], &primes[1])
        } else {
            (&primes[1], &primes[0])
        };
        let u = Zeroizing::new(p.modpow(&(q - &BigUint::from(2u8)), q));

        let mut material = Zeroizing::new(Vec::new());
        write_mpi(&mut material, &Zeroizing::new(self.key.d().to_bytes_be()));
        write_mpi(&mut material, &Zeroizing::new(p.to_bytes_be()));
        write_mpi(&mut material, &Zeroizing::new(q.to_bytes_be()));
        write_mpi(&mut material, &Zeroizing::new(u.to_bytes_be()));

        let mut out = Zeroizing::new(self.public.to_bytes());
        out.push(S2K_USAGE_NONE);
        out.extend_from_slice(&material);
        out.extend_from_slice(&checksum16(&material).to_be_bytes());
        Ok(out)
    }

    pub fn parse(body: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = Cursor::new(body);
        let public = PublicKeyPacket::read(&mut cursor)?;

        if cursor.read_u8()? != S2K_USAGE_NONE {
            return Err(PacketError::EncryptedSecretKey);
        }

        let start = cursor.position();
        let d = cursor.read_mpi()?;
        let p = cursor.read_mpi()?;
        let q = cursor.read_mpi()?;
        cursor.read_mpi()?; // u is recomputed by the rsa crate
        let material = &body[start..cursor.position()];

        if cursor.read_u16()? != checksum16(material) {
            return Err(PacketError::Checksum);
        }

        let key = RsaPrivateKey::from_components(
            public.key.n().clone(),
            public.key.e().clone(),
            BigUint::from_bytes_be(d),
            vec![BigUint::from_bytes_be(p), BigUint::from_bytes_be(q)],
        )
        .map_err(|e| PacketError::Malformed(e.to_string()))?;
        key.validate()
            .map_err(|e| PacketError::Malformed(e.to_string()))?;

        Ok(Self { public, key })
    }
}

impl fmt::Debug for SecretKeyPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyPacket")
            .field("key_id", &self.public.key_id())
            .field("created", &self.public.created)
            .finish_non_exhaustive()
    }
}
