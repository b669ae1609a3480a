//! OpenPGP-style provider: armored key packets and `ENCRYPTED` envelopes.
//!
//! Keys are exported as a single V4 key packet stamped with the export
//! time, so exporting the same key twice yields different bytes (and a
//! different key id). Decryption copes with that by falling back to trial
//! decryption when no recipient key id matches.

pub mod armor;
pub mod identity;
pub mod key;
pub mod message;
pub mod packet;

use super::{KeyPair, KeyProviderError, KeyScheme, RsaKeyProvider};
use armor::{ENCRYPTED_BLOCK, PRIVATE_KEY_BLOCK, PUBLIC_KEY_BLOCK};
use identity::Identity;
use key::{now_timestamp, PublicKeyPacket, SecretKeyPacket};
use packet::{write_packet, PacketReader, TAG_PUBLIC_KEY, TAG_SECRET_KEY};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, Default)]
pub struct ArmoredEnvelopeProvider;

impl ArmoredEnvelopeProvider {
    pub fn new() -> Self {
        Self
    }

    /// Export the private key with an explicit creation timestamp.
    pub fn export_private_key_at(
        &self,
        pair: &KeyPair,
        created: u32,
    ) -> Result<Zeroizing<Vec<u8>>, KeyProviderError> {
        let packet = SecretKeyPacket::new(pair.private_key().clone(), created);
        let body = packet
            .to_bytes()
            .map_err(|e| KeyProviderError::InvalidKeyFormat(e.to_string()))?;

        let mut packets = Zeroizing::new(Vec::new());
        write_packet(&mut packets, TAG_SECRET_KEY, &body);

        let armored = armor::encode(PRIVATE_KEY_BLOCK, &packets);
        Ok(Zeroizing::new(armored.as_bytes().to_vec()))
    }

    /// Export the public key with an explicit creation timestamp.
    pub fn export_public_key_at(&self, pair: &KeyPair, created: u32) -> Vec<u8> {
        let packet = PublicKeyPacket::new(pair.public_key().clone(), created);
        let mut packets = Vec::new();
        write_packet(&mut packets, TAG_PUBLIC_KEY, &packet.to_bytes());

        armor::encode(PUBLIC_KEY_BLOCK, &packets).as_bytes().to_vec()
    }
}

/// Decode an armored key block and return the body of its first packet,
/// which must carry `tag`. Trailing packets (user ids, signatures) are ignored.
fn first_key_packet(
    bytes: &[u8],
    block_type: &str,
    tag: u8,
) -> Result<Zeroizing<Vec<u8>>, KeyProviderError> {
    let block = armor::decode(bytes).map_err(|e| KeyProviderError::InvalidKeyFormat(e.to_string()))?;
    if block.block_type != block_type {
        return Err(KeyProviderError::InvalidKeyFormat(format!(
            "expected a {:?} block, found {:?}",
            block_type, block.block_type
        )));
    }

    let packet = PacketReader::new(&block.body)
        .next()
        .ok_or_else(|| KeyProviderError::InvalidKeyFormat("empty key block".to_string()))?
        .map_err(|e| KeyProviderError::InvalidKeyFormat(e.to_string()))?;

    if packet.tag != tag {
        return Err(KeyProviderError::InvalidKeyFormat(format!(
            "expected key packet tag {}, found {}",
            tag, packet.tag
        )));
    }
    Ok(Zeroizing::new(packet.body))
}

impl RsaKeyProvider for ArmoredEnvelopeProvider {
    type PrivateKey = SecretKeyPacket;
    type PublicKey = PublicKeyPacket;

    fn scheme(&self) -> KeyScheme {
        KeyScheme::Armored
    }

    fn export_private_key(&self, pair: &KeyPair) -> Result<Zeroizing<Vec<u8>>, KeyProviderError> {
        self.export_private_key_at(pair, now_timestamp())
    }

    fn export_public_key(&self, pair: &KeyPair) -> Result<Vec<u8>, KeyProviderError> {
        Ok(self.export_public_key_at(pair, now_timestamp()))
    }

    fn import_private_key(&self, bytes: &[u8]) -> Result<SecretKeyPacket, KeyProviderError> {
        let body = first_key_packet(bytes, PRIVATE_KEY_BLOCK, TAG_SECRET_KEY)?;
        SecretKeyPacket::parse(&body).map_err(|e| KeyProviderError::InvalidKeyFormat(e.to_string()))
    }

    fn import_public_key(&self, bytes: &[u8]) -> Result<PublicKeyPacket, KeyProviderError> {
        let body = first_key_packet(bytes, PUBLIC_KEY_BLOCK, TAG_PUBLIC_KEY)?;
        PublicKeyPacket::parse(&body).map_err(|e| KeyProviderError::InvalidKeyFormat(e.to_string()))
    }

    fn encrypt(&self, message: &[u8], public_key: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        let now = now_timestamp();
        let identity = Identity::from_public(self.import_public_key(public_key)?, now);

        let packets = message::encrypt(&identity, message, now)
            .map_err(|e| KeyProviderError::Encryption(e.to_string()))?;

        Ok(armor::encode(ENCRYPTED_BLOCK, &packets).as_bytes().to_vec())
    }

    fn decrypt(
        &self,
        envelope: &[u8],
        private_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KeyProviderError> {
        let identity = Identity::from_secret(self.import_private_key(private_key)?, now_timestamp());

        let block = armor::decode(envelope).map_err(|e| KeyProviderError::Decryption(e.to_string()))?;
        if block.block_type != ENCRYPTED_BLOCK {
            return Err(KeyProviderError::EnvelopeTypeMismatch {
                expected: ENCRYPTED_BLOCK.to_string(),
                found: block.block_type,
            });
        }

        let plaintext = message::decrypt(&identity, &block.body)
            .map_err(|e| KeyProviderError::Decryption(e.to_string()))?;

        log::debug!("Decrypted {}-byte envelope", envelope.len());
        Ok(plaintext)
    }
}
