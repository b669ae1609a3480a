//! Public-key encrypted messages (RFC 4880 §5.1, §5.13, §5.14).
//!
//! Layout produced by [`encrypt`]:
//!
//! ```text
//! PKESK(v3, recipient key id, RSA(sym algo | session key | checksum))
//! SEIPD(v1, AES-256-CFB(prefix | Compressed(ZLIB, Literal('b', msg)) | MDC))
//! ```

use super::identity::{
    Identity, COMPRESSION_NONE, COMPRESSION_ZIP, COMPRESSION_ZLIB, SYM_AES128, SYM_AES192,
    SYM_AES256,
};
use super::key::{KeyId, PublicKeyPacket, ALGO_RSA};
use super::packet::{
    checksum16, write_mpi, write_packet, Cursor, PacketError, PacketReader, TAG_COMPRESSED,
    TAG_LITERAL, TAG_MARKER, TAG_MDC, TAG_ONE_PASS_SIGNATURE, TAG_PKESK, TAG_SED, TAG_SEIPD,
    TAG_SIGNATURE,
};
use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use sha1::{Digest, Sha1};
use std::io::{Read, Write};
use thiserror::Error;
use zeroize::Zeroizing;

/// Upper bound on decompressed message size.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// Literal packet overhead inside the compressed stream: a five-octet
/// length header plus format, name length and date.
const LITERAL_OVERHEAD: usize = 6 + 6;

/// Largest plaintext whose literal packet still decompresses under
/// [`MAX_MESSAGE_LEN`].
pub const MAX_PLAINTEXT_LEN: usize = MAX_MESSAGE_LEN - LITERAL_OVERHEAD;

const PKESK_VERSION: u8 = 3;
const SEIPD_VERSION: u8 = 1;
const AES_BLOCK: usize = 16;
const MDC_LEN: usize = 2 + 20;
const LITERAL_BINARY: u8 = b'b';
const MAX_NESTING: usize = 8;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("recipient has no usable encryption key")]
    NoEncryptionKey,

    #[error("no session key could be recovered with the given key")]
    NoSessionKey,

    #[error("message is not encrypted")]
    NotEncrypted,

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("unsupported {0}")]
    Unsupported(String),

    #[error("message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("{0}")]
    Crypto(String),
}

/// Encrypt `message` to the identity's current encryption key.
pub fn encrypt(identity: &Identity, message: &[u8], now: u32) -> Result<Vec<u8>, MessageError> {
    if message.len() > MAX_PLAINTEXT_LEN {
        return Err(MessageError::TooLarge(MAX_PLAINTEXT_LEN));
    }
    let recipient = identity
        .encryption_key(now)
        .ok_or(MessageError::NoEncryptionKey)?;
    let config = identity.config();
    if config.cipher != SYM_AES256 {
        return Err(MessageError::Unsupported(format!("cipher {}", config.cipher)));
    }
    if config.compression != COMPRESSION_ZLIB {
        return Err(MessageError::Unsupported(format!(
            "compression algorithm {}",
            config.compression
        )));
    }

    let mut session_key = Zeroizing::new([0u8; 32]);
    fill_random(&mut session_key[..])?;

    let mut out = Vec::new();
    write_packet(&mut out, TAG_PKESK, &pkesk_body(recipient, config.cipher, &session_key[..])?);

    // Compressed(Literal)
    let mut literal = Zeroizing::new(Vec::with_capacity(message.len() + LITERAL_OVERHEAD));
    literal.push(LITERAL_BINARY);
    literal.push(0); // file name length
    literal.extend_from_slice(&0u32.to_be_bytes());
    literal.extend_from_slice(message);
    let mut literal_packet = Zeroizing::new(Vec::new());
    write_packet(&mut literal_packet, TAG_LITERAL, &literal);

    let mut compressed = Zeroizing::new(vec![config.compression]);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(config.compression_level));
    encoder
        .write_all(&literal_packet)
        .map_err(|e| MessageError::Crypto(e.to_string()))?;
    let deflated = Zeroizing::new(
        encoder
            .finish()
            .map_err(|e| MessageError::Crypto(e.to_string()))?,
    );
    compressed.extend_from_slice(&deflated);

    // prefix | Compressed | MDC
    let mut plaintext = Zeroizing::new(Vec::with_capacity(deflated.len() + 64));
    let mut prefix = [0u8; AES_BLOCK + 2];
    fill_random(&mut prefix[..AES_BLOCK])?;
    prefix[AES_BLOCK] = prefix[AES_BLOCK - 2];
    prefix[AES_BLOCK + 1] = prefix[AES_BLOCK - 1];
    plaintext.extend_from_slice(&prefix);
    write_packet(&mut plaintext, TAG_COMPRESSED, &compressed);
    plaintext.extend_from_slice(&[0xc0 | TAG_MDC, 20]);
    let mdc = Sha1::digest(&plaintext[..]);
    plaintext.extend_from_slice(&mdc);

    let mut seipd = Vec::with_capacity(plaintext.len() + 1);
    seipd.push(SEIPD_VERSION);
    seipd.extend_from_slice(&plaintext);
    cfb_encrypt(&session_key[..], &mut seipd[1..])?;
    write_packet(&mut out, TAG_SEIPD, &seipd);

    log::debug!("Encrypted {} bytes to key {}", message.len(), recipient.key_id());
    Ok(out)
}

fn pkesk_body(
    recipient: &PublicKeyPacket,
    cipher: u8,
    session_key: &[u8],
) -> Result<Vec<u8>, MessageError> {
    let mut payload = Zeroizing::new(Vec::with_capacity(session_key.len() + 3));
    payload.push(cipher);
    payload.extend_from_slice(session_key);
    payload.extend_from_slice(&checksum16(session_key).to_be_bytes());

    let wrapped = recipient
        .key()
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, &payload)
        .map_err(|e| MessageError::Crypto(e.to_string()))?;

    let mut body = Vec::with_capacity(wrapped.len() + 12);
    body.push(PKESK_VERSION);
    body.extend_from_slice(&recipient.key_id().0);
    body.push(ALGO_RSA);
    write_mpi(&mut body, &wrapped);
    Ok(body)
}

struct Pkesk<'a> {
    key_id: KeyId,
    mpi: &'a [u8],
}

/// Decrypt a packet stream produced by [`encrypt`] (or any compatible sender).
/// Signatures inside the message are skipped, never verified.
pub fn decrypt(identity: &Identity, packets: &[u8]) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    let all: Vec<_> = PacketReader::new(packets).collect::<Result<_, _>>()?;

    let mut recipients = Vec::new();
    let mut seipd = None;
    for packet in &all {
        match packet.tag {
            TAG_PKESK => {
                if let Some(pkesk) = parse_pkesk(&packet.body)? {
                    recipients.push(pkesk);
                }
            }
            TAG_MARKER => {}
            TAG_SEIPD => {
                seipd = Some(&packet.body[..]);
                break;
            }
            TAG_LITERAL | TAG_COMPRESSED | TAG_ONE_PASS_SIGNATURE | TAG_SIGNATURE => {
                return Err(MessageError::NotEncrypted)
            }
            TAG_SED => {
                return Err(MessageError::Unsupported(
                    "symmetrically encrypted data without integrity protection".to_string(),
                ))
            }
            other => return Err(PacketError::UnexpectedTag(other).into()),
        }
    }
    let seipd = seipd.ok_or(MessageError::NotEncrypted)?;

    let keys = identity.decryption_keys();
    if keys.is_empty() {
        return Err(MessageError::NoSessionKey);
    }

    // Matching key ids first, then wildcards, then everything else: the key
    // id changes whenever a key is re-exported with a new timestamp.
    let rank = |p: &Pkesk<'_>| {
        if keys.iter().any(|(id, _)| *id == p.key_id) {
            0
        } else if p.key_id.is_wildcard() {
            1
        } else {
            2
        }
    };
    recipients.sort_by_key(|p| rank(p));

    for pkesk in &recipients {
        for (_, key) in &keys {
            let (algo, session_key) = match unwrap_session_key(key, pkesk.mpi) {
                Some(unwrapped) => unwrapped,
                None => continue,
            };
            match decrypt_seipd(algo, &session_key, seipd) {
                Ok(plaintext) => {
                    let body = &plaintext[AES_BLOCK + 2..plaintext.len() - MDC_LEN];
                    return read_payload(body, 0);
                }
                Err(MessageError::NoSessionKey) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    Err(MessageError::NoSessionKey)
}

fn parse_pkesk(body: &[u8]) -> Result<Option<Pkesk<'_>>, MessageError> {
    let mut cursor = Cursor::new(body);
    let version = cursor.read_u8()?;
    if version != PKESK_VERSION {
        return Err(MessageError::Unsupported(format!("PKESK version {}", version)));
    }

    let mut id = [0u8; 8];
    id.copy_from_slice(cursor.take(8)?);
    let algo = cursor.read_u8()?;
    if !matches!(algo, 1 | 2) {
        // addressed to a non-RSA key; cannot be ours
        return Ok(None);
    }

    Ok(Some(Pkesk {
        key_id: KeyId(id),
        mpi: cursor.read_mpi()?,
    }))
}

/// RSA-unwrap `algo | key | checksum`. `None` means this key does not fit.
fn unwrap_session_key(key: &RsaPrivateKey, mpi: &[u8]) -> Option<(u8, Zeroizing<Vec<u8>>)> {
    let size = key.size();
    if mpi.len() > size {
        return None;
    }
    let mut padded = vec![0u8; size - mpi.len()];
    padded.extend_from_slice(mpi);

    let payload = Zeroizing::new(key.decrypt(Pkcs1v15Encrypt, &padded).ok()?);
    if payload.len() < 3 {
        return None;
    }

    let algo = payload[0];
    let key_len = match algo {
        SYM_AES128 => 16,
        SYM_AES192 => 24,
        SYM_AES256 => 32,
        _ => return None,
    };
    if payload.len() != key_len + 3 {
        return None;
    }

    let session_key = &payload[1..1 + key_len];
    let checksum = u16::from_be_bytes([payload[1 + key_len], payload[2 + key_len]]);
    if checksum != checksum16(session_key) {
        return None;
    }

    Some((algo, Zeroizing::new(session_key.to_vec())))
}

/// Decrypt and authenticate an SEIPD body. A failed quick check is reported
/// as `NoSessionKey` so the caller can try another candidate.
fn decrypt_seipd(
    algo: u8,
    session_key: &[u8],
    body: &[u8],
) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    let (&version, data) = body.split_first().ok_or(PacketError::Truncated)?;
    if version != SEIPD_VERSION {
        return Err(MessageError::Unsupported(format!("SEIPD version {}", version)));
    }
    if data.len() < AES_BLOCK + 2 + MDC_LEN {
        return Err(PacketError::Truncated.into());
    }

    let mut plaintext = Zeroizing::new(data.to_vec());
    cfb_decrypt(algo, session_key, &mut plaintext)?;

    if plaintext[AES_BLOCK - 2..AES_BLOCK] != plaintext[AES_BLOCK..AES_BLOCK + 2] {
        return Err(MessageError::NoSessionKey);
    }

    let (covered, mdc) = plaintext.split_at(plaintext.len() - 20);
    if covered[covered.len() - 2..] != [0xc0 | TAG_MDC, 20] {
        return Err(MessageError::Integrity("missing modification detection code".to_string()));
    }
    if Sha1::digest(covered)[..] != mdc[..] {
        return Err(MessageError::Integrity("modification detected".to_string()));
    }

    Ok(plaintext)
}

/// Walk decrypted packets down to the literal data.
fn read_payload(data: &[u8], depth: usize) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    if depth > MAX_NESTING {
        return Err(MessageError::Unsupported("compression nesting depth".to_string()));
    }

    for packet in PacketReader::new(data) {
        let packet = packet?;
        let body = Zeroizing::new(packet.body);
        match packet.tag {
            TAG_LITERAL => return read_literal(&body),
            TAG_COMPRESSED => {
                let inner = decompress(&body)?;
                return read_payload(&inner, depth + 1);
            }
            TAG_ONE_PASS_SIGNATURE | TAG_SIGNATURE | TAG_MARKER => {}
            other => return Err(PacketError::UnexpectedTag(other).into()),
        }
    }

    Err(PacketError::Malformed("no literal data in message".to_string()).into())
}

fn read_literal(body: &[u8]) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    let mut cursor = Cursor::new(body);
    let _format = cursor.read_u8()?;
    let name_len = cursor.read_u8()? as usize;
    cursor.take(name_len)?;
    let _date = cursor.read_u32()?;
    Ok(Zeroizing::new(cursor.rest().to_vec()))
}

fn decompress(body: &[u8]) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    let (&algo, data) = body.split_first().ok_or(PacketError::Truncated)?;
    let mut out = Zeroizing::new(Vec::new());
    let limit = MAX_MESSAGE_LEN as u64 + 1;

    let read = match algo {
        COMPRESSION_NONE => {
            out.extend_from_slice(data);
            Ok(data.len())
        }
        COMPRESSION_ZIP => DeflateDecoder::new(data).take(limit).read_to_end(&mut out),
        COMPRESSION_ZLIB => ZlibDecoder::new(data).take(limit).read_to_end(&mut out),
        other => return Err(MessageError::Unsupported(format!("compression algorithm {}", other))),
    };
    read.map_err(|e| PacketError::Malformed(format!("decompression failed: {}", e)))?;

    if out.len() > MAX_MESSAGE_LEN {
        return Err(MessageError::TooLarge(MAX_MESSAGE_LEN));
    }
    Ok(out)
}

fn fill_random(buf: &mut [u8]) -> Result<(), MessageError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| MessageError::Crypto(e.to_string()))
}

fn cfb_encrypt(key: &[u8], buf: &mut [u8]) -> Result<(), MessageError> {
    cfb_mode::Encryptor::<Aes256>::new_from_slices(key, &[0u8; AES_BLOCK])
        .map_err(|e| MessageError::Crypto(e.to_string()))?
        .encrypt(buf);
    Ok(())
}

fn cfb_decrypt(algo: u8, key: &[u8], buf: &mut [u8]) -> Result<(), MessageError> {
    let iv = [0u8; AES_BLOCK];
    let invalid = |e: cfb_mode::cipher::InvalidLength| MessageError::Crypto(e.to_string());
    match algo {
        SYM_AES128 => cfb_mode::Decryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(invalid)?
            .decrypt(buf),
        SYM_AES192 => cfb_mode::Decryptor::<Aes192>::new_from_slices(key, &iv)
            .map_err(invalid)?
            .decrypt(buf),
        SYM_AES256 => cfb_mode::Decryptor::<Aes256>::new_from_slices(key, &iv)
            .map_err(invalid)?
            .decrypt(buf),
        other => return Err(MessageError::Unsupported(format!("cipher {}", other))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::armored::key::SecretKeyPacket;
    use crate::provider::KeyPair;

    const NOW: u32 = 1_700_000_000;

    fn secret(created: u32) -> SecretKeyPacket {
        let pair = KeyPair::generate(1024).unwrap();
        SecretKeyPacket::new(pair.private_key().clone(), created)
    }

    fn tags(data: &[u8]) -> Vec<u8> {
        PacketReader::new(data).map(|p| p.unwrap().tag).collect()
    }

    #[test]
    fn test_round_trip_and_layout() {
        let key = secret(NOW);
        let sender = Identity::from_public(key.public().clone(), NOW);
        let receiver = Identity::from_secret(key, NOW);

        let message = b"attack at dawn".repeat(50);
        let packets = encrypt(&sender, &message, NOW).unwrap();
        assert_eq!(tags(&packets), vec![TAG_PKESK, TAG_SEIPD]);

        let first = PacketReader::new(&packets).next().unwrap().unwrap();
        assert_eq!(first.body[0], PKESK_VERSION);
        assert_eq!(&first.body[1..9], &sender.primary().key_id().0);

        assert_eq!(&decrypt(&receiver, &packets).unwrap()[..], &message[..]);
    }

    #[test]
    fn test_empty_message() {
        let key = secret(NOW);
        let packets = encrypt(&Identity::from_public(key.public().clone(), NOW), b"", NOW).unwrap();
        assert!(decrypt(&Identity::from_secret(key, NOW), &packets).unwrap().is_empty());
    }

    #[test]
    fn test_key_id_mismatch_falls_back_to_trial() {
        let private = KeyPair::generate(1024).unwrap().private_key().clone();
        let sender = Identity::from_public(
            SecretKeyPacket::new(private.clone(), NOW).public().clone(),
            NOW,
        );
        // Same key exported at a later time: different key id
        let receiver = Identity::from_secret(SecretKeyPacket::new(private, NOW + 60), NOW + 60);
        assert_ne!(sender.primary().key_id(), receiver.primary().key_id());

        let packets = encrypt(&sender, b"re-exported", NOW).unwrap();
        assert_eq!(&decrypt(&receiver, &packets).unwrap()[..], b"re-exported");
    }

    #[test]
    fn test_wrong_key() {
        let a = secret(NOW);
        let b = secret(NOW);
        let packets = encrypt(&Identity::from_public(a.public().clone(), NOW), b"hi", NOW).unwrap();

        assert!(matches!(
            decrypt(&Identity::from_secret(b, NOW), &packets),
            Err(MessageError::NoSessionKey)
        ));
    }

    #[test]
    fn test_public_identity_cannot_decrypt() {
        let key = secret(NOW);
        let public = Identity::from_public(key.public().clone(), NOW);
        let packets = encrypt(&public, b"hi", NOW).unwrap();
        assert!(matches!(decrypt(&public, &packets), Err(MessageError::NoSessionKey)));
    }

    #[test]
    fn test_tampering_detected() {
        let key = secret(NOW);
        let mut packets =
            encrypt(&Identity::from_public(key.public().clone(), NOW), b"integrity", NOW).unwrap();
        let last = packets.len() - 1;
        packets[last] ^= 0x80;

        assert!(matches!(
            decrypt(&Identity::from_secret(key, NOW), &packets),
            Err(MessageError::Integrity(_))
        ));
    }

    #[test]
    fn test_expired_recipient() {
        let key = secret(NOW);
        let sender = Identity::from_public(key.public().clone(), NOW);
        let later = NOW + 366 * 86_400;
        assert!(matches!(
            encrypt(&sender, b"late", later),
            Err(MessageError::NoEncryptionKey)
        ));

        // A fresh identity over the same key binds the subkey anew
        let rebound = Identity::from_public(key.public().clone(), later);
        let data = encrypt(&rebound, b"late", later).unwrap();
        let receiver = Identity::from_secret(key, later);
        assert_eq!(&decrypt(&receiver, &data).unwrap()[..], b"late");
    }

    #[test]
    fn test_oversized_message_rejected_before_encrypting() {
        let key = secret(NOW);
        let sender = Identity::from_public(key.public().clone(), NOW);

        let message = vec![0u8; MAX_PLAINTEXT_LEN + 1];
        assert!(matches!(
            encrypt(&sender, &message, NOW),
            Err(MessageError::TooLarge(MAX_PLAINTEXT_LEN))
        ));
    }

    #[test]
    fn test_largest_literal_fits_decompression_cap() {
        let mut literal = vec![LITERAL_BINARY, 0, 0, 0, 0, 0];
        literal.resize(6 + MAX_PLAINTEXT_LEN, 0);
        let mut packet = Vec::new();
        write_packet(&mut packet, TAG_LITERAL, &literal);
        assert_eq!(packet.len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_plain_literal_rejected() {
        let key = secret(NOW);
        let mut packets = Vec::new();
        write_packet(&mut packets, TAG_LITERAL, b"b\x00\x00\x00\x00\x00plain");

        assert!(matches!(
            decrypt(&Identity::from_secret(key, NOW), &packets),
            Err(MessageError::NotEncrypted)
        ));
    }

    #[test]
    fn test_payload_skips_signatures() {
        let mut inner = Vec::new();
        write_packet(&mut inner, TAG_ONE_PASS_SIGNATURE, &[3, 0, 8, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        write_packet(&mut inner, TAG_LITERAL, b"b\x04name\x00\x00\x00\x00signed");
        write_packet(&mut inner, TAG_SIGNATURE, &[4, 0]);

        assert_eq!(&read_payload(&inner, 0).unwrap()[..], b"signed");
    }

    #[test]
    fn test_uncompressed_and_zip() {
        let mut literal = Vec::new();
        write_packet(&mut literal, TAG_LITERAL, b"b\x00\x00\x00\x00\x00raw");

        let mut stored = vec![COMPRESSION_NONE];
        stored.extend_from_slice(&literal);
        assert_eq!(&decompress(&stored).unwrap()[..], &literal[..]);

        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&literal).unwrap();
        let mut zip = vec![COMPRESSION_ZIP];
        zip.extend_from_slice(&encoder.finish().unwrap());
        assert_eq!(&decompress(&zip).unwrap()[..], &literal[..]);

        assert!(matches!(decompress(&[3, 0, 0]), Err(MessageError::Unsupported(_))));
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = Vec::new();
        write_packet(&mut data, TAG_LITERAL, b"b\x00\x00\x00\x00\x00deep");
        for _ in 0..=MAX_NESTING + 1 {
            let mut body = vec![COMPRESSION_NONE];
            body.extend_from_slice(&data);
            data.clear();
            write_packet(&mut data, TAG_COMPRESSED, &body);
        }

        assert!(matches!(read_payload(&data, 0), Err(MessageError::Unsupported(_))));
    }
}
