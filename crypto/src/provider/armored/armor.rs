//! ASCII armor (RFC 4880 §6.2): type header, base64 body, CRC-24 trailer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use zeroize::Zeroizing;

pub const PRIVATE_KEY_BLOCK: &str = "PGP PRIVATE KEY BLOCK";
pub const PUBLIC_KEY_BLOCK: &str = "PGP PUBLIC KEY BLOCK";
pub const ENCRYPTED_BLOCK: &str = "ENCRYPTED";

const LINE_LEN: usize = 64;
const CRC24_INIT: u32 = 0x00b7_04ce;
const CRC24_POLY: u32 = 0x0186_4cfb;

#[derive(Debug, Error)]
pub enum ArmorError {
    #[error("no armor header line")]
    MissingHeader,

    #[error("no armor footer for {0:?}")]
    MissingFooter(String),

    #[error("armor footer {found:?} does not match header {expected:?}")]
    FooterMismatch { expected: String, found: String },

    #[error("invalid base64 in armor: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("armor checksum mismatch")]
    Checksum,

    #[error("armor is not UTF-8 text")]
    NotText,
}

/// Decoded armor block. The body may hold secret key packets.
pub struct Block {
    pub block_type: String,
    pub body: Zeroizing<Vec<u8>>,
}

pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= (byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00ff_ffff
}

pub fn encode(block_type: &str, body: &[u8]) -> Zeroizing<String> {
    let encoded = Zeroizing::new(STANDARD.encode(body));
    let checksum = crc24(body).to_be_bytes();

    let mut out = Zeroizing::new(String::with_capacity(encoded.len() + 128));
    out.push_str("-----BEGIN ");
    out.push_str(block_type);
    out.push_str("-----\n\n");

    for line in encoded.as_bytes().chunks(LINE_LEN) {
        out.extend(line.iter().map(|&b| b as char));
        out.push('\n');
    }

    out.push('=');
    out.push_str(&STANDARD.encode(&checksum[1..]));
    out.push('\n');
    out.push_str("-----END ");
    out.push_str(block_type);
    out.push_str("-----\n");
    out
}

pub fn decode(input: &[u8]) -> Result<Block, ArmorError> {
    let text = std::str::from_utf8(input).map_err(|_| ArmorError::NotText)?;
    let mut lines = text.lines().map(str::trim_end);

    let block_type = loop {
        match lines.next() {
            Some(line) => {
                if let Some(t) = boundary(line, "-----BEGIN ") {
                    break t.to_string();
                }
            }
            None => return Err(ArmorError::MissingHeader),
        }
    };

    let mut body = Zeroizing::new(String::new());
    let mut checksum = None;
    let mut footer = None;
    let mut in_headers = true;

    for line in lines {
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            // "Key: Value" armor headers carry nothing we use
            if line.contains(": ") {
                continue;
            }
            in_headers = false;
        }

        if let Some(t) = boundary(line, "-----END ") {
            footer = Some(t.to_string());
            break;
        }
        if let Some(c) = line.strip_prefix('=') {
            checksum = Some(c.trim().to_string());
            continue;
        }
        body.push_str(line.trim());
    }

    match footer {
        None => return Err(ArmorError::MissingFooter(block_type)),
        Some(found) if found != block_type => {
            return Err(ArmorError::FooterMismatch {
                expected: block_type,
                found,
            })
        }
        Some(_) => {}
    }

    let data = Zeroizing::new(STANDARD.decode(body.as_bytes())?);

    if let Some(c) = checksum {
        let expected = STANDARD.decode(c.as_bytes())?;
        if expected.len() != 3 || expected[..] != crc24(&data).to_be_bytes()[1..] {
            return Err(ArmorError::Checksum);
        }
    }

    Ok(Block {
        block_type,
        body: data,
    })
}

fn boundary<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix("-----")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc24_known_value() {
        // CRC-24 of the empty input is the initial register
        assert_eq!(crc24(b""), 0x00b7_04ce);
        assert_eq!(crc24(b"123456789"), 0x0021_cf02);
    }

    #[test]
    fn test_layout() {
        let body: Vec<u8> = (0..=255u8).collect();
        let armored = encode(ENCRYPTED_BLOCK, &body);

        let lines: Vec<&str> = armored.lines().collect();
        assert_eq!(lines[0], "-----BEGIN ENCRYPTED-----");
        assert_eq!(lines[1], "");
        assert!(lines[2..lines.len() - 2].iter().all(|l| l.len() <= LINE_LEN));
        assert!(lines[lines.len() - 2].starts_with('='));
        assert_eq!(lines[lines.len() - 1], "-----END ENCRYPTED-----");

        let block = decode(armored.as_bytes()).unwrap();
        assert_eq!(block.block_type, ENCRYPTED_BLOCK);
        assert_eq!(&block.body[..], &body[..]);
    }

    #[test]
    fn test_decode_with_headers_and_crlf() {
        let armored = encode(PUBLIC_KEY_BLOCK, b"hello armor");
        let with_headers = armored
            .replacen("-----\n\n", "-----\nVersion: test\nComment: x\n\n", 1)
            .replace('\n', "\r\n");

        let block = decode(with_headers.as_bytes()).unwrap();
        assert_eq!(block.block_type, PUBLIC_KEY_BLOCK);
        assert_eq!(&block.body[..], b"hello armor");
    }

    #[test]
    fn test_checksum_mismatch() {
        let armored = encode(PUBLIC_KEY_BLOCK, b"hello armor");
        let tampered = armored.replace("aGVsbG8", "aGVsbG9");
        assert!(matches!(
            decode(tampered.as_bytes()),
            Err(ArmorError::Checksum)
        ));
    }

    #[test]
    fn test_footer_mismatch() {
        let armored = encode(PUBLIC_KEY_BLOCK, b"x");
        let broken = armored.replace("-----END PGP PUBLIC KEY BLOCK", "-----END PGP PRIVATE KEY BLOCK");
        assert!(matches!(
            decode(broken.as_bytes()),
            Err(ArmorError::FooterMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_boundaries() {
        assert!(matches!(decode(b"just text"), Err(ArmorError::MissingHeader)));
        assert!(matches!(
            decode(b"-----BEGIN ENCRYPTED-----\n\nAAAA\n"),
            Err(ArmorError::MissingFooter(_))
        ));
        assert!(matches!(decode(&[0xff, 0xfe]), Err(ArmorError::NotText)));
    }
}
