//! OpenPGP packet framing (RFC 4880 §4) and multiprecision integers.

use thiserror::Error;

pub const TAG_PKESK: u8 = 1;
pub const TAG_SIGNATURE: u8 = 2;
pub const TAG_ONE_PASS_SIGNATURE: u8 = 4;
pub const TAG_SECRET_KEY: u8 = 5;
pub const TAG_PUBLIC_KEY: u8 = 6;
pub const TAG_SECRET_SUBKEY: u8 = 7;
pub const TAG_COMPRESSED: u8 = 8;
pub const TAG_SED: u8 = 9;
pub const TAG_MARKER: u8 = 10;
pub const TAG_LITERAL: u8 = 11;
pub const TAG_TRUST: u8 = 12;
pub const TAG_USER_ID: u8 = 13;
pub const TAG_PUBLIC_SUBKEY: u8 = 14;
pub const TAG_SEIPD: u8 = 18;
pub const TAG_MDC: u8 = 19;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("truncated packet data")]
    Truncated,

    #[error("malformed packet header")]
    BadHeader,

    #[error("unexpected packet tag {0}")]
    UnexpectedTag(u8),

    #[error("unsupported {0}")]
    Unsupported(String),

    #[error("secret key material is passphrase-protected")]
    EncryptedSecretKey,

    #[error("secret key checksum mismatch")]
    Checksum,

    #[error("{0}")]
    Malformed(String),
}

/// One packet: tag plus body, partial-length chunks already joined.
#[derive(Debug)]
pub struct Packet {
    pub tag: u8,
    pub body: Vec<u8>,
}

/// Append a new-format packet.
pub fn write_packet(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(0xc0 | tag);
    write_length(out, body.len());
    out.extend_from_slice(body);
}

/// New-format body length. Callers keep bodies under 4 GiB; message
/// encryption enforces a far smaller cap before anything is framed.
fn write_length(out: &mut Vec<u8>, len: usize) {
    debug_assert!(
        len <= u32::MAX as usize,
        "packet body of {} bytes exceeds a five-octet length",
        len
    );
    if len < 192 {
        out.push(len as u8);
    } else if len < 8384 {
        let l = len - 192;
        out.push(((l >> 8) as u8) + 192);
        out.push(l as u8);
    } else {
        out.push(0xff);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

/// Append an MPI: bit count, then the big-endian magnitude without leading zeros.
pub fn write_mpi(out: &mut Vec<u8>, be_bytes: &[u8]) {
    let start = be_bytes.iter().position(|&b| b != 0).unwrap_or(be_bytes.len());
    let bytes = &be_bytes[start..];
    let bits = match bytes.first() {
        Some(&first) => (bytes.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    };
    out.extend_from_slice(&(bits as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Byte reader over a packet body.
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        let end = self.pos.checked_add(n).ok_or(PacketError::Truncated)?;
        if end > self.data.len() {
            return Err(PacketError::Truncated);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    /// Read an MPI, returning its magnitude bytes.
    pub fn read_mpi(&mut self) -> Result<&'a [u8], PacketError> {
        let bits = self.read_u16()? as usize;
        self.take((bits + 7) / 8)
    }
}

/// Iterates over the packets of a byte stream. Accepts both header formats.
pub struct PacketReader<'a> {
    cursor: Cursor<'a>,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    fn read_packet(&mut self) -> Result<Packet, PacketError> {
        let header = self.cursor.read_u8()?;
        if header & 0x80 == 0 {
            return Err(PacketError::BadHeader);
        }

        if header & 0x40 != 0 {
            let tag = header & 0x3f;
            let mut body = Vec::new();
            loop {
                match self.new_length()? {
                    Length::Full(n) => {
                        body.extend_from_slice(self.cursor.take(n)?);
                        break;
                    }
                    Length::Partial(n) => body.extend_from_slice(self.cursor.take(n)?),
                }
            }
            Ok(Packet { tag, body })
        } else {
            let tag = (header >> 2) & 0x0f;
            let len = match header & 0x03 {
                0 => self.cursor.read_u8()? as usize,
                1 => self.cursor.read_u16()? as usize,
                2 => self.cursor.read_u32()? as usize,
                // indeterminate: runs to the end of the stream
                _ => self.cursor.remaining(),
            };
            Ok(Packet {
                tag,
                body: self.cursor.take(len)?.to_vec(),
            })
        }
    }

    fn new_length(&mut self) -> Result<Length, PacketError> {
        let first = self.cursor.read_u8()? as usize;
        Ok(match first {
            0..=191 => Length::Full(first),
            192..=223 => {
                let second = self.cursor.read_u8()? as usize;
                Length::Full(((first - 192) << 8) + second + 192)
            }
            224..=254 => Length::Partial(1 << (first & 0x1f)),
            _ => Length::Full(self.cursor.read_u32()? as usize),
        })
    }
}

enum Length {
    Full(usize),
    Partial(usize),
}

impl Iterator for PacketReader<'_> {
    type Item = Result<Packet, PacketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_empty() {
            return None;
        }
        let packet = self.read_packet();
        if packet.is_err() {
            // stop after the first framing error
            self.cursor.rest();
        }
        Some(packet)
    }
}

/// Sum of all octets mod 65536, as used for secret key and session key checks.
pub fn checksum16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(len: usize) {
        let body: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let mut out = Vec::new();
        write_packet(&mut out, TAG_LITERAL, &body);

        let packets: Vec<Packet> = PacketReader::new(&out).collect::<Result<_, _>>().unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].tag, TAG_LITERAL);
        assert_eq!(packets[0].body, body);
    }

    #[test]
    fn test_new_format_lengths() {
        for len in [0, 1, 191, 192, 8383, 8384, 70_000] {
            round_trip(len);
        }
    }

    #[test]
    fn test_length_encodings() {
        let mut out = Vec::new();
        write_packet(&mut out, TAG_MDC, &[0u8; 100]);
        assert_eq!(&out[..2], &[0xd3, 100]);

        let mut out = Vec::new();
        write_packet(&mut out, TAG_SEIPD, &[0u8; 1723]);
        assert_eq!(&out[..3], &[0xd2, 0xc5, 0xfb]);

        let mut out = Vec::new();
        write_packet(&mut out, TAG_SEIPD, &[0u8; 100_000]);
        assert_eq!(&out[..6], &[0xd2, 0xff, 0x00, 0x01, 0x86, 0xa0]);
    }

    #[test]
    fn test_largest_five_octet_length() {
        let mut out = Vec::new();
        write_length(&mut out, u32::MAX as usize);
        assert_eq!(out, vec![0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[cfg(all(debug_assertions, target_pointer_width = "64"))]
    #[test]
    #[should_panic(expected = "exceeds a five-octet length")]
    fn test_length_past_four_gib_is_refused() {
        write_length(&mut Vec::new(), u32::MAX as usize + 1);
    }

    #[test]
    fn test_old_format_header() {
        // tag 6, one-octet length
        let data = [0x98, 0x03, 1, 2, 3, 0x99, 0x00, 0x02, 9, 9];
        let packets: Vec<Packet> = PacketReader::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(packets[0].tag, TAG_PUBLIC_KEY);
        assert_eq!(packets[0].body, vec![1, 2, 3]);
        assert_eq!(packets[1].tag, TAG_PUBLIC_KEY);
        assert_eq!(packets[1].body, vec![9, 9]);
    }

    #[test]
    fn test_partial_lengths() {
        // 2-byte partial chunk, then final 3-byte chunk
        let data = [0xcb, 0xe1, 1, 2, 0x03, 3, 4, 5];
        let packets: Vec<Packet> = PacketReader::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(packets[0].tag, TAG_LITERAL);
        assert_eq!(packets[0].body, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_truncated_and_bad_header() {
        let mut out = Vec::new();
        write_packet(&mut out, TAG_LITERAL, &[1, 2, 3, 4]);
        out.truncate(4);

        let mut reader = PacketReader::new(&out);
        assert!(matches!(reader.next(), Some(Err(PacketError::Truncated))));
        assert!(reader.next().is_none());

        let mut reader = PacketReader::new(&[0x01, 0x00]);
        assert!(matches!(reader.next(), Some(Err(PacketError::BadHeader))));
    }

    #[test]
    fn test_mpi() {
        let mut out = Vec::new();
        write_mpi(&mut out, &[0x00, 0x00, 0x01, 0xff]);
        assert_eq!(out, vec![0x00, 0x09, 0x01, 0xff]);

        let mut cursor = Cursor::new(&out);
        assert_eq!(cursor.read_mpi().unwrap(), &[0x01, 0xff]);
        assert!(cursor.is_empty());

        let mut out = Vec::new();
        write_mpi(&mut out, &[0x00]);
        assert_eq!(out, vec![0x00, 0x00]);
    }

    #[test]
    fn test_checksum16_wraps() {
        assert_eq!(checksum16(&[0xff; 300]), (0xffu32 * 300 % 65536) as u16);
        assert_eq!(checksum16(&[]), 0);
    }
}
