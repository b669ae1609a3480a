//! BIP-39 mnemonic support for HD wallets
//!
//! Turns entropy into an English seed phrase and stretches a phrase plus
//! passphrase into the 64-byte seed consumed by [`crate::hd`].

use crate::entropy::{EntropyError, EntropySource};
use bip39::{Language, Mnemonic};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Entropy sizes accepted by the encoder (12, 15, 18, 21 and 24 words).
pub const SUPPORTED_ENTROPY_BITS: [usize; 5] = [128, 160, 192, 224, 256];

/// Size of a BIP-39 seed.
pub const SEED_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum MnemonicError {
    #[error("Cannot encode mnemonic: {0}")]
    Encoding(String),

    #[error("Invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("Entropy error: {0}")]
    Entropy(#[from] EntropyError),
}

/// Stateless entropy <-> phrase <-> seed codec.
pub struct MnemonicCodec;

impl MnemonicCodec {
    /// Encode raw entropy as a checksummed English phrase.
    ///
    /// # Example
    /// ```
    /// use hdvault_crypto::mnemonic::MnemonicCodec;
    ///
    /// let phrase = MnemonicCodec::encode(&[0u8; 16]).unwrap();
    /// assert!(phrase.starts_with("abandon abandon"));
    /// assert!(phrase.ends_with("about"));
    /// ```
    pub fn encode(entropy: &[u8]) -> Result<Zeroizing<String>, MnemonicError> {
        let bits = entropy.len() * 8;
        if !SUPPORTED_ENTROPY_BITS.contains(&bits) {
            return Err(MnemonicError::Encoding(format!(
                "unsupported entropy size {} bits (expected one of {:?})",
                bits, SUPPORTED_ENTROPY_BITS
            )));
        }

        let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
            .map_err(|e| MnemonicError::Encoding(e.to_string()))?;

        Ok(Zeroizing::new(mnemonic.to_string()))
    }

    /// Draw `bits` of entropy from `source` and encode them.
    pub fn generate<E: EntropySource + ?Sized>(
        source: &E,
        bits: usize,
    ) -> Result<Zeroizing<String>, MnemonicError> {
        if !SUPPORTED_ENTROPY_BITS.contains(&bits) {
            return Err(MnemonicError::Encoding(format!(
                "unsupported entropy size {} bits",
                bits
            )));
        }

        let entropy = source.generate(bits)?;
        Self::encode(&entropy)
    }

    /// Check word list membership and the embedded checksum.
    pub fn validate(phrase: &str) -> Result<(), MnemonicError> {
        parse(phrase)?;
        Ok(())
    }

    /// Stretch a phrase into its 64-byte seed (PBKDF2-HMAC-SHA512, 2048 rounds).
    ///
    /// The phrase is validated first: a bad checksum is an error, never a seed.
    pub fn to_seed(
        phrase: &str,
        passphrase: &str,
    ) -> Result<Zeroizing<[u8; SEED_LEN]>, MnemonicError> {
        let mnemonic = parse(phrase)?;
        Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
    }
}

fn parse(phrase: &str) -> Result<Mnemonic, MnemonicError> {
    Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| MnemonicError::InvalidMnemonic(e.to_string()))
}

/// Validated seed phrase, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MnemonicPhrase {
    phrase: String,
}

impl MnemonicPhrase {
    /// Generate a new random phrase
    pub fn generate<E: EntropySource + ?Sized>(
        source: &E,
        bits: usize,
    ) -> Result<Self, MnemonicError> {
        let phrase = MnemonicCodec::generate(source, bits)?;
        Ok(Self {
            phrase: phrase.to_string(),
        })
    }

    /// Create from an existing phrase, kept verbatim
    pub fn from_phrase(phrase: &str) -> Result<Self, MnemonicError> {
        MnemonicCodec::validate(phrase)?;
        Ok(Self {
            phrase: phrase.to_string(),
        })
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split_whitespace().count()
    }

    pub fn to_seed(&self, passphrase: &str) -> Result<Zeroizing<[u8; SEED_LEN]>, MnemonicError> {
        MnemonicCodec::to_seed(&self.phrase, passphrase)
    }
}

impl std::fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MnemonicPhrase")
            .field("words", &self.word_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::OsEntropy;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_encode_known_entropy() {
        let phrase = MnemonicCodec::encode(&[0u8; 16]).unwrap();
        assert_eq!(phrase.as_str(), ABANDON_ABOUT);
    }

    #[test]
    fn test_encode_rejects_bad_length() {
        for len in [0usize, 8, 15, 17, 33] {
            let result = MnemonicCodec::encode(&vec![0u8; len]);
            assert!(
                matches!(result, Err(MnemonicError::Encoding(_))),
                "length {} accepted",
                len
            );
        }
    }

    #[test]
    fn test_generate_word_counts() {
        for (bits, words) in SUPPORTED_ENTROPY_BITS.iter().zip([12, 15, 18, 21, 24]) {
            let phrase = MnemonicCodec::generate(&OsEntropy, *bits).unwrap();
            assert_eq!(phrase.split_whitespace().count(), words);
            assert!(MnemonicCodec::validate(&phrase).is_ok());
        }
    }

    #[test]
    fn test_generate_rejects_unsupported_bits() {
        assert!(matches!(
            MnemonicCodec::generate(&OsEntropy, 64),
            Err(MnemonicError::Encoding(_))
        ));
    }

    #[test]
    fn test_trezor_seed_vector() {
        let seed = MnemonicCodec::to_seed(ABANDON_ABOUT, "TREZOR").unwrap();
        assert_eq!(
            hex::encode(&seed[..]),
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e53495531f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04"
        );
    }

    #[test]
    fn test_seed_is_deterministic() {
        let phrase = MnemonicCodec::generate(&OsEntropy, 256).unwrap();
        let a = MnemonicCodec::to_seed(&phrase, "Secret Passphrase").unwrap();
        let b = MnemonicCodec::to_seed(&phrase, "Secret Passphrase").unwrap();
        assert_eq!(*a, *b);

        let other = MnemonicCodec::to_seed(&phrase, "").unwrap();
        assert_ne!(*a, *other);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        // last word changed: words are valid, checksum is not
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(matches!(
            MnemonicCodec::to_seed(phrase, ""),
            Err(MnemonicError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_unknown_word_rejected() {
        let result =
            MnemonicCodec::validate("invalid word word word word word word word word word word word");
        assert!(matches!(result, Err(MnemonicError::InvalidMnemonic(_))));
    }

    #[test]
    fn test_mnemonic_phrase_wrapper() {
        let phrase = MnemonicPhrase::generate(&OsEntropy, 128).unwrap();
        assert_eq!(phrase.word_count(), 12);

        let copy = MnemonicPhrase::from_phrase(phrase.phrase()).unwrap();
        assert_eq!(*copy.to_seed("x").unwrap(), *phrase.to_seed("x").unwrap());
        assert!(!format!("{:?}", copy).contains(phrase.phrase()));
    }
}
