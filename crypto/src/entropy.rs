//! Cryptographically secure entropy for new seed phrases.
//!
//! The only shared mutable resource of the crypto core. Implementations must
//! be callable from several request threads at once.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum EntropyError {
    #[error("Invalid entropy size: {0} bits (must be a non-zero multiple of 8)")]
    InvalidBitLength(usize),

    #[error("Entropy source unavailable: {0}")]
    Unavailable(String),
}

/// Supplier of random bytes for mnemonic generation.
pub trait EntropySource: Send + Sync {
    /// Draw `bits / 8` random bytes.
    fn generate(&self, bits: usize) -> Result<Zeroizing<Vec<u8>>, EntropyError>;
}

/// Operating-system CSPRNG (`getrandom` underneath).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn generate(&self, bits: usize) -> Result<Zeroizing<Vec<u8>>, EntropyError> {
        if bits == 0 || bits % 8 != 0 {
            return Err(EntropyError::InvalidBitLength(bits));
        }

        let mut bytes = Zeroizing::new(vec![0u8; bits / 8]);
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| EntropyError::Unavailable(e.to_string()))?;

        Ok(bytes)
    }
}

impl<T: EntropySource + ?Sized> EntropySource for std::sync::Arc<T> {
    fn generate(&self, bits: usize) -> Result<Zeroizing<Vec<u8>>, EntropyError> {
        (**self).generate(bits)
    }
}
