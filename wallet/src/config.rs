use crate::WalletError;
use hdvault_crypto::mnemonic::SUPPORTED_ENTROPY_BITS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// BIP-39 passphrase mixed into every seed unless configured otherwise.
/// Changing it changes every derived key, so existing wallets only export
/// consistently under the passphrase they were created with.
pub const DEFAULT_SEED_PASSPHRASE: &str = "Secret Passphrase";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Entropy drawn for generated seed phrases (256 bits = 24 words)
    #[serde(default = "default_entropy_bits")]
    pub entropy_bits: usize,

    #[serde(default = "default_seed_passphrase")]
    pub seed_passphrase: String,
}

fn default_entropy_bits() -> usize {
    256
}

fn default_seed_passphrase() -> String {
    DEFAULT_SEED_PASSPHRASE.to_string()
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            entropy_bits: default_entropy_bits(),
            seed_passphrase: default_seed_passphrase(),
        }
    }
}

impl WalletConfig {
    pub fn validate(&self) -> Result<(), WalletError> {
        if !SUPPORTED_ENTROPY_BITS.contains(&self.entropy_bits) {
            return Err(WalletError::InvalidConfig(format!(
                "entropy_bits must be one of {:?}, got {}",
                SUPPORTED_ENTROPY_BITS, self.entropy_bits
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConfig")
            .field("entropy_bits", &self.entropy_bits)
            .field("seed_passphrase", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WalletConfig::default();
        assert_eq!(config.entropy_bits, 256);
        assert_eq!(config.seed_passphrase, "Secret Passphrase");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: WalletConfig = serde_json::from_str(r#"{"entropy_bits": 128}"#).unwrap();
        assert_eq!(config.entropy_bits, 128);
        assert_eq!(config.seed_passphrase, DEFAULT_SEED_PASSPHRASE);
    }

    #[test]
    fn test_validate_entropy_bits() {
        for bits in [0usize, 64, 100, 512] {
            let config = WalletConfig {
                entropy_bits: bits,
                ..WalletConfig::default()
            };
            assert!(matches!(config.validate(), Err(WalletError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let debug = format!("{:?}", WalletConfig::default());
        assert!(!debug.contains(DEFAULT_SEED_PASSPHRASE));
    }
}
