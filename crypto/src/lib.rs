//! hdvault cryptography
//!
//! - BIP-39 mnemonics from OS entropy
//! - BIP-32 master key and P2PKH address derivation per network
//! - RSA key providers with armored-envelope and raw PEM encodings

pub mod chain;
pub mod entropy;
pub mod hd;
pub mod mnemonic;
pub mod provider;

pub use chain::{AddressType, ChainParams, MAINNET, TESTNET3};
pub use entropy::{EntropyError, EntropySource, OsEntropy};
pub use hd::{DerivationError, MasterKey, MasterKeyDeriver};
pub use mnemonic::{MnemonicCodec, MnemonicError, MnemonicPhrase};
pub use provider::{
    ArmoredEnvelopeProvider, KeyPair, KeyProvider, KeyProviderError, KeyScheme,
    RawEncodingProvider, RsaKeyProvider,
};
