//! hdvault HD wallet service
//!
//! Creates BIP-39/BIP-32 wallets, keeps them in a [`SecretStore`] as JSON
//! records under `hdwallets/<name>`, and reveals them on export.
//!
//! [`SecretStore`]: hdvault_storage::SecretStore

pub mod config;
pub mod record;
pub mod service;

pub use config::{WalletConfig, DEFAULT_SEED_PASSPHRASE};
pub use record::{
    CreateWalletRequest, CreateWalletResponse, ExportWalletRequest, WalletExport, WalletRecord,
};
pub use service::{HdWalletService, WALLET_PREFIX};

use hdvault_crypto::{DerivationError, MnemonicError};
use hdvault_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Mnemonic error: {0}")]
    Mnemonic(#[from] MnemonicError),

    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Wallet not found: {0}")]
    RecordNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid wallet name: {0:?}")]
    InvalidName(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
