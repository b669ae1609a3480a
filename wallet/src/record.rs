//! Stored wallet record and the request/response shapes around it.

use hdvault_crypto::AddressType;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Persisted form of a wallet, stored as JSON at `hdwallets/<name>`.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct WalletRecord {
    pub name: String,
    #[zeroize(skip)]
    pub address_type: AddressType,
    pub seed_phrase: String,
    /// Base58Check extended private key of the master node
    pub master_key: String,
}

impl fmt::Debug for WalletRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRecord")
            .field("name", &self.name)
            .field("address_type", &self.address_type)
            .finish_non_exhaustive()
    }
}

/// Create request. Empty `name` or `seed_phrase` count as absent.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub address_type: String,
    #[serde(default, skip_serializing)]
    pub seed_phrase: Option<String>,
}

impl CreateWalletRequest {
    pub fn new(address_type: impl Into<String>) -> Self {
        Self {
            name: None,
            address_type: address_type.into(),
            seed_phrase: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_seed_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.seed_phrase = Some(phrase.into());
        self
    }
}

impl fmt::Debug for CreateWalletRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateWalletRequest")
            .field("name", &self.name)
            .field("address_type", &self.address_type)
            .field("has_seed_phrase", &self.seed_phrase.is_some())
            .finish()
    }
}

impl Drop for CreateWalletRequest {
    fn drop(&mut self) {
        if let Some(phrase) = self.seed_phrase.as_mut() {
            phrase.zeroize();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWalletResponse {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportWalletRequest {
    pub name: String,
}

impl ExportWalletRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Export response: the record with its secrets revealed.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct WalletExport {
    pub name: String,
    #[zeroize(skip)]
    pub address_type: AddressType,
    pub seed_phrase: String,
    pub master_key: String,
}

impl From<WalletRecord> for WalletExport {
    fn from(mut record: WalletRecord) -> Self {
        WalletExport {
            name: std::mem::take(&mut record.name),
            address_type: record.address_type,
            seed_phrase: std::mem::take(&mut record.seed_phrase),
            master_key: std::mem::take(&mut record.master_key),
        }
    }
}

impl fmt::Debug for WalletExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletExport")
            .field("name", &self.name)
            .field("address_type", &self.address_type)
            .finish_non_exhaustive()
    }
}
