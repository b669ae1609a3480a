//! Network constants and the address-type tags that select them.

use crate::hd::DerivationError;
use bip32::Prefix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version constants for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub name: &'static str,
    /// Leading byte of a pay-to-pubkey-hash address
    pub pubkey_hash_addr_id: u8,
    /// Version prefix of a serialized extended private key
    pub hd_private_prefix: Prefix,
    /// Version prefix of a serialized extended public key
    pub hd_public_prefix: Prefix,
}

pub const MAINNET: ChainParams = ChainParams {
    name: "mainnet",
    pubkey_hash_addr_id: 0x00,
    hd_private_prefix: Prefix::XPRV,
    hd_public_prefix: Prefix::XPUB,
};

pub const TESTNET3: ChainParams = ChainParams {
    name: "testnet3",
    pubkey_hash_addr_id: 0x6f,
    hd_private_prefix: Prefix::TPRV,
    hd_public_prefix: Prefix::TPUB,
};

/// Address encodings a wallet can be created for.
///
/// Only the pay-to-pubkey-hash variants have a derivation; the rest are
/// accepted as tags but refused by [`AddressType::chain_params`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    #[serde(rename = "P2PKH")]
    P2pkh,
    #[serde(rename = "P2PKH-Testnet")]
    P2pkhTestnet,
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "P2PK")]
    P2pk,
    #[serde(rename = "P2SH")]
    P2sh,
    #[serde(rename = "P2WPKH")]
    P2wpkh,
    #[serde(rename = "P2WSH")]
    P2wsh,
    #[serde(rename = "P2TR")]
    P2tr,
}

impl AddressType {
    pub const ALL: [AddressType; 8] = [
        AddressType::P2pkh,
        AddressType::P2pkhTestnet,
        AddressType::Eth,
        AddressType::P2pk,
        AddressType::P2sh,
        AddressType::P2wpkh,
        AddressType::P2wsh,
        AddressType::P2tr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::P2pkh => "P2PKH",
            AddressType::P2pkhTestnet => "P2PKH-Testnet",
            AddressType::Eth => "ETH",
            AddressType::P2pk => "P2PK",
            AddressType::P2sh => "P2SH",
            AddressType::P2wpkh => "P2WPKH",
            AddressType::P2wsh => "P2WSH",
            AddressType::P2tr => "P2TR",
        }
    }

    pub fn is_supported(&self) -> bool {
        self.chain_params().is_ok()
    }

    /// Parameter set used to derive and encode keys of this type.
    pub fn chain_params(&self) -> Result<&'static ChainParams, DerivationError> {
        match self {
            AddressType::P2pkh => Ok(&MAINNET),
            AddressType::P2pkhTestnet => Ok(&TESTNET3),
            other => Err(DerivationError::UnsupportedAddressType(
                other.as_str().to_string(),
            )),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressType {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddressType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DerivationError::UnsupportedAddressType(s.to_string()))
    }
}
