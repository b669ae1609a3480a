//! BIP-32 master key derivation.
//!
//! Only the root node is produced and encoded as a pay-to-pubkey-hash
//! address. No child path is applied.
//!
//! Reference: <https://github.com/bitcoin/bips/blob/master/bip-0032.mediawiki>

use crate::chain::{AddressType, ChainParams};
use bip32::XPrv;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Seed length bounds from BIP-32 (128..512 bits).
pub const MIN_SEED_LEN: usize = 16;
pub const MAX_SEED_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("Unsupported address type: {0:?}")]
    UnsupportedAddressType(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Serialized outputs of a master node. The key state itself is gone by the
/// time one of these exists.
pub struct MasterKey {
    extended_private_key: Zeroizing<String>,
    extended_public_key: String,
    address: String,
    network: &'static str,
}

impl MasterKey {
    /// Base58Check `xprv`/`tprv` string
    pub fn extended_private_key(&self) -> &str {
        &self.extended_private_key
    }

    /// Base58Check `xpub`/`tpub` string
    pub fn extended_public_key(&self) -> &str {
        &self.extended_public_key
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn network(&self) -> &'static str {
        self.network
    }

    /// Take the serialized private key, dropping the rest.
    pub fn into_extended_private_key(self) -> Zeroizing<String> {
        self.extended_private_key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("extended_public_key", &self.extended_public_key)
            .finish_non_exhaustive()
    }
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

/// Base58Check of the network byte followed by HASH160 of the compressed key.
fn p2pkh_address(public_key: &[u8], params: &ChainParams) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(params.pubkey_hash_addr_id);
    payload.extend_from_slice(&hash160(public_key));

    bs58::encode(payload).with_check().into_string()
}

/// Master node deriver.
pub struct MasterKeyDeriver;

impl MasterKeyDeriver {
    /// Derive the master key and address for `seed` under `params`.
    pub fn derive(seed: &[u8], params: &'static ChainParams) -> Result<MasterKey, DerivationError> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(DerivationError::KeyDerivation(format!(
                "seed length {} outside {}..={} bytes",
                seed.len(),
                MIN_SEED_LEN,
                MAX_SEED_LEN
            )));
        }

        let root = XPrv::new(seed).map_err(|e| {
            DerivationError::KeyDerivation(format!("Failed to create master key: {}", e))
        })?;
        let public = root.public_key();

        let master = MasterKey {
            extended_private_key: root.to_string(params.hd_private_prefix),
            extended_public_key: public.to_string(params.hd_public_prefix),
            address: p2pkh_address(&public.to_bytes(), params),
            network: params.name,
        };

        log::debug!("Derived {} master key for {}", params.name, master.address);
        Ok(master)
    }

    /// Resolve the parameter set for `address_type`, then derive.
    pub fn derive_for(seed: &[u8], address_type: AddressType) -> Result<MasterKey, DerivationError> {
        let params = address_type.chain_params()?;
        Self::derive(seed, params)
    }
}
