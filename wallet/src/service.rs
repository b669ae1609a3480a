use crate::config::WalletConfig;
use crate::record::{
    CreateWalletRequest, CreateWalletResponse, ExportWalletRequest, WalletExport, WalletRecord,
};
use crate::WalletError;
use hdvault_crypto::{AddressType, EntropySource, MasterKeyDeriver, MnemonicPhrase};
use hdvault_storage::SecretStore;
use zeroize::Zeroizing;

/// Store prefix under which wallet records live.
pub const WALLET_PREFIX: &str = "hdwallets/";

fn record_path(name: &str) -> String {
    format!("{}{}", WALLET_PREFIX, name)
}

fn validate_name(name: &str) -> Result<(), WalletError> {
    if name.is_empty() || name.contains('/') {
        return Err(WalletError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// HD wallet operations over an injected store and entropy source.
pub struct HdWalletService<S, E> {
    store: S,
    entropy: E,
    config: WalletConfig,
}

impl<S: SecretStore, E: EntropySource> HdWalletService<S, E> {
    pub fn new(store: S, entropy: E, config: WalletConfig) -> Self {
        Self {
            store,
            entropy,
            config,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a wallet and persist it. Nothing is written unless every
    /// step before the write succeeds.
    pub fn create(&self, request: CreateWalletRequest) -> Result<CreateWalletResponse, WalletError> {
        let address_type: AddressType = request.address_type.parse()?;
        let params = address_type.chain_params()?;

        let requested_name = request.name.as_deref().filter(|n| !n.is_empty());
        if let Some(name) = requested_name {
            validate_name(name)?;
        }

        let phrase = match request.seed_phrase.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(phrase) => MnemonicPhrase::from_phrase(phrase)?,
            None => MnemonicPhrase::generate(&self.entropy, self.config.entropy_bits)?,
        };

        let seed = phrase.to_seed(&self.config.seed_passphrase)?;
        let master = MasterKeyDeriver::derive(&seed[..], params)?;

        let name = match requested_name {
            Some(name) => name.to_string(),
            None => master.address().to_string(),
        };
        validate_name(&name)?;

        let path = record_path(&name);
        if self.store.get(&path)?.is_some() {
            log::warn!("Replacing existing wallet record {}", name);
        }

        let record = WalletRecord {
            name,
            address_type,
            seed_phrase: phrase.phrase().to_string(),
            master_key: master.into_extended_private_key().to_string(),
        };
        let bytes = Zeroizing::new(serde_json::to_vec(&record)?);
        self.store.put(&path, &bytes)?;

        log::info!(
            "Created {} wallet {} ({} words)",
            address_type,
            record.name,
            phrase.word_count()
        );
        Ok(CreateWalletResponse {
            name: record.name.clone(),
        })
    }

    /// Names of all stored wallets, sorted.
    pub fn list(&self) -> Result<Vec<String>, WalletError> {
        let names = self
            .store
            .list(WALLET_PREFIX)?
            .into_iter()
            .filter(|n| !n.ends_with('/'))
            .collect();
        Ok(names)
    }

    /// Load a wallet with its seed phrase and master key.
    pub fn export(&self, request: ExportWalletRequest) -> Result<WalletExport, WalletError> {
        validate_name(&request.name)?;

        let bytes = self
            .store
            .get(&record_path(&request.name))?
            .map(Zeroizing::new)
            .ok_or_else(|| WalletError::RecordNotFound(request.name.clone()))?;
        let record: WalletRecord = serde_json::from_slice(&bytes)?;

        log::info!("Exported wallet {}", record.name);
        Ok(record.into())
    }
}
