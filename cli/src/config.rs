use anyhow::{Context, Result};
use hdvault_crypto::provider::DEFAULT_KEY_BITS;
use hdvault_crypto::KeyScheme;
use hdvault_wallet::WalletConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// env_logger filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub rsa: RsaConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaConfig {
    #[serde(default = "default_bits")]
    pub default_bits: usize,

    #[serde(default = "default_scheme")]
    pub default_scheme: KeyScheme,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hdvault")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn default_scheme() -> KeyScheme {
    KeyScheme::Armored
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            wallet: WalletConfig::default(),
            rsa: RsaConfig::default(),
        }
    }
}

impl Default for RsaConfig {
    fn default() -> Self {
        RsaConfig {
            default_bits: default_bits(),
            default_scheme: default_scheme(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is None.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// or one that fails to parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };

        if !explicit && !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.wallet.validate()?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hdvault")
            .join("config.toml")
    }

    /// Location of the sled database holding wallet records.
    pub fn vault_path(&self) -> PathBuf {
        self.data_dir.join("vault")
    }
}
