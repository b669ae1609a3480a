//! hdvault - HD wallet and RSA key tool

mod config;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use config::Config;
use hdvault_crypto::{KeyProvider, KeyScheme, OsEntropy};
use hdvault_storage::SledStore;
use hdvault_wallet::{CreateWalletRequest, ExportWalletRequest, HdWalletService};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "hdvault")]
#[command(about = "HD wallet vault and RSA key tool")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured data directory
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hierarchical deterministic wallets
    Wallet {
        #[command(subcommand)]
        command: WalletCommand,
    },

    /// RSA key pairs and envelopes
    Rsa {
        /// Key encoding (armored or raw); defaults to the configured scheme
        #[arg(short, long)]
        scheme: Option<KeyScheme>,

        #[command(subcommand)]
        command: RsaCommand,
    },
}

#[derive(Subcommand)]
enum WalletCommand {
    /// Create a wallet and print its name
    Create {
        /// Address type tag, e.g. P2PKH or P2PKH-Testnet
        #[arg(short, long, default_value = "P2PKH")]
        address_type: String,

        /// Wallet name; defaults to the master address
        #[arg(short, long)]
        name: Option<String>,

        /// Read an existing seed phrase from the first line of stdin
        #[arg(long)]
        phrase_stdin: bool,
    },

    /// List wallet names
    List,

    /// Print a wallet with its seed phrase and master key as JSON
    Export {
        name: String,
    },
}

#[derive(Subcommand)]
enum RsaCommand {
    /// Generate a key pair and write both halves to files
    Generate {
        /// Modulus size; defaults to the configured size
        #[arg(short, long)]
        bits: Option<usize>,

        #[arg(long, value_name = "FILE")]
        private_key: PathBuf,

        #[arg(long, value_name = "FILE")]
        public_key: PathBuf,
    },

    /// Encrypt stdin (or --input) to a public key
    Encrypt {
        #[arg(long, value_name = "FILE")]
        public_key: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Decrypt stdin (or --input) with a private key
    Decrypt {
        #[arg(long, value_name = "FILE")]
        private_key: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();
    log::debug!("Data directory: {}", config.data_dir.display());

    match cli.command {
        Commands::Wallet { command } => run_wallet(&config, command),
        Commands::Rsa { scheme, command } => {
            let scheme = scheme.unwrap_or(config.rsa.default_scheme);
            run_rsa(&config, KeyProvider::new(scheme), command)
        }
    }
}

fn run_wallet(config: &Config, command: WalletCommand) -> Result<()> {
    let store = SledStore::open(config.vault_path())
        .with_context(|| format!("Failed to open vault at {}", config.vault_path().display()))?;
    let service = HdWalletService::new(store, OsEntropy, config.wallet.clone());

    match command {
        WalletCommand::Create {
            address_type,
            name,
            phrase_stdin,
        } => {
            let mut request = CreateWalletRequest::new(address_type);
            if let Some(name) = name {
                request = request.with_name(name);
            }
            if phrase_stdin {
                let mut line = Zeroizing::new(String::new());
                io::stdin().lock().read_line(&mut line)?;
                request = request.with_seed_phrase(line.trim());
            }

            let response = service.create(request)?;
            println!("{}", response.name);
        }

        WalletCommand::List => {
            for name in service.list()? {
                println!("{}", name);
            }
        }

        WalletCommand::Export { name } => {
            let export = service.export(ExportWalletRequest::new(name))?;
            let json = Zeroizing::new(serde_json::to_string_pretty(&export)?);
            println!("{}", json.as_str());
        }
    }

    Ok(())
}

fn run_rsa(config: &Config, provider: KeyProvider, command: RsaCommand) -> Result<()> {
    match command {
        RsaCommand::Generate {
            bits,
            private_key,
            public_key,
        } => {
            let bits = bits.unwrap_or(config.rsa.default_bits);
            let pair = provider.generate_key_pair(bits)?;

            write_secret_file(&private_key, &provider.export_private_key(&pair)?)?;
            fs::write(&public_key, provider.export_public_key(&pair)?)
                .with_context(|| format!("Failed to write {}", public_key.display()))?;

            log::info!(
                "Generated {}-bit {} key pair: {}, {}",
                bits,
                provider.scheme(),
                private_key.display(),
                public_key.display()
            );
        }

        RsaCommand::Encrypt { public_key, input } => {
            let key = read_file(&public_key)?;
            let message = Zeroizing::new(read_input(input.as_deref())?);
            let envelope = provider.encrypt(&message, &key)?;

            let mut stdout = io::stdout().lock();
            match provider.scheme() {
                KeyScheme::Armored => stdout.write_all(&envelope)?,
                KeyScheme::Raw => writeln!(stdout, "{}", STANDARD.encode(&envelope))?,
            }
        }

        RsaCommand::Decrypt { private_key, input } => {
            let key = Zeroizing::new(read_file(&private_key)?);
            let input = read_input(input.as_deref())?;
            let envelope = match provider.scheme() {
                KeyScheme::Armored => input,
                KeyScheme::Raw => {
                    let text =
                        String::from_utf8(input).context("Raw ciphertext must be base64 text")?;
                    STANDARD
                        .decode(text.trim())
                        .context("Raw ciphertext must be base64 text")?
                }
            };

            let plaintext = provider.decrypt(&envelope, &key)?;
            io::stdout().lock().write_all(&plaintext)?;
        }
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => read_file(path),
        None => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Write private key bytes, readable only by the owner on Unix.
fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        bail!("Refusing to overwrite {}", path.display());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}
