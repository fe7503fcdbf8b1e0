//! Keyward operator binary.
//!
//! # Usage
//!
//! ```bash
//! # Provision a master key
//! export KEYWARD_MASTER_KEY="$(keyward generate-master-key)"
//! keyward validate-key
//!
//! # Encrypt and decrypt a field
//! keyward encrypt --purpose pii --aad user:42 "alice@example.com"
//! keyward decrypt --purpose pii --aad user:42 "v1:...:..."
//!
//! # Encrypt a file with envelope encryption
//! keyward encrypt-file --purpose file_storage --input scan.pdf --output scan.pdf.kw
//! ```

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use keyward_core::SystemEnv;
use keyward_crypto::{
    DEFAULT_MASTER_KEY_ENV, EncryptionConfig, EncryptionService, KeyPurpose, generate_master_key,
    validate_key_strength,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keyward key tooling
#[derive(Parser, Debug)]
#[command(name = "keyward")]
#[command(about = "Master key provisioning and field encryption")]
#[command(version)]
struct Args {
    /// Environment variable holding the base64 master key
    #[arg(long, global = true, default_value = DEFAULT_MASTER_KEY_ENV)]
    master_key_env: String,

    /// Global key version the service starts at
    #[arg(long, global = true, default_value = "1")]
    key_version: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh base64 master key
    GenerateMasterKey,

    /// Check that a master key is well-formed and strong enough
    ValidateKey {
        /// Key to check; defaults to the master key environment variable
        #[arg(long)]
        key: Option<String>,
    },

    /// Encrypt a text field
    Encrypt {
        /// Key purpose (pii, phi, financial, database_field, file_storage, api_token)
        #[arg(short, long)]
        purpose: KeyPurpose,

        /// Associated data bound to the ciphertext
        #[arg(long)]
        aad: Option<String>,

        /// Field to encrypt
        plaintext: String,
    },

    /// Decrypt a field envelope
    Decrypt {
        /// Key purpose the field was encrypted under
        #[arg(short, long)]
        purpose: KeyPurpose,

        /// Associated data given at encryption
        #[arg(long)]
        aad: Option<String>,

        /// Envelope in `v{N}:{nonce}:{ciphertext}` form
        envelope: String,
    },

    /// Encrypt a file with a fresh data key
    EncryptFile {
        /// Key purpose
        #[arg(short, long)]
        purpose: KeyPurpose,

        /// File to encrypt
        #[arg(short, long)]
        input: PathBuf,

        /// Destination of the encrypted object
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decrypt a file produced by `encrypt-file`
    DecryptFile {
        /// Key purpose the file was encrypted under
        #[arg(short, long)]
        purpose: KeyPurpose,

        /// Encrypted object
        #[arg(short, long)]
        input: PathBuf,

        /// Destination of the plaintext
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config =
        EncryptionConfig { master_key_env: args.master_key_env, initial_version: args.key_version };
    let mut stdout = io::stdout().lock();

    match args.command {
        Command::GenerateMasterKey => {
            writeln!(stdout, "{}", generate_master_key(&SystemEnv::new()))?;
        },
        Command::ValidateKey { key } => {
            let key = match key {
                Some(key) => key,
                None => std::env::var(&config.master_key_env).map_err(|_| {
                    format!("environment variable {} is not set", config.master_key_env)
                })?,
            };
            validate_key_strength(&key)?;
            writeln!(stdout, "master key is valid")?;
        },
        Command::Encrypt { purpose, aad, plaintext } => {
            let service = EncryptionService::from_config(&config, SystemEnv::new())?;
            let envelope = service.encrypt_field(&plaintext, purpose, None, aad.as_deref())?;
            writeln!(stdout, "{envelope}")?;
        },
        Command::Decrypt { purpose, aad, envelope } => {
            let service = EncryptionService::from_config(&config, SystemEnv::new())?;
            let plaintext = service.decrypt_field(&envelope, purpose, aad.as_deref())?;
            writeln!(stdout, "{plaintext}")?;
        },
        Command::EncryptFile { purpose, input, output } => {
            let service = EncryptionService::from_config(&config, SystemEnv::new())?;
            let object = service.encrypt_large_data(&fs::read(&input)?, purpose, None)?;
            fs::write(&output, &object)?;
            tracing::info!(input = %input.display(), output = %output.display(), "file encrypted");
        },
        Command::DecryptFile { purpose, input, output } => {
            let service = EncryptionService::from_config(&config, SystemEnv::new())?;
            let payload = service.decrypt_large_data(&fs::read(&input)?, purpose)?;
            fs::write(&output, &payload)?;
            tracing::info!(input = %input.display(), output = %output.display(), "file decrypted");
        },
    }

    Ok(())
}
