//! # Command Line Interface
//!
//! `vaultsync render` resolves a VaultSecret manifest against Vault and prints
//! the derived Secret, `validate` checks a manifest offline and `check-path`
//! evaluates the path authorization policy.

pub mod output;

use crate::config::{AppConfig, AuthorizationConfig};
use crate::domain::VaultSecret;
use crate::observability::{init_observability, log_config_info};
use crate::secrets::{PathAuthorizer, SecretString};
use crate::startup::connect;
use anyhow::Context;
use clap::{Parser, Subcommand};
use output::OutputFormat;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(about = "Synchronize HashiCorp Vault KV v2 secrets into derived secrets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Vault server address
    #[arg(long, env = "VAULT_ADDR", global = true)]
    pub vault_addr: Option<String>,

    /// Static Vault token
    #[arg(long, env = "VAULT_TOKEN", global = true, hide_env_values = true)]
    pub vault_token: Option<String>,

    /// AppRole role id
    #[arg(long, env = "VAULT_ROLE_ID", global = true)]
    pub role_id: Option<String>,

    /// AppRole secret id
    #[arg(long, env = "VAULT_SECRET_ID", global = true, hide_env_values = true)]
    pub secret_id: Option<String>,

    /// Vault Enterprise namespace
    #[arg(long, env = "VAULT_NAMESPACE", global = true)]
    pub vault_namespace: Option<String>,

    /// Comma separated `app/` scopes readable from every namespace
    #[arg(long, env = "SHARED_PATHS", global = true)]
    pub shared_paths: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a VaultSecret manifest and print the derived Secret
    Render {
        /// VaultSecret manifest (YAML or JSON)
        file: PathBuf,

        /// Namespace to resolve in when the manifest has none
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },

    /// Check a VaultSecret manifest without contacting Vault
    Validate {
        /// VaultSecret manifest (YAML or JSON)
        file: PathBuf,
    },

    /// Check whether a namespace may read a Vault path
    CheckPath {
        /// Requesting namespace
        namespace: String,

        /// Vault path, e.g. app/payments/db
        path: String,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    init_observability(&config.observability)?;
    log_config_info(&config);

    match cli.command {
        Commands::Render { file, namespace, output } => {
            handle_render(&config, &file, &namespace, output).await?
        }
        Commands::Validate { file } => handle_validate(&file)?,
        Commands::CheckPath { namespace, path } => {
            handle_check_path(&config.authorization, &namespace, &path)?
        }
    }

    Ok(())
}

/// Layer CLI flags and `VAULT_*` variables over the loaded configuration.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(address) = &cli.vault_addr {
        config.vault.address = address.clone();
    }
    if let Some(token) = &cli.vault_token {
        config.vault.token = Some(SecretString::new(token.as_str()));
    }
    if let Some(role_id) = &cli.role_id {
        config.vault.role_id = Some(role_id.clone());
    }
    if let Some(secret_id) = &cli.secret_id {
        config.vault.secret_id = Some(SecretString::new(secret_id.as_str()));
    }
    if let Some(namespace) = &cli.vault_namespace {
        config.vault.namespace = Some(namespace.clone());
    }
    if let Some(shared) = &cli.shared_paths {
        config.authorization = AuthorizationConfig::from_csv(shared);
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Read a VaultSecret manifest. YAML parsing also accepts JSON.
pub fn read_manifest(path: &Path) -> anyhow::Result<VaultSecret> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse manifest {}", path.display()))
}

async fn handle_render(
    config: &AppConfig,
    file: &Path,
    namespace: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let mut object = read_manifest(file)?;
    if object.metadata.namespace.is_empty() {
        object.metadata.namespace = namespace.to_string();
    }

    let engine = connect(config).await.context("Failed to connect to Vault")?;
    let result = engine.sync.render(&object).await;
    engine.shutdown().await;

    let rendered = result.with_context(|| format!("Failed to render VaultSecret '{}'", object.name()))?;
    output::print_rendered(&rendered, output)
}

fn handle_validate(file: &Path) -> anyhow::Result<()> {
    let object = read_manifest(file)?;
    match object.spec.validate() {
        Ok(()) => {
            println!("✅ VaultSecret '{}' is valid", object.name());
            Ok(())
        }
        Err(e) => {
            println!("❌ VaultSecret '{}' is invalid: {}", object.name(), e);
            std::process::exit(1);
        }
    }
}

fn handle_check_path(
    authorization: &AuthorizationConfig,
    namespace: &str,
    path: &str,
) -> anyhow::Result<()> {
    let authorizer = PathAuthorizer::from_config(authorization);
    match authorizer.authorize(namespace, path) {
        Ok(()) => {
            println!("✅ Namespace '{}' may read '{}'", namespace, path);
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
