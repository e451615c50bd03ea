use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use keyward_lib::{
    auth::{generate_api_key, PasswordHasher},
    config::{LogFormat, Settings},
    mailer::LogMailer,
    router, spawn_maintenance,
    storage::MemoryCredentialStore,
    AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "keyward", version, about = "Credential and token lifecycle server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Config file (defaults to ./keyward.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the hash of a password using the configured algorithm
    HashPassword {
        plaintext: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print a fresh API key
    GenerateApiKey {
        #[arg(long, default_value = "kw")]
        prefix: String,
    },
    /// Load and validate settings, then print them with secrets redacted
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn read_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }?;
    Ok(settings)
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = read_settings(path)?;
    settings.validate()?;
    Ok(settings)
}

/// Hasher for `hash-password`; only the `password` section has to be valid
fn password_hasher(path: Option<&PathBuf>) -> anyhow::Result<PasswordHasher> {
    let settings = read_settings(path)?;
    settings.password.validate()?;
    Ok(PasswordHasher::new(&settings.password)?)
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::new(
        &settings,
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(LogMailer),
    )
    .context("failed to build auth core")?;

    let sweeper = spawn_maintenance(state.core.clone(), SWEEP_INTERVAL);
    let app = router::create_router(state);

    let listener = TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    sweeper.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            let settings = load_settings(config.as_ref())?;
            init_tracing(&settings);
            serve(settings).await
        },
        Command::HashPassword { plaintext, config } => {
            let hasher = password_hasher(config.as_ref())?;
            let mut plaintext = plaintext;
            println!("{}", hasher.hash_secure(&mut plaintext)?);
            Ok(())
        },
        Command::GenerateApiKey { prefix } => {
            println!("{}", generate_api_key(&prefix)?);
            Ok(())
        },
        Command::CheckConfig { config } => {
            let settings = load_settings(config.as_ref())?;
            println!("{settings:#?}");
            println!("configuration is valid");
            Ok(())
        },
    }
}
