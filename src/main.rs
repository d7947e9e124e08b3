//! Kubaru media server
//!
//! Serves a directory of media files over HTTPS behind HTTP Basic auth and
//! publishes an M3U playlist of everything in it. `kubaru gen-cert` creates
//! the self-signed certificate the server needs.

mod config;
mod config_file;
mod error;
mod http;
mod index;
#[cfg(test)]
mod integration;
mod playlist;
mod server;
mod state;
mod tls;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ConfigSources, ServerConfig};
use crate::config_file::{ConfigFile, LogFormat, LoggingSettings};
use crate::error::Result;
use crate::tls::CertificateStore;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "kubaru";

/// Filter used when neither RUST_LOG nor the config file set one
const DEFAULT_LOG_FILTER: &str = "kubaru=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a self-signed certificate (cert.pem, key.pem) in the current directory
    GenCert {
        /// Comma separated hostnames and IP addresses to cover
        #[arg(long, default_value = tls::DEFAULT_HOSTS)]
        hosts: String,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Directory to serve
    #[arg(long)]
    path: Option<String>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<String>,

    /// Basic auth username (overrides KUBARU_USER)
    #[arg(long)]
    user: Option<String>,

    /// Basic auth password (overrides KUBARU_PASS, generated when unset)
    #[arg(long)]
    pass: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ServeArgs {
    fn sources(&self) -> ConfigSources {
        ConfigSources {
            user: self.user.clone(),
            pass: self.pass.clone(),
            host: self.host.clone(),
            port: self.port.clone(),
            path: self.path.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_file = match &cli.serve.config {
        Some(path) => ConfigFile::from_file(path),
        None => Ok(ConfigFile::default()),
    };

    let logging = match &config_file {
        Ok(file) => file.logging.clone(),
        Err(_) => LoggingSettings::default(),
    };
    init_logging(&logging);

    let result = match config_file {
        Ok(file) => run(cli, file).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, file: ConfigFile) -> Result<()> {
    let certs = CertificateStore::default();

    if let Some(Command::GenCert { hosts }) = cli.command {
        certs.generate(&hosts)?;
        return Ok(());
    }

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let config = ServerConfig::resolve(
        cli.serve.sources(),
        file.sources(),
        |key| std::env::var(key).ok(),
        &certs,
    )?;

    server::run(config, &certs).await
}

/// Initialize logging with tracing
fn init_logging(settings: &LoggingSettings) {
    let default_filter = settings.level.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
