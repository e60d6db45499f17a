//! consentd: consent reconciliation service
//!
//! Usage:
//!   consentd                                  → boot from ~/.consentd, read commands on stdin
//!   consentd --config ./consentd.toml         → explicit config file
//!   consentd --ephemeral                      → in-memory store, nothing survives exit
//!   consentd --dump-config                    → print default config as TOML
//!
//! Commands and events are line-delimited JSON; see `consentd::host`.

use clap::Parser;
use consentd::config::{expand_tilde, ConsentdConfig};
use consentd::host;
use consentd_engine::{
    ConsentService, ConsentStore, FileStore, MemoryStore, PersistenceGateway,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "consentd",
    about = "Consent reconciliation service",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Path to config file (TOML). Default: ~/.consentd/consentd.toml
    #[arg(long)]
    config: Option<String>,

    /// Override the store directory from the config file
    #[arg(long)]
    store_dir: Option<String>,

    /// Keep consents in memory only
    #[arg(long, default_value_t = false)]
    ephemeral: bool,

    /// Write logs to a file (in addition to stderr)
    #[arg(long)]
    log_file: Option<String>,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", ConsentdConfig::default().to_toml());
        return Ok(());
    }

    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    let config_path = cli
        .config
        .map(|p| expand_tilde(&p))
        .unwrap_or_else(|| expand_tilde("~/.consentd/consentd.toml"));
    let mut config = ConsentdConfig::load(&config_path);
    if let Some(dir) = cli.store_dir {
        config.store.dir = dir;
    }

    let store: Arc<dyn ConsentStore> = if cli.ephemeral {
        tracing::info!("Using in-memory consent store");
        Arc::new(MemoryStore::new())
    } else {
        let dir = config.store_dir();
        tracing::info!("Using file consent store at {}", dir.display());
        Arc::new(FileStore::new(dir))
    };
    let gateway = PersistenceGateway::with_location(store, &config.store.name, &config.store.key);

    let (service, handle) =
        ConsentService::new(gateway, config.default_consents(), config.service_config());
    let events = handle.subscribe();
    let join = service.spawn();

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let result = host::run(&handle, events, stdin, stdout).await;

    // EOF without an explicit shutdown command: stop the service ourselves.
    let _ = handle.shutdown().await;
    drop(handle);
    join.await?;

    result
}

fn init_tracing(log_file: Option<&str>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = expand_tilde(path);
            let dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file needs a file name: {}", path.display()))?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(&dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "consentd=info,consentd_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}
