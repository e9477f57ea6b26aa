//! huddle — chat gateway with style-mirroring companion and group agents
//!
//! Usage:
//!   huddle                        → serve with ./huddle.toml (defaults if absent)
//!   huddle serve --config x.toml  → serve with an explicit config
//!   huddle print-config           → print the effective config as TOML
//!   huddle version                → show version

use clap::{Parser, Subcommand};
use huddle_core::{AuthMode, HuddleConfig};
use huddle_gateway::{start_gateway, GatewayState};
use huddle_llm::AnthropicProvider;
use huddle_store::{
    HttpSessionValidator, MemoryPresenceStore, MemoryStore, SessionValidator, StaticSessions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "huddle",
    about = "Real-time chat gateway with companion and group agents",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (TOML)
    #[arg(short, long, global = true, default_value = "huddle.toml")]
    config: PathBuf,

    /// Port for the gateway server (overrides config and HUDDLE_PORT)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Also write daily-rolling logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Serve,
    /// Print the effective configuration and exit
    PrintConfig,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.as_ref().unwrap_or(&Commands::Serve) {
        Commands::Version => {
            println!("huddle v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::PrintConfig => {
            print!("{}", load_config(&cli)?.to_toml());
        }
        Commands::Serve => {
            let _guard = init_tracing(cli.log_dir.as_deref());
            serve(load_config(&cli)?).await?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<HuddleConfig> {
    let mut config = HuddleConfig::load(&cli.config);
    config.apply_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "huddle=info,tower_http=info".into());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "huddle.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn serve(config: HuddleConfig) -> anyhow::Result<()> {
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;
    let mut provider = AnthropicProvider::new(api_key);
    if let Some(url) = &config.generation.api_url {
        provider = provider.with_base_url(format!("{}/v1/messages", url.trim_end_matches('/')));
        tracing::info!("Using custom API URL: {}", url);
    }

    let validator: Arc<dyn SessionValidator> = match config.auth.mode {
        AuthMode::Static => {
            if config.auth.sessions.is_empty() {
                tracing::warn!("No [auth.sessions] configured; every handshake will be refused");
            }
            Arc::new(StaticSessions::new(&config.auth.sessions))
        }
        AuthMode::Http => {
            let url = config
                .auth
                .validate_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("auth.validate_url not set"))?;
            Arc::new(HttpSessionValidator::new(url))
        }
    };

    let store = Arc::new(seeded_store(&config));
    let presence = Arc::new(MemoryPresenceStore::new());
    spawn_presence_sweeper(presence.clone());

    let state = GatewayState::new(config, store, presence, validator, Arc::new(provider));
    start_gateway(state).await
}

fn seeded_store(config: &HuddleConfig) -> MemoryStore {
    let store = MemoryStore::new();
    for user in config.seed.users.iter().chain(config.auth.sessions.values()) {
        store.add_user(user.as_str());
    }
    for (group, members) in &config.seed.groups {
        store.set_group(group.as_str(), members.iter().map(String::as_str));
    }
    tracing::info!(
        "In-memory store seeded with {} groups",
        config.seed.groups.len()
    );
    store
}

/// Expired entries are already invisible to reads; this only reclaims memory.
fn spawn_presence_sweeper(presence: Arc<MemoryPresenceStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = presence.purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {} expired presence entries", purged);
            }
        }
    });
}
