use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use warden_auth::{HttpTokenStore, MemoryTokenStore, TokenStore};
use warden_core::config::StateBackend;
use warden_core::WardenConfig;
use warden_sessions::{MemoryStateStore, SqliteStateStore, StateStore};

#[derive(Debug, Parser)]
#[command(name = "warden-gateway")]
#[command(about = "Authenticated turn processing for a chat-platform bot", long_about = None)]
struct Cli {
    /// Config file (default: ~/.warden/warden.toml)
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Override gateway.port
    #[arg(long)]
    port: Option<u16>,

    /// Validate configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "warden_gateway=info,warden_bot=info,warden_auth=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let mut config = WardenConfig::load(cli.config.as_deref().and_then(|p| p.to_str()))?;
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    if let Err(e) = config.validate() {
        error!(code = e.code(), "{e}");
        std::process::exit(2);
    }
    if cli.check {
        info!("configuration is valid");
        return Ok(());
    }

    let tokens = token_store(&config)?;
    let state_store = state_store(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(warden_gateway::build_state(config, tokens, state_store)?);
    let router = warden_gateway::build_router(state);

    info!("Warden gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn token_store(config: &WardenConfig) -> anyhow::Result<Arc<dyn TokenStore>> {
    match config.token_service.base_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            let store = HttpTokenStore::new(
                url,
                config.token_service.app_token.clone(),
                Duration::from_millis(config.http.timeout_ms),
            )?;
            info!(url = %url, "using remote token service");
            Ok(Arc::new(store))
        }
        _ => {
            warn!("no token service configured, tokens are held in memory (local mode)");
            Ok(Arc::new(MemoryTokenStore::new()))
        }
    }
}

fn state_store(config: &WardenConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    match config.state.backend {
        StateBackend::Memory => {
            info!("conversation state kept in memory");
            Ok(Arc::new(MemoryStateStore::new()))
        }
        StateBackend::Sqlite => {
            let path = &config.database.path;
            info!(path = %path, "opening SQLite state store");
            Ok(Arc::new(SqliteStateStore::open(std::path::Path::new(path))?))
        }
    }
}
