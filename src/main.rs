use anyhow::Result;
use clap::Parser;
use gridbot::adapter::{Adapter, MockAdapter, PaperAdapter};
use gridbot::config::{AdapterKind, ConfigLoader};
use gridbot::storage::InMemoryStore;
use gridbot::{Engine, Store, Telemetry};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(name = "gridbot", version, about = "Limit-order grid trading engine", long_about = None)]
struct Args {
    /// Configuration file path (optional; built-in defaults apply otherwise)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging, equivalent to RUST_LOG=debug
    #[clap(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let mut loader = ConfigLoader::new()?;
    if let Some(path) = args.config.clone() {
        loader = loader.with_file(path)?;
    }
    let config = loader.with_env()?.build()?;

    log::info!("{} starting, markets={:?}, adapter={:?}", gridbot::version_string(), config.markets, config.adapter);

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    for (i, market_id) in config.markets.iter().enumerate() {
        let mut market = gridbot::model::Market::new(market_id.clone());
        // Highlander rule (§4.10): only the first configured market starts enabled.
        market.enabled = i == 0;
        store.upsert_market(market).await?;
    }

    let base_adapter = match config.adapter {
        AdapterKind::Mock => Adapter::Mock(MockAdapter::new()),
        AdapterKind::Real => {
            anyhow::bail!(
                "real adapter requires a RequestSigner wired up by the operator; \
                 construct CoinbaseAdapter programmatically rather than via the CLI"
            );
        }
    };
    let adapter: Arc<Adapter> = Arc::new(if config.paper_trading {
        Adapter::Paper(PaperAdapter::new(base_adapter))
    } else {
        base_adapter
    });

    let telemetry = Arc::new(Telemetry::default());
    let engine = Arc::new(Engine::new(store, adapter, telemetry, config));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("ctrl-c received, shutting down");
            shutdown_tx.send(()).ok();
        }
    });

    engine.run(shutdown_rx).await;
    log::info!("engine stopped");

    Ok(())
}
