//! The trading engine (§2, ~55% of the system): tick loop, order sync,
//! fill processing, catch-up scanner, profit tracker, emergency stop.

pub mod catchup;
pub mod control;
pub mod fills;
pub mod profit;
pub mod sync;
pub mod tick;

pub use control::{ControlPort, EngineStatus};

use crate::adapter::{Adapter, ExchangeAdapter};
use crate::config::EngineConfig;
use crate::storage::Store;
use crate::telemetry::Telemetry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Owns every mutable piece of engine state and the tasks that drive it.
/// Constructed once by the process entry point and handed to the
/// out-of-scope transport layer through the [`ControlPort`] trait —
/// resolving the source's global-singleton pattern (§9 design notes).
pub struct Engine {
    store: Arc<dyn Store>,
    adapter: Arc<Adapter>,
    telemetry: Arc<Telemetry>,
    config: Arc<RwLock<EngineConfig>>,
    market_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        adapter: Arc<Adapter>,
        telemetry: Arc<Telemetry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            adapter,
            telemetry,
            config: Arc::new(RwLock::new(config)),
            market_locks: DashMap::new(),
        }
    }

    fn market_lock(&self, market_id: &str) -> Arc<Mutex<()>> {
        self.market_locks
            .entry(market_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// One pass over every enabled market, sequentially, each under its
    /// own mutex (§9 resolved decision #3: serialised by default).
    async fn tick_once(&self) {
        let markets = match self.store.list_enabled_markets().await {
            Ok(m) => m,
            Err(e) => {
                log::error!("failed to list enabled markets: {e}");
                return;
            }
        };
        let config = self.config.read().await.strategy;
        for market in markets {
            let lock = self.market_lock(&market.id);
            let _guard = lock.lock().await;
            if let Err(e) = tick::process_market(&self.store, &self.adapter, &self.telemetry, &config, &market.id).await {
                log::error!("process_market({}) failed: {e}", market.id);
            }
        }
    }

    async fn catchup_once(&self) {
        let markets = match self.store.list_enabled_markets().await {
            Ok(m) => m,
            Err(e) => {
                log::error!("failed to list enabled markets for catch-up: {e}");
                return;
            }
        };
        let config = self.config.read().await.strategy;
        for market in markets {
            let lock = self.market_lock(&market.id);
            let _guard = lock.lock().await;
            if let Err(e) =
                catchup::catchup_scan(&self.store, &self.adapter, &self.telemetry, &config, &market.id).await
            {
                log::error!("catchup_scan({}) failed: {e}", market.id);
            }
        }
    }

    /// Subscribes the underlying ticker stream for every currently-enabled
    /// market and folds paper fills as ticks arrive, independent of the
    /// periodic loop (§2 data flow: "Ticker stream → engine cache & broadcast
    /// → triggers process_fills on cache match").
    async fn stream_loop(self: Arc<Self>) {
        loop {
            let markets: Vec<String> = match self.store.list_enabled_markets().await {
                Ok(m) => m.into_iter().map(|m| m.id).collect(),
                Err(e) => {
                    log::error!("stream_loop: failed to list enabled markets: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };
            if markets.is_empty() {
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let adapter = self.adapter.clone();
            let stream_markets = markets.clone();
            let handle = tokio::spawn(async move { adapter.stream_ticker(stream_markets, tx).await });

            while let Some((market_id, price)) = rx.recv().await {
                if let Adapter::Paper(paper) = self.adapter.as_ref() {
                    let paper_fills = paper.check_fills(&market_id, price, None);
                    if !paper_fills.is_empty() {
                        let lock = self.market_lock(&market_id);
                        let _guard = lock.lock().await;
                        let config = self.config.read().await.strategy;
                        if let Err(e) = fills::process_fills(
                            &self.store,
                            &self.adapter,
                            &self.telemetry,
                            &config,
                            &market_id,
                            paper_fills,
                        )
                        .await
                        {
                            log::error!("stream-triggered process_fills({market_id}) failed: {e}");
                        }
                    }
                }
            }

            if let Err(e) = handle.await {
                log::warn!("ticker stream task ended: {e}");
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Runs the periodic tick loop, the catch-up scanner, and the ticker
    /// stream task until `shutdown` resolves. The in-flight tick is allowed
    /// to finish before returning (§5 cancellation policy).
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let tick_interval = Duration::from_secs(self.config.read().await.tick_interval_secs);
        let catchup_interval = Duration::from_secs(self.config.read().await.catchup_interval_secs);

        let stream_engine = self.clone();
        tokio::spawn(stream_engine.stream_loop());

        let mut tick_timer = tokio::time::interval(tick_interval);
        let mut catchup_timer = tokio::time::interval(catchup_interval);

        loop {
            tokio::select! {
                _ = tick_timer.tick() => {
                    self.tick_once().await;
                }
                _ = catchup_timer.tick() => {
                    self.catchup_once().await;
                }
                _ = &mut shutdown => {
                    log::info!("engine shutdown requested, finishing in-flight tick");
                    break;
                }
            }
        }
    }
}
