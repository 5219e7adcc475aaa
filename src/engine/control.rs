//! Control Port (§4.10): the trait boundary through which the (out-of-scope)
//! transport layer drives the engine, so the engine never depends upward on
//! its own transport.

use super::Engine;
use crate::adapter::ExchangeAdapter;
use crate::config::StrategyConfigPatch;
use crate::model::OrderStatus;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub enabled_markets: Vec<String>,
    pub anchors: HashMap<String, Decimal>,
    pub open_order_counts: HashMap<String, usize>,
    pub current_monthly_profit_usd: Decimal,
}

#[async_trait]
pub trait ControlPort: Send + Sync {
    async fn update_config(&self, patch: StrategyConfigPatch) -> anyhow::Result<()>;
    async fn emergency_stop(&self) -> anyhow::Result<()>;
    async fn set_market_enabled(&self, market_id: &str, enabled: bool) -> anyhow::Result<()>;
    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<bool>;
    async fn snapshot_status(&self) -> anyhow::Result<EngineStatus>;
}

#[async_trait]
impl ControlPort for Engine {
    async fn update_config(&self, patch: StrategyConfigPatch) -> anyhow::Result<()> {
        let mut config = self.config.write().await;
        config.strategy.apply_patch(&patch)?;

        macro_rules! persist {
            ($field:ident) => {
                if patch.$field.is_some() {
                    self.store
                        .set_configuration(crate::model::ConfigurationRow {
                            key: stringify!($field).to_string(),
                            value: config.strategy.$field.to_string(),
                        })
                        .await?;
                }
            };
        }
        persist!(grid_step_pct);
        persist!(staging_band_pct);
        persist!(max_orders);
        persist!(buffer_enabled);
        persist!(buffer_pct);
        persist!(custom_profit_pct);
        persist!(monthly_profit_target_usd);
        persist!(budget);
        persist!(fixed_usd_per_trade);
        persist!(capital_pct_per_trade);

        Ok(())
    }

    async fn emergency_stop(&self) -> anyhow::Result<()> {
        for market in self.store.list_markets().await? {
            self.store.set_market_enabled(&market.id, false).await?;
        }
        for order in self.store.list_open_orders(None).await? {
            if let Err(e) = self.adapter.cancel_order(&order.id).await {
                log::warn!("emergency stop: cancel of {} failed: {e}", order.id);
            }
            self.store.set_order_status(&order.id, OrderStatus::Canceled).await?;
            self.store
                .append_audit_log(Some(order.market_id.clone()), "emergency_cancel", &order.id)
                .await?;
        }
        self.store
            .append_audit_log(None, "emergency_stop", "all markets disabled, all orders canceled")
            .await?;
        Ok(())
    }

    async fn set_market_enabled(&self, market_id: &str, enabled: bool) -> anyhow::Result<()> {
        if enabled {
            // Highlander rule: only one market is live-traded at a time.
            for market in self.store.list_enabled_markets().await? {
                if market.id != market_id {
                    self.store.set_market_enabled(&market.id, false).await?;
                }
            }
        }
        self.store.set_market_enabled(market_id, enabled).await?;
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<bool> {
        let cancelled = self.adapter.cancel_order(order_id).await.unwrap_or(false);
        self.store.set_order_status(order_id, OrderStatus::Canceled).await?;
        Ok(cancelled)
    }

    async fn snapshot_status(&self) -> anyhow::Result<EngineStatus> {
        let enabled = self.store.list_enabled_markets().await?;
        let mut anchors = HashMap::new();
        let mut open_order_counts = HashMap::new();
        for market in &enabled {
            if let Some(state) = self.store.get_bot_state(&format!("{}_anchor", market.id)).await? {
                if let Ok(anchor) = serde_json::from_value::<crate::model::AnchorState>(state.value) {
                    anchors.insert(market.id.clone(), anchor.price);
                }
            }
            let open = self.store.list_open_orders(Some(&market.id)).await?;
            open_order_counts.insert(market.id.clone(), open.len());
        }
        let current_monthly_profit_usd = super::profit::get_current_monthly_profit(&self.store).await?;

        Ok(EngineStatus {
            enabled_markets: enabled.into_iter().map(|m| m.id).collect(),
            anchors,
            open_order_counts,
            current_monthly_profit_usd,
        })
    }
}
