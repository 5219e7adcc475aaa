//! Per-tick, per-market processing (§4.4).

use super::fills::process_fills;
use super::profit;
use crate::adapter::{Adapter, ExchangeAdapter};
use crate::config::StrategyConfig;
use crate::model::{AnchorState, BotState, FillCursorState};
use crate::storage::Store;
use crate::telemetry::{Telemetry, TelemetryEvent};
use crate::{strategy, engine::sync::sync_orders};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

fn anchor_key(market_id: &str) -> String {
    format!("{market_id}_anchor")
}

async fn load_anchor(store: &Arc<dyn Store>, market_id: &str) -> anyhow::Result<Option<Decimal>> {
    match store.get_bot_state(&anchor_key(market_id)).await? {
        Some(state) => {
            let anchor: AnchorState = serde_json::from_value(state.value)?;
            Ok(Some(anchor.price))
        }
        None => Ok(None),
    }
}

async fn save_anchor(store: &Arc<dyn Store>, market_id: &str, price: Decimal) -> anyhow::Result<()> {
    store
        .set_bot_state(BotState {
            key: anchor_key(market_id),
            value: serde_json::to_value(AnchorState { price })?,
        })
        .await
}

fn fill_cursor_key(market_id: &str) -> String {
    format!("{market_id}_fill_cursor")
}

async fn load_fill_cursor(store: &Arc<dyn Store>, market_id: &str) -> anyhow::Result<Option<chrono::DateTime<Utc>>> {
    match store.get_bot_state(&fill_cursor_key(market_id)).await? {
        Some(state) => {
            let cursor: FillCursorState = serde_json::from_value(state.value)?;
            Ok(Some(cursor.last_fill_time))
        }
        None => Ok(None),
    }
}

async fn save_fill_cursor(store: &Arc<dyn Store>, market_id: &str, last_fill_time: chrono::DateTime<Utc>) -> anyhow::Result<()> {
    store
        .set_bot_state(BotState {
            key: fill_cursor_key(market_id),
            value: serde_json::to_value(FillCursorState { last_fill_time })?,
        })
        .await
}

/// `process_market` (§4.4): monthly reset, ticker read, fill processing,
/// anchor rebase, telemetry, order sync. Errors are caught and logged by
/// the caller; this never panics and never leaves partial anchor state.
pub async fn process_market(
    store: &Arc<dyn Store>,
    adapter: &Arc<Adapter>,
    telemetry: &Arc<Telemetry>,
    config: &StrategyConfig,
    market_id: &str,
) -> anyhow::Result<()> {
    let tracker = profit::check_monthly_reset(store).await?;

    let price = match adapter.get_ticker(market_id).await {
        Ok(p) => p,
        Err(e) => {
            log::warn!("get_ticker failed for {market_id}: {e}");
            return Ok(());
        }
    };
    if price <= Decimal::ZERO {
        log::warn!("{market_id} ticker returned non-positive price {price}; skipping tick");
        return Ok(());
    }

    let cursor = load_fill_cursor(store, market_id).await?;
    let fills = adapter.get_fills(cursor).await.unwrap_or_default();
    if !fills.is_empty() {
        let latest = fills.iter().map(|f| f.timestamp).max().unwrap();
        process_fills(store, adapter, telemetry, config, market_id, fills).await?;
        save_fill_cursor(store, market_id, latest).await?;
    }

    if let Adapter::Paper(paper) = adapter.as_ref() {
        let paper_fills = paper.check_fills(market_id, price, None);
        if !paper_fills.is_empty() {
            process_fills(store, adapter, telemetry, config, market_id, paper_fills).await?;
        }
    }

    let old_anchor = load_anchor(store, market_id).await?;
    let new_anchor = strategy::rebase_anchor(price, old_anchor);
    if old_anchor != Some(new_anchor) {
        save_anchor(store, market_id, new_anchor).await?;
    }

    telemetry.publish(TelemetryEvent::PriceUpdate {
        market_id: market_id.to_string(),
        price,
        anchor: new_anchor,
        grid_top: strategy::grid_top(config, new_anchor),
    });

    sync_orders(
        store,
        adapter,
        config,
        market_id,
        new_anchor,
        price,
        tracker.current_month_profit_usd,
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::config::EngineConfig;
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<dyn Store>, Arc<Adapter>, Arc<Telemetry>, StrategyConfig) {
        (
            Arc::new(crate::storage::InMemoryStore::new()),
            Arc::new(Adapter::Mock(MockAdapter::new())),
            Arc::new(Telemetry::default()),
            EngineConfig::default().strategy,
        )
    }

    #[tokio::test]
    async fn initial_tick_sets_anchor_and_places_grid() {
        let (store, adapter, telemetry, config) = setup();
        if let Adapter::Mock(m) = adapter.as_ref() {
            m.set_price("BTC-USD", dec!(50000));
        }

        process_market(&store, &adapter, &telemetry, &config, "BTC-USD").await.unwrap();

        let anchor = load_anchor(&store, "BTC-USD").await.unwrap().unwrap();
        assert_eq!(anchor, dec!(50000));

        let open = store.list_open_orders(Some("BTC-USD")).await.unwrap();
        assert!(!open.is_empty());
        for order in &open {
            assert!(order.price < dec!(50000));
            assert!(order.price > dec!(47500));
        }
    }

    #[tokio::test]
    async fn zero_price_is_a_no_op() {
        let (store, adapter, telemetry, config) = setup();
        if let Adapter::Mock(m) = adapter.as_ref() {
            m.set_price("BTC-USD", Decimal::ZERO);
        }

        process_market(&store, &adapter, &telemetry, &config, "BTC-USD").await.unwrap();

        assert!(load_anchor(&store, "BTC-USD").await.unwrap().is_none());
        assert!(store.list_open_orders(Some("BTC-USD")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn anchor_never_moves_down_across_ticks() {
        let (store, adapter, telemetry, config) = setup();
        if let Adapter::Mock(m) = adapter.as_ref() {
            m.set_price("BTC-USD", dec!(50000));
        }
        process_market(&store, &adapter, &telemetry, &config, "BTC-USD").await.unwrap();

        if let Adapter::Mock(m) = adapter.as_ref() {
            m.set_price("BTC-USD", dec!(30000));
        }
        process_market(&store, &adapter, &telemetry, &config, "BTC-USD").await.unwrap();

        let anchor = load_anchor(&store, "BTC-USD").await.unwrap().unwrap();
        assert_eq!(anchor, dec!(50000));
    }
}
