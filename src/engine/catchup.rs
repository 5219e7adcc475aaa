//! Candle-based catch-up scan (§4.7): recovers fills the ticker stream
//! missed between ticks by replaying against 1-minute candle extremes.

use super::fills::process_fills;
use crate::adapter::{Adapter, ExchangeAdapter};
use crate::config::StrategyConfig;
use crate::model::{AdapterFill, OrderSide};
use crate::storage::Store;
use crate::telemetry::Telemetry;
use chrono::{Duration, Utc};
use std::sync::Arc;

const CATCHUP_WINDOW_MINUTES: i64 = 5;
const CANDLE_GRANULARITY_SECS: u32 = 60;

pub async fn catchup_scan(
    store: &Arc<dyn Store>,
    adapter: &Arc<Adapter>,
    telemetry: &Arc<Telemetry>,
    config: &StrategyConfig,
    market_id: &str,
) -> anyhow::Result<()> {
    let end = Utc::now();
    let start = end - Duration::minutes(CATCHUP_WINDOW_MINUTES);
    let candles = adapter
        .get_candles(market_id, start, end, CANDLE_GRANULARITY_SECS)
        .await?;

    for candle in candles {
        let open_orders = store.list_open_orders(Some(market_id)).await?;
        for order in open_orders {
            let matched = match order.side {
                OrderSide::Buy => candle.low <= order.price,
                OrderSide::Sell => candle.high >= order.price,
            };
            if !matched {
                continue;
            }

            let fill = AdapterFill {
                order_id: order.id.clone(),
                market_id: market_id.to_string(),
                side: order.side,
                price: order.price,
                size: order.size,
                fee: rust_decimal::Decimal::ZERO,
                timestamp: candle.start,
            };
            process_fills(store, adapter, telemetry, config, market_id, vec![fill]).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::config::EngineConfig;
    use crate::model::{Order, OrderStatus};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn missed_low_triggers_a_fill_at_order_price() {
        use crate::model::Candle;

        let store: Arc<dyn Store> = Arc::new(crate::storage::InMemoryStore::new());
        let mock = MockAdapter::new();
        mock.set_candles(
            "BTC-USD",
            vec![Candle {
                start: Utc::now(),
                low: dec!(98.50),
                high: dec!(99.50),
                open: dec!(99),
                close: dec!(99),
                volume: dec!(10),
            }],
        );
        let adapter = Arc::new(Adapter::Mock(mock));
        let telemetry = Arc::new(Telemetry::default());
        let config = EngineConfig::default().strategy;

        store
            .insert_order(Order {
                id: "buy1".to_string(),
                market_id: "BTC-USD".to_string(),
                side: OrderSide::Buy,
                price: dec!(99),
                size: dec!(1),
                status: OrderStatus::Open,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        catchup_scan(&store, &adapter, &telemetry, &config, "BTC-USD")
            .await
            .unwrap();

        assert!(store.list_open_orders(Some("BTC-USD")).await.unwrap().is_empty());
        let lots = store.list_open_lots("BTC-USD").await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].buy_price, dec!(99));
    }

    #[tokio::test]
    async fn no_candles_is_a_no_op() {
        let store: Arc<dyn Store> = Arc::new(crate::storage::InMemoryStore::new());
        let adapter = Arc::new(Adapter::Mock(MockAdapter::new()));
        let telemetry = Arc::new(Telemetry::default());
        let config = EngineConfig::default().strategy;

        store
            .insert_order(Order {
                id: "buy1".to_string(),
                market_id: "BTC-USD".to_string(),
                side: OrderSide::Buy,
                price: dec!(99),
                size: dec!(1),
                status: OrderStatus::Open,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        catchup_scan(&store, &adapter, &telemetry, &config, "BTC-USD")
            .await
            .unwrap();

        assert_eq!(store.list_open_orders(Some("BTC-USD")).await.unwrap().len(), 1);
    }
}
