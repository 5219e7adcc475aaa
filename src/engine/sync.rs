//! `sync_orders` (§4.5): the core order-synchronisation algorithm. Cancels
//! ghost/out-of-band orders, leaves covered levels alone, places new orders
//! on every uncovered desired level.

use crate::adapter::Adapter;
use crate::config::StrategyConfig;
use crate::model::{Order, OrderSide, OrderStatus};
use crate::storage::Store;
use crate::strategy;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

pub async fn sync_orders(
    store: &Arc<dyn Store>,
    adapter: &Arc<Adapter>,
    config: &StrategyConfig,
    market_id: &str,
    anchor: Decimal,
    current: Decimal,
    current_month_profit: Decimal,
) -> anyhow::Result<()> {
    // Step 1: refresh the paper matcher's view of the book from storage.
    if let Adapter::Paper(paper) = adapter.as_ref() {
        for order in store.list_open_orders(Some(market_id)).await? {
            paper.seed_order(&order);
        }
    }

    let desired = strategy::buy_levels(config, anchor, current);
    let tolerance = strategy::price_tolerance(config.grid_step_pct);

    let mut covered: HashSet<usize> = HashSet::new();

    let open_orders = store.list_open_orders(Some(market_id)).await?;
    let open_lots = store.list_open_lots(market_id).await?;

    // Step 4: classify every OPEN buy order as covering a level, or prune it.
    for order in open_orders.iter().filter(|o| o.side == OrderSide::Buy) {
        let valid_level = desired
            .iter()
            .enumerate()
            .find(|(_, level)| strategy::within_tolerance(order.price, **level, tolerance))
            .map(|(i, _)| i);

        let in_band = !strategy::should_prune(config, order.price, current);

        match valid_level {
            Some(i) if in_band => {
                covered.insert(i);
            }
            _ => {
                let reason = if valid_level.is_none() { "ghost order" } else { "out of band" };
                cancel_order(store, adapter, market_id, order, reason).await;
            }
        }
    }

    // Step 5: an OPEN lot's buy level counts as covered (I6).
    for lot in &open_lots {
        if let Some((i, _)) = desired
            .iter()
            .enumerate()
            .find(|(_, level)| strategy::within_tolerance(lot.buy_price, **level, tolerance))
        {
            covered.insert(i);
        }
    }

    // Step 6: place new orders on every uncovered level.
    let effective_budget = strategy::effective_budget(config, current_month_profit);
    for (i, level) in desired.iter().enumerate() {
        if covered.contains(&i) {
            continue;
        }
        let size = strategy::order_size(config, effective_budget, *level);
        use crate::adapter::ExchangeAdapter;
        match adapter.place_limit_order(market_id, OrderSide::Buy, *level, size, true).await {
            Ok(order_id) => {
                if let Err(e) = store
                    .insert_order(Order {
                        id: order_id,
                        market_id: market_id.to_string(),
                        side: OrderSide::Buy,
                        price: *level,
                        size,
                        status: OrderStatus::Open,
                        created_at: Utc::now(),
                    })
                    .await
                {
                    log::error!("failed to persist new order on {market_id}: {e}");
                }
            }
            Err(e) => {
                log::warn!("placement failed on {market_id} at {level}: {e}");
                store
                    .append_audit_log(
                        Some(market_id.to_string()),
                        "placement_failed",
                        &format!("level {level} size {size}: {e}"),
                    )
                    .await
                    .ok();
            }
        }
    }

    Ok(())
}

async fn cancel_order(
    store: &Arc<dyn Store>,
    adapter: &Arc<Adapter>,
    market_id: &str,
    order: &Order,
    reason: &str,
) {
    use crate::adapter::ExchangeAdapter;
    if let Err(e) = adapter.cancel_order(&order.id).await {
        log::warn!("cancel of {} on {market_id} failed: {e}", order.id);
    }
    if let Err(e) = store.set_order_status(&order.id, OrderStatus::Canceled).await {
        log::error!("failed to mark {} canceled in storage: {e}", order.id);
    }
    store
        .append_audit_log(
            Some(market_id.to_string()),
            "cancel",
            &format!("{}: order {} @ {}", reason, order.id, order.price),
        )
        .await
        .ok();
}
