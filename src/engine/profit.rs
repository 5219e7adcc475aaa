//! Monthly profit counter (§4.9). `profit_tracker` is a single
//! market-agnostic `BotState` row; running `check_monthly_reset` once per
//! enabled market per tick is idempotent.

use crate::model::{BotState, ProfitTrackerState};
use crate::storage::Store;
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

const PROFIT_TRACKER_KEY: &str = "profit_tracker";

async fn load(store: &dyn Store) -> anyhow::Result<ProfitTrackerState> {
    match store.get_bot_state(PROFIT_TRACKER_KEY).await? {
        Some(state) => Ok(serde_json::from_value(state.value)?),
        None => Ok(ProfitTrackerState {
            current_month_profit_usd: Decimal::ZERO,
            last_profit_reset_month: Utc::now().month(),
        }),
    }
}

async fn save(store: &dyn Store, tracker: ProfitTrackerState) -> anyhow::Result<()> {
    store
        .set_bot_state(BotState {
            key: PROFIT_TRACKER_KEY.to_string(),
            value: serde_json::to_value(tracker)?,
        })
        .await?;
    Ok(())
}

/// I5: reset to zero when the calendar month changes.
pub async fn check_monthly_reset(store: &Arc<dyn Store>) -> anyhow::Result<ProfitTrackerState> {
    let mut tracker = load(store.as_ref()).await?;
    let current_month = Utc::now().month();
    if tracker.last_profit_reset_month != current_month {
        tracker.current_month_profit_usd = Decimal::ZERO;
        tracker.last_profit_reset_month = current_month;
        save(store.as_ref(), tracker).await?;
    }
    Ok(tracker)
}

pub async fn add_profit(store: &Arc<dyn Store>, delta: Decimal) -> anyhow::Result<()> {
    let mut tracker = load(store.as_ref()).await?;
    tracker.current_month_profit_usd += delta;
    save(store.as_ref(), tracker).await
}

pub async fn get_current_monthly_profit(store: &Arc<dyn Store>) -> anyhow::Result<Decimal> {
    Ok(load(store.as_ref()).await?.current_month_profit_usd)
}
