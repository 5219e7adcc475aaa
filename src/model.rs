//! Shared data model: the rows the engine reads and writes.
//!
//! Money fields use `rust_decimal::Decimal` rather than floats (resolved
//! per §9 design notes) so that sizing and PnL arithmetic never drifts.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub enabled: bool,
    pub is_favorite: bool,
    pub market_rank: i32,
    pub volume_24h: Decimal,
    pub settings: serde_json::Value,
}

impl Market {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: false,
            is_favorite: false,
            market_rank: 0,
            volume_24h: Decimal::ZERO,
            settings: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub market_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub id: i64,
    pub order_id: String,
    pub market_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: i64,
    pub market_id: String,
    pub buy_order_id: String,
    pub buy_price: Decimal,
    pub buy_size: Decimal,
    pub buy_cost: Decimal,
    pub buy_time: DateTime<Utc>,
    pub sell_order_id: Option<String>,
    pub sell_price: Option<Decimal>,
    pub status: LotStatus,
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub key: String,
    pub value: serde_json::Value,
}

/// `"<market>_anchor"` value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnchorState {
    pub price: Decimal,
}

/// `"<market>_fill_cursor"` value: the timestamp of the most recently
/// processed fill for a market, passed back to the adapter as `since` on
/// the next `get_fills` poll so already-processed fills are never refetched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FillCursorState {
    pub last_fill_time: DateTime<Utc>,
}

/// `"profit_tracker"` value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfitTrackerState {
    pub current_month_profit_usd: Decimal,
    pub last_profit_reset_month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationRow {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub realized_pnl: Decimal,
    pub trade_count: i64,
    pub cumulative_pnl: Decimal,
}

/// Append-only forensic trail for engine-initiated cancels and stops.
/// Not in the distilled data model; carried over from the original
/// schema so an operator can reconstruct why an order disappeared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub market_id: Option<String>,
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// A product/ticker pair as reported by `get_products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub base: String,
    pub quote: String,
    pub volume_24h: Decimal,
    pub status: String,
}

/// One OHLC candle as reported by `get_candles`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub start: DateTime<Utc>,
    pub low: Decimal,
    pub high: Decimal,
    pub open: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A single fill as reported by a live adapter's `get_fills`/`stream_fills`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterFill {
    pub order_id: String,
    pub market_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A ticker tick emitted by `stream_ticker`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TickerEvent {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}
