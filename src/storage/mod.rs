//! Persistence contract (§3, §10): the engine is the sole writer of
//! Orders, Fills, Lots, BotState, and AuditLog; Configuration is writable
//! by the control plane too.

pub mod memory;
#[cfg(feature = "database")]
pub mod sql;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sql::SqlStore;

use crate::model::{
    AuditLogEntry, BotState, ConfigurationRow, DailySnapshot, Fill, Lot, LotStatus, Market, Order,
    OrderStatus,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The §3 data model, behind a trait so the engine is agnostic to whether
/// state lives in-process (paper-only deployments, tests) or in Postgres.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_market(&self, market: Market) -> StorageResult<()>;
    async fn get_market(&self, id: &str) -> StorageResult<Option<Market>>;
    async fn list_markets(&self) -> StorageResult<Vec<Market>>;
    async fn list_enabled_markets(&self) -> StorageResult<Vec<Market>>;
    async fn set_market_enabled(&self, id: &str, enabled: bool) -> StorageResult<()>;

    async fn insert_order(&self, order: Order) -> StorageResult<()>;
    async fn get_order(&self, id: &str) -> StorageResult<Option<Order>>;
    async fn set_order_status(&self, id: &str, status: OrderStatus) -> StorageResult<()>;
    async fn list_open_orders(&self, market_id: Option<&str>) -> StorageResult<Vec<Order>>;

    async fn insert_fill(&self, fill: Fill) -> StorageResult<Fill>;
    async fn list_fills_since(&self, market_id: &str, since_id: i64) -> StorageResult<Vec<Fill>>;

    async fn insert_lot(&self, lot: Lot) -> StorageResult<Lot>;
    async fn get_lot_by_sell_order(&self, sell_order_id: &str) -> StorageResult<Option<Lot>>;
    async fn list_open_lots(&self, market_id: &str) -> StorageResult<Vec<Lot>>;
    async fn close_lot(&self, id: i64, sell_price: rust_decimal::Decimal, realized_pnl: rust_decimal::Decimal) -> StorageResult<()>;

    async fn get_bot_state(&self, key: &str) -> StorageResult<Option<BotState>>;
    async fn set_bot_state(&self, state: BotState) -> StorageResult<()>;

    async fn get_configuration(&self, key: &str) -> StorageResult<Option<String>>;
    async fn set_configuration(&self, row: ConfigurationRow) -> StorageResult<()>;
    async fn list_configuration(&self) -> StorageResult<Vec<ConfigurationRow>>;

    async fn insert_daily_snapshot(&self, snapshot: DailySnapshot) -> StorageResult<()>;
    async fn list_daily_snapshots(&self) -> StorageResult<Vec<DailySnapshot>>;

    async fn append_audit_log(&self, market_id: Option<String>, action: &str, detail: &str) -> StorageResult<()>;
    async fn list_audit_log(&self, market_id: Option<&str>) -> StorageResult<Vec<AuditLogEntry>>;
}

/// True iff a lot is still open per I2.
pub fn lot_is_open(lot: &Lot) -> bool {
    matches!(lot.status, LotStatus::Open)
}
