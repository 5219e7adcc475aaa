//! Durable backend for deployments that need state to survive a restart
//! without replaying the whole OPEN-order cache rebuild from scratch.
//! Behind the `database` feature; `InMemoryStore` remains the default.

use super::{Store, StorageError, StorageResult};
use crate::model::{
    AuditLogEntry, BotState, ConfigurationRow, DailySnapshot, Fill, Lot, LotStatus, Market, Order,
    OrderSide, OrderStatus,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn side_from_str(s: &str) -> OrderSide {
    if s == "BUY" {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Open => "OPEN",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Canceled => "CANCELED",
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn upsert_market(&self, market: Market) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO markets (id, enabled, is_favorite, market_rank, volume_24h, settings)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                is_favorite = EXCLUDED.is_favorite,
                market_rank = EXCLUDED.market_rank,
                volume_24h = EXCLUDED.volume_24h,
                settings = EXCLUDED.settings",
        )
        .bind(&market.id)
        .bind(market.enabled)
        .bind(market.is_favorite)
        .bind(market.market_rank)
        .bind(market.volume_24h)
        .bind(&market.settings)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_market(&self, id: &str) -> StorageResult<Option<Market>> {
        let row = sqlx::query_as::<_, (String, bool, bool, i32, Decimal, serde_json::Value)>(
            "SELECT id, enabled, is_favorite, market_rank, volume_24h, settings FROM markets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|(id, enabled, is_favorite, market_rank, volume_24h, settings)| Market {
            id,
            enabled,
            is_favorite,
            market_rank,
            volume_24h,
            settings,
        }))
    }

    async fn list_markets(&self) -> StorageResult<Vec<Market>> {
        let rows = sqlx::query_as::<_, (String, bool, bool, i32, Decimal, serde_json::Value)>(
            "SELECT id, enabled, is_favorite, market_rank, volume_24h, settings FROM markets",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(id, enabled, is_favorite, market_rank, volume_24h, settings)| Market {
                id,
                enabled,
                is_favorite,
                market_rank,
                volume_24h,
                settings,
            })
            .collect())
    }

    async fn list_enabled_markets(&self) -> StorageResult<Vec<Market>> {
        Ok(self
            .list_markets()
            .await?
            .into_iter()
            .filter(|m| m.enabled)
            .collect())
    }

    async fn set_market_enabled(&self, id: &str, enabled: bool) -> StorageResult<()> {
        let result = sqlx::query("UPDATE markets SET enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, market_id, side, price, size, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&order.id)
        .bind(&order.market_id)
        .bind(side_str(order.side))
        .bind(order.price)
        .bind(order.size)
        .bind(status_str(order.status))
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_order(&self, id: &str) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<_, (String, String, String, Decimal, Decimal, String, chrono::DateTime<chrono::Utc>)>(
            "SELECT id, market_id, side, price, size, status, created_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|(id, market_id, side, price, size, status, created_at)| Order {
            id,
            market_id,
            side: side_from_str(&side),
            price,
            size,
            status: match status.as_str() {
                "OPEN" => OrderStatus::Open,
                "FILLED" => OrderStatus::Filled,
                _ => OrderStatus::Canceled,
            },
            created_at,
        }))
    }

    async fn set_order_status(&self, id: &str, status: OrderStatus) -> StorageResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
            .bind(status_str(status))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_open_orders(&self, market_id: Option<&str>) -> StorageResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, (String, String, String, Decimal, Decimal, String, chrono::DateTime<chrono::Utc>)>(
            "SELECT id, market_id, side, price, size, status, created_at FROM orders
             WHERE status = 'OPEN' AND ($1::text IS NULL OR market_id = $1)",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(id, market_id, side, price, size, status, created_at)| Order {
                id,
                market_id,
                side: side_from_str(&side),
                price,
                size,
                status: match status.as_str() {
                    "OPEN" => OrderStatus::Open,
                    "FILLED" => OrderStatus::Filled,
                    _ => OrderStatus::Canceled,
                },
                created_at,
            })
            .collect())
    }

    async fn insert_fill(&self, fill: Fill) -> StorageResult<Fill> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO fills (order_id, market_id, side, price, size, fee, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&fill.order_id)
        .bind(&fill.market_id)
        .bind(side_str(fill.side))
        .bind(fill.price)
        .bind(fill.size)
        .bind(fill.fee)
        .bind(fill.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Fill { id, ..fill })
    }

    async fn list_fills_since(&self, market_id: &str, since_id: i64) -> StorageResult<Vec<Fill>> {
        let rows = sqlx::query_as::<_, (i64, String, String, String, Decimal, Decimal, Decimal, chrono::DateTime<chrono::Utc>)>(
            "SELECT id, order_id, market_id, side, price, size, fee, timestamp FROM fills
             WHERE market_id = $1 AND id > $2 ORDER BY id",
        )
        .bind(market_id)
        .bind(since_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(id, order_id, market_id, side, price, size, fee, timestamp)| Fill {
                id,
                order_id,
                market_id,
                side: side_from_str(&side),
                price,
                size,
                fee,
                timestamp,
            })
            .collect())
    }

    async fn insert_lot(&self, lot: Lot) -> StorageResult<Lot> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO lots (market_id, buy_order_id, buy_price, buy_size, buy_cost, buy_time,
                                sell_order_id, sell_price, status, realized_pnl)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
        )
        .bind(&lot.market_id)
        .bind(&lot.buy_order_id)
        .bind(lot.buy_price)
        .bind(lot.buy_size)
        .bind(lot.buy_cost)
        .bind(lot.buy_time)
        .bind(&lot.sell_order_id)
        .bind(lot.sell_price)
        .bind(if matches!(lot.status, LotStatus::Open) { "OPEN" } else { "CLOSED" })
        .bind(lot.realized_pnl)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Lot { id, ..lot })
    }

    async fn get_lot_by_sell_order(&self, sell_order_id: &str) -> StorageResult<Option<Lot>> {
        self.list_open_lots("")
            .await
            .map(|lots| lots.into_iter().find(|l| l.sell_order_id.as_deref() == Some(sell_order_id)))
    }

    async fn list_open_lots(&self, market_id: &str) -> StorageResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, (i64, String, String, Decimal, Decimal, Decimal, chrono::DateTime<chrono::Utc>, Option<String>, Option<Decimal>, String, Decimal)>(
            "SELECT id, market_id, buy_order_id, buy_price, buy_size, buy_cost, buy_time,
                    sell_order_id, sell_price, status, realized_pnl
             FROM lots WHERE status = 'OPEN' AND ($1 = '' OR market_id = $1)",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(id, market_id, buy_order_id, buy_price, buy_size, buy_cost, buy_time, sell_order_id, sell_price, status, realized_pnl)| Lot {
                id,
                market_id,
                buy_order_id,
                buy_price,
                buy_size,
                buy_cost,
                buy_time,
                sell_order_id,
                sell_price,
                status: if status == "OPEN" { LotStatus::Open } else { LotStatus::Closed },
                realized_pnl,
            })
            .collect())
    }

    async fn close_lot(&self, id: i64, sell_price: Decimal, realized_pnl: Decimal) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE lots SET status = 'CLOSED', sell_price = $1, realized_pnl = $2 WHERE id = $3",
        )
        .bind(sell_price)
        .bind(realized_pnl)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("lot {id}")));
        }
        Ok(())
    }

    async fn get_bot_state(&self, key: &str) -> StorageResult<Option<BotState>> {
        let row: Option<(String, serde_json::Value)> =
            sqlx::query_as("SELECT key, value FROM bot_state WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|(key, value)| BotState { key, value }))
    }

    async fn set_bot_state(&self, state: BotState) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO bot_state (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(&state.key)
        .bind(&state.value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_configuration(&self, key: &str) -> StorageResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM configuration WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_configuration(&self, row: ConfigurationRow) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO configuration (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(&row.key)
        .bind(&row.value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_configuration(&self) -> StorageResult<Vec<ConfigurationRow>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM configuration")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|(key, value)| ConfigurationRow { key, value }).collect())
    }

    async fn insert_daily_snapshot(&self, snapshot: DailySnapshot) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO daily_snapshots (date, realized_pnl, trade_count, cumulative_pnl)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (date) DO UPDATE SET
                realized_pnl = EXCLUDED.realized_pnl,
                trade_count = EXCLUDED.trade_count,
                cumulative_pnl = EXCLUDED.cumulative_pnl",
        )
        .bind(snapshot.date)
        .bind(snapshot.realized_pnl)
        .bind(snapshot.trade_count)
        .bind(snapshot.cumulative_pnl)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_daily_snapshots(&self) -> StorageResult<Vec<DailySnapshot>> {
        let rows: Vec<(chrono::NaiveDate, Decimal, i64, Decimal)> = sqlx::query_as(
            "SELECT date, realized_pnl, trade_count, cumulative_pnl FROM daily_snapshots ORDER BY date",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(date, realized_pnl, trade_count, cumulative_pnl)| DailySnapshot {
                date,
                realized_pnl,
                trade_count,
                cumulative_pnl,
            })
            .collect())
    }

    async fn append_audit_log(&self, market_id: Option<String>, action: &str, detail: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (market_id, action, detail, timestamp) VALUES ($1, $2, $3, now())",
        )
        .bind(&market_id)
        .bind(action)
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_audit_log(&self, market_id: Option<&str>) -> StorageResult<Vec<AuditLogEntry>> {
        let rows: Vec<(i64, Option<String>, String, String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
            "SELECT id, market_id, action, detail, timestamp FROM audit_log
             WHERE $1::text IS NULL OR market_id = $1 ORDER BY id",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(id, market_id, action, detail, timestamp)| AuditLogEntry {
                id,
                market_id,
                action,
                detail,
                timestamp,
            })
            .collect())
    }
}
