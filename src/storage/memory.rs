//! Default storage backend: an in-process store good enough to back both
//! the test suite and a no-database paper-only deployment.

use super::{Store, StorageError, StorageResult};
use crate::model::{
    AuditLogEntry, BotState, ConfigurationRow, DailySnapshot, Fill, Lot, LotStatus, Market, Order,
    OrderStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
pub struct InMemoryStore {
    markets: RwLock<HashMap<String, Market>>,
    orders: RwLock<HashMap<String, Order>>,
    fills: RwLock<Vec<Fill>>,
    lots: RwLock<Vec<Lot>>,
    bot_state: RwLock<HashMap<String, BotState>>,
    configuration: RwLock<HashMap<String, String>>,
    daily_snapshots: RwLock<Vec<DailySnapshot>>,
    audit_log: RwLock<Vec<AuditLogEntry>>,
    next_fill_id: AtomicI64,
    next_lot_id: AtomicI64,
    next_audit_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_fill_id: AtomicI64::new(1),
            next_lot_id: AtomicI64::new(1),
            next_audit_id: AtomicI64::new(1),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_market(&self, market: Market) -> StorageResult<()> {
        self.markets.write().insert(market.id.clone(), market);
        Ok(())
    }

    async fn get_market(&self, id: &str) -> StorageResult<Option<Market>> {
        Ok(self.markets.read().get(id).cloned())
    }

    async fn list_markets(&self) -> StorageResult<Vec<Market>> {
        Ok(self.markets.read().values().cloned().collect())
    }

    async fn list_enabled_markets(&self) -> StorageResult<Vec<Market>> {
        Ok(self
            .markets
            .read()
            .values()
            .filter(|m| m.enabled)
            .cloned()
            .collect())
    }

    async fn set_market_enabled(&self, id: &str, enabled: bool) -> StorageResult<()> {
        let mut markets = self.markets.write();
        let market = markets
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        market.enabled = enabled;
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> StorageResult<()> {
        let mut orders = self.orders.write();
        if orders.contains_key(&order.id) {
            return Err(StorageError::Backend(format!("duplicate order id {}", order.id)));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get_order(&self, id: &str) -> StorageResult<Option<Order>> {
        Ok(self.orders.read().get(id).cloned())
    }

    async fn set_order_status(&self, id: &str, status: OrderStatus) -> StorageResult<()> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        order.status = status;
        Ok(())
    }

    async fn list_open_orders(&self, market_id: Option<&str>) -> StorageResult<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .values()
            .filter(|o| matches!(o.status, OrderStatus::Open))
            .filter(|o| match market_id {
                Some(m) => o.market_id == m,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn insert_fill(&self, mut fill: Fill) -> StorageResult<Fill> {
        fill.id = self.next_fill_id.fetch_add(1, Ordering::Relaxed);
        self.fills.write().push(fill.clone());
        Ok(fill)
    }

    async fn list_fills_since(&self, market_id: &str, since_id: i64) -> StorageResult<Vec<Fill>> {
        Ok(self
            .fills
            .read()
            .iter()
            .filter(|f| f.market_id == market_id && f.id > since_id)
            .cloned()
            .collect())
    }

    async fn insert_lot(&self, mut lot: Lot) -> StorageResult<Lot> {
        lot.id = self.next_lot_id.fetch_add(1, Ordering::Relaxed);
        self.lots.write().push(lot.clone());
        Ok(lot)
    }

    async fn get_lot_by_sell_order(&self, sell_order_id: &str) -> StorageResult<Option<Lot>> {
        Ok(self
            .lots
            .read()
            .iter()
            .find(|l| l.sell_order_id.as_deref() == Some(sell_order_id))
            .cloned())
    }

    async fn list_open_lots(&self, market_id: &str) -> StorageResult<Vec<Lot>> {
        Ok(self
            .lots
            .read()
            .iter()
            .filter(|l| l.market_id == market_id && matches!(l.status, LotStatus::Open))
            .cloned()
            .collect())
    }

    async fn close_lot(&self, id: i64, sell_price: Decimal, realized_pnl: Decimal) -> StorageResult<()> {
        let mut lots = self.lots.write();
        let lot = lots
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("lot {id}")))?;
        lot.status = LotStatus::Closed;
        lot.sell_price = Some(sell_price);
        lot.realized_pnl = realized_pnl;
        Ok(())
    }

    async fn get_bot_state(&self, key: &str) -> StorageResult<Option<BotState>> {
        Ok(self.bot_state.read().get(key).cloned())
    }

    async fn set_bot_state(&self, state: BotState) -> StorageResult<()> {
        self.bot_state.write().insert(state.key.clone(), state);
        Ok(())
    }

    async fn get_configuration(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.configuration.read().get(key).cloned())
    }

    async fn set_configuration(&self, row: ConfigurationRow) -> StorageResult<()> {
        self.configuration.write().insert(row.key, row.value);
        Ok(())
    }

    async fn list_configuration(&self) -> StorageResult<Vec<ConfigurationRow>> {
        Ok(self
            .configuration
            .read()
            .iter()
            .map(|(key, value)| ConfigurationRow {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn insert_daily_snapshot(&self, snapshot: DailySnapshot) -> StorageResult<()> {
        self.daily_snapshots.write().push(snapshot);
        Ok(())
    }

    async fn list_daily_snapshots(&self) -> StorageResult<Vec<DailySnapshot>> {
        Ok(self.daily_snapshots.read().clone())
    }

    async fn append_audit_log(&self, market_id: Option<String>, action: &str, detail: &str) -> StorageResult<()> {
        let id = self.next_audit_id.fetch_add(1, Ordering::Relaxed);
        self.audit_log.write().push(AuditLogEntry {
            id,
            market_id,
            action: action.to_string(),
            detail: detail.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn list_audit_log(&self, market_id: Option<&str>) -> StorageResult<Vec<AuditLogEntry>> {
        Ok(self
            .audit_log
            .read()
            .iter()
            .filter(|e| match market_id {
                Some(m) => e.market_id.as_deref() == Some(m),
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderSide;
    use rust_decimal_macros::dec;

    fn sample_order(id: &str) -> Order {
        Order {
            id: id.to_string(),
            market_id: "BTC-USD".to_string(),
            side: OrderSide::Buy,
            price: dec!(50000),
            size: dec!(0.01),
            status: OrderStatus::Open,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_list_open_orders_round_trips() {
        let store = InMemoryStore::new();
        store.insert_order(sample_order("o1")).await.unwrap();
        let open = store.list_open_orders(Some("BTC-USD")).await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_order_id_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_order(sample_order("o1")).await.unwrap();
        assert!(store.insert_order(sample_order("o1")).await.is_err());
    }

    #[tokio::test]
    async fn set_order_status_removes_from_open_list() {
        let store = InMemoryStore::new();
        store.insert_order(sample_order("o1")).await.unwrap();
        store.set_order_status("o1", OrderStatus::Filled).await.unwrap();
        assert!(store.list_open_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fill_ids_are_assigned_sequentially() {
        let store = InMemoryStore::new();
        let f1 = store
            .insert_fill(Fill {
                id: 0,
                order_id: "o1".to_string(),
                market_id: "BTC-USD".to_string(),
                side: OrderSide::Buy,
                price: dec!(50000),
                size: dec!(0.01),
                fee: Decimal::ZERO,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        let f2 = store
            .insert_fill(Fill {
                id: 0,
                order_id: "o2".to_string(),
                market_id: "BTC-USD".to_string(),
                side: OrderSide::Sell,
                price: dec!(50500),
                size: dec!(0.01),
                fee: Decimal::ZERO,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(f1.id, 1);
        assert_eq!(f2.id, 2);
    }

    #[tokio::test]
    async fn close_lot_sets_terminal_fields() {
        let store = InMemoryStore::new();
        let lot = store
            .insert_lot(Lot {
                id: 0,
                market_id: "BTC-USD".to_string(),
                buy_order_id: "o1".to_string(),
                buy_price: dec!(99),
                buy_size: dec!(1),
                buy_cost: dec!(99),
                buy_time: Utc::now(),
                sell_order_id: Some("o2".to_string()),
                sell_price: None,
                status: LotStatus::Open,
                realized_pnl: Decimal::ZERO,
            })
            .await
            .unwrap();
        store.close_lot(lot.id, dec!(99.99), dec!(0.99)).await.unwrap();
        let lots = store.list_open_lots("BTC-USD").await.unwrap();
        assert!(lots.is_empty());
    }

    #[tokio::test]
    async fn audit_log_filters_by_market() {
        let store = InMemoryStore::new();
        store
            .append_audit_log(Some("BTC-USD".to_string()), "cancel", "ghost order")
            .await
            .unwrap();
        store
            .append_audit_log(Some("ETH-USD".to_string()), "cancel", "out of band")
            .await
            .unwrap();
        let entries = store.list_audit_log(Some("BTC-USD")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].detail, "ghost order");
    }
}
