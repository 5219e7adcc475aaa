//! Paper wrapper (§4.3): delegates market data to the wrapped adapter and
//! intercepts order placement into an in-memory book, so the engine can run
//! its full tick/sync/fill machinery against real market data without
//! risking capital.

use super::{Adapter, AdapterError, AdapterResult, ExchangeAdapter, OpenOrder};
use crate::model::{AdapterFill, Candle, Order, OrderSide, OrderStatus, Product};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone)]
struct PaperOrder {
    market_id: String,
    side: OrderSide,
    price: Decimal,
    size: Decimal,
}

/// Effectively-unbounded paper balances, per §4.3.
const PAPER_BALANCE: Decimal = rust_decimal_macros::dec!(1_000_000_000);

pub struct PaperAdapter {
    inner: Arc<Adapter>,
    order_cache: DashMap<String, PaperOrder>,
}

impl PaperAdapter {
    pub fn new(inner: Adapter) -> Self {
        Self {
            inner: Arc::new(inner),
            order_cache: DashMap::new(),
        }
    }

    /// The wrapped adapter, exposed so callers that hold a `Paper` can still
    /// reach the underlying market-data source (e.g. to inject ticks in tests).
    pub fn inner(&self) -> &Adapter {
        &self.inner
    }

    fn new_order_id() -> String {
        let millis = Utc::now().timestamp_millis();
        let rand: u32 = fastrand::u32(..);
        format!("paper_{}_{}", millis, rand)
    }

    /// Check a candidate set of OPEN orders (or the whole cache for
    /// `market_id` if `None`) against `current_price`, returning one
    /// [`AdapterFill`] per matched order and evicting matched orders from
    /// the cache. Synchronous: this is pure in-memory matching, no I/O.
    pub fn check_fills(
        &self,
        market_id: &str,
        current_price: Decimal,
        candidate_order_ids: Option<&[String]>,
    ) -> Vec<AdapterFill> {
        let ids: Vec<String> = match candidate_order_ids {
            Some(ids) => ids.to_vec(),
            None => self
                .order_cache
                .iter()
                .filter(|e| e.value().market_id == market_id)
                .map(|e| e.key().clone())
                .collect(),
        };

        let mut fills = Vec::new();
        let now = Utc::now();

        for id in ids {
            let Some(order) = self.order_cache.get(&id).map(|e| e.value().clone()) else {
                continue;
            };
            if order.market_id != market_id {
                continue;
            }

            let matched = match order.side {
                OrderSide::Buy => current_price <= order.price,
                OrderSide::Sell => current_price >= order.price,
            };
            if !matched {
                continue;
            }

            fills.push(AdapterFill {
                order_id: id.clone(),
                market_id: market_id.to_string(),
                side: order.side,
                price: order.price,
                size: order.size,
                fee: Decimal::ZERO,
                timestamp: now,
            });
            self.order_cache.remove(&id);
        }

        fills
    }

    /// Re-seed the cache entry for an order the engine placed through
    /// storage but that isn't yet reflected here (used by `sync_orders`
    /// to refresh the matcher's view of the book on restart).
    pub fn seed_order(&self, order: &Order) {
        if order.status != OrderStatus::Open {
            return;
        }
        self.order_cache.insert(
            order.id.clone(),
            PaperOrder {
                market_id: order.market_id.clone(),
                side: order.side,
                price: order.price,
                size: order.size,
            },
        );
    }
}

#[async_trait]
impl ExchangeAdapter for PaperAdapter {
    async fn get_products(&self) -> AdapterResult<Vec<Product>> {
        self.inner.get_products().await
    }

    async fn get_ticker(&self, market_id: &str) -> AdapterResult<Decimal> {
        self.inner.get_ticker(market_id).await
    }

    async fn get_balances(&self) -> AdapterResult<HashMap<String, Decimal>> {
        Ok(HashMap::from([
            ("USD".to_string(), PAPER_BALANCE),
            ("BASE".to_string(), PAPER_BALANCE),
        ]))
    }

    async fn place_limit_order(
        &self,
        market_id: &str,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        _post_only: bool,
    ) -> AdapterResult<String> {
        if size <= Decimal::ZERO {
            return Err(AdapterError::InvalidSize(size.to_string()));
        }
        let id = Self::new_order_id();
        self.order_cache.insert(
            id.clone(),
            PaperOrder {
                market_id: market_id.to_string(),
                side,
                price,
                size,
            },
        );
        log::info!("[paper] placed {:?} {} @ {} on {} ({})", side, size, price, market_id, id);
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> AdapterResult<bool> {
        self.order_cache.remove(order_id);
        Ok(true)
    }

    async fn list_open_orders(&self, market_id: Option<&str>) -> AdapterResult<Vec<OpenOrder>> {
        Ok(self
            .order_cache
            .iter()
            .filter(|e| match market_id {
                Some(m) => e.value().market_id == m,
                None => true,
            })
            .map(|e| OpenOrder {
                id: e.key().clone(),
                market_id: e.value().market_id.clone(),
                side: e.value().side,
                price: e.value().price,
                size: e.value().size,
            })
            .collect())
    }

    async fn get_fills(&self, _since: Option<DateTime<Utc>>) -> AdapterResult<Vec<AdapterFill>> {
        // Paper fills are surfaced synchronously through `check_fills`,
        // driven by the engine's tick/catch-up loop, not polled here.
        Ok(Vec::new())
    }

    async fn get_candles(
        &self,
        market_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity_secs: u32,
    ) -> AdapterResult<Vec<Candle>> {
        self.inner
            .get_candles(market_id, start, end, granularity_secs)
            .await
    }

    async fn stream_ticker(
        &self,
        market_ids: Vec<String>,
        sink: UnboundedSender<(String, Decimal)>,
    ) -> AdapterResult<()> {
        self.inner.stream_ticker(market_ids, sink).await
    }

    async fn stream_fills(&self, _sink: UnboundedSender<AdapterFill>) -> AdapterResult<()> {
        // No-op: fills are detected by the engine calling `check_fills`.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use rust_decimal_macros::dec;

    fn mock_paper() -> PaperAdapter {
        PaperAdapter::new(Adapter::Mock(MockAdapter::new()))
    }

    #[tokio::test]
    async fn placement_allocates_paper_prefixed_id() {
        let paper = mock_paper();
        let id = paper
            .place_limit_order("BTC-USD", OrderSide::Buy, dec!(99), dec!(1), true)
            .await
            .unwrap();
        assert!(id.starts_with("paper_"));
    }

    #[tokio::test]
    async fn cancel_always_succeeds() {
        let paper = mock_paper();
        assert!(paper.cancel_order("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn check_fills_matches_buy_on_touch_and_clears_cache() {
        let paper = mock_paper();
        paper
            .place_limit_order("BTC-USD", OrderSide::Buy, dec!(99), dec!(1), true)
            .await
            .unwrap();

        let fills = paper.check_fills("BTC-USD", dec!(99), None);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(99));
        assert_eq!(fills[0].fee, Decimal::ZERO);

        // Second check at the same price is a no-op: already cleared.
        let fills_again = paper.check_fills("BTC-USD", dec!(99), None);
        assert!(fills_again.is_empty());
    }

    #[tokio::test]
    async fn check_fills_ignores_orders_not_yet_touched() {
        let paper = mock_paper();
        paper
            .place_limit_order("BTC-USD", OrderSide::Buy, dec!(90), dec!(1), true)
            .await
            .unwrap();
        assert!(paper.check_fills("BTC-USD", dec!(95), None).is_empty());
    }

    #[tokio::test]
    async fn check_fills_matches_sell_on_touch() {
        let paper = mock_paper();
        paper
            .place_limit_order("BTC-USD", OrderSide::Sell, dec!(99.99), dec!(1), true)
            .await
            .unwrap();
        let fills = paper.check_fills("BTC-USD", dec!(99.99), None);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, OrderSide::Sell);
    }
}
