//! A deterministic in-process adapter for tests and development: no network,
//! no randomness beyond what the caller injects via [`MockAdapter::set_price`].

use super::{AdapterError, AdapterResult, ExchangeAdapter, OpenOrder};
use crate::model::{AdapterFill, Candle, OrderSide, Product};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;

pub struct MockAdapter {
    prices: DashMap<String, Decimal>,
    orders: DashMap<String, OpenOrder>,
    candles: DashMap<String, Vec<Candle>>,
    next_id: AtomicU64,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            prices: DashMap::new(),
            orders: DashMap::new(),
            candles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inject a ticker value for a market; read back by `get_ticker`.
    pub fn set_price(&self, market_id: &str, price: Decimal) {
        self.prices.insert(market_id.to_string(), price);
    }

    /// Inject the candle set `get_candles` returns for a market, regardless
    /// of the requested window.
    pub fn set_candles(&self, market_id: &str, candles: Vec<Candle>) {
        self.candles.insert(market_id.to_string(), candles);
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    async fn get_products(&self) -> AdapterResult<Vec<Product>> {
        Ok(self
            .prices
            .iter()
            .map(|entry| Product {
                id: entry.key().clone(),
                base: entry.key().split('-').next().unwrap_or("").to_string(),
                quote: entry.key().split('-').nth(1).unwrap_or("USD").to_string(),
                volume_24h: Decimal::ZERO,
                status: "online".to_string(),
            })
            .collect())
    }

    async fn get_ticker(&self, market_id: &str) -> AdapterResult<Decimal> {
        self.prices
            .get(market_id)
            .map(|p| *p)
            .ok_or_else(|| AdapterError::NotFound(market_id.to_string()))
    }

    async fn get_balances(&self) -> AdapterResult<HashMap<String, Decimal>> {
        Ok(HashMap::new())
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
        let id = format!("mock_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.orders.insert(
            id.clone(),
            OpenOrder {
                id: id.clone(),
                market_id: market_id.to_string(),
                side,
                price,
                size,
            },
        );
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> AdapterResult<bool> {
        Ok(self.orders.remove(order_id).is_some())
    }

    async fn list_open_orders(&self, market_id: Option<&str>) -> AdapterResult<Vec<OpenOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|e| match market_id {
                Some(m) => e.value().market_id == m,
                None => true,
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_fills(&self, _since: Option<DateTime<Utc>>) -> AdapterResult<Vec<AdapterFill>> {
        Ok(Vec::new())
    }

    async fn get_candles(
        &self,
        market_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _granularity_secs: u32,
    ) -> AdapterResult<Vec<Candle>> {
        Ok(self.candles.get(market_id).map(|c| c.clone()).unwrap_or_default())
    }

    async fn stream_ticker(
        &self,
        _market_ids: Vec<String>,
        _sink: UnboundedSender<(String, Decimal)>,
    ) -> AdapterResult<()> {
        Ok(())
    }

    async fn stream_fills(&self, _sink: UnboundedSender<AdapterFill>) -> AdapterResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn ticker_returns_injected_price() {
        let adapter = MockAdapter::new();
        adapter.set_price("BTC-USD", dec!(50000));
        assert_eq!(adapter.get_ticker("BTC-USD").await.unwrap(), dec!(50000));
    }

    #[tokio::test]
    async fn unknown_market_is_not_found() {
        let adapter = MockAdapter::new();
        assert!(adapter.get_ticker("XYZ-USD").await.is_err());
    }

    #[tokio::test]
    async fn place_then_cancel_round_trips() {
        let adapter = MockAdapter::new();
        let id = adapter
            .place_limit_order("BTC-USD", OrderSide::Buy, dec!(49000), dec!(0.1), true)
            .await
            .unwrap();
        assert_eq!(adapter.list_open_orders(None).await.unwrap().len(), 1);
        assert!(adapter.cancel_order(&id).await.unwrap());
        assert_eq!(adapter.list_open_orders(None).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn zero_size_order_is_rejected() {
        let adapter = MockAdapter::new();
        let result = adapter
            .place_limit_order("BTC-USD", OrderSide::Buy, dec!(49000), dec!(0), true)
            .await;
        assert!(result.is_err());
    }
}
