//! Exchange adapter contract (§4.2): the single trait every market-data and
//! order-execution backend implements, plus the closed `{Mock, Real, Paper}`
//! variant the engine is actually constructed with.
//!
//! # Architecture
//!
//! ```text
//!                 ExchangeAdapter (trait)
//!                         │
//!            ┌────────────┼────────────┐
//!       MockAdapter   CoinbaseAdapter   │
//!        (testing)      (live REST+WS)  │
//!                         │             │
//!                    PaperAdapter ───────┘
//!                 (wraps Mock or Real)
//! ```
//!
//! The paper wrapper composes rather than replaces: it delegates market
//! data to whichever adapter it wraps and only intercepts order placement,
//! forming a two-level variant tree per §9's design notes.

pub mod coinbase;
pub mod mock;
pub mod paper;

pub use coinbase::CoinbaseAdapter;
pub use mock::MockAdapter;
pub use paper::PaperAdapter;

use crate::model::{AdapterFill, Candle, Product};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors an [`ExchangeAdapter`] operation can fail with (§4.2's error column).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("market not found: {0}")]
    NotFound(String),
    #[error("insufficient funds for order")]
    InsufficientFunds,
    #[error("invalid order size: {0}")]
    InvalidSize(String),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// The §4.2 contract. Every operation is async because every one of them,
/// in a real adapter, crosses a network boundary; `MockAdapter` and
/// `PaperAdapter` simply resolve immediately.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// List tradable products on the exchange.
    async fn get_products(&self) -> AdapterResult<Vec<Product>>;

    /// Last trade price for `market_id`. Callers treat `0` as "no data".
    async fn get_ticker(&self, market_id: &str) -> AdapterResult<Decimal>;

    /// Effectively-unbounded balances for paper mode; real balances live-mode.
    async fn get_balances(&self) -> AdapterResult<std::collections::HashMap<String, Decimal>>;

    /// Place a resting limit order. `post_only` defaults to `true` — this
    /// engine never crosses the spread (Non-goal: market orders).
    async fn place_limit_order(
        &self,
        market_id: &str,
        side: crate::model::OrderSide,
        price: Decimal,
        size: Decimal,
        post_only: bool,
    ) -> AdapterResult<String>;

    /// Cancel by exchange order id. `NotFound` collapses to `Ok(false)`.
    async fn cancel_order(&self, order_id: &str) -> AdapterResult<bool>;

    /// List OPEN orders, optionally filtered to one market.
    async fn list_open_orders(&self, market_id: Option<&str>) -> AdapterResult<Vec<OpenOrder>>;

    /// Fills since `since` (exclusive), oldest first.
    async fn get_fills(&self, since: Option<DateTime<Utc>>) -> AdapterResult<Vec<AdapterFill>>;

    /// OHLC candles for `market_id` between `start` and `end`.
    async fn get_candles(
        &self,
        market_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity_secs: u32,
    ) -> AdapterResult<Vec<Candle>>;

    /// Subscribe to the ticker channel for `market_ids`, emitting
    /// `(market_id, price)` pairs on `sink` forever. Real implementations
    /// reconnect with exponential backoff on any failure; this call itself
    /// never returns except on an unrecoverable error.
    async fn stream_ticker(
        &self,
        market_ids: Vec<String>,
        sink: tokio::sync::mpsc::UnboundedSender<(String, Decimal)>,
    ) -> AdapterResult<()>;

    /// Subscribe to this account's private fills channel, if the adapter
    /// has one. Mock/Paper adapters resolve immediately with no-op streams
    /// since fill detection for them runs through `check_fills` instead.
    async fn stream_fills(
        &self,
        sink: tokio::sync::mpsc::UnboundedSender<AdapterFill>,
    ) -> AdapterResult<()>;
}

/// A resting order as reported by `list_open_orders`.
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub id: String,
    pub market_id: String,
    pub side: crate::model::OrderSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// The closed adapter variant (§9 design notes): everything the engine
/// talks to is one of these three shapes.
pub enum Adapter {
    Mock(MockAdapter),
    Real(CoinbaseAdapter),
    Paper(PaperAdapter),
}

#[async_trait]
impl ExchangeAdapter for Adapter {
    async fn get_products(&self) -> AdapterResult<Vec<Product>> {
        match self {
            Adapter::Mock(a) => a.get_products().await,
            Adapter::Real(a) => a.get_products().await,
            Adapter::Paper(a) => a.get_products().await,
        }
    }

    async fn get_ticker(&self, market_id: &str) -> AdapterResult<Decimal> {
        match self {
            Adapter::Mock(a) => a.get_ticker(market_id).await,
            Adapter::Real(a) => a.get_ticker(market_id).await,
            Adapter::Paper(a) => a.get_ticker(market_id).await,
        }
    }

    async fn get_balances(&self) -> AdapterResult<std::collections::HashMap<String, Decimal>> {
        match self {
            Adapter::Mock(a) => a.get_balances().await,
            Adapter::Real(a) => a.get_balances().await,
            Adapter::Paper(a) => a.get_balances().await,
        }
    }

    async fn place_limit_order(
        &self,
        market_id: &str,
        side: crate::model::OrderSide,
        price: Decimal,
        size: Decimal,
        post_only: bool,
    ) -> AdapterResult<String> {
        match self {
            Adapter::Mock(a) => a.place_limit_order(market_id, side, price, size, post_only).await,
            Adapter::Real(a) => a.place_limit_order(market_id, side, price, size, post_only).await,
            Adapter::Paper(a) => a.place_limit_order(market_id, side, price, size, post_only).await,
        }
    }

    async fn cancel_order(&self, order_id: &str) -> AdapterResult<bool> {
        match self {
            Adapter::Mock(a) => a.cancel_order(order_id).await,
            Adapter::Real(a) => a.cancel_order(order_id).await,
            Adapter::Paper(a) => a.cancel_order(order_id).await,
        }
    }

    async fn list_open_orders(&self, market_id: Option<&str>) -> AdapterResult<Vec<OpenOrder>> {
        match self {
            Adapter::Mock(a) => a.list_open_orders(market_id).await,
            Adapter::Real(a) => a.list_open_orders(market_id).await,
            Adapter::Paper(a) => a.list_open_orders(market_id).await,
        }
    }

    async fn get_fills(&self, since: Option<DateTime<Utc>>) -> AdapterResult<Vec<AdapterFill>> {
        match self {
            Adapter::Mock(a) => a.get_fills(since).await,
            Adapter::Real(a) => a.get_fills(since).await,
            Adapter::Paper(a) => a.get_fills(since).await,
        }
    }

    async fn get_candles(
        &self,
        market_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity_secs: u32,
    ) -> AdapterResult<Vec<Candle>> {
        match self {
            Adapter::Mock(a) => a.get_candles(market_id, start, end, granularity_secs).await,
            Adapter::Real(a) => a.get_candles(market_id, start, end, granularity_secs).await,
            Adapter::Paper(a) => a.get_candles(market_id, start, end, granularity_secs).await,
        }
    }

    async fn stream_ticker(
        &self,
        market_ids: Vec<String>,
        sink: tokio::sync::mpsc::UnboundedSender<(String, Decimal)>,
    ) -> AdapterResult<()> {
        match self {
            Adapter::Mock(a) => a.stream_ticker(market_ids, sink).await,
            Adapter::Real(a) => a.stream_ticker(market_ids, sink).await,
            Adapter::Paper(a) => a.stream_ticker(market_ids, sink).await,
        }
    }

    async fn stream_fills(
        &self,
        sink: tokio::sync::mpsc::UnboundedSender<AdapterFill>,
    ) -> AdapterResult<()> {
        match self {
            Adapter::Mock(a) => a.stream_fills(sink).await,
            Adapter::Real(a) => a.stream_fills(sink).await,
            Adapter::Paper(a) => a.stream_fills(sink).await,
        }
    }
}
