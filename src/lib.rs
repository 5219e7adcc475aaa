//! Limit-order grid trading engine for a single spot-market exchange
//! account: a paper-trading-first engine that maintains a ladder of buy
//! orders below the recent high of a market and places a matching sell
//! order one grid step above each fill.

#![warn(rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

pub mod adapter;
pub mod config;
pub mod engine;
pub mod model;
pub mod storage;
pub mod strategy;
pub mod telemetry;

pub use adapter::{Adapter, AdapterError, ExchangeAdapter};
pub use config::{EngineConfig, StrategyConfig};
pub use engine::{ControlPort, Engine, EngineStatus};
pub use storage::{InMemoryStore, Store};
pub use telemetry::{Telemetry, TelemetryEvent};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

pub fn version_string() -> String {
    format!("{NAME} v{VERSION}")
}
