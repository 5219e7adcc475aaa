//! Telemetry boundary (§4.11): the engine publishes, the out-of-scope
//! transport layer subscribes. Publishing never blocks on subscriber
//! presence; a lagged or closed channel is logged and dropped.

use crate::model::OrderSide;
use rust_decimal::Decimal;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    PriceUpdate {
        market_id: String,
        price: Decimal,
        anchor: Decimal,
        grid_top: Decimal,
    },
    FillEvent {
        market_id: String,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
    },
}

/// Thin wrapper around a `broadcast::Sender` so publish failures (no
/// subscribers, or a lagged receiver) are absorbed here rather than at
/// every call site.
pub struct Telemetry {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl Telemetry {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: TelemetryEvent) {
        if let Err(e) = self.sender.send(event) {
            log::debug!("telemetry publish had no subscribers: {e}");
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(1024)
    }
}
