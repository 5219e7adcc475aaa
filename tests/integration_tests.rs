use gridbot::adapter::mock::MockAdapter;
use gridbot::adapter::paper::PaperAdapter;
use gridbot::adapter::Adapter;
use gridbot::config::EngineConfig;
use gridbot::engine::tick::process_market;
use gridbot::engine::{catchup, profit};
use gridbot::model::{Market, Order, OrderSide, OrderStatus};
use gridbot::storage::InMemoryStore;
use gridbot::telemetry::Telemetry;
use gridbot::Store;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const MARKET: &str = "BTC-USD";

fn harness() -> (Arc<dyn Store>, Arc<Adapter>, Arc<Telemetry>, gridbot::StrategyConfig) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let adapter = Arc::new(Adapter::Mock(MockAdapter::new()));
    let telemetry = Arc::new(Telemetry::default());
    let config = EngineConfig::default().strategy;
    (store, adapter, telemetry, config)
}

fn set_price(adapter: &Adapter, market_id: &str, price: Decimal) {
    match adapter {
        Adapter::Mock(m) => m.set_price(market_id, price),
        Adapter::Paper(p) => {
            if let Adapter::Mock(m) = p.inner() {
                m.set_price(market_id, price);
            }
        }
        Adapter::Real(_) => unreachable!("tests never construct the real adapter"),
    }
}

async fn anchor_of(store: &Arc<dyn Store>, market_id: &str) -> Decimal {
    let state = store
        .get_bot_state(&format!("{market_id}_anchor"))
        .await
        .unwrap()
        .expect("anchor should be set");
    let anchor: gridbot::model::AnchorState = serde_json::from_value(state.value).unwrap();
    anchor.price
}

#[tokio::test]
async fn scenario_1_initial_anchor() {
    let (store, adapter, telemetry, config) = harness();
    set_price(&adapter, MARKET, dec!(50000));

    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    assert_eq!(anchor_of(&store, MARKET).await, dec!(50000));

    let open = store.list_open_orders(Some(MARKET)).await.unwrap();
    assert!(!open.is_empty());
    for order in &open {
        assert!(order.price > dec!(47500) && order.price < dec!(50000));
    }
}

#[tokio::test]
async fn scenario_2_add_only_rebase_under_crash() {
    let (store, adapter, telemetry, config) = harness();
    set_price(&adapter, MARKET, dec!(50000));
    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    set_price(&adapter, MARKET, dec!(30000));
    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    assert_eq!(anchor_of(&store, MARKET).await, dec!(50000));

    let open = store.list_open_orders(Some(MARKET)).await.unwrap();
    assert!(open.iter().any(|o| o.price > dec!(28500) && o.price < dec!(30000)));
}

#[tokio::test]
async fn scenario_3_new_high_moves_anchor_up() {
    let (store, adapter, telemetry, config) = harness();
    set_price(&adapter, MARKET, dec!(50000));
    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    set_price(&adapter, MARKET, dec!(55000));
    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    assert_eq!(anchor_of(&store, MARKET).await, dec!(55000));
}

#[tokio::test]
async fn scenario_4_full_buy_sell_cycle_paper() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let mock = MockAdapter::new();
    mock.set_price(MARKET, dec!(99.00));
    let adapter = Arc::new(Adapter::Paper(PaperAdapter::new(Adapter::Mock(mock))));
    let telemetry = Arc::new(Telemetry::default());
    let mut config = EngineConfig::default().strategy;
    config.grid_step_pct = dec!(0.01);

    store.upsert_market(Market::new(MARKET)).await.unwrap();
    store.set_market_enabled(MARKET, true).await.unwrap();

    let seed = Order {
        id: "seed-buy-1".to_string(),
        market_id: MARKET.to_string(),
        side: OrderSide::Buy,
        price: dec!(99.00),
        size: dec!(1),
        status: OrderStatus::Open,
        created_at: chrono::Utc::now(),
    };
    store.insert_order(seed.clone()).await.unwrap();
    if let Adapter::Paper(paper) = adapter.as_ref() {
        paper.seed_order(&seed);
    }

    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    let fills = store.list_fills_since(MARKET, 0).await.unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].price, dec!(99.00));
    assert_eq!(fills[0].side, OrderSide::Buy);

    let lots = store.list_open_lots(MARKET).await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].buy_price, dec!(99.00));
    assert_eq!(lots[0].sell_price, Some(dec!(99.99)));

    let sell_order_id = lots[0].sell_order_id.clone().expect("sell order should be placed");
    let open_sell = store
        .list_open_orders(Some(MARKET))
        .await
        .unwrap()
        .into_iter()
        .find(|o| o.id == sell_order_id)
        .expect("sell order should be open");
    assert_eq!(open_sell.price, dec!(99.99));
    assert_eq!(open_sell.side, OrderSide::Sell);

    set_price(&adapter, MARKET, dec!(99.99));
    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    let fills = store.list_fills_since(MARKET, 0).await.unwrap();
    assert_eq!(fills.len(), 2);

    let lots = store.list_open_lots(MARKET).await.unwrap();
    assert!(lots.is_empty());

    let current_profit = profit::get_current_monthly_profit(&store).await.unwrap();
    assert_eq!(current_profit, dec!(0.99));
}

#[tokio::test]
async fn scenario_5_pruning_on_price_jump() {
    let (store, adapter, telemetry, config) = harness();
    set_price(&adapter, MARKET, dec!(50000));
    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    let before = store.list_open_orders(Some(MARKET)).await.unwrap();
    assert!(!before.is_empty());

    set_price(&adapter, MARKET, dec!(60000));
    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    let after = store.list_open_orders(Some(MARKET)).await.unwrap();
    for order in &after {
        assert!(order.price > dec!(57000) && order.price < dec!(60000));
    }
    let after_ids: std::collections::HashSet<_> = after.iter().map(|o| o.id.clone()).collect();
    for stale in before.iter().filter(|o| o.price < dec!(57000)) {
        assert!(!after_ids.contains(&stale.id), "stale order {} should have been pruned", stale.id);
    }
}

#[tokio::test]
async fn scenario_6_catchup_miss_fills_at_order_price() {
    let (store, adapter, telemetry, config) = harness();

    store.upsert_market(Market::new(MARKET)).await.unwrap();
    store.set_market_enabled(MARKET, true).await.unwrap();
    store
        .insert_order(Order {
            id: "buy-99".to_string(),
            market_id: MARKET.to_string(),
            side: OrderSide::Buy,
            price: dec!(99.00),
            size: dec!(1),
            status: OrderStatus::Open,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    if let Adapter::Mock(m) = adapter.as_ref() {
        m.set_candles(
            MARKET,
            vec![gridbot::model::Candle {
                start: chrono::Utc::now(),
                low: dec!(98.50),
                high: dec!(99.50),
                open: dec!(99.20),
                close: dec!(99.10),
                volume: dec!(10),
            }],
        );
    }

    catchup::catchup_scan(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    let fills = store.list_fills_since(MARKET, 0).await.unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].price, dec!(99.00));

    assert!(store
        .list_open_orders(Some(MARKET))
        .await
        .unwrap()
        .iter()
        .all(|o| o.id != "buy-99"));
}

#[tokio::test]
async fn scenario_7_zero_price_guard() {
    let (store, adapter, telemetry, config) = harness();
    set_price(&adapter, MARKET, Decimal::ZERO);

    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();

    assert!(store.get_bot_state(&format!("{MARKET}_anchor")).await.unwrap().is_none());
    assert!(store.list_open_orders(Some(MARKET)).await.unwrap().is_empty());
}

#[tokio::test]
async fn property_sync_orders_is_idempotent_when_unchanged() {
    let (store, adapter, telemetry, config) = harness();
    set_price(&adapter, MARKET, dec!(50000));

    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();
    let first = store.list_open_orders(Some(MARKET)).await.unwrap();

    process_market(&store, &adapter, &telemetry, &config, MARKET).await.unwrap();
    let second = store.list_open_orders(Some(MARKET)).await.unwrap();

    let mut first_ids: Vec<_> = first.iter().map(|o| o.id.clone()).collect();
    let mut second_ids: Vec<_> = second.iter().map(|o| o.id.clone()).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);
}
