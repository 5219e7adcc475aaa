//! Pure grid-strategy functions (§4.1). No I/O, no suspension points —
//! everything here is a plain function of a [`StrategyConfig`] and its inputs.

use crate::config::{ProfitMode, SizingMode, StrategyConfig};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Smallest order size the engine will place, regardless of sizing mode.
pub const MIN_ORDER_SIZE: Decimal = dec!(0.00001);

/// Rebase the anchor upward only (I4). `old` absent ⇒ adopt `current`.
pub fn rebase_anchor(current: Decimal, old: Option<Decimal>) -> Decimal {
    match old {
        None => current,
        Some(old) => old.max(current),
    }
}

/// Top of the grid: `anchor`, optionally discounted by `buffer_pct`.
pub fn grid_top(config: &StrategyConfig, anchor: Decimal) -> Decimal {
    if config.buffer_enabled && config.buffer_pct > Decimal::ZERO {
        anchor * (Decimal::ONE - config.buffer_pct)
    } else {
        anchor
    }
}

/// Desired BUY levels between the staging band and the grid top, strictly
/// decreasing, bounded by `max_orders`, every level `< current`.
pub fn buy_levels(config: &StrategyConfig, anchor: Decimal, current: Decimal) -> Vec<Decimal> {
    let one = Decimal::ONE;
    let grid_top = grid_top(config, anchor);

    let lower_bound = current * (one - config.staging_band_pct);
    let step_factor = one - config.grid_step_pct;

    let mut levels = Vec::new();
    let mut level_price = grid_top * step_factor;

    while level_price > lower_bound {
        if level_price < current {
            levels.push(level_price.round_dp(8));
        }
        level_price *= step_factor;

        if levels.len() as u64 > config.max_orders as u64 {
            break;
        }
    }

    levels
}

/// Sell price for a filled buy at `buy_price`: `STEP`-family modes use
/// `grid_step_pct` as the margin; only `CUSTOM` uses `custom_profit_pct`.
pub fn sell_price(config: &StrategyConfig, buy_price: Decimal) -> Decimal {
    let margin = match config.profit_mode {
        ProfitMode::Custom => config.custom_profit_pct,
        ProfitMode::Step | ProfitMode::StepReinvest | ProfitMode::SmartReinvest => {
            config.grid_step_pct
        }
    };
    (buy_price * (Decimal::ONE + margin)).round_dp(8)
}

/// True iff `order_price` has fallen out of the staging band below `current`.
pub fn should_prune(config: &StrategyConfig, order_price: Decimal, current: Decimal) -> bool {
    let lower_bound = current * (Decimal::ONE - config.staging_band_pct);
    order_price < lower_bound
}

/// Budget available for sizing this tick, inflated by banked profit once
/// `SMART_REINVEST` clears its monthly target.
pub fn effective_budget(config: &StrategyConfig, current_month_profit: Decimal) -> Decimal {
    if config.profit_mode == ProfitMode::SmartReinvest
        && current_month_profit >= config.monthly_profit_target_usd
    {
        config.budget + (current_month_profit - config.monthly_profit_target_usd)
    } else {
        config.budget
    }
}

/// Order size for a new placement at `price`, per the configured sizing mode,
/// floored at [`MIN_ORDER_SIZE`].
pub fn order_size(config: &StrategyConfig, effective_budget: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return MIN_ORDER_SIZE;
    }
    let raw = match config.sizing_mode {
        SizingMode::BudgetSplit => {
            let denom = Decimal::from(config.max_orders.max(1));
            (effective_budget / denom) / price
        }
        SizingMode::FixedUsd => config.fixed_usd_per_trade / price,
        SizingMode::CapitalPct => {
            (effective_budget * config.capital_pct_per_trade / dec!(100)) / price
        }
    };
    raw.round_dp(8).max(MIN_ORDER_SIZE)
}

/// Relative-tolerance match used by `sync_orders` to decide whether an open
/// order still sits on a currently-desired grid level.
pub fn price_tolerance(grid_step_pct: Decimal) -> Decimal {
    (grid_step_pct * dec!(0.2)).max(dec!(0.0000001))
}

/// `true` iff `price` is within relative tolerance of `level`.
pub fn within_tolerance(price: Decimal, level: Decimal, tolerance: Decimal) -> bool {
    if level == Decimal::ZERO {
        return price == Decimal::ZERO;
    }
    ((price - level).abs() / level) < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn default_config() -> StrategyConfig {
        StrategyConfig::default()
    }

    #[test]
    fn rebase_adopts_current_when_no_prior_anchor() {
        assert_eq!(rebase_anchor(dec!(50000), None), dec!(50000));
    }

    #[test]
    fn rebase_never_moves_down() {
        assert_eq!(rebase_anchor(dec!(30000), Some(dec!(50000))), dec!(50000));
    }

    #[test]
    fn rebase_moves_up_on_new_high() {
        assert_eq!(rebase_anchor(dec!(55000), Some(dec!(50000))), dec!(55000));
    }

    #[test]
    fn buy_levels_are_strictly_decreasing_and_below_current() {
        let config = default_config();
        let levels = buy_levels(&config, dec!(50000), dec!(50000));
        assert!(!levels.is_empty());
        for pair in levels.windows(2) {
            assert!(pair[0] > pair[1]);
        }
        let lower_bound = dec!(50000) * (Decimal::ONE - config.staging_band_pct);
        for level in &levels {
            assert!(*level < dec!(50000));
            assert!(*level > lower_bound);
        }
        assert!((levels.len() as u32) <= config.max_orders);
    }

    #[test]
    fn buy_levels_respects_buffer() {
        let mut config = default_config();
        config.buffer_enabled = true;
        config.buffer_pct = dec!(0.01);
        let with_buffer = buy_levels(&config, dec!(50000), dec!(50000));
        config.buffer_enabled = false;
        let without_buffer = buy_levels(&config, dec!(50000), dec!(50000));
        assert!(with_buffer[0] < without_buffer[0]);
    }

    #[test]
    fn sell_price_step_mode_uses_grid_step() {
        let mut config = default_config();
        config.grid_step_pct = dec!(0.01);
        config.profit_mode = ProfitMode::Step;
        assert_eq!(sell_price(&config, dec!(99)), dec!(99.99));
    }

    #[test]
    fn sell_price_custom_mode_uses_custom_margin() {
        let mut config = default_config();
        config.grid_step_pct = dec!(0.01);
        config.profit_mode = ProfitMode::Custom;
        config.custom_profit_pct = dec!(0.02);
        assert_eq!(sell_price(&config, dec!(100)), dec!(102));
    }

    #[test]
    fn sell_price_is_always_above_buy_price() {
        let config = default_config();
        for buy in [dec!(1), dec!(100), dec!(50000), dec!(0.0001)] {
            assert!(sell_price(&config, buy) > buy);
        }
    }

    #[test]
    fn should_prune_outside_band() {
        let config = default_config();
        assert!(should_prune(&config, dec!(47000), dec!(50000)));
        assert!(!should_prune(&config, dec!(48000), dec!(50000)));
    }

    #[test]
    fn effective_budget_plain_mode_ignores_profit() {
        let config = default_config();
        assert_eq!(effective_budget(&config, dec!(5000)), config.budget);
    }

    #[test]
    fn effective_budget_smart_reinvest_adds_surplus_above_target() {
        let mut config = default_config();
        config.profit_mode = ProfitMode::SmartReinvest;
        config.monthly_profit_target_usd = dec!(1000);
        assert_eq!(effective_budget(&config, dec!(1500)), config.budget + dec!(500));
        assert_eq!(effective_budget(&config, dec!(900)), config.budget);
    }

    #[test]
    fn order_size_budget_split() {
        let mut config = default_config();
        config.budget = dec!(1000);
        config.max_orders = 10;
        let size = order_size(&config, effective_budget(&config, Decimal::ZERO), dec!(100));
        assert_eq!(size, dec!(1));
    }

    #[test]
    fn order_size_is_floored_at_minimum() {
        let mut config = default_config();
        config.sizing_mode = SizingMode::FixedUsd;
        config.fixed_usd_per_trade = dec!(0.0000001);
        let size = order_size(&config, config.budget, dec!(50000));
        assert_eq!(size, MIN_ORDER_SIZE);
    }

    #[test]
    fn within_tolerance_matches_close_prices() {
        let tol = price_tolerance(dec!(0.0033));
        assert!(within_tolerance(dec!(100.01), dec!(100), tol));
        assert!(!within_tolerance(dec!(110), dec!(100), tol));
    }

    proptest::proptest! {
        #[test]
        fn prop_anchor_equals_running_max(prices in proptest::collection::vec(1i64..200_000, 1..50)) {
            let mut anchor: Option<Decimal> = None;
            let mut running_max = Decimal::MIN;
            for p in prices {
                let price = Decimal::from(p);
                running_max = running_max.max(price);
                anchor = Some(rebase_anchor(price, anchor));
            }
            proptest::prop_assert_eq!(anchor.unwrap(), running_max);
        }

        #[test]
        fn prop_sell_price_strictly_above_buy(buy in 1i64..10_000_000) {
            let config = StrategyConfig::default();
            let buy_price = Decimal::from(buy) / dec!(100);
            proptest::prop_assert!(sell_price(&config, buy_price) > buy_price);
        }

        #[test]
        fn prop_buy_levels_bounded_and_decreasing(
            anchor in 100i64..200_000,
            current in 100i64..200_000,
        ) {
            let config = StrategyConfig::default();
            let levels = buy_levels(&config, Decimal::from(anchor), Decimal::from(current));
            proptest::prop_assert!((levels.len() as u32) <= config.max_orders);
            for pair in levels.windows(2) {
                proptest::prop_assert!(pair[0] > pair[1]);
            }
            for level in &levels {
                proptest::prop_assert!(*level < Decimal::from(current));
            }
        }
    }
}
