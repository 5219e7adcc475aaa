//! Strategy and engine configuration: defaults, validation, hot-reload patches.

pub mod loader;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub use loader::ConfigLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfitMode {
    Step,
    Custom,
    StepReinvest,
    SmartReinvest,
}

impl Default for ProfitMode {
    fn default() -> Self {
        ProfitMode::Step
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingMode {
    BudgetSplit,
    FixedUsd,
    CapitalPct,
}

impl Default for SizingMode {
    fn default() -> Self {
        SizingMode::BudgetSplit
    }
}

/// The §4.1 hot-reloadable strategy configuration.
///
/// `validator`'s `#[validate(range(..))]` only covers the plain numeric
/// fields here; the `Decimal` fields are range-checked by hand in
/// [`StrategyConfig::validate_ranges`] since `validator` has no blanket
/// impl for fixed-point decimals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct StrategyConfig {
    pub grid_step_pct: Decimal,
    pub staging_band_pct: Decimal,
    #[validate(range(min = 1))]
    pub max_orders: u32,
    pub buffer_enabled: bool,
    pub buffer_pct: Decimal,
    pub profit_mode: ProfitMode,
    pub custom_profit_pct: Decimal,
    pub monthly_profit_target_usd: Decimal,
    pub budget: Decimal,
    pub sizing_mode: SizingMode,
    pub fixed_usd_per_trade: Decimal,
    pub capital_pct_per_trade: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            grid_step_pct: dec!(0.0033),
            staging_band_pct: dec!(0.05),
            max_orders: 490,
            buffer_enabled: false,
            buffer_pct: Decimal::ZERO,
            profit_mode: ProfitMode::Step,
            custom_profit_pct: dec!(0.01),
            monthly_profit_target_usd: dec!(1000),
            budget: dec!(1000),
            sizing_mode: SizingMode::BudgetSplit,
            fixed_usd_per_trade: dec!(10),
            capital_pct_per_trade: dec!(1.0),
        }
    }
}

/// A sparse patch applied via the Control Port's `update_config`.
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyConfigPatch {
    pub grid_step_pct: Option<Decimal>,
    pub staging_band_pct: Option<Decimal>,
    pub max_orders: Option<u32>,
    pub buffer_enabled: Option<bool>,
    pub buffer_pct: Option<Decimal>,
    pub profit_mode: Option<ProfitMode>,
    pub custom_profit_pct: Option<Decimal>,
    pub monthly_profit_target_usd: Option<Decimal>,
    pub budget: Option<Decimal>,
    pub sizing_mode: Option<SizingMode>,
    pub fixed_usd_per_trade: Option<Decimal>,
    pub capital_pct_per_trade: Option<Decimal>,
}

impl StrategyConfig {
    /// Range checks `validator` can't express over `Decimal`.
    pub fn validate_ranges(&self) -> anyhow::Result<()> {
        if self.grid_step_pct <= Decimal::ZERO {
            anyhow::bail!("grid_step_pct must be > 0, got {}", self.grid_step_pct);
        }
        if self.staging_band_pct < Decimal::ZERO || self.staging_band_pct > Decimal::ONE {
            anyhow::bail!(
                "staging_band_pct must be within [0, 1], got {}",
                self.staging_band_pct
            );
        }
        if self.buffer_pct < Decimal::ZERO || self.buffer_pct > Decimal::ONE {
            anyhow::bail!("buffer_pct must be within [0, 1], got {}", self.buffer_pct);
        }
        if self.custom_profit_pct <= Decimal::ZERO {
            anyhow::bail!(
                "custom_profit_pct must be > 0, got {}",
                self.custom_profit_pct
            );
        }
        if self.monthly_profit_target_usd < Decimal::ZERO {
            anyhow::bail!("monthly_profit_target_usd must be >= 0");
        }
        if self.budget <= Decimal::ZERO {
            anyhow::bail!("budget must be > 0, got {}", self.budget);
        }
        if self.fixed_usd_per_trade <= Decimal::ZERO {
            anyhow::bail!("fixed_usd_per_trade must be > 0");
        }
        if self.capital_pct_per_trade <= Decimal::ZERO {
            anyhow::bail!("capital_pct_per_trade must be > 0");
        }
        Ok(())
    }

    /// Apply a patch in place, leaving unset fields untouched, then re-validate.
    pub fn apply_patch(&mut self, patch: &StrategyConfigPatch) -> anyhow::Result<()> {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = patch.$field {
                    self.$field = v;
                }
            };
        }
        set!(grid_step_pct);
        set!(staging_band_pct);
        set!(max_orders);
        set!(buffer_enabled);
        set!(buffer_pct);
        set!(profit_mode);
        set!(custom_profit_pct);
        set!(monthly_profit_target_usd);
        set!(budget);
        set!(sizing_mode);
        set!(fixed_usd_per_trade);
        set!(capital_pct_per_trade);

        self.validate()?;
        self.validate_ranges()?;
        Ok(())
    }
}

/// Which adapter variant the engine should construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Mock,
    Real,
}

/// Process-wide configuration: everything the engine needs besides the
/// per-market strategy settings, which live in `Configuration`/`Market.settings`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    #[validate(length(min = 1))]
    pub markets: Vec<String>,
    pub adapter: AdapterKind,
    pub paper_trading: bool,
    #[validate(range(min = 1))]
    pub tick_interval_secs: u64,
    #[validate(range(min = 1))]
    pub catchup_interval_secs: u64,
    pub database_url: Option<String>,
    #[serde(flatten)]
    pub strategy: StrategyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            markets: vec!["BTC-USD".to_string()],
            adapter: AdapterKind::Mock,
            paper_trading: true,
            tick_interval_secs: 5,
            catchup_interval_secs: 60,
            database_url: None,
            strategy: StrategyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(StrategyConfig::default().validate().is_ok());
        assert!(StrategyConfig::default().validate_ranges().is_ok());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_staging_band() {
        let mut cfg = StrategyConfig::default();
        cfg.staging_band_pct = dec!(1.5);
        assert!(cfg.validate_ranges().is_err());
    }

    #[test]
    fn patch_leaves_unset_fields_unchanged() {
        let mut cfg = StrategyConfig::default();
        let patch = StrategyConfigPatch {
            budget: Some(dec!(2000)),
            ..Default::default()
        };
        cfg.apply_patch(&patch).unwrap();
        assert_eq!(cfg.budget, dec!(2000));
        assert_eq!(cfg.grid_step_pct, dec!(0.0033));
    }

    #[test]
    fn patch_rejects_invalid_result() {
        let mut cfg = StrategyConfig::default();
        let patch = StrategyConfigPatch {
            grid_step_pct: Some(dec!(-0.1)),
            ..Default::default()
        };
        assert!(cfg.apply_patch(&patch).is_err());
    }
}
