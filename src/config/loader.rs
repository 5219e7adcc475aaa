//! Layered configuration loading: code defaults → TOML file → environment → CLI.

use super::EngineConfig;
use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use std::path::PathBuf;
use validator::Validate;

pub struct ConfigLoader {
    builder: ConfigBuilder,
}

impl ConfigLoader {
    /// Start from the built-in defaults (serialised from [`EngineConfig::default`]).
    pub fn new() -> Result<Self> {
        let defaults = EngineConfig::default();
        let defaults_json =
            serde_json::to_value(&defaults).context("serialising default EngineConfig")?;

        let mut builder = ConfigBuilder::builder();
        builder = add_json_defaults(builder, &defaults_json)?;

        Ok(Self {
            builder: builder.build().context("building default config layer")?,
        })
    }

    /// Layer in a TOML file if present (missing file is not an error).
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        self.builder = ConfigBuilder::builder()
            .add_source(self.builder)
            .add_source(File::from(path).required(false))
            .build()
            .context("layering config file")?;
        Ok(self)
    }

    /// Layer in `GRIDBOT_*` environment variables (`__` separates nested keys).
    pub fn with_env(mut self) -> Result<Self> {
        dotenv::dotenv().ok();
        self.builder = ConfigBuilder::builder()
            .add_source(self.builder)
            .add_source(
                Environment::with_prefix("GRIDBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("layering environment variables")?;
        Ok(self)
    }

    pub fn build(self) -> Result<EngineConfig> {
        let config: EngineConfig = self
            .builder
            .try_deserialize()
            .context("deserialising EngineConfig")?;
        config.validate().context("validating EngineConfig")?;
        config
            .strategy
            .validate_ranges()
            .context("validating StrategyConfig ranges")?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().expect("EngineConfig::default() must serialise cleanly")
    }
}

fn add_json_defaults(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>,
    value: &serde_json::Value,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    let serde_json::Value::Object(map) = value else {
        anyhow::bail!("default EngineConfig did not serialise to a JSON object");
    };
    for (key, v) in map {
        builder = builder.set_default(key, json_to_config_value(v))?;
    }
    Ok(builder)
}

fn json_to_config_value(value: &serde_json::Value) -> config::Value {
    match value {
        serde_json::Value::Null => config::Value::from(Option::<String>::None),
        serde_json::Value::Bool(b) => config::Value::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                config::Value::from(i)
            } else {
                config::Value::from(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => config::Value::from(s.clone()),
        serde_json::Value::Array(items) => {
            config::Value::from(items.iter().map(json_to_config_value).collect::<Vec<_>>())
        }
        serde_json::Value::Object(map) => config::Value::from(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_config_value(v)))
                .collect::<std::collections::HashMap<_, _>>(),
        ),
    }
}
