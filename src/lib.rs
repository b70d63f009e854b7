use config::{Config, ConfigError};
use serde::Deserialize;

use crate::domain::core::{
    Money, RateCard, SlotGrid, TimeOfDay, TopupPolicy, ValidationError, MINIMUM_TOPUP_MAJOR,
};

pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ArcadeConfig {
    #[serde(default)]
    pub venue: Venue,
    #[serde(default)]
    pub rates: Rates,
    #[serde(default)]
    pub wallet: Wallet,
    #[serde(default)]
    pub logger: Logger,
}

impl ArcadeConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("arcade.toml")
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("ARCADE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<ArcadeConfig>()
    }

    /// 営業時間から候補スロットの格子を作る
    pub fn slot_grid(&self) -> Result<SlotGrid, ValidationError> {
        SlotGrid::new(
            self.venue.open.parse::<TimeOfDay>()?,
            self.venue.close.parse::<TimeOfDay>()?,
            self.venue.step_minutes,
        )
    }

    pub fn rate_card(&self) -> Result<RateCard, ValidationError> {
        RateCard::new(
            Money::from_minor(self.rates.base_per_hour),
            Money::from_minor(self.rates.extra_controller_per_hour),
        )
    }

    pub fn minimum_topup(&self) -> Money {
        Money::from_minor(self.wallet.minimum_topup)
    }

    pub fn topup_policy(&self) -> Result<TopupPolicy, ValidationError> {
        TopupPolicy::new(self.minimum_topup())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Venue {
    pub open: String,
    pub close: String,
    pub step_minutes: u32,
}

impl Default for Venue {
    fn default() -> Self {
        Self {
            open: "10:00".to_owned(),
            close: "22:00".to_owned(),
            step_minutes: 30,
        }
    }
}

/// 料金はすべて最小通貨単位(パイサ)で指定する
#[derive(Clone, Debug, Deserialize)]
pub struct Rates {
    pub base_per_hour: i64,
    pub extra_controller_per_hour: i64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            base_per_hour: 14900,
            extra_controller_per_hour: 4000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Wallet {
    pub minimum_topup: i64,
}

impl Default for Wallet {
    fn default() -> Self {
        Self {
            minimum_topup: MINIMUM_TOPUP_MAJOR * 100,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

impl Default for Logger {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ArcadeConfig::default();
        let grid = config.slot_grid().unwrap();
        assert_eq!(grid.iter().count(), 25);
        let rates = config.rate_card().unwrap();
        assert_eq!(rates.base_per_hour(), Money::from_major(149));
        assert_eq!(rates.extra_controller_per_hour(), Money::from_major(40));
        assert_eq!(config.minimum_topup(), Money::from_major(100));
        assert_eq!(config.topup_policy().unwrap(), TopupPolicy::default());
    }

    #[test]
    fn test_load_without_file_falls_back_to_defaults() {
        let config = ArcadeConfig::load_from("does-not-exist.toml").unwrap();
        assert_eq!(config.venue.step_minutes, 30);
        assert_eq!(config.rates.base_per_hour, 14900);
    }
}
