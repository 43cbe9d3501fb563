/// Configuration loading from a TOML file (§2 ambient stack, §6 config keys).
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, TradingError};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TradingError::ConfigError(format!("failed to read config file: {e}")))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| TradingError::ConfigError(format!("failed to parse config: {e}")))?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.universe.is_empty() {
        return Err(TradingError::ConfigError("universe is empty".to_string()));
    }

    if config.so_capital_pct <= 0.0 || config.so_capital_pct > 1.0 {
        return Err(TradingError::ConfigError(format!(
            "invalid so_capital_pct: {}",
            config.so_capital_pct
        )));
    }

    if config.max_position_size_pct <= 0.0 || config.max_position_size_pct > 1.0 {
        return Err(TradingError::ConfigError(format!(
            "invalid max_position_size_pct: {}",
            config.max_position_size_pct
        )));
    }

    if config.slip_guard_adv_pct <= 0.0 {
        return Err(TradingError::ConfigError("slip_guard_adv_pct must be > 0".to_string()));
    }

    if config.stealth_trailing_min > config.stealth_trailing_max {
        return Err(TradingError::ConfigError(
            "stealth_trailing_min must be <= stealth_trailing_max".to_string(),
        ));
    }

    if config.health_check_frequency_min <= 0.0 {
        return Err(TradingError::ConfigError("health_check_frequency_min must be > 0".to_string()));
    }

    if config.max_concurrent_positions == 0 {
        return Err(TradingError::ConfigError("max_concurrent_positions must be > 0".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_universe() {
        let mut config = Config::default();
        config.universe.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_inverted_trailing_bounds() {
        let mut config = Config::default();
        config.universe.push("AAPL".to_string());
        config.stealth_trailing_min = 0.05;
        config.stealth_trailing_max = 0.01;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn accepts_defaults_with_universe() {
        let mut config = Config::default();
        config.universe.push("AAPL".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
