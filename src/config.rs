//! Configuration loader — merges env vars, .env file, and config.toml.

use common::config::MapConfig;
use common::{Error, Product};
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 0")))?;
    if parsed < 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn validate_config(config: &MapConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.base_url.trim().is_empty() {
        issues.push("base_url must not be empty".into());
    }
    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        issues.push("base_url must start with http:// or https://".into());
    }

    let orch = &config.orchestrator;
    if orch.bbox_padding_deg < 0.0 {
        issues.push("orchestrator.bbox_padding_deg must be >= 0".into());
    }
    if orch.status_debounce_ms == 0 {
        issues.push("orchestrator.status_debounce_ms must be > 0".into());
    }
    if orch.grid_debounce_ms == 0 {
        issues.push("orchestrator.grid_debounce_ms must be > 0".into());
    }
    if orch.station_debounce_ms == 0 {
        issues.push("orchestrator.station_debounce_ms must be > 0".into());
    }
    if orch.base_backoff_ms == 0 {
        issues.push("orchestrator.base_backoff_ms must be > 0".into());
    }
    if orch.status_refresh_secs == 0 {
        issues.push("orchestrator.status_refresh_secs must be > 0".into());
    }
    if orch.timeline_lookback_hours == 0 {
        issues.push("orchestrator.timeline_lookback_hours must be > 0".into());
    }

    if config.stations.max_age_minutes == 0 {
        issues.push("stations.max_age_minutes must be > 0".into());
    }
    if config.stations.limit == 0 {
        issues.push("stations.limit must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load map configuration from environment and optional config file.
pub fn load_config() -> Result<MapConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = MapConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(url) = std::env::var("CLIMATEWISE_BASE_URL") {
        config.base_url = url.trim().to_string();
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_PRODUCT") {
        config.default_product = Product::parse(&raw).ok_or_else(|| {
            Error::Config(format!(
                "CLIMATEWISE_PRODUCT must be one of: {}",
                Product::ALL
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_BBOX_PADDING_DEG") {
        config.orchestrator.bbox_padding_deg =
            parse_non_negative_f64(&raw, "CLIMATEWISE_BBOX_PADDING_DEG")?;
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_STATUS_REFRESH_SECS") {
        config.orchestrator.status_refresh_secs =
            parse_positive_u64(&raw, "CLIMATEWISE_STATUS_REFRESH_SECS")?;
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_MAX_RETRIES") {
        config.orchestrator.max_retries = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::Config("CLIMATEWISE_MAX_RETRIES must be an integer >= 0".into()))?;
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_TIMELINE_LOOKBACK_HOURS") {
        config.orchestrator.timeline_lookback_hours =
            parse_positive_u64(&raw, "CLIMATEWISE_TIMELINE_LOOKBACK_HOURS")? as u32;
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_STATION_MAX_AGE_MINUTES") {
        config.stations.max_age_minutes =
            parse_positive_u64(&raw, "CLIMATEWISE_STATION_MAX_AGE_MINUTES")? as u32;
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_STATION_LIMIT") {
        config.stations.limit = parse_positive_u64(&raw, "CLIMATEWISE_STATION_LIMIT")? as u32;
    }
    if let Ok(raw) = std::env::var("CLIMATEWISE_STATION_PROVIDER") {
        let trimmed = raw.trim();
        config.stations.provider = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    // 5. Validate.
    validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(validate_config(&MapConfig::default()).is_ok());
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut config = MapConfig::default();
        config.base_url = "not-a-url".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let mut config = MapConfig::default();
        config.orchestrator.grid_debounce_ms = 0;
        assert!(validate_config(&config).is_err());
    }
}
