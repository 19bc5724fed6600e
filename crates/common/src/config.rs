//! Orchestrator configuration types.

use serde::{Deserialize, Serialize};

use crate::Product;

/// Top-level configuration for the map daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Backend base URL, e.g. `https://api.climatewise.example`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Product selected at startup.
    #[serde(default = "default_product")]
    pub default_product: Product,

    /// Orchestrator tuning.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Station query defaults.
    #[serde(default)]
    pub stations: StationConfig,
}

/// Timing and retry tuning for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Symmetric bbox padding in degrees.
    #[serde(default = "default_bbox_padding")]
    pub bbox_padding_deg: f64,

    /// Debounce window for status refreshes (ms).
    #[serde(default = "default_status_debounce")]
    pub status_debounce_ms: u64,

    /// Debounce window for grid/forecast-grid refreshes (ms).
    #[serde(default = "default_grid_debounce")]
    pub grid_debounce_ms: u64,

    /// Debounce window for station refreshes (ms).
    #[serde(default = "default_station_debounce")]
    pub station_debounce_ms: u64,

    /// Transient-failure retries per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff (ms); attempt N waits `base * (N+1)`.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Unconditional status re-fetch interval (secs).
    #[serde(default = "default_status_refresh")]
    pub status_refresh_secs: u64,

    /// Timeline lookback window (hours).
    #[serde(default = "default_timeline_lookback")]
    pub timeline_lookback_hours: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        toml_default()
    }
}

/// Station query defaults — runtime mutable via `set_station_filters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Only stations reporting within this many minutes.
    #[serde(default = "default_station_max_age")]
    pub max_age_minutes: u32,

    /// Max stations per response.
    #[serde(default = "default_station_limit")]
    pub limit: u32,

    /// Provider filter; empty = all providers.
    #[serde(default)]
    pub provider: Option<String>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            max_age_minutes: default_station_max_age(),
            limit: default_station_limit(),
            provider: None,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_product: default_product(),
            orchestrator: OrchestratorConfig::default(),
            stations: StationConfig::default(),
        }
    }
}

fn toml_default() -> OrchestratorConfig {
    OrchestratorConfig {
        bbox_padding_deg: default_bbox_padding(),
        status_debounce_ms: default_status_debounce(),
        grid_debounce_ms: default_grid_debounce(),
        station_debounce_ms: default_station_debounce(),
        max_retries: default_max_retries(),
        base_backoff_ms: default_base_backoff(),
        status_refresh_secs: default_status_refresh(),
        timeline_lookback_hours: default_timeline_lookback(),
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://api.climatewise.example".into()
}
fn default_product() -> Product {
    Product::No2
}
fn default_bbox_padding() -> f64 {
    0.4
}
fn default_status_debounce() -> u64 {
    220
}
fn default_grid_debounce() -> u64 {
    220
}
fn default_station_debounce() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    2
}
fn default_base_backoff() -> u64 {
    300
}
fn default_status_refresh() -> u64 {
    60
}
fn default_timeline_lookback() -> u32 {
    72
}
fn default_station_max_age() -> u32 {
    90
}
fn default_station_limit() -> u32 {
    250
}
