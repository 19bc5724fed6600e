//! The single owned state struct behind the orchestrator.
//!
//! Every field is mutated only inside fetch-completion handlers or
//! explicit state-machine transitions; readers take a cloned snapshot.

use climate_api::{GridResponse, Legend, PointAssessment, StationsResponse, StatusSummary};
use common::config::StationConfig;
use common::Product;

use crate::mode::{OverlayKey, RenderingMode};
use crate::selection::ProductSelection;
use crate::viewport::Viewport;

/// Raster overlay URL plus the key it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayState {
    pub url: String,
    pub key: OverlayKey,
}

/// Per-resource loading indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadingFlags {
    pub status: bool,
    pub grid: bool,
    pub stations: bool,
    pub assessment: bool,
}

/// Per-resource soft errors. Resource-local by design — a failed station
/// fetch never touches the grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftErrors {
    pub status: Option<String>,
    pub grid: Option<String>,
    pub stations: Option<String>,
    pub assessment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub viewport: Option<Viewport>,
    pub overlay_enabled: bool,
    pub mode: RenderingMode,
    pub pins_visible: bool,

    pub selection: ProductSelection,
    pub station_filters: StationConfig,

    pub legend: Option<Legend>,
    pub overlay: Option<OverlayState>,
    pub grid: Option<GridResponse>,
    pub status: Option<StatusSummary>,
    pub stations: Option<StationsResponse>,
    pub assessment: Option<PointAssessment>,

    pub loading: LoadingFlags,
    pub errors: SoftErrors,

    /// Bumped by `force_refresh`; nonzero values land in overlay URLs.
    pub cache_bust: u64,
}

impl OrchestratorState {
    pub fn new(product: Product, station_filters: StationConfig) -> Self {
        Self {
            viewport: None,
            overlay_enabled: true,
            mode: RenderingMode::Off,
            pins_visible: false,
            selection: ProductSelection::new(product),
            station_filters,
            legend: None,
            overlay: None,
            grid: None,
            status: None,
            stations: None,
            assessment: None,
            loading: LoadingFlags::default(),
            errors: SoftErrors::default(),
            cache_bust: 0,
        }
    }

    pub fn zoom_bucket(&self) -> i32 {
        self.viewport.map(|v| v.zoom_bucket()).unwrap_or(0)
    }
}
