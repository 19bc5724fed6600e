//! Wire types for the ClimateWise backend.
//!
//! Every field the backend may omit is `Option` with `#[serde(default)]` —
//! absence means unknown, never a parse failure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{ForecastOffset, Product, TimeSelector, TimeSlot, ViewportBBox};
use serde::{Deserialize, Serialize};

// ── Queries ───────────────────────────────────────────────────────────

/// Sort order for timeline listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineOrder {
    NewestFirst,
    OldestFirst,
}

impl TimelineOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineOrder::NewestFirst => "desc",
            TimelineOrder::OldestFirst => "asc",
        }
    }
}

/// Parameters for the status/freshness endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusQuery {
    pub product: Product,
    pub selector: TimeSelector,
    pub effective_zoom: u8,
    pub bbox: ViewportBBox,
    pub lat: f64,
    pub lon: f64,
}

/// Parameters for the JSON grid endpoints (past and forecast share the
/// shape; the selector picks the endpoint).
#[derive(Debug, Clone, PartialEq)]
pub struct GridQuery {
    pub product: Product,
    pub effective_zoom: u8,
    pub selector: TimeSelector,
    pub bbox: ViewportBBox,
}

/// Point-assessment request. Never cached by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PointAssessmentQuery {
    pub lat: f64,
    pub lon: f64,
    pub products: Vec<Product>,
    pub effective_zoom: u8,
    pub selector: TimeSelector,
    /// Nearest-cell search radius; omitted = server default.
    pub radius_km: Option<f64>,
    /// Per-disease weight overrides.
    pub weights: Option<BTreeMap<String, f64>>,
}

/// Ground-station query.
#[derive(Debug, Clone, PartialEq)]
pub struct StationQuery {
    pub product: Product,
    pub bbox: ViewportBBox,
    pub max_age_minutes: u32,
    pub provider: Option<String>,
    pub limit: u32,
}

// ── Responses ─────────────────────────────────────────────────────────

/// Ordered slot list for one product.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineResponse {
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
    #[serde(default)]
    pub latest_granule_id: Option<String>,
}

/// Color legend for one product.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Legend {
    #[serde(default)]
    pub palette: Option<String>,
    #[serde(default)]
    pub stops: Vec<f64>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub units: Option<String>,
}

/// Freshness/liveness summary for the active product and selection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StatusSummary {
    #[serde(default)]
    pub latest_slot: Option<TimeSlot>,
    #[serde(default)]
    pub age_minutes: Option<i64>,
    #[serde(default)]
    pub live: Option<bool>,
    #[serde(default)]
    pub is_daytime: Option<bool>,
    #[serde(default)]
    pub status_text: Option<String>,
}

/// Color-domain hint attached to a grid response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ColorDomain {
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// One grid cell.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GridCell {
    pub lat: f64,
    pub lon: f64,
    pub value: f64,
    #[serde(default)]
    pub cloud_fraction: Option<f64>,
}

/// JSON grid response, past or forecast mode.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GridResponse {
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub bbox: Option<ViewportBBox>,
    #[serde(default)]
    pub domain: Option<ColorDomain>,
    #[serde(default)]
    pub cells: Vec<GridCell>,
}

/// Per-product normalized score within a point assessment.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProductScore {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub domain_min: Option<f64>,
    #[serde(default)]
    pub domain_max: Option<f64>,
    /// Distance to the cell that answered, when a direct hit was
    /// unavailable and the server fell back to a neighbor.
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub distance_note: Option<String>,
}

/// Per-disease risk contribution.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiseaseRisk {
    pub disease: String,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub contributors: BTreeMap<String, f64>,
}

/// Point-assessment envelope.
///
/// Per-product failures do not fail the envelope: a product the server
/// could not score appears in `failed_products` with a reason and is
/// absent from `products`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PointAssessment {
    #[serde(default)]
    pub products: BTreeMap<String, ProductScore>,
    #[serde(default)]
    pub failed_products: BTreeMap<String, String>,
    #[serde(default)]
    pub overall_score_0_10: Option<f64>,
    #[serde(default)]
    pub overall_score_0_100: Option<f64>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub risks: Vec<DiseaseRisk>,
}

/// One ground-station reading.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StationPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub age_minutes: Option<i64>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Station query response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StationsResponse {
    #[serde(default)]
    pub bbox: Option<ViewportBBox>,
    #[serde(default)]
    pub provenance: Option<String>,
    #[serde(default)]
    pub counts_by_provider: BTreeMap<String, u32>,
    #[serde(default)]
    pub stations: Vec<StationPoint>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl GridQuery {
    /// Forecast offset when this query targets a predicted frame.
    pub fn forecast_offset(&self) -> Option<ForecastOffset> {
        match &self.selector {
            TimeSelector::Forecast { offset } => Some(*offset),
            TimeSelector::Past { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_response_tolerates_missing_fields() {
        let resp: GridResponse = serde_json::from_str(r#"{"cells":[]}"#).unwrap();
        assert!(resp.units.is_none());
        assert!(resp.domain.is_none());
        assert!(resp.cells.is_empty());
    }

    #[test]
    fn cell_cloud_fraction_optional() {
        let cell: GridCell =
            serde_json::from_str(r#"{"lat":40.7,"lon":-74.0,"value":3.1}"#).unwrap();
        assert!(cell.cloud_fraction.is_none());
    }

    #[test]
    fn assessment_partial_failures_deserialize() {
        let raw = r#"{
            "products": {"no2": {"value": 1.2, "score": 4.5}},
            "failed_products": {"o3": "granule missing"},
            "overall_score_0_10": 4.5,
            "overall_score_0_100": 45.0,
            "recommendation": "moderate"
        }"#;
        let a: PointAssessment = serde_json::from_str(raw).unwrap();
        assert_eq!(a.products.len(), 1);
        assert_eq!(a.failed_products.get("o3").unwrap(), "granule missing");
        assert_eq!(a.overall_score_0_100, Some(45.0));
    }

    #[test]
    fn status_summary_empty_object() {
        let s: StatusSummary = serde_json::from_str("{}").unwrap();
        assert!(s.latest_slot.is_none());
        assert!(s.live.is_none());
    }
}
