//! ClimateWise backend client.
//!
//! `ClimateApi` is the seam the orchestrator talks through; the production
//! implementation is `ClimateRestClient`, tests substitute stubs.

pub mod rate_limit;
pub mod rest;
pub mod types;

use common::{Product, Result, TimeSelector};

pub use rest::ClimateRestClient;
pub use types::{
    ColorDomain, DiseaseRisk, GridCell, GridQuery, GridResponse, Legend, PointAssessment,
    PointAssessmentQuery, ProductScore, StationPoint, StationQuery, StationsResponse, StatusQuery,
    StatusSummary, TimelineOrder, TimelineResponse,
};

/// Remote service contract consumed by the orchestrator.
#[async_trait::async_trait]
pub trait ClimateApi: Send + Sync {
    /// Ordered past timeline for a product plus the latest granule id.
    async fn timeline(
        &self,
        product: Product,
        lookback_hours: u32,
        order: TimelineOrder,
    ) -> Result<TimelineResponse>;

    /// Color legend for a product.
    async fn legend(&self, product: Product) -> Result<Legend>;

    /// Freshness/liveness summary for the active selection.
    async fn status(&self, q: &StatusQuery) -> Result<StatusSummary>;

    /// JSON grid cells for a past granule.
    async fn grid_past(&self, q: &GridQuery) -> Result<GridResponse>;

    /// JSON grid cells for a forecast frame.
    async fn grid_forecast(&self, q: &GridQuery) -> Result<GridResponse>;

    /// Point assessment at a tapped location. Uncached.
    async fn point_assessment(&self, q: &PointAssessmentQuery) -> Result<PointAssessment>;

    /// Ground stations within a bbox.
    async fn stations(&self, q: &StationQuery) -> Result<StationsResponse>;
}

/// Build the raster overlay image URL for the given selection.
///
/// Not a fetch — the resulting URL is handed to the map layer for image
/// rendering. `cache_bust` of zero is omitted so stable keys keep hitting
/// the CDN cache.
pub fn overlay_url(
    base_url: &str,
    product: Product,
    selector: &TimeSelector,
    zoom_bucket: i32,
    cache_bust: u64,
) -> String {
    let base = base_url.trim_end_matches('/');
    let frame = match selector {
        TimeSelector::Past { slot } => format!("granule/{}", slot.granule_id),
        TimeSelector::Forecast { offset } => format!("forecast/{}", offset.hours()),
    };
    let mut url = format!(
        "{}/v1/overlay/{}/{}/{}.png",
        base,
        product.as_str(),
        zoom_bucket,
        frame
    );
    if cache_bust > 0 {
        url.push_str(&format!("?cb={}", cache_bust));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{ForecastOffset, TimeSlot};

    #[test]
    fn overlay_url_past_and_forecast() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let past = TimeSelector::Past {
            slot: TimeSlot {
                granule_id: "G42".into(),
                start,
                end: start,
                saved_at: None,
            },
        };
        assert_eq!(
            overlay_url("https://api.example/", Product::No2, &past, 5, 0),
            "https://api.example/v1/overlay/no2/5/granule/G42.png"
        );

        let fc = TimeSelector::Forecast {
            offset: ForecastOffset::new(3).unwrap(),
        };
        assert_eq!(
            overlay_url("https://api.example", Product::O3, &fc, 6, 7),
            "https://api.example/v1/overlay/o3/6/forecast/3.png?cb=7"
        );
    }
}
