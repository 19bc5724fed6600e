//! REST client for the ClimateWise backend.
//!
//! Covers: timeline listing, legends, freshness status, JSON grid queries
//! (past and forecast), point assessment, and ground-station queries.
//! All methods are read-rate-limited and connection-pooled.

use common::{Error, Product, Result, TimeSelector};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::rate_limit::RateLimiter;
use crate::types::{
    GridQuery, GridResponse, Legend, PointAssessment, PointAssessmentQuery, StationQuery,
    StationsResponse, StatusQuery, StatusSummary, TimelineOrder, TimelineResponse,
};
use crate::ClimateApi;

/// Async REST client for the ClimateWise data API.
#[derive(Debug, Clone)]
pub struct ClimateRestClient {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl ClimateRestClient {
    /// Create a new REST client against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("climatewise-map/0.1")
            .pool_max_idle_per_host(4)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(),
        }
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-2xx response to `Error::Api`, otherwise hand the body to
    /// serde. A body that is not the JSON we expected (HTML error page)
    /// maps to `Error::Decode` so the retry layer treats it as transient.
    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::http(e.to_string(), e.is_timeout()))?;

        if !(200..300).contains(&status) {
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|_| Error::Decode(preview(&body)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.limiter.acquire().await;

        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| Error::http(e.to_string(), e.is_timeout() || e.is_connect()))?;

        Self::read_json(resp).await
    }

    /// Time-selector query params shared by status and grid endpoints.
    fn selector_params(selector: &TimeSelector, out: &mut Vec<(&'static str, String)>) {
        match selector {
            TimeSelector::Past { slot } => out.push(("granule_id", slot.granule_id.clone())),
            TimeSelector::Forecast { offset } => {
                out.push(("forecast_hours", offset.hours().to_string()))
            }
        }
    }
}

#[async_trait::async_trait]
impl ClimateApi for ClimateRestClient {
    async fn timeline(
        &self,
        product: Product,
        lookback_hours: u32,
        order: TimelineOrder,
    ) -> Result<TimelineResponse> {
        let path = format!("/v1/products/{}/timeline", product.as_str());
        let query = [
            ("lookback_hours", lookback_hours.to_string()),
            ("order", order.as_str().to_string()),
        ];
        let resp: TimelineResponse = self.get_json(&path, &query).await?;

        debug!(
            product = %product,
            slots = resp.slots.len(),
            "Fetched timeline"
        );
        Ok(resp)
    }

    async fn legend(&self, product: Product) -> Result<Legend> {
        let path = format!("/v1/products/{}/legend", product.as_str());
        self.get_json(&path, &[]).await
    }

    async fn status(&self, q: &StatusQuery) -> Result<StatusSummary> {
        let mut query = vec![
            ("product", q.product.as_str().to_string()),
            ("zoom", q.effective_zoom.to_string()),
            ("bbox", q.bbox.to_query()),
            ("lat", format!("{:.5}", q.lat)),
            ("lon", format!("{:.5}", q.lon)),
        ];
        Self::selector_params(&q.selector, &mut query);

        self.get_json("/v1/status", &query).await
    }

    async fn grid_past(&self, q: &GridQuery) -> Result<GridResponse> {
        let granule_id = q
            .selector
            .granule_id()
            .ok_or_else(|| Error::Validation("past grid query without a granule id".into()))?;

        let query = [
            ("product", q.product.as_str().to_string()),
            ("zoom", q.effective_zoom.to_string()),
            ("granule_id", granule_id.to_string()),
            ("bbox", q.bbox.to_query()),
        ];
        let resp: GridResponse = self.get_json("/v1/grid", &query).await?;
        debug!(product = %q.product, cells = resp.cells.len(), "Fetched past grid");
        Ok(resp)
    }

    async fn grid_forecast(&self, q: &GridQuery) -> Result<GridResponse> {
        let offset = q.forecast_offset().ok_or_else(|| {
            Error::Validation("forecast grid query without a forecast offset".into())
        })?;

        let query = [
            ("product", q.product.as_str().to_string()),
            ("zoom", q.effective_zoom.to_string()),
            ("hours", offset.hours().to_string()),
            ("bbox", q.bbox.to_query()),
        ];
        let resp: GridResponse = self.get_json("/v1/grid/forecast", &query).await?;
        debug!(product = %q.product, cells = resp.cells.len(), "Fetched forecast grid");
        Ok(resp)
    }

    async fn point_assessment(&self, q: &PointAssessmentQuery) -> Result<PointAssessment> {
        self.limiter.acquire().await;

        let mut body = json!({
            "lat": q.lat,
            "lon": q.lon,
            "products": q.products.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            "zoom": q.effective_zoom,
        });
        match &q.selector {
            TimeSelector::Past { slot } => body["granule_id"] = json!(slot.granule_id),
            TimeSelector::Forecast { offset } => body["forecast_hours"] = json!(offset.hours()),
        }
        if let Some(radius) = q.radius_km {
            body["radius_km"] = json!(radius);
        }
        if let Some(weights) = &q.weights {
            body["weights"] = json!(weights);
        }

        let resp = self
            .client
            .post(self.url("/v1/assess"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::http(e.to_string(), e.is_timeout() || e.is_connect()))?;

        Self::read_json(resp).await
    }

    async fn stations(&self, q: &StationQuery) -> Result<StationsResponse> {
        let mut query = vec![
            ("product", q.product.as_str().to_string()),
            ("bbox", q.bbox.to_query()),
            ("max_age_minutes", q.max_age_minutes.to_string()),
            ("limit", q.limit.to_string()),
        ];
        if let Some(provider) = &q.provider {
            query.push(("provider", provider.clone()));
        }

        let resp: StationsResponse = self.get_json("/v1/stations", &query).await?;
        debug!(product = %q.product, stations = resp.stations.len(), "Fetched stations");
        Ok(resp)
    }
}

/// First chunk of a body for error context — enough to recognize an HTML
/// error page without logging megabytes.
fn preview(body: &str) -> String {
    const MAX: usize = 120;
    let trimmed = body.trim_start();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut cut = MAX;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &trimmed[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let c = ClimateRestClient::new("https://api.example/");
        assert_eq!(c.url("/v1/status"), "https://api.example/v1/status");
    }

    #[test]
    fn preview_truncates() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert!(p.chars().count() <= 121);
        assert!(p.ends_with('…'));
    }
}
