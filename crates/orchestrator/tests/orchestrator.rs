//! End-to-end orchestrator behavior against a stubbed backend.
//!
//! Paused-time tokio: stub delays and debounce windows elapse virtually,
//! so races are reproduced deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use climate_api::{
    ClimateApi, GridCell, GridQuery, GridResponse, Legend, PointAssessment,
    PointAssessmentQuery, ProductScore, StationQuery, StationsResponse, StatusQuery,
    StatusSummary, TimelineOrder, TimelineResponse,
};
use common::config::{OrchestratorConfig, StationConfig};
use common::{Error, Product, Result, TimeSelector, TimeSlot};
use orchestrator::{MapOrchestrator, RenderingMode, Viewport};
use tokio::time::sleep;

// ── Stub backend ──────────────────────────────────────────────────────

#[derive(Default)]
struct StubApi {
    status_calls: AtomicU32,
    grid_calls: AtomicU32,
    station_calls: AtomicU32,
    timeline_calls: AtomicU32,
    assess_calls: AtomicU32,

    status_delay_ms: AtomicU64,
    grid_delay_ms: AtomicU64,
    assess_delay_ms: AtomicU64,

    status_always_503: AtomicBool,
    last_station_max_age: AtomicU32,
}

impl StubApi {
    fn slot(id: &str) -> TimeSlot {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        TimeSlot {
            granule_id: id.into(),
            start,
            end: start + chrono::Duration::hours(1),
            saved_at: None,
        }
    }
}

#[async_trait]
impl ClimateApi for StubApi {
    async fn timeline(
        &self,
        _product: Product,
        _lookback_hours: u32,
        _order: TimelineOrder,
    ) -> Result<TimelineResponse> {
        self.timeline_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TimelineResponse {
            slots: vec![Self::slot("G1"), Self::slot("G2")],
            latest_granule_id: Some("G1".into()),
        })
    }

    async fn legend(&self, _product: Product) -> Result<Legend> {
        Ok(Legend::default())
    }

    async fn status(&self, _q: &StatusQuery) -> Result<StatusSummary> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(
            self.status_delay_ms.load(Ordering::SeqCst),
        ))
        .await;
        if self.status_always_503.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(StatusSummary {
            status_text: Some("fresh".into()),
            live: Some(true),
            ..Default::default()
        })
    }

    async fn grid_past(&self, q: &GridQuery) -> Result<GridResponse> {
        self.grid(q).await
    }

    async fn grid_forecast(&self, q: &GridQuery) -> Result<GridResponse> {
        self.grid(q).await
    }

    async fn point_assessment(&self, q: &PointAssessmentQuery) -> Result<PointAssessment> {
        self.assess_calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(
            self.assess_delay_ms.load(Ordering::SeqCst),
        ))
        .await;
        let mut products = BTreeMap::new();
        products.insert(
            "no2".to_string(),
            ProductScore {
                value: Some(1.0),
                score: Some(4.0),
                domain_min: Some(0.0),
                domain_max: Some(10.0),
                distance_km: None,
                distance_note: None,
            },
        );
        let mut failed = BTreeMap::new();
        if q.products.len() > 1 {
            failed.insert("o3".to_string(), "granule missing".to_string());
        }
        Ok(PointAssessment {
            products,
            failed_products: failed,
            overall_score_0_10: Some(4.0),
            overall_score_0_100: Some(40.0),
            recommendation: Some("moderate".into()),
            risks: Vec::new(),
        })
    }

    async fn stations(&self, q: &StationQuery) -> Result<StationsResponse> {
        self.station_calls.fetch_add(1, Ordering::SeqCst);
        self.last_station_max_age
            .store(q.max_age_minutes, Ordering::SeqCst);
        Ok(StationsResponse::default())
    }
}

impl StubApi {
    async fn grid(&self, q: &GridQuery) -> Result<GridResponse> {
        self.grid_calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(
            self.grid_delay_ms.load(Ordering::SeqCst),
        ))
        .await;
        // The answering cell echoes the padded west edge, so tests can
        // tell which viewport a response belongs to.
        Ok(GridResponse {
            mode: Some(if q.selector.is_forecast() {
                "forecast".into()
            } else {
                "past".into()
            }),
            cells: vec![GridCell {
                lat: 40.7,
                lon: q.bbox.west,
                value: 1.0,
                cloud_fraction: None,
            }],
            ..Default::default()
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────

fn viewport(zoom: f64, west: f64) -> Viewport {
    Viewport {
        center_lat: 40.7,
        center_lon: west + 0.5,
        zoom,
        west,
        south: 40.2,
        east: west + 1.0,
        north: 41.2,
    }
}

fn build(api: Arc<StubApi>) -> MapOrchestrator {
    MapOrchestrator::with_parts(
        api,
        "https://api.example".into(),
        Product::No2,
        OrchestratorConfig::default(),
        StationConfig::default(),
    )
}

// ── Latest-wins ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn latest_wins_drops_slow_older_grid_result() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    // Slow fetch for viewport 1 starts after the 220 ms debounce.
    api.grid_delay_ms.store(500, Ordering::SeqCst);
    orch.set_viewport(viewport(9.2, -74.5)).await;
    sleep(Duration::from_millis(230)).await;
    assert_eq!(api.grid_calls.load(Ordering::SeqCst), 1);

    // Viewport 2 supersedes while fetch 1 is still in flight; its fetch
    // is fast and completes first.
    api.grid_delay_ms.store(50, Ordering::SeqCst);
    orch.set_viewport(viewport(9.2, -80.0)).await;
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(api.grid_calls.load(Ordering::SeqCst), 2);
    let snap = orch.snapshot().await;
    let grid = snap.grid.expect("grid applied");
    // Padded west edge of viewport 2, not viewport 1.
    assert!((grid.cells[0].lon - -80.4).abs() < 1e-9);
    orch.dispose();
}

// ── Single-flight ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_status_refreshes_make_one_call() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    api.status_delay_ms.store(100, Ordering::SeqCst);

    tokio::join!(orch.refresh_status(), orch.refresh_status());
    assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);

    let snap = orch.snapshot().await;
    assert_eq!(
        snap.status.unwrap().status_text.as_deref(),
        Some("fresh"),
        "the single flight's result is applied"
    );
    orch.dispose();
}

// ── Debounce collapse ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn viewport_burst_collapses_to_one_fetch_per_resource() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    for step in 0..5 {
        orch.set_viewport(viewport(9.2, -74.5 - step as f64 * 0.1)).await;
        sleep(Duration::from_millis(20)).await;
    }
    sleep(Duration::from_millis(1000)).await;

    assert_eq!(api.grid_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.station_calls.load(Ordering::SeqCst), 1);
    orch.dispose();
}

// ── Mode mutual exclusivity ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn zooming_out_clears_grid_and_sets_raster_url() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    sleep(Duration::from_millis(1000)).await;
    assert!(orch.snapshot().await.grid.is_some());

    orch.set_viewport(viewport(5.3, -74.5)).await;
    let snap = orch.snapshot().await;
    assert!(snap.grid.is_none(), "grid cleared on leaving JsonGrid");
    let overlay = snap.overlay.expect("raster URL set");
    assert!(overlay.url.contains("/overlay/no2/5/"));
    assert!(matches!(snap.mode, RenderingMode::RasterOverlay { .. }));
    assert!(!snap.pins_visible);
    assert!(snap.stations.is_none(), "stations cleared below pin zoom");

    // And back: raster URL dropped once the grid takes over again.
    orch.set_viewport(viewport(9.2, -74.5)).await;
    let snap = orch.snapshot().await;
    assert!(snap.overlay.is_none());
    assert!(matches!(snap.mode, RenderingMode::JsonGrid));
    orch.dispose();
}

#[tokio::test(start_paused = true)]
async fn grid_completion_after_leaving_grid_mode_is_dropped() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    api.grid_delay_ms.store(500, Ordering::SeqCst);
    orch.set_viewport(viewport(9.2, -74.5)).await;
    sleep(Duration::from_millis(230)).await;
    assert_eq!(api.grid_calls.load(Ordering::SeqCst), 1);

    // Zoom out while the fetch is in flight.
    orch.set_viewport(viewport(5.3, -74.5)).await;
    sleep(Duration::from_millis(1000)).await;

    let snap = orch.snapshot().await;
    assert!(snap.grid.is_none(), "stale grid answer must not land");
    assert!(snap.overlay.is_some());
    orch.dispose();
}

// ── Retry bound ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_status_failure_retries_then_surfaces_soft_error() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    sleep(Duration::from_millis(1000)).await;
    assert!(orch.snapshot().await.status.is_some());

    api.status_always_503.store(true, Ordering::SeqCst);
    let before = api.status_calls.load(Ordering::SeqCst);
    orch.refresh_status().await;

    // maxRetries = 2 → three attempts total.
    assert_eq!(api.status_calls.load(Ordering::SeqCst), before + 3);
    let snap = orch.snapshot().await;
    assert!(snap.errors.status.is_some(), "soft error recorded");
    assert!(
        snap.status.is_some(),
        "previous good status is retained through the failure"
    );
    orch.dispose();
}

// ── Post-disposal silence ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn completions_and_timers_after_disposal_do_nothing() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    api.grid_delay_ms.store(500, Ordering::SeqCst);
    orch.set_viewport(viewport(9.2, -74.5)).await;
    sleep(Duration::from_millis(230)).await;
    assert_eq!(api.grid_calls.load(Ordering::SeqCst), 1, "fetch in flight");

    // Re-arm a debounce timer, then dispose before it fires.
    orch.set_viewport(viewport(9.2, -75.0)).await;
    let mut events = orch.subscribe();
    orch.dispose();

    sleep(Duration::from_millis(2000)).await;

    assert_eq!(
        api.grid_calls.load(Ordering::SeqCst),
        1,
        "disposed debounce timer must not fire"
    );
    let snap = orch.snapshot().await;
    assert!(snap.grid.is_none(), "in-flight completion discarded");
    assert!(
        matches!(
            events.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ),
        "no observer notifications after disposal"
    );

    // Every public operation is now a no-op.
    let status_before = api.status_calls.load(Ordering::SeqCst);
    orch.set_viewport(viewport(9.2, -76.0)).await;
    orch.refresh_status().await;
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.grid_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.status_calls.load(Ordering::SeqCst), status_before);
}

// ── Forecast/past exclusivity and selection transitions ───────────────

#[tokio::test(start_paused = true)]
async fn forecast_and_past_selections_displace_each_other() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    orch.select_product(Product::O3).await;
    sleep(Duration::from_millis(500)).await;
    // One discovery for the startup product, one for the switch.
    assert_eq!(api.timeline_calls.load(Ordering::SeqCst), 2);

    assert!(orch.select_past_slot("G1").await);
    let snap = orch.snapshot().await;
    assert_eq!(snap.selection.selector.granule_id(), Some("G1"));

    orch.select_forecast_offset(3).await.unwrap();
    let snap = orch.snapshot().await;
    assert!(snap.selection.selector.is_forecast());
    assert_eq!(snap.selection.selector.granule_id(), None);

    orch.clear_forecast().await;
    let snap = orch.snapshot().await;
    assert_eq!(
        snap.selection.selector.granule_id(),
        Some("G1"),
        "clear_forecast reverts to the last past slot"
    );

    // Unknown granule and out-of-range offset are rejected locally.
    assert!(!orch.select_past_slot("NOPE").await);
    assert!(orch.select_forecast_offset(13).await.is_err());
    let snap = orch.snapshot().await;
    assert_eq!(snap.selection.selector.granule_id(), Some("G1"));
    orch.dispose();
}

#[tokio::test(start_paused = true)]
async fn product_switch_resets_selection_and_clears_caches() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    sleep(Duration::from_millis(1000)).await;
    assert!(orch.snapshot().await.grid.is_some());

    orch.select_product(Product::Pm25).await;
    let snap = orch.snapshot().await;
    assert!(snap.grid.is_none());
    assert!(snap.stations.is_none());
    assert!(snap.assessment.is_none());
    assert_eq!(snap.selection.selector, TimeSelector::now());
    assert_eq!(snap.selection.product, Product::Pm25);

    // Let the metadata discovery spawned by the switch drain, then verify
    // that switching to the same product again is a no-op.
    sleep(Duration::from_millis(500)).await;
    let timeline_calls = api.timeline_calls.load(Ordering::SeqCst);
    orch.select_product(Product::Pm25).await;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(api.timeline_calls.load(Ordering::SeqCst), timeline_calls);
    orch.dispose();
}

// ── Startup product discovery ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn startup_product_metadata_is_discovered_without_a_switch() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(api.timeline_calls.load(Ordering::SeqCst), 1);

    let snap = orch.snapshot().await;
    assert!(snap.legend.is_some(), "legend loaded for the startup product");

    // Past slots must be selectable straight away, not only after the
    // user has cycled the product.
    assert!(orch.select_past_slot("G1").await);
    let snap = orch.snapshot().await;
    assert_eq!(snap.selection.selector.granule_id(), Some("G1"));
    orch.dispose();
}

// ── Forced refresh ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn force_refresh_rebuilds_overlay_with_cache_bust_and_refetches() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(5.3, -74.5)).await;
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);

    let before = orch.snapshot().await.overlay.expect("raster mode").url;
    assert!(!before.contains("cb="), "stable key carries no bust token");

    // The overlay key is unchanged, so only the forced path may rebuild.
    orch.force_refresh().await;
    let after = orch.snapshot().await.overlay.expect("raster mode").url;
    assert!(after.ends_with("?cb=1"));
    assert_ne!(before, after);
    assert_eq!(
        api.status_calls.load(Ordering::SeqCst),
        2,
        "forced refresh re-requests status"
    );

    orch.force_refresh().await;
    let again = orch.snapshot().await.overlay.expect("raster mode").url;
    assert!(again.ends_with("?cb=2"), "every force bumps the token");
    orch.dispose();
}

// ── Station filters ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn station_filter_change_triggers_debounced_refetch() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.station_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.last_station_max_age.load(Ordering::SeqCst), 90);

    orch.set_station_filters(StationConfig {
        max_age_minutes: 30,
        limit: 50,
        provider: Some("openaq".into()),
    })
    .await;
    assert_eq!(
        api.station_calls.load(Ordering::SeqCst),
        1,
        "filter change is debounced, not fetched inline"
    );

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.station_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        api.last_station_max_age.load(Ordering::SeqCst),
        30,
        "refetch carries the new filters"
    );
    assert_eq!(orch.snapshot().await.station_filters.limit, 50);
    orch.dispose();
}

// ── Clearing forecast without history ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cleared_forecast_overlay_does_not_resurrect_on_pan() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(5.3, -74.5)).await;
    orch.select_forecast_offset(6).await.unwrap();
    let snap = orch.snapshot().await;
    assert!(snap.overlay.expect("raster mode").url.contains("/forecast/6.png"));

    // No past slot was ever selected, so clearing falls back to "now".
    orch.clear_forecast().await;
    let snap = orch.snapshot().await;
    assert_eq!(snap.selection.selector, TimeSelector::now());
    assert!(snap.overlay.expect("raster mode").url.contains("/forecast/0.png"));

    // A pan inside the same bucket must not bring the cleared frame back.
    orch.set_viewport(viewport(5.3, -74.6)).await;
    let snap = orch.snapshot().await;
    let url = snap.overlay.expect("raster mode").url;
    assert!(url.contains("/forecast/0.png"));
    assert!(!url.contains("/forecast/6.png"));
    orch.dispose();
}

// ── Point assessment ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn assessment_applies_with_partial_product_failures() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    orch.request_point_assessment(40.7, -74.0, vec![Product::No2, Product::O3], None, None)
        .await;

    let snap = orch.snapshot().await;
    let assessment = snap.assessment.expect("envelope success applies");
    assert_eq!(assessment.failed_products.len(), 1);
    assert_eq!(assessment.overall_score_0_100, Some(40.0));
    orch.dispose();
}

#[tokio::test(start_paused = true)]
async fn assessment_result_dropped_when_time_selection_moves_on() {
    let api = Arc::new(StubApi::default());
    let orch = build(api.clone());

    orch.set_viewport(viewport(9.2, -74.5)).await;
    api.assess_delay_ms.store(300, Ordering::SeqCst);

    let tap = orch.clone();
    let handle = tokio::spawn(async move {
        tap.request_point_assessment(40.7, -74.0, vec![Product::No2], None, None)
            .await
    });

    // Change the forecast offset while the assessment is in flight.
    sleep(Duration::from_millis(50)).await;
    orch.select_forecast_offset(6).await.unwrap();
    handle.await.unwrap();

    let snap = orch.snapshot().await;
    assert!(
        snap.assessment.is_none(),
        "answer for the old time selection must be discarded"
    );
    assert_eq!(api.assess_calls.load(Ordering::SeqCst), 1);
    orch.dispose();
}
