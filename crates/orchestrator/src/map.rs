//! The viewport-driven data orchestrator.
//!
//! Owns viewport, selection, and every per-resource cache; reconciles the
//! backend's time-varying products against continuous viewport/zoom/
//! product/time mutations. All fetch paths run through the per-resource
//! `FetchCoordinator` (single-flight + latest-wins), the retry policy,
//! and the lifecycle guard.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use climate_api::{
    ClimateApi, GridQuery, PointAssessmentQuery, StationQuery, StatusQuery, TimelineOrder,
};
use common::config::{MapConfig, OrchestratorConfig, StationConfig};
use common::{Error, ForecastOffset, Product, Result};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::FetchCoordinator;
use crate::debounce::{DebounceScheduler, ResourceKey};
use crate::events::Event;
use crate::lifecycle::LifecycleGuard;
use crate::mode::{self, RenderingMode};
use crate::retry::{self, RetryOutcome, RetryPolicy};
use crate::state::{OrchestratorState, OverlayState};
use crate::viewport::Viewport;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Map data orchestrator. Cheap to clone; all clones share one instance.
///
/// A disposed orchestrator is inert — a "hard reset" builds a new one
/// rather than reviving this one.
#[derive(Clone)]
pub struct MapOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn ClimateApi>,
    base_url: String,
    cfg: OrchestratorConfig,
    guard: LifecycleGuard,
    state: RwLock<OrchestratorState>,
    status_coord: FetchCoordinator,
    grid_coord: FetchCoordinator,
    stations_coord: FetchCoordinator,
    debounce: DebounceScheduler,
    events: broadcast::Sender<Event>,
    refresh_task: StdMutex<Option<JoinHandle<()>>>,
}

impl MapOrchestrator {
    pub fn new(api: Arc<dyn ClimateApi>, cfg: MapConfig) -> Self {
        Self::with_parts(
            api,
            cfg.base_url,
            cfg.default_product,
            cfg.orchestrator,
            cfg.stations,
        )
    }

    pub fn with_parts(
        api: Arc<dyn ClimateApi>,
        base_url: String,
        product: Product,
        cfg: OrchestratorConfig,
        stations: StationConfig,
    ) -> Self {
        let guard = LifecycleGuard::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let inner = Arc::new(Inner {
            api,
            base_url,
            cfg,
            guard: guard.clone(),
            state: RwLock::new(OrchestratorState::new(product, stations)),
            status_coord: FetchCoordinator::new(),
            grid_coord: FetchCoordinator::new(),
            stations_coord: FetchCoordinator::new(),
            debounce: DebounceScheduler::new(guard),
            events,
            refresh_task: StdMutex::new(None),
        });

        inner.spawn_status_autorefresh();

        // Legend + timeline discovery for the startup product; without it
        // past slots are unselectable until the first product switch.
        let meta = inner.clone();
        tokio::spawn(async move { meta.load_product_metadata(product).await });

        Self { inner }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Cloned view of the current state.
    pub async fn snapshot(&self) -> OrchestratorState {
        self.inner.state.read().await.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.guard.is_disposed()
    }

    // ── Viewport and mode ─────────────────────────────────────────────

    /// Camera moved: update viewport, re-derive mode, schedule debounced
    /// refreshes for every bbox-dependent resource.
    pub async fn set_viewport(&self, viewport: Viewport) {
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return;
        }

        let (grid_mode, pins) = {
            let mut st = inner.state.write().await;
            st.viewport = Some(viewport);
            inner.recompute_mode(&mut st);
            (st.mode.is_grid(), st.pins_visible)
        };

        inner.schedule_status_refresh();
        if grid_mode {
            inner.schedule_grid_refresh();
        }
        if pins {
            inner.schedule_stations_refresh();
        }
    }

    /// Toggle the pollutant overlay entirely.
    pub async fn set_overlay_enabled(&self, enabled: bool) {
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return;
        }

        let grid_mode = {
            let mut st = inner.state.write().await;
            if st.overlay_enabled == enabled {
                return;
            }
            st.overlay_enabled = enabled;
            inner.recompute_mode(&mut st);
            st.mode.is_grid()
        };

        if grid_mode {
            inner.schedule_grid_refresh();
        }
    }

    // ── Selection state machine ───────────────────────────────────────

    /// Switch the active product. Unchanged product is a no-op. Resets the
    /// time selection to forecast "now", clears dependent caches, and
    /// kicks off legend + timeline discovery.
    pub async fn select_product(&self, product: Product) {
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return;
        }

        {
            let mut st = inner.state.write().await;
            if st.selection.product == product {
                return;
            }
            info!(product = %product, "Switching product");
            st.selection.switch_product(product);

            // Everything keyed by the old product is garbage now; the
            // in-flight answers for it must not land either.
            st.legend = None;
            st.overlay = None;
            st.grid = None;
            st.assessment = None;
            st.stations = None;
            inner.status_coord.invalidate();
            inner.grid_coord.invalidate();
            inner.stations_coord.invalidate();
            inner.emit(Event::GridUpdated);
            inner.emit(Event::OverlayChanged);
            inner.emit(Event::StationsUpdated);
            inner.emit(Event::AssessmentUpdated);

            inner.recompute_mode(&mut st);
        }

        let meta = inner.clone();
        tokio::spawn(async move { meta.load_product_metadata(product).await });

        inner.schedule_status_refresh();
        let st = inner.state.read().await;
        if st.mode.is_grid() {
            inner.schedule_grid_refresh();
        }
        if st.pins_visible {
            inner.schedule_stations_refresh();
        }
    }

    /// Jump to a past slot by granule id. Returns false (no-op) when the
    /// id is not in the active product's cached timeline.
    pub async fn select_past_slot(&self, granule_id: &str) -> bool {
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return false;
        }

        let grid_mode = {
            let mut st = inner.state.write().await;
            let Some(slot) = st.selection.find_slot(granule_id).cloned() else {
                debug!(granule_id, "Ignoring unknown past slot");
                return false;
            };
            st.selection.select_past(slot);
            st.assessment = None;
            inner.recompute_mode(&mut st);
            st.mode.is_grid()
        };

        inner.after_selection_change(grid_mode);
        true
    }

    /// Jump to a forecast frame `hours` ahead. Out-of-range offsets are
    /// rejected locally with no state mutation.
    pub async fn select_forecast_offset(&self, hours: u8) -> Result<()> {
        let offset = ForecastOffset::new(hours)?;
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return Ok(());
        }

        let grid_mode = {
            let mut st = inner.state.write().await;
            st.selection.select_forecast(offset);
            st.assessment = None;
            inner.recompute_mode(&mut st);
            st.mode.is_grid()
        };

        inner.after_selection_change(grid_mode);
        Ok(())
    }

    /// Leave forecast mode, reverting to the most recent past slot when
    /// one exists, else to the live "now" frame. No-op outside forecast
    /// mode.
    pub async fn clear_forecast(&self) {
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return;
        }

        let grid_mode = {
            let mut st = inner.state.write().await;
            if !st.selection.clear_forecast() {
                return;
            }
            st.assessment = None;
            inner.recompute_mode(&mut st);
            st.mode.is_grid()
        };

        inner.after_selection_change(grid_mode);
    }

    // ── Resource refreshes ────────────────────────────────────────────

    /// Same-parameters status refresh (pull-to-refresh). Single-flight: a
    /// call while one is up is a no-op.
    pub async fn refresh_status(&self) {
        self.inner.run_status(false).await;
    }

    /// Same-parameters grid refresh.
    pub async fn refresh_grid(&self) {
        self.inner.run_grid(false).await;
    }

    /// Same-parameters station refresh.
    pub async fn refresh_stations(&self) {
        self.inner.run_stations(false).await;
    }

    /// Bypass the overlay-key check and re-request everything with a
    /// fresh cache-bust token.
    pub async fn force_refresh(&self) {
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return;
        }

        let (grid_mode, pins) = {
            let mut st = inner.state.write().await;
            st.cache_bust += 1;
            inner.rebuild_overlay(&mut st, true);
            (st.mode.is_grid(), st.pins_visible)
        };

        inner.run_status(true).await;
        if grid_mode {
            inner.run_grid(true).await;
        }
        if pins {
            inner.run_stations(true).await;
        }
    }

    /// Replace station filters and refresh pins if visible.
    pub async fn set_station_filters(&self, filters: StationConfig) {
        let inner = &self.inner;
        if inner.guard.is_disposed() {
            return;
        }

        let pins = {
            let mut st = inner.state.write().await;
            st.station_filters = filters;
            st.pins_visible
        };
        if pins {
            inner.schedule_stations_refresh();
        }
    }

    /// Point assessment at a tapped location. Uncached; the result is
    /// applied only when the time selection at completion still matches
    /// the one captured at issue.
    pub async fn request_point_assessment(
        &self,
        lat: f64,
        lon: f64,
        products: Vec<Product>,
        radius_km: Option<f64>,
        weights: Option<std::collections::BTreeMap<String, f64>>,
    ) {
        self.inner
            .run_point_assessment(lat, lon, products, radius_km, weights)
            .await;
    }

    // ── Teardown ──────────────────────────────────────────────────────

    /// Irreversible teardown: cancels pending timers and the auto-refresh
    /// task; in-flight completions become no-ops. All further operations
    /// on this orchestrator are no-ops.
    pub fn dispose(&self) {
        if !self.inner.guard.dispose() {
            return;
        }
        self.inner.debounce.cancel_all();
        if let Some(handle) = self
            .inner
            .refresh_task
            .lock()
            .expect("refresh task slot poisoned")
            .take()
        {
            handle.abort();
        }
        info!("Map orchestrator disposed");
    }
}

impl Inner {
    fn emit(&self, event: Event) {
        // No receivers is fine — the daemon may run headless.
        let _ = self.events.send(event);
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.cfg.max_retries,
            base_backoff: Duration::from_millis(self.cfg.base_backoff_ms),
        }
    }

    // ── Mode derivation ───────────────────────────────────────────────

    /// Re-derive the rendering mode and pin visibility from the current
    /// bucket, product, selector, and overlay toggle. Clears the opposite
    /// mode's data on transition — only one mode's data is ever held.
    fn recompute_mode(&self, st: &mut OrchestratorState) {
        let bucket = st.zoom_bucket();
        let new_mode = mode::resolve(
            bucket,
            st.overlay_enabled,
            st.selection.product,
            &st.selection.selector,
        );

        if new_mode != st.mode {
            let leaving_grid = st.mode.is_grid() && !new_mode.is_grid();
            let leaving_raster = st.mode.is_raster() && !new_mode.is_raster();

            if leaving_grid {
                st.grid = None;
                self.grid_coord.invalidate();
                self.emit(Event::GridUpdated);
            }
            if leaving_raster {
                st.overlay = None;
                self.emit(Event::OverlayChanged);
            }

            debug!(bucket, from = ?st.mode, to = ?new_mode, "Rendering mode changed");
            st.mode = new_mode;
            self.emit(Event::ModeChanged);
        }

        self.rebuild_overlay(st, false);

        let pins = mode::pins_visible(bucket, st.selection.product);
        if pins != st.pins_visible {
            st.pins_visible = pins;
            if !pins {
                // Cleared outright, not stale-marked.
                st.stations = None;
                self.stations_coord.invalidate();
                self.emit(Event::StationsUpdated);
            }
        }
    }

    /// Build the raster URL when in raster mode and the key changed (or a
    /// forced refresh bumped the cache-bust token).
    fn rebuild_overlay(&self, st: &mut OrchestratorState, force: bool) {
        let RenderingMode::RasterOverlay { key } = &st.mode else {
            return;
        };
        let stale = force || st.overlay.as_ref().map(|o| &o.key) != Some(key);
        if !stale {
            return;
        }
        let url = climate_api::overlay_url(
            &self.base_url,
            key.product,
            &key.selector,
            key.zoom_bucket,
            st.cache_bust,
        );
        st.overlay = Some(OverlayState {
            url,
            key: key.clone(),
        });
        self.emit(Event::OverlayChanged);
    }
}

impl Inner {
    // ── Scheduling ────────────────────────────────────────────────────

    fn schedule_status_refresh(self: &Arc<Self>) {
        let inner = self.clone();
        self.debounce.schedule(
            ResourceKey::Status,
            Duration::from_millis(self.cfg.status_debounce_ms),
            async move { inner.run_status(true).await },
        );
    }

    fn schedule_grid_refresh(self: &Arc<Self>) {
        let inner = self.clone();
        self.debounce.schedule(
            ResourceKey::Grid,
            Duration::from_millis(self.cfg.grid_debounce_ms),
            async move { inner.run_grid(true).await },
        );
    }

    fn schedule_stations_refresh(self: &Arc<Self>) {
        let inner = self.clone();
        self.debounce.schedule(
            ResourceKey::Stations,
            Duration::from_millis(self.cfg.station_debounce_ms),
            async move { inner.run_stations(true).await },
        );
    }

    /// Post-transition fetches shared by the time-selection operations:
    /// the raster URL was already rebuilt inside the state lock; grid
    /// mode needs a fresh cell fetch, and status tracks the selector.
    fn after_selection_change(self: &Arc<Self>, grid_mode: bool) {
        if grid_mode {
            let inner = self.clone();
            tokio::spawn(async move { inner.run_grid(true).await });
        }
        self.schedule_status_refresh();
    }

    fn spawn_status_autorefresh(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = Duration::from_secs(self.cfg.status_refresh_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // immediate first tick

            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.guard.is_disposed() {
                    break;
                }
                // Same single-flight path as user-triggered refreshes.
                inner.run_status(false).await;
            }
        });

        *self
            .refresh_task
            .lock()
            .expect("refresh task slot poisoned") = Some(handle);
    }

    // ── Loading flags ─────────────────────────────────────────────────

    async fn set_loading(&self, key: ResourceKey, loading: bool) {
        let mut st = self.state.write().await;
        let flag = match key {
            ResourceKey::Status => &mut st.loading.status,
            ResourceKey::Grid => &mut st.loading.grid,
            ResourceKey::Stations => &mut st.loading.stations,
            ResourceKey::Assessment => &mut st.loading.assessment,
        };
        if *flag != loading {
            *flag = loading;
            self.emit(Event::LoadingChanged {
                resource: key,
                loading,
            });
        }
    }

    // ── Fetch paths ───────────────────────────────────────────────────

    async fn status_query(&self) -> Option<StatusQuery> {
        let st = self.state.read().await;
        let viewport = st.viewport?;
        Some(StatusQuery {
            product: st.selection.product,
            selector: st.selection.selector.clone(),
            effective_zoom: mode::effective_query_zoom(viewport.zoom_bucket()),
            bbox: viewport.padded_bbox(self.cfg.bbox_padding_deg),
            lat: viewport.center_lat,
            lon: viewport.center_lon,
        })
    }

    async fn run_status(self: &Arc<Self>, superseding: bool) {
        if self.guard.is_disposed() {
            return;
        }
        let Some(q) = self.status_query().await else {
            debug!("Status refresh skipped, no viewport yet");
            return;
        };

        let ticket = if superseding {
            self.status_coord.supersede()
        } else {
            match self.status_coord.begin() {
                Some(t) => t,
                None => {
                    debug!("Status refresh already in flight");
                    return;
                }
            }
        };

        self.set_loading(ResourceKey::Status, true).await;

        let api = self.api.clone();
        let outcome = retry::with_retry(&self.guard, self.retry_policy(), "status", || {
            let api = api.clone();
            let q = q.clone();
            async move { api.status(&q).await }
        })
        .await;

        let still_current = ticket.is_current();
        drop(ticket);
        if self.guard.is_disposed() {
            debug!("Dropping post-disposal status completion");
            return;
        }
        let busy = self.status_coord.is_busy();
        self.set_loading(ResourceKey::Status, busy).await;

        if !still_current {
            debug!("Dropping stale status completion");
            return;
        }

        let mut st = self.state.write().await;
        match outcome {
            RetryOutcome::Aborted => {}
            RetryOutcome::Done(Ok(summary)) => {
                st.status = Some(summary);
                st.errors.status = None;
                self.emit(Event::StatusUpdated);
            }
            RetryOutcome::Done(Err(e)) => {
                warn!(error = %e, "Status refresh failed");
                st.errors.status = Some(e.to_string());
                self.emit(Event::SoftError {
                    resource: ResourceKey::Status,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn grid_query(&self) -> Result<Option<GridQuery>> {
        let st = self.state.read().await;
        if !st.mode.is_grid() {
            return Ok(None);
        }
        let Some(viewport) = st.viewport else {
            return Err(Error::Validation(
                "grid mode requires a viewport bbox".into(),
            ));
        };
        Ok(Some(GridQuery {
            product: st.selection.product,
            effective_zoom: mode::effective_query_zoom(viewport.zoom_bucket()),
            selector: st.selection.selector.clone(),
            bbox: viewport.padded_bbox(self.cfg.bbox_padding_deg),
        }))
    }

    async fn run_grid(self: &Arc<Self>, superseding: bool) {
        if self.guard.is_disposed() {
            return;
        }
        let q = match self.grid_query().await {
            Ok(Some(q)) => q,
            Ok(None) => {
                debug!("Grid refresh skipped, not in grid mode");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Grid refresh rejected");
                return;
            }
        };

        let ticket = if superseding {
            self.grid_coord.supersede()
        } else {
            match self.grid_coord.begin() {
                Some(t) => t,
                None => {
                    debug!("Grid refresh already in flight");
                    return;
                }
            }
        };

        self.set_loading(ResourceKey::Grid, true).await;

        let api = self.api.clone();
        let forecast = q.selector.is_forecast();
        let outcome = retry::with_retry(&self.guard, self.retry_policy(), "grid", || {
            let api = api.clone();
            let q = q.clone();
            async move {
                if forecast {
                    api.grid_forecast(&q).await
                } else {
                    api.grid_past(&q).await
                }
            }
        })
        .await;

        let still_current = ticket.is_current();
        drop(ticket);
        if self.guard.is_disposed() {
            debug!("Dropping post-disposal grid completion");
            return;
        }
        let busy = self.grid_coord.is_busy();
        self.set_loading(ResourceKey::Grid, busy).await;

        if !still_current {
            debug!("Dropping stale grid completion");
            return;
        }

        let mut st = self.state.write().await;
        // The mode may have flipped to raster while we were in flight; the
        // coordinator was invalidated in that case, but re-check anyway.
        if !st.mode.is_grid() {
            return;
        }
        match outcome {
            RetryOutcome::Aborted => {}
            RetryOutcome::Done(Ok(grid)) => {
                st.grid = Some(grid);
                st.errors.grid = None;
                self.emit(Event::GridUpdated);
            }
            RetryOutcome::Done(Err(e)) => {
                warn!(error = %e, "Grid refresh failed");
                st.errors.grid = Some(e.to_string());
                self.emit(Event::SoftError {
                    resource: ResourceKey::Grid,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn station_query(&self) -> Option<StationQuery> {
        let st = self.state.read().await;
        if !st.pins_visible {
            return None;
        }
        let viewport = st.viewport?;
        Some(StationQuery {
            product: st.selection.product,
            bbox: viewport.padded_bbox(self.cfg.bbox_padding_deg),
            max_age_minutes: st.station_filters.max_age_minutes,
            provider: st.station_filters.provider.clone(),
            limit: st.station_filters.limit,
        })
    }

    async fn run_stations(self: &Arc<Self>, superseding: bool) {
        if self.guard.is_disposed() {
            return;
        }
        let Some(q) = self.station_query().await else {
            debug!("Station refresh skipped, pins not visible");
            return;
        };

        let ticket = if superseding {
            self.stations_coord.supersede()
        } else {
            match self.stations_coord.begin() {
                Some(t) => t,
                None => {
                    debug!("Station refresh already in flight");
                    return;
                }
            }
        };

        self.set_loading(ResourceKey::Stations, true).await;

        let api = self.api.clone();
        let outcome = retry::with_retry(&self.guard, self.retry_policy(), "stations", || {
            let api = api.clone();
            let q = q.clone();
            async move { api.stations(&q).await }
        })
        .await;

        let still_current = ticket.is_current();
        drop(ticket);
        if self.guard.is_disposed() {
            debug!("Dropping post-disposal station completion");
            return;
        }
        let busy = self.stations_coord.is_busy();
        self.set_loading(ResourceKey::Stations, busy).await;

        if !still_current {
            debug!("Dropping stale station completion");
            return;
        }

        let mut st = self.state.write().await;
        if !st.pins_visible {
            return;
        }
        match outcome {
            RetryOutcome::Aborted => {}
            RetryOutcome::Done(Ok(stations)) => {
                st.stations = Some(stations);
                st.errors.stations = None;
                self.emit(Event::StationsUpdated);
            }
            RetryOutcome::Done(Err(e)) => {
                warn!(error = %e, "Station refresh failed");
                st.errors.stations = Some(e.to_string());
                self.emit(Event::SoftError {
                    resource: ResourceKey::Stations,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn run_point_assessment(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
        products: Vec<Product>,
        radius_km: Option<f64>,
        weights: Option<std::collections::BTreeMap<String, f64>>,
    ) {
        if self.guard.is_disposed() {
            return;
        }

        let q = {
            let st = self.state.read().await;
            let Some(viewport) = st.viewport else {
                debug!("Point assessment skipped, no viewport yet");
                return;
            };
            PointAssessmentQuery {
                lat,
                lon,
                products,
                effective_zoom: mode::effective_query_zoom(viewport.zoom_bucket()),
                selector: st.selection.selector.clone(),
                radius_km,
                weights,
            }
        };
        let captured_selector = q.selector.clone();

        {
            let mut st = self.state.write().await;
            // A new query invalidates the previous answer outright.
            st.assessment = None;
            if !st.loading.assessment {
                st.loading.assessment = true;
                self.emit(Event::LoadingChanged {
                    resource: ResourceKey::Assessment,
                    loading: true,
                });
            }
        }

        let api = self.api.clone();
        let outcome = retry::with_retry(&self.guard, self.retry_policy(), "assessment", || {
            let api = api.clone();
            let q = q.clone();
            async move { api.point_assessment(&q).await }
        })
        .await;

        if self.guard.is_disposed() {
            debug!("Dropping post-disposal assessment completion");
            return;
        }

        let mut st = self.state.write().await;
        if st.loading.assessment {
            st.loading.assessment = false;
            self.emit(Event::LoadingChanged {
                resource: ResourceKey::Assessment,
                loading: false,
            });
        }
        // Selector drift while in flight: the answer no longer describes
        // the current selection, discard it.
        if st.selection.selector != captured_selector {
            debug!("Dropping point assessment for a superseded time selection");
            return;
        }

        match outcome {
            RetryOutcome::Aborted => {}
            RetryOutcome::Done(Ok(assessment)) => {
                if !assessment.failed_products.is_empty() {
                    debug!(
                        failed = assessment.failed_products.len(),
                        "Point assessment applied with partial product failures"
                    );
                }
                st.assessment = Some(assessment);
                st.errors.assessment = None;
                self.emit(Event::AssessmentUpdated);
            }
            RetryOutcome::Done(Err(e)) => {
                warn!(error = %e, "Point assessment failed");
                st.errors.assessment = Some(e.to_string());
                self.emit(Event::SoftError {
                    resource: ResourceKey::Assessment,
                    message: e.to_string(),
                });
            }
        }
    }

    /// Legend + timeline discovery after a product switch. A cached
    /// timeline for the product is reused without a network call.
    async fn load_product_metadata(self: Arc<Self>, product: Product) {
        let api = self.api.clone();
        let legend = retry::with_retry(&self.guard, self.retry_policy(), "legend", || {
            let api = api.clone();
            async move { api.legend(product).await }
        })
        .await;

        match legend {
            RetryOutcome::Aborted => return,
            RetryOutcome::Done(Ok(legend)) => {
                let mut st = self.state.write().await;
                if !self.guard.is_disposed() && st.selection.product == product {
                    st.legend = Some(legend);
                    self.emit(Event::LegendUpdated);
                }
            }
            RetryOutcome::Done(Err(e)) => {
                warn!(product = %product, error = %e, "Legend fetch failed");
            }
        }

        let cached = {
            let st = self.state.read().await;
            st.selection.cached_timeline(product).is_some()
        };
        if cached {
            debug!(product = %product, "Reusing cached timeline");
            self.emit(Event::TimelineUpdated);
            return;
        }

        let lookback = self.cfg.timeline_lookback_hours;
        let timeline = retry::with_retry(&self.guard, self.retry_policy(), "timeline", || {
            let api = api.clone();
            async move {
                api.timeline(product, lookback, TimelineOrder::NewestFirst)
                    .await
            }
        })
        .await;

        match timeline {
            RetryOutcome::Aborted => {}
            RetryOutcome::Done(Ok(resp)) => {
                let mut st = self.state.write().await;
                if !self.guard.is_disposed() {
                    st.selection.cache_timeline(product, resp.slots);
                    if st.selection.product == product {
                        self.emit(Event::TimelineUpdated);
                    }
                }
            }
            RetryOutcome::Done(Err(e)) => {
                warn!(product = %product, error = %e, "Timeline fetch failed");
            }
        }
    }
}
