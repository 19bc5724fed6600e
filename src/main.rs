//! climatewise-map: headless driver for the ClimateWise map orchestrator.
//!
//! Single-binary Tokio application that:
//! 1. Builds the REST client and the viewport orchestrator
//! 2. Positions the camera from CLI arguments
//! 3. Logs every state-change notification as it arrives
//! 4. Runs until Ctrl+C (or one settle cycle with --once)

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};

use climate_api::{ClimateApi, ClimateRestClient, TimelineOrder};
use common::Product;
use orchestrator::{Event, MapOrchestrator, Viewport};

/// ClimateWise map data orchestrator
#[derive(Parser)]
#[command(name = "climatewise-map", about = "ClimateWise map data orchestrator")]
struct Cli {
    /// Probe the backend (legend + timeline for the active product), then exit.
    #[arg(long)]
    check: bool,

    /// Run one full fetch cycle for the initial viewport, print the
    /// resulting state summary as JSON, then exit.
    #[arg(long)]
    once: bool,

    /// Initial camera latitude.
    #[arg(long, default_value_t = 40.7128)]
    lat: f64,

    /// Initial camera longitude.
    #[arg(long, default_value_t = -74.0060)]
    lon: f64,

    /// Initial camera zoom.
    #[arg(long, default_value_t = 9.5)]
    zoom: f64,

    /// Pollutant product (overrides config).
    #[arg(long)]
    product: Option<String>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SETTLE_WAIT: Duration = Duration::from_secs(3);

/// Rough web-mercator visible bounds for a centered camera: the whole
/// world spans 360° of longitude at zoom 0 and halves per level.
fn viewport_from_camera(lat: f64, lon: f64, zoom: f64) -> Viewport {
    let lon_span = 360.0 / 2f64.powf(zoom);
    let lat_span = lon_span * 0.6;
    Viewport {
        center_lat: lat,
        center_lon: lon,
        zoom,
        west: lon - lon_span / 2.0,
        south: (lat - lat_span / 2.0).max(-90.0),
        east: lon + lon_span / 2.0,
        north: (lat + lat_span / 2.0).min(90.0),
    }
}

async fn run_check(api: &ClimateRestClient, product: Product, lookback_hours: u32) -> bool {
    info!(product = %product, "Probing backend");

    match api.legend(product).await {
        Ok(legend) => info!(
            palette = legend.palette.as_deref().unwrap_or("-"),
            units = legend.units.as_deref().unwrap_or("-"),
            "Legend OK"
        ),
        Err(e) => {
            error!("Legend probe failed: {}", e);
            return false;
        }
    }

    match api
        .timeline(product, lookback_hours, TimelineOrder::NewestFirst)
        .await
    {
        Ok(timeline) => {
            info!(
                slots = timeline.slots.len(),
                latest = timeline.latest_granule_id.as_deref().unwrap_or("-"),
                "Timeline OK"
            );
            true
        }
        Err(e) => {
            error!("Timeline probe failed: {}", e);
            false
        }
    }
}

async fn print_state_summary(orch: &MapOrchestrator) {
    let snap = orch.snapshot().await;
    let summary = json!({
        "mode": format!("{:?}", snap.mode),
        "product": snap.selection.product.as_str(),
        "forecast": snap.selection.selector.is_forecast(),
        "granule_id": snap.selection.selector.granule_id(),
        "pins_visible": snap.pins_visible,
        "overlay_url": snap.overlay.as_ref().map(|o| o.url.clone()),
        "grid_cells": snap.grid.as_ref().map(|g| g.cells.len()),
        "status_text": snap.status.as_ref().and_then(|s| s.status_text.clone()),
        "stations": snap.stations.as_ref().map(|s| s.stations.len()),
        "errors": {
            "status": snap.errors.status,
            "grid": snap.errors.grid,
            "stations": snap.errors.stations,
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "climatewise_map=info,orchestrator=info,climate_api=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("ClimateWise map orchestrator starting up...");

    // Load configuration.
    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(raw) = &cli.product {
        match Product::parse(raw) {
            Some(p) => cfg.default_product = p,
            None => {
                error!("Unknown product: {}", raw);
                std::process::exit(1);
            }
        }
    }

    info!("Backend: {}", cfg.base_url);
    info!(
        "Orchestrator: debounce status/grid/stations={}ms/{}ms/{}ms, retries={}, backoff={}ms, status_refresh={}s",
        cfg.orchestrator.status_debounce_ms,
        cfg.orchestrator.grid_debounce_ms,
        cfg.orchestrator.station_debounce_ms,
        cfg.orchestrator.max_retries,
        cfg.orchestrator.base_backoff_ms,
        cfg.orchestrator.status_refresh_secs,
    );

    let rest = ClimateRestClient::new(&cfg.base_url);

    if cli.check {
        let ok = run_check(
            &rest,
            cfg.default_product,
            cfg.orchestrator.timeline_lookback_hours,
        )
        .await;
        std::process::exit(if ok { 0 } else { 1 });
    }

    let api: Arc<dyn ClimateApi> = Arc::new(rest);
    let orch = MapOrchestrator::new(api, cfg);
    let mut events = orch.subscribe();

    // ── Event logger ─────────────────────────────────────────────────
    let event_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::SoftError { resource, message }) => {
                    warn!(resource = ?resource, "Soft error: {}", message);
                }
                Ok(event) => info!("Event: {:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event logger lagged, skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Position the camera; the orchestrator takes it from here.
    let viewport = viewport_from_camera(cli.lat, cli.lon, cli.zoom);
    info!(
        zoom = cli.zoom,
        bucket = viewport.zoom_bucket(),
        "Initial viewport: lat={:.4} lon={:.4}",
        cli.lat,
        cli.lon
    );
    orch.set_viewport(viewport).await;

    if cli.once {
        tokio::time::sleep(SETTLE_WAIT).await;
        print_state_summary(&orch).await;
        orch.dispose();
        return;
    }

    // ── Heartbeat ────────────────────────────────────────────────────
    let hb_orch = orch.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let snap = hb_orch.snapshot().await;
            info!(
                "HEARTBEAT: mode={:?} grid_cells={} stations={} loading[s/g/p]={}/{}/{}",
                snap.mode,
                snap.grid.as_ref().map(|g| g.cells.len()).unwrap_or(0),
                snap.stations.as_ref().map(|s| s.stations.len()).unwrap_or(0),
                snap.loading.status,
                snap.loading.grid,
                snap.loading.stations,
            );
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("Orchestrator is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = event_handle => {
            error!("Event logger exited: {:?}", r);
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
        }
    }

    orch.dispose();
    info!("ClimateWise map orchestrator shut down.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_spans_shrink_with_zoom() {
        let wide = viewport_from_camera(40.0, -74.0, 3.0);
        let tight = viewport_from_camera(40.0, -74.0, 9.0);
        assert!((wide.east - wide.west) > (tight.east - tight.west));
        assert_eq!(tight.zoom_bucket(), 9);
        assert!((tight.center_lon - (tight.west + tight.east) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn viewport_latitude_is_clamped() {
        let polar = viewport_from_camera(89.0, 0.0, 1.0);
        assert!(polar.north <= 90.0);
        assert!(polar.south >= -90.0);
    }
}
