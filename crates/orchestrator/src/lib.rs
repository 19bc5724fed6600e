//! Viewport-driven asynchronous data orchestrator.
//!
//! Governs how a map view acquires and reconciles the backend's
//! time-varying, zoom-dependent data products — pollutant overlays,
//! forecast grids, point assessments, ground-station points, and a
//! freshness summary — while the viewport, zoom, product, and time
//! selection keep changing underneath it.
//!
//! Guarantees:
//! * only the freshest request's result is ever applied (latest-wins),
//! * redundant concurrent work is suppressed (single-flight),
//! * transient backend failures are retried off the caller's path,
//! * all in-flight work is cancelable on teardown.

pub mod coordinator;
pub mod debounce;
pub mod events;
pub mod lifecycle;
pub mod map;
pub mod mode;
pub mod retry;
pub mod selection;
pub mod state;
pub mod viewport;

pub use coordinator::{FetchCoordinator, FlightTicket};
pub use debounce::{DebounceScheduler, ResourceKey};
pub use events::Event;
pub use lifecycle::LifecycleGuard;
pub use map::MapOrchestrator;
pub use mode::{effective_query_zoom, pins_visible, resolve, OverlayKey, RenderingMode};
pub use retry::{with_retry, RetryOutcome, RetryPolicy};
pub use selection::ProductSelection;
pub use state::{LoadingFlags, OrchestratorState, OverlayState, SoftErrors};
pub use viewport::Viewport;
