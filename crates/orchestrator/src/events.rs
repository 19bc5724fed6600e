//! Observer surface — edge-triggered notifications over a broadcast
//! channel. Subscribers drop out naturally on disposal when the sender
//! goes away; laggards miss events rather than block the orchestrator.

use crate::debounce::ResourceKey;

/// What changed. Payloads stay in the state snapshot; events only say
/// which region of it to re-read.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    LoadingChanged { resource: ResourceKey, loading: bool },
    StatusUpdated,
    GridUpdated,
    OverlayChanged,
    LegendUpdated,
    TimelineUpdated,
    StationsUpdated,
    AssessmentUpdated,
    ModeChanged,
    /// Retries exhausted for one resource; previous good data is kept.
    SoftError {
        resource: ResourceKey,
        message: String,
    },
}
