//! Viewport state: center, zoom, padded bbox, zoom bucket.

use common::ViewportBBox;

/// Raw visible bounds plus camera center and continuous zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Viewport {
    /// Integer-floored zoom; drives mode resolution.
    pub fn zoom_bucket(&self) -> i32 {
        self.zoom.floor() as i32
    }

    /// Padded bbox — recomputed on every viewport mutation, never stored
    /// independently.
    pub fn padded_bbox(&self, padding_deg: f64) -> ViewportBBox {
        ViewportBBox::padded(self.west, self.south, self.east, self.north, padding_deg)
    }
}
