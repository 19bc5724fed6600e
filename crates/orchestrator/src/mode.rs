//! Rendering-mode resolution from zoom bucket and overlay toggle.

use common::{Product, TimeSelector};

/// Cache-discriminating key for the raster overlay. A new overlay URL is
/// only built when this changes (or a forced refresh is requested).
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayKey {
    pub product: Product,
    pub selector: TimeSelector,
    pub zoom_bucket: i32,
}

/// How the map renders the active product at the current zoom.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderingMode {
    Off,
    /// Server-rendered PNG tiles, mid zooms.
    RasterOverlay { key: OverlayKey },
    /// Client-colored cell list, close zooms.
    JsonGrid,
}

impl RenderingMode {
    pub fn is_raster(&self) -> bool {
        matches!(self, RenderingMode::RasterOverlay { .. })
    }

    pub fn is_grid(&self) -> bool {
        matches!(self, RenderingMode::JsonGrid)
    }
}

/// Raster overlays render at buckets 3..=7; the JSON grid takes over at 8.
pub fn resolve(
    zoom_bucket: i32,
    overlay_enabled: bool,
    product: Product,
    selector: &TimeSelector,
) -> RenderingMode {
    if !overlay_enabled {
        return RenderingMode::Off;
    }
    match zoom_bucket {
        3..=7 => RenderingMode::RasterOverlay {
            key: OverlayKey {
                product,
                selector: selector.clone(),
                zoom_bucket,
            },
        },
        b if b >= 8 => RenderingMode::JsonGrid,
        _ => RenderingMode::Off,
    }
}

/// Grid and point-assessment queries always request a resolution-stable
/// zoom, bounding backend tile cardinality: 8 maps up to 9, anything past
/// 11 maps down to 11.
pub fn effective_query_zoom(zoom_bucket: i32) -> u8 {
    zoom_bucket.clamp(9, 11) as u8
}

/// Station pins appear only when zoomed close and the product has
/// ground-station correlation.
pub fn pins_visible(zoom_bucket: i32, product: Product) -> bool {
    zoom_bucket >= 9 && product.supports_stations()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> TimeSelector {
        TimeSelector::now()
    }

    #[test]
    fn overlay_disabled_is_off() {
        for bucket in [0, 5, 9, 14] {
            assert_eq!(
                resolve(bucket, false, Product::No2, &now()),
                RenderingMode::Off
            );
        }
    }

    #[test]
    fn bucket_ranges_pick_modes() {
        assert_eq!(resolve(2, true, Product::No2, &now()), RenderingMode::Off);
        assert!(resolve(3, true, Product::No2, &now()).is_raster());
        assert!(resolve(7, true, Product::No2, &now()).is_raster());
        assert!(resolve(8, true, Product::No2, &now()).is_grid());
        assert!(resolve(15, true, Product::No2, &now()).is_grid());
    }

    #[test]
    fn overlay_key_discriminates_zoom() {
        let a = resolve(5, true, Product::No2, &now());
        let b = resolve(6, true, Product::No2, &now());
        assert_ne!(a, b);
    }

    #[test]
    fn effective_zoom_clamps() {
        assert_eq!(effective_query_zoom(8), 9);
        assert_eq!(effective_query_zoom(9), 9);
        assert_eq!(effective_query_zoom(11), 11);
        assert_eq!(effective_query_zoom(14), 11);
    }

    #[test]
    fn pin_visibility_needs_zoom_and_product() {
        assert!(pins_visible(9, Product::Pm25));
        assert!(!pins_visible(8, Product::Pm25));
        assert!(!pins_visible(10, Product::Temperature));
    }
}
