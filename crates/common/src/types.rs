//! Domain value types shared by the client and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Pollutant/field products the backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    No2,
    O3,
    Hcho,
    AerosolIndex,
    Pm25,
    Temperature,
}

impl Product {
    pub const ALL: [Product; 6] = [
        Product::No2,
        Product::O3,
        Product::Hcho,
        Product::AerosolIndex,
        Product::Pm25,
        Product::Temperature,
    ];

    /// Wire identifier used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::No2 => "no2",
            Product::O3 => "o3",
            Product::Hcho => "hcho",
            Product::AerosolIndex => "aerosol_index",
            Product::Pm25 => "pm25",
            Product::Temperature => "temperature",
        }
    }

    pub fn parse(s: &str) -> Option<Product> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no2" => Some(Product::No2),
            "o3" => Some(Product::O3),
            "hcho" => Some(Product::Hcho),
            "aerosol_index" | "aerosol-index" | "ai" => Some(Product::AerosolIndex),
            "pm25" | "pm2.5" => Some(Product::Pm25),
            "temperature" | "temp" => Some(Product::Temperature),
            _ => None,
        }
    }

    /// Products with ground-station correlation — station pins only make
    /// sense for these.
    pub fn supports_stations(&self) -> bool {
        matches!(self, Product::No2 | Product::O3 | Product::Pm25)
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed time window in a product's past timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Opaque granule identifier — must round-trip unchanged.
    pub granule_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl TimeSlot {
    /// Invariants: non-empty id, end >= start.
    pub fn validate(&self) -> Result<(), Error> {
        if self.granule_id.trim().is_empty() {
            return Err(Error::Validation("time slot granule_id is empty".into()));
        }
        if self.end < self.start {
            return Err(Error::Validation(format!(
                "time slot {} ends before it starts",
                self.granule_id
            )));
        }
        Ok(())
    }
}

/// Hours-ahead selector for forecast frames. 0 = "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastOffset(u8);

impl ForecastOffset {
    pub const MAX_HOURS: u8 = 12;
    pub const NOW: ForecastOffset = ForecastOffset(0);

    pub fn new(hours: u8) -> Result<ForecastOffset, Error> {
        if hours > Self::MAX_HOURS {
            return Err(Error::Validation(format!(
                "forecast offset {} out of range [0, {}]",
                hours,
                Self::MAX_HOURS
            )));
        }
        Ok(ForecastOffset(hours))
    }

    pub fn hours(&self) -> u8 {
        self.0
    }
}

/// Active time selection — a past slot XOR a forecast offset, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TimeSelector {
    Past { slot: TimeSlot },
    Forecast { offset: ForecastOffset },
}

impl TimeSelector {
    pub fn now() -> TimeSelector {
        TimeSelector::Forecast {
            offset: ForecastOffset::NOW,
        }
    }

    pub fn is_forecast(&self) -> bool {
        matches!(self, TimeSelector::Forecast { .. })
    }

    /// Granule id when pointing at the past.
    pub fn granule_id(&self) -> Option<&str> {
        match self {
            TimeSelector::Past { slot } => Some(&slot.granule_id),
            TimeSelector::Forecast { .. } => None,
        }
    }
}

/// Padded geographic window (degrees): west, south, east, north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportBBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl ViewportBBox {
    /// Pad raw visible bounds symmetrically, clamping latitude to the
    /// valid range. Longitude is left unwrapped — the backend accepts
    /// out-of-range longitudes and normalizes them.
    pub fn padded(west: f64, south: f64, east: f64, north: f64, padding_deg: f64) -> Self {
        Self {
            west: west - padding_deg,
            south: (south - padding_deg).max(-90.0),
            east: east + padding_deg,
            north: (north + padding_deg).min(90.0),
        }
    }

    /// Comma-joined `west,south,east,north` for query strings.
    pub fn to_query(&self) -> String {
        format!(
            "{:.5},{:.5},{:.5},{:.5}",
            self.west, self.south, self.east, self.north
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn forecast_offset_bounds() {
        assert!(ForecastOffset::new(0).is_ok());
        assert!(ForecastOffset::new(12).is_ok());
        assert!(ForecastOffset::new(13).is_err());
    }

    #[test]
    fn slot_validation() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let slot = TimeSlot {
            granule_id: "G123".into(),
            start,
            end: start + chrono::Duration::hours(1),
            saved_at: None,
        };
        assert!(slot.validate().is_ok());

        let inverted = TimeSlot {
            end: start - chrono::Duration::hours(1),
            ..slot.clone()
        };
        assert!(inverted.validate().is_err());

        let unnamed = TimeSlot {
            granule_id: "  ".into(),
            ..slot
        };
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn bbox_padding_clamps_latitude() {
        let b = ViewportBBox::padded(-74.5, 89.8, -73.5, 89.9, 0.4);
        assert_eq!(b.north, 90.0);
        assert!((b.west - -74.9).abs() < 1e-9);
        assert!((b.south - 89.4).abs() < 1e-9);
    }

    #[test]
    fn product_roundtrip() {
        for p in Product::ALL {
            assert_eq!(Product::parse(p.as_str()), Some(p));
        }
        assert_eq!(Product::parse("plutonium"), None);
    }
}
