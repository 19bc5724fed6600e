//! Product/time selection state and the per-product timeline cache.

use std::collections::HashMap;

use common::{ForecastOffset, Product, TimeSelector, TimeSlot};

/// Active product, active time selection, and cached timelines.
///
/// The selector is a past slot XOR a forecast offset; transitions that set
/// one clear the other by construction of `TimeSelector`.
#[derive(Debug, Clone)]
pub struct ProductSelection {
    pub product: Product,
    pub selector: TimeSelector,
    /// Most recent past slot, kept so `clear_forecast` can revert to it.
    pub last_past_slot: Option<TimeSlot>,
    timelines: HashMap<Product, Vec<TimeSlot>>,
}

impl ProductSelection {
    pub fn new(product: Product) -> Self {
        Self {
            product,
            selector: TimeSelector::now(),
            last_past_slot: None,
            timelines: HashMap::new(),
        }
    }

    /// Cached timeline for a product, if discovery already ran.
    pub fn cached_timeline(&self, product: Product) -> Option<&[TimeSlot]> {
        self.timelines.get(&product).map(|v| v.as_slice())
    }

    /// Replace the cached timeline for a product. Slots failing their
    /// invariants are dropped rather than poisoning the cache.
    pub fn cache_timeline(&mut self, product: Product, slots: Vec<TimeSlot>) {
        let valid: Vec<TimeSlot> = slots
            .into_iter()
            .filter(|s| s.validate().is_ok())
            .collect();
        self.timelines.insert(product, valid);
    }

    /// Look up a slot by granule id in the active product's timeline.
    pub fn find_slot(&self, granule_id: &str) -> Option<&TimeSlot> {
        self.timelines
            .get(&self.product)?
            .iter()
            .find(|s| s.granule_id == granule_id)
    }

    /// Enter past mode on `slot`.
    pub fn select_past(&mut self, slot: TimeSlot) {
        self.last_past_slot = Some(slot.clone());
        self.selector = TimeSelector::Past { slot };
    }

    /// Enter forecast mode at `offset`.
    pub fn select_forecast(&mut self, offset: ForecastOffset) {
        self.selector = TimeSelector::Forecast { offset };
    }

    /// Leave forecast mode: revert to the most recent past slot if one
    /// exists, else to the live "now" frame. Returns false when nothing
    /// changed (not in forecast mode, or already at "now" with no
    /// history).
    pub fn clear_forecast(&mut self) -> bool {
        match (&self.selector, self.last_past_slot.clone()) {
            (TimeSelector::Forecast { .. }, Some(slot)) => {
                self.selector = TimeSelector::Past { slot };
                true
            }
            (TimeSelector::Forecast { offset }, None) if *offset != ForecastOffset::NOW => {
                self.selector = TimeSelector::now();
                true
            }
            _ => false,
        }
    }

    /// Reset for a product switch: forecast "now", dependent state gone.
    /// The timeline cache survives — it is keyed per product.
    pub fn switch_product(&mut self, product: Product) {
        self.product = product;
        self.selector = TimeSelector::now();
        self.last_past_slot = None;
    }
}
