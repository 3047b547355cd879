use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::trace;

use crate::geocoding::PlaceResult;
use crate::records::Coordinates;

const KEY_SCALE: f64 = 10_000.0;

/// A coordinate rounded to four decimal places (about 11 m).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CoordinateKey {
    lat_e4: i32,
    lon_e4: i32,
}

impl CoordinateKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_e4: quantize(latitude),
            lon_e4: quantize(longitude),
        }
    }

    pub fn latitude(&self) -> f64 {
        f64::from(self.lat_e4) / KEY_SCALE
    }

    pub fn longitude(&self) -> f64 {
        f64::from(self.lon_e4) / KEY_SCALE
    }
}

fn quantize(value: f64) -> i32 {
    // -0.00001 rounds to -0.0, which casts to 0 like +0.0
    (value * KEY_SCALE).round() as i32
}

impl From<Coordinates> for CoordinateKey {
    fn from(value: Coordinates) -> Self {
        Self::new(value.latitude, value.longitude)
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.latitude(), self.longitude())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub joined: usize,
    pub fetches: usize,
}

type Slot = Arc<OnceCell<Arc<PlaceResult>>>;

/// Session-scoped reverse geocoding cache with single-flight lookups.
///
/// Each key owns one [`OnceCell`]; the first caller runs the fetcher inside
/// it and everyone arriving while that fetch is pending awaits the same
/// cell, so one key never has two provider calls in flight.
pub struct GeocodeCache {
    slots: Mutex<HashMap<CoordinateKey, Slot>>,
    cache_failures: bool,
    hits: AtomicUsize,
    joined: AtomicUsize,
    fetches: AtomicUsize,
}

impl GeocodeCache {
    pub fn new(cache_failures: bool) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            cache_failures,
            hits: AtomicUsize::new(0),
            joined: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: &CoordinateKey) -> Option<Arc<PlaceResult>> {
        self.slots
            .lock()
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    pub async fn resolve_or_fetch<F, Fut>(&self, key: CoordinateKey, fetcher: F) -> Arc<PlaceResult>
    where
        F: FnOnce(CoordinateKey) -> Fut,
        Fut: Future<Output = PlaceResult>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key).or_insert_with(|| Arc::new(OnceCell::new())))
        };

        if let Some(place) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(%key, "geocode cache hit");
            return Arc::clone(place);
        }

        let mut ran_fetch = false;
        let place = slot
            .get_or_init(|| {
                ran_fetch = true;
                self.fetches.fetch_add(1, Ordering::Relaxed);
                let pending = fetcher(key);
                async move { Arc::new(pending.await) }
            })
            .await;
        let place = Arc::clone(place);

        if !ran_fetch {
            self.joined.fetch_add(1, Ordering::Relaxed);
            trace!(%key, "joined in-flight geocode lookup");
        } else if place.is_failure() && !self.cache_failures {
            self.evict_slot(&key, &slot);
        }
        place
    }

    /// Drops every resolved entry. Lookups still in flight keep their slot
    /// so late arrivals join them instead of starting a second fetch.
    pub fn clear(&self) {
        self.slots.lock().retain(|_, slot| !slot.initialized());
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }

    fn evict_slot(&self, key: &CoordinateKey, slot: &Slot) {
        let mut slots = self.slots.lock();
        if slots
            .get(key)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
        {
            slots.remove(key);
        }
    }
}

impl Default for GeocodeCache {
    fn default() -> Self {
        Self::new(true)
    }
}
