use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::cache::{CoordinateKey, GeocodeCache};
use crate::geocoding::{GeocodeResolver, PlaceResult};
use crate::records::{RecordId, TravelRecord};

pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// A travel record paired with its resolved place, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRecord {
    pub record: TravelRecord,
    pub place: Option<Arc<PlaceResult>>,
}

impl AnnotatedRecord {
    pub fn unannotated(record: TravelRecord) -> Self {
        Self {
            record,
            place: None,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.record.id
    }

    /// The label every view shows for this record.
    pub fn display_label(&self) -> String {
        if let Some(place) = &self.place {
            return format_location(place);
        }
        let label = self.record.location.trim();
        if label.is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            label.to_string()
        }
    }
}

/// "City, State" when both are known, else whichever is known, else the
/// full address, else [`UNKNOWN_LOCATION`].
pub fn format_location(place: &PlaceResult) -> String {
    match (place.has_city(), place.has_state()) {
        (true, true) => format!("{}, {}", place.city.trim(), place.state.trim()),
        (true, false) => place.city.trim().to_string(),
        (false, true) => place.state.trim().to_string(),
        (false, false) => {
            let address = place.full_address.trim();
            if address.is_empty() {
                UNKNOWN_LOCATION.to_string()
            } else {
                address.to_string()
            }
        }
    }
}

#[derive(Clone)]
pub struct BatchGeocoder {
    cache: Arc<GeocodeCache>,
    resolver: Arc<GeocodeResolver>,
}

impl BatchGeocoder {
    pub fn new(cache: Arc<GeocodeCache>, resolver: Arc<GeocodeResolver>) -> Self {
        Self { cache, resolver }
    }

    pub fn cache(&self) -> &Arc<GeocodeCache> {
        &self.cache
    }

    /// Annotates a snapshot of records. Output order matches input order;
    /// records without coordinates pass through with no place.
    pub async fn annotate(&self, records: &[TravelRecord]) -> Vec<AnnotatedRecord> {
        let lookups = records.iter().map(|record| async move {
            let place = match record.coordinates() {
                Some(coordinates) => Some(self.resolve(CoordinateKey::from(coordinates)).await),
                None => None,
            };
            AnnotatedRecord {
                record: record.clone(),
                place,
            }
        });
        let annotated = join_all(lookups).await;

        debug!(
            total = annotated.len(),
            resolved = annotated.iter().filter(|r| r.place.is_some()).count(),
            cache_entries = self.cache.len(),
            "annotated travel records"
        );
        annotated
    }

    async fn resolve(&self, key: CoordinateKey) -> Arc<PlaceResult> {
        let resolver = Arc::clone(&self.resolver);
        self.cache
            .resolve_or_fetch(key, move |k| async move {
                resolver.reverse_geocode(k.latitude(), k.longitude()).await
            })
            .await
    }
}
