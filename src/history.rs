use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, trace};

use crate::batch::{AnnotatedRecord, BatchGeocoder};
use crate::errors::{AppError, AppResult};
use crate::map::{markers, MapMarker, MapOverview};
use crate::path::{build_path, TravelPath};
use crate::records::{RecordId, RecordStore};
use crate::selection::SelectionCoordinator;
use crate::timeline::{group_by_month, TimelineGroup};

/// Everything the timeline and map views render from, derived from one
/// listing of the user's records.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    pub user_id: String,
    pub records: Vec<AnnotatedRecord>,
    pub timeline: Vec<TimelineGroup>,
    pub path: TravelPath,
    pub overview: Option<MapOverview>,
}

impl HistorySnapshot {
    fn derive(user_id: String, records: Vec<AnnotatedRecord>) -> Self {
        let path = build_path(records.iter().map(|annotated| &annotated.record));
        let overview = MapOverview::from_records(&records, &path);
        let timeline = group_by_month(&records);
        Self {
            user_id,
            records,
            timeline,
            path,
            overview,
        }
    }

    pub fn total_trips(&self) -> usize {
        self.records.len()
    }

    pub fn mapped_count(&self) -> usize {
        self.records
            .iter()
            .filter(|annotated| annotated.record.is_geotagged())
            .count()
    }

    pub fn find(&self, id: &RecordId) -> Option<&AnnotatedRecord> {
        self.records.iter().find(|annotated| annotated.id() == id)
    }

    pub fn markers(&self, highlighted: Option<&RecordId>) -> Vec<MapMarker> {
        markers(&self.records, highlighted)
    }

    fn without(&self, id: &RecordId) -> Self {
        let remaining = self
            .records
            .iter()
            .filter(|annotated| annotated.id() != id)
            .cloned()
            .collect();
        Self::derive(self.user_id.clone(), remaining)
    }
}

/// The history screen's session: loads records, enriches them and keeps the
/// shared selection consistent with what is on screen.
pub struct TravelHistory {
    store: Arc<dyn RecordStore>,
    geocoder: BatchGeocoder,
    selection: Arc<SelectionCoordinator>,
    snapshot: Mutex<Option<Arc<HistorySnapshot>>>,
    guard: AsyncMutex<()>,
}

impl TravelHistory {
    pub fn new(
        store: Arc<dyn RecordStore>,
        geocoder: BatchGeocoder,
        selection: Arc<SelectionCoordinator>,
    ) -> Self {
        Self {
            store,
            geocoder,
            selection,
            snapshot: Mutex::new(None),
            guard: AsyncMutex::new(()),
        }
    }

    pub fn selection(&self) -> &Arc<SelectionCoordinator> {
        &self.selection
    }

    pub fn snapshot(&self) -> Option<Arc<HistorySnapshot>> {
        self.snapshot.lock().clone()
    }

    /// Lists, annotates and derives a fresh snapshot. A listing failure is
    /// returned as-is and leaves the previous snapshot in place.
    pub async fn load(&self, user_id: &str) -> AppResult<Arc<HistorySnapshot>> {
        let _lock = self.guard.lock().await;
        let records = self.store.list_records(user_id).await?;
        let annotated = self.geocoder.annotate(&records).await;
        let snapshot = Arc::new(HistorySnapshot::derive(user_id.to_string(), annotated));

        info!(
            trips = snapshot.total_trips(),
            mapped = snapshot.mapped_count(),
            distance_km = snapshot.path.total_distance_km,
            "travel history loaded"
        );
        *self.snapshot.lock() = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Deletes through the store, then drops the record from the current
    /// snapshot without geocoding again.
    pub async fn delete(&self, id: &RecordId) -> AppResult<()> {
        let _lock = self.guard.lock().await;
        match self.store.delete_record(id).await {
            Ok(()) => {}
            Err(AppError::NotFound(_)) => debug!(%id, "record already gone from storage"),
            Err(err) => return Err(err),
        }

        {
            let mut current = self.snapshot.lock();
            if let Some(snapshot) = current.take() {
                *current = Some(Arc::new(snapshot.without(id)));
            }
        }
        if self.selection.is_highlighted(id) {
            self.selection.clear();
        }
        Ok(())
    }

    /// The highlighted record, if it is still part of the snapshot.
    pub fn highlighted_record(&self) -> Option<AnnotatedRecord> {
        let id = self.selection.highlighted()?;
        let snapshot = self.snapshot()?;
        let found = snapshot.find(&id).cloned();
        if found.is_none() {
            trace!(%id, "ignoring stale highlight");
        }
        found
    }

    pub fn markers(&self) -> Vec<MapMarker> {
        let highlighted = self.selection.highlighted();
        self.snapshot()
            .map(|snapshot| snapshot.markers(highlighted.as_ref()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::cache::GeocodeCache;
    use crate::geocoding::tests::{fast_config, ScriptedGeocoder};
    use crate::geocoding::GeocodeResolver;
    use crate::records::{test_record, MemoryRecordStore, TravelRecord};

    fn history_over(store: Arc<dyn RecordStore>, provider: Arc<ScriptedGeocoder>) -> TravelHistory {
        let resolver = GeocodeResolver::with_provider(provider, &fast_config());
        let geocoder =
            BatchGeocoder::new(Arc::new(GeocodeCache::default()), Arc::new(resolver));
        TravelHistory::new(store, geocoder, Arc::new(SelectionCoordinator::new()))
    }

    fn sample_store() -> Arc<MemoryRecordStore> {
        Arc::new(MemoryRecordStore::new(vec![
            test_record("paris", "2023-01-10", Some((48.8566, 2.3522))),
            test_record("notes-only", "2023-01-20", None),
            test_record("rome", "2023-03-05", Some((41.9028, 12.4964))),
            test_record("berlin", "2022-11-01", Some((52.52, 13.405))),
        ]))
    }

    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn list_records(&self, _user_id: &str) -> AppResult<Vec<TravelRecord>> {
            Err(AppError::Storage("database unavailable".into()))
        }

        async fn delete_record(&self, _id: &RecordId) -> AppResult<()> {
            Err(AppError::Storage("database unavailable".into()))
        }
    }

    #[tokio::test]
    async fn load_builds_every_view_from_one_listing() {
        let provider = Arc::new(ScriptedGeocoder::new(Vec::new()));
        let history = history_over(sample_store(), provider.clone());

        let snapshot = history.load("user-1").await.unwrap();

        assert_eq!(snapshot.total_trips(), 4);
        assert_eq!(snapshot.mapped_count(), 3);
        assert_eq!(provider.calls(), 3);

        let keys: Vec<&str> = snapshot.timeline.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, ["2023-03", "2023-01", "2022-11"]);

        let order: Vec<&str> = snapshot
            .path
            .points
            .iter()
            .map(|p| p.record_id.as_str())
            .collect();
        assert_eq!(order, ["berlin", "paris", "rome"]);

        let notes_only = snapshot.find(&RecordId::new("notes-only")).unwrap();
        assert_eq!(notes_only.display_label(), "label for notes-only");
        assert!(snapshot.overview.is_some());
    }

    #[tokio::test]
    async fn listing_failures_propagate() {
        let provider = Arc::new(ScriptedGeocoder::new(Vec::new()));
        let history = history_over(Arc::new(FailingStore), provider.clone());

        let result = history.load("user-1").await;
        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(history.snapshot().is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn delete_updates_snapshot_and_drops_highlight() {
        let store = sample_store();
        let provider = Arc::new(ScriptedGeocoder::new(Vec::new()));
        let history = history_over(store.clone(), provider.clone());
        history.load("user-1").await.unwrap();

        let rome = RecordId::new("rome");
        history.selection().select_from_map(rome.clone());
        assert_eq!(history.highlighted_record().unwrap().id(), &rome);

        history.delete(&rome).await.unwrap();

        let snapshot = history.snapshot().unwrap();
        assert!(snapshot.find(&rome).is_none());
        assert_eq!(snapshot.path.points.len(), 2);
        assert_eq!(history.selection().highlighted(), None);
        assert_eq!(store.len(), 3);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn stale_highlights_are_ignored() {
        let provider = Arc::new(ScriptedGeocoder::new(Vec::new()));
        let history = history_over(sample_store(), provider);
        history.load("user-1").await.unwrap();

        history.selection().select_from_timeline(RecordId::new("deleted-elsewhere"));

        assert!(history.highlighted_record().is_none());
        assert!(history.markers().iter().all(|marker| !marker.highlighted));
    }

    #[tokio::test]
    async fn reload_reuses_cached_places() {
        let provider = Arc::new(ScriptedGeocoder::new(Vec::new()));
        let history = history_over(sample_store(), provider.clone());

        history.load("user-1").await.unwrap();
        history.load("user-1").await.unwrap();

        assert_eq!(provider.calls(), 3);
    }
}
