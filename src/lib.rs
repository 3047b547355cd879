mod batch;
mod cache;
mod config;
mod errors;
mod geocoding;
mod history;
mod map;
mod path;
mod records;
mod selection;
mod timeline;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use batch::{format_location, AnnotatedRecord, BatchGeocoder, UNKNOWN_LOCATION};
pub use cache::{CacheStats, CoordinateKey, GeocodeCache};
pub use config::{AppConfig, PublicAppConfig};
pub use errors::{AppError, AppResult};
pub use geocoding::{
    GeocodeResolver, NominatimClient, PlaceResult, ReverseGeocoder, UNKNOWN, UNKNOWN_CITY,
    UNKNOWN_STATE,
};
pub use history::{HistorySnapshot, TravelHistory};
pub use map::{markers, Bounds, MapMarker, MapOverview};
pub use path::{build_path, chronological, haversine_km, PathPoint, TravelPath, EARTH_RADIUS_KM};
pub use records::{Coordinates, MemoryRecordStore, RecordId, RecordStore, TravelRecord};
pub use selection::{
    SelectionCoordinator, SelectionEvent, SelectionListener, SubscriptionId, ViewKind,
};
pub use timeline::{format_travel_date, group_by_month, notes_preview, TimelineGroup};

/// One application session: a single geocode cache shared by every view,
/// plus the history screen built on top of it.
pub struct AppState {
    config: AppConfig,
    cache: Arc<GeocodeCache>,
    history: TravelHistory,
}

impl AppState {
    pub fn initialize(store: Arc<dyn RecordStore>) -> AppResult<Self> {
        init_tracing();
        let config = AppConfig::from_env();
        let resolver = GeocodeResolver::new(&config)?;
        Ok(Self::with_resolver(config, store, resolver))
    }

    pub fn with_resolver(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        resolver: GeocodeResolver,
    ) -> Self {
        let cache = Arc::new(GeocodeCache::new(config.cache_failed_lookups));
        let geocoder = BatchGeocoder::new(Arc::clone(&cache), Arc::new(resolver));
        let history = TravelHistory::new(store, geocoder, Arc::new(SelectionCoordinator::new()));
        info!(config = ?config.public_profile(), "triptrace session initialized");
        Self {
            config,
            cache,
            history,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn history(&self) -> &TravelHistory {
        &self.history
    }

    pub fn selection(&self) -> &Arc<SelectionCoordinator> {
        self.history.selection()
    }

    pub fn geocode_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_geocode_cache(&self) {
        self.cache.clear();
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,triptrace_lib=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
