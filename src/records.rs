use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` for non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// A travel record as stored by the storage collaborator. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelRecord {
    pub id: RecordId,
    pub user_id: String,
    pub photo_url: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub travel_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TravelRecord {
    /// Coordinates count only when both halves are present and valid.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Coordinates::new(latitude, longitude),
            _ => None,
        }
    }

    pub fn is_geotagged(&self) -> bool {
        self.coordinates().is_some()
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Lists a user's records, newest travel date first.
    async fn list_records(&self, user_id: &str) -> AppResult<Vec<TravelRecord>>;

    async fn delete_record(&self, id: &RecordId) -> AppResult<()>;
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<TravelRecord>>,
}

impl MemoryRecordStore {
    pub fn new(records: Vec<TravelRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn insert(&self, record: TravelRecord) {
        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_records(&self, user_id: &str) -> AppResult<Vec<TravelRecord>> {
        let mut owned: Vec<TravelRecord> = self
            .records
            .lock()
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.travel_date.cmp(&a.travel_date));
        Ok(owned)
    }

    async fn delete_record(&self, id: &RecordId) -> AppResult<()> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|record| &record.id != id);
        if records.len() == before {
            return Err(AppError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_record(
    id: &str,
    date: &str,
    coordinates: Option<(f64, f64)>,
) -> TravelRecord {
    TravelRecord {
        id: RecordId::new(id),
        user_id: "user-1".into(),
        photo_url: format!("https://photos.example.com/{id}.jpg"),
        location: format!("label for {id}"),
        latitude: coordinates.map(|(lat, _)| lat),
        longitude: coordinates.map(|(_, lon)| lon),
        travel_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        notes: None,
    }
}
