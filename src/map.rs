use chrono::NaiveDate;
use serde::Serialize;

use crate::batch::AnnotatedRecord;
use crate::path::{chronological, TravelPath};
use crate::records::{Coordinates, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

/// Summary the map legend and initial viewport are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapOverview {
    pub center: Coordinates,
    pub bounds: Bounds,
    pub mapped_locations: usize,
    pub total_distance_km: f64,
    pub first_journey: NaiveDate,
    pub latest_journey: NaiveDate,
}

impl MapOverview {
    /// `None` when no record carries coordinates.
    pub fn from_records(records: &[AnnotatedRecord], path: &TravelPath) -> Option<Self> {
        let stops = chronological(records.iter().map(|annotated| &annotated.record));
        let first = stops.first()?;
        let latest = stops.last()?;

        let count = stops.len() as f64;
        let mut bounds = Bounds {
            south: f64::INFINITY,
            west: f64::INFINITY,
            north: f64::NEG_INFINITY,
            east: f64::NEG_INFINITY,
        };
        let (mut lat_sum, mut lon_sum) = (0.0, 0.0);
        for stop in &stops {
            lat_sum += stop.latitude;
            lon_sum += stop.longitude;
            bounds.south = bounds.south.min(stop.latitude);
            bounds.north = bounds.north.max(stop.latitude);
            bounds.west = bounds.west.min(stop.longitude);
            bounds.east = bounds.east.max(stop.longitude);
        }

        Some(Self {
            center: Coordinates {
                latitude: lat_sum / count,
                longitude: lon_sum / count,
            },
            bounds,
            mapped_locations: stops.len(),
            total_distance_km: path.total_distance_km,
            first_journey: first.travel_date,
            latest_journey: latest.travel_date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub record_id: RecordId,
    pub position: Coordinates,
    pub label: String,
    pub travel_date: NaiveDate,
    pub highlighted: bool,
    pub first: bool,
    pub last: bool,
}

/// One marker per geotagged record, in input order. `first`/`last` mark the
/// chronological endpoints of the journey.
pub fn markers(records: &[AnnotatedRecord], highlighted: Option<&RecordId>) -> Vec<MapMarker> {
    let stops = chronological(records.iter().map(|annotated| &annotated.record));
    let first = stops.first().map(|stop| &stop.record_id);
    let last = stops.last().map(|stop| &stop.record_id);

    records
        .iter()
        .filter_map(|annotated| {
            let position = annotated.record.coordinates()?;
            let id = annotated.id();
            Some(MapMarker {
                record_id: id.clone(),
                position,
                label: annotated.display_label(),
                travel_date: annotated.record.travel_date,
                highlighted: highlighted == Some(id),
                first: first == Some(id),
                last: last == Some(id),
            })
        })
        .collect()
}
