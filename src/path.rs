use chrono::NaiveDate;
use serde::Serialize;

use crate::records::{Coordinates, RecordId, TravelRecord};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathPoint {
    pub record_id: RecordId,
    pub latitude: f64,
    pub longitude: f64,
    pub travel_date: NaiveDate,
}

impl PathPoint {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Geotagged records in travel order with the straight-line distance
/// covered between consecutive stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelPath {
    pub points: Vec<PathPoint>,
    pub total_distance_km: f64,
}

impl TravelPath {
    pub fn empty() -> Self {
        Self {
            points: Vec::new(),
            total_distance_km: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Geotagged records sorted by travel date. Ties keep their input order.
pub fn chronological<'a, I>(records: I) -> Vec<PathPoint>
where
    I: IntoIterator<Item = &'a TravelRecord>,
{
    let mut points: Vec<PathPoint> = records
        .into_iter()
        .filter_map(|record| {
            record.coordinates().map(|coordinates| PathPoint {
                record_id: record.id.clone(),
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
                travel_date: record.travel_date,
            })
        })
        .collect();
    points.sort_by_key(|point| point.travel_date);
    points
}

/// Builds the chronological path. Fewer than two geotagged records give an
/// empty path with zero distance.
pub fn build_path<'a, I>(records: I) -> TravelPath
where
    I: IntoIterator<Item = &'a TravelRecord>,
{
    let points = chronological(records);
    if points.len() < 2 {
        return TravelPath::empty();
    }

    let total_distance_km = points
        .windows(2)
        .map(|pair| haversine_km(pair[0].coordinates(), pair[1].coordinates()))
        .sum();
    TravelPath {
        points,
        total_distance_km,
    }
}

pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_record;

    fn at(latitude: f64, longitude: f64) -> Coordinates {
        Coordinates::new(latitude, longitude).unwrap()
    }

    #[test]
    fn orders_by_date_not_by_proximity() {
        let records = vec![
            test_record("jan", "2023-01-01", Some((0.0, 0.0))),
            test_record("mar", "2023-03-01", Some((0.0, 1.0))),
            test_record("feb", "2023-02-01", Some((0.0, 2.0))),
        ];

        let path = build_path(&records);
        let coords: Vec<(f64, f64)> = path
            .points
            .iter()
            .map(|p| (p.latitude, p.longitude))
            .collect();
        assert_eq!(coords, [(0.0, 0.0), (0.0, 2.0), (0.0, 1.0)]);

        let expected =
            haversine_km(at(0.0, 0.0), at(0.0, 2.0)) + haversine_km(at(0.0, 2.0), at(0.0, 1.0));
        assert!((path.total_distance_km - expected).abs() < 1e-9);
        assert!((path.total_distance_km - 333.585).abs() < 0.01);
    }

    #[test]
    fn short_inputs_give_an_empty_path() {
        assert_eq!(build_path(&Vec::<TravelRecord>::new()), TravelPath::empty());

        let single = vec![test_record("only", "2023-01-01", Some((10.0, 10.0)))];
        let path = build_path(&single);
        assert!(path.is_empty());
        assert_eq!(path.total_distance_km, 0.0);
    }

    #[test]
    fn skips_records_without_coordinates_and_keeps_tie_order() {
        let records = vec![
            test_record("b", "2023-05-01", Some((1.0, 1.0))),
            test_record("skip", "2023-04-01", None),
            test_record("a", "2023-05-01", Some((2.0, 2.0))),
            test_record("first", "2023-01-01", Some((3.0, 3.0))),
        ];

        let ids: Vec<String> = build_path(&records)
            .points
            .iter()
            .map(|p| p.record_id.to_string())
            .collect();
        assert_eq!(ids, ["first", "b", "a"]);
    }

    #[test]
    fn haversine_matches_known_distance() {
        let paris = at(48.8566, 2.3522);
        let london = at(51.5074, -0.1278);
        let km = haversine_km(paris, london);
        assert!((km - 343.5).abs() < 1.0, "got {km}");
        assert_eq!(haversine_km(paris, paris), 0.0);
    }
}
