//! Great-circle distance and radius filtering for event discovery

use crate::models::{Event, GeoPoint};

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub struct GeoFilter;

impl GeoFilter {
    /// Haversine distance between two coordinates given in degrees
    pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let d_lat = (lat2 - lat1).to_radians();
        let d_lon = (lon2 - lon1).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }

    pub fn distance_between(a: &GeoPoint, b: &GeoPoint) -> f64 {
        Self::distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
    }

    /// Keep events within `radius_km` of `center` that `exclude_user_id` has
    /// not joined. Candidates are expected to be upcoming already; the host's
    /// own events are the caller's concern.
    pub fn nearby_events(
        center: &GeoPoint,
        radius_km: f64,
        candidates: impl IntoIterator<Item = Event>,
        exclude_user_id: &str,
    ) -> Vec<Event> {
        candidates
            .into_iter()
            .filter(|event| Self::distance_between(center, &event.location) <= radius_km)
            .filter(|event| !event.has_participant(exclude_user_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    const SF: (f64, f64) = (37.7749, -122.4194);
    const LA: (f64, f64) = (34.0522, -118.2437);

    fn event_at(id: &str, lat: f64, lon: f64, participants: &[&str]) -> Event {
        Event {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            date: Utc::now(),
            location: GeoPoint::new(lat, lon),
            location_name: String::new(),
            host_id: "host".to_string(),
            host_name: String::new(),
            host_profile_pic: None,
            created_at: Utc::now(),
            max_participants: 10,
            current_participants: participants.len() as i32,
            tags: vec![],
            participants: participants.iter().map(|p| p.to_string()).collect(),
            pending_participants: vec![],
            version: 0,
        }
    }

    #[test]
    fn test_san_francisco_to_los_angeles() {
        let d = GeoFilter::distance_km(SF.0, SF.1, LA.0, LA.1);
        assert!((d - 559.0).abs() <= 2.0, "got {}", d);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = GeoFilter::distance_km(0.0, 0.0, 1.0, 0.0);
        let expected = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;
        assert!(((d - expected) / expected).abs() < 1e-6);
    }

    #[test]
    fn test_nearby_filters_radius_and_membership() {
        let center = GeoPoint::new(SF.0, SF.1);
        let candidates = vec![
            event_at("close", 37.78, -122.41, &[]),
            event_at("joined", 37.78, -122.42, &["me"]),
            event_at("far", LA.0, LA.1, &[]),
        ];

        let nearby = GeoFilter::nearby_events(&center, 10.0, candidates, "me");
        let ids: Vec<&str> = nearby.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["close"]);
    }

    #[test]
    fn test_radius_is_inclusive() {
        let center = GeoPoint::new(0.0, 0.0);
        let event = event_at("edge", 1.0, 0.0, &[]);
        let radius = GeoFilter::distance_km(0.0, 0.0, 1.0, 0.0);
        assert_eq!(GeoFilter::nearby_events(&center, radius, vec![event], "me").len(), 1);
    }

    proptest! {
        #[test]
        fn prop_distance_to_self_is_zero(lat in -90.0f64..90.0, lon in -180.0f64..180.0) {
            prop_assert!(GeoFilter::distance_km(lat, lon, lat, lon).abs() < 1e-9);
        }

        #[test]
        fn prop_distance_is_symmetric(
            lat1 in -90.0f64..90.0, lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lon2 in -180.0f64..180.0,
        ) {
            let ab = GeoFilter::distance_km(lat1, lon1, lat2, lon2);
            let ba = GeoFilter::distance_km(lat2, lon2, lat1, lon1);
            prop_assert!((ab - ba).abs() <= 1e-9 * ab.max(1.0));
        }

        #[test]
        fn prop_distance_is_bounded_by_half_circumference(
            lat1 in -90.0f64..90.0, lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lon2 in -180.0f64..180.0,
        ) {
            let d = GeoFilter::distance_km(lat1, lon1, lat2, lon2);
            prop_assert!(d >= 0.0);
            prop_assert!(d <= EARTH_RADIUS_KM * std::f64::consts::PI + 1e-6);
        }
    }
}
