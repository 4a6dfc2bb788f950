//! Test data helpers for creating test objects

use chrono::{Duration, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use StudyGroupFinder::models::{CreateEventRequest, CreateUserRequest, GeoPoint};

pub const SAN_FRANCISCO: (f64, f64) = (37.7749, -122.4194);
pub const LOS_ANGELES: (f64, f64) = (34.0522, -118.2437);

/// A profile request with a generated name and email
pub fn fake_profile(user_id: &str) -> CreateUserRequest {
    CreateUserRequest {
        id: user_id.to_string(),
        name: Name().fake(),
        email: SafeEmail().fake(),
        profile_pic: None,
    }
}

/// An event request one day ahead at the given coordinates
pub fn event_request_at(title: &str, max_participants: i32, lat: f64, lon: f64) -> CreateEventRequest {
    CreateEventRequest {
        title: title.to_string(),
        description: "Weekly review session".to_string(),
        date: Utc::now() + Duration::days(1),
        location: GeoPoint::new(lat, lon),
        location_name: "Main library, room 2".to_string(),
        max_participants,
        tags: vec!["exam-prep".to_string()],
    }
}
