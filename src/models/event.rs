//! Event model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use crate::utils::errors::{StudyGroupError, Result};

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(StudyGroupError::InvalidArgument(
                format!("Latitude out of range: {}", self.latitude)
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(StudyGroupError::InvalidArgument(
                format!("Longitude out of range: {}", self.longitude)
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: GeoPoint,
    pub location_name: String,
    pub host_id: String,
    pub host_name: String,
    pub host_profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub max_participants: i32,
    pub current_participants: i32,
    pub tags: Vec<String>,
    pub participants: Vec<String>,
    /// Carried for schema compatibility; no join path populates it
    pub pending_participants: Vec<String>,
    /// Optimistic concurrency revision, bumped on every write
    pub version: i64,
}

impl Event {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.current_participants >= self.max_participants
    }

    pub fn remaining_capacity(&self) -> i32 {
        (self.max_participants - self.current_participants).max(0)
    }

    /// `current_participants == |participants| <= max_participants`
    pub fn counters_consistent(&self) -> bool {
        self.current_participants as usize == self.participants.len()
            && self.current_participants <= self.max_participants
    }

    /// Array-union of a participant, keeping the counter in step.
    /// Returns false when the user was already present.
    pub fn add_participant(&mut self, user_id: &str) -> bool {
        if self.has_participant(user_id) {
            return false;
        }
        self.participants.push(user_id.to_string());
        self.current_participants += 1;
        true
    }

    /// Array-remove of a participant, keeping the counter in step.
    /// Returns false when the user was not present.
    pub fn remove_participant(&mut self, user_id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p != user_id);
        if self.participants.len() == before {
            return false;
        }
        self.current_participants -= 1;
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: GeoPoint,
    pub location_name: String,
    pub max_participants: i32,
    pub tags: Vec<String>,
}

impl CreateEventRequest {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(StudyGroupError::InvalidArgument("Event title is required".to_string()));
        }
        if self.max_participants <= 0 {
            return Err(StudyGroupError::InvalidArgument(
                format!("maxParticipants must be positive, got {}", self.max_participants)
            ));
        }
        self.location.validate()
    }
}

/// An event participant resolved to its user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub name: String,
    pub profile_pic: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventRequest {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(max: i32) -> Event {
        Event {
            id: "e1".to_string(),
            title: "Linear algebra".to_string(),
            description: String::new(),
            date: Utc::now(),
            location: GeoPoint::new(0.0, 0.0),
            location_name: String::new(),
            host_id: "host".to_string(),
            host_name: "Host".to_string(),
            host_profile_pic: None,
            created_at: Utc::now(),
            max_participants: max,
            current_participants: 0,
            tags: vec![],
            participants: vec![],
            pending_participants: vec![],
            version: 0,
        }
    }

    #[test]
    fn test_add_and_remove_keep_counter_in_step() {
        let mut event = sample_event(2);
        assert!(event.add_participant("a"));
        assert!(!event.add_participant("a"));
        assert_eq!(event.current_participants, 1);
        assert!(event.counters_consistent());

        assert!(event.remove_participant("a"));
        assert!(!event.remove_participant("a"));
        assert_eq!(event.current_participants, 0);
        assert!(event.counters_consistent());
    }

    #[test]
    fn test_is_full() {
        let mut event = sample_event(1);
        assert!(!event.is_full());
        event.add_participant("a");
        assert!(event.is_full());
        assert_eq!(event.remaining_capacity(), 0);
    }

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(37.77, -122.41).validate().is_ok());
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -181.0).validate().is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let request = CreateEventRequest {
            title: "Calculus".to_string(),
            description: String::new(),
            date: Utc::now(),
            location: GeoPoint::new(0.0, 0.0),
            location_name: "Library".to_string(),
            max_participants: 0,
            tags: vec![],
        };
        assert!(matches!(request.validate(), Err(StudyGroupError::InvalidArgument(_))));
    }

    #[test]
    fn test_request_status_display() {
        assert_eq!(RequestStatus::Pending.to_string(), "pending");
    }
}
