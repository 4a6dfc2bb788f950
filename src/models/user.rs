//! User model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_pic: Option<String>,
    pub joined_events: Vec<String>,
    pub created_events: Vec<String>,
    pub hosted_events: Vec<String>,
}

impl User {
    pub fn events(&self, list: UserEventList) -> &[String] {
        match list {
            UserEventList::Joined => &self.joined_events,
            UserEventList::Created => &self.created_events,
            UserEventList::Hosted => &self.hosted_events,
        }
    }

    pub fn events_mut(&mut self, list: UserEventList) -> &mut Vec<String> {
        match list {
            UserEventList::Joined => &mut self.joined_events,
            UserEventList::Created => &mut self.created_events,
            UserEventList::Hosted => &mut self.hosted_events,
        }
    }
}

/// The denormalized event-id lists kept on a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserEventList {
    Joined,
    Created,
    Hosted,
}

impl UserEventList {
    pub fn column(&self) -> &'static str {
        match self {
            UserEventList::Joined => "joined_events",
            UserEventList::Created => "created_events",
            UserEventList::Hosted => "hosted_events",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_pic: Option<String>,
}
