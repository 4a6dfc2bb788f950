//! Chat and message models

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use super::event::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub event_id: String,
    pub participants: Vec<String>,
    /// The event host
    pub admin_id: String,
    pub last_message: Option<Message>,
    pub timestamp: DateTime<Utc>,
    pub read_receipts: HashMap<String, DateTime<Utc>>,
}

impl Chat {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn last_read(&self, user_id: &str) -> DateTime<Utc> {
        self.read_receipts
            .get(user_id)
            .copied()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub image_url: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub user_id: String,
    pub name: String,
    pub profile_pic: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatWithEventDetails {
    pub chat: Chat,
    pub event: Event,
}
