//! Document store boundary
//!
//! Every service is constructed with an `Arc<dyn DocumentStore>`. The trait
//! exposes the primitives the core relies on: single-document CRUD, the
//! handful of compound queries discovery and chat listing need, field-level
//! array-union/array-remove/increment updates, a version-guarded
//! compare-and-swap for optimistic transactions, and a change feed.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use crate::models::{Chat, CreateUserRequest, Event, EventRequest, Message, User, UserEventList};
use crate::utils::errors::Result;

/// Shared store handle injected into services
pub type StoreHandle = Arc<dyn DocumentStore>;

/// Capacity of the in-process change feed
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// A change notification published after every successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Event { event_id: String },
    Chat { chat_id: String },
    Messages { chat_id: String },
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // Events

    async fn insert_event(&self, event: &Event) -> Result<()>;
    async fn find_event(&self, event_id: &str) -> Result<Option<Event>>;
    /// Events with `date >= after`, ordered by date ascending
    async fn events_from(&self, after: DateTime<Utc>) -> Result<Vec<Event>>;
    /// Events hosted by the user, ordered by date ascending
    async fn events_by_host(&self, host_id: &str) -> Result<Vec<Event>>;
    /// Single "id in set" lookup. Callers respect the store's IN-clause limit.
    async fn events_by_ids(&self, ids: &[String]) -> Result<Vec<Event>>;
    /// Write `event` if the stored revision still equals `expected_version`.
    /// The stored copy gets `expected_version + 1`. Returns false on conflict
    /// or when the event no longer exists.
    async fn replace_event_if_version(&self, event: &Event, expected_version: i64) -> Result<bool>;
    /// Array-remove on `participants` without touching the counter
    async fn remove_event_participant(&self, event_id: &str, user_id: &str) -> Result<()>;
    /// Atomic increment of `current_participants`
    async fn increment_event_participants(&self, event_id: &str, delta: i32) -> Result<()>;
    /// Returns false when nothing was deleted
    async fn delete_event(&self, event_id: &str) -> Result<bool>;

    // Users

    /// Create the profile or refresh name/email/picture of an existing one
    async fn upsert_user(&self, request: &CreateUserRequest) -> Result<User>;
    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>>;
    /// Array-union on one of the user's event lists. Fails with `NotFound`
    /// when the user document does not exist.
    async fn add_user_event(&self, user_id: &str, list: UserEventList, event_id: &str) -> Result<()>;
    /// Array-remove on one of the user's event lists
    async fn remove_user_event(&self, user_id: &str, list: UserEventList, event_id: &str) -> Result<()>;

    // Event requests

    async fn insert_event_request(&self, request: &EventRequest) -> Result<()>;
    async fn event_requests(&self, event_id: &str, user_id: Option<&str>) -> Result<Vec<EventRequest>>;
    async fn delete_event_request(&self, request_id: &str) -> Result<()>;

    // Chats

    async fn insert_chat(&self, chat: &Chat) -> Result<()>;
    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>>;
    async fn find_chat_by_event(&self, event_id: &str) -> Result<Option<Chat>>;
    /// Chats containing the user, newest activity first
    async fn chats_for_participant(&self, user_id: &str) -> Result<Vec<Chat>>;
    async fn add_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<()>;
    async fn remove_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<()>;
    /// Set the denormalized last message and bump the activity timestamp
    async fn set_chat_last_message(&self, chat_id: &str, message: &Message, at: DateTime<Utc>) -> Result<()>;
    async fn touch_chat(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()>;
    async fn set_read_receipt(&self, chat_id: &str, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    // Messages

    async fn insert_message(&self, message: &Message) -> Result<()>;
    /// Messages of a chat, oldest first
    async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>>;
    /// Messages newer than `after` not sent by `user_id`
    async fn count_unread(&self, chat_id: &str, user_id: &str, after: DateTime<Utc>) -> Result<u64>;

    // Change feed

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange>;

    async fn health_check(&self) -> Result<()>;
}
