//! In-process document store
//!
//! Backs local runs and the test suite. Holds every collection behind one
//! async lock, publishes change notifications like the PostgreSQL store, and
//! supports fault injection so best-effort paths can be exercised.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use crate::models::{Chat, CreateUserRequest, Event, EventRequest, Message, User, UserEventList};
use crate::utils::errors::{StudyGroupError, Result};
use super::store::{DocumentStore, StoreChange, CHANGE_FEED_CAPACITY};

/// Store operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    InsertEvent,
    FindEvent,
    QueryEvents,
    ReplaceEvent,
    RemoveEventParticipant,
    IncrementEventParticipants,
    DeleteEvent,
    UpsertUser,
    FindUser,
    AddUserEvent,
    RemoveUserEvent,
    QueryEventRequests,
    DeleteEventRequest,
    InsertChat,
    FindChat,
    AddChatParticipant,
    RemoveChatParticipant,
    UpdateChat,
    InsertMessage,
    QueryMessages,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Always,
    Times(u32),
}

#[derive(Default)]
struct MemoryData {
    events: HashMap<String, Event>,
    users: HashMap<String, User>,
    requests: HashMap<String, EventRequest>,
    chats: HashMap<String, Chat>,
    messages: HashMap<String, Vec<Message>>,
}

struct MemoryInner {
    data: RwLock<MemoryData>,
    changes: broadcast::Sender<StoreChange>,
    faults: Mutex<HashMap<StoreOperation, Fault>>,
    forced_conflicts: AtomicU32,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                data: RwLock::new(MemoryData::default()),
                changes,
                faults: Mutex::new(HashMap::new()),
                forced_conflicts: AtomicU32::new(0),
            }),
        }
    }

    /// Make every call of `operation` fail with a transient error
    pub fn fail(&self, operation: StoreOperation) {
        self.lock_faults().insert(operation, Fault::Always);
    }

    /// Make the next `times` calls of `operation` fail
    pub fn fail_times(&self, operation: StoreOperation, times: u32) {
        self.lock_faults().insert(operation, Fault::Times(times));
    }

    pub fn heal(&self, operation: StoreOperation) {
        self.lock_faults().remove(&operation);
    }

    /// Report a version conflict on the next `count` compare-and-swap writes
    pub fn force_conflicts(&self, count: u32) {
        self.inner.forced_conflicts.store(count, Ordering::SeqCst);
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, HashMap<StoreOperation, Fault>> {
        // A poisoned fault table only means a test panicked mid-update
        self.inner.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, operation: StoreOperation) -> Result<()> {
        let mut faults = self.lock_faults();
        let fail = match faults.get(&operation).copied() {
            None => false,
            Some(Fault::Always) => true,
            Some(Fault::Times(remaining)) => {
                if remaining <= 1 {
                    faults.remove(&operation);
                } else {
                    faults.insert(operation, Fault::Times(remaining - 1));
                }
                true
            }
        };

        if fail {
            debug!(operation = ?operation, "Injected store failure");
            return Err(StudyGroupError::TransientStore(format!("injected failure on {:?}", operation)));
        }
        Ok(())
    }

    fn take_forced_conflict(&self) -> bool {
        self.inner
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn publish(&self, change: StoreChange) {
        // No receivers is fine
        let _ = self.inner.changes.send(change);
    }

    fn sort_by_date(events: &mut [Event]) {
        events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    }
}

fn user_not_found(user_id: &str) -> StudyGroupError {
    StudyGroupError::NotFound { entity: "User", id: user_id.to_string() }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_event(&self, event: &Event) -> Result<()> {
        self.check(StoreOperation::InsertEvent)?;
        self.inner.data.write().await.events.insert(event.id.clone(), event.clone());
        self.publish(StoreChange::Event { event_id: event.id.clone() });
        Ok(())
    }

    async fn find_event(&self, event_id: &str) -> Result<Option<Event>> {
        self.check(StoreOperation::FindEvent)?;
        Ok(self.inner.data.read().await.events.get(event_id).cloned())
    }

    async fn events_from(&self, after: DateTime<Utc>) -> Result<Vec<Event>> {
        self.check(StoreOperation::QueryEvents)?;
        let data = self.inner.data.read().await;
        let mut events: Vec<Event> = data.events.values().filter(|e| e.date >= after).cloned().collect();
        Self::sort_by_date(&mut events);
        Ok(events)
    }

    async fn events_by_host(&self, host_id: &str) -> Result<Vec<Event>> {
        self.check(StoreOperation::QueryEvents)?;
        let data = self.inner.data.read().await;
        let mut events: Vec<Event> = data.events.values().filter(|e| e.host_id == host_id).cloned().collect();
        Self::sort_by_date(&mut events);
        Ok(events)
    }

    async fn events_by_ids(&self, ids: &[String]) -> Result<Vec<Event>> {
        self.check(StoreOperation::QueryEvents)?;
        let data = self.inner.data.read().await;
        let mut events: Vec<Event> = ids.iter().filter_map(|id| data.events.get(id).cloned()).collect();
        Self::sort_by_date(&mut events);
        events.dedup_by(|a, b| a.id == b.id);
        Ok(events)
    }

    async fn replace_event_if_version(&self, event: &Event, expected_version: i64) -> Result<bool> {
        self.check(StoreOperation::ReplaceEvent)?;
        if self.take_forced_conflict() {
            return Ok(false);
        }

        let mut data = self.inner.data.write().await;
        match data.events.get_mut(&event.id) {
            Some(stored) if stored.version == expected_version => {
                let mut next = event.clone();
                next.version = expected_version + 1;
                *stored = next;
            }
            _ => return Ok(false),
        }
        drop(data);

        self.publish(StoreChange::Event { event_id: event.id.clone() });
        Ok(true)
    }

    async fn remove_event_participant(&self, event_id: &str, user_id: &str) -> Result<()> {
        self.check(StoreOperation::RemoveEventParticipant)?;
        let mut data = self.inner.data.write().await;
        let event = data.events.get_mut(event_id).ok_or_else(|| StudyGroupError::event_not_found(event_id))?;
        event.participants.retain(|p| p != user_id);
        event.version += 1;
        drop(data);

        self.publish(StoreChange::Event { event_id: event_id.to_string() });
        Ok(())
    }

    async fn increment_event_participants(&self, event_id: &str, delta: i32) -> Result<()> {
        self.check(StoreOperation::IncrementEventParticipants)?;
        let mut data = self.inner.data.write().await;
        let event = data.events.get_mut(event_id).ok_or_else(|| StudyGroupError::event_not_found(event_id))?;
        event.current_participants += delta;
        event.version += 1;
        drop(data);

        self.publish(StoreChange::Event { event_id: event_id.to_string() });
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<bool> {
        self.check(StoreOperation::DeleteEvent)?;
        let removed = self.inner.data.write().await.events.remove(event_id).is_some();
        if removed {
            self.publish(StoreChange::Event { event_id: event_id.to_string() });
        }
        Ok(removed)
    }

    async fn upsert_user(&self, request: &CreateUserRequest) -> Result<User> {
        self.check(StoreOperation::UpsertUser)?;
        let mut data = self.inner.data.write().await;
        let user = data.users.entry(request.id.clone()).or_insert_with(|| User {
            id: request.id.clone(),
            name: String::new(),
            email: String::new(),
            profile_pic: None,
            joined_events: Vec::new(),
            created_events: Vec::new(),
            hosted_events: Vec::new(),
        });
        user.name = request.name.clone();
        user.email = request.email.clone();
        user.profile_pic = request.profile_pic.clone();
        Ok(user.clone())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        self.check(StoreOperation::FindUser)?;
        Ok(self.inner.data.read().await.users.get(user_id).cloned())
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        self.check(StoreOperation::FindUser)?;
        let data = self.inner.data.read().await;
        Ok(ids.iter().filter_map(|id| data.users.get(id).cloned()).collect())
    }

    async fn add_user_event(&self, user_id: &str, list: UserEventList, event_id: &str) -> Result<()> {
        self.check(StoreOperation::AddUserEvent)?;
        let mut data = self.inner.data.write().await;
        let user = data.users.get_mut(user_id).ok_or_else(|| user_not_found(user_id))?;
        let events = user.events_mut(list);
        if !events.iter().any(|e| e == event_id) {
            events.push(event_id.to_string());
        }
        Ok(())
    }

    async fn remove_user_event(&self, user_id: &str, list: UserEventList, event_id: &str) -> Result<()> {
        self.check(StoreOperation::RemoveUserEvent)?;
        let mut data = self.inner.data.write().await;
        let user = data.users.get_mut(user_id).ok_or_else(|| user_not_found(user_id))?;
        user.events_mut(list).retain(|e| e != event_id);
        Ok(())
    }

    async fn insert_event_request(&self, request: &EventRequest) -> Result<()> {
        self.inner.data.write().await.requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn event_requests(&self, event_id: &str, user_id: Option<&str>) -> Result<Vec<EventRequest>> {
        self.check(StoreOperation::QueryEventRequests)?;
        let data = self.inner.data.read().await;
        let mut requests: Vec<EventRequest> = data
            .requests
            .values()
            .filter(|r| r.event_id == event_id && user_id.map_or(true, |u| r.user_id == u))
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(requests)
    }

    async fn delete_event_request(&self, request_id: &str) -> Result<()> {
        self.check(StoreOperation::DeleteEventRequest)?;
        self.inner.data.write().await.requests.remove(request_id);
        Ok(())
    }

    async fn insert_chat(&self, chat: &Chat) -> Result<()> {
        self.check(StoreOperation::InsertChat)?;
        self.inner.data.write().await.chats.insert(chat.id.clone(), chat.clone());
        self.publish(StoreChange::Chat { chat_id: chat.id.clone() });
        Ok(())
    }

    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        self.check(StoreOperation::FindChat)?;
        Ok(self.inner.data.read().await.chats.get(chat_id).cloned())
    }

    async fn find_chat_by_event(&self, event_id: &str) -> Result<Option<Chat>> {
        self.check(StoreOperation::FindChat)?;
        let data = self.inner.data.read().await;
        Ok(data.chats.values().find(|c| c.event_id == event_id).cloned())
    }

    async fn chats_for_participant(&self, user_id: &str) -> Result<Vec<Chat>> {
        self.check(StoreOperation::FindChat)?;
        let data = self.inner.data.read().await;
        let mut chats: Vec<Chat> = data.chats.values().filter(|c| c.has_participant(user_id)).cloned().collect();
        chats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(chats)
    }

    async fn add_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.check(StoreOperation::AddChatParticipant)?;
        let mut data = self.inner.data.write().await;
        let chat = data.chats.get_mut(chat_id).ok_or_else(|| StudyGroupError::chat_not_found(chat_id))?;
        if !chat.has_participant(user_id) {
            chat.participants.push(user_id.to_string());
        }
        drop(data);

        self.publish(StoreChange::Chat { chat_id: chat_id.to_string() });
        Ok(())
    }

    async fn remove_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.check(StoreOperation::RemoveChatParticipant)?;
        let mut data = self.inner.data.write().await;
        let chat = data.chats.get_mut(chat_id).ok_or_else(|| StudyGroupError::chat_not_found(chat_id))?;
        chat.participants.retain(|p| p != user_id);
        drop(data);

        self.publish(StoreChange::Chat { chat_id: chat_id.to_string() });
        Ok(())
    }

    async fn set_chat_last_message(&self, chat_id: &str, message: &Message, at: DateTime<Utc>) -> Result<()> {
        self.check(StoreOperation::UpdateChat)?;
        let mut data = self.inner.data.write().await;
        let chat = data.chats.get_mut(chat_id).ok_or_else(|| StudyGroupError::chat_not_found(chat_id))?;
        chat.last_message = Some(message.clone());
        chat.timestamp = at;
        drop(data);

        self.publish(StoreChange::Chat { chat_id: chat_id.to_string() });
        Ok(())
    }

    async fn touch_chat(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.check(StoreOperation::UpdateChat)?;
        let mut data = self.inner.data.write().await;
        let chat = data.chats.get_mut(chat_id).ok_or_else(|| StudyGroupError::chat_not_found(chat_id))?;
        chat.timestamp = at;
        drop(data);

        self.publish(StoreChange::Chat { chat_id: chat_id.to_string() });
        Ok(())
    }

    async fn set_read_receipt(&self, chat_id: &str, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.check(StoreOperation::UpdateChat)?;
        let mut data = self.inner.data.write().await;
        let chat = data.chats.get_mut(chat_id).ok_or_else(|| StudyGroupError::chat_not_found(chat_id))?;
        chat.read_receipts.insert(user_id.to_string(), at);
        drop(data);

        self.publish(StoreChange::Chat { chat_id: chat_id.to_string() });
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.check(StoreOperation::InsertMessage)?;
        self.inner
            .data
            .write()
            .await
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message.clone());

        self.publish(StoreChange::Messages { chat_id: message.chat_id.clone() });
        Ok(())
    }

    async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.check(StoreOperation::QueryMessages)?;
        let data = self.inner.data.read().await;
        let mut messages = data.messages.get(chat_id).cloned().unwrap_or_default();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    async fn count_unread(&self, chat_id: &str, user_id: &str, after: DateTime<Utc>) -> Result<u64> {
        self.check(StoreOperation::QueryMessages)?;
        let data = self.inner.data.read().await;
        let count = data
            .messages
            .get(chat_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.timestamp > after && m.sender_id != user_id)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
