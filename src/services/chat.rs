//! Chat roster sync and messaging
//!
//! Each event owns exactly one chat, looked up by event id. The chat roster
//! is a derived copy of the event's participants, so roster updates are
//! best-effort: a missing chat is a logged no-op. Reads collapse failures to
//! empty results and report them on the degraded-read log target.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use chrono::Utc;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use crate::config::ChatConfig;
use crate::database::{StoreChange, StoreHandle};
use crate::models::{Chat, ChatParticipant, ChatWithEventDetails, Message, MessageStatus};
use crate::services::auth::{require_user, AuthProvider};
use crate::utils::errors::{StudyGroupError, Result};
use crate::utils::helpers::{generate_id, validate_optional_url};
use crate::utils::logging::{log_best_effort_failure, log_degraded_read};

/// Full-state deliveries of a chat's messages
pub type MessageStream = Pin<Box<dyn Stream<Item = Vec<Message>> + Send>>;

/// Full-state deliveries of the current user's chats
pub type ChatListStream = Pin<Box<dyn Stream<Item = Vec<Chat>> + Send>>;

/// Per-user count of live subscriptions
struct SubscriptionRegistry {
    limit: usize,
    active: Mutex<HashMap<String, usize>>,
}

impl SubscriptionRegistry {
    fn new(limit: usize) -> Self {
        Self { limit, active: Mutex::new(HashMap::new()) }
    }

    fn acquire(self: &Arc<Self>, user_id: &str) -> Result<SubscriptionSlot> {
        let mut active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = active.entry(user_id.to_string()).or_insert(0);
        if *count >= self.limit {
            warn!(user_id = user_id, limit = self.limit, "Subscription limit reached");
            return Err(StudyGroupError::SubscriptionLimit { user_id: user_id.to_string(), limit: self.limit });
        }
        *count += 1;

        Ok(SubscriptionSlot { registry: self.clone(), user_id: user_id.to_string() })
    }

    fn active_for(&self, user_id: &str) -> usize {
        let active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        active.get(user_id).copied().unwrap_or(0)
    }
}

/// Released when the owning stream is dropped
struct SubscriptionSlot {
    registry: Arc<SubscriptionRegistry>,
    user_id: String,
}

impl Drop for SubscriptionSlot {
    fn drop(&mut self) {
        let mut active = self.registry.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(count) = active.get_mut(&self.user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&self.user_id);
            }
        }
        debug!(user_id = %self.user_id, "Subscription released");
    }
}

#[derive(Clone)]
pub struct ChatRosterSync {
    store: StoreHandle,
    auth: Arc<dyn AuthProvider>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl ChatRosterSync {
    pub fn new(store: StoreHandle, auth: Arc<dyn AuthProvider>, config: &ChatConfig) -> Self {
        Self {
            store,
            auth,
            subscriptions: Arc::new(SubscriptionRegistry::new(config.max_subscriptions_per_client)),
        }
    }

    /// Create the chat bound to a new event, with the host as its only member
    pub async fn create_chat(&self, event_id: &str, host_id: &str) -> Result<String> {
        let chat = Chat {
            id: generate_id(),
            event_id: event_id.to_string(),
            participants: vec![host_id.to_string()],
            admin_id: host_id.to_string(),
            last_message: None,
            timestamp: Utc::now(),
            read_receipts: HashMap::new(),
        };

        self.store.insert_chat(&chat).await?;
        info!(chat_id = %chat.id, event_id = event_id, "Chat created for event");
        Ok(chat.id)
    }

    /// Add a user to the event's chat. A missing chat is logged and ignored.
    pub async fn add_participant(&self, event_id: &str, user_id: &str) -> Result<()> {
        match self.store.find_chat_by_event(event_id).await? {
            Some(chat) => {
                self.store.add_chat_participant(&chat.id, user_id).await?;
                debug!(chat_id = %chat.id, user_id = user_id, "User added to chat");
            }
            None => warn!(event_id = event_id, "No chat found for event"),
        }
        Ok(())
    }

    /// Remove a user from the event's chat. A missing chat is logged and ignored.
    pub async fn remove_participant(&self, event_id: &str, user_id: &str) -> Result<()> {
        match self.store.find_chat_by_event(event_id).await? {
            Some(chat) => {
                self.store.remove_chat_participant(&chat.id, user_id).await?;
                debug!(chat_id = %chat.id, user_id = user_id, "User removed from chat");
            }
            None => warn!(event_id = event_id, "No chat found for event"),
        }
        Ok(())
    }

    /// Append a message from the current user and update the chat preview.
    /// The preview update is not atomic with the append; its failure is
    /// logged and the message id is still returned.
    pub async fn send_message(&self, chat_id: &str, text: &str, image_url: Option<&str>) -> Result<String> {
        let sender = require_user(self.auth.as_ref())?;

        if text.trim().is_empty() && image_url.is_none() {
            return Err(StudyGroupError::InvalidArgument("Message needs text or an image".to_string()));
        }
        validate_optional_url("imageUrl", image_url)?;

        let now = Utc::now();
        let message = Message {
            id: generate_id(),
            chat_id: chat_id.to_string(),
            sender_id: sender.id,
            text: text.to_string(),
            timestamp: now,
            image_url: image_url.map(str::to_string),
            status: MessageStatus::Sent.to_string(),
        };

        self.store.insert_message(&message).await?;

        if let Err(e) = self.store.set_chat_last_message(chat_id, &message, now).await {
            log_best_effort_failure("chat_last_message", chat_id, &e);
        }

        debug!(chat_id = chat_id, message_id = %message.id, "Message sent");
        Ok(message.id)
    }

    /// Record that the current user has read the chat up to now
    pub async fn mark_read(&self, chat_id: &str) -> Result<()> {
        let user = require_user(self.auth.as_ref())?;
        if let Err(e) = self.store.set_read_receipt(chat_id, &user.id, Utc::now()).await {
            log_best_effort_failure("mark_read", chat_id, &e);
        }
        Ok(())
    }

    /// Messages newer than the user's read receipt and not sent by them
    pub async fn unread_count(&self, chat_id: &str, user_id: &str) -> u64 {
        let result: Result<u64> = async {
            let chat = match self.store.find_chat(chat_id).await? {
                Some(chat) => chat,
                None => return Ok(0),
            };
            self.store.count_unread(chat_id, user_id, chat.last_read(user_id)).await
        }
        .await;

        result.unwrap_or_else(|e| {
            log_degraded_read("unread_count", chat_id, &e);
            0
        })
    }

    pub async fn update_chat_timestamp(&self, chat_id: &str) {
        if let Err(e) = self.store.touch_chat(chat_id, Utc::now()).await {
            log_best_effort_failure("chat_timestamp", chat_id, &e);
        }
    }

    pub async fn get_chat_by_event_id(&self, event_id: &str) -> Option<Chat> {
        self.store.find_chat_by_event(event_id).await.unwrap_or_else(|e| {
            log_degraded_read("get_chat_by_event_id", event_id, &e);
            None
        })
    }

    /// Chats the current user belongs to, newest activity first
    pub async fn get_user_chats(&self) -> Result<Vec<Chat>> {
        let user = require_user(self.auth.as_ref())?;
        Ok(self.store.chats_for_participant(&user.id).await.unwrap_or_else(|e| {
            log_degraded_read("get_user_chats", &user.id, &e);
            Vec::new()
        }))
    }

    pub async fn get_messages(&self, chat_id: &str) -> Vec<Message> {
        load_messages(&self.store, chat_id).await
    }

    pub async fn get_chat_with_event_details(&self, chat_id: &str) -> Option<ChatWithEventDetails> {
        let result: Result<Option<ChatWithEventDetails>> = async {
            let Some(chat) = self.store.find_chat(chat_id).await? else {
                return Ok(None);
            };
            let Some(event) = self.store.find_event(&chat.event_id).await? else {
                return Ok(None);
            };
            Ok(Some(ChatWithEventDetails { chat, event }))
        }
        .await;

        result.unwrap_or_else(|e| {
            log_degraded_read("get_chat_with_event_details", chat_id, &e);
            None
        })
    }

    /// Chat members resolved to their profiles
    pub async fn get_chat_participants(&self, chat_id: &str) -> Vec<ChatParticipant> {
        let result: Result<Vec<ChatParticipant>> = async {
            let Some(chat) = self.store.find_chat(chat_id).await? else {
                return Ok(Vec::new());
            };
            if chat.participants.is_empty() {
                return Ok(Vec::new());
            }
            let users = self.store.users_by_ids(&chat.participants).await?;
            Ok(users
                .into_iter()
                .map(|user| ChatParticipant {
                    last_seen: chat.read_receipts.get(&user.id).copied(),
                    user_id: user.id,
                    name: user.name,
                    profile_pic: user.profile_pic,
                })
                .collect())
        }
        .await;

        result.unwrap_or_else(|e| {
            log_degraded_read("get_chat_participants", chat_id, &e);
            Vec::new()
        })
    }

    /// Stream the full message list of a chat, once on subscription and again
    /// on every change. Dropping the stream unsubscribes.
    pub fn subscribe_messages(&self, chat_id: &str) -> Result<MessageStream> {
        let user = require_user(self.auth.as_ref())?;
        let slot = self.subscriptions.acquire(&user.id)?;

        // Subscribe before the first read so no change slips in between
        let mut changes = self.store.subscribe_changes();
        let store = self.store.clone();
        let chat_id = chat_id.to_string();

        let stream = async_stream::stream! {
            let _slot = slot;
            yield load_messages(&store, &chat_id).await;

            loop {
                match changes.recv().await {
                    Ok(StoreChange::Messages { chat_id: changed }) if changed == chat_id => {
                        yield load_messages(&store, &chat_id).await;
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(chat_id = %chat_id, skipped = skipped, "Message subscriber lagged, resyncing");
                        yield load_messages(&store, &chat_id).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Stream the current user's chat list ("my chats"), once on subscription
    /// and again whenever any chat changes.
    pub fn subscribe_chats(&self) -> Result<ChatListStream> {
        let user = require_user(self.auth.as_ref())?;
        let slot = self.subscriptions.acquire(&user.id)?;

        let mut changes = self.store.subscribe_changes();
        let store = self.store.clone();
        let user_id = user.id;

        let stream = async_stream::stream! {
            let _slot = slot;
            yield load_chats(&store, &user_id).await;

            loop {
                match changes.recv().await {
                    Ok(StoreChange::Chat { .. }) | Err(RecvError::Lagged(_)) => {
                        yield load_chats(&store, &user_id).await;
                    }
                    Ok(_) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Live subscriptions held by a user
    pub fn active_subscriptions(&self, user_id: &str) -> usize {
        self.subscriptions.active_for(user_id)
    }
}

async fn load_messages(store: &StoreHandle, chat_id: &str) -> Vec<Message> {
    store.messages_for_chat(chat_id).await.unwrap_or_else(|e| {
        log_degraded_read("messages_for_chat", chat_id, &e);
        Vec::new()
    })
}

async fn load_chats(store: &StoreHandle, user_id: &str) -> Vec<Chat> {
    store.chats_for_participant(user_id).await.unwrap_or_else(|e| {
        log_degraded_read("chats_for_participant", user_id, &e);
        Vec::new()
    })
}
