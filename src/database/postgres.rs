//! PostgreSQL document store
//!
//! Set-valued fields are `TEXT[]` columns updated with array_append /
//! array_remove so the field-level updates stay atomic per row. Change
//! notifications travel over LISTEN/NOTIFY so every service instance
//! connected to the same database sees them.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgListener, PgPool};
use sqlx::types::Json;
use sqlx::FromRow;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use crate::models::{Chat, CreateUserRequest, Event, EventRequest, GeoPoint, Message, User, UserEventList};
use crate::utils::errors::{StudyGroupError, Result};
use crate::utils::logging::log_database_operation;
use super::store::{DocumentStore, StoreChange, CHANGE_FEED_CAPACITY};

/// NOTIFY channel carrying store changes
pub const CHANGE_CHANNEL: &str = "studygroup_changes";

const EVENT_COLUMNS: &str = "id, title, description, date, latitude, longitude, location_name, host_id, host_name, host_profile_pic, created_at, max_participants, current_participants, tags, participants, pending_participants, version";
const USER_COLUMNS: &str = "id, name, email, profile_pic, joined_events, created_events, hosted_events";
const CHAT_COLUMNS: &str = "id, event_id, participants, admin_id, last_message, timestamp, read_receipts";
const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, text, timestamp, image_url, status";

#[derive(Debug, FromRow)]
struct EventRow {
    id: String,
    title: String,
    description: String,
    date: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    location_name: String,
    host_id: String,
    host_name: String,
    host_profile_pic: Option<String>,
    created_at: DateTime<Utc>,
    max_participants: i32,
    current_participants: i32,
    tags: Vec<String>,
    participants: Vec<String>,
    pending_participants: Vec<String>,
    version: i64,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            description: row.description,
            date: row.date,
            location: GeoPoint::new(row.latitude, row.longitude),
            location_name: row.location_name,
            host_id: row.host_id,
            host_name: row.host_name,
            host_profile_pic: row.host_profile_pic,
            created_at: row.created_at,
            max_participants: row.max_participants,
            current_participants: row.current_participants,
            tags: row.tags,
            participants: row.participants,
            pending_participants: row.pending_participants,
            version: row.version,
        }
    }
}

#[derive(Debug, FromRow)]
struct ChatRow {
    id: String,
    event_id: String,
    participants: Vec<String>,
    admin_id: String,
    last_message: Option<Json<Message>>,
    timestamp: DateTime<Utc>,
    read_receipts: Json<HashMap<String, DateTime<Utc>>>,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Chat {
            id: row.id,
            event_id: row.event_id,
            participants: row.participants,
            admin_id: row.admin_id,
            last_message: row.last_message.map(|m| m.0),
            timestamp: row.timestamp,
            read_receipts: row.read_receipts.0,
        }
    }
}

/// Encode a change as a NOTIFY payload
pub fn encode_change(change: &StoreChange) -> String {
    match change {
        StoreChange::Event { event_id } => format!("event:{}", event_id),
        StoreChange::Chat { chat_id } => format!("chat:{}", chat_id),
        StoreChange::Messages { chat_id } => format!("messages:{}", chat_id),
    }
}

/// Decode a NOTIFY payload, `None` for anything unrecognised
pub fn decode_change(payload: &str) -> Option<StoreChange> {
    let (kind, id) = payload.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    let id = id.to_string();
    match kind {
        "event" => Some(StoreChange::Event { event_id: id }),
        "chat" => Some(StoreChange::Chat { chat_id: id }),
        "messages" => Some(StoreChange::Messages { chat_id: id }),
        _ => None,
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    changes: broadcast::Sender<StoreChange>,
}

impl PgStore {
    /// Wrap a pool and start relaying NOTIFY payloads onto the change feed
    pub async fn connect(pool: PgPool) -> Result<Self> {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let relay = changes.clone();
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match decode_change(notification.payload()) {
                        Some(change) => {
                            let _ = relay.send(change);
                        }
                        None => warn!(payload = notification.payload(), "Ignoring malformed change notification"),
                    },
                    Err(e) => {
                        error!(error = %e, "Change listener failed, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self { pool, changes })
    }

    /// The write already committed; a lost notification only delays subscribers
    async fn notify(&self, change: StoreChange) {
        let payload = encode_change(&change);
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(&payload)
            .execute(&self.pool)
            .await
        {
            warn!(payload = %payload, error = %e, "Failed to publish change notification");
        }
    }

    async fn query_events(&self, sql: &str, bind: Option<String>) -> Result<Vec<Event>> {
        let mut query = sqlx::query_as::<_, EventRow>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert_event(&self, event: &Event) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO events ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            EVENT_COLUMNS
        ))
        .bind(&event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.location.latitude)
        .bind(event.location.longitude)
        .bind(&event.location_name)
        .bind(&event.host_id)
        .bind(&event.host_name)
        .bind(&event.host_profile_pic)
        .bind(event.created_at)
        .bind(event.max_participants)
        .bind(event.current_participants)
        .bind(&event.tags)
        .bind(&event.participants)
        .bind(&event.pending_participants)
        .bind(event.version)
        .execute(&self.pool)
        .await?;

        self.notify(StoreChange::Event { event_id: event.id.clone() }).await;
        Ok(())
    }

    async fn find_event(&self, event_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Event::from))
    }

    async fn events_from(&self, after: DateTime<Utc>) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE date >= $1 ORDER BY date ASC, id ASC",
            EVENT_COLUMNS
        ))
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn events_by_host(&self, host_id: &str) -> Result<Vec<Event>> {
        self.query_events(
            &format!("SELECT {} FROM events WHERE host_id = $1 ORDER BY date ASC, id ASC", EVENT_COLUMNS),
            Some(host_id.to_string()),
        )
        .await
    }

    async fn events_by_ids(&self, ids: &[String]) -> Result<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE id = ANY($1) ORDER BY date ASC, id ASC",
            EVENT_COLUMNS
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn replace_event_if_version(&self, event: &Event, expected_version: i64) -> Result<bool> {
        let started = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE events
            SET title = $2,
                description = $3,
                date = $4,
                latitude = $5,
                longitude = $6,
                location_name = $7,
                max_participants = $8,
                current_participants = $9,
                tags = $10,
                participants = $11,
                pending_participants = $12,
                version = version + 1
            WHERE id = $1 AND version = $13
            "#
        )
        .bind(&event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.location.latitude)
        .bind(event.location.longitude)
        .bind(&event.location_name)
        .bind(event.max_participants)
        .bind(event.current_participants)
        .bind(&event.tags)
        .bind(&event.participants)
        .bind(&event.pending_participants)
        .bind(expected_version)
        .execute(&self.pool)
        .await;

        log_database_operation("compare_and_swap", "events", started.elapsed().as_millis() as u64, result.is_ok());
        let swapped = result?.rows_affected() == 1;

        if swapped {
            self.notify(StoreChange::Event { event_id: event.id.clone() }).await;
        } else {
            debug!(event_id = %event.id, expected_version = expected_version, "Version conflict");
        }
        Ok(swapped)
    }

    async fn remove_event_participant(&self, event_id: &str, user_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE events SET participants = array_remove(participants, $2), version = version + 1 WHERE id = $1"
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::event_not_found(event_id));
        }
        self.notify(StoreChange::Event { event_id: event_id.to_string() }).await;
        Ok(())
    }

    async fn increment_event_participants(&self, event_id: &str, delta: i32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE events SET current_participants = current_participants + $2, version = version + 1 WHERE id = $1"
        )
        .bind(event_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::event_not_found(event_id));
        }
        self.notify(StoreChange::Event { event_id: event_id.to_string() }).await;
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(StoreChange::Event { event_id: event_id.to_string() }).await;
        }
        Ok(deleted)
    }

    async fn upsert_user(&self, request: &CreateUserRequest) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, profile_pic)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                email = EXCLUDED.email,
                profile_pic = EXCLUDED.profile_pic
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&request.id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.profile_pic)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ANY($1)", USER_COLUMNS))
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn add_user_event(&self, user_id: &str, list: UserEventList, event_id: &str) -> Result<()> {
        let column = list.column();
        let result = sqlx::query(&format!(
            "UPDATE users SET {col} = CASE WHEN $2 = ANY({col}) THEN {col} ELSE array_append({col}, $2) END WHERE id = $1",
            col = column
        ))
        .bind(user_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::NotFound { entity: "User", id: user_id.to_string() });
        }
        Ok(())
    }

    async fn remove_user_event(&self, user_id: &str, list: UserEventList, event_id: &str) -> Result<()> {
        let column = list.column();
        let result = sqlx::query(&format!(
            "UPDATE users SET {col} = array_remove({col}, $2) WHERE id = $1",
            col = column
        ))
        .bind(user_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::NotFound { entity: "User", id: user_id.to_string() });
        }
        Ok(())
    }

    async fn insert_event_request(&self, request: &EventRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO event_requests (id, event_id, user_id, status, timestamp) VALUES ($1, $2, $3, $4, $5)"
        )
        .bind(&request.id)
        .bind(&request.event_id)
        .bind(&request.user_id)
        .bind(&request.status)
        .bind(request.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn event_requests(&self, event_id: &str, user_id: Option<&str>) -> Result<Vec<EventRequest>> {
        let requests = sqlx::query_as::<_, EventRequest>(
            r#"
            SELECT id, event_id, user_id, status, timestamp
            FROM event_requests
            WHERE event_id = $1 AND ($2::text IS NULL OR user_id = $2)
            ORDER BY timestamp ASC
            "#
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn delete_event_request(&self, request_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM event_requests WHERE id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_chat(&self, chat: &Chat) -> Result<()> {
        sqlx::query(&format!("INSERT INTO chats ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)", CHAT_COLUMNS))
            .bind(&chat.id)
            .bind(&chat.event_id)
            .bind(&chat.participants)
            .bind(&chat.admin_id)
            .bind(chat.last_message.as_ref().map(Json))
            .bind(chat.timestamp)
            .bind(Json(&chat.read_receipts))
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Chat { chat_id: chat.id.clone() }).await;
        Ok(())
    }

    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(&format!("SELECT {} FROM chats WHERE id = $1", CHAT_COLUMNS))
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Chat::from))
    }

    async fn find_chat_by_event(&self, event_id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(&format!(
            "SELECT {} FROM chats WHERE event_id = $1 ORDER BY timestamp ASC LIMIT 1",
            CHAT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Chat::from))
    }

    async fn chats_for_participant(&self, user_id: &str) -> Result<Vec<Chat>> {
        let rows = sqlx::query_as::<_, ChatRow>(&format!(
            "SELECT {} FROM chats WHERE $1 = ANY(participants) ORDER BY timestamp DESC, id ASC",
            CHAT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Chat::from).collect())
    }

    async fn add_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE chats
            SET participants = CASE WHEN $2 = ANY(participants) THEN participants ELSE array_append(participants, $2) END
            WHERE id = $1
            "#
        )
        .bind(chat_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::chat_not_found(chat_id));
        }
        self.notify(StoreChange::Chat { chat_id: chat_id.to_string() }).await;
        Ok(())
    }

    async fn remove_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE chats SET participants = array_remove(participants, $2) WHERE id = $1")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::chat_not_found(chat_id));
        }
        self.notify(StoreChange::Chat { chat_id: chat_id.to_string() }).await;
        Ok(())
    }

    async fn set_chat_last_message(&self, chat_id: &str, message: &Message, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE chats SET last_message = $2, timestamp = $3 WHERE id = $1")
            .bind(chat_id)
            .bind(Json(message))
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::chat_not_found(chat_id));
        }
        self.notify(StoreChange::Chat { chat_id: chat_id.to_string() }).await;
        Ok(())
    }

    async fn touch_chat(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE chats SET timestamp = $2 WHERE id = $1")
            .bind(chat_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::chat_not_found(chat_id));
        }
        self.notify(StoreChange::Chat { chat_id: chat_id.to_string() }).await;
        Ok(())
    }

    async fn set_read_receipt(&self, chat_id: &str, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE chats SET read_receipts = read_receipts || jsonb_build_object($2::text, $3::jsonb) WHERE id = $1"
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(Json(at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyGroupError::chat_not_found(chat_id));
        }
        self.notify(StoreChange::Chat { chat_id: chat_id.to_string() }).await;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        sqlx::query(&format!("INSERT INTO messages ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)", MESSAGE_COLUMNS))
            .bind(&message.id)
            .bind(&message.chat_id)
            .bind(&message.sender_id)
            .bind(&message.text)
            .bind(message.timestamp)
            .bind(&message.image_url)
            .bind(&message.status)
            .execute(&self.pool)
            .await?;

        self.notify(StoreChange::Messages { chat_id: message.chat_id.clone() }).await;
        Ok(())
    }

    async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {} FROM messages WHERE chat_id = $1 ORDER BY timestamp ASC, id ASC",
            MESSAGE_COLUMNS
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn count_unread(&self, chat_id: &str, user_id: &str, after: DateTime<Utc>) -> Result<u64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE chat_id = $1 AND timestamp > $2 AND sender_id <> $3"
        )
        .bind(chat_id)
        .bind(after)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0.max(0) as u64)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
