//! Event service implementation
//!
//! Creation, lookup, discovery and deletion of study-group events. The event
//! document is authoritative; the user event lists and the chat are derived
//! copies updated after it, with their failures logged and suppressed.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use crate::config::DiscoveryConfig;
use crate::database::StoreHandle;
use crate::models::{CreateEventRequest, Event, GeoPoint, Participant, UserEventList};
use crate::services::auth::{require_user, AuthProvider};
use crate::services::chat::ChatRosterSync;
use crate::services::geo::GeoFilter;
use crate::utils::errors::{StudyGroupError, Result};
use crate::utils::helpers::{chunk_ids, generate_id, normalize_tags, normalize_whitespace, validate_optional_url};
use crate::utils::logging::{log_best_effort_failure, log_degraded_read, log_event_action};

#[derive(Clone)]
pub struct EventStore {
    store: StoreHandle,
    auth: Arc<dyn AuthProvider>,
    chats: ChatRosterSync,
    config: DiscoveryConfig,
}

impl EventStore {
    pub fn new(
        store: StoreHandle,
        auth: Arc<dyn AuthProvider>,
        chats: ChatRosterSync,
        config: DiscoveryConfig,
    ) -> Self {
        Self { store, auth, chats, config }
    }

    /// Create an event hosted by the current user and return its id
    pub async fn create_event(&self, request: CreateEventRequest) -> Result<String> {
        let host = require_user(self.auth.as_ref())?;
        request.validate()?;
        let host_profile_pic = match validate_optional_url("hostProfilePic", host.photo_url.as_deref()) {
            Ok(()) => host.photo_url,
            Err(e) => {
                warn!(user_id = %host.id, error = %e, "Ignoring unusable host photo url");
                None
            }
        };

        let event = Event {
            id: generate_id(),
            title: normalize_whitespace(&request.title),
            description: request.description,
            date: request.date,
            location: request.location,
            location_name: request.location_name,
            host_id: host.id.clone(),
            host_name: host.display_name.unwrap_or_default(),
            host_profile_pic,
            created_at: Utc::now(),
            max_participants: request.max_participants,
            current_participants: 0,
            tags: normalize_tags(&request.tags),
            participants: Vec::new(),
            pending_participants: Vec::new(),
            version: 0,
        };

        self.store.insert_event(&event).await?;
        log_event_action(&event.id, "created", &host.id, Some(&event.title));

        if let Err(e) = self.store.add_user_event(&host.id, UserEventList::Hosted, &event.id).await {
            log_best_effort_failure("hosted_events_add", &host.id, &e);
        }

        match self.chats.create_chat(&event.id, &host.id).await {
            Ok(chat_id) => debug!(event_id = %event.id, chat_id = %chat_id, "Event chat ready"),
            Err(e) => log_best_effort_failure("create_chat", &event.id, &e),
        }

        Ok(event.id)
    }

    /// Absent on not-found and on read failure; the latter is logged
    pub async fn get_event(&self, event_id: &str) -> Option<Event> {
        self.store.find_event(event_id).await.unwrap_or_else(|e| {
            log_degraded_read("get_event", event_id, &e);
            None
        })
    }

    pub async fn query_upcoming(&self, after: DateTime<Utc>) -> Result<Vec<Event>> {
        self.store.events_from(after).await
    }

    pub async fn query_by_host(&self, host_id: &str) -> Result<Vec<Event>> {
        self.store.events_by_host(host_id).await
    }

    /// Resolve any number of ids, one store query per chunk
    pub async fn query_by_ids(&self, ids: &[String]) -> Result<Vec<Event>> {
        let mut events = Vec::with_capacity(ids.len());
        for chunk in chunk_ids(ids, self.config.in_clause_limit) {
            events.extend(self.store.events_by_ids(&chunk).await?);
        }
        events.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(events)
    }

    /// Delete an event and clean up what points at it.
    ///
    /// Only the host may delete, and only as themselves. The chat is kept.
    pub async fn delete_event(&self, event_id: &str, requesting_user_id: &str) -> Result<()> {
        let current = require_user(self.auth.as_ref())?;
        if current.id != requesting_user_id {
            warn!(event_id = event_id, user_id = %current.id, "Delete requested on behalf of another user");
            return Err(StudyGroupError::PermissionDenied(
                "Cannot delete events on behalf of another user".to_string(),
            ));
        }

        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| StudyGroupError::event_not_found(event_id))?;

        if event.host_id != requesting_user_id {
            warn!(event_id = event_id, user_id = requesting_user_id, "Non-host attempted to delete event");
            return Err(StudyGroupError::PermissionDenied("Only the host can delete this event".to_string()));
        }

        if !self.store.delete_event(event_id).await? {
            return Err(StudyGroupError::event_not_found(event_id));
        }
        log_event_action(event_id, "deleted", requesting_user_id, None);

        match self.store.event_requests(event_id, None).await {
            Ok(requests) => {
                for request in requests {
                    if let Err(e) = self.store.delete_event_request(&request.id).await {
                        log_best_effort_failure("event_request_delete", &request.id, &e);
                    }
                }
            }
            Err(e) => log_best_effort_failure("event_request_query", event_id, &e),
        }

        for list in [UserEventList::Hosted, UserEventList::Created] {
            if let Err(e) = self.store.remove_user_event(&event.host_id, list, event_id).await {
                log_best_effort_failure(list.column(), &event.host_id, &e);
            }
        }

        for participant in &event.participants {
            if let Err(e) = self.store.remove_user_event(participant, UserEventList::Joined, event_id).await {
                log_best_effort_failure("joined_events_remove", participant, &e);
            }
        }

        info!(
            event_id = event_id,
            participants = event.participants.len(),
            "Event deleted and references cleaned up"
        );
        Ok(())
    }

    pub async fn hosted_events(&self, user_id: &str) -> Vec<Event> {
        self.query_by_host(user_id).await.unwrap_or_else(|e| {
            log_degraded_read("hosted_events", user_id, &e);
            Vec::new()
        })
    }

    /// Events the user has joined, resolved from their profile
    pub async fn joined_events(&self, user_id: &str) -> Vec<Event> {
        let result: Result<Vec<Event>> = async {
            let Some(user) = self.store.find_user(user_id).await? else {
                return Ok(Vec::new());
            };
            if user.joined_events.is_empty() {
                return Ok(Vec::new());
            }
            self.query_by_ids(&user.joined_events).await
        }
        .await;

        result.unwrap_or_else(|e| {
            log_degraded_read("joined_events", user_id, &e);
            Vec::new()
        })
    }

    /// Participants resolved to their profiles. `joined_at` is the time of
    /// resolution since no join time is recorded.
    pub async fn event_participants(&self, event_id: &str) -> Vec<Participant> {
        let result: Result<Vec<Participant>> = async {
            let Some(event) = self.store.find_event(event_id).await? else {
                return Ok(Vec::new());
            };
            if event.participants.is_empty() {
                return Ok(Vec::new());
            }

            let now = Utc::now();
            let mut participants = Vec::with_capacity(event.participants.len());
            for chunk in chunk_ids(&event.participants, self.config.in_clause_limit) {
                for user in self.store.users_by_ids(&chunk).await? {
                    participants.push(Participant {
                        user_id: user.id,
                        name: user.name,
                        profile_pic: user.profile_pic,
                        joined_at: now,
                    });
                }
            }
            Ok(participants)
        }
        .await;

        result.unwrap_or_else(|e| {
            log_degraded_read("event_participants", event_id, &e);
            Vec::new()
        })
    }

    /// Upcoming events near `center` that the current user neither hosts
    /// nor has joined
    pub async fn discover_nearby(&self, center: GeoPoint, radius_km: Option<f64>) -> Result<Vec<Event>> {
        let user = require_user(self.auth.as_ref())?;
        center.validate()?;

        let radius_km = radius_km.unwrap_or(self.config.default_radius_km);
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(StudyGroupError::InvalidArgument(format!("Invalid radius: {}", radius_km)));
        }

        let upcoming = match self.store.events_from(Utc::now()).await {
            Ok(events) => events,
            Err(e) => {
                log_degraded_read("discover_nearby", &user.id, &e);
                return Ok(Vec::new());
            }
        };

        let candidates = upcoming.into_iter().filter(|event| event.host_id != user.id);
        let nearby = GeoFilter::nearby_events(&center, radius_km, candidates, &user.id);

        debug!(
            user_id = %user.id,
            radius_km = radius_km,
            found = nearby.len(),
            "Nearby events discovered"
        );
        Ok(nearby)
    }
}
