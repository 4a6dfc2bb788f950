//! Membership coordination
//!
//! Join and leave run an optimistic transaction over the event document so
//! capacity is never exceeded under concurrent joins. The user's joined list
//! is updated after commit and the chat roster is updated on the background
//! queue; neither can fail the operation.

use std::sync::Arc;
use tracing::{debug, warn};
use crate::config::MembershipConfig;
use crate::database::{run_event_transaction, StoreHandle};
use crate::models::UserEventList;
use crate::services::auth::{require_user, AuthProvider};
use crate::services::background::BackgroundQueue;
use crate::services::chat::ChatRosterSync;
use crate::utils::errors::{StudyGroupError, Result};
use crate::utils::logging::{log_best_effort_failure, log_membership_change};

#[derive(Clone)]
pub struct MembershipCoordinator {
    store: StoreHandle,
    auth: Arc<dyn AuthProvider>,
    chats: ChatRosterSync,
    queue: BackgroundQueue,
    policy: MembershipConfig,
}

impl MembershipCoordinator {
    pub fn new(
        store: StoreHandle,
        auth: Arc<dyn AuthProvider>,
        chats: ChatRosterSync,
        queue: BackgroundQueue,
        policy: MembershipConfig,
    ) -> Self {
        Self { store, auth, chats, queue, policy }
    }

    pub async fn join(&self, event_id: &str, user_id: &str) -> Result<()> {
        require_user(self.auth.as_ref())?;

        // Cheap rejection before entering the transaction
        let snapshot = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| StudyGroupError::event_not_found(event_id))?;
        if snapshot.is_full() {
            return Err(StudyGroupError::EventFull { event_id: event_id.to_string() });
        }

        let committed = run_event_transaction(self.store.as_ref(), event_id, &self.policy, |event| {
            if event.has_participant(user_id) {
                return Err(StudyGroupError::AlreadyJoined {
                    event_id: event_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
            if event.is_full() {
                return Err(StudyGroupError::EventFull { event_id: event_id.to_string() });
            }
            event.add_participant(user_id);
            Ok(())
        })
        .await?;

        log_membership_change(event_id, user_id, "joined", committed.current_participants as u32);
        debug!(event_id = event_id, remaining = committed.remaining_capacity(), "Seats remaining");

        if let Err(e) = self.store.add_user_event(user_id, UserEventList::Joined, event_id).await {
            log_best_effort_failure("joined_events_add", user_id, &e);
        }

        let chats = self.chats.clone();
        let (event_key, user) = (event_id.to_string(), user_id.to_string());
        self.queue.submit("chat_roster_add", event_id, async move {
            chats.add_participant(&event_key, &user).await
        });

        Ok(())
    }

    pub async fn leave(&self, event_id: &str, user_id: &str) -> Result<()> {
        require_user(self.auth.as_ref())?;

        let committed = run_event_transaction(self.store.as_ref(), event_id, &self.policy, |event| {
            if !event.remove_participant(user_id) {
                return Err(StudyGroupError::NotAParticipant {
                    event_id: event_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
            Ok(())
        })
        .await?;

        log_membership_change(event_id, user_id, "left", committed.current_participants as u32);

        if let Err(e) = self.store.remove_user_event(user_id, UserEventList::Joined, event_id).await {
            log_best_effort_failure("joined_events_remove", user_id, &e);
        }

        self.enqueue_roster_removal(event_id, user_id);
        Ok(())
    }

    /// Host removes a participant. Steps after the first are independent
    /// writes whose failures are logged and suppressed.
    pub async fn remove_participant(&self, event_id: &str, user_id: &str, host_id: &str) -> Result<()> {
        let current = require_user(self.auth.as_ref())?;
        if current.id != host_id {
            warn!(event_id = event_id, user_id = %current.id, "Participant removal by non-host");
            return Err(StudyGroupError::PermissionDenied("Only the host can remove participants".to_string()));
        }

        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| StudyGroupError::event_not_found(event_id))?;
        if event.host_id != host_id {
            warn!(event_id = event_id, user_id = host_id, "Participant removal by non-host");
            return Err(StudyGroupError::PermissionDenied("Only the host can remove participants".to_string()));
        }

        self.store.remove_event_participant(event_id, user_id).await?;

        if let Err(e) = self.decrement_if_above_roster(event_id).await {
            log_best_effort_failure("participant_count_decrement", event_id, &e);
        }

        if let Err(e) = self.store.remove_user_event(user_id, UserEventList::Joined, event_id).await {
            log_best_effort_failure("joined_events_remove", user_id, &e);
        }

        match self.store.event_requests(event_id, Some(user_id)).await {
            Ok(requests) => {
                for request in &requests {
                    if let Err(e) = self.store.delete_event_request(&request.id).await {
                        log_best_effort_failure("event_request_delete", &request.id, &e);
                    }
                }
            }
            Err(e) => log_best_effort_failure("event_request_query", event_id, &e),
        }

        self.enqueue_roster_removal(event_id, user_id);
        debug!(event_id = event_id, user_id = user_id, host_id = host_id, "Participant removed by host");
        Ok(())
    }

    /// Decrement only while the counter exceeds the participant set
    async fn decrement_if_above_roster(&self, event_id: &str) -> Result<()> {
        let Some(event) = self.store.find_event(event_id).await? else {
            return Ok(());
        };
        if event.current_participants as usize > event.participants.len() {
            self.store.increment_event_participants(event_id, -1).await?;
            debug!(event_id = event_id, participants = event.current_participants - 1, "Participant count decremented");
        }
        Ok(())
    }

    fn enqueue_roster_removal(&self, event_id: &str, user_id: &str) {
        let chats = self.chats.clone();
        let (event_key, user) = (event_id.to_string(), user_id.to_string());
        self.queue.submit("chat_roster_remove", event_id, async move {
            chats.remove_participant(&event_key, &user).await
        });
    }
}
