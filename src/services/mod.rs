//! Services module
//!
//! This module contains business logic services

pub mod auth;
pub mod background;
pub mod chat;
pub mod event;
pub mod geo;
pub mod membership;
pub mod user;

// Re-export commonly used services
pub use auth::{AuthProvider, AuthUser, IdentityClaims, SessionAuth, TokenAuth};
pub use background::{BackgroundQueue, QueueStats};
pub use chat::{ChatListStream, ChatRosterSync, MessageStream};
pub use event::EventStore;
pub use geo::GeoFilter;
pub use membership::MembershipCoordinator;
pub use user::UserService;

use std::sync::Arc;
use crate::config::Settings;
use crate::database::StoreHandle;

/// Service factory for creating and managing all services
#[derive(Clone)]
pub struct ServiceFactory {
    pub user_service: UserService,
    pub event_service: EventStore,
    pub membership_service: MembershipCoordinator,
    pub chat_service: ChatRosterSync,
    pub background_queue: BackgroundQueue,
    store: StoreHandle,
}

impl ServiceFactory {
    /// Wire every service onto one store handle and identity provider.
    /// Spawns the background worker, so it must run inside a Tokio runtime.
    pub fn new(settings: &Settings, store: StoreHandle, auth: Arc<dyn AuthProvider>) -> Self {
        let background_queue = BackgroundQueue::new(settings.background.queue_capacity);
        let chat_service = ChatRosterSync::new(store.clone(), auth.clone(), &settings.chat);
        let event_service = EventStore::new(
            store.clone(),
            auth.clone(),
            chat_service.clone(),
            settings.discovery.clone(),
        );
        let membership_service = MembershipCoordinator::new(
            store.clone(),
            auth.clone(),
            chat_service.clone(),
            background_queue.clone(),
            settings.membership.clone(),
        );
        let user_service = UserService::new(store.clone(), auth);

        Self {
            user_service,
            event_service,
            membership_service,
            chat_service,
            background_queue,
            store,
        }
    }

    /// Health check for all services
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let store_healthy = match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Store health check failed");
                false
            }
        };

        ServiceHealthStatus {
            store_healthy,
            background_completed: self.background_queue.stats().completed(),
            background_failed: self.background_queue.stats().failed(),
            background_dropped: self.background_queue.stats().dropped(),
        }
    }

    /// Let queued best-effort work finish and stop the worker
    pub async fn shutdown(&self) {
        self.background_queue.shutdown().await;
    }
}

/// Health status for all services
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub store_healthy: bool,
    pub background_completed: u64,
    pub background_failed: u64,
    pub background_dropped: u64,
}

impl ServiceHealthStatus {
    /// Check if all critical services are healthy
    pub fn is_healthy(&self) -> bool {
        self.store_healthy
    }

    /// Get list of issues worth reporting
    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.store_healthy {
            issues.push("Document store unreachable".to_string());
        }
        if self.background_failed > 0 {
            issues.push(format!("{} background tasks failed", self.background_failed));
        }
        if self.background_dropped > 0 {
            issues.push(format!("{} background tasks dropped", self.background_dropped));
        }

        issues
    }
}
