//! Test context for unified test setup
//!
//! Builds the full service graph over a `MemoryStore` and a `SessionAuth`
//! so tests can inject store faults and switch the signed-in user.

use std::sync::{Arc, Once};
use StudyGroupFinder::config::Settings;
use StudyGroupFinder::database::{DocumentStore, MemoryStore, StoreHandle};
use StudyGroupFinder::models::{Event, User};
use StudyGroupFinder::services::{AuthUser, ServiceFactory, SessionAuth};

use super::test_data::{event_request_at, fake_profile};

static INIT: Once = Once::new();

/// Initialize logging for tests (called once)
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Settings tuned for fast, deterministic tests
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.logging.level = "debug".to_string();
    settings.membership.max_transaction_attempts = 50;
    settings.membership.base_backoff_ms = 0;
    settings.membership.max_backoff_ms = 5;
    settings.chat.max_subscriptions_per_client = 3;
    settings.background.queue_capacity = 1024;
    settings
}

/// Unified test context that manages all test components
pub struct TestContext {
    pub store: MemoryStore,
    pub auth: SessionAuth,
    pub services: ServiceFactory,
    pub settings: Settings,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        init_test_logging();

        let store = MemoryStore::new();
        let auth = SessionAuth::new();
        let handle: StoreHandle = Arc::new(store.clone());
        let services = ServiceFactory::new(&settings, handle, Arc::new(auth.clone()));

        Self { store, auth, services, settings }
    }

    pub fn sign_in(&self, user_id: &str) {
        self.auth.sign_in(AuthUser::new(user_id).with_display_name(format!("Student {}", user_id)));
    }

    /// Create a profile with generated name and email
    pub async fn create_user(&self, user_id: &str) -> User {
        let profile = fake_profile(user_id);
        self.services
            .user_service
            .create_user_profile(&profile.id, &profile.name, &profile.email, None)
            .await
            .expect("Failed to create user profile")
    }

    /// Sign in as `host` and create an event near the given point
    pub async fn create_event_at(&self, host: &str, max_participants: i32, lat: f64, lon: f64) -> String {
        self.sign_in(host);
        self.services
            .event_service
            .create_event(event_request_at("Study session", max_participants, lat, lon))
            .await
            .expect("Failed to create event")
    }

    pub async fn create_event(&self, host: &str, max_participants: i32) -> String {
        self.create_event_at(host, max_participants, 37.7749, -122.4194).await
    }

    /// Join as `user_id`, signing them in first
    pub async fn join_as(&self, event_id: &str, user_id: &str) -> StudyGroupFinder::Result<()> {
        self.sign_in(user_id);
        self.services.membership_service.join(event_id, user_id).await
    }

    /// Read the event straight from the store
    pub async fn event(&self, event_id: &str) -> Event {
        self.store
            .find_event(event_id)
            .await
            .expect("Store read failed")
            .expect("Event missing")
    }

    /// Wait for queued chat roster updates
    pub async fn settle(&self) {
        self.services.background_queue.flush().await;
    }
}
