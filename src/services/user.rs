//! User service implementation
//!
//! Profile creation on first sign-in and profile lookup.

use std::sync::Arc;
use tracing::{debug, info};
use crate::database::StoreHandle;
use crate::models::{CreateUserRequest, User};
use crate::services::auth::{require_user, AuthProvider};
use crate::utils::errors::{StudyGroupError, Result};
use crate::utils::helpers::{normalize_whitespace, validate_optional_url};
use crate::utils::logging::log_degraded_read;

/// User service for managing user operations
#[derive(Clone)]
pub struct UserService {
    store: StoreHandle,
    auth: Arc<dyn AuthProvider>,
}

impl UserService {
    pub fn new(store: StoreHandle, auth: Arc<dyn AuthProvider>) -> Self {
        Self { store, auth }
    }

    /// Create the profile, or refresh name/email/picture of an existing one
    /// while keeping its event lists
    pub async fn create_user_profile(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
        profile_pic: Option<&str>,
    ) -> Result<User> {
        if user_id.trim().is_empty() {
            return Err(StudyGroupError::InvalidArgument("User id is required".to_string()));
        }
        validate_optional_url("profilePic", profile_pic)?;

        let request = CreateUserRequest {
            id: user_id.to_string(),
            name: normalize_whitespace(name),
            email: email.trim().to_string(),
            profile_pic: profile_pic.map(str::to_string),
        };

        let user = self.store.upsert_user(&request).await?;
        info!(user_id = user_id, "User profile saved");
        Ok(user)
    }

    /// Absent when missing or on read failure
    pub async fn get_user_profile(&self, user_id: &str) -> Option<User> {
        debug!(user_id = user_id, "Getting user profile");
        self.store.find_user(user_id).await.unwrap_or_else(|e| {
            log_degraded_read("get_user_profile", user_id, &e);
            None
        })
    }

    pub fn current_user_id(&self) -> Result<String> {
        require_user(self.auth.as_ref()).map(|user| user.id)
    }
}
