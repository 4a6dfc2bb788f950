//! Authentication boundary
//!
//! The identity provider is external: the core only asks it who the current
//! user is. `SessionAuth` holds an identity set by the embedding client,
//! `TokenAuth` derives it from a signed identity token.

use std::sync::{Arc, RwLock};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::config::AuthConfig;
use crate::utils::errors::{StudyGroupError, Result};

/// The authenticated identity as issued by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: None, photo_url: None }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    fn current_user_id(&self) -> Option<String> {
        self.current_user().map(|user| user.id)
    }
}

/// Fail with `Unauthenticated` when nobody is signed in
pub fn require_user(auth: &dyn AuthProvider) -> Result<AuthUser> {
    auth.current_user().ok_or(StudyGroupError::Unauthenticated)
}

/// Identity held in memory, set and cleared explicitly
#[derive(Clone, Default)]
pub struct SessionAuth {
    user: Arc<RwLock<Option<AuthUser>>>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: AuthUser) -> Self {
        let session = Self::new();
        session.sign_in(user);
        session
    }

    pub fn sign_in(&self, user: AuthUser) {
        debug!(user_id = %user.id, "Session signed in");
        *self.user.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.user.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

/// Claims carried by identity tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Identity derived from HS256-signed tokens
#[derive(Clone)]
pub struct TokenAuth {
    key: DecodingKey,
    validation: Validation,
    session: SessionAuth,
}

impl TokenAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            session: SessionAuth::new(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| StudyGroupError::Config("auth.jwt_secret is not configured".to_string()))?;
        Ok(Self::new(secret))
    }

    /// Verify a token and make its subject the current user
    pub fn authenticate(&self, token: &str) -> Result<AuthUser> {
        let claims = match decode::<IdentityClaims>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                warn!(error = %e, "Rejected identity token");
                self.session.sign_out();
                return Err(e.into());
            }
        };

        if claims.sub.is_empty() {
            self.session.sign_out();
            return Err(StudyGroupError::Unauthenticated);
        }

        let user = AuthUser {
            id: claims.sub,
            display_name: claims.name,
            photo_url: claims.picture,
        };
        info!(user_id = %user.id, "Identity token accepted");
        self.session.sign_in(user.clone());
        Ok(user)
    }

    pub fn sign_out(&self) {
        self.session.sign_out();
    }
}

impl AuthProvider for TokenAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.session.current_user()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "a-test-secret-of-some-length";

    fn token(sub: &str, secret: &str, exp_offset: i64) -> String {
        let claims = IdentityClaims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            name: Some("Ada".to_string()),
            picture: None,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_session_sign_in_and_out() {
        let session = SessionAuth::new();
        assert!(require_user(&session).is_err());

        session.sign_in(AuthUser::new("u1"));
        assert_eq!(session.current_user_id().as_deref(), Some("u1"));

        session.sign_out();
        assert!(matches!(require_user(&session), Err(StudyGroupError::Unauthenticated)));
    }

    #[test]
    fn test_token_auth_accepts_valid_token() {
        let auth = TokenAuth::new(SECRET);
        let user = auth.authenticate(&token("u1", SECRET, 3600)).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
        assert_eq!(auth.current_user_id().as_deref(), Some("u1"));
    }

    #[test]
    fn test_token_auth_rejects_bad_signature_and_expiry() {
        let auth = TokenAuth::new(SECRET);
        assert!(matches!(
            auth.authenticate(&token("u1", "another-secret-entirely", 3600)),
            Err(StudyGroupError::Token(_))
        ));
        assert!(auth.authenticate(&token("u1", SECRET, -3600)).is_err());
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn test_token_auth_requires_secret() {
        assert!(TokenAuth::from_config(&AuthConfig::default()).is_err());
    }
}
