//! Identity sessions: anonymous and credentialed sign-in, bearer tokens and
//! session-change notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::store::StoreError;

pub mod extract;
pub mod local;

pub use extract::{AdminSession, CurrentSession, MemberSession};
pub use local::LocalIdentity;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Session is invalid or has expired")]
    InvalidToken,

    #[error("Password reset link is invalid or has expired")]
    InvalidResetToken,

    #[error("The email address is already in use")]
    EmailInUse,

    #[error("The email address is not valid")]
    InvalidEmail,

    #[error("Password must be at least 6 characters")]
    WeakPassword,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("User not found")]
    UnknownUser,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// The identity behind a verified bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub name: String,
    pub is_anonymous: bool,
    #[serde(skip)]
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    SignedIn(Session),
    SignedOut { user_id: Uuid, token_id: Uuid },
    ProfileUpdated { user_id: Uuid, name: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl Registration {
    /// Field presence first, then length, then confirmation.
    pub fn validate(&self) -> IdentityResult<()> {
        let fields = [
            ("name", &self.name),
            ("email", &self.email),
            ("password", &self.password),
            ("confirm_password", &self.confirm_password),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(IdentityError::MissingField(field));
            }
        }
        if self.password.trim().chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }
        if self.password.trim() != self.confirm_password.trim() {
            return Err(IdentityError::PasswordMismatch);
        }
        if !is_valid_email(&normalize_email(&self.email)) {
            return Err(IdentityError::InvalidEmail);
        }
        Ok(())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> IdentityResult<IssuedSession>;

    /// Creates a credential. When `upgrade_from` is an anonymous session the
    /// new account keeps that user id, so earlier profile data carries over.
    async fn register(
        &self,
        registration: Registration,
        upgrade_from: Option<&Session>,
    ) -> IdentityResult<IssuedSession>;

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<IssuedSession>;

    /// Succeeds whether or not the address is known.
    async fn send_password_reset(&self, email: &str) -> IdentityResult<()>;

    async fn confirm_password_reset(&self, token: &str, new_password: &str)
        -> IdentityResult<()>;

    async fn sign_out(&self, session: &Session) -> IdentityResult<()>;

    async fn update_display_name(&self, user_id: Uuid, name: &str) -> IdentityResult<()>;

    async fn verify(&self, token: &str) -> IdentityResult<Session>;

    /// Forgets revoked tokens that expired before `now`; returns how many.
    fn prune_revocations(&self, now: DateTime<Utc>) -> usize;

    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(password: &str, confirm: &str) -> Registration {
        Registration {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn test_registration_rules_apply_in_order() {
        let mut missing = registration("secret1", "secret1");
        missing.name = "  ".into();
        assert!(matches!(
            missing.validate(),
            Err(IdentityError::MissingField("name"))
        ));

        assert!(matches!(
            registration("abc", "abd").validate(),
            Err(IdentityError::WeakPassword)
        ));
        assert!(matches!(
            registration("secret1", "secret2").validate(),
            Err(IdentityError::PasswordMismatch)
        ));
        assert!(registration("secret1", "secret1").validate().is_ok());
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("ana@teatro.cl"));
        assert!(!is_valid_email("ana.teatro.cl"));
        assert!(!is_valid_email("ana@teatro"));
        assert!(!is_valid_email("a na@teatro.cl"));
        assert_eq!(normalize_email(" Ana@Teatro.CL "), "ana@teatro.cl");
    }
}
