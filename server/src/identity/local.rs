use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    is_valid_email, normalize_email, IdentityError, IdentityProvider, IdentityResult,
    IssuedSession, Registration, Session, SessionChange, MIN_PASSWORD_LEN,
};
use crate::models::user::ANONYMOUS_NAME;
use crate::models::{Credential, UserProfile};
use crate::store::Store;

const RESET_PURPOSE: &str = "password_reset";
const RESET_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
    name: String,
    anonymous: bool,
    jti: String,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    sub: String,
    purpose: String,
    jti: String,
    exp: i64,
}

pub fn hash_password(password: &str) -> IdentityResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> IdentityResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| IdentityError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Identity provider backed by the credentials collection of the store.
pub struct LocalIdentity {
    store: Arc<dyn Store>,
    secret: String,
    session_ttl: Duration,
    /// Revoked token ids with the moment their token would have expired.
    revoked: RwLock<HashMap<Uuid, DateTime<Utc>>>,
    changes: broadcast::Sender<SessionChange>,
}

impl LocalIdentity {
    pub fn new(store: Arc<dyn Store>, secret: impl Into<String>, session_ttl_secs: i64) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            store,
            secret: secret.into(),
            session_ttl: Duration::seconds(session_ttl_secs),
            revoked: RwLock::new(HashMap::new()),
            changes,
        }
    }

    fn issue(
        &self,
        user_id: Uuid,
        email: Option<String>,
        name: String,
        is_anonymous: bool,
    ) -> IdentityResult<IssuedSession> {
        let token_id = Uuid::new_v4();
        let expires_at = Utc::now() + self.session_ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.clone(),
            name: name.clone(),
            anonymous: is_anonymous,
            jti: token_id.to_string(),
            exp: expires_at.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        let session = Session {
            user_id,
            email,
            name,
            is_anonymous,
            token_id,
            expires_at,
        };
        let _ = self.changes.send(SessionChange::SignedIn(session.clone()));
        Ok(IssuedSession { token, session })
    }

    fn is_revoked(&self, token_id: &Uuid) -> bool {
        self.revoked
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(token_id)
    }

    fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) {
        self.revoked
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(token_id, expires_at);
    }

    /// Issues a one-hour reset token, or `None` for an unknown address.
    pub async fn issue_reset_token(&self, email: &str) -> IdentityResult<Option<String>> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }
        if self.store.find_credential(&email).await?.is_none() {
            return Ok(None);
        }

        let claims = ResetClaims {
            sub: email,
            purpose: RESET_PURPOSE.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: (Utc::now() + Duration::seconds(RESET_TTL_SECS)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(Some(token))
    }
}

fn parse_uuid(raw: &str) -> IdentityResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| IdentityError::InvalidToken)
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn sign_in_anonymously(&self) -> IdentityResult<IssuedSession> {
        let user_id = Uuid::new_v4();
        if self.store.get_user(user_id).await?.is_none() {
            self.store
                .put_user(&UserProfile {
                    id: user_id,
                    email: None,
                    name: ANONYMOUS_NAME.to_string(),
                    is_anonymous: true,
                    registered_at: Utc::now(),
                })
                .await?;
        }
        debug!(%user_id, "Anonymous session started");
        self.issue(user_id, None, ANONYMOUS_NAME.to_string(), true)
    }

    async fn register(
        &self,
        registration: Registration,
        upgrade_from: Option<&Session>,
    ) -> IdentityResult<IssuedSession> {
        registration.validate()?;

        let email = normalize_email(&registration.email);
        let name = registration.name.trim().to_string();
        if self.store.find_credential(&email).await?.is_some() {
            return Err(IdentityError::EmailInUse);
        }

        let user_id = match upgrade_from {
            Some(session) if session.is_anonymous => session.user_id,
            _ => Uuid::new_v4(),
        };

        let credential = Credential {
            user_id,
            email: email.clone(),
            display_name: name.clone(),
            password_hash: hash_password(registration.password.trim())?,
        };
        self.store
            .insert_credential(&credential)
            .await
            .map_err(|e| match e {
                crate::store::StoreError::Conflict(_) => IdentityError::EmailInUse,
                other => IdentityError::Store(other),
            })?;

        let registered_at = match self.store.get_user(user_id).await? {
            Some(existing) => existing.registered_at,
            None => Utc::now(),
        };
        self.store
            .put_user(&UserProfile {
                id: user_id,
                email: Some(email.clone()),
                name: name.clone(),
                is_anonymous: false,
                registered_at,
            })
            .await?;

        if let Some(session) = upgrade_from {
            self.revoke(session.token_id, session.expires_at);
        }

        info!(%user_id, "User registered");
        self.issue(user_id, Some(email), name, false)
    }

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<IssuedSession> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }
        let credential = self
            .store
            .find_credential(&email)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;
        if !verify_password(password.trim(), &credential.password_hash)? {
            return Err(IdentityError::InvalidCredentials);
        }

        let profile = match self.store.get_user(credential.user_id).await? {
            Some(profile) => profile,
            None => {
                let fallback = if credential.display_name.is_empty() {
                    email.split('@').next().unwrap_or_default().to_string()
                } else {
                    credential.display_name.clone()
                };
                let profile = UserProfile {
                    id: credential.user_id,
                    email: Some(email.clone()),
                    name: fallback,
                    is_anonymous: false,
                    registered_at: Utc::now(),
                };
                self.store.put_user(&profile).await?;
                profile
            }
        };

        info!(user_id = %credential.user_id, "User signed in");
        self.issue(credential.user_id, Some(email), profile.name, false)
    }

    async fn send_password_reset(&self, email: &str) -> IdentityResult<()> {
        match self.issue_reset_token(email).await? {
            Some(token) => debug!(email = %normalize_email(email), %token, "Password reset issued"),
            None => debug!("Password reset requested for unknown address"),
        }
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> IdentityResult<()> {
        if new_password.trim().chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }

        let claims = decode::<ResetClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| IdentityError::InvalidResetToken)?
        .claims;
        let token_id = Uuid::parse_str(&claims.jti).map_err(|_| IdentityError::InvalidResetToken)?;
        if claims.purpose != RESET_PURPOSE || self.is_revoked(&token_id) {
            return Err(IdentityError::InvalidResetToken);
        }

        let mut credential = self
            .store
            .find_credential(&claims.sub)
            .await?
            .ok_or(IdentityError::InvalidResetToken)?;
        credential.password_hash = hash_password(new_password.trim())?;
        self.store.update_credential(&credential).await?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or_else(|| Utc::now() + Duration::seconds(RESET_TTL_SECS));
        self.revoke(token_id, expires_at);

        info!(user_id = %credential.user_id, "Password reset completed");
        Ok(())
    }

    async fn sign_out(&self, session: &Session) -> IdentityResult<()> {
        self.revoke(session.token_id, session.expires_at);
        let _ = self.changes.send(SessionChange::SignedOut {
            user_id: session.user_id,
            token_id: session.token_id,
        });
        Ok(())
    }

    async fn update_display_name(&self, user_id: Uuid, name: &str) -> IdentityResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::MissingField("name"));
        }
        if let Some(mut credential) = self.store.credential_for_user(user_id).await? {
            credential.display_name = name.to_string();
            self.store.update_credential(&credential).await?;
        } else if self.store.get_user(user_id).await?.is_none() {
            return Err(IdentityError::UnknownUser);
        }

        let _ = self.changes.send(SessionChange::ProfileUpdated {
            user_id,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn verify(&self, token: &str) -> IdentityResult<Session> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| IdentityError::InvalidToken)?
        .claims;

        let token_id = parse_uuid(&claims.jti)?;
        if self.is_revoked(&token_id) {
            return Err(IdentityError::InvalidToken);
        }
        let expires_at: DateTime<Utc> = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(IdentityError::InvalidToken)?;

        Ok(Session {
            user_id: parse_uuid(&claims.sub)?,
            email: claims.email,
            name: claims.name,
            is_anonymous: claims.anonymous,
            token_id,
            expires_at,
        })
    }

    fn prune_revocations(&self, now: DateTime<Utc>) -> usize {
        let mut revoked = self
            .revoked
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = revoked.len();
        revoked.retain(|_, expires_at| *expires_at > now);
        before - revoked.len()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}
