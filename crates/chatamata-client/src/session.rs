//! Reactive session state and profile management.
//!
//! [`SessionStore`] owns the current authenticated session and exposes it
//! through a `tokio::sync::watch` channel so every synchronizer (and the
//! presentation layer) can observe sign-in and sign-out as they happen.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use chatamata_gateway::storage::profile_media_path;
use chatamata_gateway::Gateway;
use chatamata_shared::constants::{BUCKET_AVATARS, BUCKET_BANNERS, MAX_UPLOAD_BYTES};
use chatamata_shared::models::{Session, UserMetadata};
use chatamata_shared::types::UserId;

use crate::error::{ClientError, Result};
use crate::notify::Notifier;

/// Profile media kinds stored under one fixed path per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMedia {
    Avatar,
    Banner,
}

impl ProfileMedia {
    fn bucket(self) -> &'static str {
        match self {
            ProfileMedia::Avatar => BUCKET_AVATARS,
            ProfileMedia::Banner => BUCKET_BANNERS,
        }
    }

    fn kind(self) -> &'static str {
        match self {
            ProfileMedia::Avatar => "avatar",
            ProfileMedia::Banner => "banner",
        }
    }
}

pub struct SessionStore {
    gateway: Arc<Gateway>,
    notifier: Notifier,
    tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    pub fn new(gateway: Arc<Gateway>, notifier: Notifier) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            gateway,
            notifier,
            tx,
        }
    }

    /// Observe session changes. Yields `None` while signed out.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn current_user_id(&self) -> Result<UserId> {
        self.current()
            .map(|s| s.user_id())
            .ok_or(ClientError::NotSignedIn)
    }

    fn install(&self, session: Session) {
        self.gateway
            .set_access_token(Some(session.access_token.clone()));
        self.tx.send_replace(Some(session));
    }

    /// Register a new account. The chosen username and full name, plus a
    /// freshly generated public handle, are stored as account metadata; the
    /// platform mirrors them into the profile row.
    pub async fn sign_up(
        &self,
        full_name: &str,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<()> {
        validate_username(username)?;

        let chatamata_id = self.gateway.generate_chatamata_id().await.map_err(|e| {
            self.notifier
                .error("Sign Up Failed", format!("Error: {e}"));
            e
        })?;

        let metadata = UserMetadata {
            username: Some(username.to_string()),
            full_name: Some(full_name.to_string()),
            chatamata_id: Some(chatamata_id),
            ..Default::default()
        };

        match self.gateway.sign_up(email, password, &metadata).await {
            Ok(Some(session)) => {
                info!(user = %session.user_id(), "Signed up");
                self.install(session);
                Ok(())
            }
            Ok(None) => {
                self.notifier.success(
                    "Sign Up Success",
                    "We've sent you a confirmation email. Please verify your email before logging in.",
                );
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .error("Sign Up Failed", format!("Error: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        match self.gateway.sign_in(email, password).await {
            Ok(session) => {
                info!(user = %session.user_id(), "Signed in");
                self.install(session);
                self.notifier.success("Login Success", "Welcome back!");
                Ok(())
            }
            Err(e) => {
                self.notifier.error("Login Failed", format!("Error: {e}"));
                Err(e.into())
            }
        }
    }

    /// Sign out. Local state is cleared even when the remote revocation
    /// fails; the session is unusable either way.
    pub async fn sign_out(&self) {
        if let Err(e) = self.gateway.sign_out().await {
            warn!(error = %e, "Remote sign-out failed");
        }
        self.gateway.set_access_token(None);
        self.tx.send_replace(None);
        info!("Signed out");
    }

    /// Exchange the stored refresh token for a fresh session.
    pub async fn refresh(&self) -> Result<()> {
        let session = self.current().ok_or(ClientError::NotSignedIn)?;
        let renewed = self.gateway.refresh_session(&session.refresh_token).await?;
        self.install(renewed);
        Ok(())
    }

    /// Merge a metadata patch into the account and the held session.
    pub async fn update_metadata(&self, patch: &UserMetadata) -> Result<()> {
        let mut session = self.current().ok_or(ClientError::NotSignedIn)?;
        let updated = self.gateway.update_user_metadata(patch).await?;
        session.user = updated;
        self.tx.send_replace(Some(session));
        Ok(())
    }

    /// Upload a new avatar or banner and point the account metadata at it.
    /// The size cap is enforced before any remote call; the stored URL gets
    /// a cache-busting query parameter because the object path is reused.
    pub async fn upload_profile_media(&self, media: ProfileMedia, bytes: Bytes) -> Result<String> {
        let user_id = self.current_user_id()?;

        if bytes.len() > MAX_UPLOAD_BYTES {
            let body = format!(
                "The uploaded image should be less than {}MB.",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            );
            self.notifier.error("File Size Error", body.clone());
            return Err(ClientError::Validation(body));
        }

        let path = profile_media_path(&user_id, media.kind());
        let result = async {
            self.gateway
                .upload(media.bucket(), &path, bytes, "image/jpeg", true)
                .await?;
            let url = cache_busted(
                &self.gateway.public_url(media.bucket(), &path),
                Utc::now().timestamp_millis(),
            );
            let patch = match media {
                ProfileMedia::Avatar => UserMetadata {
                    profile_pic: Some(url.clone()),
                    ..Default::default()
                },
                ProfileMedia::Banner => UserMetadata {
                    banner_url: Some(url.clone()),
                    ..Default::default()
                },
            };
            self.update_metadata(&patch).await?;
            Ok::<String, ClientError>(url)
        }
        .await;

        match result {
            Ok(url) => {
                self.notifier.success(
                    match media {
                        ProfileMedia::Avatar => "Avatar Updated",
                        ProfileMedia::Banner => "Banner Updated",
                    },
                    "Your profile has been successfully updated.",
                );
                Ok(url)
            }
            Err(e) => {
                self.notifier.error("Update Failed", format!("Error: {e}"));
                Err(e)
            }
        }
    }
}

/// Usernames: 3-32 characters, alphanumeric or underscore.
pub fn validate_username(username: &str) -> Result<()> {
    let name = username.trim();
    if name.len() < 3 || name.len() > 32 {
        return Err(ClientError::Validation(
            "username must be 3-32 characters".into(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ClientError::Validation(
            "username may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(())
}

fn cache_busted(url: &str, millis: i64) -> String {
    format!("{url}?t={millis}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("nika_42").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_cache_busted_url() {
        assert_eq!(
            cache_busted("https://cdn.example/a/avatar.jpg", 99),
            "https://cdn.example/a/avatar.jpg?t=99"
        );
    }
}
