//! Auth endpoint client: sign-up, password sign-in, token refresh,
//! sign-out, and account metadata updates.
//!
//! Sessions are plain values here; keeping the current one and reacting to
//! its changes is the client crate's job.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use chatamata_shared::models::{AuthUser, Session, UserMetadata};

use crate::error::{GatewayError, Result};
use crate::http::Gateway;

/// Token grant response from the auth endpoints.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Result<Session> {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(unix), _) => Utc
                .timestamp_opt(unix, 0)
                .single()
                .ok_or_else(|| GatewayError::Auth("invalid expires_at timestamp".into()))?,
            (None, Some(secs)) => Utc::now() + chrono::Duration::seconds(secs),
            // Fall back to the exp claim baked into the token itself.
            (None, None) => jwt_expiry(&self.access_token)?,
        };
        Ok(Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        })
    }
}

/// Sign-up either yields a session immediately or, when the platform
/// requires email confirmation first, just the pending account.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Granted(TokenResponse),
    Pending(AuthUser),
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Expiry baked into a JWT access token.
fn jwt_expiry(token: &str) -> Result<DateTime<Utc>> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| GatewayError::Auth("malformed access token".into()))?;
    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    let claims: JwtClaims = serde_json::from_slice(&bytes)?;
    let exp = claims
        .exp
        .ok_or_else(|| GatewayError::Auth("access token has no expiry claim".into()))?;
    Utc.timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| GatewayError::Auth("invalid expiry claim".into()))
}

impl Gateway {
    /// Register a new account. The metadata is stored on the account and
    /// mirrored into the profile row by the platform. Returns `None` when
    /// the platform requires email confirmation before granting a session.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<Option<Session>> {
        let url = format!("{}/signup", self.config().auth_url());
        let body = json!({ "email": email, "password": password, "data": metadata });
        let resp = self.authed(self.http().post(&url).json(&body)).send().await?;
        let resp = Self::check(resp).await?;

        match resp.json::<SignUpResponse>().await? {
            SignUpResponse::Granted(token) => {
                info!("Sign-up granted a session immediately");
                Ok(Some(token.into_session()?))
            }
            SignUpResponse::Pending(user) => {
                info!(user = %user.id, "Sign-up pending email confirmation");
                Ok(None)
            }
        }
    }

    /// Exchange email + password for a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/token", self.config().auth_url());
        let body = json!({ "email": email, "password": password });
        let resp = self
            .authed(
                self.http()
                    .post(&url)
                    .query(&[("grant_type", "password")])
                    .json(&body),
            )
            .send()
            .await?;
        let token: TokenResponse = Self::check(resp).await?.json().await?;
        token.into_session()
    }

    /// Exchange a refresh token for a fresh session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let url = format!("{}/token", self.config().auth_url());
        let body = json!({ "refresh_token": refresh_token });
        let resp = self
            .authed(
                self.http()
                    .post(&url)
                    .query(&[("grant_type", "refresh_token")])
                    .json(&body),
            )
            .send()
            .await?;
        let token: TokenResponse = Self::check(resp).await?.json().await?;
        token.into_session()
    }

    /// Revoke the current session on the platform side.
    pub async fn sign_out(&self) -> Result<()> {
        if self.access_token().is_none() {
            return Err(GatewayError::NotAuthenticated);
        }
        let url = format!("{}/logout", self.config().auth_url());
        let resp = self.authed(self.http().post(&url)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Merge a metadata patch into the signed-in account and return the
    /// updated account record.
    pub async fn update_user_metadata(&self, patch: &UserMetadata) -> Result<AuthUser> {
        if self.access_token().is_none() {
            return Err(GatewayError::NotAuthenticated);
        }
        let url = format!("{}/user", self.config().auth_url());
        let body = json!({ "data": patch });
        let resp = self.authed(self.http().put(&url).json(&body)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatamata_shared::types::UserId;
    use uuid::Uuid;

    fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"HS256\"}");
        let payload = URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}").as_bytes());
        format!("{header}.{payload}.sig")
    }

    fn auth_user() -> AuthUser {
        AuthUser {
            id: UserId(Uuid::new_v4()),
            email: Some("a@example.com".into()),
            user_metadata: UserMetadata::default(),
        }
    }

    #[test]
    fn test_jwt_expiry_claim() {
        let exp = 1_900_000_000;
        let parsed = jwt_expiry(&token_with_exp(exp)).unwrap();
        assert_eq!(parsed.timestamp(), exp);
    }

    #[test]
    fn test_jwt_expiry_rejects_garbage() {
        assert!(jwt_expiry("not-a-token").is_err());
        assert!(jwt_expiry("a.!!!.c").is_err());
    }

    #[test]
    fn test_session_expiry_prefers_explicit_timestamp() {
        let token = TokenResponse {
            access_token: token_with_exp(1_700_000_000),
            refresh_token: "r".into(),
            expires_in: Some(3600),
            expires_at: Some(1_800_000_000),
            user: auth_user(),
        };
        let session = token.into_session().unwrap();
        assert_eq!(session.expires_at.timestamp(), 1_800_000_000);
    }

    #[test]
    fn test_session_expiry_falls_back_to_token_claim() {
        let token = TokenResponse {
            access_token: token_with_exp(1_900_000_000),
            refresh_token: "r".into(),
            expires_in: None,
            expires_at: None,
            user: auth_user(),
        };
        let session = token.into_session().unwrap();
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
    }
}
