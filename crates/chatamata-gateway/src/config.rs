//! Gateway configuration loaded from environment variables.
//!
//! All settings have defaults pointing at a local development instance of
//! the hosted platform, so the client can start with zero configuration.

use std::time::Duration;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the platform project (no trailing slash).
    /// Env: `CHATAMATA_URL`
    /// Default: `http://localhost:54321`
    pub base_url: String,

    /// Public (anonymous) API key. Row-level security on the platform side
    /// decides what this key may touch; a signed-in access token is sent
    /// alongside it once available.
    /// Env: `CHATAMATA_ANON_KEY`
    /// Default: empty (development only).
    pub anon_key: String,

    /// Timeout applied to every HTTP request.
    /// Env: `CHATAMATA_HTTP_TIMEOUT_SECS`
    /// Default: 30 seconds.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CHATAMATA_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(key) = std::env::var("CHATAMATA_ANON_KEY") {
            config.anon_key = key;
        } else {
            tracing::warn!("CHATAMATA_ANON_KEY not set; gateway calls will be anonymous-only");
        }

        if let Ok(val) = std::env::var("CHATAMATA_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.request_timeout = Duration::from_secs(secs);
            } else {
                tracing::warn!(value = %val, "Invalid CHATAMATA_HTTP_TIMEOUT_SECS, using default");
            }
        }

        config
    }

    /// Root of the row/RPC REST API.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base_url)
    }

    /// Root of the auth API.
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.base_url)
    }

    /// Root of the object storage API.
    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.base_url)
    }

    /// Websocket endpoint for the realtime change feed, with the API key in
    /// the query string as the platform expects.
    pub fn realtime_socket_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.anon_key
        )
    }
}
