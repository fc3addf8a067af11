//! Core HTTP client for the hosted platform's REST surface.
//!
//! [`Gateway`] holds the reqwest client, the project configuration, and the
//! current access token. Typed row queries, remote procedures, auth calls,
//! and storage uploads are implemented in their own modules as `impl
//! Gateway` blocks.

use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

/// Client handle for every remote call. Cheap to share behind an `Arc`.
pub struct Gateway {
    http: reqwest::Client,
    config: GatewayConfig,
    access_token: RwLock<Option<String>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            access_token: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Install (or clear) the signed-in access token used for the
    /// Authorization header. The anonymous key is used while no session
    /// exists.
    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token;
        }
    }

    /// Current access token, if a session is installed.
    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|g| g.clone())
    }

    pub(crate) fn bearer(&self) -> String {
        self.access_token()
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Attach the platform headers every request needs.
    pub(crate) fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer())
    }

    /// Turn a non-2xx response into [`GatewayError::Rejected`].
    pub(crate) async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    // -- Row API ------------------------------------------------------------

    /// Fetch rows from `table` with the given query parameters.
    pub(crate) async fn select_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        debug!(table, params = query.len(), "Selecting rows");
        let url = format!("{}/{}", self.config.rest_url(), table);
        let resp = self.authed(self.http.get(&url).query(query)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Fetch exactly one row from `table`.
    pub(crate) async fn select_single<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.config.rest_url(), table);
        let resp = self
            .authed(self.http.get(&url).query(query))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Insert a row and return the committed representation (with any joins
    /// named in the `select` parameter).
    pub(crate) async fn insert_returning<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        select: &str,
        body: &B,
    ) -> Result<T> {
        debug!(table, "Inserting row");
        let url = format!("{}/{}", self.config.rest_url(), table);
        let resp = self
            .authed(self.http.post(&url).query(&[("select", select)]).json(body))
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Patch rows matched by `query`; no representation returned.
    pub(crate) async fn update_rows<B: Serialize>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<()> {
        debug!(table, "Updating rows");
        let url = format!("{}/{}", self.config.rest_url(), table);
        let resp = self
            .authed(self.http.patch(&url).query(query).json(body))
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    // -- Remote procedures --------------------------------------------------

    /// Call a remote procedure and decode its result.
    pub(crate) async fn rpc<B: Serialize, T: DeserializeOwned>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<T> {
        debug!(rpc = name, "Calling remote procedure");
        let url = format!("{}/rpc/{}", self.config.rest_url(), name);
        let resp = self.authed(self.http.post(&url).json(body)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Call a remote procedure that returns nothing.
    pub(crate) async fn rpc_void<B: Serialize>(&self, name: &str, body: &B) -> Result<()> {
        debug!(rpc = name, "Calling remote procedure");
        let url = format!("{}/rpc/{}", self.config.rest_url(), name);
        let resp = self.authed(self.http.post(&url).json(body)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}
