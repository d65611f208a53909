//! Hypermedia client: authenticated requests and link following.

use std::sync::Arc;

use serde_json::Value;

use herald_events::{EventBus, SessionEvent};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::hal::{HttpMethod, Resource};
use crate::store::CredentialStore;
use crate::token::TokenManager;
use crate::transport::{Auth, Transport};

/// Issues requests on behalf of the current session.
///
/// Every call goes through the token manager first, so an expired access
/// token is renewed (once, shared across concurrent callers) before the
/// request is sent.
#[derive(Clone)]
pub struct HalClient {
    transport: Arc<Transport>,
    tokens: Arc<TokenManager>,
}

impl HalClient {
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        bus: Arc<dyn EventBus<SessionEvent>>,
    ) -> Result<Self, ApiError> {
        let transport = Arc::new(Transport::new(config, store, bus)?);
        let tokens = Arc::new(TokenManager::new(Arc::clone(&transport), config));
        Ok(Self { transport, tokens })
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        self.transport.store()
    }

    pub fn bus(&self) -> &Arc<dyn EventBus<SessionEvent>> {
        self.transport.bus()
    }

    /// Send a request carrying the session's bearer token.
    ///
    /// A failed pre-flight refresh fails the request; it is not retried.
    pub async fn request(
        &self,
        method: HttpMethod,
        href: &str,
        body: Option<&Value>,
        params: &[(&str, &str)],
    ) -> Result<Resource, ApiError> {
        self.tokens.prepare_request().await?;
        self.transport
            .send(method, href, body, params, Auth::Bearer)
            .await
    }

    pub async fn get(&self, href: &str) -> Result<Resource, ApiError> {
        self.request(HttpMethod::Get, href, None, &[]).await
    }

    pub async fn get_with(&self, href: &str, params: &[(&str, &str)]) -> Result<Resource, ApiError> {
        self.request(HttpMethod::Get, href, None, params).await
    }

    pub async fn post(&self, href: &str, body: &Value) -> Result<Resource, ApiError> {
        self.request(HttpMethod::Post, href, Some(body), &[]).await
    }

    /// Follow `relation` on `resource` using the link's own href and method.
    ///
    /// Returns `Ok(None)` without touching the network when the server did not
    /// offer the relation; an absent link means the action is not permitted in
    /// the resource's current state.
    pub async fn follow_link(
        &self,
        resource: &Resource,
        relation: &str,
        body: Option<&Value>,
    ) -> Result<Option<Resource>, ApiError> {
        let Some(link) = resource.link(relation) else {
            tracing::debug!(relation, "link not offered; skipping");
            return Ok(None);
        };
        let method = link.http_method()?;
        let href = link.href.clone();

        self.request(method, &href, body, &[]).await.map(Some)
    }
}
