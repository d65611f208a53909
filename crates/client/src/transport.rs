//! Raw HTTP plumbing under the hypermedia client.
//!
//! The transport knows about credentials only as a string to attach. It tells
//! the rest of the process about a rejected credential by publishing
//! [`SessionEvent::Invalidated`]; it never calls into the session layer.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::Value;

use herald_events::{EventBus, SessionEvent};

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind};
use crate::hal::{HttpMethod, Resource};
use crate::store::CredentialStore;

const HAL_ACCEPT: &str = "application/hal+json, application/json";

/// Whether a request carries the stored access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// Attach the bearer token if one is stored; a 401 invalidates the session.
    Bearer,
    /// Never attach a token; a 401 is an ordinary failure (bad login, bad refresh token).
    Anonymous,
}

pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    bus: Arc<dyn EventBus<SessionEvent>>,
}

impl Transport {
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        bus: Arc<dyn EventBus<SessionEvent>>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            store,
            bus,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<dyn EventBus<SessionEvent>> {
        &self.bus
    }

    /// Send a request and parse the 2xx body as a HAL resource.
    pub async fn send(
        &self,
        method: HttpMethod,
        href: &str,
        body: Option<&Value>,
        params: &[(&str, &str)],
        auth: Auth,
    ) -> Result<Resource, ApiError> {
        let value = self.send_value(method, href, body, params, auth).await?;
        Resource::from_value(value)
    }

    /// Send a request and deserialize the 2xx body into `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        href: &str,
        body: Option<&Value>,
        params: &[(&str, &str)],
        auth: Auth,
    ) -> Result<T, ApiError> {
        let value = self.send_value(method, href, body, params, auth).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::network(format!("malformed response: {e}")))
    }

    async fn send_value(
        &self,
        method: HttpMethod,
        href: &str,
        body: Option<&Value>,
        params: &[(&str, &str)],
        auth: Auth,
    ) -> Result<Value, ApiError> {
        let url = resolve_url(&self.base_url, href);

        let mut req = self
            .http
            .request(method.to_reqwest(), &url)
            .header(ACCEPT, HAL_ACCEPT);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        if auth == Auth::Bearer {
            if let Some(credential) = self.store.load_credential() {
                req = req.bearer_auth(credential.access_token);
            }
        }

        tracing::debug!(method = %method, url = %url, "sending request");

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(method = %method, url = %url, error = %e, "request failed before a response");
            ApiError::from(e)
        })?;

        let status = resp.status();
        let text = resp.text().await?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| ApiError::network(format!("malformed response: {e}")));
        }

        let err = ApiError::from_response(status.as_u16(), &text);
        tracing::debug!(method = %method, url = %url, status = status.as_u16(), kind = %err.kind, "request rejected");

        if err.kind == ErrorKind::Authentication && auth == Auth::Bearer {
            tracing::warn!(url = %url, "credential rejected by server; invalidating session");
            self.bus.publish(SessionEvent::Invalidated);
        }

        Err(err)
    }
}

/// Join `href` onto `base`.
///
/// Absolute `http(s)` hrefs are used as-is; anything else is appended to the
/// base with exactly one `/` between them, so a base carrying a path prefix
/// (e.g. `/api/v1`) keeps it.
pub fn resolve_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        href.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_url_joins_with_single_slash() {
        assert_eq!(resolve_url("http://h/api/", "/auth/me"), "http://h/api/auth/me");
        assert_eq!(resolve_url("http://h/api", "auth/me"), "http://h/api/auth/me");
        assert_eq!(resolve_url("http://h", "/x?y=1"), "http://h/x?y=1");
    }

    #[test]
    fn resolve_url_keeps_absolute_hrefs() {
        assert_eq!(
            resolve_url("http://h/api", "https://files.herald.example/a.pdf"),
            "https://files.herald.example/a.pdf"
        );
        assert_eq!(resolve_url("http://h/api", ""), "http://h/api");
    }
}
