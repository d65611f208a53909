//! Session orchestration: login, logout, bootstrap and forced refresh on top
//! of the hypermedia client, plus the reaction to an invalidated credential.
//!
//! The session is one value shared by the whole client. It is mutated only
//! here; everyone else reads a cloned [`Session`] from [`SessionManager::snapshot`].

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use herald_auth::{Identity, Organization, Session};
use herald_events::{EventBus, Listener, SessionEvent, SubscriptionId};

use crate::client::HalClient;
use crate::error::ApiError;
use crate::hal::HttpMethod;
use crate::store::{Credential, StoreError};
use crate::transport::Auth;

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";
pub const ORGANIZATIONS_PATH: &str = "/organizations";

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: Identity,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The login attempt was rejected or never reached the server.
    #[error("login failed: {0}")]
    AuthFailure(#[source] ApiError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Inner {
    client: HalClient,
    state: RwLock<Session>,
}

impl Inner {
    fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Local teardown: credential, identity and organization. Safe to repeat.
    fn clear_local(&self) {
        if let Err(e) = self.client.store().clear() {
            tracing::error!(error = %e, "failed to clear credential store");
        }
        if self.write(Session::clear) {
            tracing::info!("session cleared");
        }
    }

    fn fail(&self, err: &ApiError) {
        self.write(|s| {
            s.loading = false;
            s.last_error = Some(err.to_string());
        });
    }
}

struct Worker {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Owner of the process-wide [`Session`].
///
/// Subscribes to [`SessionEvent::Invalidated`] at construction so that a
/// credential rejected anywhere in the client tears the session down.
pub struct SessionManager {
    inner: Arc<Inner>,
    subscription: Mutex<Option<SubscriptionId>>,
    worker: Mutex<Option<Worker>>,
}

impl SessionManager {
    pub fn new(client: HalClient) -> Self {
        let inner = Arc::new(Inner {
            client,
            state: RwLock::new(Session::default()),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let listener: Listener<SessionEvent> = Arc::new(move |event: &SessionEvent| {
            match event {
                SessionEvent::Invalidated => {
                    if let Some(inner) = weak.upgrade() {
                        tracing::info!(event = event.name(), "tearing down invalidated session");
                        inner.clear_local();
                    }
                }
            }
        });
        let subscription = inner.client.bus().subscribe(listener);

        Self {
            inner,
            subscription: Mutex::new(Some(subscription)),
            worker: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &HalClient {
        &self.inner.client
    }

    pub fn snapshot(&self) -> Session {
        self.inner.read(Session::clone)
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read(Session::is_authenticated)
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.inner.read(|s| s.has_permission(name))
    }

    pub fn has_any<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.inner.read(|s| s.has_any(names))
    }

    pub fn has_all<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.inner.read(|s| s.has_all(names))
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.inner.read(|s| s.has_role(name))
    }

    /// Exchange email and password for a credential and identity.
    ///
    /// On failure the previous session (credential, identity, organization)
    /// is left as it was and only `last_error` changes.
    pub async fn login(&self, request: &LoginRequest) -> Result<(), SessionError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::validation(format!("unencodable login request: {e}")))?;
        self.inner.write(|s| s.loading = true);

        let result = self
            .client()
            .transport()
            .send_json::<LoginResponse>(HttpMethod::Post, LOGIN_PATH, Some(&body), &[], Auth::Anonymous)
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(error = %err, "login rejected");
                self.inner.fail(&err);
                return Err(SessionError::AuthFailure(err));
            }
        };

        let credential = Credential::new(resp.access_token, resp.refresh_token);
        let identity = resp.user;
        if let Err(e) = self.persist(&credential, &identity) {
            tracing::error!(error = %e, "failed to persist login");
            self.inner.clear_local();
            self.inner.write(|s| s.last_error = Some(e.to_string()));
            return Err(e.into());
        }

        let cached = self.inner.read(|s| s.organization.clone());
        let organization = match self.fetch_organization(&identity, cached).await {
            Ok(org) => org,
            Err(err) => {
                tracing::warn!(error = %err, "organization fetch failed after login");
                None
            }
        };

        // A 401 on the organization call has already torn the session down.
        if self.client().store().load_credential().is_none() {
            let err = ApiError::authentication("session invalidated during login");
            self.inner.fail(&err);
            return Err(SessionError::AuthFailure(err));
        }

        tracing::info!(user_id = %identity.id, "signed in");
        self.inner.write(|s| {
            s.identity = Some(identity);
            s.organization = organization;
            s.loading = false;
            s.last_error = None;
        });
        Ok(())
    }

    /// Sign out. The server is told when a credential exists; whatever it
    /// answers, local state is cleared.
    ///
    /// The current token is sent as-is: an expired one is not refreshed just
    /// to be revoked.
    pub async fn logout(&self) {
        if self.client().tokens().has_credential() {
            if let Err(err) = self
                .client()
                .transport()
                .send(HttpMethod::Post, LOGOUT_PATH, None, &[], Auth::Bearer)
                .await
            {
                tracing::warn!(error = %err, "remote logout failed; clearing locally");
            }
        }
        self.inner.clear_local();
        self.inner.write(|s| s.last_error = None);
    }

    /// Rebuild the session from a persisted credential.
    ///
    /// The cached identity is shown immediately, then revalidated with the
    /// server. Any failure along the way leaves the client signed out.
    pub async fn bootstrap(&self) -> Session {
        if !self.client().tokens().has_credential() {
            tracing::debug!("no persisted credential; starting signed out");
            self.inner.write(Session::clear);
            return self.snapshot();
        }

        let cached = self.client().store().load_identity();
        self.inner.write(|s| {
            s.identity = cached;
            s.loading = true;
        });

        if let Err(err) = self.revalidate().await {
            tracing::warn!(error = %err, "session bootstrap failed; signing out");
            self.inner.clear_local();
            self.inner.fail(&err);
        }
        self.snapshot()
    }

    async fn revalidate(&self) -> Result<(), ApiError> {
        if !self.client().tokens().ensure_valid_token().await {
            return Err(ApiError::authentication("stored credential could not be renewed"));
        }

        let identity: Identity = self.client().get(ME_PATH).await?.into_model()?;
        if let Err(e) = self.client().store().save_identity(&identity) {
            tracing::warn!(error = %e, "failed to cache identity");
        }

        let cached = self.inner.read(|s| s.organization.clone());
        let organization = self.fetch_organization(&identity, cached).await?;

        tracing::info!(user_id = %identity.id, "session restored");
        self.inner.write(|s| {
            s.identity = Some(identity);
            s.organization = organization;
            s.loading = false;
            s.last_error = None;
        });
        Ok(())
    }

    /// Force a token refresh now.
    ///
    /// A rejected refresh token ends the session. A network or server failure
    /// keeps it so the caller can try again.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        match self.client().tokens().refresh().await {
            Ok(_) => Ok(()),
            Err(err) => {
                if !err.is_retryable() {
                    self.inner.clear_local();
                }
                self.inner.fail(&err);
                Err(err.into())
            }
        }
    }

    /// Re-read the identity from the server, picking up changed permissions.
    pub async fn reload_identity(&self) -> Result<Identity, SessionError> {
        let identity: Identity = self.client().get(ME_PATH).await?.into_model()?;
        self.client().store().save_identity(&identity)?;
        self.inner.write(|s| s.identity = Some(identity.clone()));
        Ok(identity)
    }

    /// Start the background token renewal worker. Does nothing if it is
    /// already running.
    pub fn start_token_worker(&self) {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }
        let shutdown = Arc::new(Notify::new());
        let handle = self.client().tokens().spawn_worker(Arc::clone(&shutdown));
        *slot = Some(Worker { shutdown, handle });
    }

    /// Stop the renewal worker and detach from the invalidation signal.
    pub async fn shutdown(&self) {
        self.unsubscribe();

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker.shutdown.notify_one();
            if let Err(e) = worker.handle.await {
                tracing::error!(error = %e, "token renewal worker ended abnormally");
            }
        }
    }

    fn unsubscribe(&self) {
        let id = self.subscription.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(id) = id {
            self.client().bus().unsubscribe(id);
        }
    }

    fn persist(&self, credential: &Credential, identity: &Identity) -> Result<(), StoreError> {
        let store = self.client().store();
        store.save_credential(credential)?;
        store.save_identity(identity)
    }

    async fn fetch_organization(
        &self,
        identity: &Identity,
        cached: Option<Organization>,
    ) -> Result<Option<Organization>, ApiError> {
        let Some(id) = identity.organization_id else {
            return Ok(None);
        };
        if let Some(org) = cached.filter(|org| org.id == id) {
            return Ok(Some(org));
        }

        let href = format!("{ORGANIZATIONS_PATH}/{id}");
        let org: Organization = self.client().get(&href).await?.into_model()?;
        Ok(Some(org))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.unsubscribe();
        let worker = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker.shutdown.notify_one();
        }
    }
}
