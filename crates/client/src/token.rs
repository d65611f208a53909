//! Access-token lifecycle: expiry inspection, single-flight refresh and the
//! background renewal worker.
//!
//! Expiry is judged from the token's own `exp` claim, so checking is free and
//! can run on a fixed cadence. Only one refresh is ever in flight: a caller
//! that arrives while another refresh is running waits for it and takes its
//! outcome instead of sending the (possibly already rotated) refresh token a
//! second time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use herald_auth::claims::{self, Freshness};
use herald_events::SessionEvent;

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind};
use crate::hal::HttpMethod;
use crate::store::{Credential, CredentialStore};
use crate::transport::{Auth, Transport};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Presence and freshness of the stored access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoCredential,
    Fresh,
    /// Valid, but inside the renewal lead window.
    Expiring,
    Expired,
    /// A refresh call is in flight.
    Refreshing,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

/// Outcome of the most recent refresh, kept for callers that queued behind it.
#[derive(Default)]
struct LastRefresh {
    from: Option<Credential>,
    outcome: Option<Result<Credential, ApiError>>,
}

pub struct TokenManager {
    transport: Arc<Transport>,
    lead: chrono::Duration,
    check_interval: Duration,
    refresh_lock: Mutex<LastRefresh>,
    completed: AtomicU64,
}

impl TokenManager {
    pub fn new(transport: Arc<Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            lead: chrono::Duration::from_std(config.refresh_lead).unwrap_or(chrono::Duration::zero()),
            check_interval: config.refresh_check_interval,
            refresh_lock: Mutex::new(LastRefresh::default()),
            completed: AtomicU64::new(0),
        }
    }

    fn store(&self) -> &Arc<dyn CredentialStore> {
        self.transport.store()
    }

    pub fn has_credential(&self) -> bool {
        self.store().load_credential().is_some()
    }

    /// Number of refresh calls that have reached the network.
    pub fn refresh_count(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TokenState {
        let Some(credential) = self.store().load_credential() else {
            return TokenState::NoCredential;
        };
        if self.refresh_lock.try_lock().is_err() {
            return TokenState::Refreshing;
        }
        match claims::classify(&credential.access_token, Utc::now(), self.lead) {
            Freshness::Fresh => TokenState::Fresh,
            Freshness::Expiring => TokenState::Expiring,
            Freshness::Expired => TokenState::Expired,
        }
    }

    /// Gate before an outbound call.
    ///
    /// Returns `false` only when there is no credential or an expired token
    /// could not be renewed.
    pub async fn ensure_valid_token(&self) -> bool {
        if !self.has_credential() {
            return false;
        }
        self.prepare_request().await.is_ok()
    }

    /// Make sure a stored token is usable, refreshing once if it has expired.
    ///
    /// With nothing stored there is nothing to prepare; the request goes out
    /// anonymously.
    pub(crate) async fn prepare_request(&self) -> Result<(), ApiError> {
        let Some(credential) = self.store().load_credential() else {
            return Ok(());
        };
        if !claims::is_expired(&credential.access_token, Utc::now()) {
            return Ok(());
        }
        tracing::debug!("access token expired; refreshing before request");
        self.refresh_from(credential).await.map(|_| ())
    }

    /// Exchange the stored refresh token for a new pair now.
    pub async fn refresh(&self) -> Result<Credential, ApiError> {
        let credential = self
            .store()
            .load_credential()
            .ok_or_else(|| ApiError::authentication("no credential to refresh"))?;
        self.refresh_from(credential).await
    }

    async fn refresh_from(&self, seen: Credential) -> Result<Credential, ApiError> {
        let ticket = self.completed.load(Ordering::SeqCst);
        let mut last = self.refresh_lock.lock().await;

        // Someone refreshed this very pair while we waited: share their outcome.
        if self.completed.load(Ordering::SeqCst) != ticket && last.from.as_ref() == Some(&seen) {
            if let Some(outcome) = last.outcome.clone() {
                tracing::debug!("reusing outcome of concurrent token refresh");
                return outcome;
            }
        }

        match self.store().load_credential() {
            None => return Err(ApiError::authentication("session ended before token refresh")),
            Some(current) if current != seen => return Ok(current),
            Some(_) => {}
        }

        let outcome = self.call_refresh(&seen).await;
        last.from = Some(seen);
        last.outcome = Some(outcome.clone());
        self.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn call_refresh(&self, seen: &Credential) -> Result<Credential, ApiError> {
        let body = json!({ "refreshToken": seen.refresh_token });
        let result = self
            .transport
            .send_json::<RefreshResponse>(HttpMethod::Post, REFRESH_PATH, Some(&body), &[], Auth::Anonymous)
            .await;

        // Logout, login and invalidation do not wait for us; only touch the
        // store if it still holds the pair this refresh started from.
        match result {
            Ok(resp) => {
                let credential = Credential::new(resp.access_token, resp.refresh_token);
                let replaced = self
                    .store()
                    .replace_credential(seen, Some(&credential))
                    .map_err(|e| {
                        tracing::error!(error = %e, "failed to persist refreshed credential");
                        ApiError::network(format!("could not persist refreshed credential: {e}"))
                    })?;
                if !replaced {
                    tracing::info!("credential changed during refresh; discarding refreshed pair");
                    return self.superseded();
                }
                tracing::info!("access token refreshed");
                Ok(credential)
            }
            Err(err) if is_rejection(&err) => {
                match self.store().replace_credential(seen, None) {
                    Ok(true) => {
                        tracing::warn!(error = %err, "refresh token rejected; ending session");
                        self.transport.bus().publish(SessionEvent::Invalidated);
                    }
                    Ok(false) => {
                        tracing::info!(error = %err, "stale refresh token rejected; credential already replaced");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to clear credential store");
                        self.transport.bus().publish(SessionEvent::Invalidated);
                    }
                }
                Err(err)
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh unavailable; keeping credential");
                Err(err)
            }
        }
    }

    /// Outcome for a refresh whose starting pair was replaced while it ran.
    fn superseded(&self) -> Result<Credential, ApiError> {
        self.store()
            .load_credential()
            .ok_or_else(|| ApiError::authentication("session ended during token refresh"))
    }

    /// One background step: renew if the token is expiring or expired.
    pub async fn check_once(&self) -> TokenState {
        let Some(credential) = self.store().load_credential() else {
            return TokenState::NoCredential;
        };

        match claims::classify(&credential.access_token, Utc::now(), self.lead) {
            Freshness::Fresh => TokenState::Fresh,
            freshness => {
                tracing::debug!(?freshness, "renewing access token ahead of use");
                match self.refresh_from(credential).await {
                    Ok(_) => TokenState::Fresh,
                    Err(err) => {
                        tracing::warn!(error = %err, "background token renewal failed");
                        self.state()
                    }
                }
            }
        }
    }

    /// Start the periodic expiry check.
    ///
    /// The first check runs immediately; missed ticks are skipped rather than
    /// replayed. The task ends when `shutdown` is notified.
    pub fn spawn_worker(self: &Arc<Self>, shutdown: Arc<Notify>) -> JoinHandle<()> {
        let tokens = Arc::clone(self);

        tokio::spawn(async move {
            tracing::info!(interval = ?tokens.check_interval, "token renewal worker started");

            let mut interval = tokio::time::interval(tokens.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("token renewal worker received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        let state = tokens.check_once().await;
                        tracing::debug!(?state, "token check complete");
                    }
                }
            }
        })
    }
}

/// The server looked at the refresh token and said no.
fn is_rejection(err: &ApiError) -> bool {
    matches!(
        err.kind,
        ErrorKind::Authentication | ErrorKind::Authorization | ErrorKind::Validation | ErrorKind::NotFound
    )
}
