//! Credential persistence.
//!
//! Three slots under fixed keys: the access token, the refresh token and a
//! cached copy of the operator identity. The two tokens are only ever read and
//! written together, so a reader never sees halves of two different pairs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use herald_auth::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const IDENTITY_KEY: &str = "user";

/// An access/refresh token pair issued by one login or refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens are bearer secrets; keep them out of logs and panic messages.
impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential file io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize credential slots: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Process-wide holder for the session's credential and cached identity.
///
/// Reads never fail: unreadable or partial data is reported and treated as
/// absent. Writes replace whole values.
pub trait CredentialStore: Send + Sync {
    fn load_credential(&self) -> Option<Credential>;

    fn save_credential(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Replace the pair only while it is still `expected`. `None` clears
    /// every slot. Returns `false` (and changes nothing) when another
    /// operation has already replaced or cleared the pair.
    fn replace_credential(
        &self,
        expected: &Credential,
        next: Option<&Credential>,
    ) -> Result<bool, StoreError>;

    fn load_identity(&self) -> Option<Identity>;

    fn save_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Remove all slots (credential and identity).
    fn clear(&self) -> Result<(), StoreError>;
}

/// Raw key/value slots, shared by both store implementations.
#[derive(Debug, Default, Clone, PartialEq)]
struct Slots(BTreeMap<String, Value>);

impl Slots {
    fn credential(&self) -> Option<Credential> {
        let access = self.0.get(ACCESS_TOKEN_KEY).and_then(Value::as_str);
        let refresh = self.0.get(REFRESH_TOKEN_KEY).and_then(Value::as_str);
        match (access, refresh) {
            (Some(a), Some(r)) => Some(Credential::new(a, r)),
            (None, None) => None,
            _ => {
                tracing::warn!("persisted credential has only one token; treating as signed out");
                None
            }
        }
    }

    fn set_credential(&mut self, credential: &Credential) {
        self.0.insert(
            ACCESS_TOKEN_KEY.to_string(),
            Value::String(credential.access_token.clone()),
        );
        self.0.insert(
            REFRESH_TOKEN_KEY.to_string(),
            Value::String(credential.refresh_token.clone()),
        );
    }

    fn swap_credential(&mut self, expected: &Credential, next: Option<&Credential>) -> bool {
        if self.credential().as_ref() != Some(expected) {
            return false;
        }
        match next {
            Some(credential) => self.set_credential(credential),
            None => self.0.clear(),
        }
        true
    }

    fn identity(&self) -> Option<Identity> {
        let raw = self.0.get(IDENTITY_KEY)?;
        match serde_json::from_value(raw.clone()) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(error = %e, "cached identity is unreadable; ignoring it");
                None
            }
        }
    }

    fn set_identity(&mut self, identity: &Identity) -> Result<(), StoreError> {
        self.0
            .insert(IDENTITY_KEY.to_string(), serde_json::to_value(identity)?);
        Ok(())
    }
}

/// Volatile store: lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slots: Mutex<Slots>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential (tests, token handed in by env).
    pub fn with_credential(credential: &Credential) -> Self {
        let mut slots = Slots::default();
        slots.set_credential(credential);
        Self {
            slots: Mutex::new(slots),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_credential(&self) -> Option<Credential> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .credential()
    }

    fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_credential(credential);
        Ok(())
    }

    fn replace_credential(
        &self,
        expected: &Credential,
        next: Option<&Credential>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .swap_credential(expected, next))
    }

    fn load_identity(&self) -> Option<Identity> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .identity()
    }

    fn save_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_identity(identity)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).0.clear();
        Ok(())
    }
}

/// JSON file store that survives restarts.
///
/// The file is rewritten through a sibling temp file and a rename, so a crash
/// mid-write leaves either the old or the new pair on disk. The in-memory copy
/// is only updated after the rename succeeds.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    slots: Mutex<Slots>,
}

impl FileCredentialStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let slots = read_slots(&path);
        Self {
            path,
            slots: Mutex::new(slots),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Slots) -> Result<(), StoreError>,
    {
        self.update_if(|slots| mutate(slots).map(|()| true))
            .map(|_| ())
    }

    /// Apply `mutate` to a copy; persist and publish it only when `mutate`
    /// reports a change.
    fn update_if<F>(&self, mutate: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Slots) -> Result<bool, StoreError>,
    {
        let mut guard = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        if !mutate(&mut next)? {
            return Ok(false);
        }
        write_slots(&self.path, &next)?;
        *guard = next;
        Ok(true)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_credential(&self) -> Option<Credential> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .credential()
    }

    fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.update(|slots| {
            slots.set_credential(credential);
            Ok(())
        })
    }

    fn load_identity(&self) -> Option<Identity> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .identity()
    }

    fn replace_credential(
        &self,
        expected: &Credential,
        next: Option<&Credential>,
    ) -> Result<bool, StoreError> {
        self.update_if(|slots| Ok(slots.swap_credential(expected, next)))
    }

    fn save_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.update(|slots| slots.set_identity(identity))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.update(|slots| {
            slots.0.clear();
            Ok(())
        })
    }
}

fn read_slots(path: &Path) -> Slots {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Slots::default(),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "cannot read credential file; starting signed out");
            return Slots::default();
        }
    };

    match serde_json::from_slice::<BTreeMap<String, Value>>(&bytes) {
        Ok(map) => Slots(map),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "credential file is corrupt; starting signed out");
            Slots::default()
        }
    }
}

fn write_slots(path: &Path, slots: &Slots) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let bytes = serde_json::to_vec_pretty(&slots.0)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

/// Default location of the credential file: `<data dir>/herald/session.json`.
pub fn default_credential_path() -> Option<PathBuf> {
    let mut dir = dirs::data_dir().or_else(|| {
        dirs::home_dir().map(|mut h| {
            h.push(".local");
            h.push("share");
            h
        })
    })?;
    dir.push("herald");
    dir.push("session.json");
    Some(dir)
}
