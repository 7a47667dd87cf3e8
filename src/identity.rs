//! Persistent client identity: session id and access token.
//!
//! The rest of the crate never touches disk for identity directly; it goes
//! through the [`IdentityStore`] capability so tests can swap in an
//! in-memory fake. The file-backed implementation mirrors browser-local
//! storage: two opaque string keys, durable across restarts.

use crate::config::config_root_dir;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// On-disk schema version for [`PersistedIdentity`].
const IDENTITY_FILE_VERSION: u32 = 1;

/// The two durable identity keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKey {
    /// Opaque session identifier shared by HTTP and realtime traffic.
    SessionId,
    /// Bearer token for authenticated requests.
    AccessToken,
}

/// Durable key-value storage for the client identity.
///
/// Values are opaque strings; no validation happens here. `set(key, None)`
/// clears the key.
pub trait IdentityStore: Send + Sync {
    fn get(&self, key: IdentityKey) -> Option<String>;
    fn set(&self, key: IdentityKey, value: Option<&str>) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// On-disk payload shape for the identity file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedIdentity {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Identity store persisted as a small JSON file with private permissions.
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
    // Serializes read-modify-write cycles across clones of the client.
    write_lock: Mutex<()>,
}

/// Returns the default identity file path (`~/.config/shopmate/identity.json`)
/// when the config root is resolvable.
pub fn default_identity_path() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join("shopmate").join("identity.json"))
}

impl FileIdentityStore {
    /// Open a store at the default path.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = default_identity_path().ok_or_else(|| {
            StoreError::Invalid("unable to resolve config root for identity storage".to_string())
        })?;
        Ok(Self::open(path))
    }

    /// Open a store backed by the given file. The file is created lazily on
    /// the first `set`.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<PersistedIdentity, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).map_err(|err| {
                StoreError::Invalid(format!(
                    "failed to parse identity file `{}`: {err}",
                    self.path.display()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(PersistedIdentity::default())
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn persist(&self, identity: &PersistedIdentity) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
            }
        }

        let json = serde_json::to_string_pretty(identity)
            .map_err(|err| StoreError::Invalid(format!("failed to serialize identity: {err}")))?;

        // Write to a sibling temporary file first so partial writes do not
        // corrupt the last known-good identity.
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut options = fs::OpenOptions::new();
            options.create(true).truncate(true).write(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl IdentityStore for FileIdentityStore {
    fn get(&self, key: IdentityKey) -> Option<String> {
        let identity = match self.load() {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(%err, "failed to read identity file, treating as empty");
                return None;
            }
        };
        match key {
            IdentityKey::SessionId => identity.session_id,
            IdentityKey::AccessToken => identity.access_token,
        }
    }

    fn set(&self, key: IdentityKey, value: Option<&str>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("identity write lock poisoned");
        let mut identity = self.load()?;
        identity.version = IDENTITY_FILE_VERSION;
        let slot = match key {
            IdentityKey::SessionId => &mut identity.session_id,
            IdentityKey::AccessToken => &mut identity.access_token,
        };
        *slot = value.map(str::to_string);
        self.persist(&identity)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile identity store used by tests and one-shot invocations.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<PersistedIdentity>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self, key: IdentityKey) -> Option<String> {
        let identity = self.inner.lock().expect("identity lock poisoned");
        match key {
            IdentityKey::SessionId => identity.session_id.clone(),
            IdentityKey::AccessToken => identity.access_token.clone(),
        }
    }

    fn set(&self, key: IdentityKey, value: Option<&str>) -> Result<(), StoreError> {
        let mut identity = self.inner.lock().expect("identity lock poisoned");
        let slot = match key {
            IdentityKey::SessionId => &mut identity.session_id,
            IdentityKey::AccessToken => &mut identity.access_token,
        };
        *slot = value.map(str::to_string);
        Ok(())
    }
}
