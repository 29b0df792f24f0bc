use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Key of the single refresh-token slot.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Secure storage capability for opaque secrets.
///
/// The session only ever uses [`REFRESH_TOKEN_KEY`].
#[async_trait]
pub trait SecureTokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;
    async fn delete(&self, key: &str) -> Result<(), AuthError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AuthError> {
        self.values
            .lock()
            .map_err(|_| AuthError::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SecureTokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-backed store: one TOML file per key, mode 0600 on unix.
///
/// # Example
/// ```no_run
/// use oidc_session::auth::{FileTokenStore, SecureTokenStore, REFRESH_TOKEN_KEY};
///
/// # async fn example() -> Result<(), oidc_session::auth::AuthError> {
/// let store = FileTokenStore::new_default();
/// store.set(REFRESH_TOKEN_KEY, "refresh").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    base_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn new_default() -> Self {
        Self::new(default_store_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.toml", normalize_label(key)))
    }
}

#[async_trait]
impl SecureTokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: StoredEntry = toml::from_str(&raw)?;
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let entry = StoredEntry {
            version: 1,
            key: key.to_string(),
            value: value.to_string(),
            saved_at: Utc::now(),
        };
        tokio::fs::write(&path, toml::to_string(&entry)?).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    version: u32,
    key: String,
    value: String,
    saved_at: DateTime<Utc>,
}

fn default_store_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "oidc-session")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".oidc-session"))
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    let out: String = trimmed
        .chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '-' || lower == '_' {
                lower
            } else {
                '-'
            }
        })
        .collect();
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}
