use crate::errors::ClientError;
use crate::models::{Session, User};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::{error, warn};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_DATA_KEY: &str = "user_data";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY];

/// Durable string key-value store backing the session.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), ClientError>;

    async fn remove_many(&self, keys: &[&str]) -> Result<(), ClientError>;

    async fn set(&self, key: &str, value: String) -> Result<(), ClientError> {
        self.set_many(&[(key, value)]).await
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.remove_many(&[key]).await
    }
}

/// JSON object on disk, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path).await;
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), ClientError> {
        let mut data = self.entries.lock().await;
        for (key, value) in entries {
            data.insert((*key).to_string(), value.clone());
        }
        persist_entries(&self.path, &data).await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), ClientError> {
        let mut data = self.entries.lock().await;
        let before = data.len();
        for key in keys {
            data.remove(*key);
        }
        if data.len() == before {
            return Ok(());
        }
        persist_entries(&self.path, &data).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), ClientError> {
        let mut data = self.entries.lock().await;
        for (key, value) in entries {
            data.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), ClientError> {
        let mut data = self.entries.lock().await;
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }
}

async fn load_entries(path: &Path) -> BTreeMap<String, String> {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                error!("failed to parse session file {}: {err}", path.display());
                BTreeMap::new()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(err) => {
            error!("failed to read session file {}: {err}", path.display());
            BTreeMap::new()
        }
    }
}

async fn persist_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), ClientError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(entries)?;

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);
    let _ = fs::remove_file(&tmp_path).await;

    // owner-only, swapped in by rename
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(&tmp_path).await?;
    file.write_all(&payload).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Reads the stored session.
///
/// Returns `None` unless both the access token and a parseable user are
/// present; a missing refresh token is tolerated.
pub async fn load_session(store: &dyn KeyValueStore) -> Option<Session> {
    let access_token = store.get(ACCESS_TOKEN_KEY).await?;
    let raw_user = store.get(USER_DATA_KEY).await?;
    let user: User = match serde_json::from_str(&raw_user) {
        Ok(user) => user,
        Err(err) => {
            warn!("stored user data is corrupt: {err}");
            return None;
        }
    };

    Some(Session {
        access_token,
        refresh_token: store.get(REFRESH_TOKEN_KEY).await,
        user,
    })
}

pub async fn persist_session(store: &dyn KeyValueStore, session: &Session) -> Result<(), ClientError> {
    let user_data = serde_json::to_string(&session.user)?;
    match &session.refresh_token {
        Some(refresh) => {
            store
                .set_many(&[
                    (ACCESS_TOKEN_KEY, session.access_token.clone()),
                    (REFRESH_TOKEN_KEY, refresh.clone()),
                    (USER_DATA_KEY, user_data),
                ])
                .await
        }
        None => {
            store
                .set_many(&[
                    (ACCESS_TOKEN_KEY, session.access_token.clone()),
                    (USER_DATA_KEY, user_data),
                ])
                .await?;
            store.remove(REFRESH_TOKEN_KEY).await
        }
    }
}

pub async fn clear_session(store: &dyn KeyValueStore) -> Result<(), ClientError> {
    store.remove_many(&SESSION_KEYS).await
}
