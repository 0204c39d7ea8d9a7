//! Credential Storage
//!
//! Durable storage for credential files.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{CredentialError, ResilienceError, ResilienceResult, StorageError};
use crate::types::{CredentialFile, CredentialKey};

/// Credential storage interface.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load and validate the credential file for `key`.
    async fn load(&self, key: &CredentialKey) -> ResilienceResult<CredentialFile>;

    /// Durably replace the credential file for `key`. Readers never observe
    /// a partially written file.
    async fn persist(&self, key: &CredentialKey, file: &CredentialFile) -> ResilienceResult<()>;
}

/// JSON files on the local filesystem; the key is the file path.
#[derive(Debug, Clone, Default)]
pub struct FileCredentialStore {
    base_dir: Option<PathBuf>,
}

impl FileCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative keys against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn path_for(&self, key: &CredentialKey) -> PathBuf {
        let path = key.as_path();
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credentials".to_string());
        let suffix: u32 = rand::thread_rng().gen();
        path.with_file_name(format!(".{}.{:08x}.tmp", name, suffix))
    }

    /// Create `path` owner-only from the start and flush it to disk.
    async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, key: &CredentialKey) -> ResilienceResult<CredentialFile> {
        let path = self.path_for(key);
        let body = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CredentialError::NotFound {
                key: key.to_string(),
            }
            .into(),
            _ => ResilienceError::from(StorageError::ReadFailed {
                key: key.to_string(),
                message: e.to_string(),
            }),
        })?;

        CredentialFile::parse(key, &body)
    }

    async fn persist(&self, key: &CredentialKey, file: &CredentialFile) -> ResilienceResult<()> {
        let path = self.path_for(key);
        let write_failed = |message: String| StorageError::WriteFailed {
            key: key.to_string(),
            message,
        };

        let body = file.to_json_pretty().map_err(|e| write_failed(e.to_string()))?;
        let temp = Self::temp_path(&path);

        if let Err(e) = Self::write_private(&temp, body.as_bytes()).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(write_failed(format!("writing {}: {}", temp.display(), e)).into());
        }

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(write_failed(format!("replacing {}: {}", path.display(), e)).into());
        }

        tracing::debug!(credential = %key, path = %path.display(), "credential file persisted");
        Ok(())
    }
}

/// In-memory store holding serialized bodies, so loads go through the same
/// parsing and validation as files.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    bodies: Mutex<HashMap<CredentialKey, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<CredentialKey>, file: &CredentialFile) -> &Self {
        let body = serde_json::to_string(file).unwrap_or_default();
        self.insert_raw(key, body)
    }

    /// Store an arbitrary body, e.g. a malformed file.
    pub fn insert_raw(&self, key: impl Into<CredentialKey>, body: impl Into<String>) -> &Self {
        self.bodies.lock().insert(key.into(), body.into());
        self
    }

    /// Raw JSON currently stored for `key`.
    pub fn raw(&self, key: &CredentialKey) -> Option<String> {
        self.bodies.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &CredentialKey) -> bool {
        self.bodies.lock().remove(key).is_some()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self, key: &CredentialKey) -> ResilienceResult<CredentialFile> {
        let body = self.raw(key).ok_or_else(|| CredentialError::NotFound {
            key: key.to_string(),
        })?;
        CredentialFile::parse(key, &body)
    }

    async fn persist(&self, key: &CredentialKey, file: &CredentialFile) -> ResilienceResult<()> {
        let body = serde_json::to_string(file).map_err(|e| StorageError::WriteFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.bodies.lock().insert(key.clone(), body);
        Ok(())
    }
}

/// Mock credential store for testing.
#[derive(Default)]
pub struct MockCredentialStore {
    inner: InMemoryCredentialStore,
    fail_load: Mutex<bool>,
    fail_persist: Mutex<bool>,
    load_history: Mutex<Vec<CredentialKey>>,
    persist_history: Mutex<Vec<(CredentialKey, CredentialFile)>>,
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_credential(&self, key: impl Into<CredentialKey>, file: &CredentialFile) -> &Self {
        self.inner.insert(key, file);
        self
    }

    pub fn add_raw(&self, key: impl Into<CredentialKey>, body: impl Into<String>) -> &Self {
        self.inner.insert_raw(key, body);
        self
    }

    pub fn set_fail_load(&self, fail: bool) -> &Self {
        *self.fail_load.lock() = fail;
        self
    }

    pub fn set_fail_persist(&self, fail: bool) -> &Self {
        *self.fail_persist.lock() = fail;
        self
    }

    pub fn get_load_history(&self) -> Vec<CredentialKey> {
        self.load_history.lock().clone()
    }

    /// Successful and failed persist calls, in order.
    pub fn get_persist_history(&self) -> Vec<(CredentialKey, CredentialFile)> {
        self.persist_history.lock().clone()
    }

    /// Currently stored file for `key`.
    pub fn stored(&self, key: &CredentialKey) -> Option<CredentialFile> {
        self.inner
            .raw(key)
            .and_then(|body| serde_json::from_str(&body).ok())
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn load(&self, key: &CredentialKey) -> ResilienceResult<CredentialFile> {
        self.load_history.lock().push(key.clone());
        if *self.fail_load.lock() {
            return Err(StorageError::ReadFailed {
                key: key.to_string(),
                message: "Mock load failure".to_string(),
            }
            .into());
        }
        self.inner.load(key).await
    }

    async fn persist(&self, key: &CredentialKey, file: &CredentialFile) -> ResilienceResult<()> {
        self.persist_history.lock().push((key.clone(), file.clone()));
        if *self.fail_persist.lock() {
            return Err(StorageError::WriteFailed {
                key: key.to_string(),
                message: "Mock persist failure".to_string(),
            }
            .into());
        }
        self.inner.persist(key, file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OAuthTokens;
    use pretty_assertions::assert_eq;

    fn tokens(access: &str) -> OAuthTokens {
        OAuthTokens {
            access_token: access.to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: 1_700_000_000_000,
            scopes: ["user:inference".to_string()].into_iter().collect(),
            is_max: false,
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip_keeps_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team.json");
        std::fs::write(
            &path,
            r#"{
                "type": "oauth",
                "accountId": "acct-9",
                "client_api_key": "ck",
                "slack": {"webhook": "https://hooks.example.com/x"},
                "label": "team-a",
                "oauth": {
                    "accessToken": "a1",
                    "refreshToken": "rt",
                    "expiresAt": 1,
                    "scopes": [],
                    "isMax": false
                }
            }"#,
        )
        .unwrap();

        let store = FileCredentialStore::new();
        let key = CredentialKey::from(path.clone());
        let file = store.load(&key).await.unwrap();
        store.persist(&key, &file.with_oauth(tokens("a2"))).await.unwrap();

        let reloaded = store.load(&key).await.unwrap();
        assert_eq!(reloaded.oauth.as_ref().unwrap().access_token, "a2");
        assert_eq!(reloaded.account_id.as_deref(), Some("acct-9"));
        assert_eq!(reloaded.client_api_key.as_deref(), Some("ck"));
        assert_eq!(
            reloaded.slack,
            Some(serde_json::json!({"webhook": "https://hooks.example.com/x"}))
        );
        assert_eq!(reloaded.extra.get("label"), Some(&serde_json::json!("team-a")));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_persist_replaces_readable_file_with_private_one() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.json");
        std::fs::write(&path, r#"{"type":"api_key","api_key":"old"}"#).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileCredentialStore::new();
        let key = CredentialKey::from(path.clone());
        store.persist(&key, &CredentialFile::api_key("new")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let reloaded = store.load(&key).await.unwrap();
        assert_eq!(reloaded.api_key.as_deref(), Some("new"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_file_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::with_base_dir(dir.path());

        let missing = store.load(&CredentialKey::new("missing.json")).await;
        assert!(matches!(
            missing,
            Err(ResilienceError::Credential(CredentialError::NotFound { .. }))
        ));

        std::fs::write(dir.path().join("bad.json"), r#"{"oauth": {}}"#).unwrap();
        let bad = store.load(&CredentialKey::new("bad.json")).await;
        assert!(matches!(
            bad,
            Err(ResilienceError::Credential(CredentialError::Invalid { .. }))
        ));

        let no_dir = CredentialKey::new("nested/missing/dir.json");
        let written = store.persist(&no_dir, &CredentialFile::api_key("k")).await;
        assert!(matches!(
            written,
            Err(ResilienceError::Storage(StorageError::WriteFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_mock_store_failure_switches() {
        let store = MockCredentialStore::new();
        let key = CredentialKey::new("k");
        store.add_credential(key.clone(), &CredentialFile::oauth(tokens("a1")));

        store.set_fail_persist(true);
        assert!(store
            .persist(&key, &CredentialFile::oauth(tokens("a2")))
            .await
            .is_err());
        assert_eq!(store.stored(&key).unwrap().oauth.unwrap().access_token, "a1");
        assert_eq!(store.get_persist_history().len(), 1);

        store.set_fail_load(true);
        assert!(store.load(&key).await.is_err());
        assert_eq!(store.get_load_history(), vec![key]);
    }
}
