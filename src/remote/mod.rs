// src/remote/mod.rs

//! Remote artifact stores
//!
//! A [`Remote`] populates the local warehouse with a module's artifacts.
//! The stock implementation, [`ObjectRemote`], pairs the shared sync
//! algorithm with an [`ObjectStore`] backend chosen by locator scheme:
//! - `s3://bucket/prefix` - object storage (feature `s3`)
//! - `file:///path/to/mirror` - a directory with the remote key layout
//!
//! # Sync algorithm
//!
//! Every artifact of the module is handled by its own concurrent future:
//! non-empty local files are kept, empty ones are deleted and fetched
//! again, missing ones are fetched. All futures are joined before `sync`
//! returns. If any artifact fails, the module directory is removed so no
//! partial module survives; the call then fails with `NotFound` when any
//! failure was a missing remote object, `SyncFailed` otherwise. A missing
//! secondary artifact is not a failure, matching the local presence rule.

mod mirror;
#[cfg(feature = "s3")]
mod s3;

pub use mirror::MirrorStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

use crate::error::{Error, Result};
use crate::layout::{Artifact, ArtifactLayout};
use async_trait::async_trait;
use futures::future::join_all;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Fetches a module's artifacts into the local warehouse
#[async_trait]
pub trait Remote: Send + Sync {
    async fn sync(&self, name: &str) -> Result<()>;

    /// Human-readable description for logging
    fn describe(&self) -> String;
}

/// A flat key/value object backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object
    ///
    /// A missing object must be reported as [`Error::NotFound`]; every
    /// other failure as [`Error::SyncFailed`].
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    fn describe(&self) -> String;
}

/// Build the remote named by `locator`
///
/// Unknown schemes and malformed locators are configuration errors.
pub fn from_locator(locator: &str, layout: ArtifactLayout) -> Result<Arc<dyn Remote>> {
    let url = Url::parse(locator)
        .map_err(|e| Error::InvalidIdentity(format!("remote locator '{}': {}", locator, e)))?;

    match url.scheme() {
        #[cfg(feature = "s3")]
        "s3" => {
            let bucket = url.host_str().filter(|host| !host.is_empty()).ok_or_else(|| {
                Error::InvalidIdentity(format!("remote locator '{}' has no bucket", locator))
            })?;
            let store = S3Store::new(bucket);
            Ok(Arc::new(ObjectRemote::new(Arc::new(store), layout).with_prefix(url.path())))
        }
        "file" => {
            let root = url.to_file_path().map_err(|_| {
                Error::InvalidIdentity(format!("remote locator '{}' is not a local path", locator))
            })?;
            Ok(Arc::new(ObjectRemote::new(
                Arc::new(MirrorStore::new(root)),
                layout,
            )))
        }
        scheme => Err(Error::InvalidIdentity(format!(
            "unknown remote scheme '{}' in '{}'",
            scheme, locator
        ))),
    }
}

/// Sync algorithm over an object backend
pub struct ObjectRemote {
    store: Arc<dyn ObjectStore>,
    layout: ArtifactLayout,
    prefix: String,
}

impl ObjectRemote {
    pub fn new(store: Arc<dyn ObjectStore>, layout: ArtifactLayout) -> Self {
        Self {
            store,
            layout,
            prefix: String::new(),
        }
    }

    /// Place all keys below `prefix` in the backend
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_matches('/').to_string();
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    async fn sync_artifact(&self, name: &str, artifact: &Artifact) -> Result<()> {
        let path = self.layout.artifact_path(name, &artifact.file_name);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => {
                debug!("{} already exists", path.display());
                return Ok(());
            }
            Ok(_) => {
                debug!("{} is empty, fetching it again", path.display());
                tokio::fs::remove_file(&path).await.map_err(|e| {
                    Error::SyncFailed(format!("failed to remove {}: {}", path.display(), e))
                })?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::SyncFailed(format!(
                    "failed to stat {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        let key = self.layout.remote_key(&self.prefix, name, &artifact.file_name);
        debug!("{} not found, downloading {} from {}", path.display(), key, self.store.describe());

        let data = match self.store.fetch(&key).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() && !artifact.is_required() => {
                debug!("Optional artifact {} is not published", key);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Write next to the target, then rename, so a half-written file is
        // never mistaken for a complete artifact.
        let temp_path = path.with_file_name(format!("{}.part", artifact.file_name));
        let written = async {
            tokio::fs::write(&temp_path, &data).await?;
            let size = tokio::fs::metadata(&temp_path).await?.len();
            if size != data.len() as u64 {
                return Err(io::Error::other(format!(
                    "wrote {} of {} bytes",
                    size,
                    data.len()
                )));
            }
            tokio::fs::rename(&temp_path, &path).await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::SyncFailed(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Downloaded {} ({} bytes)", path.display(), data.len());
        Ok(())
    }
}

#[async_trait]
impl Remote for ObjectRemote {
    async fn sync(&self, name: &str) -> Result<()> {
        let dir = self.layout.module_dir(name);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::SyncFailed(format!("failed to create {}: {}", dir.display(), e))
        })?;

        let started = Instant::now();
        let artifacts = ArtifactLayout::artifacts(name);
        let outcomes = join_all(
            artifacts
                .iter()
                .map(|artifact| self.sync_artifact(name, artifact)),
        )
        .await;

        let failures: Vec<(&Artifact, Error)> = artifacts
            .iter()
            .zip(outcomes)
            .filter_map(|(artifact, outcome)| outcome.err().map(|e| (artifact, e)))
            .collect();

        if failures.is_empty() {
            info!(
                "Synced module {} from {} in {:?}",
                name,
                self.store.describe(),
                started.elapsed()
            );
            return Ok(());
        }

        warn!("{} errors occurred while syncing module {}", failures.len(), name);
        for (artifact, err) in &failures {
            warn!("  {}: {}", artifact.file_name, err);
        }

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!("Failed to remove partial module directory {}: {}", dir.display(), e);
        }

        if failures.iter().any(|(_, err)| err.is_not_found()) {
            return Err(Error::NotFound(format!(
                "module {} is not published for {}",
                name,
                self.layout.toolchain()
            )));
        }

        let detail: Vec<String> = failures
            .iter()
            .map(|(artifact, err)| format!("{}: {}", artifact.file_name, err))
            .collect();
        Err(Error::SyncFailed(format!(
            "module {}: {}",
            name,
            detail.join("; ")
        )))
    }

    fn describe(&self) -> String {
        if self.prefix.is_empty() {
            self.store.describe()
        } else {
            format!("{}/{}", self.store.describe(), self.prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::Toolchain;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    /// In-memory backend; keys mapped to `None` fail transiently
    #[derive(Default)]
    struct MemoryStore {
        objects: HashMap<String, Option<Vec<u8>>>,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
            self.fetched.lock().push(key.to_string());
            match self.objects.get(key) {
                Some(Some(data)) => Ok(data.clone()),
                Some(None) => Err(Error::SyncFailed(format!("connection reset on {}", key))),
                None => Err(Error::NotFound(key.to_string())),
            }
        }

        fn describe(&self) -> String {
            "memory://".to_string()
        }
    }

    fn layout(root: &Path) -> ArtifactLayout {
        ArtifactLayout::new(root, Toolchain::new("linux", "amd64", "gc", "generic"))
    }

    fn key(layout: &ArtifactLayout, file_name: String) -> String {
        layout.remote_key("", "billing", &file_name)
    }

    #[tokio::test]
    async fn test_sync_downloads_all_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(temp_dir.path());
        let mut store = MemoryStore::default();
        store.objects.insert(
            key(&layout, ArtifactLayout::primary_file_name("billing")),
            Some(b"primary".to_vec()),
        );
        store.objects.insert(
            key(&layout, ArtifactLayout::secondary_file_name("billing")),
            Some(b"secondary".to_vec()),
        );

        let remote = ObjectRemote::new(Arc::new(store), layout.clone());
        remote.sync("billing").await.unwrap();

        let primary = std::fs::read(layout.primary_path("billing")).unwrap();
        assert_eq!(primary, b"primary");
    }

    #[tokio::test]
    async fn test_missing_secondary_is_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(temp_dir.path());
        let mut store = MemoryStore::default();
        store.objects.insert(
            key(&layout, ArtifactLayout::primary_file_name("billing")),
            Some(b"primary".to_vec()),
        );

        let remote = ObjectRemote::new(Arc::new(store), layout.clone());
        remote.sync("billing").await.unwrap();
        assert!(layout.primary_path("billing").exists());
    }

    #[tokio::test]
    async fn test_missing_primary_is_not_found_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(temp_dir.path());
        let mut store = MemoryStore::default();
        store.objects.insert(
            key(&layout, ArtifactLayout::secondary_file_name("billing")),
            Some(b"secondary".to_vec()),
        );

        let remote = ObjectRemote::new(Arc::new(store), layout.clone());
        let err = remote.sync("billing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!layout.module_dir("billing").exists());
    }

    #[tokio::test]
    async fn test_transient_failure_is_sync_failed_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(temp_dir.path());
        let mut store = MemoryStore::default();
        store.objects.insert(
            key(&layout, ArtifactLayout::primary_file_name("billing")),
            Some(b"primary".to_vec()),
        );
        store.objects.insert(
            key(&layout, ArtifactLayout::secondary_file_name("billing")),
            None,
        );

        let remote = ObjectRemote::new(Arc::new(store), layout.clone());
        let err = remote.sync("billing").await.unwrap_err();
        assert!(matches!(err, Error::SyncFailed(_)));
        assert!(!layout.module_dir("billing").exists());
    }

    #[tokio::test]
    async fn test_present_files_are_skipped_and_empty_ones_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(temp_dir.path());
        std::fs::create_dir_all(layout.module_dir("billing")).unwrap();
        std::fs::write(layout.primary_path("billing"), b"cached").unwrap();
        let secondary = layout.artifact_path("billing", &ArtifactLayout::secondary_file_name("billing"));
        std::fs::write(&secondary, b"").unwrap();

        let mut store = MemoryStore::default();
        let secondary_key = key(&layout, ArtifactLayout::secondary_file_name("billing"));
        store.objects.insert(secondary_key.clone(), Some(b"fresh".to_vec()));
        let store = Arc::new(store);

        let remote = ObjectRemote::new(store.clone(), layout.clone());
        remote.sync("billing").await.unwrap();

        assert_eq!(*store.fetched.lock(), vec![secondary_key]);
        assert_eq!(std::fs::read(layout.primary_path("billing")).unwrap(), b"cached");
        assert_eq!(std::fs::read(&secondary).unwrap(), b"fresh");
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = from_locator("ftp://example.com/modules", layout(temp_dir.path()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidIdentity(_)));
    }

    #[test]
    fn test_malformed_locator_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        assert!(from_locator("not a url", layout(temp_dir.path())).is_err());
    }

    #[test]
    fn test_file_locator() {
        let temp_dir = TempDir::new().unwrap();
        let locator = Url::from_directory_path(temp_dir.path()).unwrap().to_string();
        let remote = from_locator(&locator, layout(temp_dir.path())).unwrap();
        assert!(remote.describe().starts_with("file://"));
    }
}
