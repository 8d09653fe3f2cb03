// src/remote/mirror.rs

//! Directory mirror backend (`file://` locators)
//!
//! Serves objects from a local or network-mounted directory that uses the
//! remote key layout, e.g. an rsync'd copy of the bucket.

use super::ObjectStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

#[async_trait]
impl ObjectStore for MirrorStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NotFound(format!("{} in mirror {}", key, self.root.display()))
            } else {
                Error::SyncFailed(format!("failed to read {}: {}", path.display(), e))
            }
        })
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
