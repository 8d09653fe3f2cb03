// src/local.rs

//! Local artifact store
//!
//! Answers "is this module usable from disk" and hands the primary
//! artifact to the configured [`Loader`]. Presence policy:
//! - the primary artifact must exist with a non-zero size
//! - the secondary artifact may be absent, but if it exists it must be
//!   non-empty and its metadata readable

use crate::error::{Error, Result};
use crate::layout::{ArtifactKind, ArtifactLayout};
use crate::loader::{DylibLoader, Loader};
use crate::tunnel::Tunnel;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// What was found on disk for one artifact
#[derive(Debug)]
enum Presence {
    Ready,
    Missing,
    Empty,
    Unreadable(io::Error),
}

async fn presence(path: &Path) -> Presence {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Presence::Ready,
        Ok(_) => Presence::Empty,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Presence::Missing,
        Err(e) => Presence::Unreadable(e),
    }
}

/// Module artifacts below one warehouse root
#[derive(Clone)]
pub struct LocalStore {
    layout: ArtifactLayout,
    loader: Arc<dyn Loader>,
}

impl LocalStore {
    /// Create a store that loads platform dynamic libraries
    pub fn new(layout: ArtifactLayout) -> Self {
        Self::with_loader(layout, Arc::new(DylibLoader::new()))
    }

    /// Create a store with a custom loading mechanism
    pub fn with_loader(layout: ArtifactLayout, loader: Arc<dyn Loader>) -> Self {
        Self { layout, loader }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Whether all artifacts needed to load `name` are present
    pub async fn exists(&self, name: &str) -> bool {
        for artifact in ArtifactLayout::artifacts(name) {
            let path = self.layout.artifact_path(name, &artifact.file_name);
            match (artifact.kind, presence(&path).await) {
                (_, Presence::Ready) => {}
                (ArtifactKind::Secondary, Presence::Missing) => {}
                (_, Presence::Missing) => {
                    debug!("Module {} is missing {}", name, path.display());
                    return false;
                }
                (_, Presence::Empty) => {
                    debug!("Module {} has an empty artifact {}", name, path.display());
                    return false;
                }
                (_, Presence::Unreadable(e)) => {
                    debug!("Cannot stat {} for module {}: {}", path.display(), name, e);
                    return false;
                }
            }
        }
        true
    }

    /// Load the module's primary artifact
    ///
    /// Runs the loader on a blocking thread.
    pub async fn load(&self, name: &str) -> Result<Arc<dyn Tunnel>> {
        let path = self.layout.primary_path(name);
        let loader = Arc::clone(&self.loader);

        debug!("Loading module {} from {}", name, path.display());
        tokio::task::spawn_blocking(move || loader.load(&path))
            .await
            .map_err(|e| Error::LoadFailed(format!("loader task for {} failed: {}", name, e)))?
    }
}
