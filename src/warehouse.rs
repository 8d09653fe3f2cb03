// src/warehouse.rs

//! Warehouse: local presence check, remote sync on miss, load
//!
//! The warehouse keeps the "is it present" decision in the local store
//! and treats the remote purely as a fetch step:
//!
//! ```text
//! local.exists ──yes──────────────────────────────> local.load
//!      │no
//!      └─> remote.sync ──ok──> local.exists ──yes──> local.load
//!                                    │no
//!                                    └─> NotFound
//! ```
//!
//! An optional deadline bounds the whole sequence. A load that times out
//! after starting a sync removes the module directory, exactly like a
//! failed sync.

use crate::allowed;
use crate::error::{Error, Result};
use crate::local::LocalStore;
use crate::remote::Remote;
use crate::tunnel::Tunnel;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct Warehouse {
    local: Option<LocalStore>,
    remote: Option<Arc<dyn Remote>>,
    load_timeout: Option<Duration>,
}

impl Warehouse {
    /// A warehouse that can only serve locally present modules
    pub fn new(local: LocalStore) -> Self {
        Self {
            local: Some(local),
            remote: None,
            load_timeout: None,
        }
    }

    /// A warehouse with nothing configured; every load fails
    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Enable remote sync for modules missing locally
    pub fn with_remote(mut self, remote: Arc<dyn Remote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Bound each load, including any sync it triggers
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn local(&self) -> Option<&LocalStore> {
        self.local.as_ref()
    }

    pub fn remote(&self) -> Option<&Arc<dyn Remote>> {
        self.remote.as_ref()
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout
    }

    /// Resolve `name` to a tunnel, syncing it from the remote if needed
    pub async fn load(&self, name: &str) -> Result<Arc<dyn Tunnel>> {
        allowed::require_module_name(name)?;

        let Some(limit) = self.load_timeout else {
            return self.load_inner(name, &AtomicBool::new(false)).await;
        };

        let synced = AtomicBool::new(false);
        match tokio::time::timeout(limit, self.load_inner(name, &synced)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Loading module {} timed out after {:?}", name, limit);
                if synced.load(Ordering::Acquire) {
                    self.discard(name).await;
                }
                Err(Error::SyncFailed(format!(
                    "loading module {} timed out after {:?}",
                    name, limit
                )))
            }
        }
    }

    /// Sync `name` from the remote without loading it
    pub async fn prefetch(&self, name: &str) -> Result<()> {
        allowed::require_module_name(name)?;
        let local = self.local_store()?;
        if local.exists(name).await {
            debug!("Module {} is already present", name);
            return Ok(());
        }
        let remote = self.remote.as_ref().ok_or_else(|| {
            Error::NotConfigured(format!("no remote configured to fetch module {}", name))
        })?;
        remote.sync(name).await
    }

    fn local_store(&self) -> Result<&LocalStore> {
        self.local
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("no local warehouse configured".to_string()))
    }

    async fn load_inner(&self, name: &str, synced: &AtomicBool) -> Result<Arc<dyn Tunnel>> {
        let local = self.local_store()?;

        if !local.exists(name).await {
            let Some(remote) = self.remote.as_ref() else {
                return Err(Error::NotFound(format!(
                    "module {} is not in the local warehouse and no remote is configured",
                    name
                )));
            };

            info!("Module {} not present locally, syncing from {}", name, remote.describe());
            synced.store(true, Ordering::Release);
            remote.sync(name).await?;

            if !local.exists(name).await {
                return Err(Error::NotFound(format!(
                    "module {} is still missing after a successful sync",
                    name
                )));
            }
        }

        local.load(name).await
    }

    async fn discard(&self, name: &str) {
        let Some(local) = self.local.as_ref() else {
            return;
        };
        let dir = local.layout().module_dir(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed partial module directory {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }
}
