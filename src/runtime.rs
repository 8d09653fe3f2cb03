// src/runtime.rs

//! Runtime assembly
//!
//! [`Runtime`] wires the stores, the module registry and the package
//! center from a [`Config`] and owns them. There are no process-wide
//! instances; embedders create one runtime and share it.

use crate::config::Config;
use crate::error::Result;
use crate::layout::ArtifactLayout;
use crate::loader::{DylibLoader, Loader};
use crate::local::LocalStore;
use crate::package::PackageCenter;
use crate::registry::ModuleRegistry;
use crate::remote;
use crate::toolchain::Toolchain;
use crate::tunnel::{Module, Tunnel};
use crate::warehouse::Warehouse;
use std::sync::Arc;
use tracing::info;

pub struct Runtime {
    packages: PackageCenter,
    registry: Arc<ModuleRegistry>,
    warehouse: Arc<Warehouse>,
}

impl Runtime {
    /// Build a runtime for this process's toolchain that loads dynamic
    /// libraries
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_parts(config, Toolchain::current().clone(), Arc::new(DylibLoader::new()))
    }

    /// Build a runtime with an explicit fingerprint and loader
    pub fn with_parts(
        config: &Config,
        toolchain: Toolchain,
        loader: Arc<dyn Loader>,
    ) -> Result<Self> {
        config.validate()?;

        let warehouse = match config.local_root() {
            None => {
                info!("No local warehouse configured; only registered packages are available");
                Warehouse::unconfigured()
            }
            Some(root) => {
                let layout = ArtifactLayout::new(root, toolchain);
                info!(
                    "Warehouse at {} for {}",
                    layout.root().display(),
                    layout.toolchain()
                );
                let mut warehouse =
                    Warehouse::new(LocalStore::with_loader(layout.clone(), loader));
                if let Some(locator) = &config.warehouse.remote {
                    let remote = remote::from_locator(locator, layout)?;
                    info!("Remote store {}", remote.describe());
                    warehouse = warehouse.with_remote(remote);
                }
                if let Some(timeout) = config.load_timeout() {
                    warehouse = warehouse.with_load_timeout(timeout);
                }
                warehouse
            }
        };
        let warehouse = Arc::new(warehouse);

        let registry = Arc::new(ModuleRegistry::new(Arc::clone(&warehouse)));
        let mut packages = PackageCenter::new(Arc::clone(&registry));
        if let Some(ttl) = config.negative_ttl() {
            packages = packages.with_negative_ttl(ttl);
        }
        packages.use_namespace(&config.package.namespace)?;
        packages.use_default_version(&config.package.default_version)?;

        Ok(Self {
            packages,
            registry,
            warehouse,
        })
    }

    /// Resolve a package version, falling back to the default version
    pub async fn get_package(&self, package: &str, version: &str) -> Result<Arc<Module>> {
        self.packages.get_tunnel(package, version).await
    }

    pub async fn register_package(
        &self,
        package: &str,
        version: &str,
        tunnel: Arc<dyn Tunnel>,
    ) -> Result<Arc<Module>> {
        self.packages.register_package(package, version, tunnel).await
    }

    pub async fn close_package(&self, package: &str, version: &str) -> Result<bool> {
        self.packages.close_package(package, version).await
    }

    pub fn packages(&self) -> &PackageCenter {
        &self.packages
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn warehouse(&self) -> &Arc<Warehouse> {
        &self.warehouse
    }

    /// Close every loaded module
    pub async fn shutdown(&self) {
        self.packages.shutdown().await;
    }
}
