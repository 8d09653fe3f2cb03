// src/package.rs

//! Package center: versioned identities on top of the module registry
//!
//! A package identity is `(namespace, package, version)` and maps to the
//! registry name `namespace_package_version`. Lookups fall back from the
//! requested version to the configured default version exactly once:
//!
//! ```text
//! requested ──found──> cache(requested)
//!     │not found
//!     └─> default ──found──> cache(requested, default)
//!             │not found
//!             └─> tombstone(requested, default), NotFound
//! ```
//!
//! Tombstones make repeated lookups of absent packages answer from memory
//! instead of syncing again. They live until the identity is closed or
//! registered, the default version changes, or the optional TTL expires.
//! Only `NotFound` is ever cached; every other failure propagates as is.

use crate::allowed;
use crate::error::{Error, Result};
use crate::flight::KeyedFlight;
use crate::registry::ModuleRegistry;
use crate::tunnel::{Module, Tunnel};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const NAMESPACE_DEFAULT: &str = "default";
pub const VERSION_DEFAULT: &str = "default";
/// Reserved version name; not part of the fallback chain
pub const VERSION_LATEST: &str = "latest";

/// Identity of one package version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIndex {
    namespace: String,
    package: String,
    version: String,
}

impl PackageIndex {
    /// Build an index, rejecting components that are not keywords
    pub fn new(namespace: &str, package: &str, version: &str) -> Result<Self> {
        allowed::require_keyword("namespace", namespace)?;
        allowed::require_keyword("package", package)?;
        allowed::require_keyword("version", version)?;
        Ok(Self {
            namespace: namespace.to_string(),
            package: package.to_string(),
            version: version.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Same package under another, already validated, version
    fn with_version(&self, version: &str) -> Self {
        Self {
            namespace: self.namespace.clone(),
            package: self.package.clone(),
            version: version.to_string(),
        }
    }

    /// Registry name of this identity
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PackageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.namespace, self.package, self.version)
    }
}

#[derive(Clone)]
enum Resolution {
    Loaded(Arc<Module>),
    Absent { recorded_at: Instant },
}

/// Outcome of a cache lookup
enum Cached {
    Hit(Arc<Module>),
    Tombstone,
    Miss,
}

struct Settings {
    namespace: String,
    default_version: String,
}

pub struct PackageCenter {
    registry: Arc<ModuleRegistry>,
    settings: RwLock<Settings>,
    entries: Mutex<HashMap<PackageIndex, Resolution>>,
    flights: KeyedFlight<PackageIndex>,
    negative_ttl: Option<Duration>,
}

impl PackageCenter {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            settings: RwLock::new(Settings {
                namespace: NAMESPACE_DEFAULT.to_string(),
                default_version: VERSION_DEFAULT.to_string(),
            }),
            entries: Mutex::new(HashMap::new()),
            flights: KeyedFlight::new(),
            negative_ttl: None,
        }
    }

    /// Expire tombstones after `ttl`
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = Some(ttl);
        self
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn namespace(&self) -> String {
        self.settings.read().namespace.clone()
    }

    pub fn default_version(&self) -> String {
        self.settings.read().default_version.clone()
    }

    pub fn use_namespace(&self, namespace: &str) -> Result<()> {
        allowed::require_keyword("namespace", namespace)?;
        self.settings.write().namespace = namespace.to_string();
        debug!("Package namespace set to {}", namespace);
        Ok(())
    }

    /// Change the fallback version
    ///
    /// Tombstones recorded against the previous default no longer hold and
    /// are dropped.
    pub fn use_default_version(&self, version: &str) -> Result<()> {
        allowed::require_keyword("version", version)?;
        {
            let mut settings = self.settings.write();
            if settings.default_version == version {
                return Ok(());
            }
            settings.default_version = version.to_string();
        }
        self.entries
            .lock()
            .retain(|_, resolution| matches!(resolution, Resolution::Loaded(_)));
        debug!("Default package version set to {}", version);
        Ok(())
    }

    fn index(&self, package: &str, version: &str) -> Result<(PackageIndex, String)> {
        let (namespace, default_version) = {
            let settings = self.settings.read();
            (settings.namespace.clone(), settings.default_version.clone())
        };
        Ok((PackageIndex::new(&namespace, package, version)?, default_version))
    }

    fn lookup(&self, index: &PackageIndex) -> Cached {
        let mut entries = self.entries.lock();
        let stale = match entries.get(index) {
            None => return Cached::Miss,
            Some(Resolution::Loaded(module)) if !module.is_closed() => {
                return Cached::Hit(Arc::clone(module));
            }
            Some(Resolution::Loaded(_)) => true,
            Some(Resolution::Absent { recorded_at }) => self
                .negative_ttl
                .is_some_and(|ttl| recorded_at.elapsed() >= ttl),
        };
        if stale {
            entries.remove(index);
            return Cached::Miss;
        }
        Cached::Tombstone
    }

    fn cache(&self, index: &PackageIndex, module: &Arc<Module>) {
        self.entries
            .lock()
            .insert(index.clone(), Resolution::Loaded(Arc::clone(module)));
    }

    /// Record identities as absent, keeping any that resolved meanwhile
    fn tombstone(&self, indexes: &[&PackageIndex]) {
        let recorded_at = Instant::now();
        let mut entries = self.entries.lock();
        for index in indexes {
            if let Some(Resolution::Loaded(module)) = entries.get(*index)
                && !module.is_closed()
            {
                debug!("Package {} resolved concurrently, not recording absence", index);
                continue;
            }
            entries.insert((*index).clone(), Resolution::Absent { recorded_at });
        }
    }

    fn not_found(requested: &PackageIndex, default_version: &str) -> Error {
        Error::NotFound(format!(
            "package {} not found in version {} nor default version {}",
            requested.package(),
            requested.version(),
            default_version
        ))
    }

    /// Resolve a package version to a loaded module
    ///
    /// Falls back to the default version when the requested one does not
    /// exist. Concurrent lookups of the same identity share one
    /// resolution.
    pub async fn get_tunnel(&self, package: &str, version: &str) -> Result<Arc<Module>> {
        let (requested, default_version) = self.index(package, version)?;

        match self.lookup(&requested) {
            Cached::Hit(module) => return Ok(module),
            Cached::Tombstone => return Err(Self::not_found(&requested, &default_version)),
            Cached::Miss => {}
        }

        let _flight = self.flights.acquire(&requested).await;
        match self.lookup(&requested) {
            Cached::Hit(module) => return Ok(module),
            Cached::Tombstone => return Err(Self::not_found(&requested, &default_version)),
            Cached::Miss => {}
        }

        match self.registry.get(&requested.name()).await {
            Ok(module) => {
                self.cache(&requested, &module);
                return Ok(module);
            }
            Err(e) if e.is_not_found() => {
                debug!("Package {} not found: {}", requested, e);
            }
            Err(e) => return Err(e),
        }

        if requested.version() == default_version {
            self.tombstone(&[&requested]);
            return Err(Self::not_found(&requested, &default_version));
        }

        let fallback = requested.with_version(&default_version);
        match self.lookup(&fallback) {
            Cached::Hit(module) => {
                info!("Package {} resolved to default version {}", requested, fallback);
                self.cache(&requested, &module);
                return Ok(module);
            }
            Cached::Tombstone => {
                self.tombstone(&[&requested]);
                return Err(Self::not_found(&requested, &default_version));
            }
            Cached::Miss => {}
        }

        match self.registry.get(&fallback.name()).await {
            Ok(module) => {
                info!("Package {} resolved to default version {}", requested, fallback);
                self.cache(&requested, &module);
                self.cache(&fallback, &module);
                Ok(module)
            }
            Err(e) if e.is_not_found() => {
                debug!("Default package {} not found: {}", fallback, e);
                self.tombstone(&[&requested, &fallback]);
                Err(Self::not_found(&requested, &default_version))
            }
            Err(e) => Err(e),
        }
    }

    /// Install a tunnel for a package version without touching the stores
    pub async fn register_package(
        &self,
        package: &str,
        version: &str,
        tunnel: Arc<dyn Tunnel>,
    ) -> Result<Arc<Module>> {
        let (index, _) = self.index(package, version)?;
        let _flight = self.flights.acquire(&index).await;

        let module = self.registry.register(&index.name(), tunnel).await?;
        self.cache(&index, &module);
        Ok(module)
    }

    /// Close a package version
    ///
    /// The module is closed once through the registry and every identity
    /// aliasing it is evicted, so the next lookup loads it again. A module
    /// registered under the identity without a cached resolution is closed
    /// too. Returns false when there was neither.
    pub async fn close_package(&self, package: &str, version: &str) -> Result<bool> {
        let (index, _) = self.index(package, version)?;
        let _flight = self.flights.acquire(&index).await;
        let name = index.name();

        let (cached, module) = {
            let mut entries = self.entries.lock();
            match entries.remove(&index) {
                None => (false, None),
                Some(Resolution::Absent { .. }) => (true, None),
                Some(Resolution::Loaded(module)) => {
                    entries.retain(|_, resolution| match resolution {
                        Resolution::Loaded(other) => !Arc::ptr_eq(other, &module),
                        Resolution::Absent { .. } => true,
                    });
                    (true, Some(module))
                }
            }
        };

        if let Some(module) = module {
            info!("Closing package {} ({})", index, module.name());
            self.registry.close_module(&module).await;
        }
        // The registry may still hold this identity without a matching
        // cached resolution, e.g. registered directly or replaced since.
        if self.registry.close(&name).await {
            info!("Closed registry module {}", name);
            return Ok(true);
        }
        Ok(cached)
    }

    /// Drop all cached resolutions and close every registry module
    pub async fn shutdown(&self) {
        self.entries.lock().clear();
        self.registry.close_all().await;
    }
}
