// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dynamod::{
    ArtifactLayout, Error, Loader, LocalStore, ModuleRegistry, ObjectRemote, ObjectStore,
    PackageCenter, Result, Toolchain, Tunnel, TunnelError, Warehouse,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Fingerprint used by every fixture
pub fn toolchain() -> Toolchain {
    Toolchain::new("linux", "amd64", "rustc-test", "generic")
}

/// Tunnel that answers with its label and counts lifecycle calls
#[derive(Default)]
pub struct CountingTunnel {
    pub label: String,
    pub inits: AtomicUsize,
    pub invokes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl CountingTunnel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Tunnel for CountingTunnel {
    fn init(&self) -> std::result::Result<(), TunnelError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn invoke(&self, _method: &str, _payload: &str) -> String {
        self.invokes.fetch_add(1, Ordering::SeqCst);
        self.label.clone()
    }

    fn close(&self) -> std::result::Result<(), TunnelError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Loader that turns an artifact's contents into a [`CountingTunnel`]
///
/// Every tunnel it creates is kept so tests can count loads and
/// lifecycle calls.
#[derive(Default)]
pub struct FixtureLoader {
    created: Mutex<Vec<Arc<CountingTunnel>>>,
}

impl FixtureLoader {
    pub fn created(&self) -> Vec<Arc<CountingTunnel>> {
        self.created.lock().clone()
    }

    pub fn loads(&self) -> usize {
        self.created.lock().len()
    }
}

impl Loader for FixtureLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Tunnel>> {
        let label = std::fs::read_to_string(path)
            .map_err(|e| Error::LoadFailed(format!("{}: {}", path.display(), e)))?;
        // Widen the window for concurrent callers.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let tunnel = Arc::new(CountingTunnel::new(label));
        self.created.lock().push(Arc::clone(&tunnel));
        Ok(tunnel)
    }
}

enum Object {
    Data(Vec<u8>),
    Broken,
}

/// In-memory object backend that counts fetches
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Object>>,
    fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn put(&self, key: String, data: &[u8]) {
        self.objects.lock().insert(key, Object::Data(data.to_vec()));
    }

    /// Make fetches of `key` fail with a transient error
    pub fn break_object(&self, key: String) {
        self.objects.lock().insert(key, Object::Broken);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.objects.lock().get(key) {
            Some(Object::Data(data)) => Ok(data.clone()),
            Some(Object::Broken) => Err(Error::SyncFailed(format!("connection reset: {}", key))),
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    fn describe(&self) -> String {
        "memory://fixture".to_string()
    }
}

/// A package center over a temporary warehouse and an in-memory remote
pub struct Fixture {
    pub dir: TempDir,
    pub layout: ArtifactLayout,
    pub store: Arc<MemoryStore>,
    pub loader: Arc<FixtureLoader>,
    pub warehouse: Arc<Warehouse>,
    pub center: Arc<PackageCenter>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("warehouse"), toolchain());
        let store = Arc::new(MemoryStore::default());
        let loader = Arc::new(FixtureLoader::default());

        let local = LocalStore::with_loader(layout.clone(), loader.clone());
        let remote = ObjectRemote::new(store.clone(), layout.clone());
        let warehouse = Arc::new(Warehouse::new(local).with_remote(Arc::new(remote)));
        let registry = Arc::new(ModuleRegistry::new(Arc::clone(&warehouse)));
        let center = Arc::new(PackageCenter::new(registry));

        Self {
            dir,
            layout,
            store,
            loader,
            warehouse,
            center,
        }
    }

    pub fn primary_key(&self, module: &str) -> String {
        self.layout
            .remote_key("", module, &ArtifactLayout::primary_file_name(module))
    }

    pub fn secondary_key(&self, module: &str) -> String {
        self.layout
            .remote_key("", module, &ArtifactLayout::secondary_file_name(module))
    }

    /// Publish a module remotely; its tunnels answer with the module name
    pub fn publish(&self, module: &str) {
        self.store.put(self.primary_key(module), module.as_bytes());
        self.store.put(self.secondary_key(module), b"native");
    }

    /// Install a module's primary artifact locally only
    pub fn install_local(&self, module: &str) {
        std::fs::create_dir_all(self.layout.module_dir(module)).unwrap();
        std::fs::write(self.layout.primary_path(module), module).unwrap();
    }
}
