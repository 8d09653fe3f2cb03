// src/registry.rs

//! Module registry
//!
//! Flat cache of loaded modules keyed by fully-qualified name. The
//! registry is the only owner that closes modules. Loads of one name are
//! single-flight: concurrent callers for the same name wait for the first
//! load and share its result, while other names load in parallel.
//!
//! Failed loads are not cached; the next `get` tries again.

use crate::error::Result;
use crate::flight::KeyedFlight;
use crate::tunnel::{Module, Tunnel};
use crate::warehouse::Warehouse;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ModuleRegistry {
    warehouse: Arc<Warehouse>,
    modules: Mutex<HashMap<String, Arc<Module>>>,
    flights: KeyedFlight<String>,
}

impl ModuleRegistry {
    pub fn new(warehouse: Arc<Warehouse>) -> Self {
        Self {
            warehouse,
            modules: Mutex::new(HashMap::new()),
            flights: KeyedFlight::new(),
        }
    }

    pub fn warehouse(&self) -> &Arc<Warehouse> {
        &self.warehouse
    }

    fn cached(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.lock().get(name).cloned()
    }

    /// Get a loaded module, loading and initializing it on first use
    pub async fn get(&self, name: &str) -> Result<Arc<Module>> {
        if let Some(module) = self.cached(name) {
            return Ok(module);
        }

        let _flight = self.flights.acquire(&name.to_string()).await;
        if let Some(module) = self.cached(name) {
            debug!("Module {} was loaded by a concurrent caller", name);
            return Ok(module);
        }

        let tunnel = self.warehouse.load(name).await?;
        let module = Arc::new(Module::new(name, tunnel));
        module.init()?;

        self.modules.lock().insert(name.to_string(), Arc::clone(&module));
        info!("Loaded module {}", name);
        Ok(module)
    }

    /// Install a tunnel under `name` without touching the warehouse
    ///
    /// The tunnel is initialized first. A module already registered under
    /// the same name is closed and replaced.
    pub async fn register(&self, name: &str, tunnel: Arc<dyn Tunnel>) -> Result<Arc<Module>> {
        let _flight = self.flights.acquire(&name.to_string()).await;

        let module = Arc::new(Module::new(name, tunnel));
        module.init()?;

        let previous = self
            .modules
            .lock()
            .insert(name.to_string(), Arc::clone(&module));
        if let Some(previous) = previous {
            debug!("Replacing registered module {}", name);
            previous.close();
        }
        info!("Registered module {}", name);
        Ok(module)
    }

    /// Close and evict the module registered under `name`
    ///
    /// Returns false when nothing was registered. Teardown errors are
    /// logged by the module and never surface here.
    pub async fn close(&self, name: &str) -> bool {
        let _flight = self.flights.acquire(&name.to_string()).await;

        let Some(module) = self.modules.lock().remove(name) else {
            return false;
        };
        module.close();
        true
    }

    /// Close `module` and evict it if it is still the registered instance
    pub async fn close_module(&self, module: &Arc<Module>) {
        let _flight = self.flights.acquire(&module.name().to_string()).await;

        {
            let mut modules = self.modules.lock();
            if modules
                .get(module.name())
                .is_some_and(|current| Arc::ptr_eq(current, module))
            {
                modules.remove(module.name());
            }
        }
        module.close();
    }

    /// Visit a snapshot of the registered modules
    ///
    /// The visitor returns false to stop early.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Arc<Module>) -> bool,
    {
        let snapshot: Vec<(String, Arc<Module>)> = self
            .modules
            .lock()
            .iter()
            .map(|(name, module)| (name.clone(), Arc::clone(module)))
            .collect();

        for (name, module) in &snapshot {
            if !visitor(name, module) {
                break;
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.lock().is_empty()
    }

    /// Close every registered module
    ///
    /// Loads already in progress finish first and their modules are
    /// closed with the rest.
    pub async fn close_all(&self) {
        let mut names: Vec<String> = self.modules.lock().keys().cloned().collect();
        for name in self.flights.keys() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return;
        }

        let mut closed = 0;
        for name in names {
            let _flight = self.flights.acquire(&name).await;
            let Some(module) = self.modules.lock().remove(&name) else {
                continue;
            };
            module.close();
            closed += 1;
        }
        info!("Closed {} modules", closed);
    }
}
