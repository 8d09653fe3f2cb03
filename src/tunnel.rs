// src/tunnel.rs

//! Loaded module handles
//!
//! A [`Tunnel`] is what a module exports: an object that is initialized
//! once, invoked any number of times, and closed once. The registry wraps
//! every tunnel it owns in a [`Module`], which enforces the lifecycle so
//! tunnel implementations don't have to.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Failure reported by a tunnel's own lifecycle hooks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TunnelError(pub String);

impl TunnelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Callable interface of a loaded module
///
/// Method names and payloads are opaque to the runtime.
pub trait Tunnel: Send + Sync {
    /// Called exactly once, after loading and before the first invoke
    fn init(&self) -> std::result::Result<(), TunnelError> {
        Ok(())
    }

    fn invoke(&self, method: &str, payload: &str) -> String;

    /// Called exactly once, when the owning registry evicts the module
    fn close(&self) -> std::result::Result<(), TunnelError> {
        Ok(())
    }
}

/// A tunnel owned by the module registry
pub struct Module {
    name: String,
    tunnel: Arc<dyn Tunnel>,
    closed: AtomicBool,
}

impl Module {
    pub(crate) fn new(name: impl Into<String>, tunnel: Arc<dyn Tunnel>) -> Self {
        Self {
            name: name.into(),
            tunnel,
            closed: AtomicBool::new(false),
        }
    }

    /// Fully-qualified registry name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Invoke a method on the module
    ///
    /// Fails with [`Error::Closed`] once the module has been closed.
    pub fn invoke(&self, method: &str, payload: &str) -> Result<String> {
        if self.is_closed() {
            return Err(Error::Closed(self.name.clone()));
        }
        Ok(self.tunnel.invoke(method, payload))
    }

    pub(crate) fn init(&self) -> Result<()> {
        self.tunnel.init().map_err(|e| Error::InitFailed {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Close the tunnel if it is still open
    ///
    /// Returns false when the module was already closed. Teardown errors
    /// are logged, never returned.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.tunnel.close() {
            Ok(()) => debug!("Closed module {}", self.name),
            Err(e) => warn!("Module {} reported an error while closing: {}", self.name, e),
        }
        true
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
