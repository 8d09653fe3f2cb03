// src/loader.rs

//! Turning an artifact on disk into a tunnel
//!
//! The [`Loader`] trait is the only place that knows how an artifact
//! becomes a callable object. [`DylibLoader`] opens platform dynamic
//! libraries; embedders and tests can substitute their own mechanism.
//!
//! # Module binary contract
//!
//! A module library exports one of two symbols, tried in order:
//!
//! 1. `DYNAMOD_TUNNEL` - a [`SingletonExport`] pointing at a static tunnel
//! 2. `DYNAMOD_NEW` - a [`FactoryExport`] with a zero-argument constructor
//!
//! Both carry [`EXPORT_ABI_VERSION`] and the rustc version that built the
//! module. Module crates declare them with [`export_tunnel!`](crate::export_tunnel).

use crate::error::{Error, Result};
use crate::toolchain::BUILD_RUSTC;
use crate::tunnel::{Tunnel, TunnelError};
use libloading::Library;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Layout version of the export structs
pub const EXPORT_ABI_VERSION: u32 = 1;

/// Symbol of a pre-constructed tunnel
pub const SINGLETON_SYMBOL: &[u8] = b"DYNAMOD_TUNNEL\0";

/// Symbol of a tunnel factory
pub const FACTORY_SYMBOL: &[u8] = b"DYNAMOD_NEW\0";

/// Export of a pre-constructed tunnel
#[repr(C)]
pub struct SingletonExport {
    pub abi_version: u32,
    pub rustc: &'static str,
    pub tunnel: &'static dyn Tunnel,
}

/// Export of a tunnel constructor
#[repr(C)]
pub struct FactoryExport {
    pub abi_version: u32,
    pub rustc: &'static str,
    pub new: fn() -> Box<dyn Tunnel>,
}

/// Opens an artifact and resolves its tunnel
pub trait Loader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Tunnel>>;
}

// dlopen is not reentrant on every platform.
static DLOPEN_LOCK: Mutex<()> = Mutex::new(());

/// Loader for platform dynamic libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }

    fn check_abi(path: &Path, symbol: &str, abi_version: u32) -> Result<()> {
        if abi_version != EXPORT_ABI_VERSION {
            return Err(Error::InvalidHandleType(format!(
                "{} in {} has export ABI {}, expected {}",
                symbol,
                path.display(),
                abi_version,
                EXPORT_ABI_VERSION
            )));
        }
        Ok(())
    }

    fn check_rustc(path: &Path, symbol: &str, rustc: &str) -> Result<()> {
        if rustc != BUILD_RUSTC {
            return Err(Error::InvalidHandleType(format!(
                "{} in {} was built by {}, this runtime by {}",
                symbol,
                path.display(),
                rustc,
                BUILD_RUSTC
            )));
        }
        Ok(())
    }
}

impl Loader for DylibLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Tunnel>> {
        let _guard = DLOPEN_LOCK.lock();

        debug!("Opening module library {}", path.display());
        // SAFETY: running a library's initializers is inherent to loading
        // modules; artifacts come from the warehouse for our fingerprint.
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::LoadFailed(format!("{}: {}", path.display(), e)))?;

        // SAFETY: by contract these symbols are statics of the export
        // types; only their addresses are taken here.
        let singleton = unsafe { library.get::<*const SingletonExport>(SINGLETON_SYMBOL) }
            .ok()
            .map(|symbol| *symbol);
        let factory = unsafe { library.get::<*const FactoryExport>(FACTORY_SYMBOL) }
            .ok()
            .map(|symbol| *symbol);

        let inner = if let Some(export) = singleton {
            // SAFETY: the ABI version is the first field of a repr(C)
            // struct and is checked before any other field is read.
            let export = unsafe { &*export };
            Self::check_abi(path, "DYNAMOD_TUNNEL", export.abi_version)?;
            Self::check_rustc(path, "DYNAMOD_TUNNEL", export.rustc)?;
            debug!("Resolved singleton tunnel in {}", path.display());
            TunnelRef::Static(export.tunnel)
        } else if let Some(export) = factory {
            // SAFETY: as above, for a FactoryExport.
            let export = unsafe { &*export };
            Self::check_abi(path, "DYNAMOD_NEW", export.abi_version)?;
            Self::check_rustc(path, "DYNAMOD_NEW", export.rustc)?;
            debug!("Constructing tunnel from factory in {}", path.display());
            TunnelRef::Owned((export.new)())
        } else {
            return Err(Error::SymbolNotFound(format!(
                "{} exports neither DYNAMOD_TUNNEL nor DYNAMOD_NEW",
                path.display()
            )));
        };

        Ok(Arc::new(LibraryTunnel {
            inner,
            _library: library,
        }))
    }
}

enum TunnelRef {
    /// Points into the library's data; valid while the library is loaded
    Static(&'static dyn Tunnel),
    Owned(Box<dyn Tunnel>),
}

/// A tunnel that keeps its library loaded
///
/// Field order matters: the tunnel is dropped before the library.
struct LibraryTunnel {
    inner: TunnelRef,
    _library: Library,
}

impl LibraryTunnel {
    fn tunnel(&self) -> &dyn Tunnel {
        match &self.inner {
            TunnelRef::Static(tunnel) => *tunnel,
            TunnelRef::Owned(tunnel) => tunnel.as_ref(),
        }
    }
}

impl Tunnel for LibraryTunnel {
    fn init(&self) -> std::result::Result<(), TunnelError> {
        self.tunnel().init()
    }

    fn invoke(&self, method: &str, payload: &str) -> String {
        self.tunnel().invoke(method, payload)
    }

    fn close(&self) -> std::result::Result<(), TunnelError> {
        self.tunnel().close()
    }
}

/// Declare the tunnel exported by a module library
///
/// The crate must be built as a `cdylib` with the same toolchain as the
/// runtime that loads it.
///
/// ```ignore
/// // A pre-constructed instance; must be a static
/// static ECHO: EchoTunnel = EchoTunnel;
/// dynamod::export_tunnel!(singleton: ECHO);
///
/// // Or a constructor returning a type that implements Tunnel
/// dynamod::export_tunnel!(factory: EchoTunnel::new);
/// ```
#[macro_export]
macro_rules! export_tunnel {
    (singleton: $tunnel:path) => {
        #[unsafe(no_mangle)]
        pub static DYNAMOD_TUNNEL: $crate::loader::SingletonExport =
            $crate::loader::SingletonExport {
                abi_version: $crate::loader::EXPORT_ABI_VERSION,
                rustc: $crate::toolchain::BUILD_RUSTC,
                tunnel: &$tunnel,
            };
    };
    (factory: $new:path) => {
        #[unsafe(no_mangle)]
        pub static DYNAMOD_NEW: $crate::loader::FactoryExport = $crate::loader::FactoryExport {
            abi_version: $crate::loader::EXPORT_ABI_VERSION,
            rustc: $crate::toolchain::BUILD_RUSTC,
            new: {
                fn __dynamod_new() -> ::std::boxed::Box<dyn $crate::Tunnel> {
                    ::std::boxed::Box::new($new())
                }
                __dynamod_new
            },
        };
    };
}
