// src/lib.rs

//! Dynamod dynamic module runtime
//!
//! Resolves a package identity `(namespace, package, version)` to a
//! loaded, callable module, fetching the module's binary artifacts from a
//! remote store when they are missing locally.
//!
//! # Architecture
//!
//! - Fingerprint: artifacts are keyed by `os_arch_compiler_variant`
//! - Warehouse: local store first, remote sync on miss
//! - Registry: one live instance per module name, initialized once
//! - Package center: version fallback and negative caching on top
//!
//! ```text
//! PackageCenter -> ModuleRegistry -> Warehouse -> LocalStore -> Loader
//!                                        \-> Remote (sync on miss)
//! ```

pub mod allowed;
pub mod config;
mod error;
mod flight;
pub mod layout;
pub mod loader;
pub mod local;
pub mod package;
pub mod registry;
pub mod remote;
pub mod runtime;
pub mod toolchain;
pub mod tunnel;
pub mod warehouse;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use layout::ArtifactLayout;
pub use loader::{DylibLoader, Loader};
pub use local::LocalStore;
pub use package::{PackageCenter, PackageIndex, VERSION_DEFAULT, VERSION_LATEST};
pub use registry::ModuleRegistry;
pub use remote::{ObjectRemote, ObjectStore, Remote};
pub use runtime::Runtime;
pub use toolchain::Toolchain;
pub use tunnel::{Module, Tunnel, TunnelError};
pub use warehouse::Warehouse;
