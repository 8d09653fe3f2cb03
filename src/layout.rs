// src/layout.rs

//! Artifact layout shared by the local and remote stores
//!
//! ```text
//! <root>/<fingerprint>/<module>/<artifact>      local path
//! [<prefix>/]<fingerprint>/<module>/<artifact>  remote key
//! ```
//!
//! Every module has a mandatory primary artifact (the module library) and
//! an optional secondary artifact (a native companion library). The
//! secondary artifact only counts against presence when it exists but is
//! empty or unreadable.

use crate::toolchain::Toolchain;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

/// Role of an artifact within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The module library, opened by the loader
    Primary,
    /// Native companion library linked by the primary
    Secondary,
}

/// One file belonging to a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub file_name: String,
}

impl Artifact {
    /// Whether the module is unusable without this file
    #[inline]
    pub fn is_required(&self) -> bool {
        self.kind == ArtifactKind::Primary
    }
}

/// Path and key construction for one warehouse root and fingerprint
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
    toolchain: Toolchain,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>, toolchain: Toolchain) -> Self {
        Self {
            root: root.into(),
            toolchain,
        }
    }

    /// Platform default warehouse root
    pub fn default_root() -> PathBuf {
        if cfg!(windows) {
            PathBuf::from("C:/warehouse")
        } else {
            PathBuf::from("/opt/warehouse")
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// `<root>/<fingerprint>`
    pub fn fingerprint_dir(&self) -> PathBuf {
        self.root.join(self.toolchain.render())
    }

    /// `<root>/<fingerprint>/<module>`
    pub fn module_dir(&self, name: &str) -> PathBuf {
        self.fingerprint_dir().join(name)
    }

    /// File name of the module library, e.g. `libmod_billing.so`
    pub fn primary_file_name(name: &str) -> String {
        format!("{}mod_{}{}", DLL_PREFIX, name, DLL_SUFFIX)
    }

    /// File name of the native companion, e.g. `libnative_billing.so`
    pub fn secondary_file_name(name: &str) -> String {
        format!("{}native_{}{}", DLL_PREFIX, name, DLL_SUFFIX)
    }

    /// All artifacts of a module, primary first
    pub fn artifacts(name: &str) -> Vec<Artifact> {
        vec![
            Artifact {
                kind: ArtifactKind::Primary,
                file_name: Self::primary_file_name(name),
            },
            Artifact {
                kind: ArtifactKind::Secondary,
                file_name: Self::secondary_file_name(name),
            },
        ]
    }

    pub fn artifact_path(&self, name: &str, file_name: &str) -> PathBuf {
        self.module_dir(name).join(file_name)
    }

    pub fn primary_path(&self, name: &str) -> PathBuf {
        self.artifact_path(name, &Self::primary_file_name(name))
    }

    /// Remote object key, always `/`-separated
    pub fn remote_key(&self, prefix: &str, name: &str, file_name: &str) -> String {
        let prefix = prefix.trim_matches('/');
        let fingerprint = self.toolchain.render();
        if prefix.is_empty() {
            format!("{}/{}/{}", fingerprint, name, file_name)
        } else {
            format!("{}/{}/{}/{}", prefix, fingerprint, name, file_name)
        }
    }
}
