// src/toolchain.rs

//! Toolchain fingerprint
//!
//! Artifacts are only loadable by a process built with a compatible
//! toolchain. The fingerprint `os_arch_compiler_variant` names that
//! compatibility class and is the first path component below the
//! warehouse root, both locally and remotely.
//!
//! Each field is resolved once per process, in this order:
//! 1. A constant injected at build time (`DYNAMOD_BUILD_OS`, ...)
//! 2. A runtime environment variable (`DYNAMOD_OS`, ...)
//! 3. A runtime default (`std::env::consts`, the rustc that built us)
//!
//! Empty values are treated as unset. A compiler that cannot be resolved
//! becomes [`COMPILER_UNKNOWN`] and an unresolved variant becomes
//! [`VARIANT_GENERIC`]; resolution never fails.

use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Variant used when none was configured
pub const VARIANT_GENERIC: &str = "generic";

/// Compiler used when none could be determined
pub const COMPILER_UNKNOWN: &str = "unknown";

/// The rustc that compiled this crate, e.g. `rustc-1.85.0`
///
/// Module crates embed this value in their exports so the loader can
/// reject artifacts produced by a different compiler.
pub const BUILD_RUSTC: &str = env!("DYNAMOD_RUSTC_VERSION");

const BUILD_OS: Option<&str> = option_env!("DYNAMOD_BUILD_OS");
const BUILD_ARCH: Option<&str> = option_env!("DYNAMOD_BUILD_ARCH");
const BUILD_COMPILER: Option<&str> = option_env!("DYNAMOD_BUILD_COMPILER");
const BUILD_VARIANT: Option<&str> = option_env!("DYNAMOD_BUILD_VARIANT");

static CURRENT: OnceLock<Toolchain> = OnceLock::new();

/// Binary compatibility class of loadable artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Toolchain {
    os: String,
    arch: String,
    compiler: String,
    variant: String,
}

impl Toolchain {
    /// Build an explicit fingerprint
    ///
    /// Field values are sanitized so the rendered key is always a single
    /// path component. An empty variant becomes [`VARIANT_GENERIC`].
    pub fn new(
        os: impl AsRef<str>,
        arch: impl AsRef<str>,
        compiler: impl AsRef<str>,
        variant: impl AsRef<str>,
    ) -> Self {
        Self {
            os: resolve_field(Some(os.as_ref()), None, ""),
            arch: resolve_field(Some(arch.as_ref()), None, ""),
            compiler: resolve_field(Some(compiler.as_ref()), None, COMPILER_UNKNOWN),
            variant: resolve_field(Some(variant.as_ref()), None, VARIANT_GENERIC),
        }
    }

    /// The fingerprint of this process, resolved on first use
    pub fn current() -> &'static Toolchain {
        CURRENT.get_or_init(|| {
            let toolchain = Self::resolve();
            debug!("Resolved toolchain fingerprint: {}", toolchain);
            toolchain
        })
    }

    /// Resolve a fingerprint from build constants, the process environment
    /// and runtime defaults
    pub fn resolve() -> Self {
        Self::resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve a fingerprint using `env` for runtime variable lookups
    pub fn resolve_with<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            os: resolve_field(BUILD_OS, env("DYNAMOD_OS"), std::env::consts::OS),
            arch: resolve_field(BUILD_ARCH, env("DYNAMOD_ARCH"), std::env::consts::ARCH),
            compiler: resolve_field(
                BUILD_COMPILER,
                env("DYNAMOD_COMPILER"),
                non_empty(BUILD_RUSTC).unwrap_or(COMPILER_UNKNOWN),
            ),
            variant: resolve_field(BUILD_VARIANT, env("DYNAMOD_VARIANT"), VARIANT_GENERIC),
        }
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Render the fingerprint as a single key: `os_arch_compiler_variant`
    pub fn render(&self) -> String {
        [
            self.os.as_str(),
            self.arch.as_str(),
            self.compiler.as_str(),
            self.variant.as_str(),
        ]
        .join("_")
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Pick the first non-empty value among build, runtime and default
fn resolve_field(build: Option<&str>, runtime: Option<String>, default: &str) -> String {
    let value = build
        .and_then(non_empty)
        .map(str::to_string)
        .or_else(|| runtime.as_deref().and_then(non_empty).map(str::to_string))
        .unwrap_or_else(|| default.to_string());
    sanitize(&value)
}

/// Keep a field usable as part of one path component
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '-'
            } else {
                c
            }
        })
        .collect()
}
