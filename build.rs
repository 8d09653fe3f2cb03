// build.rs

use std::env;
use std::process::Command;

/// Fingerprint fields that may be injected at build time
const INJECTED: [&str; 4] = [
    "DYNAMOD_BUILD_OS",
    "DYNAMOD_BUILD_ARCH",
    "DYNAMOD_BUILD_COMPILER",
    "DYNAMOD_BUILD_VARIANT",
];

/// Turn `rustc 1.85.0 (4d91de4e4 2025-02-17)` into `rustc-1.85.0`
fn rustc_version() -> String {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let output = match Command::new(&rustc).arg("--version").output() {
        Ok(output) if output.status.success() => output,
        _ => return String::new(),
    };

    let text = String::from_utf8_lossy(&output.stdout);
    let mut parts = text.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(name), Some(version)) => format!("{}-{}", name, version),
        _ => String::new(),
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for key in INJECTED {
        println!("cargo:rerun-if-env-changed={}", key);
    }
    println!("cargo:rerun-if-env-changed=RUSTC");

    let version = rustc_version();
    if version.is_empty() {
        println!("cargo:warning=Could not determine the rustc version; the fingerprint compiler falls back to unknown");
    }
    println!("cargo:rustc-env=DYNAMOD_RUSTC_VERSION={}", version);
}
