// demos/echo-module/src/lib.rs

//! Demo module: echoes payloads and counts calls
//!
//! Build with `cargo build -p echo-module` and copy the resulting
//! `libecho_module.so` to `<root>/<fingerprint>/<module>/libmod_<module>.so`.
//! The default build exports a factory; `--features singleton` exports a
//! static instance instead.

use dynamod::{Tunnel, TunnelError};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct EchoTunnel {
    calls: AtomicU64,
}

impl EchoTunnel {
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }
}

impl Default for EchoTunnel {
    fn default() -> Self {
        Self::new()
    }
}

impl Tunnel for EchoTunnel {
    fn init(&self) -> Result<(), TunnelError> {
        self.calls.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn invoke(&self, method: &str, payload: &str) -> String {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        match method {
            "echo" => payload.to_string(),
            "upper" => payload.to_uppercase(),
            "calls" => calls.to_string(),
            other => format!("unknown method: {}", other),
        }
    }
}

#[cfg(feature = "singleton")]
static ECHO: EchoTunnel = EchoTunnel::new();

#[cfg(feature = "singleton")]
dynamod::export_tunnel!(singleton: ECHO);

#[cfg(not(feature = "singleton"))]
dynamod::export_tunnel!(factory: EchoTunnel::new);
