//! Process-wide script platform.
//!
//! A [`Platform`] is created once at process start and passed to every
//! instance. It owns the engine configuration and counts live instances;
//! shutting it down while instances still exist is refused.

use std::cell::Cell;
use std::rc::Rc;

use rhai::Engine;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

struct PlatformInner {
    config: BridgeConfig,
    live: Cell<usize>,
    shut_down: Cell<bool>,
}

#[derive(Clone)]
pub struct Platform {
    inner: Rc<PlatformInner>,
}

impl Platform {
    pub fn init(config: BridgeConfig) -> Self {
        log::info!(
            "script platform up (max_operations={}, max_call_levels={})",
            config.max_operations,
            config.max_call_levels
        );
        Self {
            inner: Rc::new(PlatformInner {
                config,
                live: Cell::new(0),
                shut_down: Cell::new(false),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn live_instances(&self) -> usize {
        self.inner.live.get()
    }

    /// Register one more live instance. Released when the lease drops.
    pub fn lease(&self) -> Result<PlatformLease, BridgeError> {
        if self.inner.shut_down.get() {
            return Err(BridgeError::Construction(
                "script platform has been shut down".to_string(),
            ));
        }
        self.inner.live.set(self.inner.live.get() + 1);
        Ok(PlatformLease {
            inner: Rc::clone(&self.inner),
        })
    }

    /// A fresh engine with the configured limits applied.
    pub fn new_engine(&self) -> Engine {
        let mut engine = Engine::new();
        self.inner.config.apply(&mut engine);
        engine
    }

    /// Tear the platform down. Fails while any instance is alive.
    pub fn shutdown(self) -> Result<(), BridgeError> {
        let live = self.inner.live.get();
        if live > 0 {
            return Err(BridgeError::PlatformBusy(live));
        }
        self.inner.shut_down.set(true);
        log::info!("script platform down");
        Ok(())
    }
}

/// Held by each instance for its whole lifetime.
pub struct PlatformLease {
    inner: Rc<PlatformInner>,
}

impl Drop for PlatformLease {
    fn drop(&mut self) {
        let live = self.inner.live.get();
        self.inner.live.set(live.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_counts_instances() {
        let platform = Platform::init(BridgeConfig::default());
        let a = platform.lease().unwrap();
        let b = platform.lease().unwrap();
        assert_eq!(platform.live_instances(), 2);
        drop(a);
        assert_eq!(platform.live_instances(), 1);
        drop(b);
        assert_eq!(platform.live_instances(), 0);
    }

    #[test]
    fn test_shutdown_refused_while_busy() {
        let platform = Platform::init(BridgeConfig::default());
        let lease = platform.lease().unwrap();
        assert!(matches!(
            platform.clone().shutdown(),
            Err(BridgeError::PlatformBusy(1))
        ));
        drop(lease);
        let handle = platform.clone();
        platform.shutdown().unwrap();
        assert!(matches!(handle.lease(), Err(BridgeError::Construction(_))));
    }

    #[test]
    fn test_new_engine_applies_limits() {
        let platform = Platform::init(BridgeConfig {
            max_operations: 500,
            ..Default::default()
        });
        let engine = platform.new_engine();
        assert!(engine.run("let x = 0; loop { x += 1; }").is_err());
    }
}
