//! Safety watchdog
//!
//! [`Watchdog`] is a one-shot monotonic timer armed on every motion command. It does not
//! accumulate: rearming bumps a generation counter and the previous sleep's wakeup checks
//! its own generation before firing, so only the most recent arm can expire.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

type ExpireFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A rearmable one-shot timer backing the roof's safety watchdog.
pub struct Watchdog {
    generation: AtomicU64,
    active: AtomicBool,
}

impl Watchdog {
    pub fn new() -> Arc<Self> {
        Arc::new(Watchdog {
            generation: AtomicU64::new(0),
            active: AtomicBool::new(false),
        })
    }

    /// Whether the watchdog is currently armed, awaiting expiry or cancellation.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Cancel the current arm, if any. Idempotent.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }

    /// Arm (or rearm) the watchdog to invoke `on_expire` after `timeout`, unless cancelled
    /// or rearmed again first. `on_expire` only runs if this remains the most recent arm.
    pub fn arm(self: &Arc<Self>, timeout: Duration, on_expire: impl FnOnce() -> ExpireFuture + Send + 'static) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(true, Ordering::SeqCst);
        let watchdog = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if watchdog.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            watchdog.active.store(false, Ordering::SeqCst);
            debug!("safety watchdog expired");
            on_expire().await;
        });
    }
}
