//! Single-slot gate around GPU-resident local engines.
//!
//! The local transcription and synthesis models cannot share the device at
//! the same time, so every section that loads one must hold the gate. A
//! cleanup hook (model unload + allocator cache clear) runs between
//! acquisitions, even when the previous holder finished cleanly, so each
//! holder starts from an empty device.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

pub type CleanupFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type CleanupHook = Arc<dyn Fn(&'static str) -> CleanupFuture + Send + Sync>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GateError {
    #[error("cancelled while waiting for the resource gate")]
    Cancelled,
}

struct Inner {
    slot: Arc<Mutex<()>>,
    hook: Option<CleanupHook>,
    /// Set on every release; the next acquirer runs the hook before it
    /// proceeds.
    dirty: AtomicBool,
    holders: AtomicUsize,
    cleanups: AtomicU64,
}

#[derive(Clone)]
pub struct ResourceGate {
    inner: Arc<Inner>,
}

impl ResourceGate {
    pub fn new() -> Self {
        Self::with_hook(None)
    }

    pub fn with_cleanup(hook: CleanupHook) -> Self {
        Self::with_hook(Some(hook))
    }

    fn with_hook(hook: Option<CleanupHook>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Arc::new(Mutex::new(())),
                hook,
                dirty: AtomicBool::new(false),
                holders: AtomicUsize::new(0),
                cleanups: AtomicU64::new(0),
            }),
        }
    }

    /// Blocks until the slot is free, then returns the guard. Fails fast
    /// with `Cancelled` when the token fires before the slot is won.
    pub async fn acquire(
        &self,
        label: &'static str,
        cancel: &CancellationToken,
    ) -> Result<GateGuard, GateError> {
        if cancel.is_cancelled() {
            return Err(GateError::Cancelled);
        }

        let permit = tokio::select! {
            permit = Arc::clone(&self.inner.slot).lock_owned() => permit,
            _ = cancel.cancelled() => return Err(GateError::Cancelled),
        };

        let holders = self.inner.holders.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert_eq!(holders, 1, "gate slot held by more than one owner");

        if self.inner.dirty.swap(false, Ordering::SeqCst) {
            if let Some(hook) = &self.inner.hook {
                tracing::debug!(label, "gate_cleanup_running");
                hook(label).await;
            }
            self.inner.cleanups.fetch_add(1, Ordering::SeqCst);
        }

        tracing::debug!(label, "gate_acquired");
        Ok(GateGuard {
            inner: Arc::clone(&self.inner),
            label,
            _permit: permit,
        })
    }

    /// How many times the cleanup ran. Test instrumentation.
    pub fn cleanup_count(&self) -> u64 {
        self.inner.cleanups.load(Ordering::SeqCst)
    }

    /// Current holder count (0 or 1). Test instrumentation.
    pub fn holders(&self) -> usize {
        self.inner.holders.load(Ordering::SeqCst)
    }
}

impl Default for ResourceGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one GPU-exclusive section. Dropping releases
/// the slot on every exit path and marks the device dirty so the next
/// acquirer cleans it first.
pub struct GateGuard {
    inner: Arc<Inner>,
    label: &'static str,
    _permit: OwnedMutexGuard<()>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.inner.holders.fetch_sub(1, Ordering::SeqCst);
        self.inner.dirty.store(true, Ordering::SeqCst);
        tracing::debug!(label = self.label, "gate_released");
    }
}
