//! First-class cancellation token, threaded into every suspension point.
//! A reusable, cloneable token that supports deriving child tokens so a
//! job's cancellation propagates down into its chunk workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    // Shared with every ancestor/descendant in the same chain (not a fresh
    // Notify per level) — cancelling anywhere in the chain must wake every
    // waiter anywhere else in it, and a waiter only ever blocks on its own
    // `Notify`, so the object itself has to be the shared one.
    notify: Arc<Notify>,
    parent: Option<Arc<Inner>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Arc::new(Notify::new()),
                parent: None,
            }),
        }
    }

    /// A child token observes both its own cancellation and the parent's.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: self.inner.notify.clone(),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self.inner.parent.as_ref().is_some_and(|p| p.cancelled.load(Ordering::SeqCst))
    }

    /// Resolves once this token (or an ancestor) is cancelled. Intended to
    /// be raced against I/O futures with `tokio::select!`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_observes_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn own_cancel_does_not_affect_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    /// A task parked in `child.cancelled().await` must be woken when the
    /// *parent* is cancelled, not just when the child itself is — this is
    /// what lets `JobQueue::shutdown()` wake idle worker/cleanup loops
    /// blocked on a child token derived from the shutdown token.
    #[tokio::test]
    async fn cancelled_future_wakes_on_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child();

        let waiter = tokio::spawn(async move {
            child.cancelled().await;
        });

        tokio::task::yield_now().await;
        parent.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("child waiter should wake promptly on parent cancel")
            .unwrap();
    }
}
