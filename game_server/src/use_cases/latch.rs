// Counting join: register pending work, run one callback once all of it resolved.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct LatchState {
    pending: u64,
    callback: Option<Callback>,
}

/// Completion latch shared by a batch of sub-operations.
///
/// Call [`Latch::add`] before starting each sub-operation and
/// [`Latch::resolve`] when it finishes. The callback registered with
/// [`Latch::then`] runs exactly once, when the pending count drops to zero.
/// Extra resolves are clamped and never fire it a second time.
#[derive(Default)]
pub struct Latch {
    state: Mutex<LatchState>,
    drained: Notify,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.lock().pending += n;
    }

    pub fn resolve(&self) {
        let callback = {
            let mut state = self.lock();
            state.pending = state.pending.saturating_sub(1);
            if state.pending > 0 {
                return;
            }
            state.callback.take()
        };

        self.drained.notify_waiters();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Registers the completion callback, running it now if nothing is pending.
    pub fn then<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        if state.pending == 0 {
            drop(state);
            callback();
        } else {
            state.callback = Some(Box::new(callback));
        }
    }

    /// Zeroes the count and drops the callback so the latch can serve another wave.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.pending = 0;
        state.callback = None;
        drop(state);
        self.drained.notify_waiters();
    }

    pub fn pending(&self) -> u64 {
        self.lock().pending
    }

    /// Waits until nothing is pending.
    pub async fn wait(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Adds one pending operation that resolves when the guard drops.
    pub fn enter(&self) -> LatchGuard<'_> {
        self.add(1);
        LatchGuard { latch: self }
    }

    fn lock(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct LatchGuard<'a> {
    latch: &'a Latch,
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.resolve();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_callback(latch: &Latch) -> Arc<AtomicUsize> {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        latch.then(move || {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });
        fired
    }

    #[test]
    fn when_all_registered_operations_resolve_then_callback_fires_once() {
        let latch = Latch::new();
        latch.add(3);
        let fired = counting_callback(&latch);

        latch.resolve();
        latch.resolve();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        latch.resolve();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn when_resolved_more_often_than_added_then_callback_still_fires_once() {
        let latch = Latch::new();
        latch.add(1);
        let fired = counting_callback(&latch);

        latch.resolve();
        latch.resolve();
        latch.resolve();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(latch.pending(), 0);
    }

    #[test]
    fn when_nothing_is_pending_then_then_fires_immediately() {
        let latch = Latch::new();
        let fired = counting_callback(&latch);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn when_latch_is_reset_then_old_callback_is_dropped_and_a_new_wave_works() {
        let latch = Latch::new();
        latch.add(2);
        let first = counting_callback(&latch);

        latch.reset();
        latch.add(1);
        let second = counting_callback(&latch);
        latch.resolve();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn when_guards_drop_then_wait_returns() {
        let latch = Arc::new(Latch::new());
        let guard_latch = Arc::clone(&latch);

        let worker = tokio::spawn(async move {
            let _guard = guard_latch.enter();
            tokio::time::sleep(Duration::from_millis(20)).await;
        });

        // Give the worker a chance to enter before waiting.
        tokio::time::sleep(Duration::from_millis(5)).await;
        tokio::time::timeout(Duration::from_secs(1), latch.wait())
            .await
            .expect("expected latch to drain");
        assert_eq!(latch.pending(), 0);
        worker.await.expect("worker should finish");
    }
}
