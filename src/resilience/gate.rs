//! Single-admission gate around token exchanges.
//!
//! At most one attempt runs at a time. A caller that arrives while an attempt
//! is in flight waits for it and receives its outcome instead of starting a
//! second one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct RefreshGate<T> {
    /// number of attempts that ran to completion
    completed: AtomicU64,
    last: Mutex<Option<T>>,
}

impl<T: Clone> RefreshGate<T> {
    pub fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    /// Run `attempt` unless another attempt completed while this caller was
    /// queued, in which case that attempt's outcome is returned.
    ///
    /// The second element is `true` when `attempt` actually ran.
    pub async fn run<F, Fut>(&self, attempt: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.completed.load(Ordering::Acquire);
        let mut last = self.last.lock().await;

        if self.completed.load(Ordering::Acquire) != ticket {
            if let Some(shared) = last.as_ref() {
                return (shared.clone(), false);
            }
        }

        let outcome = attempt().await;
        *last = Some(outcome.clone());
        self.completed.fetch_add(1, Ordering::AcqRel);
        (outcome, true)
    }

    /// Hold the gate exclusively without recording an outcome. Used by
    /// lifecycle transitions that must not overlap any attempt.
    pub async fn lock(&self) -> GateGuard<'_, T> {
        GateGuard(self.last.lock().await)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

impl<T: Clone> Default for RefreshGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GateGuard<'a, T>(#[allow(dead_code)] MutexGuard<'a, Option<T>>);

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_attempt() {
        let gate = Arc::new(RefreshGate::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gate = gate.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                gate.run(|| async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    n as u32 + 7
                })
                .await
            }));
        }

        let mut ran = 0;
        for handle in handles {
            let (value, executed) = handle.await.unwrap();
            assert_eq!(value, 7);
            ran += executed as usize;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ran, 1);
        assert_eq!(gate.completed(), 1);
    }

    #[tokio::test]
    async fn sequential_callers_each_run() {
        let gate = RefreshGate::<u32>::new();
        let (first, ran_first) = gate.run(|| async { 1 }).await;
        let (second, ran_second) = gate.run(|| async { 2 }).await;
        assert_eq!((first, ran_first), (1, true));
        assert_eq!((second, ran_second), (2, true));
        assert_eq!(gate.completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_blocks_attempts() {
        let gate = Arc::new(RefreshGate::<u32>::new());
        let guard = gate.lock().await;

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.run(|| async { 3 }).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), (3, true));
    }
}
