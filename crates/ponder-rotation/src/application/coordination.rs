//! Single-slot coordination token.
//!
//! Collapses concurrent requests for the same piece of work inside one
//! process: the first caller for a key starts the operation, later callers
//! with the same key await the same shared future. The slot is released a
//! short grace delay after the operation completes, so a burst of callers
//! arriving just after completion still shares the result.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};

/// Whether a caller started the operation or joined one in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRole {
    /// This caller started the operation.
    Leader,
    /// This caller awaited an operation another caller started.
    Follower,
}

struct InFlight<K, T: Clone> {
    key: K,
    generation: u64,
    future: Shared<BoxFuture<'static, T>>,
}

struct Slot<K, T: Clone> {
    generation: u64,
    in_flight: Option<InFlight<K, T>>,
}

/// A mutex-guarded optional in-flight operation, keyed so that work for a
/// different window never joins a stale result.
pub struct CoordinationToken<K, T: Clone> {
    slot: Arc<Mutex<Slot<K, T>>>,
    grace: Duration,
}

impl<K, T: Clone> Clone for CoordinationToken<K, T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            grace: self.grace,
        }
    }
}

impl<K, T: Clone> std::fmt::Debug for CoordinationToken<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationToken")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl<K, T> CoordinationToken<K, T>
where
    K: PartialEq + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty token that releases `grace` after completion.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                in_flight: None,
            })),
            grace,
        }
    }

    /// Runs the operation built by `start`, or joins the one already in
    /// flight for `key`. `start` is only called by the leader.
    ///
    /// The operation runs to completion even if the leader stops awaiting,
    /// as long as any follower is still polling it.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> (T, TokenRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (future, role) = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.in_flight.as_ref() {
                Some(in_flight) if in_flight.key == key => {
                    (in_flight.future.clone(), TokenRole::Follower)
                }
                _ => {
                    slot.generation += 1;
                    let generation = slot.generation;
                    let release_slot = Arc::clone(&self.slot);
                    let grace = self.grace;
                    let operation = start();
                    let future = async move {
                        let output = operation.await;
                        tokio::spawn(release_after(release_slot, generation, grace));
                        output
                    }
                    .boxed()
                    .shared();
                    slot.in_flight = Some(InFlight {
                        key,
                        generation,
                        future: future.clone(),
                    });
                    (future, TokenRole::Leader)
                }
            }
        };
        (future.await, role)
    }

    /// Whether an operation is held in the slot.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .is_some()
    }
}

async fn release_after<K, T: Clone>(slot: Arc<Mutex<Slot<K, T>>>, generation: u64, grace: Duration) {
    tokio::time::sleep(grace).await;
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot
        .in_flight
        .as_ref()
        .is_some_and(|in_flight| in_flight.generation == generation)
    {
        slot.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;

    use super::*;

    fn counting_operation(
        starts: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl Future<Output = u32> + Send + 'static {
        let starts = Arc::clone(starts);
        async move {
            starts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            value
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_operation() {
        // Arrange
        let token: CoordinationToken<u8, u32> = CoordinationToken::new(Duration::from_millis(250));
        let starts = Arc::new(AtomicUsize::new(0));

        // Act
        let results = join_all((0..10u32).map(|i| {
            let token = token.clone();
            let starts = Arc::clone(&starts);
            async move { token.run(1, || counting_operation(&starts, i)).await }
        }))
        .await;

        // Assert
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|(value, _)| *value == 0));
        let leaders = results
            .iter()
            .filter(|(_, role)| *role == TokenRole::Leader)
            .count();
        assert_eq!(leaders, 1);
    }

    #[tokio::test]
    async fn test_caller_within_grace_joins_completed_operation() {
        let token: CoordinationToken<u8, u32> = CoordinationToken::new(Duration::from_secs(5));
        let starts = Arc::new(AtomicUsize::new(0));

        let (first, _) = token.run(1, || counting_operation(&starts, 7)).await;
        let (second, role) = token.run(1, || counting_operation(&starts, 8)).await;

        assert_eq!((first, second), (7, 7));
        assert_eq!(role, TokenRole::Follower);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_key_starts_new_operation() {
        let token: CoordinationToken<u8, u32> = CoordinationToken::new(Duration::from_secs(5));
        let starts = Arc::new(AtomicUsize::new(0));

        token.run(1, || counting_operation(&starts, 7)).await;
        let (value, role) = token.run(2, || counting_operation(&starts, 8)).await;

        assert_eq!(value, 8);
        assert_eq!(role, TokenRole::Leader);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slot_is_released_after_grace() {
        let token: CoordinationToken<u8, u32> = CoordinationToken::new(Duration::from_millis(10));
        let starts = Arc::new(AtomicUsize::new(0));

        token.run(1, || counting_operation(&starts, 7)).await;
        assert!(token.is_held());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!token.is_held());
        let (value, role) = token.run(1, || counting_operation(&starts, 9)).await;
        assert_eq!(value, 9);
        assert_eq!(role, TokenRole::Leader);
    }
}
