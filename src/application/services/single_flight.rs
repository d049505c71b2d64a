use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::DomainError;

type SharedResult<V> = Shared<BoxFuture<'static, Result<V, DomainError>>>;

enum Entry<V: Clone> {
    InFlight(SharedResult<V>),
    Done { value: V, at: Instant },
}

/// At most one execution per key; callers arriving while it runs or within
/// `window` after it succeeded share its result. Failures are not kept.
pub struct SingleFlight<V: Clone> {
    window: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

/// Result of [`SingleFlight::run`], with whether it came from another caller.
pub struct Flight<V> {
    pub result: Result<V, DomainError>,
    pub shared: bool,
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Flight<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, DomainError>> + Send + 'static,
    {
        let (future, shared) = {
            let mut entries = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.evict_expired(&mut entries);

            match entries.get(key) {
                Some(Entry::Done { value, .. }) => {
                    return Flight {
                        result: Ok(value.clone()),
                        shared: true,
                    };
                }
                Some(Entry::InFlight(future)) if !matches!(future.peek(), Some(Err(_))) => {
                    (future.clone(), true)
                }
                _ => {
                    let future = work().boxed().shared();
                    entries.insert(key.to_string(), Entry::InFlight(future.clone()));
                    (future, false)
                }
            }
        };

        let result = future.await;
        self.settle(key, &result);
        Flight { result, shared }
    }

    fn settle(&self, key: &str, result: &Result<V, DomainError>) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !matches!(entries.get(key), Some(Entry::InFlight(_))) {
            return;
        }

        match result {
            Ok(value) if !self.window.is_zero() => {
                entries.insert(
                    key.to_string(),
                    Entry::Done {
                        value: value.clone(),
                        at: Instant::now(),
                    },
                );
            }
            _ => {
                entries.remove(key);
            }
        }
    }

    fn evict_expired(&self, entries: &mut HashMap<String, Entry<V>>) {
        let window = self.window;
        entries.retain(|_, entry| match entry {
            Entry::Done { at, .. } => at.elapsed() <= window,
            Entry::InFlight(_) => true,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        outcome: Result<u32, DomainError>,
    ) -> impl Future<Output = Result<u32, DomainError>> + Send + 'static {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            outcome
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flights = Arc::new(SingleFlight::new(Duration::ZERO));
        let calls = Arc::new(AtomicUsize::new(0));

        let a = {
            let (flights, calls) = (flights.clone(), calls.clone());
            tokio::spawn(async move {
                flights
                    .run("k", || counted(&calls, Duration::from_millis(50), Ok(7)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let b = flights
            .run("k", || counted(&calls, Duration::from_millis(50), Ok(8)))
            .await;
        let a = a.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.result, Ok(7));
        assert!(!a.shared);
        assert_eq!(b.result, Ok(7));
        assert!(b.shared);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn test_recent_success_is_reused_within_window() {
        let flights = SingleFlight::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = flights.run("k", || counted(&calls, Duration::ZERO, Ok(1))).await;
        let second = flights.run("k", || counted(&calls, Duration::ZERO, Ok(2))).await;

        assert!(!first.shared);
        assert_eq!(second.result, Ok(1));
        assert!(second.shared);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_kept() {
        let flights = SingleFlight::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = flights
            .run("k", || {
                counted(&calls, Duration::ZERO, Err(DomainError::provider_unavailable("busy")))
            })
            .await;
        let second = flights.run("k", || counted(&calls, Duration::ZERO, Ok(3))).await;

        assert!(first.result.is_err());
        assert_eq!(second.result, Ok(3));
        assert!(!second.shared);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights = SingleFlight::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            flights.run("a", || counted(&calls, Duration::from_millis(20), Ok(1))),
            flights.run("b", || counted(&calls, Duration::from_millis(20), Ok(2))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!a.shared && !b.shared);
    }
}
