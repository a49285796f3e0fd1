//! Bounded-concurrency primitives used by the diff prober and transfer
//! coordinator.
//!
//! Unlike a global rate limiter shared process-wide, a [`Limiter`] is scoped
//! to a single run: one per target for diff probing, one per target for file
//! transfer. Each call site owns its own instance and drops it when the run
//! completes.

use std::sync::Arc;

/// A permit-counted concurrency gate. `max_concurrency == 0` means
/// unbounded: [`Limiter::acquire`] never blocks.
pub struct Limiter {
    sem: Option<Arc<tokio::sync::Semaphore>>,
}

pub struct Permit<'a> {
    _inner: Option<tokio::sync::SemaphorePermit<'a>>,
}

impl Limiter {
    pub fn new(max_concurrency: usize) -> Self {
        let sem = if max_concurrency == 0 {
            None
        } else {
            Some(Arc::new(tokio::sync::Semaphore::new(max_concurrency)))
        };
        Self { sem }
    }

    pub async fn acquire(&self) -> Permit<'_> {
        match &self.sem {
            Some(sem) => Permit {
                _inner: Some(sem.acquire().await.expect("limiter semaphore closed")),
            },
            None => Permit { _inner: None },
        }
    }
}

/// Runs `items` through `work` with at most `max_concurrency` futures
/// in flight at once, preserving no particular completion order.
///
/// Returns one result per input item, matching `items`' length; a
/// `work` future that returns `Err` does not cancel its siblings.
pub async fn batch_async<T, F, Fut, R, E>(
    items: Vec<T>,
    max_concurrency: usize,
    work: F,
) -> Vec<Result<R, E>>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    let limiter = Arc::new(Limiter::new(max_concurrency));
    let work = Arc::new(work);
    let mut join_set = tokio::task::JoinSet::new();
    for item in items {
        let limiter = limiter.clone();
        let work = work.clone();
        join_set.spawn(async move {
            let _permit = limiter.acquire().await;
            work(item).await
        });
    }
    let mut results = Vec::with_capacity(join_set.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(join_err) => {
                tracing::error!("batch_async task panicked: {join_err}");
                std::panic::resume_unwind(join_err.into_panic());
            }
        }
    }
    results
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn limiter_bounds_concurrency() {
        let limiter = Arc::new(Limiter::new(2));
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut join_set = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            join_set.spawn(async move {
                let _permit = limiter.acquire().await;
                let now = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            });
        }
        while join_set.join_next().await.is_some() {}
        assert!(max_seen.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn unbounded_limiter_never_blocks() {
        let limiter = Limiter::new(0);
        let _a = limiter.acquire().await;
        let _b = limiter.acquire().await;
    }

    #[tokio::test]
    async fn batch_async_collects_all_results() {
        let items: Vec<u32> = (0..5).collect();
        let results = batch_async(items, 2, |item| async move {
            if item == 3 {
                Err::<u32, String>("boom".to_string())
            } else {
                Ok(item * 2)
            }
        })
        .await;
        assert_eq!(results.len(), 5);
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 4);
    }
}
