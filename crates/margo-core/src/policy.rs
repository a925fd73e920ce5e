//! Scheduling and failure policies, and the fan-out/join routine shared by every level

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tokio::task::JoinSet;

/// How sibling units at one level are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Start every unit at once, join them all at the end
    #[default]
    Concurrent,
    /// Run units one at a time in list order
    Sequential,
}

impl SchedulingPolicy {
    /// Map a configuration `sync` flag to a policy
    #[must_use]
    pub fn from_sync(sync: bool) -> Self {
        if sync {
            SchedulingPolicy::Sequential
        } else {
            SchedulingPolicy::Concurrent
        }
    }
}

/// What a failing command-unit does to the rest of the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and let every other unit finish
    #[default]
    Continue,
    /// Stop the whole run at the first failure, aborting in-flight siblings
    Abort,
}

/// Run `run` over `units` under `policy` and join all of them
///
/// Results are returned in the order of `units` whatever the completion
/// order. The first `Err` is returned immediately: remaining sequential units
/// are never started and in-flight concurrent units are aborted when the
/// `JoinSet` is dropped.
///
/// # Errors
/// Returns the first error produced by a unit, or a converted `JoinError`
/// if a unit panicked
pub async fn fan_out<U, T, E, F, Fut>(
    policy: SchedulingPolicy,
    units: impl IntoIterator<Item = U>,
    mut run: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(U) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    match policy {
        SchedulingPolicy::Sequential => {
            let mut results = Vec::new();
            for unit in units {
                results.push(run(unit).await?);
            }
            Ok(results)
        }
        SchedulingPolicy::Concurrent => {
            let mut set = JoinSet::new();
            let mut count = 0;
            for (index, unit) in units.into_iter().enumerate() {
                let fut = run(unit);
                set.spawn(async move { (index, fut.await) });
                count += 1;
            }

            let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();
            while let Some(joined) = set.join_next().await {
                let (index, result) = joined?;
                slots[index] = Some(result?);
            }

            Ok(slots.into_iter().flatten().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Barrier;

    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_from_sync() {
        assert_eq!(SchedulingPolicy::from_sync(true), SchedulingPolicy::Sequential);
        assert_eq!(SchedulingPolicy::from_sync(false), SchedulingPolicy::Concurrent);
    }

    #[tokio::test]
    async fn test_concurrent_results_keep_input_order() {
        let results = fan_out(SchedulingPolicy::Concurrent, [30u64, 0, 15], |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, CoreError>(delay)
        })
        .await
        .unwrap();

        assert_eq!(results, vec![30, 0, 15]);
    }

    #[tokio::test]
    async fn test_concurrent_units_overlap() {
        // Every unit waits for all the others; sequential scheduling would deadlock
        let barrier = Arc::new(Barrier::new(3));
        let results = tokio::time::timeout(
            Duration::from_secs(5),
            fan_out(SchedulingPolicy::Concurrent, 0..3, |i| {
                let barrier = barrier.clone();
                async move {
                    barrier.wait().await;
                    Ok::<_, CoreError>(i)
                }
            }),
        )
        .await
        .expect("concurrent units did not overlap")
        .unwrap();

        assert_eq!(results, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_sequential_stops_at_first_error() {
        let started = Arc::new(AtomicUsize::new(0));
        let result = fan_out(SchedulingPolicy::Sequential, 0..5, |i| {
            let started = started.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if i == 1 {
                    Err(CoreError::Config("boom".to_string()))
                } else {
                    Ok(i)
                }
            }
        })
        .await;

        assert!(matches!(result, Err(CoreError::Config(_))));
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_error_aborts_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let result = fan_out(SchedulingPolicy::Concurrent, 0..4, |i| {
            let finished = finished.clone();
            async move {
                if i == 0 {
                    return Err(CoreError::Config("boom".to_string()));
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await;

        assert!(matches!(result, Err(CoreError::Config(_))));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_unit_becomes_join_error() {
        let result = fan_out(SchedulingPolicy::Concurrent, [true], |fail| async move {
            assert!(!fail, "unit exploded");
            Ok::<_, CoreError>(())
        })
        .await;

        assert!(matches!(result, Err(CoreError::Join(_))));
    }

    #[tokio::test]
    async fn test_empty_units() {
        let results: Vec<u8> = fan_out(SchedulingPolicy::Concurrent, Vec::<u8>::new(), |u| async move {
            Ok::<_, CoreError>(u)
        })
        .await
        .unwrap();
        assert!(results.is_empty());
    }
}
