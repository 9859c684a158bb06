// Structured fan-out/fan-in over a fixed set of operations, each bounded by a timeout.

use crate::domain::LiveError;
use futures::future::{join_all, try_join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;

/// Runs one I/O step, failing with `Timeout` once `limit` elapses.
pub async fn within<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, LiveError>
where
    F: Future<Output = Result<T, LiveError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| LiveError::Timeout { operation })?
}

/// Joins every operation; the first error wins and the rest are dropped.
pub async fn try_join_all_within<T, F, I>(
    operation: &'static str,
    limit: Duration,
    futures: I,
) -> Result<Vec<T>, LiveError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, LiveError>>,
{
    within(operation, limit, try_join_all(futures)).await
}

/// Joins every operation and keeps each outcome, timing each one out separately.
pub async fn collect_all_within<T, F, I>(
    operation: &'static str,
    limit: Duration,
    futures: I,
) -> Vec<Result<T, LiveError>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, LiveError>>,
{
    join_all(futures.into_iter().map(|fut| within(operation, limit, fut))).await
}

/// Resolves `true` as soon as any check does, discarding the others.
///
/// With no `true`, the first error (in completion order) is returned, else `false`.
pub async fn any_true_within<F, I>(
    operation: &'static str,
    limit: Duration,
    checks: I,
) -> Result<bool, LiveError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<bool, LiveError>>,
{
    within(operation, limit, async {
        let mut pending: FuturesUnordered<F> = checks.into_iter().collect();
        let mut first_error = None;
        while let Some(result) = pending.next().await {
            match result {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(false), Err)
    })
    .await
}
