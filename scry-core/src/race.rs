//! Acquire a scarce resource, race its ready signal against a deadline,
//! always release it.
//!
//! Rendering sessions are expensive and must be closed whatever happens:
//! the page becomes ready, the deadline passes first, the follow-up work
//! fails, or the caller drops the future halfway through. [`race_ready`]
//! covers all four cases and releases the lease exactly once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;

/// A resource that must be released once acquired.
#[async_trait]
pub trait Lease: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns the resource. Called exactly once per lease by [`race_ready`].
    async fn release(&self);
}

/// Releases the lease when dropped without an explicit release.
struct ReleaseGuard<L: Lease> {
    lease: Option<Arc<L>>,
}

impl<L: Lease> ReleaseGuard<L> {
    async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release().await;
            tracing::debug!(lease = lease.name(), "lease released");
        }
    }
}

impl<L: Lease> Drop for ReleaseGuard<L> {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(lease = lease.name(), "lease released after cancellation");
                handle.spawn(async move { lease.release().await });
            }
            Err(_) => {
                tracing::warn!(lease = lease.name(), "no runtime to release lease on");
            }
        }
    }
}

/// Races `ready` against `deadline`, then runs `on_ready` with the lease
/// and whatever the ready signal carried.
///
/// The lease is released exactly once on every path:
///
/// - `ready` resolves in time: `on_ready` runs, its result is returned;
/// - `ready` fails: that error is returned;
/// - `deadline` elapses first: [`BackendError::Timeout`] is returned;
/// - the returned future is dropped: release is spawned on the runtime.
///
/// # Errors
///
/// Propagates errors from `ready` and `on_ready`, or a timeout.
pub async fn race_ready<L, R, S, F, Fut, T>(
    lease: L,
    deadline: Duration,
    ready: R,
    on_ready: F,
) -> Result<T, BackendError>
where
    L: Lease,
    R: Future<Output = Result<S, BackendError>>,
    F: FnOnce(Arc<L>, S) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let lease = Arc::new(lease);
    let guard = ReleaseGuard {
        lease: Some(Arc::clone(&lease)),
    };

    let outcome = match tokio::time::timeout(deadline, ready).await {
        Ok(Ok(signal)) => on_ready(lease, signal).await,
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::warn!(
                lease = lease.name(),
                deadline_ms = deadline.as_millis() as u64,
                "resource not ready before deadline"
            );
            Err(BackendError::Timeout(format!(
                "{} not ready after {:.1}s",
                lease.name(),
                deadline.as_secs_f64()
            )))
        }
    };

    guard.release().await;
    outcome
}
