//! Acquire-or-create for remote container objects
//!
//! A read that fails with a status failure means "absent": create the object
//! and read it again. Transport failures are not absence and propagate.

use crate::error::{Result, SyncError};
use std::future::Future;
use tracing::debug;

/// Outcome of an object read
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    /// The archive answered with a status failure
    Missing(SyncError),
}

impl<T> Lookup<T> {
    /// Split a read result into found/missing, propagating everything that
    /// is not a status failure.
    pub fn from_result(result: Result<T>) -> Result<Self> {
        match result {
            Ok(value) => Ok(Lookup::Found(value)),
            Err(err) if err.is_status() => Ok(Lookup::Missing(err)),
            Err(err) => Err(err),
        }
    }
}

/// Read an object, creating it first if the archive reports it missing.
///
/// `put` runs at most once. The read after creation is not retried: a
/// second failure propagates as-is.
pub async fn acquire<T, G, GFut, P, PFut>(mut get: G, put: P) -> Result<T>
where
    G: FnMut() -> GFut,
    GFut: Future<Output = Result<T>>,
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<()>>,
{
    match Lookup::from_result(get().await)? {
        Lookup::Found(value) => Ok(value),
        Lookup::Missing(reason) => {
            debug!(reason = %reason, "Object missing, creating it");
            put().await?;
            get().await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn missing() -> SyncError {
        SyncError::Status {
            method: "GET".to_string(),
            path: "/data/projects/P/subjects/S".to_string(),
            code: 404,
            phrase: "Not Found".to_string(),
            body: None,
        }
    }

    fn refused() -> SyncError {
        SyncError::Transport {
            method: "GET".to_string(),
            path: "/data/projects/P/subjects/S".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_found_never_creates() {
        let puts = AtomicUsize::new(0);
        let value = acquire(
            || async { Ok::<_, SyncError>("subject") },
            || async {
                puts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(value, "subject");
        assert_eq!(puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_creates_once_then_rereads() {
        let gets = AtomicUsize::new(0);
        let puts = AtomicUsize::new(0);

        let value = acquire(
            || {
                let n = gets.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(missing())
                    } else {
                        Ok(n)
                    }
                }
            },
            || async {
                puts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 1);
        assert_eq!(gets.load(Ordering::SeqCst), 2);
        assert_eq!(puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_failure_propagates() {
        let gets = AtomicUsize::new(0);
        let puts = AtomicUsize::new(0);

        let err = acquire(
            || {
                gets.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(missing()) }
            },
            || async {
                puts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap_err();

        assert!(err.is_status());
        assert_eq!(gets.load(Ordering::SeqCst), 2);
        assert_eq!(puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_create() {
        let puts = AtomicUsize::new(0);
        let err = acquire(
            || async { Err::<(), _>(refused()) },
            || async {
                puts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Transport { .. }));
        assert_eq!(puts.load(Ordering::SeqCst), 0);
    }
}
