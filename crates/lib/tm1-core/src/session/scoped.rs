use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::Tm1Session;

/// Guard that closes a session exactly once.
///
/// [`ScopedSession::release`] awaits the close on the normal path. When the
/// guard is dropped unreleased (the owning future was cancelled or panicked)
/// the close is spawned on the current runtime instead.
pub struct ScopedSession {
    session: Arc<dyn Tm1Session>,
    operation: &'static str,
    released: bool,
}

impl ScopedSession {
    #[must_use]
    pub fn new(session: Arc<dyn Tm1Session>, operation: &'static str) -> Self {
        Self {
            session,
            operation,
            released: false,
        }
    }

    /// Closes the session. Close failures are logged and otherwise ignored.
    ///
    /// The guard counts as released only once the close has finished, so a
    /// release cancelled mid-close still closes from `Drop`.
    pub async fn release(mut self) {
        close_session(self.session.clone(), self.operation).await;
        self.released = true;
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let session = self.session.clone();
        let operation = self.operation;
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_session(session, operation));
            }
            Err(_) => warn!(operation, "no runtime available to close TM1 session"),
        }
    }
}

async fn close_session(session: Arc<dyn Tm1Session>, operation: &'static str) {
    match session.close().await {
        Ok(()) => debug!(operation, "TM1 session closed"),
        Err(err) => warn!(operation, error = %err, "failed to close TM1 session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTm1;
    use crate::session::{SessionFactory, Tm1ConnectionConfig};
    use std::time::Duration;

    async fn open(tm1: &Arc<MockTm1>) -> Arc<dyn Tm1Session> {
        let config = Tm1ConnectionConfig::new("http://localhost:8010", "admin", "apple");
        Arc::from(tm1.open(&config).await.expect("mock session should open"))
    }

    #[tokio::test]
    async fn release_closes_once() {
        let tm1 = Arc::new(MockTm1::new());
        let guard = ScopedSession::new(open(&tm1).await, "test");
        guard.release().await;
        assert_eq!(tm1.closed(), 1);
    }

    #[tokio::test]
    async fn dropping_unreleased_guard_still_closes() {
        let tm1 = Arc::new(MockTm1::new());
        let guard = ScopedSession::new(open(&tm1).await, "test");
        drop(guard);
        for _ in 0..10 {
            if tm1.closed() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(tm1.closed(), 1);
    }

    #[tokio::test]
    async fn release_cancelled_mid_close_still_closes() {
        let tm1 = Arc::new(MockTm1::new().with_close_delay(Duration::from_millis(50)));
        let guard = ScopedSession::new(open(&tm1).await, "test");

        let cancelled = tokio::time::timeout(Duration::from_millis(5), guard.release()).await;
        assert!(cancelled.is_err());
        assert_eq!(tm1.closed(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(tm1.closed(), 1);
    }

    #[tokio::test]
    async fn close_failure_does_not_panic() {
        let tm1 = Arc::new(MockTm1::new().with_failing_close());
        let guard = ScopedSession::new(open(&tm1).await, "test");
        guard.release().await;
        assert_eq!(tm1.closed(), 1);
    }
}
