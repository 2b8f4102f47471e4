use std::{error::Error, fmt, future::Future, io, sync::Arc};

use tm1_types::StatusEnvelope;
use tracing::debug;

use crate::session::{
    ScopedSession,
    SessionError,
    SessionFactory,
    SessionResult,
    Tm1ConnectionConfig,
    Tm1Session,
};
use crate::store::StoreError;

pub mod cells;
pub mod cubes;
pub mod dimensions;
pub mod elements;

#[derive(Debug)]
pub enum ControlError {
    Session(SessionError),
    Store(StoreError),
    Embed(String),
    Io(io::Error),
    InvalidInput(String),
}

impl ControlError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Session(SessionError::NotFound(_)))
    }

    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::Session(SessionError::InvalidInput(_))
                | Self::Store(StoreError::InvalidInput(_))
        )
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Embed(message) => write!(f, "embedding service error: {message}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
        }
    }
}

impl Error for ControlError {}

impl From<SessionError> for ControlError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<io::Error> for ControlError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub type ControlResult<T> = Result<T, ControlError>;

/// Runs TM1 capabilities, each inside its own short-lived session.
#[derive(Clone)]
pub struct Tm1ControlPlane {
    factory: Arc<dyn SessionFactory>,
    config: Arc<Tm1ConnectionConfig>,
}

impl Tm1ControlPlane {
    pub fn new(factory: Arc<dyn SessionFactory>, config: Tm1ConnectionConfig) -> Self {
        Self {
            factory,
            config: Arc::new(config),
        }
    }

    /// Opens a session, runs `call` against it, and closes the session.
    ///
    /// The close happens on every path: after success, after an error
    /// returned by `call`, and (through the guard) when the returned future
    /// is dropped early.
    ///
    /// # Errors
    /// Returns `ControlError::Session` if the session cannot be opened or
    /// `call` fails.
    pub async fn scoped<T, F, Fut>(&self, operation: &'static str, call: F) -> ControlResult<T>
    where
        F: FnOnce(Arc<dyn Tm1Session>) -> Fut + Send,
        Fut: Future<Output = SessionResult<T>> + Send,
        T: Send,
    {
        debug!(operation, "opening TM1 session");
        let session: Arc<dyn Tm1Session> = Arc::from(self.factory.open(&self.config).await?);
        let guard = ScopedSession::new(session.clone(), operation);
        let result = call(session).await;
        guard.release().await;
        if let Err(err) = &result {
            debug!(operation, error = %err, "TM1 call failed");
        }
        result.map_err(ControlError::from)
    }

    /// Runs a checking or mutating call after confirming the cube exists.
    ///
    /// A missing cube yields an `error` envelope without running `call`.
    /// Connectivity failures still surface as errors; any other failure of
    /// `call` becomes an `error` envelope carrying the server message.
    ///
    /// # Errors
    /// Returns `ControlError::Session` on connectivity or authentication
    /// failures and when the existence check itself fails.
    pub async fn with_existing_cube<F, Fut>(
        &self,
        operation: &'static str,
        cube_name: &str,
        call: F,
    ) -> ControlResult<StatusEnvelope>
    where
        F: FnOnce(Arc<dyn Tm1Session>) -> Fut + Send,
        Fut: Future<Output = SessionResult<StatusEnvelope>> + Send,
    {
        self.scoped(operation, move |session| async move {
            if !session.cube_exists(cube_name).await? {
                return Ok(missing_cube(cube_name));
            }
            match call(session).await {
                Ok(envelope) => Ok(envelope),
                Err(err) if err.is_connectivity() => Err(err),
                Err(err) => Ok(StatusEnvelope::error(err.to_string())),
            }
        })
        .await
    }
}

pub(crate) fn missing_cube(cube_name: &str) -> StatusEnvelope {
    StatusEnvelope::error(format!("Cube '{cube_name}' does not exist"))
}

/// Replaces a remote not-found with `fallback`.
pub(crate) fn or_absent<T>(result: SessionResult<T>, fallback: impl FnOnce() -> T) -> SessionResult<T> {
    match result {
        Err(SessionError::NotFound(_)) => Ok(fallback()),
        other => other,
    }
}

/// Maps a remote not-found to `None`.
pub(crate) fn optional<T>(result: SessionResult<T>) -> SessionResult<Option<T>> {
    or_absent(result.map(Some), || None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mock::MockTm1;
    use tm1_types::Status;

    pub(crate) fn plane(tm1: &MockTm1) -> Tm1ControlPlane {
        let config = Tm1ConnectionConfig::new("http://localhost:8010", "admin", "apple");
        Tm1ControlPlane::new(Arc::new(tm1.clone()), config)
    }

    #[tokio::test]
    async fn scoped_releases_after_success_and_error() {
        let tm1 = MockTm1::new().with_cube("Sales", &["Month"]);
        let control = plane(&tm1);

        control
            .scoped("ok", |session| async move { session.cube("Sales").await })
            .await
            .expect("existing cube should load");
        let err = control
            .scoped("missing", |session| async move { session.cube("Nope").await })
            .await
            .expect_err("missing cube should fail");

        assert!(err.is_not_found());
        assert_eq!(tm1.opened(), 2);
        assert_eq!(tm1.closed(), 2);
    }

    #[tokio::test]
    async fn open_failure_surfaces_without_close() {
        let tm1 = MockTm1::new().with_failing_open();
        let control = plane(&tm1);

        let err = control
            .scoped("version", |session| async move { session.product_version().await })
            .await
            .expect_err("open should fail");

        assert!(matches!(err, ControlError::Session(SessionError::Transport(_))));
        assert_eq!(tm1.closed(), 0);
    }

    #[tokio::test]
    async fn close_failure_keeps_call_result() {
        let tm1 = MockTm1::new().with_failing_close();
        let control = plane(&tm1);

        let version = control
            .scoped("version", |session| async move { session.product_version().await })
            .await
            .expect("close failure should not replace the result");

        assert_eq!(version, "11.8.02300.3");
        assert_eq!(tm1.closed(), 1);
    }

    #[tokio::test]
    async fn mutation_faults_become_error_envelopes() {
        let tm1 = MockTm1::new()
            .with_cube("Sales", &["Month"])
            .with_failing_mutations();
        let control = plane(&tm1);

        let envelope = control
            .with_existing_cube("lock_cube", "Sales", |session| async move {
                session
                    .lock_cube("Sales")
                    .await
                    .map(|()| StatusEnvelope::success("locked"))
            })
            .await
            .expect("remote fault should become an envelope");

        assert_eq!(envelope.status, Status::Error);
        assert!(envelope.message.contains("lock_cube rejected"));
        assert_eq!(tm1.closed(), 1);
    }

    #[test]
    fn not_found_helpers_map_only_not_found() {
        let absent: SessionResult<Vec<String>> = Err(SessionError::NotFound("cube".to_string()));
        assert_eq!(or_absent(absent, Vec::new).expect("not found maps"), Vec::<String>::new());

        let failed: SessionResult<u32> = Err(SessionError::Decode("bad".to_string()));
        assert!(optional(failed).is_err());
    }
}
