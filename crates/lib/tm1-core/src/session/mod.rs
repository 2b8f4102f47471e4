//! Capability surface of a TM1 server and the sessions that expose it.
//!
//! A session is opened per operation from an explicit
//! [`Tm1ConnectionConfig`], used for one call (or a short fixed sequence),
//! and closed before the operation returns.

use std::{error::Error, fmt, time::Duration};

use async_trait::async_trait;
use tm1_types::{
    CellRow,
    CellValue,
    Cube,
    Dimension,
    Element,
    ElementAddress,
    ElementFilter,
    ElementNode,
    EntityScope,
    ProcessOutcome,
    RuleError,
};

pub mod rest;
pub mod scoped;

pub use rest::{RestSession, RestSessionFactory};
pub use scoped::ScopedSession;

#[derive(Debug)]
pub enum SessionError {
    Transport(String),
    Auth(String),
    NotFound(String),
    Remote { status: u16, message: String },
    Decode(String),
    InvalidInput(String),
}

impl SessionError {
    /// Connectivity and authentication failures end the call no matter which
    /// capability was running.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Auth(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "TM1 transport error: {message}"),
            Self::Auth(message) => write!(f, "TM1 authentication failed: {message}"),
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::Remote { status, message } => write!(f, "TM1 error ({status}): {message}"),
            Self::Decode(message) => write!(f, "unexpected TM1 response: {message}"),
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
        }
    }
}

impl Error for SessionError {}

pub type SessionResult<T> = Result<T, SessionError>;

/// Connection settings threaded into every session open.
#[derive(Clone)]
pub struct Tm1ConnectionConfig {
    pub base_url: String,
    pub user: String,
    pub password: String,
    pub namespace: Option<String>,
    pub verify_tls: bool,
    pub timeout: Duration,
    pub session_context: String,
}

impl Tm1ConnectionConfig {
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            user: user.into(),
            password: password.into(),
            namespace: None,
            verify_tls: true,
            timeout: Duration::from_secs(60),
            session_context: "tm1-mcp".to_string(),
        }
    }

    /// Builds the server root URL from address, port, and transport security.
    #[must_use]
    pub fn base_url_for(address: &str, port: u16, ssl: bool) -> String {
        let scheme = if ssl { "https" } else { "http" };
        format!("{scheme}://{address}:{port}")
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    #[must_use]
    pub const fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_context(mut self, session_context: impl Into<String>) -> Self {
        self.session_context = session_context.into();
        self
    }

    /// Root of the REST API, without a trailing slash.
    #[must_use]
    pub fn api_root(&self) -> String {
        format!("{}/api/v1", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for Tm1ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tm1ConnectionConfig")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .field("session_context", &self.session_context)
            .finish()
    }
}

/// Unbound `TurboIntegrator` process run through `ExecuteProcessWithReturn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboundProcess {
    pub name: String,
    pub prolog: String,
}

/// Operations an authenticated TM1 session can perform.
///
/// Implementations translate each call to the server and back into typed
/// records. A missing object is reported as [`SessionError::NotFound`].
#[async_trait]
pub trait Tm1Session: Send + Sync {
    async fn product_version(&self) -> SessionResult<String>;

    /// Ends the remote session.
    async fn close(&self) -> SessionResult<()>;

    async fn cube_names(&self, scope: EntityScope) -> SessionResult<Vec<String>>;
    async fn cube_exists(&self, cube_name: &str) -> SessionResult<bool>;
    async fn cube(&self, cube_name: &str) -> SessionResult<Cube>;
    async fn cube_dimension_names(&self, cube_name: &str) -> SessionResult<Vec<String>>;
    async fn check_rules(&self, cube_name: &str) -> SessionResult<Vec<RuleError>>;
    async fn update_rules(&self, cube_name: &str, rules: &str) -> SessionResult<()>;
    async fn lock_cube(&self, cube_name: &str) -> SessionResult<()>;
    async fn unlock_cube(&self, cube_name: &str) -> SessionResult<()>;
    async fn load_cube(&self, cube_name: &str) -> SessionResult<()>;
    async fn unload_cube(&self, cube_name: &str) -> SessionResult<()>;
    async fn storage_dimension_order(&self, cube_name: &str) -> SessionResult<Vec<String>>;

    /// Reorders storage dimensions and returns the reported memory change in percent.
    async fn reorder_dimensions(
        &self,
        cube_name: &str,
        dimension_names: &[String],
    ) -> SessionResult<f64>;

    async fn cell_value(
        &self,
        cube_name: &str,
        elements: &[ElementAddress],
    ) -> SessionResult<CellValue>;
    async fn write_value(
        &self,
        cube_name: &str,
        elements: &[ElementAddress],
        value: &CellValue,
    ) -> SessionResult<()>;
    async fn execute_mdx(&self, mdx: &str) -> SessionResult<Vec<CellRow>>;

    /// Evaluates an MDX set expression and returns the member names.
    async fn execute_set_mdx(&self, mdx: &str) -> SessionResult<Vec<String>>;

    async fn dimension_names(&self, scope: EntityScope) -> SessionResult<Vec<String>>;
    async fn dimension_exists(&self, dimension_name: &str) -> SessionResult<bool>;
    async fn dimension(&self, dimension_name: &str) -> SessionResult<Dimension>;

    async fn element(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> SessionResult<Element>;
    async fn elements(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> SessionResult<Vec<Element>>;
    async fn element_names(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> SessionResult<Vec<String>>;
    async fn parents(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> SessionResult<Vec<String>>;

    /// Fetches the consolidation tree below an element, `depth` levels deep.
    async fn element_tree(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
        depth: u32,
    ) -> SessionResult<ElementNode>;

    async fn execute_process(&self, process: &UnboundProcess) -> SessionResult<ProcessOutcome>;
}

/// Opens authenticated sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a new session.
    ///
    /// # Errors
    /// Returns `SessionError` when the server is unreachable or rejects the
    /// credentials.
    async fn open(&self, config: &Tm1ConnectionConfig) -> SessionResult<Box<dyn Tm1Session>>;
}
