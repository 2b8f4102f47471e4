use clap::{Parser, builder::BoolishValueParser};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tm1_core::Tm1ConnectionConfig;

const DEFAULT_ADDRESS: &str = "localhost";
const DEFAULT_PORT: u16 = 8010;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SESSION_CONTEXT: &str = "tm1-mcp";
const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4030";
const DEFAULT_SSE_KEEP_ALIVE_SECS: u64 = 15;
const DEFAULT_DOCS_DB_URI: &str = "mem://";
const DEFAULT_DOCS_NAMESPACE: &str = "tm1";
const DEFAULT_DOCS_DATABASE: &str = "ti_documentation";
const DEFAULT_EMBED_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;

/// Command line and environment settings. Every value is optional so that a
/// TOML file can fill the gaps; anything given here wins over the file.
#[derive(Parser, Debug, Default)]
#[command(name = "tm1-mcpd", version, about = "TM1 MCP daemon.")]
struct CliArgs {
    #[arg(long, env = "TM1_MCP_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "TM1_ADDRESS")]
    address: Option<String>,

    #[arg(long, env = "TM1_PORT")]
    port: Option<u16>,

    #[arg(long, env = "TM1_SSL", value_parser = BoolishValueParser::new())]
    ssl: Option<bool>,

    #[arg(long, env = "TM1_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "TM1_USER")]
    user: Option<String>,

    #[arg(long, env = "TM1_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, env = "TM1_NAMESPACE")]
    namespace: Option<String>,

    #[arg(long, env = "TM1_VERIFY_TLS", value_parser = BoolishValueParser::new())]
    verify_tls: Option<bool>,

    #[arg(long, env = "TM1_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, env = "TM1_SESSION_CONTEXT")]
    session_context: Option<String>,

    #[arg(long = "stdio", env = "TM1_MCP_STDIO", value_parser = BoolishValueParser::new())]
    stdio: Option<bool>,

    #[arg(long, env = "TM1_MCP_HTTP_ADDR")]
    http_addr: Option<SocketAddr>,

    #[arg(long, env = "TM1_MCP_HTTP_STATEFUL", value_parser = BoolishValueParser::new())]
    http_stateful: Option<bool>,

    /// Seconds between SSE keep-alive pings; 0 turns them off.
    #[arg(long, env = "TM1_MCP_SSE_KEEP_ALIVE_SECS")]
    sse_keep_alive_secs: Option<u64>,

    #[arg(long, env = "TM1_DOCS_DB_URI")]
    docs_db_uri: Option<String>,

    #[arg(long, env = "TM1_DOCS_DB_USERNAME")]
    docs_db_username: Option<String>,

    #[arg(long, env = "TM1_DOCS_DB_PASSWORD", hide_env_values = true)]
    docs_db_password: Option<String>,

    #[arg(long, env = "TM1_DOCS_NAMESPACE")]
    docs_namespace: Option<String>,

    #[arg(long, env = "TM1_DOCS_DATABASE")]
    docs_database: Option<String>,

    #[arg(long, env = "TM1_DOCS_SEED_DIR")]
    docs_seed_dir: Option<PathBuf>,

    #[arg(long, env = "TM1_EMBED_URL")]
    embed_url: Option<String>,

    #[arg(long, env = "TM1_EMBED_MODEL")]
    embed_model: Option<String>,
}

/// Settings read from the optional TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    address: Option<String>,
    port: Option<u16>,
    ssl: Option<bool>,
    base_url: Option<String>,
    user: Option<String>,
    password: Option<String>,
    namespace: Option<String>,
    verify_tls: Option<bool>,
    timeout_secs: Option<u64>,
    session_context: Option<String>,
    stdio: Option<bool>,
    http_addr: Option<SocketAddr>,
    http_stateful: Option<bool>,
    sse_keep_alive_secs: Option<u64>,
    docs_db_uri: Option<String>,
    docs_db_username: Option<String>,
    docs_db_password: Option<String>,
    docs_namespace: Option<String>,
    docs_database: Option<String>,
    docs_seed_dir: Option<PathBuf>,
    embed_url: Option<String>,
    embed_model: Option<String>,
}

/// Documentation index settings.
#[derive(Debug, Clone)]
pub struct DocsConfig {
    pub db_uri: String,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
    pub namespace: String,
    pub database: String,
    pub seed_dir: Option<PathBuf>,
    pub embed_url: String,
    pub embed_model: String,
    pub embed_timeout: Duration,
}

/// Runtime configuration loaded from CLI arguments, environment variables
/// and the optional TOML file.
#[derive(Debug, Clone)]
pub struct Tm1McpConfig {
    pub connection: Tm1ConnectionConfig,
    pub stdio: bool,
    pub http_addr: SocketAddr,
    pub http_stateful: bool,
    pub sse_keep_alive: Option<Duration>,
    pub docs: DocsConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
    File { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
            Self::File { path, message } => {
                write!(f, "failed to read config file {}: {message}", path.display())
            }
        }
    }
}

impl Error for ConfigError {}

impl Tm1McpConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    fn resolve(args: CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let user = non_empty(args.user.or(file.user))
            .ok_or(ConfigError::MissingSetting("TM1_USER"))?;
        let password = args
            .password
            .or(file.password)
            .ok_or(ConfigError::MissingSetting("TM1_PASSWORD"))?;

        let base_url = match non_empty(args.base_url.or(file.base_url)) {
            Some(base_url) => base_url,
            None => {
                let address = args
                    .address
                    .or(file.address)
                    .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
                if address.trim().is_empty() {
                    return Err(ConfigError::InvalidSetting {
                        name: "TM1_ADDRESS",
                        value: address,
                    });
                }
                let port = args.port.or(file.port).unwrap_or(DEFAULT_PORT);
                let ssl = args.ssl.or(file.ssl).unwrap_or(true);
                Tm1ConnectionConfig::base_url_for(address.trim(), port, ssl)
            }
        };
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidSetting {
                name: "TM1_BASE_URL",
                value: base_url,
            });
        }

        let timeout_secs = args
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "TM1_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
            });
        }

        let connection = Tm1ConnectionConfig::new(base_url, user, password)
            .with_namespace(non_empty(args.namespace.or(file.namespace)))
            .with_verify_tls(args.verify_tls.or(file.verify_tls).unwrap_or(true))
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_session_context(
                non_empty(args.session_context.or(file.session_context))
                    .unwrap_or_else(|| DEFAULT_SESSION_CONTEXT.to_string()),
            );

        let http_addr = match args.http_addr.or(file.http_addr) {
            Some(addr) => addr,
            None => DEFAULT_MCP_HTTP_ADDR
                .parse()
                .map_err(|_| ConfigError::InvalidSetting {
                    name: "TM1_MCP_HTTP_ADDR",
                    value: DEFAULT_MCP_HTTP_ADDR.to_string(),
                })?,
        };

        let sse_keep_alive = match args
            .sse_keep_alive_secs
            .or(file.sse_keep_alive_secs)
            .unwrap_or(DEFAULT_SSE_KEEP_ALIVE_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let docs = DocsConfig {
            db_uri: non_empty(args.docs_db_uri.or(file.docs_db_uri))
                .unwrap_or_else(|| DEFAULT_DOCS_DB_URI.to_string()),
            db_username: non_empty(args.docs_db_username.or(file.docs_db_username)),
            db_password: non_empty(args.docs_db_password.or(file.docs_db_password)),
            namespace: non_empty(args.docs_namespace.or(file.docs_namespace))
                .unwrap_or_else(|| DEFAULT_DOCS_NAMESPACE.to_string()),
            database: non_empty(args.docs_database.or(file.docs_database))
                .unwrap_or_else(|| DEFAULT_DOCS_DATABASE.to_string()),
            seed_dir: args.docs_seed_dir.or(file.docs_seed_dir),
            embed_url: non_empty(args.embed_url.or(file.embed_url))
                .unwrap_or_else(|| DEFAULT_EMBED_URL.to_string()),
            embed_model: non_empty(args.embed_model.or(file.embed_model))
                .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            embed_timeout: Duration::from_secs(DEFAULT_EMBED_TIMEOUT_SECS),
        };
        if docs.db_username.is_some() != docs.db_password.is_some() {
            return Err(ConfigError::MissingSetting(if docs.db_username.is_some() {
                "TM1_DOCS_DB_PASSWORD"
            } else {
                "TM1_DOCS_DB_USERNAME"
            }));
        }

        Ok(Self {
            connection,
            stdio: args.stdio.or(file.stdio).unwrap_or(true),
            http_addr,
            http_stateful: args.http_stateful.or(file.http_stateful).unwrap_or(true),
            sse_keep_alive,
            docs,
        })
    }
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |message: String| ConfigError::File {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;
        toml::from_str(&text).map_err(|err| file_error(err.to_string()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            user: Some("admin".to_string()),
            password: Some("apple".to_string()),
            ..CliArgs::default()
        }
    }

    #[test]
    fn defaults_follow_documented_values() {
        let config = Tm1McpConfig::resolve(base_args(), FileConfig::default())
            .expect("config should parse");

        assert_eq!(config.connection.base_url, "https://localhost:8010");
        assert!(config.connection.verify_tls);
        assert!(config.connection.namespace.is_none());
        assert_eq!(config.connection.timeout, Duration::from_secs(60));
        assert_eq!(config.connection.session_context, "tm1-mcp");
        assert!(config.stdio);
        assert_eq!(config.http_addr.to_string(), "127.0.0.1:4030");
        assert!(config.http_stateful);
        assert_eq!(config.sse_keep_alive, Some(Duration::from_secs(15)));
        assert_eq!(config.docs.db_uri, "mem://");
        assert_eq!(config.docs.namespace, "tm1");
        assert_eq!(config.docs.database, "ti_documentation");
        assert_eq!(config.docs.embed_model, "nomic-embed-text");
    }

    #[test]
    fn cli_values_win_over_file() {
        let mut args = base_args();
        args.port = Some(12354);
        args.ssl = Some(false);
        let file: FileConfig = toml::from_str(
            r#"
            address = "tm1.example.com"
            port = 8001
            namespace = "LDAP"
            stdio = false
            "#,
        )
        .expect("file should parse");

        let config = Tm1McpConfig::resolve(args, file).expect("config should parse");

        assert_eq!(config.connection.base_url, "http://tm1.example.com:12354");
        assert_eq!(config.connection.namespace.as_deref(), Some("LDAP"));
        assert!(!config.stdio);
    }

    #[test]
    fn http_transport_settings_resolve() {
        let file: FileConfig = toml::from_str(
            r#"
            http_stateful = false
            sse_keep_alive_secs = 30
            "#,
        )
        .expect("file should parse");
        let config = Tm1McpConfig::resolve(base_args(), file).expect("config should parse");
        assert!(!config.http_stateful);
        assert_eq!(config.sse_keep_alive, Some(Duration::from_secs(30)));

        let mut args = base_args();
        args.sse_keep_alive_secs = Some(0);
        let config = Tm1McpConfig::resolve(args, FileConfig::default())
            .expect("config should parse");
        assert!(config.sse_keep_alive.is_none());
    }

    #[test]
    fn explicit_base_url_is_used_verbatim() {
        let mut args = base_args();
        args.base_url = Some("https://pa.example.com/tm1/Planning".to_string());
        args.port = Some(1);

        let config = Tm1McpConfig::resolve(args, FileConfig::default())
            .expect("config should parse");

        assert_eq!(config.connection.base_url, "https://pa.example.com/tm1/Planning");
    }

    #[test]
    fn missing_credentials_are_reported() {
        let mut args = base_args();
        args.user = Some("  ".to_string());
        let err = Tm1McpConfig::resolve(args, FileConfig::default())
            .expect_err("blank user should fail");
        assert!(matches!(err, ConfigError::MissingSetting("TM1_USER")));

        let mut args = base_args();
        args.password = None;
        let err = Tm1McpConfig::resolve(args, FileConfig::default())
            .expect_err("missing password should fail");
        assert!(matches!(err, ConfigError::MissingSetting("TM1_PASSWORD")));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut args = base_args();
        args.timeout_secs = Some(0);
        let err = Tm1McpConfig::resolve(args, FileConfig::default())
            .expect_err("zero timeout should fail");
        assert!(matches!(err, ConfigError::InvalidSetting { name: "TM1_TIMEOUT_SECS", .. }));

        let mut args = base_args();
        args.docs_db_username = Some("root".to_string());
        let err = Tm1McpConfig::resolve(args, FileConfig::default())
            .expect_err("username without password should fail");
        assert!(matches!(err, ConfigError::MissingSetting("TM1_DOCS_DB_PASSWORD")));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let parsed: Result<FileConfig, _> = toml::from_str("adress = \"typo\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
