//! Startup configuration: command-line flags, environment, credentials file.

use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::auth::SessionMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse credentials file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// OAuth application credentials issued by the provider.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Load `{client_id, client_secret}` from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let credentials: Credentials =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        credentials.validate()?;
        Ok(credentials)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("client_id is empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("client_secret is empty".to_string()));
        }
        Ok(())
    }
}

/// Command-line interface of the gateway binary.
#[derive(Parser, Debug)]
#[command(name = "oauth_greeter")]
#[command(about = "OAuth authorization-code gateway that greets you by your login", long_about = None)]
pub struct Cli {
    /// JSON file holding {"client_id": ..., "client_secret": ...}
    #[arg(long, env = "OHYEAH_CREDENTIALS", default_value = "./credential.json")]
    pub credentials: PathBuf,

    /// Address to listen on
    #[arg(long, env = "OHYEAH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "OHYEAH_PORT", default_value_t = 4321)]
    pub port: u16,

    /// Identity provider host (authorize, token and user endpoints live here)
    #[arg(long, env = "OHYEAH_PROVIDER_HOST", default_value = "github.com")]
    pub provider_host: String,

    /// Upper bound, in seconds, on the provider calls made for one request
    #[arg(long, env = "OHYEAH_TIMEOUT_SECS", default_value_t = 5)]
    pub timeout_secs: u64,

    /// One token for the whole process, or one per caller session cookie
    #[arg(long, env = "OHYEAH_SESSION_MODE", value_enum, default_value = "global")]
    pub session_mode: SessionMode,

    /// Talk plain HTTP to the provider (local stub providers only)
    #[arg(long, env = "OHYEAH_PROVIDER_PLAINTEXT")]
    pub provider_plaintext: bool,

    /// Serve unmatched paths from this directory
    #[arg(long, env = "OHYEAH_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

/// Everything the server needs, resolved at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub provider_host: String,
    pub provider_plaintext: bool,
    pub timeout: Duration,
    pub session_mode: SessionMode,
    pub static_dir: Option<PathBuf>,
}

impl GatewayConfig {
    /// Resolve the CLI into a config. Fails if the credentials file is
    /// unreadable or malformed, before anything starts listening.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeout must be at least one second".to_string(),
            ));
        }
        if cli.provider_host.trim().is_empty() {
            return Err(ConfigError::Invalid("provider host is empty".to_string()));
        }

        let credentials = Credentials::from_file(&cli.credentials)?;

        Ok(Self {
            host: cli.host,
            port: cli.port,
            credentials,
            provider_host: cli.provider_host,
            provider_plaintext: cli.provider_plaintext,
            timeout: Duration::from_secs(cli.timeout_secs),
            session_mode: cli.session_mode,
            static_dir: cli.static_dir,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn credentials_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn cli_for(path: &Path) -> Cli {
        Cli::parse_from([
            "oauth_greeter",
            "--credentials",
            path.to_str().unwrap(),
            "--port",
            "8080",
        ])
    }

    #[test]
    fn test_load_credentials() {
        let file = credentials_file(r#"{"client_id":"abc","client_secret":"xyz"}"#);
        let credentials = Credentials::from_file(file.path()).unwrap();
        assert_eq!(credentials.client_id, "abc");
        assert_eq!(credentials.client_secret, "xyz");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Credentials::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let file = credentials_file(r#"{"client_id":"abc"}"#);
        match Credentials::from_file(file.path()).unwrap_err() {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {:?}", other),
        }

        let file = credentials_file("not json");
        assert!(matches!(
            Credentials::from_file(file.path()).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let err = Credentials::from_json(r#"{"client_id":"","client_secret":"xyz"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials =
            Credentials::from_json(r#"{"client_id":"abc","client_secret":"xyz"}"#).unwrap();
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("abc"));
        assert!(!printed.contains("xyz"));
    }

    #[test]
    fn test_config_from_cli() {
        let file = credentials_file(r#"{"client_id":"abc","client_secret":"xyz"}"#);
        let config = GatewayConfig::from_cli(cli_for(file.path())).unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.provider_host, "github.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.session_mode, SessionMode::Global);
        assert!(!config.provider_plaintext);
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_session_mode_flag() {
        let file = credentials_file(r#"{"client_id":"abc","client_secret":"xyz"}"#);
        let cli = Cli::parse_from([
            "oauth_greeter",
            "--credentials",
            file.path().to_str().unwrap(),
            "--session-mode",
            "per-caller",
        ]);
        let config = GatewayConfig::from_cli(cli).unwrap();
        assert_eq!(config.session_mode, SessionMode::PerCaller);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = credentials_file(r#"{"client_id":"abc","client_secret":"xyz"}"#);
        let mut cli = cli_for(file.path());
        cli.timeout_secs = 0;
        assert!(matches!(
            GatewayConfig::from_cli(cli).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }
}
