//! Configuration for Elmax API consumers.
//!
//! Layers built-in defaults, a TOML file, and `ELMAX_*` environment
//! variables, then translates the result into an
//! [`elmax_api::ClientConfig`] for the cloud or, when `panel_api_url` is
//! set, for a panel on the local network.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use elmax_api::{Backend, ClientConfig, Credentials, DEFAULT_API_URL, TlsMode, TransportConfig};

/// Prefix of the environment variables read by [`load_config`].
pub const ENV_PREFIX: &str = "ELMAX_";

/// Secrets read verbatim from the environment. Figment would parse an
/// all-digit value as a number.
const PASSWORD_ENV: &str = "ELMAX_PASSWORD";
const PANEL_CODE_ENV: &str = "ELMAX_PANEL_CODE";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {field} configured (set it in the config file or ELMAX_{})", field.to_uppercase())]
    NoCredentials { field: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// Settings as read from file and environment.
#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base REST endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Push channel URL (`wss://...`). Push is unavailable without it.
    pub push_endpoint: Option<String>,

    /// Cloud account e-mail.
    pub username: Option<String>,

    /// Cloud account password (plaintext; prefer `ELMAX_PASSWORD`).
    pub password: Option<String>,

    /// Panel PIN. Also the login secret in local mode.
    pub panel_code: Option<String>,

    /// Local panel API (`https://<panel>/api/v2`). Selects local mode,
    /// which needs `panel_code` instead of account credentials.
    pub panel_api_url: Option<String>,

    /// Pinned panel certificate (PEM), for local mode.
    pub server_cert: Option<PathBuf>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Accept invalid TLS certificates on REST calls.
    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate (PEM).
    pub ca_cert: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            push_endpoint: None,
            username: None,
            password: None,
            panel_code: None,
            panel_api_url: None,
            server_cert: None,
            timeout: default_timeout(),
            insecure: false,
            ca_cert: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("push_endpoint", &self.push_endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("panel_code", &self.panel_code.as_ref().map(|_| "[REDACTED]"))
            .field("panel_api_url", &self.panel_api_url)
            .field("server_cert", &self.server_cert)
            .field("timeout", &self.timeout)
            .field("insecure", &self.insecure)
            .field("ca_cert", &self.ca_cert)
            .finish()
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}
fn default_timeout() -> u64 {
    10
}

impl Config {
    /// Build the client configuration, resolving credentials and TLS.
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let (api_url, backend) = match self.panel_api_url.as_deref() {
            Some(raw) => (http_url("panel_api_url", raw)?, Backend::Local),
            None => (
                http_url("api_url", &self.api_url)?,
                Backend::Cloud(self.credentials()?),
            ),
        };

        let push_endpoint = self
            .push_endpoint
            .as_deref()
            .map(|raw| {
                let url = parse_url("push_endpoint", raw)?;
                if matches!(url.scheme(), "ws" | "wss") {
                    Ok(url)
                } else {
                    Err(ConfigError::Validation {
                        field: "push_endpoint".into(),
                        reason: format!("expected a ws(s) URL, got '{raw}'"),
                    })
                }
            })
            .transpose()?;

        let panel_code = self.panel_code.clone().filter(|c| !c.trim().is_empty());
        if matches!(backend, Backend::Local) && panel_code.is_none() {
            return Err(ConfigError::NoCredentials {
                field: "panel_code".into(),
            });
        }

        if self.timeout == 0 {
            return Err(ConfigError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        let tls = if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref cert_path) = self.server_cert {
            TlsMode::PinnedCertificate(std::fs::read_to_string(cert_path)?)
        } else if let Some(ref ca_path) = self.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };

        Ok(ClientConfig {
            api_url,
            push_endpoint,
            backend,
            panel_code: panel_code.map(SecretString::from),
            transport: TransportConfig {
                tls,
                timeout: Duration::from_secs(self.timeout),
            },
        })
    }

    fn credentials(&self) -> Result<Credentials, ConfigError> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::NoCredentials {
                field: "username".into(),
            })?;
        let password = self
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::NoCredentials {
                field: "password".into(),
            })?;
        Ok(Credentials::new(username, SecretString::from(password)))
    }

    /// Overlay the secrets figment was told to skip.
    fn apply_secret_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.password = Some(password);
        }
        if let Ok(code) = std::env::var(PANEL_CODE_ENV) {
            self.panel_code = Some(code);
        }
    }
}

fn http_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = parse_url(field, raw)?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(url)
    } else {
        Err(ConfigError::Validation {
            field: field.into(),
            reason: format!("expected an http(s) URL, got '{raw}'"),
        })
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("it", "elmax", "elmax-api").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("elmax-api");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the Config from the default file (if present) and environment.
pub fn load_config() -> Result<Config, ConfigError> {
    extract(&config_path())
}

/// Load the Config from an explicit file, which must exist, plus
/// environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    std::fs::metadata(path)?;
    extract(path)
}

fn extract(path: &Path) -> Result<Config, ConfigError> {
    let mut config: Config = figment(path).extract()?;
    config.apply_secret_env();
    Ok(config)
}

fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["password", "panel_code"]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn load(path: &str) -> figment::error::Result<Config> {
        load_config_from(Path::new(path)).map_err(|e| e.to_string().into())
    }

    #[test]
    fn file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    username = "owner@example.com"
                    password = "from-file"
                    panel_code = "123456"
                    push_endpoint = "wss://push.example.com/push"
                "#,
            )?;
            jail.set_env("ELMAX_PASSWORD", "from-env");
            jail.set_env("ELMAX_TIMEOUT", "25");

            let config = load("config.toml")?;
            assert_eq!(config.api_url, DEFAULT_API_URL);
            assert_eq!(config.username.as_deref(), Some("owner@example.com"));
            assert_eq!(config.password.as_deref(), Some("from-env"));
            assert_eq!(config.timeout, 25);
            assert!(!config.insecure);

            let client = config
                .to_client_config()
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(client.api_url.as_str(), "https://cloud.elmaxsrl.it/");
            assert_eq!(
                client.push_endpoint.as_ref().map(Url::as_str),
                Some("wss://push.example.com/push")
            );
            assert!(matches!(
                client.backend,
                Backend::Cloud(ref c) if c.username == "owner@example.com"
            ));
            assert_eq!(client.transport.timeout, Duration::from_secs(25));
            assert!(matches!(client.transport.tls, TlsMode::System));
            Ok(())
        });
    }

    #[test]
    fn env_only() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "")?;
            jail.set_env("ELMAX_USERNAME", "env@example.com");
            jail.set_env("ELMAX_PASSWORD", "secret");
            jail.set_env("ELMAX_API_URL", "https://panel.local/api/v2");
            jail.set_env("ELMAX_INSECURE", "true");

            let config = load("config.toml")?;
            let client = config
                .to_client_config()
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert!(matches!(
                client.backend,
                Backend::Cloud(ref c) if c.username == "env@example.com"
            ));
            assert_eq!(client.api_url.as_str(), "https://panel.local/api/v2");
            assert!(matches!(client.transport.tls, TlsMode::DangerAcceptInvalid));
            assert!(client.panel_code.is_none());
            Ok(())
        });
    }

    #[test]
    fn numeric_secrets_keep_leading_zeros() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", r#"username = "owner@example.com""#)?;
            jail.set_env("ELMAX_PASSWORD", "0042");
            jail.set_env("ELMAX_PANEL_CODE", "000123");

            let config = load("config.toml")?;
            assert_eq!(config.password.as_deref(), Some("0042"));
            assert_eq!(config.panel_code.as_deref(), Some("000123"));

            let client = config
                .to_client_config()
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(
                client.panel_code.as_ref().map(|c| c.expose_secret().to_owned()),
                Some("000123".to_owned())
            );
            Ok(())
        });
    }

    #[test]
    fn panel_api_url_selects_local_mode() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    panel_api_url = "https://192.168.1.10/api/v2"
                    server_cert = "panel.pem"
                "#,
            )?;
            jail.create_file("panel.pem", "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n")?;
            jail.set_env("ELMAX_PANEL_CODE", "000000");

            let config = load("config.toml")?;
            let client = config
                .to_client_config()
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert!(matches!(client.backend, Backend::Local));
            assert_eq!(client.api_url.as_str(), "https://192.168.1.10/api/v2");
            assert!(matches!(
                client.transport.tls,
                TlsMode::PinnedCertificate(ref pem) if pem.starts_with("-----BEGIN CERTIFICATE-----")
            ));
            Ok(())
        });
    }

    #[test]
    fn local_mode_requires_a_panel_code() {
        let config = Config {
            panel_api_url: Some("https://192.168.1.10/api/v2".into()),
            ..Config::default()
        };
        match config.to_client_config() {
            Err(ConfigError::NoCredentials { field }) => assert_eq!(field, "panel_code"),
            other => panic!("expected NoCredentials, got {other:?}"),
        }
    }

    #[test]
    fn missing_password_names_the_field() {
        let config = Config {
            username: Some("owner@example.com".into()),
            ..Config::default()
        };
        match config.to_client_config() {
            Err(ConfigError::NoCredentials { field }) => assert_eq!(field, "password"),
            other => panic!("expected NoCredentials, got {other:?}"),
        }
    }

    #[test]
    fn bad_urls_are_validation_errors() {
        let base = Config {
            username: Some("owner@example.com".into()),
            password: Some("secret".into()),
            ..Config::default()
        };

        let bad_api = Config {
            api_url: "not a url".into(),
            ..base.clone()
        };
        assert!(matches!(
            bad_api.to_client_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "api_url"
        ));

        let http_push = Config {
            push_endpoint: Some("https://push.example.com".into()),
            ..base
        };
        assert!(matches!(
            http_push.to_client_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "push_endpoint"
        ));
    }

    #[test]
    fn ca_cert_selects_custom_roots() {
        let config = Config {
            username: Some("owner@example.com".into()),
            password: Some("secret".into()),
            ca_cert: Some(PathBuf::from("/etc/elmax/ca.pem")),
            ..Config::default()
        };
        let client = config.to_client_config().unwrap();
        assert!(matches!(
            client.transport.tls,
            TlsMode::CustomCa(ref p) if p == Path::new("/etc/elmax/ca.pem")
        ));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(load_config_from(&missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = Config {
            password: Some("hunter2".into()),
            panel_code: Some("123456".into()),
            ..Config::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("123456"));
    }
}
