//! Configuration for a Warden auth session.
//!
//! Read from `~/.warden/config.toml`:
//!
//! ```toml
//! api_key = "${MY_PROJECT_KEY}"
//! app_name = "[DEFAULT]"
//!
//! [endpoints]
//! identity_toolkit_url = "http://localhost:9099/identitytoolkit/v3/relyingparty"
//! secure_token_url = "http://localhost:9099/securetoken/v1/token"
//!
//! [token]
//! refresh_interval_secs = 2700
//! retry_after_failure_secs = 30
//! expiry_buffer_secs = 300
//!
//! [rpc]
//! timeout_secs = 30
//! max_retries = 2
//! worker_threads = 2
//! allow_insecure_http = true
//! ```
//!
//! `WARDEN_API_KEY` overrides `api_key`. String values may reference
//! environment variables as `${NAME}`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use warden_rpc::{Endpoints, HttpOptions, IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL};
use warden_types::ApiKey;

pub const API_KEY_ENV: &str = "WARDEN_API_KEY";
pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config from {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },
    #[error("no API key configured; set `api_key` or {API_KEY_ENV}")]
    MissingApiKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub identity_toolkit_url: String,
    pub secure_token_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            identity_toolkit_url: IDENTITY_TOOLKIT_URL.to_string(),
            secure_token_url: SECURE_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Age after which the refresher forces a new id token.
    pub refresh_interval_secs: u64,
    /// Minimum wait after a failed forced refresh.
    pub retry_after_failure_secs: u64,
    /// A cached token this close to expiry is refreshed even when not forced.
    pub expiry_buffer_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 45 * 60,
            retry_after_failure_secs: 30,
            expiry_buffer_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub worker_threads: usize,
    /// Permit `http://` endpoints. Only for local emulators and tests.
    pub allow_insecure_http: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            worker_threads: 2,
            allow_insecure_http: false,
        }
    }
}

/// On-disk shape. Everything is optional so a partial file still loads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    api_key: Option<String>,
    app_name: Option<String>,
    endpoints: EndpointsConfig,
    token: TokenConfig,
    rpc: RpcConfig,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_key: ApiKey,
    pub app_name: String,
    pub endpoints: EndpointsConfig,
    pub token: TokenConfig,
    pub rpc: RpcConfig,
}

impl AuthConfig {
    /// Defaults everywhere, with the given key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: ApiKey::new(api_key),
            app_name: DEFAULT_APP_NAME.to_string(),
            endpoints: EndpointsConfig::default(),
            token: TokenConfig::default(),
            rpc: RpcConfig::default(),
        }
    }

    /// Load `~/.warden/config.toml`, falling back to defaults plus
    /// `WARDEN_API_KEY` when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::resolve(RawConfig::default(), &env_lookup),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        let raw = parse(&content, &path.display().to_string())?;
        Self::resolve(raw, &env_lookup)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::resolve(parse(content, "<string>")?, &env_lookup)
    }

    fn resolve(raw: RawConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = env(API_KEY_ENV)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| raw.api_key.map(|key| expand_env_vars(&key, env)))
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let endpoints = EndpointsConfig {
            identity_toolkit_url: expand_env_vars(&raw.endpoints.identity_toolkit_url, env),
            secure_token_url: expand_env_vars(&raw.endpoints.secure_token_url, env),
        };

        Ok(Self {
            api_key: ApiKey::new(api_key),
            app_name: raw
                .app_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            endpoints,
            token: raw.token,
            rpc: raw.rpc,
        })
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token.refresh_interval_secs)
    }

    #[must_use]
    pub fn retry_after_failure(&self) -> Duration {
        Duration::from_secs(self.token.retry_after_failure_secs)
    }

    #[must_use]
    pub fn expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.token.expiry_buffer_secs)
    }

    #[must_use]
    pub fn backend_endpoints(&self) -> Endpoints {
        Endpoints::new(
            self.endpoints.identity_toolkit_url.clone(),
            self.endpoints.secure_token_url.clone(),
        )
    }

    #[must_use]
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.rpc.timeout_secs),
            max_retries: self.rpc.max_retries,
            allow_insecure_http: self.rpc.allow_insecure_http,
        }
    }

    /// Point both services at one emulator host and allow plain HTTP.
    #[must_use]
    pub fn with_emulator(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.endpoints = EndpointsConfig {
            identity_toolkit_url: format!("{base}/identitytoolkit/v3/relyingparty"),
            secure_token_url: format!("{base}/securetoken/v1/token"),
        };
        self.rpc.allow_insecure_http = true;
        self
    }
}

fn parse(content: &str, origin: &str) -> Result<RawConfig, ConfigError> {
    toml::from_str(content).map_err(|err| {
        tracing::warn!("Failed to parse config from {}: {}", origin, err);
        ConfigError::Parse {
            origin: origin.to_string(),
            source: err,
        }
    })
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Replace `${NAME}` references. Unset variables expand to the empty string.
fn expand_env_vars(value: &str, env: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + end_rel];
        if !name.is_empty() {
            out.push_str(&env(name).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }

    out.push_str(rest);
    out
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".warden").join("config.toml"))
}
