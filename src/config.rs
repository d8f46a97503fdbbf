// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment exactly once at startup. Any
//! missing or malformed required value is fatal: `main` prints the
//! [`ConfigError`] to stderr and exits before tracing is set up or a socket
//! is bound. That includes the identity provider settings, without which
//! login could not verify anyone.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PLAID_CLIENT_ID` | Plaid client id | Required |
//! | `PLAID_SECRET` | Plaid secret for the selected environment | Required |
//! | `PLAID_ENV` | `sandbox`, `development` or `production` | `sandbox` |
//! | `PLAID_REDIRECT_URI` | OAuth redirect URI passed to Link | None |
//! | `PLAID_CLIENT_NAME` | Name shown inside Plaid Link | `Relational Portfolio` |
//! | `PLAID_COUNTRY_CODES` | Comma separated ISO country codes | `US` |
//! | `IDP_ISSUER` | Expected `iss` of identity-provider tokens | Required |
//! | `IDP_AUDIENCE` | Expected `aud` of identity-provider tokens | Not checked |
//! | `IDP_JWKS_URL` | HTTPS JWKS endpoint of the identity provider | One of these two |
//! | `IDP_JWT_SECRET` | HS256 secret shared with the identity provider (min 32 bytes) | One of these two |
//! | `JWT_SECRET` | HS256 session signing secret (min 32 bytes) | Required |
//! | `SESSION_TTL_SECS` | Session token lifetime | `604800` |
//! | `CREDENTIAL_ENCRYPTION_KEY` | Base64 32-byte key sealing access tokens | Required |
//! | `DATA_DIR` | Directory holding `credentials.redb` | `./data` |
//! | `ALLOWED_ORIGINS` | Comma separated CORS origins | None |
//! | `RATE_LIMIT_WINDOW_SECS` | Rate-limit window length | `900` |
//! | `RATE_LIMIT_MAX_REQUESTS` | Requests per client per window | `100` |
//! | `CREDENTIAL_RETENTION_DAYS` | Purge inactive credentials older than this | Disabled |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use crate::providers::plaid::PlaidEnvironment;

pub const PLAID_CLIENT_ID_ENV: &str = "PLAID_CLIENT_ID";
pub const PLAID_SECRET_ENV: &str = "PLAID_SECRET";
pub const PLAID_ENV_ENV: &str = "PLAID_ENV";
pub const PLAID_REDIRECT_URI_ENV: &str = "PLAID_REDIRECT_URI";
pub const PLAID_CLIENT_NAME_ENV: &str = "PLAID_CLIENT_NAME";
pub const PLAID_COUNTRY_CODES_ENV: &str = "PLAID_COUNTRY_CODES";
pub const IDP_ISSUER_ENV: &str = "IDP_ISSUER";
pub const IDP_AUDIENCE_ENV: &str = "IDP_AUDIENCE";
pub const IDP_JWKS_URL_ENV: &str = "IDP_JWKS_URL";
pub const IDP_JWT_SECRET_ENV: &str = "IDP_JWT_SECRET";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const SESSION_TTL_ENV: &str = "SESSION_TTL_SECS";
pub const CREDENTIAL_KEY_ENV: &str = "CREDENTIAL_ENCRYPTION_KEY";

/// Environment variable name for the credential database directory.
///
/// The credential database is the only durable state of the gateway and
/// holds every linked access token, so the directory should live on a
/// volume only the gateway process can read.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const ALLOWED_ORIGINS_ENV: &str = "ALLOWED_ORIGINS";
pub const RATE_LIMIT_WINDOW_ENV: &str = "RATE_LIMIT_WINDOW_SECS";
pub const RATE_LIMIT_MAX_ENV: &str = "RATE_LIMIT_MAX_REQUESTS";
pub const RETENTION_DAYS_ENV: &str = "CREDENTIAL_RETENTION_DAYS";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CLIENT_NAME: &str = "Relational Portfolio";
const DEFAULT_COUNTRY_CODES: &str = "US";
const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
const MIN_JWT_SECRET_LEN: usize = 32;

/// File name of the credential database inside `DATA_DIR`.
pub const CREDENTIAL_DB_FILE: &str = "credentials.redb";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Plaid credentials and Link defaults.
#[derive(Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub secret: String,
    pub environment: PlaidEnvironment,
    pub redirect_uri: Option<String>,
    pub client_name: String,
    pub country_codes: Vec<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .field("environment", &self.environment)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_name", &self.client_name)
            .field("country_codes", &self.country_codes)
            .finish()
    }
}

/// Key material for verifying identity-provider tokens.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityKeys {
    /// Keys published at an HTTPS JWKS endpoint.
    Jwks(String),
    /// HS256 secret shared with the identity provider.
    SharedSecret(String),
}

impl std::fmt::Debug for IdentityKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKeys::Jwks(url) => f.debug_tuple("Jwks").field(url).finish(),
            IdentityKeys::SharedSecret(_) => {
                f.debug_tuple("SharedSecret").field(&"<redacted>").finish()
            }
        }
    }
}

/// Identity provider whose tokens `POST /auth/login` accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub issuer: String,
    pub audience: Option<String>,
    pub keys: IdentityKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; unset means pretty.
    pub fn parse(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw.map(str::trim) {
            Some("json") => Ok(LogFormat::Json),
            Some("pretty") | Some("") | None => Ok(LogFormat::Pretty),
            Some(other) => Err(ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                reason: format!("`{other}` is not one of json, pretty"),
            }),
        }
    }
}

/// Fully validated process configuration.
#[derive(Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub identity: IdentityConfig,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub credential_key: String,
    pub data_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub credential_retention_days: Option<u32>,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("identity", &self.identity)
            .field("session_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("credential_key", &"<redacted>")
            .field("data_dir", &self.data_dir)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit", &self.rate_limit)
            .field("credential_retention_days", &self.credential_retention_days)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let environment = match env.optional(PLAID_ENV_ENV) {
            Some(raw) => PlaidEnvironment::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                name: PLAID_ENV_ENV,
                reason: format!("`{raw}` is not one of sandbox, development, production"),
            })?,
            None => PlaidEnvironment::Sandbox,
        };

        let redirect_uri = match env.optional(PLAID_REDIRECT_URI_ENV) {
            Some(raw) => {
                url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    name: PLAID_REDIRECT_URI_ENV,
                    reason: e.to_string(),
                })?;
                Some(raw)
            }
            None => None,
        };

        let provider = ProviderConfig {
            client_id: env.required(PLAID_CLIENT_ID_ENV)?,
            secret: env.required(PLAID_SECRET_ENV)?,
            environment,
            redirect_uri,
            client_name: env.or_default(PLAID_CLIENT_NAME_ENV, DEFAULT_CLIENT_NAME),
            country_codes: split_list(&env.or_default(PLAID_COUNTRY_CODES_ENV, DEFAULT_COUNTRY_CODES))
                .into_iter()
                .map(|code| code.to_ascii_uppercase())
                .collect(),
        };

        let identity = IdentityConfig {
            issuer: env.required(IDP_ISSUER_ENV)?,
            audience: env.optional(IDP_AUDIENCE_ENV),
            keys: identity_keys(&env)?,
        };

        let session_secret = env.required(JWT_SECRET_ENV)?;
        if session_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: JWT_SECRET_ENV,
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
            });
        }

        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(env.parsed(
                RATE_LIMIT_WINDOW_ENV,
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?),
            max_requests: env.parsed(RATE_LIMIT_MAX_ENV, DEFAULT_RATE_LIMIT_MAX_REQUESTS)?,
        };
        if rate_limit.window.is_zero() || rate_limit.max_requests == 0 {
            return Err(ConfigError::Invalid {
                name: RATE_LIMIT_MAX_ENV,
                reason: "rate-limit window and ceiling must be positive".to_string(),
            });
        }

        let credential_retention_days = match env.optional(RETENTION_DAYS_ENV) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                name: RETENTION_DAYS_ENV,
                reason: e.to_string(),
            })?),
            None => None,
        };

        let log_format = LogFormat::parse(env.optional(LOG_FORMAT_ENV).as_deref())?;

        Ok(Self {
            provider,
            identity,
            session_secret,
            session_ttl: Duration::from_secs(env.parsed(SESSION_TTL_ENV, DEFAULT_SESSION_TTL_SECS)?),
            credential_key: env.required(CREDENTIAL_KEY_ENV)?,
            data_dir: PathBuf::from(env.or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            allowed_origins: env
                .optional(ALLOWED_ORIGINS_ENV)
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            rate_limit,
            credential_retention_days,
            host: env.or_default(HOST_ENV, DEFAULT_HOST),
            port: env.parsed(PORT_ENV, DEFAULT_PORT)?,
            log_format,
        })
    }

    /// Path of the credential database file.
    pub fn credential_db_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIAL_DB_FILE)
    }
}

/// Exactly one of `IDP_JWKS_URL` and `IDP_JWT_SECRET` must be set.
fn identity_keys<F>(env: &EnvReader<F>) -> Result<IdentityKeys, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match (env.optional(IDP_JWKS_URL_ENV), env.optional(IDP_JWT_SECRET_ENV)) {
        (Some(_), Some(_)) => Err(ConfigError::Invalid {
            name: IDP_JWT_SECRET_ENV,
            reason: format!("set either {IDP_JWKS_URL_ENV} or {IDP_JWT_SECRET_ENV}, not both"),
        }),
        (Some(raw), None) => {
            let url = url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                name: IDP_JWKS_URL_ENV,
                reason: e.to_string(),
            })?;
            if url.scheme() != "https" {
                return Err(ConfigError::Invalid {
                    name: IDP_JWKS_URL_ENV,
                    reason: "must be an https URL".to_string(),
                });
            }
            Ok(IdentityKeys::Jwks(raw))
        }
        (None, Some(secret)) => {
            if secret.len() < MIN_JWT_SECRET_LEN {
                return Err(ConfigError::Invalid {
                    name: IDP_JWT_SECRET_ENV,
                    reason: format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
                });
            }
            Ok(IdentityKeys::SharedSecret(secret))
        }
        (None, None) => Err(ConfigError::Missing(IDP_JWKS_URL_ENV)),
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (PLAID_CLIENT_ID_ENV, "client-id".to_string()),
            (PLAID_SECRET_ENV, "plaid-secret".to_string()),
            (JWT_SECRET_ENV, "x".repeat(32)),
            (IDP_ISSUER_ENV, "https://idp.example".to_string()),
            (
                IDP_JWKS_URL_ENV,
                "https://idp.example/.well-known/jwks.json".to_string(),
            ),
            (
                CREDENTIAL_KEY_ENV,
                "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
            ),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.provider.environment, PlaidEnvironment::Sandbox);
        assert_eq!(config.provider.country_codes, vec!["US".to_string()]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert!(config.allowed_origins.is_empty());
        assert!(config.credential_retention_days.is_none());
        assert_eq!(config.credential_db_path(), PathBuf::from("./data/credentials.redb"));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(
            config.identity.keys,
            IdentityKeys::Jwks("https://idp.example/.well-known/jwks.json".to_string())
        );
        assert!(config.identity.audience.is_none());
    }

    #[test]
    fn missing_identity_provider_is_fatal() {
        let mut env = base_env();
        env.remove(IDP_JWKS_URL_ENV);
        assert_eq!(load(&env).unwrap_err(), ConfigError::Missing(IDP_JWKS_URL_ENV));

        let mut env = base_env();
        env.remove(IDP_ISSUER_ENV);
        assert_eq!(load(&env).unwrap_err(), ConfigError::Missing(IDP_ISSUER_ENV));
    }

    #[test]
    fn identity_keys_must_be_unambiguous_and_safe() {
        let mut env = base_env();
        env.insert(IDP_JWT_SECRET_ENV, "s".repeat(32));
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { name: IDP_JWT_SECRET_ENV, .. })
        ));

        let mut env = base_env();
        env.insert(IDP_JWKS_URL_ENV, "http://idp.example/jwks.json".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { name: IDP_JWKS_URL_ENV, .. })
        ));

        let mut env = base_env();
        env.remove(IDP_JWKS_URL_ENV);
        env.insert(IDP_JWT_SECRET_ENV, "short".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { name: IDP_JWT_SECRET_ENV, .. })
        ));
    }

    #[test]
    fn shared_identity_secret_and_audience_are_read() {
        let mut env = base_env();
        env.remove(IDP_JWKS_URL_ENV);
        env.insert(IDP_JWT_SECRET_ENV, "s".repeat(32));
        env.insert(IDP_AUDIENCE_ENV, "portfolio-app".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.identity.keys, IdentityKeys::SharedSecret("s".repeat(32)));
        assert_eq!(config.identity.audience.as_deref(), Some("portfolio-app"));
        assert!(!format!("{config:?}").contains(&"s".repeat(32)));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut env = base_env();
        env.insert(LOG_FORMAT_ENV, "yaml".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { name: LOG_FORMAT_ENV, .. })
        ));
    }

    #[test]
    fn missing_required_value_is_reported_by_name() {
        let mut env = base_env();
        env.remove(PLAID_SECRET_ENV);
        assert_eq!(load(&env).unwrap_err(), ConfigError::Missing(PLAID_SECRET_ENV));
    }

    #[test]
    fn blank_required_value_counts_as_missing() {
        let mut env = base_env();
        env.insert(CREDENTIAL_KEY_ENV, "   ".to_string());
        assert_eq!(load(&env).unwrap_err(), ConfigError::Missing(CREDENTIAL_KEY_ENV));
    }

    #[test]
    fn unknown_provider_environment_is_rejected() {
        let mut env = base_env();
        env.insert(PLAID_ENV_ENV, "staging".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { name: PLAID_ENV_ENV, .. })
        ));
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let mut env = base_env();
        env.insert(JWT_SECRET_ENV, "too-short".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { name: JWT_SECRET_ENV, .. })
        ));
    }

    #[test]
    fn lists_and_numbers_are_parsed() {
        let mut env = base_env();
        env.insert(PLAID_ENV_ENV, "Production".to_string());
        env.insert(ALLOWED_ORIGINS_ENV, "https://a.example, https://b.example,".to_string());
        env.insert(RATE_LIMIT_MAX_ENV, "5".to_string());
        env.insert(RETENTION_DAYS_ENV, "30".to_string());
        env.insert(LOG_FORMAT_ENV, "json".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.provider.environment, PlaidEnvironment::Production);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.credential_retention_days, Some(30));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_number_is_invalid() {
        let mut env = base_env();
        env.insert(PORT_ENV, "eighty".to_string());
        assert!(matches!(load(&env), Err(ConfigError::Invalid { name: PORT_ENV, .. })));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = load(&base_env()).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("plaid-secret"));
        assert!(!rendered.contains(&"x".repeat(32)));
    }
}
