//! Configuration loading for the Grace connect service.
//!
//! Loads layered `.env` files and environment variables, producing a typed
//! [`AppConfig`] once at process start. Service settings use the `GRACE_`
//! prefix; Meta credentials keep the names the Meta dashboard documents.

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SERVICE_PREFIX: &str = "GRACE_";

/// Unprefixed variables recognized from env files and the process environment.
const META_KEYS: &[&str] = &[
    "INSTAGRAM_CLIENT_ID",
    "FACEBOOK_APP_ID",
    "INSTAGRAM_CLIENT_SECRET",
    "FACEBOOK_APP_SECRET",
    "INSTAGRAM_REDIRECT_URI",
    "INSTAGRAM_OAUTH_SCOPE",
    "PAGE_ACCESS_TOKEN",
    "WEBHOOK_VERIFY_TOKEN",
    "INSTAGRAM_ACCESS_TOKEN",
    "ALLOW_TOKEN_INSPECT",
];

/// Application configuration resolved from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Directory holding the token record and the activity logs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    #[serde(default = "default_oauth_dialog_base")]
    pub oauth_dialog_base: String,
    #[serde(default)]
    pub webhook_require_signature: bool,
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_oauth_scope")]
    pub oauth_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_access_token: Option<String>,
    #[serde(default = "default_webhook_verify_token")]
    pub webhook_verify_token: String,
    /// Token used for profile lookups when nothing is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_access_token: Option<String>,
    #[serde(default)]
    pub allow_token_inspect: bool,
}

/// The three values the OAuth exchange cannot run without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
            graph_api_base: default_graph_api_base(),
            oauth_dialog_base: default_oauth_dialog_base(),
            webhook_require_signature: false,
            cookie_secure: default_cookie_secure(),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            oauth_scope: default_oauth_scope(),
            page_access_token: None,
            webhook_verify_token: default_webhook_verify_token(),
            fallback_access_token: None,
            allow_token_inspect: false,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Whether `WEBHOOK_VERIFY_TOKEN` was set to something other than the built-in default.
    pub fn has_custom_verify_token(&self) -> bool {
        self.webhook_verify_token != default_webhook_verify_token()
    }

    /// Resolves the OAuth client settings, naming every missing variable on failure.
    pub fn oauth_settings(&self) -> Result<OAuthSettings, Vec<&'static str>> {
        let mut missing = Vec::new();
        if self.client_id.is_none() {
            missing.push("INSTAGRAM_CLIENT_ID");
        }
        if self.client_secret.is_none() {
            missing.push("INSTAGRAM_CLIENT_SECRET");
        }
        if self.redirect_uri.is_none() {
            missing.push("INSTAGRAM_REDIRECT_URI");
        }

        match (&self.client_id, &self.client_secret, &self.redirect_uri) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(OAuthSettings {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                redirect_uri: redirect_uri.clone(),
                scope: self.oauth_scope.clone(),
            }),
            _ => Err(missing),
        }
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        let redact = |value: &mut Option<String>| {
            if value.is_some() {
                *value = Some("[REDACTED]".to_string());
            }
        };
        redact(&mut config.client_secret);
        redact(&mut config.page_access_token);
        redact(&mut config.fallback_access_token);
        config.webhook_verify_token = "[REDACTED]".to_string();
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if settings contradict each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(source) = self.bind_addr() {
            return Err(ConfigError::InvalidBindAddr {
                value: self.api_bind_addr.clone(),
                source,
            });
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.webhook_require_signature && self.client_secret.is_none() {
            return Err(ConfigError::SignatureWithoutSecret);
        }

        if url::Url::parse(&self.graph_api_base).is_err() {
            return Err(ConfigError::InvalidUrl {
                name: "GRACE_GRAPH_API_BASE",
                value: self.graph_api_base.clone(),
            });
        }

        if url::Url::parse(&self.oauth_dialog_base).is_err() {
            return Err(ConfigError::InvalidUrl {
                name: "GRACE_OAUTH_DIALOG_BASE",
                value: self.oauth_dialog_base.clone(),
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v23.0".to_string()
}

fn default_oauth_dialog_base() -> String {
    "https://www.facebook.com/v23.0/dialog/oauth".to_string()
}

fn default_cookie_secure() -> bool {
    true
}

fn default_oauth_scope() -> String {
    "instagram_basic,instagram_manage_messages,pages_show_list".to_string()
}

fn default_webhook_verify_token() -> String {
    "grace_webhook_token".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error(
        "webhook signature checks need the app secret; set INSTAGRAM_CLIENT_SECRET or FACEBOOK_APP_SECRET"
    )]
    SignatureWithoutSecret,
    #[error("{name} is not a valid URL: '{value}'")]
    InvalidUrl { name: &'static str, value: String },
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Loads configuration using layered `.env` files and environment variables.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(normalized) = normalize_key(&key) {
                layered.insert(normalized, value);
            }
        }

        // Empty values count as unset everywhere.
        let mut take = |key: &str| {
            layered
                .remove(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);
        let data_dir = take("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let graph_api_base = take("GRAPH_API_BASE")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(default_graph_api_base);
        let oauth_dialog_base = take("OAUTH_DIALOG_BASE").unwrap_or_else(default_oauth_dialog_base);
        let webhook_require_signature = take("WEBHOOK_REQUIRE_SIGNATURE")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        let cookie_secure = take("COOKIE_SECURE")
            .map(|v| parse_flag(&v))
            .unwrap_or_else(default_cookie_secure);

        // INSTAGRAM_* names win over the FACEBOOK_* aliases.
        let client_id = take("INSTAGRAM_CLIENT_ID").or_else(|| take("FACEBOOK_APP_ID"));
        let client_secret =
            take("INSTAGRAM_CLIENT_SECRET").or_else(|| take("FACEBOOK_APP_SECRET"));
        let redirect_uri = take("INSTAGRAM_REDIRECT_URI");
        let oauth_scope = take("INSTAGRAM_OAUTH_SCOPE").unwrap_or_else(default_oauth_scope);
        let page_access_token = take("PAGE_ACCESS_TOKEN");
        let webhook_verify_token =
            take("WEBHOOK_VERIFY_TOKEN").unwrap_or_else(default_webhook_verify_token);
        let fallback_access_token = take("INSTAGRAM_ACCESS_TOKEN");
        let allow_token_inspect = take("ALLOW_TOKEN_INSPECT")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            data_dir,
            graph_api_base,
            oauth_dialog_base,
            webhook_require_signature,
            cookie_secure,
            client_id,
            client_secret,
            redirect_uri,
            oauth_scope,
            page_access_token,
            webhook_verify_token,
            fallback_access_token,
            allow_token_inspect,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("GRACE_PROFILE")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(normalized) = normalize_key(&key) {
                        values.insert(normalized, value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

/// Maps a raw variable name onto the loader's key space, or `None` if it is not ours.
fn normalize_key(key: &str) -> Option<String> {
    if let Some(stripped) = key.strip_prefix(SERVICE_PREFIX) {
        return Some(stripped.to_string());
    }
    META_KEYS
        .contains(&key)
        .then(|| key.to_string())
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
