//! Startup configuration, resolved once and injected into [`crate::services::state::AppState`].

use std::path::PathBuf;
use std::time::Duration;

use crate::db::Database;
use crate::error::{GedError, Result};
use crate::services::crypto::CryptoService;

pub const DEFAULT_BUCKET: &str = "documents";
pub const DEFAULT_TABLE: &str = "documents";
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);

pub const ENV_PLATFORM_URL: &str = "GEDPRO_PLATFORM_URL";
pub const ENV_API_KEY: &str = "GEDPRO_API_KEY";

pub const SETTING_PLATFORM_URL: &str = "platform_url";
pub const SETTING_API_KEY: &str = "platform_api_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Hosted,
    Local,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub platform_url: String,
    pub api_key: String,
    pub bucket: String,
    pub table: String,
    pub signed_url_ttl: Duration,
}

impl AppConfig {
    /// Configuration for the self-contained backend rooted at `data_dir`.
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        AppConfig {
            backend: BackendKind::Local,
            data_dir: data_dir.into(),
            platform_url: String::new(),
            api_key: String::new(),
            bucket: DEFAULT_BUCKET.to_string(),
            table: DEFAULT_TABLE.to_string(),
            signed_url_ttl: SIGNED_URL_TTL,
        }
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs").join(&self.bucket)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotConfigured {
    MissingKey,
    SecretKeyRejected,
    MissingUrl,
    InvalidUrl(String),
}

impl std::fmt::Display for NotConfigured {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotConfigured::MissingKey => write!(f, "no platform API key configured"),
            NotConfigured::SecretKeyRejected => write!(
                f,
                "a secret or service-role key was supplied; use the public (anon) key"
            ),
            NotConfigured::MissingUrl => write!(f, "no platform URL configured"),
            NotConfigured::InvalidUrl(url) => write!(f, "invalid platform URL: {}", url),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigState {
    Configured(AppConfig),
    NotConfigured(NotConfigured),
}

impl ConfigState {
    pub fn into_config(self) -> Result<AppConfig> {
        match self {
            ConfigState::Configured(config) => Ok(config),
            ConfigState::NotConfigured(reason) => Err(GedError::Config(reason.to_string())),
        }
    }
}

/// Values given explicitly at startup (flags or environment).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub platform_url: Option<String>,
    pub api_key: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Overrides {
            platform_url: std::env::var(ENV_PLATFORM_URL).ok().filter(|v| !v.trim().is_empty()),
            api_key: std::env::var(ENV_API_KEY).ok().filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn or(self, fallback: Overrides) -> Overrides {
        Overrides {
            platform_url: self.platform_url.or(fallback.platform_url),
            api_key: self.api_key.or(fallback.api_key),
        }
    }
}

/// Browser-side clients must never hold a privileged key.
pub fn check_api_key(key: &str) -> std::result::Result<(), NotConfigured> {
    let key = key.trim();
    if key.is_empty() {
        return Err(NotConfigured::MissingKey);
    }
    if key.starts_with("sb_secret") || key.starts_with("service_role") {
        return Err(NotConfigured::SecretKeyRejected);
    }
    Ok(())
}

pub fn check_platform_url(url: &str) -> std::result::Result<String, NotConfigured> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(NotConfigured::MissingUrl);
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url.to_string()),
        _ => Err(NotConfigured::InvalidUrl(url.to_string())),
    }
}

/// Explicit overrides win over persisted settings.
pub fn resolve(backend: BackendKind, data_dir: PathBuf, overrides: Overrides, db: &Database) -> Result<ConfigState> {
    if backend == BackendKind::Local {
        return Ok(ConfigState::Configured(AppConfig::local(data_dir)));
    }

    let platform_url = match overrides.platform_url {
        Some(url) => Some(url),
        None => db.get_setting(SETTING_PLATFORM_URL)?,
    };
    let api_key = match overrides.api_key {
        Some(key) => Some(key),
        None => match db.get_setting(SETTING_API_KEY)? {
            Some(stored) => Some(
                CryptoService::decrypt_api_key(&stored).map_err(|e| GedError::Config(e.to_string()))?,
            ),
            None => None,
        },
    };

    let platform_url = match check_platform_url(platform_url.as_deref().unwrap_or_default()) {
        Ok(url) => url,
        Err(reason) => return Ok(ConfigState::NotConfigured(reason)),
    };
    let api_key = api_key.unwrap_or_default();
    if let Err(reason) = check_api_key(&api_key) {
        tracing::warn!("platform key rejected: {}", reason);
        return Ok(ConfigState::NotConfigured(reason));
    }

    Ok(ConfigState::Configured(AppConfig {
        backend,
        data_dir,
        platform_url,
        api_key: api_key.trim().to_string(),
        bucket: DEFAULT_BUCKET.to_string(),
        table: DEFAULT_TABLE.to_string(),
        signed_url_ttl: SIGNED_URL_TTL,
    }))
}
