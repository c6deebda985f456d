//! Shared configuration for bosync clients.
//!
//! TOML profiles merged with `BOSYNC_` environment overrides, and their
//! translation into the [`SyncOptions`] and [`StaticEndpoint`] that
//! `bosync-core` consumes. Core itself never reads files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bosync_api::{Endpoint, StaticEndpoint};
use bosync_core::{CoreError, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, SyncOptions};

/// Prefix of environment variables that override file settings. Nested
/// keys are separated by a double underscore, e.g.
/// `BOSYNC_PROFILES__LAB__ENDPOINT`.
pub const ENV_PREFIX: &str = "BOSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not configured")]
    UnknownProfile { profile: String },

    #[error("no profile selected and no default_profile configured")]
    NoProfile,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

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

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::Config {
            message: err.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
    pub default_profile: Option<String>,

    /// Sync tuning applied to every profile unless it overrides it.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default)]
    pub updates_only: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            updates_only: false,
        }
    }
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

/// A named building-operations server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "https://bos.example.com:23557").
    pub endpoint: String,

    /// Override the default page size.
    pub page_size: Option<u32>,

    /// Override the page limit per query.
    pub max_pages: Option<u32>,

    /// Override whether pull streams skip the initial value.
    pub updates_only: Option<bool>,
}

impl Profile {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            page_size: None,
            max_pages: None,
            updates_only: None,
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .ok_or(ConfigError::NoProfile)?;
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })?;
        Ok((name, profile))
    }

    /// Resolve a profile into everything a client needs to start syncing.
    pub fn resolve(&self, name: Option<&str>) -> Result<ClientSettings, ConfigError> {
        let (name, profile) = self.profile(name)?;
        let settings = ClientSettings {
            profile: name.to_owned(),
            endpoint: profile_endpoint(profile)?,
            options: profile_to_options(&self.defaults, profile)?,
        };
        tracing::debug!(
            profile = %settings.profile,
            endpoint = %settings.endpoint.endpoint(),
            "resolved profile"
        );
        Ok(settings)
    }
}

/// A resolved profile.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub profile: String,
    pub endpoint: StaticEndpoint,
    pub options: SyncOptions,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "bosync", "bosync").map_or_else(
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
    p.push("bosync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment. A missing file is not an
/// error; defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    tracing::debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to default config");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Merge a profile's overrides over the global defaults.
pub fn profile_to_options(
    defaults: &Defaults,
    profile: &Profile,
) -> Result<SyncOptions, ConfigError> {
    let options = SyncOptions {
        page_size: profile.page_size.unwrap_or(defaults.page_size),
        max_pages: profile.max_pages.unwrap_or(defaults.max_pages),
        updates_only: profile.updates_only.unwrap_or(defaults.updates_only),
    };
    if options.page_size == 0 {
        return Err(ConfigError::Validation {
            field: "page_size".into(),
            reason: "must be at least 1".into(),
        });
    }
    if options.max_pages == 0 {
        return Err(ConfigError::Validation {
            field: "max_pages".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(options)
}

/// Parse the profile's endpoint URL. Only `http` and `https` are accepted.
pub fn profile_endpoint(profile: &Profile) -> Result<StaticEndpoint, ConfigError> {
    let url: url::Url = profile
        .endpoint
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("invalid URL: {}", profile.endpoint),
        })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(StaticEndpoint::new(Endpoint::new(url)))
}
