//! # configs
//!
//! Layered settings: built-in defaults, then `config/campsite.toml` if it
//! exists, then `CAMPSITE__SECTION__KEY` environment variables. A `.env`
//! file is loaded into the environment first.

use std::net::IpAddr;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

const CONFIG_FILE: &str = "config/campsite";
const ENV_PREFIX: &str = "CAMPSITE";

/// Hard ceiling on any page of results.
pub const PAGE_SIZE_CAP: u32 = 100;

/// Hard ceiling on comment length.
pub const COMMENT_CHARS_CAP: usize = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub auth: AuthSettings,
    pub search: SearchSettings,
    pub reviews: ReviewSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Peers whose `X-Forwarded-For` header is believed. Comma-separated
    /// when set through `CAMPSITE__SERVER__TRUSTED_PROXIES`.
    pub trusted_proxies: Vec<IpAddr>,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    #[serde(deserialize_with = "secret")]
    pub jwt_secret: SecretString,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SearchSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReviewSettings {
    pub flag_hide_threshold: u32,
    pub anonymous_window_hours: i64,
    pub max_comment_chars: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Salt for hashing network origins before they are stored.
    #[serde(deserialize_with = "secret")]
    pub origin_salt: SecretString,
}

fn secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::build(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(
                    Environment::with_prefix(ENV_PREFIX)
                        .prefix_separator("__")
                        .separator("__")
                        .list_separator(",")
                        .with_list_parse_key("server.trusted_proxies")
                        .try_parsing(true),
                ),
        )
    }

    /// Defaults overlaid with a TOML document. No file or environment lookup.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("server.trusted_proxies", Vec::<String>::new())?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?
            .set_default("search.default_page_size", 20_i64)?
            .set_default("search.max_page_size", i64::from(PAGE_SIZE_CAP))?
            .set_default("reviews.flag_hide_threshold", 3_i64)?
            .set_default("reviews.anonymous_window_hours", 24_i64)?
            .set_default("reviews.max_comment_chars", COMMENT_CHARS_CAP as i64)?
            .set_default("reviews.default_page_size", 20_i64)?
            .set_default("reviews.max_page_size", i64::from(PAGE_SIZE_CAP))?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ip) = self.server.trusted_proxies.iter().find(|ip| ip.is_unspecified()) {
            return Err(invalid(format!(
                "server.trusted_proxies must list concrete peer addresses, got {ip}"
            )));
        }
        check_page_sizes("search", self.search.default_page_size, self.search.max_page_size)?;
        check_page_sizes("reviews", self.reviews.default_page_size, self.reviews.max_page_size)?;

        if self.reviews.flag_hide_threshold == 0 {
            return Err(invalid("reviews.flag_hide_threshold must be at least 1"));
        }
        if self.reviews.anonymous_window_hours < 1 {
            return Err(invalid("reviews.anonymous_window_hours must be at least 1"));
        }
        if !(1..=COMMENT_CHARS_CAP).contains(&self.reviews.max_comment_chars) {
            return Err(invalid(format!(
                "reviews.max_comment_chars must be between 1 and {COMMENT_CHARS_CAP}"
            )));
        }
        if self.auth.jwt_secret.expose_secret().is_empty() {
            return Err(invalid("auth.jwt_secret must not be empty"));
        }
        if self.reviews.origin_salt.expose_secret().is_empty() {
            return Err(invalid("reviews.origin_salt must not be empty"));
        }
        Ok(())
    }
}

fn check_page_sizes(section: &str, default: u32, max: u32) -> Result<(), ConfigError> {
    if !(1..=PAGE_SIZE_CAP).contains(&max) {
        return Err(invalid(format!(
            "{section}.max_page_size must be between 1 and {PAGE_SIZE_CAP}"
        )));
    }
    if !(1..=max).contains(&default) {
        return Err(invalid(format!(
            "{section}.default_page_size must be between 1 and {section}.max_page_size"
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
