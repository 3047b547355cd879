use std::{env, io};

use serde::Serialize;
use tracing::debug;

const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";
const DEFAULT_GEOCODER_USER_AGENT: &str = "TripTrace/1.0";
const DEFAULT_GEOCODER_LANGUAGE: &str = "en";
const DEFAULT_GEOCODER_TIMEOUT_MS: u64 = 10_000;
const MAX_GEOCODER_QPS: u32 = 10;
const MAX_GEOCODER_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub geocoder_language: String,
    pub geocoder_timeout_ms: u64,
    pub geocoder_rate_limit_qps: u32,
    pub geocoder_max_attempts: u32,
    pub cache_failed_lookups: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub geocoder_host: Option<String>,
    pub geocoder_language: String,
    pub geocoder_timeout_ms: u64,
    pub geocoder_rate_limit_qps: u32,
    pub geocoder_max_attempts: u32,
    pub cache_failed_lookups: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, applying defaults and clamps.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            geocoder_endpoint: parse_string(
                &lookup,
                "GEOCODER_ENDPOINT",
                DEFAULT_GEOCODER_ENDPOINT,
            ),
            geocoder_user_agent: parse_string(
                &lookup,
                "GEOCODER_USER_AGENT",
                DEFAULT_GEOCODER_USER_AGENT,
            ),
            geocoder_language: parse_string(
                &lookup,
                "GEOCODER_LANGUAGE",
                DEFAULT_GEOCODER_LANGUAGE,
            ),
            geocoder_timeout_ms: parse_u64(
                &lookup,
                "GEOCODER_TIMEOUT_MS",
                DEFAULT_GEOCODER_TIMEOUT_MS,
            )
            .max(1),
            geocoder_rate_limit_qps: parse_u32(&lookup, "GEOCODER_RATE_LIMIT_QPS", 1)
                .clamp(1, MAX_GEOCODER_QPS),
            geocoder_max_attempts: parse_u32(&lookup, "GEOCODER_MAX_ATTEMPTS", 2)
                .clamp(1, MAX_GEOCODER_ATTEMPTS),
            cache_failed_lookups: parse_bool(&lookup, "GEOCODE_CACHE_FAILURES", true),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            geocoder_host: reqwest::Url::parse(&self.geocoder_endpoint)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string)),
            geocoder_language: self.geocoder_language.clone(),
            geocoder_timeout_ms: self.geocoder_timeout_ms,
            geocoder_rate_limit_qps: self.geocoder_rate_limit_qps,
            geocoder_max_attempts: self.geocoder_max_attempts,
            cache_failed_lookups: self.cache_failed_lookups,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geocoder_endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            geocoder_user_agent: DEFAULT_GEOCODER_USER_AGENT.to_string(),
            geocoder_language: DEFAULT_GEOCODER_LANGUAGE.to_string(),
            geocoder_timeout_ms: DEFAULT_GEOCODER_TIMEOUT_MS,
            geocoder_rate_limit_qps: 1,
            geocoder_max_attempts: 2,
            cache_failed_lookups: true,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool(&|key: &str| env::var(key).ok(), "ALLOW_DOTENV", false)
}

fn parse_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}
