use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{trace, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_CITY: &str = "Unknown City";
pub const UNKNOWN_STATE: &str = "Unknown State";

const CITY_FIELDS: &[&str] = &["city", "town", "village", "hamlet", "municipality", "county"];
const STATE_FIELDS: &[&str] = &["state", "province", "region", "county"];
const BASE_BACKOFF_MS: u64 = 250;

/// A resolved (or degraded) place description for one coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceResult {
    pub city: String,
    pub state: String,
    pub country: String,
    pub full_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlaceResult {
    /// The degraded value used whenever the provider cannot answer.
    pub fn unresolved(latitude: f64, longitude: f64, error: impl Into<String>) -> Self {
        Self {
            city: UNKNOWN.to_string(),
            state: UNKNOWN.to_string(),
            country: String::new(),
            full_address: format!("{latitude:.4}, {longitude:.4}"),
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_city(&self) -> bool {
        is_known(&self.city, UNKNOWN_CITY)
    }

    pub fn has_state(&self) -> bool {
        is_known(&self.state, UNKNOWN_STATE)
    }
}

fn is_known(value: &str, sentinel: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != UNKNOWN && trimmed != sentinel
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> AppResult<PlaceResult>;
}

/// Nominatim-compatible `/reverse` client.
pub struct NominatimClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    language: String,
}

impl NominatimClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let endpoint = reqwest::Url::parse(&config.geocoder_endpoint).map_err(|err| {
            AppError::Config(format!(
                "invalid geocoder endpoint {:?}: {err}",
                config.geocoder_endpoint
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "geocoder endpoint must be http(s), got {}",
                endpoint.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(config.geocoder_user_agent.as_str())
            .timeout(Duration::from_millis(config.geocoder_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            language: config.geocoder_language.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReversePayload {
    address: Option<Map<String, Value>>,
    display_name: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, latitude: f64, longitude: f64) -> AppResult<PlaceResult> {
        let lat = latitude.to_string();
        let lon = longitude.to_string();
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
                ("accept-language", self.language.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let payload: ReversePayload = serde_json::from_str(&body)?;
        place_from_payload(payload)
    }
}

fn place_from_payload(payload: ReversePayload) -> AppResult<PlaceResult> {
    let Some(address) = payload.address else {
        let reason = payload
            .error
            .unwrap_or_else(|| "no address data found".to_string());
        return Err(AppError::Provider(reason));
    };

    Ok(PlaceResult {
        city: first_field(&address, CITY_FIELDS).unwrap_or_else(|| UNKNOWN_CITY.to_string()),
        state: first_field(&address, STATE_FIELDS).unwrap_or_else(|| UNKNOWN_STATE.to_string()),
        country: first_field(&address, &["country"]).unwrap_or_default(),
        full_address: payload.display_name.unwrap_or_default(),
        error: None,
    })
}

fn first_field(address: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| address.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Turns coordinates into places. Every failure path ends in a degraded
/// [`PlaceResult`], never an error.
pub struct GeocodeResolver {
    provider: Arc<dyn ReverseGeocoder>,
    rate_limiter: RateLimiter,
    request_timeout: Duration,
    max_attempts: u32,
    jitter_rng: Mutex<StdRng>,
}

impl GeocodeResolver {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = NominatimClient::new(config)?;
        Ok(Self::with_provider(Arc::new(client), config))
    }

    pub fn with_provider(provider: Arc<dyn ReverseGeocoder>, config: &AppConfig) -> Self {
        Self {
            provider,
            rate_limiter: RateLimiter::new(config.geocoder_rate_limit_qps),
            request_timeout: Duration::from_millis(config.geocoder_timeout_ms),
            max_attempts: config.geocoder_max_attempts.max(1),
            jitter_rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> PlaceResult {
        match self.lookup_with_retry(latitude, longitude).await {
            Ok(place) => place,
            Err(err) => {
                warn!(?err, latitude, longitude, "reverse geocoding failed; using coordinates");
                PlaceResult::unresolved(latitude, longitude, err.to_string())
            }
        }
    }

    async fn lookup_with_retry(&self, latitude: f64, longitude: f64) -> AppResult<PlaceResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.rate_limiter.wait().await;
            match self.attempt(latitude, longitude).await {
                Ok(place) => return Ok(place),
                Err(err) if attempt < self.max_attempts && err.is_retryable() => {
                    let delay = self.backoff_delay(attempt);
                    trace!(?err, attempt, "reverse geocode failed; retrying after {:?}", delay);
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, latitude: f64, longitude: f64) -> AppResult<PlaceResult> {
        match timeout(self.request_timeout, self.provider.reverse(latitude, longitude)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.request_timeout)),
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = (attempt - 1).min(6);
        let base = Duration::from_millis(BASE_BACKOFF_MS * (1 << exponent));
        let jitter_ms = self.jitter_rng.lock().gen_range(0..BASE_BACKOFF_MS);
        base + Duration::from_millis(jitter_ms)
    }
}

struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(qps: u32) -> Self {
        Self {
            min_interval: Duration::from_millis(Self::interval_ms(qps)),
            last_tick: AsyncMutex::new(None),
        }
    }

    fn interval_ms(qps: u32) -> u64 {
        let safe_qps = qps.max(1);
        let interval_ms = (1000_f64 / safe_qps as f64).ceil() as u64;
        interval_ms.max(50)
    }

    async fn wait(&self) {
        let interval = self.min_interval;
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < interval {
                sleep(interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}
