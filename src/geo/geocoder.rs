use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::GeoPoint;

/// Free-text place name → coordinates.
///
/// `Ok(None)` means the service answered but knows no such place. Transport
/// failures come back as `Err`; callers treat both as "not found".
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Waits until the service will take another request. Callers await this
    /// before timing `resolve`, so queueing never counts as a slow answer.
    async fn throttle(&self) {}

    async fn resolve(&self, place: &str) -> Result<Option<GeoPoint>>;
}

/// Keeps successive requests at least `min_interval` apart across all callers.
#[derive(Debug, Default)]
pub struct RequestSpacing {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestSpacing {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Returns once this caller owns the next slot.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// OpenStreetMap Nominatim search client.
///
/// Nominatim allows roughly one request per second per client, so requests are
/// spaced at least `GEOCODER_MIN_INTERVAL_MS` apart.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    spacing: RequestSpacing,
}

impl NominatimGeocoder {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.geocoder_timeout)
            .user_agent(cfg.geocoder_user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.geocoder_url.trim_end_matches('/').to_string(),
            spacing: RequestSpacing::new(cfg.geocoder_min_interval),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn throttle(&self) {
        self.spacing.wait().await;
    }

    async fn resolve(&self, place: &str) -> Result<Option<GeoPoint>> {
        let url = format!("{}/search", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AppError::Geocode(format!(
                "geocoder returned {} for {place:?}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        let point = parse_search_response(&body);
        debug!("Geocoded {place:?} → {point:?}");
        Ok(point)
    }
}

/// First hit of a Nominatim `/search?format=json` response. Coordinates arrive
/// as strings; numbers are accepted too.
pub fn parse_search_response(v: &serde_json::Value) -> Option<GeoPoint> {
    let first = v.as_array()?.first()?;
    let coord = |key: &str| {
        first
            .get(key)
            .and_then(|x| x.as_f64().or_else(|| x.as_str().and_then(|s| s.parse().ok())))
    };
    let lat = coord("lat")?;
    let lon = coord("lon")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(GeoPoint { lat, lon })
}
