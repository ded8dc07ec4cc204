use std::time::Duration;

use crate::error::{AppError, Result};

pub const GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const NARRATIVE_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// A ranking that asks for a narrative waits at most this long for it.
const DEFAULT_NARRATIVE_TIMEOUT_MS: u64 = 3000;

/// Sentinel variety used by the source tables for unclassified produce.
/// Never offered as a selectable variety.
pub const OTHER_VARIETY: &str = "Other";

/// Number of most recent records averaged into the forecast baseline.
pub const FORECAST_BASELINE_WINDOW: usize = 30;

/// Forecast confidence never decays below this.
pub const FORECAST_MIN_CONFIDENCE: f64 = 0.6;

/// Confidence lost per forecast step.
pub const FORECAST_CONFIDENCE_DECAY: f64 = 0.05;

/// Bounds of the uniform short-term noise applied to each forecast step.
pub const TREND_FACTOR_MIN: f64 = 0.95;
pub const TREND_FACTOR_MAX: f64 = 1.05;

/// Default and maximum horizon accepted by the forecast endpoint.
pub const DEFAULT_FORECAST_MONTHS: usize = 6;
pub const MAX_FORECAST_MONTHS: usize = 24;

/// Practical minimum travel distance for a market that resolves onto the origin.
pub const MIN_TRAVEL_KM: f64 = 30.0;

/// Mean Earth radius used for straight-line distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Heuristic distances used when geocoding fails outright.
pub mod fallback_km {
    pub const SAME_DISTRICT: f64 = 50.0;
    pub const SAME_STATE: f64 = 150.0;
    pub const ELSEWHERE: f64 = 300.0;
}

/// Seasonal index thresholds for selling recommendations.
pub mod index_thresholds {
    pub const EXCELLENT_MIN: f64 = 1.15;
    pub const GOOD_MIN: f64 = 1.05;
    pub const AVERAGE_MIN: f64 = 0.95;
}

/// Composite score tuning.
pub mod score_weights {
    /// highPrice is divided by this to get the price component.
    pub const PRICE_DIVISOR: f64 = 10_000.0;
    pub const NEAR_KM: f64 = 50.0;
    pub const MID_KM: f64 = 200.0;
    pub const NEAR_SCORE: f64 = 10.0;
    pub const MID_SCORE: f64 = 7.0;
    pub const FAR_SCORE: f64 = 4.0;
    /// arrivalsAvg is divided by this and capped at `MAX_SCORE`.
    pub const ARRIVALS_DIVISOR: f64 = 10.0;
    pub const MAX_SCORE: f64 = 5.0;
}

#[derive(Debug, Clone)]
pub struct Config {
    /// CSV file or directory of CSV files (DATA_PATH)
    pub data_path: String,
    pub log_level: String,
    pub api_port: u16,
    pub geocoder_url: String,
    /// Sent on every geocoder request (GEOCODER_USER_AGENT)
    pub geocoder_user_agent: String,
    pub geocoder_timeout: Duration,
    /// Minimum spacing between geocoder requests (GEOCODER_MIN_INTERVAL_MS)
    pub geocoder_min_interval: Duration,
    pub fuel_price_per_liter: f64,
    pub vehicle_mileage_km_per_liter: f64,
    /// Markets returned (and geocoded) per ranking request (RANKING_LIMIT)
    pub ranking_limit: usize,
    /// Fixed seed for reproducible forecasts (FORECAST_SEED)
    pub forecast_seed: Option<u64>,
    pub narrative_api_url: String,
    /// Narrative enrichment is disabled when unset (NARRATIVE_API_KEY)
    pub narrative_api_key: Option<String>,
    pub narrative_model: String,
    pub narrative_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            data_path: std::env::var("DATA_PATH").unwrap_or_else(|_| "data".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: parse_var("API_PORT", 3000u16)?,
            geocoder_url: std::env::var("GEOCODER_URL")
                .unwrap_or_else(|_| GEOCODER_URL.to_string()),
            geocoder_user_agent: std::env::var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| "commodity-intel/0.1".to_string()),
            geocoder_timeout: Duration::from_millis(parse_var("GEOCODER_TIMEOUT_MS", 5000u64)?),
            geocoder_min_interval: Duration::from_millis(parse_var(
                "GEOCODER_MIN_INTERVAL_MS",
                1000u64,
            )?),
            fuel_price_per_liter: parse_var("FUEL_PRICE_PER_LITER", 100.0f64)?,
            vehicle_mileage_km_per_liter: parse_var("VEHICLE_MILEAGE_KM_PER_LITER", 5.0f64)?,
            ranking_limit: parse_var("RANKING_LIMIT", 10usize)?,
            forecast_seed: match std::env::var("FORECAST_SEED") {
                Ok(s) => Some(s.trim().parse::<u64>().map_err(|_| {
                    AppError::Config("FORECAST_SEED must be an unsigned integer".to_string())
                })?),
                Err(_) => None,
            },
            narrative_api_url: std::env::var("NARRATIVE_API_URL")
                .unwrap_or_else(|_| NARRATIVE_API_URL.to_string()),
            narrative_api_key: std::env::var("NARRATIVE_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            narrative_model: std::env::var("NARRATIVE_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            narrative_timeout: Duration::from_millis(parse_var("NARRATIVE_TIMEOUT_MS", DEFAULT_NARRATIVE_TIMEOUT_MS)?),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        validate_vehicle(self.fuel_price_per_liter, self.vehicle_mileage_km_per_liter)
            .map_err(AppError::Config)?;
        if self.ranking_limit == 0 {
            return Err(AppError::Config("RANKING_LIMIT must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Shared by startup config and per-request overrides.
pub fn validate_vehicle(fuel_price_per_liter: f64, mileage_km_per_liter: f64) -> std::result::Result<(), String> {
    if !fuel_price_per_liter.is_finite() || fuel_price_per_liter < 0.0 {
        return Err(format!("fuel price must be a non-negative number, got {fuel_price_per_liter}"));
    }
    if !mileage_km_per_liter.is_finite() || mileage_km_per_liter < 0.0 {
        return Err(format!("vehicle mileage must be a non-negative number, got {mileage_km_per_liter}"));
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} is malformed: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        data_path: "data".to_string(),
        log_level: "info".to_string(),
        api_port: 3000,
        geocoder_url: GEOCODER_URL.to_string(),
        geocoder_user_agent: "test".to_string(),
        geocoder_timeout: Duration::from_millis(200),
        geocoder_min_interval: Duration::ZERO,
        fuel_price_per_liter: 100.0,
        vehicle_mileage_km_per_liter: 5.0,
        ranking_limit: 10,
        forecast_seed: Some(7),
        narrative_api_url: NARRATIVE_API_URL.to_string(),
        narrative_api_key: None,
        narrative_model: "test".to_string(),
        narrative_timeout: Duration::from_millis(200),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_mileage_is_malformed() {
        let mut cfg = test_config();
        cfg.vehicle_mileage_km_per_liter = -1.0;
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn zero_mileage_is_allowed() {
        let mut cfg = test_config();
        cfg.vehicle_mileage_km_per_liter = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_ranking_limit_is_rejected() {
        let mut cfg = test_config();
        cfg.ranking_limit = 0;
        assert!(cfg.validate().is_err());
    }
}
