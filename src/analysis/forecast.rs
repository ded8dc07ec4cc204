use chrono::{Datelike, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::analysis::seasonal::SeasonalSummary;
use crate::config::{
    FORECAST_BASELINE_WINDOW, FORECAST_CONFIDENCE_DECAY, FORECAST_MIN_CONFIDENCE,
    TREND_FACTOR_MAX, TREND_FACTOR_MIN,
};
use crate::types::{MarketRecord, PriceForecast, Trend};

// ---------------------------------------------------------------------------
// ForecastRng
// ---------------------------------------------------------------------------

/// Source of the per-step trend noise. `ChaCha8Rng` so that a fixed seed gives
/// identical forecasts on every platform.
pub struct ForecastRng(ChaCha8Rng);

impl ForecastRng {
    pub fn seeded(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(ChaCha8Rng::from_entropy())
    }

    /// Seeded when a seed is configured, otherwise non-reproducible.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map(Self::seeded).unwrap_or_else(Self::from_entropy)
    }

    /// Uniform in `[TREND_FACTOR_MIN, TREND_FACTOR_MAX]`.
    pub fn trend_factor(&mut self) -> f64 {
        self.0.gen_range(TREND_FACTOR_MIN..=TREND_FACTOR_MAX)
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

/// Project `horizon` monthly prices starting at the month of `today`.
/// Empty when the variety has no records.
pub fn forecast_prices(
    records: &[MarketRecord],
    horizon: usize,
    today: NaiveDate,
    rng: &mut ForecastRng,
) -> Vec<PriceForecast> {
    forecast_with(records, horizon, today, || rng.trend_factor())
}

fn forecast_with<F>(
    records: &[MarketRecord],
    horizon: usize,
    today: NaiveDate,
    mut trend_factor: F,
) -> Vec<PriceForecast>
where
    F: FnMut() -> f64,
{
    let Some(summary) = SeasonalSummary::from_records(records) else {
        return Vec::new();
    };
    let baseline = recent_baseline(records);
    if baseline <= 0.0 {
        return Vec::new();
    }

    (0..horizon)
        .map(|i| {
            let (year, month) = add_months(today.year(), today.month(), i as u32);
            let seasonal_multiplier = summary.mean_for_month(month) / baseline;
            let predicted_price = (baseline * seasonal_multiplier * trend_factor()).round();
            let confidence =
                (1.0 - FORECAST_CONFIDENCE_DECAY * i as f64).max(FORECAST_MIN_CONFIDENCE);
            let trend = if predicted_price > baseline {
                Trend::Up
            } else if predicted_price < baseline {
                Trend::Down
            } else {
                Trend::Stable
            };
            PriceForecast {
                date: format!("{year:04}-{month:02}"),
                predicted_price,
                confidence,
                trend,
            }
        })
        .collect()
}

/// Mean modal price over the most recent records, by reported date.
fn recent_baseline(records: &[MarketRecord]) -> f64 {
    let mut by_date: Vec<&MarketRecord> = records.iter().collect();
    by_date.sort_by_key(|r| r.reported_date);
    let recent = &by_date[by_date.len().saturating_sub(FORECAST_BASELINE_WINDOW)..];
    if recent.is_empty() {
        return 0.0;
    }
    recent.iter().map(|r| r.modal_price).sum::<f64>() / recent.len() as f64
}

/// `(year, month)` that is `offset` months after `(year, month)`.
fn add_months(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let zero_based = month - 1 + offset;
    (year + (zero_based / 12) as i32, zero_based % 12 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::index::tests::record;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 20).unwrap()
    }

    fn two_season_records() -> Vec<MarketRecord> {
        vec![
            record("S", "D", "M", "X", 100.0, (2023, 1, 10)),
            record("S", "D", "M", "X", 300.0, (2023, 7, 10)),
        ]
    }

    #[test]
    fn exact_projection_without_noise() {
        let forecasts = forecast_with(&two_season_records(), 4, today(), || 1.0);
        // baseline = 200; Nov/Dec fall back to 200, Jan = 100, Feb = 200
        let dates: Vec<&str> = forecasts.iter().map(|f| f.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
        let prices: Vec<f64> = forecasts.iter().map(|f| f.predicted_price).collect();
        assert_eq!(prices, vec![200.0, 200.0, 100.0, 200.0]);
        assert_eq!(forecasts[0].trend, Trend::Stable);
        assert_eq!(forecasts[2].trend, Trend::Down);
    }

    #[test]
    fn trend_compares_against_baseline() {
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let forecasts = forecast_with(&two_season_records(), 2, start, || 1.0);
        assert_eq!(forecasts[0].predicted_price, 300.0);
        assert_eq!(forecasts[0].trend, Trend::Up);
        // August falls back to 200 = baseline, not compared to July's 300
        assert_eq!(forecasts[1].trend, Trend::Stable);
    }

    #[test]
    fn confidence_decays_and_floors() {
        let forecasts = forecast_with(&two_season_records(), 20, today(), || 1.0);
        assert_eq!(forecasts.len(), 20);
        assert!((forecasts[0].confidence - 1.0).abs() < 1e-9);
        assert!((forecasts[2].confidence - 0.9).abs() < 1e-9);
        for pair in forecasts.windows(2) {
            assert!(pair[1].confidence <= pair[0].confidence);
        }
        assert!(forecasts.iter().all(|f| f.confidence >= FORECAST_MIN_CONFIDENCE));
        assert!((forecasts[19].confidence - FORECAST_MIN_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn baseline_uses_most_recent_thirty_records() {
        let mut records = Vec::new();
        for day in 1..=10 {
            records.push(record("S", "D", "M", "X", 1000.0, (2020, 5, day)));
        }
        for day in 1..=30 {
            records.push(record("S", "D", "M", "X", 100.0, (2023, 5, day)));
        }
        assert!((recent_baseline(&records) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn seeded_forecasts_are_reproducible() {
        let records = two_season_records();
        let a = forecast_prices(&records, 6, today(), &mut ForecastRng::seeded(42));
        let b = forecast_prices(&records, 6, today(), &mut ForecastRng::seeded(42));
        assert_eq!(a, b);
    }

    #[test]
    fn noise_stays_within_five_percent() {
        let records = two_season_records();
        let mut rng = ForecastRng::seeded(1);
        for _ in 0..50 {
            let f = forecast_prices(&records, 1, today(), &mut rng);
            // November falls back to 200
            assert!(f[0].predicted_price >= 190.0 && f[0].predicted_price <= 210.0);
        }
    }

    #[test]
    fn unknown_variety_is_empty() {
        assert!(forecast_prices(&[], 6, today(), &mut ForecastRng::seeded(0)).is_empty());
    }

    #[test]
    fn add_months_wraps_years() {
        assert_eq!(add_months(2024, 12, 1), (2025, 1));
        assert_eq!(add_months(2024, 1, 0), (2024, 1));
        assert_eq!(add_months(2024, 11, 14), (2026, 1));
    }
}
