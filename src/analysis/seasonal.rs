use chrono::Datelike;

use crate::types::{MarketRecord, Recommendation, SeasonalPattern};

/// Per-month mean of `(month, value)` samples, months 1..=12 at indices 0..=11.
/// A month with no samples takes `fallback`, so every slot is always defined.
pub fn monthly_means<I>(samples: I, fallback: f64) -> [f64; 12]
where
    I: IntoIterator<Item = (u32, f64)>,
{
    let mut sums = [0.0f64; 12];
    let mut counts = [0usize; 12];
    for (month, value) in samples {
        if let Some(slot) = (month as usize).checked_sub(1).filter(|i| *i < 12) {
            sums[slot] += value;
            counts[slot] += 1;
        }
    }
    let mut means = [fallback; 12];
    for i in 0..12 {
        if counts[i] > 0 {
            means[i] = sums[i] / counts[i] as f64;
        }
    }
    means
}

/// Intermediate seasonal figures, shared with the forecaster.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalSummary {
    /// Ungrouped mean modal price over all records.
    pub raw_mean: f64,
    pub monthly_mean: [f64; 12],
    /// Mean of the twelve monthly means; each month weighs the same.
    pub overall_avg: f64,
}

impl SeasonalSummary {
    /// None when there are no records.
    pub fn from_records(records: &[MarketRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let raw_mean = records.iter().map(|r| r.modal_price).sum::<f64>() / records.len() as f64;
        let monthly_mean = monthly_means(
            records.iter().map(|r| (r.reported_date.month(), r.modal_price)),
            raw_mean,
        );
        let overall_avg = monthly_mean.iter().sum::<f64>() / 12.0;
        Some(Self { raw_mean, monthly_mean, overall_avg })
    }

    pub fn mean_for_month(&self, month: u32) -> f64 {
        self.monthly_mean[(month.clamp(1, 12) - 1) as usize]
    }

    pub fn patterns(&self) -> Vec<SeasonalPattern> {
        (1..=12u32)
            .map(|month| {
                let average_price = self.mean_for_month(month);
                let price_index = if self.overall_avg > 0.0 {
                    average_price / self.overall_avg
                } else {
                    0.0
                };
                SeasonalPattern {
                    month,
                    average_price,
                    price_index,
                    recommendation: Recommendation::from_index(price_index),
                }
            })
            .collect()
    }
}

/// Twelve patterns in calendar order, or none for a variety without records.
pub fn seasonal_patterns(records: &[MarketRecord]) -> Vec<SeasonalPattern> {
    SeasonalSummary::from_records(records)
        .map(|s| s.patterns())
        .unwrap_or_default()
}
