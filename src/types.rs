use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MarketRecord
// ---------------------------------------------------------------------------

/// One parsed price observation. Immutable once built by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub state: String,
    pub district: String,
    pub market: String,
    pub variety: String,
    pub group: String,
    pub arrivals_tonnes: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub modal_price: f64,
    pub reported_date: NaiveDate,
}

/// Identity of a physical market across records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    pub state: String,
    pub district: String,
    pub market: String,
}

impl From<&MarketRecord> for MarketKey {
    fn from(r: &MarketRecord) -> Self {
        Self {
            state: r.state.clone(),
            district: r.district.clone(),
            market: r.market.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Seasonal analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    /// index >= 1.15
    Excellent,
    /// index 1.05–1.15
    Good,
    /// index 0.95–1.05
    Average,
    /// index < 0.95
    Poor,
}

impl Recommendation {
    pub fn from_index(price_index: f64) -> Self {
        use crate::config::index_thresholds::*;
        if price_index >= EXCELLENT_MIN {
            Recommendation::Excellent
        } else if price_index >= GOOD_MIN {
            Recommendation::Good
        } else if price_index >= AVERAGE_MIN {
            Recommendation::Average
        } else {
            Recommendation::Poor
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Recommendation::Excellent => "excellent",
            Recommendation::Good => "good",
            Recommendation::Average => "average",
            Recommendation::Poor => "poor",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalPattern {
    /// Calendar month, 1..=12.
    pub month: u32,
    pub average_price: f64,
    pub price_index: f64,
    pub recommendation: Recommendation,
}

// ---------------------------------------------------------------------------
// Forecasting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceForecast {
    /// `YYYY-MM` of the forecast month.
    pub date: String,
    pub predicted_price: f64,
    /// 0..=1, decays with distance from today.
    pub confidence: f64,
    pub trend: Trend,
}

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Where the producer is selling from. Any subset of fields may be known.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub point: Option<GeoPoint>,
    pub state: Option<String>,
    pub district: Option<String>,
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Vehicle economics used to turn distance into a transport cost.
#[derive(Debug, Clone, Copy)]
pub struct VehicleProfile {
    pub fuel_price_per_liter: f64,
    pub mileage_km_per_liter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMarket {
    pub state: String,
    pub district: String,
    pub market: String,
    pub high_price: f64,
    pub high_price_month: u32,
    pub low_price: f64,
    pub low_price_month: u32,
    pub arrivals_avg: f64,
    pub distance_km: Option<f64>,
    pub transport_cost: f64,
    /// 0..=5
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub variety: String,
    pub markets: Vec<ScoredMarket>,
    /// Free-text enrichment; absent whenever the collaborator is off or failing.
    pub narrative: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_thresholds() {
        assert_eq!(Recommendation::from_index(1.5), Recommendation::Excellent);
        assert_eq!(Recommendation::from_index(1.15), Recommendation::Excellent);
        assert_eq!(Recommendation::from_index(1.05), Recommendation::Good);
        assert_eq!(Recommendation::from_index(1.0), Recommendation::Average);
        assert_eq!(Recommendation::from_index(0.95), Recommendation::Average);
        assert_eq!(Recommendation::from_index(0.5), Recommendation::Poor);
    }

    #[test]
    fn scored_market_serializes_camel_case() {
        let m = ScoredMarket {
            state: "S".into(),
            district: "D".into(),
            market: "M".into(),
            high_price: 1.0,
            high_price_month: 1,
            low_price: 1.0,
            low_price_month: 1,
            arrivals_avg: 0.0,
            distance_km: None,
            transport_cost: 0.0,
            score: 0.0,
        };
        let v = serde_json::to_value(&m).unwrap();
        assert!(v.get("highPriceMonth").is_some());
        assert!(v.get("distanceKm").unwrap().is_null());
    }
}
