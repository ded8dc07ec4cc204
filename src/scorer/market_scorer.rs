use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Datelike;
use futures_util::future::join_all;
use tracing::info;

use crate::analysis::monthly_means;
use crate::config::score_weights::*;
use crate::geo::resolver::same_place;
use crate::geo::DistanceResolver;
use crate::types::{MarketKey, MarketRecord, Origin, ScoredMarket, VehicleProfile};

/// Price and activity figures for one market, before distance is known.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSummary {
    pub key: MarketKey,
    pub high_price: f64,
    pub high_price_month: u32,
    /// 0 when the market never reported a positive minimum.
    pub low_price: f64,
    /// 0 together with `low_price`.
    pub low_price_month: u32,
    pub arrivals_avg: f64,
}

/// Ranks candidate markets for a variety and attaches distance, transport cost
/// and composite score to the best ones.
pub struct MarketScorer {
    resolver: Arc<DistanceResolver>,
}

impl MarketScorer {
    pub fn new(resolver: Arc<DistanceResolver>) -> Self {
        Self { resolver }
    }

    /// Full ranking: summarise, order, keep `limit`, then resolve distances for
    /// the kept markets concurrently and score them.
    pub async fn rank(
        &self,
        records: &[MarketRecord],
        origin: &Origin,
        vehicle: VehicleProfile,
        limit: usize,
    ) -> Vec<ScoredMarket> {
        let summaries = market_summaries(records);
        let candidates = summaries.len();
        let mut ranked = rank_summaries(summaries, origin.state.as_deref());
        ranked.truncate(limit);

        let origin_point = if ranked.is_empty() {
            None
        } else {
            self.resolver.resolve_origin(origin).await
        };

        let distances = join_all(
            ranked
                .iter()
                .map(|s| self.resolver.distance_km(&s.key, origin, origin_point)),
        )
        .await;

        let scored: Vec<ScoredMarket> = ranked
            .into_iter()
            .zip(distances)
            .map(|(summary, distance)| score_market(summary, distance, vehicle))
            .collect();

        info!(
            candidates,
            returned = scored.len(),
            origin_resolved = origin_point.is_some(),
            "Ranked {} of {candidates} candidate markets",
            scored.len(),
        );
        scored
    }
}

/// One summary per (state, district, market); markets without a positive
/// high price are dropped. Output is in key order.
pub fn market_summaries(records: &[MarketRecord]) -> Vec<MarketSummary> {
    let mut groups: BTreeMap<MarketKey, Vec<&MarketRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(MarketKey::from(r)).or_default().push(r);
    }

    groups
        .into_iter()
        .filter_map(|(key, group)| summarize_group(key, &group))
        .collect()
}

fn summarize_group(key: MarketKey, group: &[&MarketRecord]) -> Option<MarketSummary> {
    let max_means = positive_monthly_means(group, |r| r.max_price);
    let min_means = positive_monthly_means(group, |r| r.min_price);

    let (high_price_month, high_price) = max_means
        .iter()
        .enumerate()
        .fold((1u32, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 { (i as u32 + 1, v) } else { best }
        });
    if high_price <= 0.0 {
        return None;
    }

    let (low_price_month, low_price) = min_means
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v > 0.0)
        .fold(None, |best: Option<(u32, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i as u32 + 1, v)),
        })
        .unwrap_or((0, 0.0));

    let arrivals_avg =
        group.iter().map(|r| r.arrivals_tonnes).sum::<f64>() / group.len() as f64;

    Some(MarketSummary {
        key,
        high_price,
        high_price_month,
        low_price,
        low_price_month,
        arrivals_avg,
    })
}

/// Monthly means of a price field over its positive observations; empty months
/// take the mean of all positive observations in the group.
///
/// Zero and negative prices are left out of the monthly means too, not only
/// out of the fallback: a month that only reported zeros is treated as a month
/// with no data.
fn positive_monthly_means<F>(group: &[&MarketRecord], price: F) -> [f64; 12]
where
    F: Fn(&MarketRecord) -> f64,
{
    let positive: Vec<(u32, f64)> = group
        .iter()
        .map(|r| (r.reported_date.month(), price(r)))
        .filter(|(_, p)| *p > 0.0)
        .collect();
    let fallback = if positive.is_empty() {
        0.0
    } else {
        positive.iter().map(|(_, p)| p).sum::<f64>() / positive.len() as f64
    };
    monthly_means(positive, fallback)
}

/// Markets in `reference_state` come first regardless of price; each partition
/// is ordered by high price, best first. States match the way the distance
/// tiers match them.
pub fn rank_summaries(
    mut summaries: Vec<MarketSummary>,
    reference_state: Option<&str>,
) -> Vec<MarketSummary> {
    let out_of_state = |s: &MarketSummary| match reference_state {
        Some(state) => !same_place(&s.key.state, state),
        None => false,
    };
    summaries.sort_by(|a, b| {
        out_of_state(a)
            .cmp(&out_of_state(b))
            .then_with(|| b.high_price.total_cmp(&a.high_price))
    });
    summaries
}

/// Fuel cost for a one-way trip. Zero when distance is unknown or the vehicle
/// has no usable mileage.
pub fn transport_cost(distance_km: Option<f64>, vehicle: VehicleProfile) -> f64 {
    let cost_per_km = if vehicle.mileage_km_per_liter == 0.0 {
        0.0
    } else {
        vehicle.fuel_price_per_liter / vehicle.mileage_km_per_liter
    };
    match distance_km {
        Some(d) if cost_per_km != 0.0 => (cost_per_km * d).round(),
        _ => 0.0,
    }
}

/// Composite 0–5 score from price level, proximity and market activity.
pub fn compute_score(high_price: f64, distance_km: Option<f64>, arrivals_avg: f64) -> f64 {
    let price_score = high_price / PRICE_DIVISOR;
    let distance_score = match distance_km {
        Some(d) if d < NEAR_KM => NEAR_SCORE,
        Some(d) if d < MID_KM => MID_SCORE,
        _ => FAR_SCORE,
    };
    let arrival_score = (arrivals_avg / ARRIVALS_DIVISOR).min(MAX_SCORE);

    ((price_score + distance_score + arrival_score) / 3.0)
        .round()
        .min(MAX_SCORE)
}

pub fn score_market(
    summary: MarketSummary,
    distance_km: Option<f64>,
    vehicle: VehicleProfile,
) -> ScoredMarket {
    let score = compute_score(summary.high_price, distance_km, summary.arrivals_avg);
    ScoredMarket {
        state: summary.key.state,
        district: summary.key.district,
        market: summary.key.market,
        high_price: summary.high_price,
        high_price_month: summary.high_price_month,
        low_price: summary.low_price,
        low_price_month: summary.low_price_month,
        arrivals_avg: summary.arrivals_avg,
        distance_km,
        transport_cost: transport_cost(distance_km, vehicle),
        score,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
