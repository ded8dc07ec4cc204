use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{fallback_km, EARTH_RADIUS_KM, MIN_TRAVEL_KM};
use crate::geo::cache::GeoCache;
use crate::geo::geocoder::Geocoder;
use crate::types::{GeoPoint, MarketKey, Origin};

/// Turns market place names into straight-line distances from an origin.
///
/// Lookups go cache → geocoder. The timeout bounds the request itself; waiting
/// for the geocoder's rate-limit slot is not counted. Only successful answers
/// are cached. No failure escapes: the worst case is a heuristic distance tier.
pub struct DistanceResolver {
    geocoder: Arc<dyn Geocoder>,
    cache: Arc<dyn GeoCache>,
    timeout: Duration,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl DistanceResolver {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        cache: Arc<dyn GeoCache>,
        timeout: Duration,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self { geocoder, cache, timeout, health, latency }
    }

    /// Coordinates for a place name, or None if the service cannot answer.
    pub async fn locate(&self, place: &str) -> Option<GeoPoint> {
        if let Some(point) = self.cache.get(place) {
            self.health.inc_cache_hit();
            debug!("[GEO] cache hit for {place:?}");
            return Some(point);
        }

        self.health.inc_lookup();
        self.geocoder.throttle().await;
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.geocoder.resolve(place)).await;
        self.latency.record(started.elapsed());

        match outcome {
            Ok(Ok(Some(point))) => {
                self.cache.insert(place, point);
                Some(point)
            }
            Ok(Ok(None)) => {
                self.health.inc_geocode_failure();
                debug!("[GEO] no match for {place:?}");
                None
            }
            Ok(Err(e)) => {
                self.health.inc_geocode_failure();
                warn!("[GEO] lookup failed for {place:?}: {e}");
                None
            }
            Err(_) => {
                self.health.inc_geocode_failure();
                warn!("[GEO] lookup timed out for {place:?} after {:?}", self.timeout);
                None
            }
        }
    }

    /// The origin's own coordinates: explicit point first, else its district
    /// (or state) geocoded like any other place.
    pub async fn resolve_origin(&self, origin: &Origin) -> Option<GeoPoint> {
        if let Some(point) = origin.point {
            return Some(point);
        }
        let state = origin.state.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        match origin.district.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(district) => match self.locate(&format!("{district}, {state}")).await {
                Some(p) => Some(p),
                None => self.locate(state).await,
            },
            None => self.locate(state).await,
        }
    }

    /// Distance in whole km from `origin_point` to a market.
    ///
    /// Tries the full market query, then the coarser district query, then falls
    /// back to heuristic tiers. A resolved 0 km is reported as `MIN_TRAVEL_KM`.
    /// None only when nothing at all is known about the origin.
    pub async fn distance_km(
        &self,
        market: &MarketKey,
        origin: &Origin,
        origin_point: Option<GeoPoint>,
    ) -> Option<f64> {
        let Some(from) = origin_point else {
            return heuristic_distance(market, origin);
        };

        let full_query = format!(
            "{}, {}, {}",
            normalize_market_name(&market.market),
            market.district,
            market.state
        );
        let target = match self.locate(&full_query).await {
            Some(p) => Some(p),
            None => {
                let coarse_query = format!("{}, {}", market.district, market.state);
                self.locate(&coarse_query).await
            }
        };

        match target {
            Some(to) => Some(clamp_min_travel(haversine_km(from, to).round())),
            None => Some(heuristic_tier(market, origin)),
        }
    }
}

/// A resolved distance of exactly zero means co-located points, not free travel.
pub fn clamp_min_travel(km: f64) -> f64 {
    if km == 0.0 {
        MIN_TRAVEL_KM
    } else {
        km
    }
}

/// Tiered guess from administrative areas, when the origin has any.
fn heuristic_distance(market: &MarketKey, origin: &Origin) -> Option<f64> {
    if origin.state.is_none() && origin.district.is_none() {
        return None;
    }
    Some(heuristic_tier(market, origin))
}

fn heuristic_tier(market: &MarketKey, origin: &Origin) -> f64 {
    let same_state = origin
        .state
        .as_deref()
        .is_some_and(|s| same_place(s, &market.state));
    let same_district = same_state
        && origin
            .district
            .as_deref()
            .is_some_and(|d| same_place(d, &market.district));

    if same_district {
        fallback_km::SAME_DISTRICT
    } else if same_state {
        fallback_km::SAME_STATE
    } else {
        fallback_km::ELSEWHERE
    }
}

/// Area names match ignoring case and surrounding whitespace.
pub fn same_place(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Drops parenthetical qualifiers: `"Punalur (Sub Yard)"` → `"Punalur"`.
pub fn normalize_market_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Great-circle distance in km.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
