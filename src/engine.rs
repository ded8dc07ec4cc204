use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::analysis::{forecast_prices, seasonal_patterns, ForecastRng};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{validate_vehicle, Config};
use crate::error::{AppError, Result};
use crate::geo::{DistanceResolver, GeoCache, Geocoder};
use crate::loader::{load_records, LoadStats};
use crate::narrative::{NarrativeContext, Narrator};
use crate::scorer::MarketScorer;
use crate::state::MarketIndex;
use crate::types::{
    MarketRecord, Origin, PriceForecast, Ranking, SeasonalPattern, VehicleProfile,
};

/// One ranking query. Unset fields take the engine defaults.
#[derive(Debug, Clone, Default)]
pub struct RankRequest {
    pub variety: String,
    pub origin: Origin,
    pub fuel_price_per_liter: Option<f64>,
    pub mileage_km_per_liter: Option<f64>,
    pub limit: Option<usize>,
    pub with_narrative: bool,
}

/// Collaborators the engine is built around. Swappable for tests.
pub struct EngineParts {
    pub geocoder: Arc<dyn Geocoder>,
    pub cache: Arc<dyn GeoCache>,
    pub narrator: Option<Arc<dyn Narrator>>,
}

/// Owns the current index and every analysis over it.
///
/// The index is an explicit value: queries take a snapshot (`Arc`) and a
/// reload swaps in a freshly built one without disturbing queries in flight.
pub struct MarketEngine {
    data_path: PathBuf,
    index: RwLock<Arc<MarketIndex>>,
    scorer: MarketScorer,
    narrator: Option<Arc<dyn Narrator>>,
    rng: Mutex<ForecastRng>,
    default_vehicle: VehicleProfile,
    ranking_limit: usize,
    narrative_timeout: Duration,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl MarketEngine {
    pub fn new(cfg: &Config, records: Vec<MarketRecord>, parts: EngineParts) -> Self {
        let health = Arc::new(HealthState::new());
        let latency = Arc::new(LatencyStats::new());
        let resolver = Arc::new(DistanceResolver::new(
            parts.geocoder,
            parts.cache,
            cfg.geocoder_timeout,
            Arc::clone(&health),
            Arc::clone(&latency),
        ));

        let index = MarketIndex::build(records);
        health.set_loaded(index.record_count() as u64, now_secs());

        Self {
            data_path: PathBuf::from(&cfg.data_path),
            index: RwLock::new(Arc::new(index)),
            scorer: MarketScorer::new(resolver),
            narrator: parts.narrator,
            rng: Mutex::new(ForecastRng::from_seed_option(cfg.forecast_seed)),
            default_vehicle: VehicleProfile {
                fuel_price_per_liter: cfg.fuel_price_per_liter,
                mileage_km_per_liter: cfg.vehicle_mileage_km_per_liter,
            },
            ranking_limit: cfg.ranking_limit,
            narrative_timeout: cfg.narrative_timeout,
            health,
            latency,
        }
    }

    /// Load `cfg.data_path` and build the engine over it. Fails when the
    /// source yields no rows at all.
    pub fn load(cfg: &Config, parts: EngineParts) -> Result<(Self, LoadStats)> {
        let (records, stats) = load_records(&PathBuf::from(&cfg.data_path))?;
        let engine = Self::new(cfg, records, parts);
        engine.log_index_sizes();
        Ok((engine, stats))
    }

    /// Re-read the source and swap in a new index. The old index stays in
    /// service when the reload fails.
    pub async fn reload(&self) -> Result<LoadStats> {
        let path = self.data_path.clone();
        let (records, stats) = tokio::task::spawn_blocking(move || load_records(&path))
            .await
            .map_err(|e| AppError::Load(format!("reload task failed: {e}")))??;

        let index = Arc::new(MarketIndex::build(records));
        let count = index.record_count();
        match self.index.write() {
            Ok(mut guard) => *guard = index,
            Err(poisoned) => *poisoned.into_inner() = index,
        }
        self.health.set_loaded(count as u64, now_secs());
        info!("Reload complete: {count} records indexed");
        self.log_index_sizes();
        Ok(stats)
    }

    /// Snapshot of the index in service.
    pub fn index(&self) -> Arc<MarketIndex> {
        match self.index.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub fn latency(&self) -> &Arc<LatencyStats> {
        &self.latency
    }

    pub fn list_states(&self) -> Vec<String> {
        self.index().list_states()
    }

    pub fn list_districts(&self, state: &str) -> Vec<String> {
        self.index().list_districts(state)
    }

    pub fn list_markets(&self, state: &str, district: &str) -> Vec<String> {
        self.index().list_markets(state, district)
    }

    pub fn list_varieties(&self) -> Vec<String> {
        self.index().list_varieties()
    }

    pub fn seasonal_patterns(&self, variety: &str) -> Vec<SeasonalPattern> {
        seasonal_patterns(self.index().records_for_variety(variety))
    }

    /// Forecast starting at the current calendar month.
    pub fn forecast(&self, variety: &str, months: usize) -> Vec<PriceForecast> {
        self.forecast_from(variety, months, chrono::Local::now().date_naive())
    }

    pub fn forecast_from(&self, variety: &str, months: usize, today: NaiveDate) -> Vec<PriceForecast> {
        let index = self.index();
        let records = index.records_for_variety(variety);
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        forecast_prices(records, months, today, &mut rng)
    }

    /// Ranked markets for a variety, optionally with a narrative. Only a
    /// malformed vehicle profile is an error; everything else degrades.
    pub async fn rank_markets(&self, request: &RankRequest) -> Result<Ranking> {
        let vehicle = VehicleProfile {
            fuel_price_per_liter: request
                .fuel_price_per_liter
                .unwrap_or(self.default_vehicle.fuel_price_per_liter),
            mileage_km_per_liter: request
                .mileage_km_per_liter
                .unwrap_or(self.default_vehicle.mileage_km_per_liter),
        };
        validate_vehicle(vehicle.fuel_price_per_liter, vehicle.mileage_km_per_liter)
            .map_err(AppError::InvalidRequest)?;
        let limit = request.limit.unwrap_or(self.ranking_limit).max(1);

        let index = self.index();
        let records = index.records_for_variety(&request.variety);
        let markets = self
            .scorer
            .rank(records, &request.origin, vehicle, limit)
            .await;

        let narrative = if request.with_narrative && !markets.is_empty() {
            self.narrate(&NarrativeContext::new(&request.variety, &markets)).await
        } else {
            None
        };

        Ok(Ranking {
            variety: request.variety.clone(),
            markets,
            narrative,
        })
    }

    /// Awaited inline only for requests that ask for it, bounded by
    /// `NARRATIVE_TIMEOUT_MS`. Rankings without a narrative never wait here.
    async fn narrate(&self, context: &NarrativeContext) -> Option<String> {
        let narrator = self.narrator.as_ref()?;
        match tokio::time::timeout(self.narrative_timeout, narrator.summarize(context)).await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                self.health.inc_narrative_failure();
                warn!("[NARRATIVE] enrichment failed for {}: {e}", context.variety);
                None
            }
            Err(_) => {
                self.health.inc_narrative_failure();
                warn!("[NARRATIVE] enrichment timed out for {}", context.variety);
                None
            }
        }
    }

    fn log_index_sizes(&self) {
        let index = self.index();
        info!(
            records = index.record_count(),
            states = index.state_count(),
            markets = index.market_count(),
            varieties = index.variety_count(),
            "Index ready",
        );
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::geo::resolver::tests::FakeGeocoder;
    use crate::geo::UnboundedGeoCache;
    use crate::state::index::tests::record;
    use crate::types::{GeoPoint, Recommendation};
    use async_trait::async_trait;

    pub(crate) struct FixedNarrator(pub Option<&'static str>);

    #[async_trait]
    impl Narrator for FixedNarrator {
        async fn summarize(&self, _context: &NarrativeContext) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| AppError::Narrative("unavailable".to_string()))
        }
    }

    struct StalledNarrator;

    #[async_trait]
    impl Narrator for StalledNarrator {
        async fn summarize(&self, _context: &NarrativeContext) -> Result<String> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    pub(crate) fn sample_records() -> Vec<MarketRecord> {
        vec![
            record("Kerala", "Kollam", "Punalur", "Banana", 100.0, (2023, 1, 10)),
            record("Kerala", "Kollam", "Punalur", "Banana", 300.0, (2023, 7, 10)),
            record("Karnataka", "Mysore", "Mysore", "Banana", 250.0, (2023, 7, 12)),
            record("Kerala", "Idukki", "Kattappana", "Pepper", 50000.0, (2023, 2, 1)),
        ]
    }

    pub(crate) fn engine_with(narrator: Option<Arc<dyn Narrator>>) -> MarketEngine {
        let geocoder = FakeGeocoder::with(&[("Kollam, Kerala", GeoPoint { lat: 8.89, lon: 76.61 })]);
        MarketEngine::new(
            &test_config(),
            sample_records(),
            EngineParts {
                geocoder: Arc::new(geocoder),
                cache: Arc::new(UnboundedGeoCache::new()),
                narrator,
            },
        )
    }

    fn kerala_request(with_narrative: bool) -> RankRequest {
        RankRequest {
            variety: "Banana".to_string(),
            origin: Origin {
                point: None,
                state: Some("Kerala".to_string()),
                district: Some("Kollam".to_string()),
            },
            with_narrative,
            ..Default::default()
        }
    }

    #[test]
    fn listings_delegate_to_index() {
        let engine = engine_with(None);
        assert_eq!(engine.list_states(), vec!["Karnataka", "Kerala"]);
        assert_eq!(engine.list_districts("Kerala"), vec!["Idukki", "Kollam"]);
        assert_eq!(engine.list_markets("Kerala", "Kollam"), vec!["Punalur"]);
        assert_eq!(engine.list_varieties(), vec!["Banana", "Pepper"]);
    }

    #[test]
    fn seasonal_and_forecast_for_known_and_unknown_varieties() {
        let engine = engine_with(None);
        let patterns = engine.seasonal_patterns("Banana");
        assert_eq!(patterns.len(), 12);
        assert_eq!(patterns[0].recommendation, Recommendation::Poor);
        assert!(engine.seasonal_patterns("Mango").is_empty());

        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(engine.forecast_from("Banana", 6, today).len(), 6);
        assert!(engine.forecast_from("Mango", 6, today).is_empty());
    }

    #[tokio::test]
    async fn ranking_puts_origin_state_first() {
        let engine = engine_with(None);
        let ranking = engine.rank_markets(&kerala_request(false)).await.unwrap();
        let markets: Vec<&str> = ranking.markets.iter().map(|m| m.market.as_str()).collect();
        assert_eq!(markets, vec!["Punalur", "Mysore"]);
        assert!(ranking.narrative.is_none());
    }

    #[tokio::test]
    async fn narrative_is_attached_when_available() {
        let engine = engine_with(Some(Arc::new(FixedNarrator(Some("Sell in July.")))));
        let ranking = engine.rank_markets(&kerala_request(true)).await.unwrap();
        assert_eq!(ranking.narrative.as_deref(), Some("Sell in July."));
    }

    #[tokio::test]
    async fn narrative_failure_keeps_numeric_ranking() {
        let engine = engine_with(Some(Arc::new(FixedNarrator(None))));
        let ranking = engine.rank_markets(&kerala_request(true)).await.unwrap();
        assert_eq!(ranking.markets.len(), 2);
        assert!(ranking.narrative.is_none());
        assert_eq!(engine.health().snapshot().narrative_failures, 1);
    }

    #[tokio::test]
    async fn stalled_narrative_is_abandoned_at_timeout() {
        let engine = engine_with(Some(Arc::new(StalledNarrator)));
        let started = std::time::Instant::now();
        let ranking = engine.rank_markets(&kerala_request(true)).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(ranking.markets.len(), 2);
        assert!(ranking.narrative.is_none());
        assert_eq!(engine.health().snapshot().narrative_failures, 1);
    }

    #[tokio::test]
    async fn negative_mileage_request_is_rejected() {
        let engine = engine_with(None);
        let mut request = kerala_request(false);
        request.mileage_km_per_liter = Some(-2.0);
        let result = engine.rank_markets(&request).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn unknown_variety_ranks_nothing() {
        let engine = engine_with(None);
        let mut request = kerala_request(true);
        request.variety = "Mango".to_string();
        let ranking = engine.rank_markets(&request).await.unwrap();
        assert!(ranking.markets.is_empty());
    }

    #[tokio::test]
    async fn reload_swaps_index_and_keeps_old_on_failure() {
        let dir = std::env::temp_dir().join(format!("commodity-intel-reload-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut cfg = test_config();
        cfg.data_path = dir.display().to_string();

        let engine = MarketEngine::new(
            &cfg,
            sample_records(),
            EngineParts {
                geocoder: Arc::new(FakeGeocoder::default()),
                cache: Arc::new(UnboundedGeoCache::new()),
                narrator: None,
            },
        );

        // empty directory: reload fails, old index survives
        assert!(engine.reload().await.is_err());
        assert_eq!(engine.index().record_count(), 4);

        std::fs::write(
            dir.join("mango.csv"),
            "state,district,market,variety,group,arrivals,minPrice,maxPrice,modalPrice,reportedDate\n\
             Goa,North Goa,Mapusa,Mango,Fruits,2,3000,4000,3500,2023-05-01\n",
        )
        .unwrap();
        let stats = engine.reload().await.unwrap();
        assert_eq!(stats.accepted, 1);
        assert_eq!(engine.list_states(), vec!["Goa"]);
        assert_eq!(engine.health().snapshot().records_loaded, 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
