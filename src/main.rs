mod analysis;
mod api;
mod config;
mod engine;
mod error;
mod geo;
mod loader;
mod narrative;
mod scorer;
mod state;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::engine::{EngineParts, MarketEngine};
use crate::error::Result;
use crate::geo::{NominatimGeocoder, UnboundedGeoCache};
use crate::narrative::{ChatNarrator, Narrator};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        "Starting market intelligence engine (data={}, fuel={:.2}/L, mileage={:.2} km/L, top_k={})",
        cfg.data_path,
        cfg.fuel_price_per_liter,
        cfg.vehicle_mileage_km_per_liter,
        cfg.ranking_limit,
    );
    if cfg.forecast_seed.is_some() {
        info!("FORECAST_SEED set: forecasts are reproducible");
    }

    // --- Collaborators ---
    let geocoder = Arc::new(NominatimGeocoder::new(&cfg)?);
    let narrator: Option<Arc<dyn Narrator>> = match ChatNarrator::from_config(&cfg)? {
        Some(n) => {
            info!("Narrative enrichment enabled (model={})", cfg.narrative_model);
            Some(Arc::new(n))
        }
        None => {
            warn!("NARRATIVE_API_KEY not set: rankings will carry no narrative.");
            None
        }
    };

    // --- Load + index ---
    let (engine, stats) = MarketEngine::load(
        &cfg,
        EngineParts {
            geocoder,
            cache: Arc::new(UnboundedGeoCache::new()),
            narrator,
        },
    )?;
    info!(
        "[LOAD] rejected: unreadable={} field_count={} numeric={} date={} empty_location={} non_positive_price={}",
        stats.rejected_unreadable,
        stats.rejected_field_count,
        stats.rejected_numeric,
        stats.rejected_date,
        stats.rejected_empty_location,
        stats.rejected_non_positive_price,
    );

    // --- HTTP API ---
    let app = router(ApiState {
        engine: Arc::new(engine),
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
