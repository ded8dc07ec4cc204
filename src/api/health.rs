//! Shared health state for the /health endpoint.
//! Updated by the engine on load/reload and by the distance resolver.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared health metrics. Updated by engine components, read by API.
#[derive(Default)]
pub struct HealthState {
    /// Records in the index currently in service.
    pub records_loaded: AtomicU64,
    /// Unix seconds of the last successful (re)load (0 = never).
    pub last_load_at_secs: AtomicU64,
    /// Place lookups answered from the geocode cache.
    pub geocode_cache_hits: AtomicU64,
    /// Place lookups that went to the geocoding service.
    pub geocode_lookups: AtomicU64,
    /// Geocoding calls that failed, timed out, or found nothing.
    pub geocode_failures: AtomicU64,
    /// Narrative enrichments that failed or timed out.
    pub narrative_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub records_loaded: u64,
    pub last_load_at_secs: u64,
    pub geocode_cache_hits: u64,
    pub geocode_lookups: u64,
    pub geocode_failures: u64,
    pub narrative_failures: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_loaded(&self, records: u64, at_secs: u64) {
        self.records_loaded.store(records, Ordering::Relaxed);
        self.last_load_at_secs.store(at_secs, Ordering::Relaxed);
    }

    pub fn inc_cache_hit(&self) {
        self.geocode_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_lookup(&self) {
        self.geocode_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_geocode_failure(&self) {
        self.geocode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_narrative_failure(&self) {
        self.narrative_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            records_loaded: self.records_loaded.load(Ordering::Relaxed),
            last_load_at_secs: self.last_load_at_secs.load(Ordering::Relaxed),
            geocode_cache_hits: self.geocode_cache_hits.load(Ordering::Relaxed),
            geocode_lookups: self.geocode_lookups.load(Ordering::Relaxed),
            geocode_failures: self.geocode_failures.load(Ordering::Relaxed),
            narrative_failures: self.narrative_failures.load(Ordering::Relaxed),
        }
    }
}
