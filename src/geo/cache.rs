use dashmap::DashMap;

use crate::types::GeoPoint;

/// Place name → coordinates store used by the distance resolver.
///
/// Concurrent lookups of the same uncached name may both insert; values are
/// deterministic per name so the last write wins harmlessly.
pub trait GeoCache: Send + Sync {
    fn get(&self, place: &str) -> Option<GeoPoint>;
    fn insert(&self, place: &str, point: GeoPoint);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime cache with no eviction or expiry. Fine for a bounded run;
/// a long-lived process should plug in a bounded strategy instead.
#[derive(Debug, Default)]
pub struct UnboundedGeoCache {
    entries: DashMap<String, GeoPoint>,
}

impl UnboundedGeoCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeoCache for UnboundedGeoCache {
    fn get(&self, place: &str) -> Option<GeoPoint> {
        self.entries.get(&cache_key(place)).map(|p| *p)
    }

    fn insert(&self, place: &str, point: GeoPoint) {
        self.entries.insert(cache_key(place), point);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Case and surrounding whitespace do not change where a place is.
fn cache_key(place: &str) -> String {
    place.trim().to_lowercase()
}
