pub mod cache;
pub mod geocoder;
pub mod resolver;

pub use cache::{GeoCache, UnboundedGeoCache};
pub use geocoder::{Geocoder, NominatimGeocoder};
pub use resolver::DistanceResolver;
