pub mod forecast;
pub mod seasonal;

pub use forecast::{forecast_prices, ForecastRng};
pub use seasonal::{monthly_means, seasonal_patterns};
