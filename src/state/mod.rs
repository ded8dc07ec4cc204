pub mod index;

pub use index::MarketIndex;
