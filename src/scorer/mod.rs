pub mod market_scorer;

pub use market_scorer::MarketScorer;
