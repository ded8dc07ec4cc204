use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::OTHER_VARIETY;
use crate::types::MarketRecord;

// ---------------------------------------------------------------------------
// MarketIndex
// ---------------------------------------------------------------------------

/// Read-only lookup structures over one load of the record table.
///
/// Built once from the loaded records and never mutated afterwards; a reload
/// builds a fresh index and the owner swaps it in. Ordered maps/sets keep every
/// listing sorted and deduplicated without a separate sort pass.
#[derive(Debug, Default)]
pub struct MarketIndex {
    /// state → districts
    districts_by_state: BTreeMap<String, BTreeSet<String>>,
    /// (state, district) → markets
    markets_by_district: BTreeMap<(String, String), BTreeSet<String>>,
    /// variety → records, in load order
    records_by_variety: HashMap<String, Vec<MarketRecord>>,
    record_count: usize,
}

impl MarketIndex {
    /// One pass over the records. Rows the loader should already have dropped
    /// (empty location, non-positive modal price) are excluded here as well.
    pub fn build(records: Vec<MarketRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            if !is_indexable(&record) {
                continue;
            }
            index
                .districts_by_state
                .entry(record.state.clone())
                .or_default()
                .insert(record.district.clone());
            index
                .markets_by_district
                .entry((record.state.clone(), record.district.clone()))
                .or_default()
                .insert(record.market.clone());
            index
                .records_by_variety
                .entry(record.variety.clone())
                .or_default()
                .push(record);
            index.record_count += 1;
        }
        index
    }

    pub fn list_states(&self) -> Vec<String> {
        self.districts_by_state.keys().cloned().collect()
    }

    pub fn list_districts(&self, state: &str) -> Vec<String> {
        self.districts_by_state
            .get(state)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_markets(&self, state: &str, district: &str) -> Vec<String> {
        self.markets_by_district
            .get(&(state.to_string(), district.to_string()))
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted varieties, without the reserved "Other" sentinel.
    pub fn list_varieties(&self) -> Vec<String> {
        let mut varieties: Vec<String> = self
            .records_by_variety
            .keys()
            .filter(|v| !v.is_empty() && v.as_str() != OTHER_VARIETY)
            .cloned()
            .collect();
        varieties.sort();
        varieties
    }

    /// Records for a variety; empty for unknown varieties.
    pub fn records_for_variety(&self, variety: &str) -> &[MarketRecord] {
        self.records_by_variety
            .get(variety)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn state_count(&self) -> usize {
        self.districts_by_state.len()
    }

    pub fn market_count(&self) -> usize {
        self.markets_by_district.values().map(BTreeSet::len).sum()
    }

    pub fn variety_count(&self) -> usize {
        self.records_by_variety.len()
    }
}

fn is_indexable(r: &MarketRecord) -> bool {
    r.modal_price > 0.0 && !r.state.is_empty() && !r.district.is_empty() && !r.market.is_empty()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn record(
        state: &str,
        district: &str,
        market: &str,
        variety: &str,
        modal_price: f64,
        ymd: (i32, u32, u32),
    ) -> MarketRecord {
        MarketRecord {
            state: state.to_string(),
            district: district.to_string(),
            market: market.to_string(),
            variety: variety.to_string(),
            group: "Vegetables".to_string(),
            arrivals_tonnes: 10.0,
            min_price: modal_price * 0.9,
            max_price: modal_price * 1.1,
            modal_price,
            reported_date: NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap(),
        }
    }

    fn sample_index() -> MarketIndex {
        MarketIndex::build(vec![
            record("Kerala", "Kollam", "Punalur", "Banana", 2400.0, (2023, 1, 5)),
            record("Kerala", "Kollam", "Anchal", "Banana", 2300.0, (2023, 1, 6)),
            record("Kerala", "Idukki", "Kattappana", "Pepper", 50000.0, (2023, 2, 1)),
            record("Karnataka", "Mysore", "Mysore", "Banana", 2100.0, (2023, 3, 1)),
            record("Kerala", "Kollam", "Punalur", "Other", 900.0, (2023, 3, 2)),
            record("Kerala", "Kollam", "Punalur", "Banana", 2500.0, (2023, 4, 2)),
        ])
    }

    #[test]
    fn listings_are_sorted_and_deduplicated() {
        let index = sample_index();
        assert_eq!(index.list_states(), vec!["Karnataka", "Kerala"]);
        assert_eq!(index.list_districts("Kerala"), vec!["Idukki", "Kollam"]);
        assert_eq!(index.list_markets("Kerala", "Kollam"), vec!["Anchal", "Punalur"]);
    }

    #[test]
    fn varieties_exclude_other_sentinel() {
        let index = sample_index();
        assert_eq!(index.list_varieties(), vec!["Banana", "Pepper"]);
        assert_eq!(index.records_for_variety("Other").len(), 1);
    }

    #[test]
    fn unknown_keys_return_empty() {
        let index = sample_index();
        assert!(index.list_districts("Goa").is_empty());
        assert!(index.list_markets("Kerala", "Nowhere").is_empty());
        assert!(index.records_for_variety("Mango").is_empty());
    }

    #[test]
    fn invalid_records_are_not_indexed() {
        let mut zero = record("Kerala", "Kollam", "Punalur", "Banana", 0.0, (2023, 1, 1));
        zero.modal_price = 0.0;
        let blank = record("", "Kollam", "Punalur", "Banana", 100.0, (2023, 1, 1));
        let index = MarketIndex::build(vec![zero, blank]);
        assert_eq!(index.record_count(), 0);
        assert!(index.list_states().is_empty());
    }

    #[test]
    fn counts() {
        let index = sample_index();
        assert_eq!(index.record_count(), 6);
        assert_eq!(index.state_count(), 2);
        assert_eq!(index.market_count(), 4);
        assert_eq!(index.variety_count(), 3);
    }
}
