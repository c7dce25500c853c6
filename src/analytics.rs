//! Per-location aggregation of refrigerator data.
//!
//! Two derivations live here:
//! - [`summarize_location`]: current stock of a location per product
//! - [`aggregate`]: historical usage of every fridge of a location merged
//!   into per-product totals

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{FridgeAnalytics, Location, LocationSummary};

/// Usage totals of one product across all refrigerators of a location.
///
/// `min_quantity`/`max_quantity` stay `None` when no fridge reported a
/// value; render that as "no data".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAnalytics {
    pub total_used: i64,
    pub total_restocked: i64,
    pub min_quantity: Option<i64>,
    pub max_quantity: Option<i64>,
    #[schema(value_type = HashMap<String, i64>)]
    pub usage_by_day: BTreeMap<NaiveDate, i64>,
}

impl AggregatedAnalytics {
    /// Display form of the minimum: the number or an em-dash.
    pub fn min_label(&self) -> String {
        no_data_label(self.min_quantity)
    }

    /// Display form of the maximum: the number or an em-dash.
    pub fn max_label(&self) -> String {
        no_data_label(self.max_quantity)
    }
}

/// Renders a possibly missing value, using "—" for no data.
pub fn no_data_label(value: Option<i64>) -> String {
    value.map_or_else(|| "—".to_string(), |v| v.to_string())
}

fn merge_min(running: Option<i64>, incoming: Option<i64>) -> Option<i64> {
    match (running, incoming) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn merge_max(running: Option<i64>, incoming: Option<i64>) -> Option<i64> {
    match (running, incoming) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Merges the analytics of every refrigerator of `location`.
///
/// Refrigerators without an analytics record, and products absent from a
/// record, contribute nothing. A product no fridge reports never appears in
/// the result.
pub fn aggregate(
    location: &Location,
    analytics_by_fridge: &HashMap<String, FridgeAnalytics>,
) -> BTreeMap<String, AggregatedAnalytics> {
    let mut totals: BTreeMap<String, AggregatedAnalytics> = BTreeMap::new();

    for fridge in &location.refrigerators {
        let Some(records) = analytics_by_fridge.get(&fridge.id) else {
            continue;
        };

        for (product, src) in records {
            let entry = totals.entry(product.clone()).or_default();
            entry.total_used = entry.total_used.saturating_add(src.total_used.unwrap_or(0));
            entry.total_restocked = entry
                .total_restocked
                .saturating_add(src.total_restocked.unwrap_or(0));
            entry.min_quantity = merge_min(entry.min_quantity, src.min_quantity);
            entry.max_quantity = merge_max(entry.max_quantity, src.max_quantity);
            for (day, delta) in &src.usage_by_day {
                let total = entry.usage_by_day.entry(*day).or_insert(0);
                *total = total.saturating_add(*delta);
            }
        }
    }

    totals
}

/// Sums current quantities of every refrigerator of `location`.
pub fn summarize_location(location: &Location) -> LocationSummary {
    let mut summary = LocationSummary::default();
    for fridge in &location.refrigerators {
        for stock in &fridge.products {
            let quantity = u64::from(stock.quantity);
            *summary
                .location_breakdown
                .entry(stock.product_name.clone())
                .or_insert(0) += quantity;
            summary.total_location += quantity;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProductAnalytics, ProductStock, Refrigerator};

    fn fridge(id: &str, products: &[(&str, u32)]) -> Refrigerator {
        Refrigerator {
            id: id.to_string(),
            name: id.to_uppercase(),
            products: products
                .iter()
                .map(|(name, qty)| ProductStock::new(*name, *qty))
                .collect(),
        }
    }

    fn location(fridges: Vec<Refrigerator>) -> Location {
        Location {
            id: "loc-1".to_string(),
            name: "Centro".to_string(),
            refrigerators: fridges,
            users_count: 2,
        }
    }

    fn analytics(
        used: Option<i64>,
        restocked: Option<i64>,
        min: Option<i64>,
        max: Option<i64>,
    ) -> ProductAnalytics {
        ProductAnalytics {
            total_used: used,
            total_restocked: restocked,
            min_quantity: min,
            max_quantity: max,
            usage_by_day: BTreeMap::new(),
        }
    }

    #[test]
    fn merges_two_fridges() {
        let loc = location(vec![fridge("f1", &[]), fridge("f2", &[])]);
        let mut by_fridge = HashMap::new();
        by_fridge.insert(
            "f1".to_string(),
            HashMap::from([("Milk".to_string(), analytics(Some(2), None, Some(1), Some(5)))]),
        );
        by_fridge.insert(
            "f2".to_string(),
            HashMap::from([("Milk".to_string(), analytics(Some(3), None, Some(0), Some(4)))]),
        );

        let totals = aggregate(&loc, &by_fridge);
        let milk = &totals["Milk"];
        assert_eq!(milk.total_used, 5);
        assert_eq!(milk.total_restocked, 0);
        assert_eq!(milk.min_quantity, Some(0));
        assert_eq!(milk.max_quantity, Some(5));
    }

    #[test]
    fn ignores_fridges_of_other_locations() {
        let loc = location(vec![fridge("f1", &[])]);
        let mut by_fridge = HashMap::new();
        by_fridge.insert(
            "f1".to_string(),
            HashMap::from([("Milk".to_string(), analytics(Some(1), Some(4), None, None))]),
        );
        by_fridge.insert(
            "elsewhere".to_string(),
            HashMap::from([("Eggs".to_string(), analytics(Some(9), None, None, None))]),
        );

        let totals = aggregate(&loc, &by_fridge);
        assert_eq!(totals.len(), 1);
        assert!(!totals.contains_key("Eggs"));
        assert_eq!(totals["Milk"].total_restocked, 4);
    }

    #[test]
    fn missing_min_max_stays_no_data() {
        let loc = location(vec![fridge("f1", &[]), fridge("f2", &[])]);
        let mut by_fridge = HashMap::new();
        by_fridge.insert(
            "f1".to_string(),
            HashMap::from([("Milk".to_string(), analytics(None, None, None, None))]),
        );
        by_fridge.insert(
            "f2".to_string(),
            HashMap::from([("Milk".to_string(), analytics(Some(1), None, None, Some(3)))]),
        );

        let milk = &aggregate(&loc, &by_fridge)["Milk"];
        assert_eq!(milk.min_quantity, None);
        assert_eq!(milk.min_label(), "—");
        assert_eq!(milk.max_label(), "3");
    }

    #[test]
    fn usage_by_day_is_summed_per_date() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let other = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let mut a = analytics(None, None, None, None);
        a.usage_by_day.insert(day, -3);
        let mut b = analytics(None, None, None, None);
        b.usage_by_day.insert(day, 5);
        b.usage_by_day.insert(other, -1);

        let loc = location(vec![fridge("f1", &[]), fridge("f2", &[])]);
        let by_fridge = HashMap::from([
            ("f1".to_string(), HashMap::from([("Milk".to_string(), a)])),
            ("f2".to_string(), HashMap::from([("Milk".to_string(), b)])),
        ]);

        let milk = &aggregate(&loc, &by_fridge)["Milk"];
        assert_eq!(milk.usage_by_day[&day], 2);
        assert_eq!(milk.usage_by_day[&other], -1);
    }

    #[test]
    fn totals_saturate_instead_of_overflowing() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut a = analytics(Some(i64::MAX), Some(i64::MAX), None, None);
        a.usage_by_day.insert(day, i64::MAX);
        let mut b = analytics(Some(1), Some(1), None, None);
        b.usage_by_day.insert(day, 1);

        let loc = location(vec![fridge("f1", &[]), fridge("f2", &[])]);
        let by_fridge = HashMap::from([
            ("f1".to_string(), HashMap::from([("Milk".to_string(), a)])),
            ("f2".to_string(), HashMap::from([("Milk".to_string(), b)])),
        ]);

        let milk = &aggregate(&loc, &by_fridge)["Milk"];
        assert_eq!(milk.total_used, i64::MAX);
        assert_eq!(milk.total_restocked, i64::MAX);
        assert_eq!(milk.usage_by_day[&day], i64::MAX);
    }

    #[test]
    fn summary_sums_quantities_across_fridges() {
        let loc = location(vec![
            fridge("f1", &[("Milk", 4), ("Eggs", 12)]),
            fridge("f2", &[("Milk", 6)]),
        ]);
        let summary = summarize_location(&loc);
        assert_eq!(summary.total_location, 22);
        assert_eq!(summary.location_breakdown["Milk"], 10);
        assert_eq!(summary.location_breakdown["Eggs"], 12);
    }
}
