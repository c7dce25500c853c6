//! Derived dashboard views.
//!
//! Joins one `DashboardOverview` into per-location tables: current stock,
//! effective capacity, occupancy ratio and historical usage for every
//! product, ordered by the requested [`SortMode`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use utoipa::ToSchema;

use crate::analytics::{AggregatedAnalytics, aggregate, summarize_location};
use crate::capacity::{CapacityResolver, CapacitySource, occupancy_ratio};
use crate::model::{DashboardOverview, EntityId, Location, LocationSummary};
use crate::sorter::{SortMode, sort_breakdown};
use crate::types::{UNRANKED_POSITION, build_order_index, normalize};

/// One product row of a location table.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductRow {
    pub product_name: String,
    pub quantity: u64,
    pub capacity: u64,
    pub capacity_source: CapacitySource,
    /// `None` when the ratio is not a finite number.
    pub ratio: Option<f64>,
    pub order_position: Option<usize>,
    pub analytics: Option<AggregatedAnalytics>,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub location_id: EntityId,
    pub location_name: String,
    pub fridge_count: usize,
    pub users_count: u32,
    pub total_quantity: u64,
    pub total_capacity: u64,
    pub rows: Vec<ProductRow>,
}

impl LocationView {
    /// Overall fill level of the location; `None` without any rows.
    pub fn overall_ratio(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let ratio = occupancy_ratio(self.total_quantity, self.total_capacity);
        ratio.is_finite().then_some(ratio)
    }
}

/// Settings that shape a derivation.
#[derive(Clone, Copy, Debug)]
pub struct DeriveOptions {
    pub mode: SortMode,
    pub default_per_fridge: u32,
}

/// The backend summary when present, otherwise one computed from the fridges.
fn summary_for<'a>(
    overview: &'a DashboardOverview,
    location: &Location,
    computed: &'a mut Option<LocationSummary>,
) -> &'a LocationSummary {
    match overview.summaries.get(&location.id) {
        Some(summary) => summary,
        None => computed.insert(summarize_location(location)),
    }
}

/// Derives the table of a single location.
pub fn derive_location(
    overview: &DashboardOverview,
    location: &Location,
    order_index: &HashMap<String, usize>,
    options: DeriveOptions,
) -> LocationView {
    let resolver = CapacityResolver::new(
        &overview.capacity_map,
        &overview.capacity_by_location,
        options.default_per_fridge,
    );
    let mut computed = None;
    let summary = summary_for(overview, location, &mut computed);
    let mut analytics = aggregate(location, &overview.analytics_by_fridge);

    let position_of = |name: &str| {
        order_index
            .get(&normalize(name))
            .copied()
            .unwrap_or(UNRANKED_POSITION)
    };

    let mut rows_by_name: BTreeMap<&str, ProductRow> = BTreeMap::new();
    for (name, quantity) in &summary.location_breakdown {
        let resolved = resolver.resolve(location, name);
        let ratio = occupancy_ratio(*quantity, resolved.value);
        let position = position_of(name);
        rows_by_name.insert(
            name.as_str(),
            ProductRow {
                product_name: name.clone(),
                quantity: *quantity,
                capacity: resolved.value,
                capacity_source: resolved.source,
                ratio: ratio.is_finite().then_some(ratio),
                order_position: (position != UNRANKED_POSITION).then_some(position),
                analytics: analytics.remove(name),
            },
        );
    }

    let names: Vec<&str> = rows_by_name.keys().copied().collect();
    let ordered = sort_breakdown(
        &names,
        |name| {
            rows_by_name
                .get(name)
                .and_then(|row| row.ratio)
                .unwrap_or(f64::NAN)
        },
        position_of,
        options.mode,
    );

    let total_capacity = rows_by_name.values().map(|row| row.capacity).sum();
    let mut rows = Vec::with_capacity(ordered.len());
    for name in &ordered {
        if let Some(row) = rows_by_name.remove(name.as_str()) {
            rows.push(row);
        }
    }

    LocationView {
        location_id: location.id.clone(),
        location_name: location.name.clone(),
        fridge_count: location.refrigerators.len(),
        users_count: location.users_count,
        total_quantity: summary.total_location,
        total_capacity,
        rows,
    }
}

/// Derives the tables of every location of the overview.
pub fn derive_dashboard(overview: &DashboardOverview, options: DeriveOptions) -> Vec<LocationView> {
    let order_index = build_order_index(&overview.std_order);
    overview
        .locations
        .iter()
        .map(|location| derive_location(overview, location, &order_index, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CapacityMap, ProductAnalytics, ProductStock, Refrigerator};

    fn overview() -> DashboardOverview {
        let fridge = |id: &str, products: &[(&str, u32)]| Refrigerator {
            id: id.to_string(),
            name: id.to_string(),
            products: products
                .iter()
                .map(|(n, q)| ProductStock::new(*n, *q))
                .collect(),
        };

        let mut overview = DashboardOverview {
            std_order: vec!["Milk".into(), "Eggs".into(), "Jam".into()],
            capacity_map: [("milk", 10), ("eggs", 30)].into_iter().collect::<CapacityMap>(),
            locations: vec![Location {
                id: "loc-1".into(),
                name: "Centro".into(),
                refrigerators: vec![
                    fridge("f1", &[("Milk", 2), ("Eggs", 30), ("Cheese", 6)]),
                    fridge("f2", &[("Milk", 1), ("Jam", 36)]),
                ],
                users_count: 4,
            }],
            ..Default::default()
        };
        overview.capacity_by_location.insert(
            "loc-1",
            [("jam", 40)].into_iter().collect::<CapacityMap>(),
        );
        overview.analytics_by_fridge.insert(
            "f1".into(),
            HashMap::from([(
                "Milk".to_string(),
                ProductAnalytics {
                    total_used: Some(7),
                    ..Default::default()
                },
            )]),
        );
        overview
    }

    fn options(mode: SortMode) -> DeriveOptions {
        DeriveOptions {
            mode,
            default_per_fridge: 72,
        }
    }

    #[test]
    fn rows_carry_capacity_and_ratio() {
        let views = derive_dashboard(&overview(), options(SortMode::Alpha));
        assert_eq!(views.len(), 1);
        let view = &views[0];
        assert_eq!(view.total_quantity, 75);

        let milk = view.rows.iter().find(|r| r.product_name == "Milk").unwrap();
        assert_eq!(milk.quantity, 3);
        assert_eq!(milk.capacity, 20);
        assert_eq!(milk.capacity_source, CapacitySource::BaseTimesFridges);
        assert_eq!(milk.ratio, Some(0.15));
        assert_eq!(milk.analytics.as_ref().map(|a| a.total_used), Some(7));

        let jam = view.rows.iter().find(|r| r.product_name == "Jam").unwrap();
        assert_eq!(jam.capacity, 40);
        assert_eq!(jam.capacity_source, CapacitySource::LocationOverride);

        let cheese = view.rows.iter().find(|r| r.product_name == "Cheese").unwrap();
        assert_eq!(cheese.capacity, 144);
        assert_eq!(cheese.order_position, None);
    }

    #[test]
    fn rows_follow_sort_mode() {
        let names = |mode| {
            derive_dashboard(&overview(), options(mode))[0]
                .rows
                .iter()
                .map(|r| r.product_name.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(SortMode::Alpha), vec!["Cheese", "Eggs", "Jam", "Milk"]);
        assert_eq!(names(SortMode::Order), vec!["Milk", "Eggs", "Jam", "Cheese"]);
        // Cheese 6/144, Milk 3/20, Jam 36/40, Eggs 30/60
        assert_eq!(names(SortMode::Critical), vec!["Cheese", "Milk", "Eggs", "Jam"]);
    }

    #[test]
    fn backend_summary_takes_precedence() {
        let mut overview = overview();
        overview.summaries.insert(
            "loc-1".into(),
            LocationSummary {
                total_location: 5,
                location_breakdown: BTreeMap::from([("Milk".to_string(), 5)]),
            },
        );
        let view = &derive_dashboard(&overview, options(SortMode::Critical))[0];
        assert_eq!(view.total_quantity, 5);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].ratio, Some(0.25));
    }

    #[test]
    fn overall_ratio_is_none_for_empty_location() {
        let mut overview = overview();
        overview.locations[0].refrigerators.clear();
        let view = &derive_dashboard(&overview, options(SortMode::Critical))[0];
        assert!(view.rows.is_empty());
        assert_eq!(view.overall_ratio(), None);
    }
}
