//! Capacity resolution for per-location occupancy.
//!
//! The effective capacity of a product at a location is the denominator of
//! every occupancy ratio the dashboard shows. It is resolved through a
//! three-tier fallback:
//! 1. location-specific override
//! 2. global per-fridge base capacity × fridge count
//! 3. default per-fridge constant × fridge count

use crate::model::{CapacityMap, CapacityOverrides, Location};

/// Per-fridge capacity used when nothing else is configured.
pub const DEFAULT_PER_FRIDGE: u32 = 72;

/// Which tier of the fallback chain produced a capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CapacitySource {
    LocationOverride,
    BaseTimesFridges,
    DefaultTimesFridges,
}

/// A resolved capacity together with the tier it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedCapacity {
    pub value: u64,
    pub source: CapacitySource,
}

/// Inputs shared by every lookup for one dashboard render.
#[derive(Clone, Copy, Debug)]
pub struct CapacityResolver<'a> {
    capacity_map: &'a CapacityMap,
    overrides: &'a CapacityOverrides,
    default_per_fridge: u32,
}

impl<'a> CapacityResolver<'a> {
    /// A zero default would turn every ratio into a division by zero, so it
    /// is clamped to 1.
    pub fn new(
        capacity_map: &'a CapacityMap,
        overrides: &'a CapacityOverrides,
        default_per_fridge: u32,
    ) -> Self {
        Self {
            capacity_map,
            overrides,
            default_per_fridge: default_per_fridge.max(1),
        }
    }

    pub fn resolve(&self, location: &Location, product_name: &str) -> ResolvedCapacity {
        if let Some(value) = self.overrides.get(&location.id, product_name) {
            return ResolvedCapacity {
                value: u64::from(value),
                source: CapacitySource::LocationOverride,
            };
        }

        let fridges = location.fridge_count();
        match self.capacity_map.get(product_name) {
            Some(base) => ResolvedCapacity {
                value: u64::from(base) * fridges,
                source: CapacitySource::BaseTimesFridges,
            },
            None => ResolvedCapacity {
                value: u64::from(self.default_per_fridge) * fridges,
                source: CapacitySource::DefaultTimesFridges,
            },
        }
    }

    pub fn effective_capacity(&self, location: &Location, product_name: &str) -> u64 {
        self.resolve(location, product_name).value
    }
}

/// Resolves the effective capacity of a product at a location.
///
/// Always returns a value greater than zero.
///
/// # Examples
/// ```
/// use fridge_inventory::capacity::effective_capacity;
/// use fridge_inventory::model::{CapacityMap, CapacityOverrides, Location};
///
/// let location = Location {
///     id: "loc-1".into(),
///     name: "Centro".into(),
///     refrigerators: vec![],
///     users_count: 0,
/// };
/// let capacity = effective_capacity(
///     &location,
///     "Milk",
///     &CapacityMap::new(),
///     &CapacityOverrides::new(),
///     72,
/// );
/// assert_eq!(capacity, 72);
/// ```
pub fn effective_capacity(
    location: &Location,
    product_name: &str,
    capacity_map: &CapacityMap,
    overrides: &CapacityOverrides,
    default_per_fridge: u32,
) -> u64 {
    CapacityResolver::new(capacity_map, overrides, default_per_fridge)
        .effective_capacity(location, product_name)
}

/// Current quantity divided by capacity.
///
/// Yields NaN for a zero capacity so callers render "no data" instead of
/// a misleading number.
pub fn occupancy_ratio(quantity: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return f64::NAN;
    }
    quantity as f64 / capacity as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Refrigerator;

    fn location_with_fridges(id: &str, fridges: usize) -> Location {
        Location {
            id: id.to_string(),
            name: format!("Location {id}"),
            refrigerators: (0..fridges)
                .map(|i| Refrigerator {
                    id: format!("{id}-f{i}"),
                    name: format!("Fridge {i}"),
                    products: vec![],
                })
                .collect(),
            users_count: 0,
        }
    }

    #[test]
    fn tier_precedence_override_base_default() {
        let location = location_with_fridges("loc-1", 3);
        let base: CapacityMap = [("Milk", 10)].into_iter().collect();
        let mut overrides = CapacityOverrides::new();
        overrides.insert("loc-1", [("milk", 50)].into_iter().collect());

        assert_eq!(effective_capacity(&location, "Milk", &base, &overrides, 72), 50);

        let no_overrides = CapacityOverrides::new();
        assert_eq!(effective_capacity(&location, "Milk", &base, &no_overrides, 72), 30);

        let no_base = CapacityMap::new();
        assert_eq!(effective_capacity(&location, "Milk", &no_base, &no_overrides, 72), 216);
    }

    #[test]
    fn override_for_other_location_is_ignored() {
        let location = location_with_fridges("loc-2", 2);
        let base = CapacityMap::new();
        let mut overrides = CapacityOverrides::new();
        overrides.insert("loc-1", [("milk", 50)].into_iter().collect());

        let resolved = CapacityResolver::new(&base, &overrides, 72).resolve(&location, "milk");
        assert_eq!(resolved.value, 144);
        assert_eq!(resolved.source, CapacitySource::DefaultTimesFridges);
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let location = location_with_fridges("loc-1", 2);
        let base: CapacityMap = [("Agua Con Gas", 12)].into_iter().collect();
        let overrides = CapacityOverrides::new();

        let resolved = CapacityResolver::new(&base, &overrides, 72).resolve(&location, "  AGUA con gas ");
        assert_eq!(resolved.value, 24);
        assert_eq!(resolved.source, CapacitySource::BaseTimesFridges);
    }

    #[test]
    fn location_without_fridges_counts_as_one() {
        let location = location_with_fridges("loc-1", 0);
        let base: CapacityMap = [("Milk", 10)].into_iter().collect();
        assert_eq!(
            effective_capacity(&location, "milk", &base, &CapacityOverrides::new(), 72),
            10
        );
    }

    #[test]
    fn zero_default_is_clamped_to_positive() {
        let location = location_with_fridges("loc-1", 4);
        let capacity = effective_capacity(
            &location,
            "unknown",
            &CapacityMap::new(),
            &CapacityOverrides::new(),
            0,
        );
        assert_eq!(capacity, 4);
    }

    #[test]
    fn capacity_is_always_positive() {
        let base: CapacityMap = [("a", 1), ("b", 0)].into_iter().collect();
        let mut overrides = CapacityOverrides::new();
        overrides.insert("x", [("c", 0), ("d", 5)].into_iter().collect());

        for fridges in 0..4 {
            let location = location_with_fridges("x", fridges);
            for product in ["a", "b", "c", "d", "", "zzz"] {
                for default in [0, 1, 72] {
                    assert!(effective_capacity(&location, product, &base, &overrides, default) > 0);
                }
            }
        }
    }

    #[test]
    fn occupancy_ratio_handles_zero_capacity() {
        assert_eq!(occupancy_ratio(36, 72), 0.5);
        assert!(occupancy_ratio(1, 0).is_nan());
    }
}
