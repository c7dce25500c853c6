//! Data models for the refrigerator inventory.
//!
//! These are the canonical shapes of what the backend returns:
//! - `Location` with its embedded `Refrigerator`s
//! - `CapacityMap` / `CapacityOverrides` for the capacity resolver
//! - `ProductAnalytics` per refrigerator and product
//! - `SessionSummaryRow` for active stock-take sessions
//! - `DashboardOverview`, the bundle served by `GET /dashboard/overview`
//!
//! Alternate field spellings and numeric ids are normalized here, once, so
//! the rest of the crate never has to unwrap optional shapes.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::normalize;

/// Backend identifiers are strings; numeric ids are converted on the way in.
pub type EntityId = String;

/// Analytics of one refrigerator, keyed by product name.
pub type FridgeAnalytics = HashMap<String, ProductAnalytics>;

/// Validation error for user-supplied data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Product name at position {0} is empty")]
    EmptyProductName(usize),
    #[error("Product '{name}' appears twice (positions {first} and {second})")]
    DuplicateProduct {
        name: String,
        first: usize,
        second: usize,
    },
    #[error("Index {index} is out of range for a list of {len} products")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: i64, max: i64 },
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<EntityId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

fn deserialize_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if !raw.is_finite() || raw <= 0.0 {
        return Ok(0);
    }
    Ok(raw.min(u32::MAX as f64) as u32)
}

/// A product line inside a refrigerator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductStock {
    #[serde(alias = "name")]
    pub product_name: String,
    /// Non-negative count; negative or missing values read as 0.
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: u32,
}

impl ProductStock {
    pub fn new(product_name: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Refrigerator {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub products: Vec<ProductStock>,
}

impl Refrigerator {
    /// Total units stored in this refrigerator.
    pub fn total_quantity(&self) -> u64 {
        self.products.iter().map(|p| u64::from(p.quantity)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub refrigerators: Vec<Refrigerator>,
    #[serde(default)]
    pub users_count: u32,
}

impl Location {
    /// Number of refrigerators used as capacity multiplier; never below 1.
    pub fn fridge_count(&self) -> u64 {
        self.refrigerators.len().max(1) as u64
    }
}

/// Base per-fridge capacity keyed by canonical product name.
///
/// Keys are normalized and non-positive values dropped when the map is
/// built, so lookups only need the normalized product name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(from = "HashMap<String, f64>")]
#[schema(value_type = HashMap<String, u32>, example = json!({"leche": 24, "yogur": 12}))]
pub struct CapacityMap(HashMap<String, u32>);

impl CapacityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positive capacity for the product, if configured.
    pub fn get(&self, product_name: &str) -> Option<u32> {
        self.0.get(&normalize(product_name)).copied().filter(|v| *v > 0)
    }

    /// Sets a capacity; zero removes the entry.
    pub fn set(&mut self, product_name: &str, capacity: u32) {
        let key = normalize(product_name);
        if capacity == 0 || key.is_empty() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, capacity);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.0.iter()
    }
}

impl From<HashMap<String, f64>> for CapacityMap {
    fn from(raw: HashMap<String, f64>) -> Self {
        let mut map = CapacityMap::new();
        for (name, value) in raw {
            if value.is_finite() && value >= 1.0 {
                map.set(&name, value.min(u32::MAX as f64) as u32);
            }
        }
        map
    }
}

impl<S: AsRef<str>> FromIterator<(S, u32)> for CapacityMap {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let mut map = CapacityMap::new();
        for (name, capacity) in iter {
            map.set(name.as_ref(), capacity);
        }
        map
    }
}

/// Location-specific capacity overrides: location id → capacity map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(value_type = HashMap<String, HashMap<String, u32>>)]
pub struct CapacityOverrides(HashMap<EntityId, CapacityMap>);

impl CapacityOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location_id: &str, product_name: &str) -> Option<u32> {
        self.0.get(location_id).and_then(|map| map.get(product_name))
    }

    pub fn for_location(&self, location_id: &str) -> Option<&CapacityMap> {
        self.0.get(location_id)
    }

    pub fn insert(&mut self, location_id: impl Into<EntityId>, map: CapacityMap) {
        self.0.insert(location_id.into(), map);
    }
}

/// Current stock of a location, summed over its refrigerators.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub total_location: u64,
    pub location_breakdown: BTreeMap<String, u64>,
}

/// Historical usage of one product in one refrigerator.
///
/// Every field may be absent on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductAnalytics {
    #[serde(default)]
    pub total_used: Option<i64>,
    #[serde(default)]
    pub total_restocked: Option<i64>,
    #[serde(default)]
    pub min_quantity: Option<i64>,
    #[serde(default)]
    pub max_quantity: Option<i64>,
    #[serde(default)]
    #[schema(value_type = HashMap<String, i64>)]
    pub usage_by_day: BTreeMap<NaiveDate, i64>,
}

/// One row of an active stock-take session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryRow {
    pub product_name: String,
    #[serde(default)]
    pub inicial: i64,
    #[serde(default)]
    pub entradas: i64,
    #[serde(default)]
    pub salidas: i64,
    /// Counted closing quantity, `None` while the session is still open.
    #[serde(rename = "final", default)]
    pub final_count: Option<i64>,
}

impl SessionSummaryRow {
    /// Quantity the books expect at close: opening + inflow - outflow.
    pub fn expected(&self) -> i64 {
        self.inicial
            .saturating_add(self.entradas)
            .saturating_sub(self.salidas)
    }

    /// Counted minus expected, once a closing count exists.
    pub fn discrepancy(&self) -> Option<i64> {
        self.final_count
            .map(|counted| counted.saturating_sub(self.expected()))
    }
}

/// Keep-alive status reported by the backend for the status widget.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeepAliveStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The bundle returned by `GET /dashboard/overview`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    /// Raw ordering; duplicates are tolerated here (first one wins).
    #[serde(default)]
    pub std_order: Vec<String>,
    #[serde(default)]
    pub capacity_map: CapacityMap,
    #[serde(default)]
    pub capacity_by_location: CapacityOverrides,
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Backend-computed summaries keyed by location id.
    #[serde(default)]
    pub summaries: HashMap<EntityId, LocationSummary>,
    /// Analytics keyed by refrigerator id.
    #[serde(default)]
    #[schema(value_type = HashMap<String, HashMap<String, ProductAnalytics>>)]
    pub analytics_by_fridge: HashMap<EntityId, FridgeAnalytics>,
}
