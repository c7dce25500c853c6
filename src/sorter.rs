//! Ordering of breakdown rows.
//!
//! Every mode ends with a raw name comparison, so the result is a total
//! order: sorting an already sorted list under the same mode is a no-op.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Display order of the breakdown table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Lowest occupancy ratio first; products without a ratio last.
    #[default]
    Critical,
    /// Standard order position.
    Order,
    /// Alphabetical.
    Alpha,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Critical => "critical",
            SortMode::Order => "order",
            SortMode::Alpha => "alpha",
        }
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(SortMode::Critical),
            "order" => Ok(SortMode::Order),
            "alpha" => Ok(SortMode::Alpha),
            other => Err(format!(
                "unknown sort mode '{other}' (expected critical, order or alpha)"
            )),
        }
    }
}

/// Finite ratios ascending, then every non-finite ratio.
fn compare_ratio(a: f64, b: f64) -> Ordering {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

/// Returns `names` ordered according to `mode`.
///
/// `ratio_of` is only consulted in [`SortMode::Critical`], `order_of` in
/// `Critical` and `Order`. The input slice is left untouched.
pub fn sort_breakdown<S, R, O>(names: &[S], ratio_of: R, order_of: O, mode: SortMode) -> Vec<String>
where
    S: AsRef<str>,
    R: Fn(&str) -> f64,
    O: Fn(&str) -> usize,
{
    // Keys are computed once per row instead of once per comparison.
    let mut rows: Vec<(f64, usize, &str)> = names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            match mode {
                SortMode::Critical => (ratio_of(name), order_of(name), name),
                SortMode::Order => (0.0, order_of(name), name),
                SortMode::Alpha => (0.0, 0, name),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        compare_ratio(a.0, b.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(b.2))
    });

    rows.into_iter().map(|(_, _, name)| name.to_string()).collect()
}
