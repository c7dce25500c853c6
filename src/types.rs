//! Product keys and the standard order index.
//!
//! Product names arrive from several backend structures with inconsistent
//! casing and stray whitespace. Everything that joins two of those
//! structures goes through [`normalize`] first.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::model::ValidationError;

/// Position reported for products that are not part of the standard order.
///
/// Larger than any real index so unranked products sort last.
pub const UNRANKED_POSITION: usize = 9999;

/// Canonicalizes a product name for comparisons (trim + lowercase).
///
/// # Examples
/// ```
/// use fridge_inventory::types::normalize;
///
/// assert_eq!(normalize("  Leche Entera "), "leche entera");
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Builds a normalized name → position map for the given ordering.
///
/// The first occurrence wins if the list contains case variants of the same
/// name.
pub fn build_order_index<S: AsRef<str>>(order: &[S]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(order.len());
    for (position, name) in order.iter().enumerate() {
        index.entry(normalize(name.as_ref())).or_insert(position);
    }
    index
}

/// One-shot lookup of a product in an ordering.
///
/// Rebuilds the index on every call; fine for a handful of products. Use
/// [`StandardOrder::position`] for repeated lookups.
pub fn order_index<S: AsRef<str>>(name: &str, order: &[S]) -> usize {
    build_order_index(order)
        .get(&normalize(name))
        .copied()
        .unwrap_or(UNRANKED_POSITION)
}

/// The admin-curated product ordering.
///
/// Names are unique under case-insensitive comparison. The lookup index is
/// built lazily and dropped on every mutation.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct StandardOrder {
    names: Vec<String>,
    #[serde(skip)]
    index: OnceLock<HashMap<String, usize>>,
}

impl StandardOrder {
    /// Creates an ordering, rejecting case-insensitive duplicates.
    pub fn new(names: Vec<String>) -> Result<Self, ValidationError> {
        let mut seen = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            let key = normalize(name);
            if key.is_empty() {
                return Err(ValidationError::EmptyProductName(position));
            }
            if let Some(first) = seen.insert(key, position) {
                return Err(ValidationError::DuplicateProduct {
                    name: name.clone(),
                    first,
                    second: position,
                });
            }
        }
        Ok(Self {
            names,
            index: OnceLock::new(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn index(&self) -> &HashMap<String, usize> {
        self.index.get_or_init(|| build_order_index(&self.names))
    }

    /// Position of the product in the ordering, or [`UNRANKED_POSITION`].
    pub fn position(&self, name: &str) -> usize {
        self.index()
            .get(&normalize(name))
            .copied()
            .unwrap_or(UNRANKED_POSITION)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index().contains_key(&normalize(name))
    }

    fn invalidate(&mut self) {
        self.index = OnceLock::new();
    }

    /// Appends a product at the end of the ordering.
    pub fn push(&mut self, name: impl Into<String>) -> Result<(), ValidationError> {
        let position = self.names.len();
        self.insert(position, name)
    }

    /// Inserts a product at `position`, shifting later products down.
    pub fn insert(&mut self, position: usize, name: impl Into<String>) -> Result<(), ValidationError> {
        let name = name.into();
        if normalize(&name).is_empty() {
            return Err(ValidationError::EmptyProductName(position));
        }
        if position > self.names.len() {
            return Err(ValidationError::IndexOutOfRange {
                index: position,
                len: self.names.len(),
            });
        }
        if self.contains(&name) {
            return Err(ValidationError::DuplicateProduct {
                first: self.position(&name),
                second: position,
                name,
            });
        }
        self.names.insert(position, name);
        self.invalidate();
        Ok(())
    }

    /// Removes the product at `position` and returns it.
    pub fn remove(&mut self, position: usize) -> Result<String, ValidationError> {
        if position >= self.names.len() {
            return Err(ValidationError::IndexOutOfRange {
                index: position,
                len: self.names.len(),
            });
        }
        let removed = self.names.remove(position);
        self.invalidate();
        Ok(removed)
    }

    /// Drag-and-drop move: takes the product at `from` and drops it at `to`.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), ValidationError> {
        let len = self.names.len();
        if from >= len || to >= len {
            return Err(ValidationError::IndexOutOfRange {
                index: from.max(to),
                len,
            });
        }
        if from == to {
            return Ok(());
        }
        let name = self.names.remove(from);
        self.names.insert(to, name);
        self.invalidate();
        Ok(())
    }

    /// Replaces the whole list, keeping the current one if the new list is invalid.
    pub fn replace(&mut self, names: Vec<String>) -> Result<(), ValidationError> {
        *self = Self::new(names)?;
        Ok(())
    }
}

impl Clone for StandardOrder {
    fn clone(&self) -> Self {
        Self {
            names: self.names.clone(),
            index: OnceLock::new(),
        }
    }
}

impl PartialEq for StandardOrder {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl TryFrom<Vec<String>> for StandardOrder {
    type Error = ValidationError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<StandardOrder> for Vec<String> {
    fn from(order: StandardOrder) -> Self {
        order.names
    }
}
