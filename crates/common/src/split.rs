use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive `[lower, upper]` bounds over the integer key domain.
///
/// Only constructible with `lower <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyBounds {
    lower: i64,
    upper: i64,
}

impl KeyBounds {
    pub fn new(lower: i64, upper: i64) -> Option<Self> {
        (lower <= upper).then_some(Self { lower, upper })
    }

    pub fn single(key: i64) -> Self {
        Self { lower: key, upper: key }
    }

    pub fn lower(&self) -> i64 {
        self.lower
    }

    pub fn upper(&self) -> i64 {
        self.upper
    }

    /// Widens the bounds so that they include `key`.
    pub fn include(self, key: i64) -> Self {
        Self { lower: self.lower.min(key), upper: self.upper.max(key) }
    }

    pub fn contains(&self, key: i64) -> bool {
        self.lower <= key && key <= self.upper
    }

    /// Number of distinct keys covered. Never zero.
    pub fn width(&self) -> u128 {
        (i128::from(self.upper) - i128::from(self.lower) + 1) as u128
    }
}

/// A contiguous slice of a table's key domain.
///
/// A range without bounds is empty: it still counts as a split but matches no row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    key_column: String,
    bounds: Option<KeyBounds>,
}

impl KeyRange {
    pub fn new(key_column: impl Into<String>, lower: i64, upper: i64) -> Result<Self> {
        let bounds = KeyBounds::new(lower, upper).ok_or_else(|| {
            Error::protocol(format!("key range lower bound {lower} exceeds upper bound {upper}"))
        })?;
        Ok(Self { key_column: key_column.into(), bounds: Some(bounds) })
    }

    pub fn from_bounds(key_column: impl Into<String>, bounds: KeyBounds) -> Self {
        Self { key_column: key_column.into(), bounds: Some(bounds) }
    }

    pub fn empty(key_column: impl Into<String>) -> Self {
        Self { key_column: key_column.into(), bounds: None }
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn bounds(&self) -> Option<KeyBounds> {
        self.bounds
    }

    pub fn lower_bound(&self) -> Option<i64> {
        self.bounds.map(|b| b.lower())
    }

    pub fn upper_bound(&self) -> Option<i64> {
        self.bounds.map(|b| b.upper())
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn contains(&self, key: i64) -> bool {
        self.bounds.is_some_and(|b| b.contains(key))
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds {
            Some(b) => write!(f, "{} in [{}, {}]", self.key_column, b.lower(), b.upper()),
            None => write!(f, "{} in []", self.key_column),
        }
    }
}

/// A [`KeyRange`] tagged with a stable identifier, the unit of assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Split {
    pub split_id: String,
    pub range: KeyRange,
}

impl Split {
    pub fn new(split_id: impl Into<String>, range: KeyRange) -> Self {
        Self { split_id: split_id.into(), range }
    }
}
