use serde::{Deserialize, Serialize};

/// Number of related devices a device may have, e.g. the number of parents
/// of a partition.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidCardinality {
    min_count: Option<usize>,
    max_count: Option<usize>,
}

impl ValidCardinality {
    pub const fn new_zero() -> Self {
        Self::new_exact(0)
    }

    pub const fn new_exact(v: usize) -> Self {
        Self {
            min_count: Some(v),
            max_count: Some(v),
        }
    }

    pub const fn new_at_least(v: usize) -> Self {
        Self {
            min_count: Some(v),
            max_count: None,
        }
    }

    pub const fn new_at_most(v: usize) -> Self {
        Self {
            min_count: None,
            max_count: Some(v),
        }
    }

    pub const fn new_any() -> Self {
        Self {
            min_count: None,
            max_count: None,
        }
    }

    pub fn min(&self) -> Option<usize> {
        self.min_count
    }

    pub fn max(&self) -> Option<usize> {
        self.max_count
    }

    pub fn contains(&self, v: usize) -> bool {
        match (self.min_count, self.max_count) {
            (Some(start), Some(end)) => start <= v && v <= end,
            (Some(start), None) => start <= v,
            (None, Some(end)) => v <= end,
            (None, None) => true,
        }
    }

    /// Returns pluralized form of the given word if the cardinality is applicable.
    pub fn pluralize<'a>(&self, singular: &'a str, plural: &'a str) -> &'a str {
        match (self.min_count, self.max_count) {
            (Some(1), Some(1)) | (Some(1), None) | (None, Some(1)) => singular,
            _ => plural,
        }
    }
}

impl std::fmt::Display for ValidCardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min_count, self.max_count) {
            (Some(start), Some(end)) if start == end => write!(f, "exactly {start}"),
            (Some(start), Some(end)) => write!(f, "between {start} and {end}"),
            (Some(start), None) => write!(f, "at least {start}"),
            (None, Some(end)) => write!(f, "at most {end}"),
            (None, None) => write!(f, "any or none"),
        }
    }
}
