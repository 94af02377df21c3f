//! Deadline lookup: request validation, key construction, pagination cursors
//! and response shaping.
//!
//! Every listing endpoint runs the same pipeline: validate the raw parameters,
//! turn them into a [`KeyCondition`] plus a [`Predicate`], run that against
//! the store, and render the rows with a [`ResponseShape`].

pub mod cursor;
pub mod keys;
pub mod shape;
pub mod validate;

pub use cursor::ContinuationKey;
pub use keys::{DateRange, Index, ItemKeys, KeyCondition, SortBound};
pub use shape::{Category, ResponseShape, ShapedDeadline};
pub use validate::{
    GlobalParams, GlobalQuery, ListingParams, ListingQuery, MonthlyParams, MonthlyQuery,
};

use crate::models::{Deadline, Jurisdiction};

/// Type restriction applied after the key condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    Any,
    Exact(String),
    Category(Category),
}

impl TypeFilter {
    /// The set of accepted types, or `None` when every type is accepted.
    pub fn accepted_types(&self) -> Option<Vec<&str>> {
        match self {
            TypeFilter::Any => None,
            TypeFilter::Exact(t) => Some(vec![t.as_str()]),
            TypeFilter::Category(c) => Some(c.types().to_vec()),
        }
    }
}

/// Non-key restriction applied to the rows selected by a key condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub jurisdiction: Option<Jurisdiction>,
    pub types: TypeFilter,
}

impl Predicate {
    pub fn of_type(deadline_type: Option<&str>) -> Self {
        Self {
            jurisdiction: None,
            types: deadline_type
                .map(|t| TypeFilter::Exact(t.to_string()))
                .unwrap_or(TypeFilter::Any),
        }
    }
}

/// One page of results from a key-condition query.
#[derive(Debug, Clone)]
pub struct DeadlinePage {
    pub items: Vec<Deadline>,
    /// Present when more rows follow the last returned item
    pub next: Option<ContinuationKey>,
}
