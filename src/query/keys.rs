//! Key construction for the single-table deadline store.
//!
//! Items carry three key pairs computed at seed time:
//!
//! | index   | partition                  | sort                        |
//! |---------|----------------------------|-----------------------------|
//! | primary | `DEADLINE#<type>`          | `<jurisdiction>#<due>#<id>` |
//! | GSI1    | `JURISDICTION#<code>`      | `<due>#<type>`              |
//! | GSI2    | `DATE#<yyyy-mm>`           | `<due>#<type>#<id>`         |
//!
//! Queries select one partition of one index and an optional range over its
//! sort key. Type and category restrictions are never part of the key.

use chrono::{Datelike, NaiveDate};

use crate::models::{Deadline, Jurisdiction};

pub const DEADLINE_PREFIX: &str = "DEADLINE#";
pub const JURISDICTION_PREFIX: &str = "JURISDICTION#";
pub const DATE_PREFIX: &str = "DATE#";

/// Suffix appended to an inclusive upper date bound. `'Z'` sorts after `'#'`,
/// so every sort key starting with that date stays inside the range.
const UPPER_BOUND_SUFFIX: char = 'Z';

/// Secondary index a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// By jurisdiction, sorted by due date then type
    Gsi1,
    /// By calendar month, sorted by due date
    Gsi2,
}

/// Optional inclusive bounds on the due date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    /// The whole calendar month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self::new(Some(first), next.pred_opt()))
    }

    /// The whole calendar year.
    pub fn year(year: i32) -> Option<Self> {
        Some(Self::new(
            Some(NaiveDate::from_ymd_opt(year, 1, 1)?),
            Some(NaiveDate::from_ymd_opt(year, 12, 31)?),
        ))
    }
}

/// Range condition over an index sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortBound {
    Unbounded,
    /// Inclusive on both ends
    Between(String, String),
    AtLeast(String),
    AtMost(String),
}

/// Partition and sort-key range selecting rows of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    pub index: Index,
    pub partition: String,
    pub sort: SortBound,
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn upper(date: NaiveDate) -> String {
    let mut bound = format_date(date);
    bound.push(UPPER_BOUND_SUFFIX);
    bound
}

impl KeyCondition {
    /// Deadlines of one jurisdiction, optionally bounded by due date.
    pub fn for_jurisdiction(jurisdiction: Jurisdiction, range: &DateRange) -> Self {
        let sort = match (range.from, range.to) {
            (Some(from), Some(to)) => SortBound::Between(format_date(from), upper(to)),
            (Some(from), None) => SortBound::AtLeast(format_date(from)),
            (None, Some(to)) => SortBound::AtMost(upper(to)),
            (None, None) => SortBound::Unbounded,
        };
        Self {
            index: Index::Gsi1,
            partition: format!("{}{}", JURISDICTION_PREFIX, jurisdiction.as_str()),
            sort,
        }
    }

    /// Every deadline due in the given calendar month, across jurisdictions.
    pub fn for_month(year: i32, month: u32) -> Self {
        Self {
            index: Index::Gsi2,
            partition: format!("{}{:04}-{:02}", DATE_PREFIX, year, month),
            sort: SortBound::Unbounded,
        }
    }
}

/// Precomputed key attributes of a stored deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKeys {
    pub pk: String,
    pub sk: String,
    pub gsi1pk: String,
    pub gsi1sk: String,
    pub gsi2pk: String,
    pub gsi2sk: String,
}

impl ItemKeys {
    pub fn for_deadline(deadline: &Deadline) -> Self {
        let due = deadline.due_date_string();
        let jurisdiction = deadline.jurisdiction.as_str();
        Self {
            pk: format!("{}{}", DEADLINE_PREFIX, deadline.deadline_type),
            sk: format!("{}#{}#{}", jurisdiction, due, deadline.id),
            gsi1pk: format!("{}{}", JURISDICTION_PREFIX, jurisdiction),
            gsi1sk: format!("{}#{}", due, deadline.deadline_type),
            gsi2pk: format!(
                "{}{:04}-{:02}",
                DATE_PREFIX,
                deadline.due_date.year(),
                deadline.due_date.month()
            ),
            gsi2sk: format!("{}#{}#{}", due, deadline.deadline_type, deadline.id),
        }
    }
}
