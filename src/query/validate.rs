//! Query parameter validation for the three listing endpoints.
//!
//! Parameters arrive as optional strings so malformed values surface as
//! field-level validation errors instead of extractor rejections. All field
//! problems are collected before reporting; type vocabulary checks run last.

use chrono::NaiveDate;
use serde::Deserialize;

use super::keys::DateRange;
use super::shape::Category;
use super::TypeFilter;
use crate::errors::{AppError, FieldError};
use crate::models::Jurisdiction;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 100;

/// Raw query of `GET /v1/{jurisdiction}/{agency}/deadlines`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingParams {
    #[serde(rename = "type")]
    pub deadline_type: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "nextToken")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub jurisdiction: Jurisdiction,
    pub agency: &'static str,
    pub deadline_type: Option<String>,
    pub range: DateRange,
    pub limit: usize,
    pub next_token: Option<String>,
}

/// Raw query of `GET /v1/deadlines`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalParams {
    pub country: Option<String>,
    pub countries: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    #[serde(rename = "type")]
    pub deadline_type: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalQuery {
    pub countries: Vec<Jurisdiction>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub deadline_type: Option<String>,
    pub limit: usize,
    pub offset: usize,
    /// The key was passed as a query parameter
    pub key_in_query: bool,
}

impl GlobalQuery {
    pub fn range(&self) -> DateRange {
        match (self.year, self.month) {
            (Some(year), Some(month)) => DateRange::month(year, month).unwrap_or_default(),
            (Some(year), None) => DateRange::year(year).unwrap_or_default(),
            _ => DateRange::default(),
        }
    }
}

/// Raw query of `GET /v1/deadlines/{country}/{year}/{month}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonthlyParams {
    #[serde(rename = "type")]
    pub deadline_type: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyQuery {
    pub jurisdiction: Jurisdiction,
    pub year: i32,
    pub month: u32,
    pub types: TypeFilter,
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_limit(raw: Option<&str>, errors: &mut Vec<FieldError>) -> usize {
    match raw {
        None => DEFAULT_LIMIT,
        Some(s) => match s.parse::<usize>() {
            Ok(n) if (1..=MAX_LIMIT).contains(&n) => n,
            _ => {
                errors.push(FieldError::new(
                    "limit",
                    format!("must be an integer between 1 and {}", MAX_LIMIT),
                ));
                DEFAULT_LIMIT
            }
        },
    }
}

fn parse_date_field(
    field: &str,
    raw: Option<&str>,
    errors: &mut Vec<FieldError>,
) -> Option<NaiveDate> {
    let raw = raw?;
    let date = parse_iso_date(raw);
    if date.is_none() {
        errors.push(FieldError::new(field, "must be a valid date in YYYY-MM-DD format"));
    }
    date
}

fn parse_year(raw: &str) -> Option<i32> {
    if raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse().ok()
    } else {
        None
    }
}

fn parse_month(raw: &str) -> Option<u32> {
    if raw.is_empty() || raw.len() > 2 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().filter(|m| (1..=12).contains(m))
}

fn finish(errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn invalid_type(jurisdictions: &[Jurisdiction]) -> AppError {
    let label = jurisdictions
        .iter()
        .map(|j| j.as_str())
        .collect::<Vec<_>>()
        .join("/");
    let valid = jurisdictions
        .iter()
        .flat_map(|j| j.valid_types().iter().copied())
        .collect();
    AppError::InvalidType {
        jurisdiction: label,
        valid,
    }
}

/// Validate the standard listing for one jurisdiction and agency route.
///
/// Unknown `{jurisdiction}/{agency}` combinations are not routes and yield 404.
pub fn validate_listing(
    jurisdiction: &str,
    agency: &str,
    params: &ListingParams,
) -> Result<ListingQuery, AppError> {
    let not_found = || AppError::NotFound(format!("No deadlines route for /{}/{}", jurisdiction, agency));
    let jurisdiction = Jurisdiction::parse(jurisdiction).ok_or_else(not_found)?;
    let agency = jurisdiction.agency_label(agency).ok_or_else(not_found)?;

    let mut errors = Vec::new();
    let from = parse_date_field("from_date", params.from_date.as_deref(), &mut errors);
    let to = parse_date_field("to_date", params.to_date.as_deref(), &mut errors);
    let limit = parse_limit(params.limit.as_deref(), &mut errors);
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            errors.push(FieldError::new("from_date", "must not be after to_date"));
        }
    }
    if matches!(params.next_token.as_deref(), Some("")) {
        errors.push(FieldError::new("nextToken", "must not be empty"));
    }
    finish(errors)?;

    let deadline_type = params.deadline_type.clone().filter(|t| !t.is_empty());
    if let Some(t) = &deadline_type {
        if !jurisdiction.is_valid_type(t) {
            return Err(invalid_type(&[jurisdiction]));
        }
    }

    Ok(ListingQuery {
        jurisdiction,
        agency,
        deadline_type,
        range: DateRange::new(from, to),
        limit,
        next_token: params.next_token.clone(),
    })
}

/// Validate the global, multi-country listing.
pub fn validate_global(params: &GlobalParams) -> Result<GlobalQuery, AppError> {
    let mut errors = Vec::new();

    let (field, requested): (&str, Vec<&str>) = match (&params.countries, &params.country) {
        (Some(list), _) => ("countries", list.split(',').map(str::trim).filter(|c| !c.is_empty()).collect()),
        (None, Some(one)) => ("country", vec![one.trim()]),
        (None, None) => ("country", vec![]),
    };
    let mut countries = Vec::new();
    for code in &requested {
        match Jurisdiction::from_alias(code) {
            Some(j) if !countries.contains(&j) => countries.push(j),
            Some(_) => {}
            None => errors.push(FieldError::new(
                field,
                format!("unsupported country {}; supported countries are AU, NZ", code),
            )),
        }
    }
    if requested.is_empty() {
        countries = Jurisdiction::ALL.to_vec();
    }

    let year = params.year.as_deref().and_then(|raw| {
        let year = parse_year(raw);
        if year.is_none() {
            errors.push(FieldError::new("year", "must be a 4-digit year"));
        }
        year
    });
    let month = params.month.as_deref().and_then(|raw| {
        let month = parse_month(raw);
        if month.is_none() {
            errors.push(FieldError::new("month", "must be between 1 and 12"));
        }
        month
    });
    if params.month.is_some() && params.year.is_none() {
        errors.push(FieldError::new("month", "requires year"));
    }

    let limit = parse_limit(params.limit.as_deref(), &mut errors);
    let offset = match params.offset.as_deref() {
        None => 0,
        Some(raw) => raw.parse::<usize>().unwrap_or_else(|_| {
            errors.push(FieldError::new("offset", "must be a non-negative integer"));
            0
        }),
    };
    finish(errors)?;

    let deadline_type = params
        .deadline_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_uppercase);
    if let Some(t) = &deadline_type {
        if !countries.iter().any(|j| j.is_valid_type(t)) {
            return Err(invalid_type(&countries));
        }
    }

    Ok(GlobalQuery {
        countries,
        year,
        month,
        deadline_type,
        limit,
        offset,
        key_in_query: params.api_key.is_some(),
    })
}

/// Validate the path-based monthly listing.
pub fn validate_monthly(
    country: &str,
    year: &str,
    month: &str,
    params: &MonthlyParams,
) -> Result<MonthlyQuery, AppError> {
    let mut errors = Vec::new();
    let jurisdiction = Jurisdiction::from_alias(country);
    if jurisdiction.is_none() {
        errors.push(FieldError::new("country", "must be one of AU, NZ"));
    }
    let parsed_year = parse_year(year);
    if parsed_year.is_none() {
        errors.push(FieldError::new("year", "must be a 4-digit year"));
    }
    let parsed_month = parse_month(month);
    if parsed_month.is_none() {
        errors.push(FieldError::new("month", "must be between 1 and 12"));
    }
    let category = params.category.as_deref().filter(|c| !c.is_empty());
    let parsed_category = category.and_then(Category::parse);
    if category.is_some() && parsed_category.is_none() {
        let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        errors.push(FieldError::new(
            "category",
            format!("must be one of {}", names.join(", ")),
        ));
    }

    let (Some(jurisdiction), Some(year), Some(month)) = (jurisdiction, parsed_year, parsed_month)
    else {
        return Err(AppError::Validation(errors));
    };
    finish(errors)?;

    let deadline_type = params
        .deadline_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_uppercase);
    let types = match (deadline_type, parsed_category) {
        (Some(t), _) => {
            if !jurisdiction.is_valid_type(&t) {
                return Err(invalid_type(&[jurisdiction]));
            }
            TypeFilter::Exact(t)
        }
        (None, Some(c)) => TypeFilter::Category(c),
        (None, None) => TypeFilter::Any,
    };

    Ok(MonthlyQuery {
        jurisdiction,
        year,
        month,
        types,
    })
}
