//! Offline deadline import.
//!
//! A seed file is `{"deadlines": [...]}`. Every record is validated on its own;
//! valid records are stored with their index keys, invalid ones are reported
//! and skipped. Records without an id get one derived from jurisdiction, type
//! and due date, so loading a file twice updates rather than duplicates.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::db::Repository;
use crate::errors::{AppError, FieldError};
use crate::models::{Deadline, Jurisdiction};
use crate::query::validate::parse_iso_date;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub deadlines: Vec<SeedRecord>,
}

/// A deadline as written in a seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub jurisdiction: String,
    #[serde(rename = "type", default)]
    pub deadline_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agency: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub applicable_to: Vec<String>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub source_verified_at: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A record that failed validation.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub index: usize,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub total: usize,
    pub loaded: usize,
    pub rejected: Vec<Rejected>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum SeedError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Store(AppError),
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedError::Io(e) => write!(f, "cannot read seed file: {}", e),
            SeedError::Parse(e) => write!(f, "malformed seed file: {}", e),
            SeedError::Store(e) => write!(f, "cannot store deadlines: {}", e),
        }
    }
}

impl std::error::Error for SeedError {}

fn parse_datetime(
    field: &str,
    raw: Option<&str>,
    default: DateTime<Utc>,
    errors: &mut Vec<FieldError>,
) -> DateTime<Utc> {
    match raw {
        None => default,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(_) => {
                errors.push(FieldError::new(field, "must be an RFC 3339 datetime"));
                default
            }
        },
    }
}

fn derived_id(jurisdiction: Jurisdiction, deadline_type: &str, due_date: NaiveDate) -> String {
    format!(
        "{}-{}-{}",
        jurisdiction.as_str().to_ascii_lowercase(),
        deadline_type.to_ascii_lowercase().replace('_', "-"),
        due_date.format("%Y-%m-%d")
    )
}

/// Validate one record against the deadline schema.
///
/// Due dates before `now` only produce a warning.
pub fn validate_record(
    record: &SeedRecord,
    now: DateTime<Utc>,
) -> Result<(Deadline, Vec<String>), Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (field, value) in [
        ("name", &record.name),
        ("agency", &record.agency),
        ("period", &record.period),
    ] {
        if value.trim().is_empty() {
            errors.push(FieldError::new(field, "is required"));
        }
    }

    let jurisdiction = Jurisdiction::parse(&record.jurisdiction);
    if jurisdiction.is_none() {
        errors.push(FieldError::new("jurisdiction", "must be AU or NZ"));
    }
    if let Some(j) = jurisdiction {
        if !j.is_valid_type(&record.deadline_type) {
            errors.push(FieldError::new(
                "type",
                format!("{:?} is not a valid {} deadline type", record.deadline_type, j),
            ));
        }
    }

    let due_date = parse_iso_date(&record.due_date);
    match due_date {
        None => errors.push(FieldError::new("dueDate", "must be a valid date in YYYY-MM-DD format")),
        Some(date) if date < now.date_naive() => {
            warnings.push(format!("due date {} is in the past", record.due_date))
        }
        Some(_) => {}
    }

    match url::Url::parse(&record.source_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => errors.push(FieldError::new("sourceUrl", "must be an http(s) URL")),
    }

    let source_verified_at = parse_datetime(
        "sourceVerifiedAt",
        record.source_verified_at.as_deref(),
        now,
        &mut errors,
    );
    let last_updated = parse_datetime("lastUpdated", record.last_updated.as_deref(), now, &mut errors);

    let (Some(jurisdiction), Some(due_date), true) = (jurisdiction, due_date, errors.is_empty())
    else {
        return Err(errors);
    };

    let id = record
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| derived_id(jurisdiction, &record.deadline_type, due_date));

    let deadline = Deadline {
        id,
        deadline_type: record.deadline_type.clone(),
        name: record.name.trim().to_string(),
        description: record.description.clone(),
        jurisdiction,
        agency: record.agency.trim().to_string(),
        due_date,
        period: record.period.trim().to_string(),
        applicable_to: record.applicable_to.clone(),
        source_url: record.source_url.clone(),
        source_verified_at,
        last_updated,
        notes: record.notes.clone().filter(|n| !n.is_empty()),
    };
    Ok((deadline, warnings))
}

/// Validate every record and store the valid ones.
pub async fn seed_records(
    repo: &Repository,
    records: &[SeedRecord],
) -> Result<SeedReport, SeedError> {
    let now = Utc::now();
    let mut report = SeedReport {
        total: records.len(),
        ..Default::default()
    };
    let mut valid = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        match validate_record(record, now) {
            Ok((deadline, warnings)) => {
                for warning in warnings {
                    report.warnings.push(format!("{}: {}", deadline.id, warning));
                }
                if !seen.insert(deadline.id.clone()) {
                    report
                        .warnings
                        .push(format!("{}: duplicate id, later record wins", deadline.id));
                }
                valid.push(deadline);
            }
            Err(errors) => {
                tracing::warn!(index, ?errors, "seed record rejected");
                report.rejected.push(Rejected { index, errors });
            }
        }
    }

    report.loaded = repo.upsert_deadlines(&valid).await.map_err(SeedError::Store)?;
    tracing::info!(
        total = report.total,
        loaded = report.loaded,
        rejected = report.rejected.len(),
        warnings = report.warnings.len(),
        "seed complete"
    );
    Ok(report)
}

/// Load and store a seed file.
pub async fn seed_from_file(repo: &Repository, path: &Path) -> Result<SeedReport, SeedError> {
    let raw = tokio::fs::read(path).await.map_err(SeedError::Io)?;
    let file: SeedFile = serde_json::from_slice(&raw).map_err(SeedError::Parse)?;
    seed_records(repo, &file.deadlines).await
}
