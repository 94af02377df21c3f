//! Deadline model and the closed type vocabularies of each jurisdiction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Deadline types issued in Australia.
pub const AU_TYPES: &[&str] = &[
    "BAS_QUARTERLY",
    "BAS_MONTHLY",
    "PAYG_WITHHOLDING",
    "PAYG_INSTALMENTS",
    "SUPER_GUARANTEE",
    "INCOME_TAX",
    "COMPANY_TAX",
    "FBT",
    "GST",
    "STP_FINALISATION",
    "TPAR",
    "ASIC_ANNUAL_REVIEW",
    "PAYROLL_TAX_NSW",
    "PAYROLL_TAX_VIC",
    "PAYROLL_TAX_QLD",
    "PAYROLL_TAX_SA",
    "PAYROLL_TAX_WA",
    "PAYROLL_TAX_TAS",
    "PAYROLL_TAX_NT",
    "PAYROLL_TAX_ACT",
    "PAYROLL_TAX_NSW_ANNUAL",
    "PAYROLL_TAX_VIC_ANNUAL",
    "PAYROLL_TAX_QLD_ANNUAL",
    "PAYROLL_TAX_SA_ANNUAL",
    "PAYROLL_TAX_WA_ANNUAL",
    "PAYROLL_TAX_TAS_ANNUAL",
    "PAYROLL_TAX_NT_ANNUAL",
    "PAYROLL_TAX_ACT_ANNUAL",
    "LAND_TAX_NSW",
    "LAND_TAX_VIC",
    "LAND_TAX_QLD",
    "LAND_TAX_SA",
    "LAND_TAX_WA",
    "LAND_TAX_TAS",
    "LAND_TAX_ACT",
    "WORKERS_COMP_NSW",
    "WORKERS_COMP_VIC",
    "WORKERS_COMP_QLD",
    "WORKERS_COMP_SA",
    "WORKERS_COMP_WA",
    "WORKERS_COMP_TAS",
    "WORKERS_COMP_NT",
    "WORKERS_COMP_ACT",
];

/// Deadline types issued in New Zealand.
pub const NZ_TYPES: &[&str] = &[
    "GST_MONTHLY",
    "GST_2MONTHLY",
    "GST_6MONTHLY",
    "PAYE",
    "PAYE_LARGE",
    "PROVISIONAL_TAX",
    "PROVISIONAL_TAX_RATIO",
    "PROVISIONAL_TAX_AIM",
    "IR3",
    "FBT_QUARTERLY",
    "FBT_ANNUAL",
    "KIWISAVER",
];

/// Country-level scope of a deadline.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Jurisdiction {
    AU,
    NZ,
}

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 2] = [Jurisdiction::AU, Jurisdiction::NZ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Jurisdiction::AU => "AU",
            Jurisdiction::NZ => "NZ",
        }
    }

    /// Parse a jurisdiction code, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AU" => Some(Jurisdiction::AU),
            "NZ" => Some(Jurisdiction::NZ),
            _ => None,
        }
    }

    /// Parse a country name or code as accepted by the global listing.
    pub fn from_alias(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AU" | "AUS" | "AUSTRALIA" => Some(Jurisdiction::AU),
            "NZ" | "NZL" | "NEW ZEALAND" | "NEW_ZEALAND" => Some(Jurisdiction::NZ),
            _ => None,
        }
    }

    pub fn valid_types(&self) -> &'static [&'static str] {
        match self {
            Jurisdiction::AU => AU_TYPES,
            Jurisdiction::NZ => NZ_TYPES,
        }
    }

    pub fn is_valid_type(&self, deadline_type: &str) -> bool {
        self.valid_types().contains(&deadline_type)
    }

    /// Human-readable agency label for a path segment such as `ato`.
    ///
    /// Returns `None` when the agency is not served under this jurisdiction.
    pub fn agency_label(&self, agency: &str) -> Option<&'static str> {
        match (self, agency.to_ascii_lowercase().as_str()) {
            (Jurisdiction::AU, "ato") => Some("ATO"),
            (Jurisdiction::AU, "asic") => Some("ASIC"),
            (Jurisdiction::AU, "state-revenue") => Some("State Revenue Offices"),
            (Jurisdiction::NZ, "ird") => Some("IRD"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single government filing obligation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
    pub id: String,
    #[serde(rename = "type")]
    pub deadline_type: String,
    pub name: String,
    pub description: String,
    pub jurisdiction: Jurisdiction,
    pub agency: String,
    pub due_date: NaiveDate,
    pub period: String,
    pub applicable_to: Vec<String>,
    pub source_url: String,
    pub source_verified_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Deadline {
    /// Due date rendered as `YYYY-MM-DD`, the form used in index keys.
    pub fn due_date_string(&self) -> String {
        self.due_date.format("%Y-%m-%d").to_string()
    }
}
