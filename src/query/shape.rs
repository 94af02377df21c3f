//! Public response shapes of a deadline and the category lookup table.

use chrono::Datelike;
use serde::Serialize;

use crate::models::{Deadline, Jurisdiction};

/// Coarse grouping of deadline types used by the monthly listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tax,
    Payroll,
    Compliance,
    Super,
    Other,
}

const TAX_TYPES: &[&str] = &[
    "BAS_QUARTERLY",
    "BAS_MONTHLY",
    "GST",
    "GST_ANNUAL",
    "INCOME_TAX",
    "INCOME_TAX_INDIVIDUAL",
    "INCOME_TAX_COMPANY",
    "COMPANY_TAX",
    "FBT",
    "PAYG_INSTALMENTS",
    "PAYG_INSTALMENTS_QUARTERLY",
    "PAYG_INSTALMENTS_MONTHLY",
    "TPAR",
    "GST_MONTHLY",
    "GST_2MONTHLY",
    "GST_TWO_MONTHLY",
    "GST_6MONTHLY",
    "GST_SIX_MONTHLY",
    "IR3",
    "INCOME_TAX_RETURN",
    "COMPANY_TAX_RETURN",
    "FBT_QUARTERLY",
    "FBT_ANNUAL",
];

const PAYROLL_TYPES: &[&str] = &[
    "PAYG_WITHHOLDING",
    "PAYG_WITHHOLDING_MONTHLY",
    "PAYG_WITHHOLDING_QUARTERLY",
    "STP_FINALISATION",
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
    "PAYE",
    "PAYE_LARGE",
    "EMPLOYER_DEDUCTIONS",
];

const COMPLIANCE_TYPES: &[&str] = &[
    "ASIC_ANNUAL_REVIEW",
    "ANNUAL_COMPANY_REVIEW",
    "WORKERS_COMP_NSW",
    "WORKERS_COMP_VIC",
    "WORKERS_COMP_QLD",
    "WORKERS_COMP_SA",
    "WORKERS_COMP_WA",
    "WORKERS_COMP_TAS",
    "WORKERS_COMP_NT",
    "WORKERS_COMP_ACT",
];

const SUPER_TYPES: &[&str] = &["SUPER_GUARANTEE", "KIWISAVER"];

const OTHER_TYPES: &[&str] = &[
    "LAND_TAX_NSW",
    "LAND_TAX_VIC",
    "LAND_TAX_QLD",
    "LAND_TAX_SA",
    "LAND_TAX_WA",
    "LAND_TAX_TAS",
    "LAND_TAX_ACT",
    "PROVISIONAL_TAX",
    "PROVISIONAL_TAX_RATIO",
    "PROVISIONAL_TAX_AIM",
    "RWT",
];

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Tax,
        Category::Payroll,
        Category::Compliance,
        Category::Super,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tax => "tax",
            Category::Payroll => "payroll",
            Category::Compliance => "compliance",
            Category::Super => "super",
            Category::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }

    /// Deadline types belonging to this category.
    pub fn types(&self) -> &'static [&'static str] {
        match self {
            Category::Tax => TAX_TYPES,
            Category::Payroll => PAYROLL_TYPES,
            Category::Compliance => COMPLIANCE_TYPES,
            Category::Super => SUPER_TYPES,
            Category::Other => OTHER_TYPES,
        }
    }
}

/// Response shape selected by the endpoint variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `/v1/{jurisdiction}/{agency}/deadlines`
    Standard,
    /// `/v1/deadlines`
    Calendarific,
    /// `/v1/deadlines/{country}/{year}/{month}`
    UltraSimple,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardDeadline {
    pub id: String,
    #[serde(rename = "type")]
    pub deadline_type: String,
    pub name: String,
    pub description: String,
    pub jurisdiction: Jurisdiction,
    pub agency: String,
    pub due_date: String,
    pub period: String,
    pub applicable_to: Vec<String>,
    pub source_url: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDate {
    pub iso: String,
    pub datetime: DateParts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarificMeta {
    pub id: String,
    pub agency: String,
    pub period: String,
    pub applicable_to: Vec<String>,
    pub source_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarificDeadline {
    pub name: String,
    pub description: String,
    pub country: Jurisdiction,
    pub date: CalendarDate,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub meta: CalendarificMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleDeadline {
    pub id: String,
    pub name: String,
    pub date: String,
    #[serde(rename = "type")]
    pub deadline_type: String,
    pub agency: String,
}

/// A deadline rendered in one of the public shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ShapedDeadline {
    Standard(StandardDeadline),
    Calendarific(CalendarificDeadline),
    UltraSimple(SimpleDeadline),
}

impl ResponseShape {
    pub fn render(&self, deadline: &Deadline) -> ShapedDeadline {
        let due = deadline.due_date_string();
        match self {
            ResponseShape::Standard => ShapedDeadline::Standard(StandardDeadline {
                id: deadline.id.clone(),
                deadline_type: deadline.deadline_type.clone(),
                name: deadline.name.clone(),
                description: deadline.description.clone(),
                jurisdiction: deadline.jurisdiction,
                agency: deadline.agency.clone(),
                due_date: due,
                period: deadline.period.clone(),
                applicable_to: deadline.applicable_to.clone(),
                source_url: deadline.source_url.clone(),
                last_updated: deadline.last_updated.to_rfc3339(),
            }),
            ResponseShape::Calendarific => ShapedDeadline::Calendarific(CalendarificDeadline {
                name: deadline.name.clone(),
                description: deadline.description.clone(),
                country: deadline.jurisdiction,
                date: CalendarDate {
                    iso: due,
                    datetime: DateParts {
                        year: deadline.due_date.year(),
                        month: deadline.due_date.month(),
                        day: deadline.due_date.day(),
                    },
                },
                types: vec![deadline.deadline_type.clone()],
                meta: CalendarificMeta {
                    id: deadline.id.clone(),
                    agency: deadline.agency.clone(),
                    period: deadline.period.clone(),
                    applicable_to: deadline.applicable_to.clone(),
                    source_url: deadline.source_url.clone(),
                },
            }),
            ResponseShape::UltraSimple => ShapedDeadline::UltraSimple(SimpleDeadline {
                id: deadline.id.clone(),
                name: deadline.name.clone(),
                date: due,
                deadline_type: deadline.deadline_type.clone(),
                agency: deadline.agency.clone(),
            }),
        }
    }

    pub fn render_all(&self, deadlines: &[Deadline]) -> Vec<ShapedDeadline> {
        deadlines.iter().map(|d| self.render(d)).collect()
    }
}
