//! Deadline listing endpoints.
//!
//! The three routes share one pipeline and differ only in validation rules,
//! the key conditions they build and the [`ResponseShape`] they render with.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Serialize;

use super::RequestId;
use crate::auth::api_key::QUERY_KEY_WARNING;
use crate::auth::ApiKeyContext;
use crate::errors::AppError;
use crate::models::{Deadline, Jurisdiction};
use crate::query::validate::{validate_global, validate_listing, validate_monthly};
use crate::query::{
    Category, ContinuationKey, GlobalParams, KeyCondition, ListingParams, MonthlyParams,
    Predicate, ResponseShape, ShapedDeadline, TypeFilter,
};
use crate::AppState;

const API_VERSION: &str = "v1";

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub code: u16,
    pub request_id: Option<String>,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DateRangeFilter {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilters {
    pub jurisdiction: Jurisdiction,
    pub agency: &'static str,
    #[serde(rename = "type")]
    pub deadline_type: Option<String>,
    pub date_range: DateRangeFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    pub meta: ResponseMeta,
    pub deadlines: Vec<ShapedDeadline>,
    pub count: usize,
    pub filters: ListingFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// GET /v1/{jurisdiction}/{agency}/deadlines - Filtered, paginated listing.
pub async fn list_deadlines(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKeyContext>,
    Path((jurisdiction, agency)): Path<(String, String)>,
    Query(params): Query<ListingParams>,
    RequestId(request_id): RequestId,
) -> Result<Json<ListingResponse>, AppError> {
    let query = validate_listing(&jurisdiction, &agency, &params)?;
    tracing::debug!(key_id = %key.key_id, jurisdiction = %query.jurisdiction, agency = query.agency, "deadline listing");
    let start = query
        .next_token
        .as_deref()
        .map(ContinuationKey::decode)
        .transpose()?;

    let condition = KeyCondition::for_jurisdiction(query.jurisdiction, &query.range);
    let predicate = Predicate::of_type(query.deadline_type.as_deref());
    let page = state
        .repo
        .query_deadlines(&condition, &predicate, Some(query.limit), start.as_ref())
        .await?;

    let deadlines = ResponseShape::Standard.render_all(&page.items);
    Ok(Json(ListingResponse {
        meta: ResponseMeta {
            code: 200,
            request_id,
            version: API_VERSION,
        },
        count: deadlines.len(),
        deadlines,
        filters: ListingFilters {
            jurisdiction: query.jurisdiction,
            agency: query.agency,
            deadline_type: query.deadline_type,
            date_range: DateRangeFilter {
                from: params.from_date,
                to: params.to_date,
            },
        },
        next_token: page.next.map(|key| key.encode()),
    }))
}

#[derive(Debug, Serialize)]
pub struct GlobalMeta {
    pub code: u16,
    pub request_id: Option<String>,
    /// Usage accounting happens at the gateway; never populated here
    pub credits_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct GlobalFilters {
    pub countries: Vec<Jurisdiction>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    #[serde(rename = "type")]
    pub deadline_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GlobalBody {
    pub deadlines: Vec<ShapedDeadline>,
    pub pagination: Pagination,
    pub filters: GlobalFilters,
}

#[derive(Debug, Serialize)]
pub struct GlobalResponse {
    pub meta: GlobalMeta,
    pub response: GlobalBody,
}

/// GET /v1/deadlines - Multi-country listing with offset pagination.
pub async fn list_global_deadlines(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKeyContext>,
    Query(params): Query<GlobalParams>,
    RequestId(request_id): RequestId,
) -> Result<Json<GlobalResponse>, AppError> {
    let query = validate_global(&params)?;
    tracing::debug!(key_id = %key.key_id, key_name = %key.key_name, countries = ?query.countries, "global deadline listing");
    let range = query.range();
    let predicate = Predicate::of_type(query.deadline_type.as_deref());

    let mut merged: Vec<Deadline> = Vec::new();
    for jurisdiction in &query.countries {
        let condition = KeyCondition::for_jurisdiction(*jurisdiction, &range);
        let page = state
            .repo
            .query_deadlines(&condition, &predicate, None, None)
            .await?;
        merged.extend(page.items);
    }
    // Each partition is already ordered; the stable sort interleaves them.
    merged.sort_by(|a, b| a.due_date.cmp(&b.due_date));

    let total = merged.len();
    let window: Vec<Deadline> = merged
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .collect();
    let deadlines = ResponseShape::Calendarific.render_all(&window);

    Ok(Json(GlobalResponse {
        meta: GlobalMeta {
            code: 200,
            request_id,
            credits_remaining: None,
            warning: query.key_in_query.then_some(QUERY_KEY_WARNING),
        },
        response: GlobalBody {
            pagination: Pagination {
                total,
                count: deadlines.len(),
                limit: query.limit,
                offset: query.offset,
                has_more: query.offset.saturating_add(query.limit) < total,
            },
            deadlines,
            filters: GlobalFilters {
                countries: query.countries,
                year: query.year,
                month: query.month,
                deadline_type: query.deadline_type,
            },
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct MonthlyFilters {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub deadline_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

#[derive(Debug, Serialize)]
pub struct MonthlyResponse {
    pub country: Jurisdiction,
    pub year: i32,
    pub month: u32,
    pub deadlines: Vec<ShapedDeadline>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<MonthlyFilters>,
}

/// GET /v1/deadlines/{country}/{year}/{month} - Everything due in one month.
pub async fn list_monthly_deadlines(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKeyContext>,
    Path((country, year, month)): Path<(String, String, String)>,
    Query(params): Query<MonthlyParams>,
) -> Result<Json<MonthlyResponse>, AppError> {
    let query = validate_monthly(&country, &year, &month, &params)?;
    tracing::debug!(key_id = %key.key_id, owner = %key.user_email, "monthly deadline listing");

    let condition = KeyCondition::for_month(query.year, query.month);
    let predicate = Predicate {
        jurisdiction: Some(query.jurisdiction),
        types: query.types.clone(),
    };
    let page = state
        .repo
        .query_deadlines(&condition, &predicate, None, None)
        .await?;

    let deadlines = ResponseShape::UltraSimple.render_all(&page.items);
    let filters = match query.types {
        TypeFilter::Any => None,
        TypeFilter::Exact(t) => Some(MonthlyFilters {
            deadline_type: Some(t),
            category: None,
        }),
        TypeFilter::Category(c) => Some(MonthlyFilters {
            deadline_type: None,
            category: Some(c),
        }),
    };

    Ok(Json(MonthlyResponse {
        country: query.jurisdiction,
        year: query.year,
        month: query.month,
        count: deadlines.len(),
        deadlines,
        filters,
    }))
}
