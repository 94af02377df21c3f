//! Integration tests for the CompliCal backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::billing::webhook::{sign, SIGNATURE_HEADER};
use crate::billing::{CheckoutSession, CheckoutSessionRequest, PaymentsProvider};
use crate::config::{BillingConfig, Config, LogFormat, StripePrices, UsagePlan};
use crate::db::{init_database, Repository};
use crate::errors::AppError;
use crate::models::{Deadline, Jurisdiction};
use crate::{create_router, AppState};

const WEBHOOK_SECRET: &str = "whsec_test";
const EMAIL: &str = "ops@acme.example";
const PASSWORD: &str = "correct horse battery";

/// Payments provider that records requests instead of calling out.
#[derive(Default)]
struct FakePayments {
    checkouts: Mutex<Vec<CheckoutSessionRequest>>,
}

#[async_trait]
impl PaymentsProvider for FakePayments {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, AppError> {
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request.clone());
        Ok(CheckoutSession {
            id: format!("cs_test_{}", checkouts.len()),
            url: "https://checkout.stripe.test/session".to_string(),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> Result<String, AppError> {
        Ok(format!("https://billing.stripe.test/{}", customer_id))
    }
}

fn deadline(
    jurisdiction: Jurisdiction,
    deadline_type: &str,
    due: (i32, u32, u32),
    agency: &str,
) -> Deadline {
    let due_date = NaiveDate::from_ymd_opt(due.0, due.1, due.2).unwrap();
    Deadline {
        id: format!(
            "{}-{}-{}",
            jurisdiction.as_str().to_lowercase(),
            deadline_type.to_lowercase().replace('_', "-"),
            due_date
        ),
        deadline_type: deadline_type.to_string(),
        name: format!("{} due {}", deadline_type, due_date),
        description: String::new(),
        jurisdiction,
        agency: agency.to_string(),
        due_date,
        period: due_date.format("%Y-%m").to_string(),
        applicable_to: vec!["Businesses".to_string()],
        source_url: "https://example.gov/deadlines".to_string(),
        source_verified_at: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
        last_updated: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
        notes: None,
    }
}

fn sample_deadlines() -> Vec<Deadline> {
    use Jurisdiction::{AU, NZ};
    let ato = "Australian Taxation Office";
    let ird = "Inland Revenue";
    vec![
        deadline(AU, "BAS_QUARTERLY", (2024, 4, 28), ato),
        deadline(AU, "BAS_QUARTERLY", (2024, 7, 28), ato),
        deadline(AU, "BAS_QUARTERLY", (2024, 10, 28), ato),
        deadline(AU, "BAS_QUARTERLY", (2025, 2, 28), ato),
        deadline(AU, "SUPER_GUARANTEE", (2024, 4, 28), ato),
        deadline(AU, "SUPER_GUARANTEE", (2024, 7, 28), ato),
        deadline(AU, "PAYG_WITHHOLDING", (2024, 4, 21), ato),
        deadline(AU, "FBT", (2024, 5, 21), ato),
        deadline(AU, "INCOME_TAX", (2024, 10, 31), ato),
        deadline(AU, "ASIC_ANNUAL_REVIEW", (2024, 6, 30), "ASIC"),
        deadline(NZ, "GST_MONTHLY", (2024, 5, 28), ird),
        deadline(NZ, "GST_MONTHLY", (2024, 6, 28), ird),
        deadline(NZ, "PAYE", (2024, 5, 20), ird),
        deadline(NZ, "KIWISAVER", (2024, 5, 20), ird),
        deadline(NZ, "PROVISIONAL_TAX", (2024, 5, 7), ird),
    ]
}

fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        db_path: temp_dir.path().join("test.sqlite"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Text,
        environment: "test".to_string(),
        allowed_origins: vec!["https://app.complical.com".to_string()],
        jwt_secret: "integration-test-secret".to_string(),
        jwt_ttl_minutes: 60,
        refresh_ttl_days: 30,
        usage_plan: UsagePlan {
            id: "plan-test".to_string(),
            monthly_quota: 10_000,
        },
        seed_path: None,
        key_sweep_secs: 3600,
        billing: BillingConfig {
            stripe_secret_key: None,
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            prices: StripePrices {
                developer: "price_dev".to_string(),
                professional: "price_pro".to_string(),
                enterprise: "price_ent".to_string(),
            },
            app_url: "https://app.complical.test".to_string(),
        },
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    payments: Arc<FakePayments>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&temp_dir);

        // Initialize database
        let pool = init_database(&config.db_path)
            .await
            .expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));
        repo.upsert_deadlines(&sample_deadlines())
            .await
            .expect("Failed to seed deadlines");

        let payments = Arc::new(FakePayments::default());
        let state = AppState {
            repo: repo.clone(),
            config: Arc::new(config),
            payments: payments.clone(),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            repo,
            payments,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register(&self, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/v1/auth/register"))
            .json(&json!({ "email": email, "password": PASSWORD, "companyName": "Acme Pty Ltd" }))
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Register and sign in, returning the login body.
    async fn sign_in(&self) -> Value {
        assert_eq!(self.register(EMAIL).await.status(), 200);
        let resp = self.login(EMAIL, PASSWORD).await;
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    async fn access_token(&self) -> String {
        self.sign_in().await["token"].as_str().unwrap().to_string()
    }

    async fn create_key(&self, token: &str, name: &str) -> reqwest::Response {
        self.client
            .post(self.url("/v1/auth/api-keys"))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap()
    }

    /// A fresh account with one API key.
    async fn api_key(&self) -> String {
        let token = self.access_token().await;
        let resp = self.create_key(&token, "integration").await;
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["apiKey"].as_str().unwrap().to_string()
    }

    async fn get_data(&self, key: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("x-api-key", key)
            .send()
            .await
            .unwrap()
    }

    async fn subscription(&self, token: &str) -> Value {
        self.client
            .get(self.url("/v1/billing/subscription"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn post_webhook(&self, body: &Value) -> reqwest::Response {
        let payload = serde_json::to_vec(body).unwrap();
        let ts = Utc::now().timestamp();
        let signature = sign(&payload, ts, WEBHOOK_SECRET).unwrap();
        self.client
            .post(self.url("/v1/billing/webhooks"))
            .header(SIGNATURE_HEADER, format!("t={},v1={}", ts, signature))
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .unwrap()
    }
}

fn strings(items: &Value, field: &str) -> Vec<String> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item[field].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Health, headers and routing
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "DENY");
    assert!(resp.headers().contains_key("strict-transport-security"));
    assert!(resp.headers().contains_key("x-request-id"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/v2/nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin_only() {
    let fixture = TestFixture::new().await;

    let preflight = |origin: &'static str| {
        fixture
            .client
            .request(reqwest::Method::OPTIONS, fixture.url("/v1/deadlines"))
            .header("origin", origin)
            .header("access-control-request-method", "GET")
            .header("access-control-request-headers", "x-api-key")
            .send()
    };

    let resp = preflight("https://app.complical.com").await.unwrap();
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "https://app.complical.com"
    );
    assert_eq!(resp.headers()["access-control-allow-credentials"], "true");
    assert_eq!(resp.headers()["access-control-max-age"], "3600");

    let resp = preflight("https://evil.example").await.unwrap();
    assert!(!resp.headers().contains_key("access-control-allow-origin"));
}

// ============================================================================
// API key authorization
// ============================================================================

#[tokio::test]
async fn test_data_endpoints_require_api_key() {
    let fixture = TestFixture::new().await;

    for path in [
        "/v1/au/ato/deadlines",
        "/v1/deadlines",
        "/v1/deadlines/AU/2024/4",
    ] {
        let resp = fixture.client.get(fixture.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 401, "{}", path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body["error"]["message"], "Unauthorized");
    }

    let resp = fixture
        .get_data("0000000000000000000000000000000000000000", "/v1/au/ato/deadlines")
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_api_key_usage_is_counted() {
    let fixture = TestFixture::new().await;
    let token = fixture.access_token().await;
    let created: Value = fixture
        .create_key(&token, "usage")
        .await
        .json()
        .await
        .unwrap();
    let key = created["apiKey"].as_str().unwrap();

    for _ in 0..2 {
        let resp = fixture.get_data(key, "/v1/nz/ird/deadlines").await;
        assert_eq!(resp.status(), 200);
    }

    let list: Value = fixture
        .client
        .get(fixture.url("/v1/auth/api-keys"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let keys = list["apiKeys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["usageCount"], 2);
    assert!(keys[0]["lastUsed"].is_string());
    assert!(keys[0].get("apiKey").is_none());
    assert!(keys[0].get("hashedKey").is_none());
}

#[tokio::test]
async fn test_query_parameter_key_is_deprecated_but_accepted() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let resp = fixture
        .client
        .get(fixture.url(&format!("/v1/deadlines?country=NZ&api_key={}", key)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let warning = resp.headers()["x-warning"].to_str().unwrap().to_string();
    assert!(warning.contains("deprecated"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["meta"]["warning"], warning.as_str());
}

// ============================================================================
// Standard listing
// ============================================================================

#[tokio::test]
async fn test_au_quarterly_bas_for_2024() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let resp = fixture
        .get_data(
            &key,
            "/v1/au/ato/deadlines?type=BAS_QUARTERLY&from_date=2024-01-01&to_date=2024-12-31",
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["meta"]["code"], 200);
    assert_eq!(body["meta"]["version"], "v1");
    assert!(body["meta"]["request_id"].is_string());
    assert_eq!(body["count"], 3);
    assert_eq!(
        strings(&body["deadlines"], "dueDate"),
        vec!["2024-04-28", "2024-07-28", "2024-10-28"]
    );
    for item in body["deadlines"].as_array().unwrap() {
        assert_eq!(item["type"], "BAS_QUARTERLY");
        assert_eq!(item["jurisdiction"], "AU");
    }
    assert_eq!(body["filters"]["jurisdiction"], "AU");
    assert_eq!(body["filters"]["agency"], "ATO");
    assert_eq!(body["filters"]["type"], "BAS_QUARTERLY");
    assert_eq!(body["filters"]["dateRange"]["from"], "2024-01-01");
    assert!(body.get("nextToken").is_none());
}

#[tokio::test]
async fn test_listing_stays_within_jurisdiction_and_date_range() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let body: Value = fixture
        .get_data(&key, "/v1/au/ato/deadlines?from_date=2024-04-21&to_date=2024-06-30")
        .await
        .json()
        .await
        .unwrap();
    let dates = strings(&body["deadlines"], "dueDate");
    assert_eq!(
        dates,
        vec!["2024-04-21", "2024-04-28", "2024-04-28", "2024-05-21", "2024-06-30"]
    );
    for item in body["deadlines"].as_array().unwrap() {
        assert_eq!(item["jurisdiction"], "AU");
    }
}

#[tokio::test]
async fn test_listing_pages_concatenate_to_full_result() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let full: Value = fixture
        .get_data(&key, "/v1/au/ato/deadlines?limit=100")
        .await
        .json()
        .await
        .unwrap();
    let expected = strings(&full["deadlines"], "id");
    assert_eq!(expected.len(), 10);

    let mut collected = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let path = match &token {
            Some(t) => format!("/v1/au/ato/deadlines?limit=3&nextToken={}", urlencode(t)),
            None => "/v1/au/ato/deadlines?limit=3".to_string(),
        };
        let page: Value = fixture.get_data(&key, &path).await.json().await.unwrap();
        let ids = strings(&page["deadlines"], "id");
        assert!(ids.len() <= 3);
        assert!(!ids.is_empty());
        collected.extend(ids);
        match page["nextToken"].as_str() {
            Some(next) => token = Some(next.to_string()),
            None => break,
        }
    }
    assert_eq!(collected, expected);
}

fn urlencode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

#[tokio::test]
async fn test_filtered_pages_are_never_empty() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let first: Value = fixture
        .get_data(&key, "/v1/au/ato/deadlines?type=SUPER_GUARANTEE&limit=1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(strings(&first["deadlines"], "dueDate"), vec!["2024-04-28"]);
    let next = first["nextToken"].as_str().unwrap();

    let second: Value = fixture
        .get_data(
            &key,
            &format!(
                "/v1/au/ato/deadlines?type=SUPER_GUARANTEE&limit=1&nextToken={}",
                urlencode(next)
            ),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(strings(&second["deadlines"], "dueDate"), vec!["2024-07-28"]);
    assert!(second.get("nextToken").is_none());
}

#[tokio::test]
async fn test_invalid_type_lists_valid_types() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let resp = fixture
        .get_data(&key, "/v1/nz/ird/deadlines?type=BAS_QUARTERLY")
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_TYPE");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("Invalid type for NZ. Valid types are: GST_MONTHLY"));
    assert!(message.contains("KIWISAVER"));
}

#[tokio::test]
async fn test_listing_validation_errors() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    for path in [
        "/v1/au/ato/deadlines?limit=0",
        "/v1/au/ato/deadlines?limit=101",
        "/v1/au/ato/deadlines?from_date=2024-13-01",
        "/v1/au/ato/deadlines?from_date=2024-12-31&to_date=2024-01-01",
    ] {
        let resp = fixture.get_data(&key, path).await;
        assert_eq!(resp.status(), 400, "{}", path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{}", path);
        assert!(body["error"]["details"].is_array());
    }
}

#[tokio::test]
async fn test_corrupted_or_foreign_next_token_is_rejected() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let resp = fixture
        .get_data(&key, "/v1/au/ato/deadlines?nextToken=not-a-token")
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_PAGINATION_TOKEN");
    assert_eq!(
        body["error"]["message"],
        "The provided nextToken is invalid or corrupted"
    );

    // A token minted for the AU partition does not resume an NZ listing.
    let page: Value = fixture
        .get_data(&key, "/v1/au/ato/deadlines?limit=1")
        .await
        .json()
        .await
        .unwrap();
    let token = page["nextToken"].as_str().unwrap();
    let resp = fixture
        .get_data(
            &key,
            &format!("/v1/nz/ird/deadlines?nextToken={}", urlencode(token)),
        )
        .await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unknown_agency_route_is_not_found() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    for path in ["/v1/nz/ato/deadlines", "/v1/sg/iras/deadlines"] {
        let resp = fixture.get_data(&key, path).await;
        assert_eq!(resp.status(), 404, "{}", path);
    }
    let resp = fixture.get_data(&key, "/v1/au/asic/deadlines").await;
    assert_eq!(resp.status(), 200);
}

// ============================================================================
// Global listing
// ============================================================================

#[tokio::test]
async fn test_global_listing_merges_countries_by_date() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let body: Value = fixture
        .get_data(&key, "/v1/deadlines?countries=AU,NZ&year=2024&month=5")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["meta"]["code"], 200);
    assert!(body["meta"]["credits_remaining"].is_null());
    assert!(body["meta"].get("warning").is_none());

    let deadlines = body["response"]["deadlines"].as_array().unwrap();
    let dates: Vec<&str> = deadlines
        .iter()
        .map(|d| d["date"]["iso"].as_str().unwrap())
        .collect();
    assert_eq!(
        dates,
        vec!["2024-05-07", "2024-05-20", "2024-05-20", "2024-05-21", "2024-05-28"]
    );
    assert_eq!(deadlines[3]["country"], "AU");
    assert_eq!(deadlines[3]["type"], json!(["FBT"]));
    assert_eq!(deadlines[0]["date"]["datetime"]["day"], 7);
    assert_eq!(body["response"]["filters"]["countries"], json!(["AU", "NZ"]));
    assert_eq!(body["response"]["filters"]["month"], 5);
}

#[tokio::test]
async fn test_global_listing_offset_pagination() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let body: Value = fixture
        .get_data(&key, "/v1/deadlines?country=australia&limit=4&offset=8")
        .await
        .json()
        .await
        .unwrap();
    let pagination = &body["response"]["pagination"];
    assert_eq!(pagination["total"], 10);
    assert_eq!(pagination["count"], 2);
    assert_eq!(pagination["limit"], 4);
    assert_eq!(pagination["offset"], 8);
    assert_eq!(pagination["has_more"], false);

    let body: Value = fixture
        .get_data(&key, "/v1/deadlines?limit=4")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["response"]["pagination"]["total"], 15);
    assert_eq!(body["response"]["pagination"]["has_more"], true);
}

#[tokio::test]
async fn test_global_listing_offset_past_total() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let max = u64::MAX.to_string();
    for offset in ["15", "1000", max.as_str()] {
        let resp = fixture
            .get_data(&key, &format!("/v1/deadlines?limit=50&offset={}", offset))
            .await;
        assert_eq!(resp.status(), 200, "offset={}", offset);
        let body: Value = resp.json().await.unwrap();
        let pagination = &body["response"]["pagination"];
        assert_eq!(pagination["total"], 15);
        assert_eq!(pagination["count"], 0);
        assert_eq!(pagination["has_more"], false);
        assert!(body["response"]["deadlines"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_global_listing_type_is_case_insensitive() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let body: Value = fixture
        .get_data(&key, "/v1/deadlines?type=gst_monthly")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["response"]["pagination"]["total"], 2);
    assert_eq!(body["response"]["filters"]["type"], "GST_MONTHLY");
}

#[tokio::test]
async fn test_global_listing_validation() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    for path in [
        "/v1/deadlines?country=SG",
        "/v1/deadlines?month=5",
        "/v1/deadlines?year=24",
        "/v1/deadlines?offset=-1",
    ] {
        let resp = fixture.get_data(&key, path).await;
        assert_eq!(resp.status(), 400, "{}", path);
    }

    let resp = fixture
        .get_data(&key, "/v1/deadlines?country=NZ&type=BAS_QUARTERLY")
        .await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_TYPE");
}

// ============================================================================
// Monthly listing
// ============================================================================

#[tokio::test]
async fn test_monthly_listing() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let body: Value = fixture
        .get_data(&key, "/v1/deadlines/AU/2024/4")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["country"], "AU");
    assert_eq!(body["year"], 2024);
    assert_eq!(body["month"], 4);
    assert_eq!(body["count"], 3);
    assert_eq!(
        strings(&body["deadlines"], "date"),
        vec!["2024-04-21", "2024-04-28", "2024-04-28"]
    );
    assert!(body.get("filters").is_none());

    // NZ records due the same month stay out of an AU listing.
    let body: Value = fixture
        .get_data(&key, "/v1/deadlines/nz/2024/05")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 4);
}

#[tokio::test]
async fn test_monthly_listing_filters() {
    let fixture = TestFixture::new().await;
    let key = fixture.api_key().await;

    let body: Value = fixture
        .get_data(&key, "/v1/deadlines/AU/2024/4?category=super")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(strings(&body["deadlines"], "type"), vec!["SUPER_GUARANTEE"]);
    assert_eq!(body["filters"]["category"], "super");

    // An explicit type wins over the category.
    let body: Value = fixture
        .get_data(&key, "/v1/deadlines/AU/2024/4?type=BAS_QUARTERLY&category=super")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(strings(&body["deadlines"], "type"), vec!["BAS_QUARTERLY"]);
    assert_eq!(body["filters"]["type"], "BAS_QUARTERLY");

    for path in [
        "/v1/deadlines/AU/2024/13",
        "/v1/deadlines/SG/2024/4",
        "/v1/deadlines/AU/2024/4?category=holidays",
    ] {
        let resp = fixture.get_data(&key, path).await;
        assert_eq!(resp.status(), 400, "{}", path);
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_register_and_login() {
    let fixture = TestFixture::new().await;

    let body = fixture.sign_in().await;
    assert_eq!(body["email"], EMAIL);
    assert_eq!(body["companyName"], "Acme Pty Ltd");
    assert!(body["token"].is_string());
    assert!(body["refreshToken"].is_string());

    let resp = fixture.register(EMAIL).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "USER_EXISTS");

    let resp = fixture.login(EMAIL, "wrong password").await;
    assert_eq!(resp.status(), 401);
    let wrong_password: Value = resp.json().await.unwrap();
    let resp = fixture.login("nobody@acme.example", PASSWORD).await;
    assert_eq!(resp.status(), 401);
    let unknown_email: Value = resp.json().await.unwrap();
    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn test_register_validation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/v1/auth/register"))
        .json(&json!({ "email": "not-an-email", "password": "short", "companyName": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(
        strings(&body["error"]["details"], "field"),
        vec!["email", "password", "companyName"]
    );

    let resp = fixture
        .client
        .post(fixture.url("/v1/auth/register"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_refresh_and_logout() {
    let fixture = TestFixture::new().await;
    let login = fixture.sign_in().await;
    let access = login["token"].as_str().unwrap();
    let refresh_token = login["refreshToken"].as_str().unwrap();

    let refresh = |token: String| {
        fixture
            .client
            .post(fixture.url("/v1/auth/refresh"))
            .json(&json!({ "refreshToken": token }))
            .send()
    };

    // An access token is not a refresh token.
    assert_eq!(refresh(access.to_string()).await.unwrap().status(), 401);

    let resp = refresh(refresh_token.to_string()).await.unwrap();
    assert_eq!(resp.status(), 200);
    let pair: Value = resp.json().await.unwrap();
    assert!(pair["token"].is_string());

    // Nor is a refresh token an access token.
    let resp = fixture
        .client
        .get(fixture.url("/v1/auth/api-keys"))
        .bearer_auth(refresh_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .client
        .post(fixture.url("/v1/auth/logout"))
        .bearer_auth(access)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert_eq!(refresh(refresh_token.to_string()).await.unwrap().status(), 401);
}

// ============================================================================
// API key lifecycle
// ============================================================================

#[tokio::test]
async fn test_api_key_endpoints_require_jwt() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/v1/auth/api-keys"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .client
        .post(fixture.url("/v1/auth/api-keys"))
        .bearer_auth("not.a.jwt")
        .json(&json!({ "name": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_create_api_key() {
    let fixture = TestFixture::new().await;
    let token = fixture.access_token().await;

    let resp = fixture
        .client
        .post(fixture.url("/v1/auth/api-keys"))
        .bearer_auth(&token)
        .json(&json!({ "name": "ci", "description": "build server", "expiresIn": 30 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();

    let key = body["apiKey"].as_str().unwrap();
    assert_eq!(key.len(), 40);
    assert_eq!(body["keyPrefix"], &key[..8]);
    assert_eq!(body["usagePlanId"], "plan-test");
    assert_eq!(body["description"], "build server");

    let created = chrono::DateTime::parse_from_rfc3339(body["createdAt"].as_str().unwrap()).unwrap();
    let expires = chrono::DateTime::parse_from_rfc3339(body["expiresAt"].as_str().unwrap()).unwrap();
    assert_eq!((expires - created).num_days(), 30);

    let resp = fixture
        .client
        .post(fixture.url("/v1/auth/api-keys"))
        .bearer_auth(&token)
        .json(&json!({ "name": "ci", "expiresIn": 400 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_active_key_limit_and_revocation() {
    let fixture = TestFixture::new().await;
    let token = fixture.access_token().await;

    let mut ids = Vec::new();
    let mut keys = Vec::new();
    for i in 0..5 {
        let resp = fixture.create_key(&token, &format!("key-{}", i)).await;
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        ids.push(body["id"].as_str().unwrap().to_string());
        keys.push(body["apiKey"].as_str().unwrap().to_string());
    }

    let resp = fixture.create_key(&token, "one-too-many").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "KEY_LIMIT_REACHED");

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/v1/auth/api-keys/{}", ids[0])))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // The revoked key no longer authorizes data requests.
    let resp = fixture.get_data(&keys[0], "/v1/au/ato/deadlines").await;
    assert_eq!(resp.status(), 401);
    let resp = fixture.get_data(&keys[1], "/v1/au/ato/deadlines").await;
    assert_eq!(resp.status(), 200);

    // Listing keeps revoked keys, marked as such.
    let list: Value = fixture
        .client
        .get(fixture.url("/v1/auth/api-keys"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let revoked: Vec<&Value> = list["apiKeys"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|k| k["status"] == "revoked")
        .collect();
    assert_eq!(revoked.len(), 1);
    assert_eq!(revoked[0]["id"], ids[0].as_str());
    assert!(revoked[0]["revokedAt"].is_string());

    let resp = fixture.create_key(&token, "replacement").await;
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn test_revoke_unknown_or_foreign_key() {
    let fixture = TestFixture::new().await;
    let token = fixture.access_token().await;
    let created: Value = fixture
        .create_key(&token, "mine")
        .await
        .json()
        .await
        .unwrap();

    let resp = fixture
        .client
        .delete(fixture.url("/v1/auth/api-keys/does-not-exist"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    assert_eq!(fixture.register("other@acme.example").await.status(), 200);
    let other: Value = fixture
        .login("other@acme.example", PASSWORD)
        .await
        .json()
        .await
        .unwrap();
    let resp = fixture
        .client
        .delete(fixture.url(&format!(
            "/v1/auth/api-keys/{}",
            created["id"].as_str().unwrap()
        )))
        .bearer_auth(other["token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ============================================================================
// Billing
// ============================================================================

#[tokio::test]
async fn test_plans_are_public() {
    let fixture = TestFixture::new().await;

    let body: Value = fixture
        .client
        .get(fixture.url("/v1/billing/plans"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(strings(&body["plans"], "id"), vec!["developer", "professional", "enterprise"]);
    assert_eq!(body["plans"][1]["price"], 49);
    assert_eq!(body["plans"][1]["limits"]["rateLimit"], 1000);
}

#[tokio::test]
async fn test_checkout_uses_tier_price() {
    let fixture = TestFixture::new().await;
    let token = fixture.access_token().await;

    let resp = fixture
        .client
        .post(fixture.url("/v1/billing/checkout"))
        .bearer_auth(&token)
        .json(&json!({
            "tier": "professional",
            "successUrl": "https://app.complical.test/done",
            "cancelUrl": "https://app.complical.test/pricing"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sessionId"], "cs_test_1");
    assert_eq!(body["url"], "https://checkout.stripe.test/session");

    let checkouts = fixture.payments.checkouts.lock().unwrap().clone();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].price_id, "price_pro");
    assert_eq!(checkouts[0].customer_email, EMAIL);

    for tier in ["developer", "platinum"] {
        let resp = fixture
            .client
            .post(fixture.url("/v1/billing/checkout"))
            .bearer_auth(&token)
            .json(&json!({ "tier": tier }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", tier);
    }
}

#[tokio::test]
async fn test_webhook_rejects_bad_signatures() {
    let fixture = TestFixture::new().await;
    let body = r#"{"id":"evt_1","type":"ping","data":{"object":{}}}"#;

    let resp = fixture
        .client
        .post(fixture.url("/v1/billing/webhooks"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "INVALID_SIGNATURE");

    let ts = Utc::now().timestamp();
    let resp = fixture
        .client
        .post(fixture.url("/v1/billing/webhooks"))
        .header(SIGNATURE_HEADER, format!("t={},v1=deadbeef", ts))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    for header in [
        format!("t={},v1=00", i64::MIN),
        format!("t={},v1=00", i64::MAX),
        "t=not-a-number,v1=00".to_string(),
        "t=99999999999999999999,v1=00".to_string(),
    ] {
        let resp = fixture
            .client
            .post(fixture.url("/v1/billing/webhooks"))
            .header(SIGNATURE_HEADER, header.as_str())
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", header);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["error"]["code"], "INVALID_SIGNATURE");
    }

    // A correct signature over an ancient timestamp is still stale.
    let stale = sign(body.as_bytes(), i64::MIN, WEBHOOK_SECRET).unwrap();
    let resp = fixture
        .client
        .post(fixture.url("/v1/billing/webhooks"))
        .header(SIGNATURE_HEADER, format!("t={},v1={}", i64::MIN, stale))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .post_webhook(&serde_json::from_str::<Value>(body).unwrap())
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "received": true }));
}

#[tokio::test]
async fn test_subscription_lifecycle_via_webhooks() {
    let fixture = TestFixture::new().await;
    let token = fixture.access_token().await;

    assert_eq!(fixture.subscription(&token).await["tier"], "developer");
    let resp = fixture
        .client
        .post(fixture.url("/v1/billing/portal"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = fixture
        .post_webhook(&json!({
            "id": "evt_checkout",
            "type": "checkout.session.completed",
            "data": { "object": {
                "customer": "cus_123",
                "customer_email": EMAIL,
                "subscription": "sub_123",
                "metadata": { "tier": "professional" }
            }}
        }))
        .await;
    assert_eq!(resp.status(), 200);

    let sub = fixture.subscription(&token).await;
    assert_eq!(sub["tier"], "professional");
    assert_eq!(sub["customerId"], "cus_123");
    assert_eq!(sub["subscriptionId"], "sub_123");
    let user = fixture.repo.get_user_by_email(EMAIL).await.unwrap().unwrap();
    assert_eq!(user.tier, crate::models::Tier::Professional);

    let portal: Value = fixture
        .client
        .post(fixture.url("/v1/billing/portal"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(portal["url"], "https://billing.stripe.test/cus_123");

    let resp = fixture
        .post_webhook(&json!({
            "id": "evt_upgrade",
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_123",
                "customer": "cus_123",
                "status": "active",
                "items": { "data": [ { "price": { "id": "price_ent" } } ] }
            }}
        }))
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(fixture.subscription(&token).await["tier"], "enterprise");

    let resp = fixture
        .post_webhook(&json!({
            "id": "evt_cancel",
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "id": "sub_123",
                "customer": "cus_123",
                "status": "canceled"
            }}
        }))
        .await;
    assert_eq!(resp.status(), 200);
    let sub = fixture.subscription(&token).await;
    assert_eq!(sub["tier"], "developer");
    assert_eq!(sub["status"], "canceled");
}
