use std::collections::HashMap;

use super::*;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use shared::domain::{Role, UserProfile, View};
use storage::{Storage, TIER_KEY};
use tokio::net::TcpListener;

use crate::payment::{PaymentConfirmer, PaymentForm};

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    authorization: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<std::sync::Mutex<Vec<Recorded>>>,
}

impl MockState {
    fn capture(&self, path: impl Into<String>, headers: &HeaderMap, body: Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests.lock().expect("requests").push(Recorded {
            path: path.into(),
            authorization,
            body,
        });
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("requests").clone()
    }

    fn find(&self, path: &str) -> Recorded {
        self.requests()
            .into_iter()
            .find(|recorded| recorded.path == path)
            .unwrap_or_else(|| panic!("no request recorded for {path}"))
    }
}

async fn spawn_server(app: Router) -> anyhow::Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn mock_backend(state: MockState) -> Router {
    Router::new()
        .route("/api/config/stripe-key", get(stripe_key))
        .route("/api/create-payment-intent", post(create_payment_intent))
        .route("/api/verify-payment", post(verify_payment))
        .route("/api/upgrade", post(upgrade))
        .route("/api/antigravity/run", post(run_pipeline))
        .route("/api/antigravity/history", get(history))
        .route("/v1/payment_intents/:id/confirm", post(confirm_intent))
        .with_state(state)
}

async fn stripe_key(State(state): State<MockState>, headers: HeaderMap) -> Json<Value> {
    state.capture("/api/config/stripe-key", &headers, Value::Null);
    Json(json!({ "publishableKey": "pk_test_mock" }))
}

async fn create_payment_intent(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.capture("/api/create-payment-intent", &headers, body);
    Json(json!({ "clientSecret": "pi_mock_secret_xyz" }))
}

async fn verify_payment(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let intent_id = body["paymentIntentId"].as_str().unwrap_or_default().to_string();
    state.capture("/api/verify-payment", &headers, body);
    if intent_id == "pi_mock" {
        Json(json!({
            "status": "success",
            "user": { "email": "pilot@liftops.ai", "tier": "commander" }
        }))
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Payment not completed" })),
        )
            .into_response()
    }
}

async fn upgrade(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> &'static str {
    state.capture("/api/upgrade", &headers, body);
    "upgraded"
}

async fn run_pipeline(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.capture("/api/antigravity/run", &headers, body);
    Json(json!({
        "request_id": "0f8e7d6c-5b4a",
        "router": { "intent": "summarize", "classification": "summary", "confidence": "high" },
        "planner": {
            "goal": "summarize the report",
            "steps": [{ "step_number": 1, "description": "read the report", "requires_clarification": false }],
            "blocking_questions": []
        },
        "executor": null,
        "validator": { "valid": true, "issues": [], "recommended_action": "accept" }
    }))
}

async fn history(State(state): State<MockState>, headers: HeaderMap) -> Json<Value> {
    state.capture("/api/antigravity/history", &headers, Value::Null);
    Json(json!([
        {
            "saved_at": "2024-05-01T10:00:00.123456",
            "request_id": "abcdef0123456789",
            "router": { "intent": "plan trip" },
            "validator": { "valid": true }
        },
        { "request_id": null, "validator": { "valid": false } }
    ]))
}

async fn confirm_intent(
    State(state): State<MockState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let declined = form.get("payment_method").map(String::as_str) == Some("pm_card_chargeDeclined");
    state.capture(
        format!("/v1/payment_intents/{id}/confirm"),
        &headers,
        json!(form),
    );
    if declined {
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({ "error": { "message": "Your card was declined." } })),
        )
            .into_response();
    }
    Json(json!({ "id": id, "status": "succeeded" })).into_response()
}

#[tokio::test]
async fn pipeline_run_sends_trimmed_input_with_bearer_token() -> anyhow::Result<()> {
    let state = MockState::default();
    let base = spawn_server(mock_backend(state.clone())).await?;
    let api = HttpDashboardApi::new(&format!("{base}/"), Some("jwt-mock-1".into()))?;

    let result = api.run_pipeline("summarize the report").await?;

    assert_eq!(result.request_id.as_deref(), Some("0f8e7d6c-5b4a"));
    assert_eq!(result.render_stage(shared::domain::PipelineStage::Executor), "null");
    let planner = result.planner_output().expect("planner");
    assert_eq!(planner.steps.len(), 1);
    assert_eq!(result.validator_output().expect("validator").recommended_action, "accept");

    let recorded = state.find("/api/antigravity/run");
    assert_eq!(recorded.authorization.as_deref(), Some("Bearer jwt-mock-1"));
    assert_eq!(recorded.body, json!({ "input": "summarize the report" }));
    Ok(())
}

#[tokio::test]
async fn history_decodes_entries() -> anyhow::Result<()> {
    let state = MockState::default();
    let base = spawn_server(mock_backend(state.clone())).await?;
    let api = HttpDashboardApi::new(&base, None)?;

    let entries = api.history().await?;

    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_valid());
    assert_eq!(entries[0].intent(), Some("plan trip"));
    assert!(!entries[1].is_valid());
    assert_eq!(entries[1].request_id, None);
    assert_eq!(state.find("/api/antigravity/history").authorization, None);
    Ok(())
}

#[tokio::test]
async fn payment_endpoints_use_camel_case_bodies() -> anyhow::Result<()> {
    let state = MockState::default();
    let base = spawn_server(mock_backend(state.clone())).await?;
    let api = HttpDashboardApi::new(&base, Some("jwt-mock-1".into()))?;

    assert_eq!(api.stripe_publishable_key().await?, "pk_test_mock");
    assert_eq!(
        api.create_payment_intent("pilot@liftops.ai").await?,
        "pi_mock_secret_xyz"
    );
    let verified = api.verify_payment("pi_mock", "pilot@liftops.ai").await?;
    assert!(verified.is_success());

    assert_eq!(
        state.find("/api/create-payment-intent").body,
        json!({ "email": "pilot@liftops.ai" })
    );
    assert_eq!(
        state.find("/api/verify-payment").body,
        json!({ "paymentIntentId": "pi_mock", "email": "pilot@liftops.ai" })
    );
    Ok(())
}

#[tokio::test]
async fn error_detail_is_carried_into_status_errors() -> anyhow::Result<()> {
    let state = MockState::default();
    let base = spawn_server(mock_backend(state)).await?;
    let api = HttpDashboardApi::new(&base, None)?;

    let err = api
        .verify_payment("pi_other", "pilot@liftops.ai")
        .await
        .expect_err("verification should fail");

    assert_eq!(err.status(), Some(400));
    assert_eq!(err.detail(), Some("Payment not completed"));
    Ok(())
}

#[tokio::test]
async fn upgrade_accepts_any_success_body() -> anyhow::Result<()> {
    let state = MockState::default();
    let base = spawn_server(mock_backend(state.clone())).await?;
    let api = HttpDashboardApi::new(&base, None)?;

    api.upgrade("pilot@liftops.ai").await?;

    assert_eq!(
        state.find("/api/upgrade").body,
        json!({ "email": "pilot@liftops.ai" })
    );
    Ok(())
}

#[tokio::test]
async fn bare_failures_and_garbage_bodies_are_reported() -> anyhow::Result<()> {
    let app = Router::new()
        .route(
            "/api/antigravity/history",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route("/api/antigravity/run", post(|| async { "<html>oops</html>" }));
    let base = spawn_server(app).await?;
    let api = HttpDashboardApi::new(&base, None)?;

    let err = api.history().await.expect_err("history should fail");
    assert!(matches!(err, ClientError::Status { status: 500, detail: None }));

    let err = api.run_pipeline("x").await.expect_err("decode should fail");
    assert!(matches!(err, ClientError::Decode(_)));
    Ok(())
}

#[test]
fn rejects_unparseable_server_url() {
    assert!(matches!(
        HttpDashboardApi::new("not a url", None),
        Err(ClientError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn stripe_confirmer_posts_secret_and_method() -> anyhow::Result<()> {
    let state = MockState::default();
    let base = spawn_server(mock_backend(state.clone())).await?;
    let confirmer = StripeConfirmer::new(base.clone(), "pm_card_visa");

    let confirmed = confirmer
        .confirm("pk_test_mock", "pi_mock_secret_xyz")
        .await?;

    assert_eq!(confirmed.payment_intent_id, "pi_mock");
    assert_eq!(confirmed.status, "succeeded");
    let recorded = state.find("/v1/payment_intents/pi_mock/confirm");
    assert_eq!(recorded.authorization.as_deref(), Some("Bearer pk_test_mock"));
    assert_eq!(
        recorded.body,
        json!({ "client_secret": "pi_mock_secret_xyz", "payment_method": "pm_card_visa" })
    );
    Ok(())
}

#[tokio::test]
async fn stripe_confirmer_surfaces_decline_message() -> anyhow::Result<()> {
    let base = spawn_server(mock_backend(MockState::default())).await?;
    let confirmer = StripeConfirmer::new(base, "pm_card_chargeDeclined");

    let err = confirmer
        .confirm("pk_test_mock", "pi_mock_secret_xyz")
        .await
        .expect_err("decline expected");

    assert_eq!(err, PaymentError::Declined("Your card was declined.".into()));
    assert_eq!(err.user_message(), "Your card was declined.");
    Ok(())
}

#[tokio::test]
async fn hosted_checkout_upgrades_and_persists_tier_end_to_end() -> anyhow::Result<()> {
    let state = MockState::default();
    let base = spawn_server(mock_backend(state.clone())).await?;
    let store = Arc::new(Storage::new("sqlite::memory:").await?);
    let api: Arc<dyn DashboardApi> =
        Arc::new(HttpDashboardApi::new(&base, Some("jwt-mock-1".into()))?);
    let payment = build_payment_flow(
        &PaymentSettings {
            mode: PaymentMode::Hosted,
            stripe_api_url: base.clone(),
            stripe_payment_method: "pm_card_visa".into(),
            bank_latency: Duration::ZERO,
        },
        api.clone(),
    );
    let session = Session::new(
        "jwt-mock-1",
        UserProfile {
            email: Some("pilot@liftops.ai".into()),
            role: Some(Role::User),
            ..Default::default()
        },
        Tier::Pilot,
    );
    let dashboard = Dashboard::new(
        session,
        api,
        payment,
        store.clone(),
        DashboardTimings {
            stages: StagePolicy::new(Duration::ZERO),
            upgrade_settle_delay: Duration::from_millis(10),
        },
    );

    dashboard.start().await;
    assert_eq!(dashboard.activate(View::Settings).await, ViewOutcome::Paywalled);
    let outcome = dashboard.submit_payment(&PaymentForm::default()).await;

    assert!(matches!(outcome, SubmitOutcome::Upgraded(_)));
    assert_eq!(dashboard.tier().await, Tier::Commander);
    assert_eq!(
        store.get_value(TIER_KEY).await?.as_deref(),
        Some("commander")
    );
    assert!(dashboard.snapshot().await.is_visible(View::Settings));

    let paths: Vec<String> = state.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec![
            "/api/config/stripe-key".to_string(),
            "/api/create-payment-intent".to_string(),
            "/v1/payment_intents/pi_mock/confirm".to_string(),
            "/api/verify-payment".to_string(),
        ]
    );
    Ok(())
}
