//! HTTP API for Ternion.

use crate::error::Error;
use crate::models::PaymentRecord;
use crate::registry::{NewMember, Registration, Registry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ternion_resolver::Beneficiary;
use ternion_tree::{Member, MemberId, MemberKey, Tier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<Registry>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health (at root and under /api/v1 for compatibility)
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Members
        .route("/api/v1/members", post(create_member))
        .route("/api/v1/members/:id", get(get_member))
        .route("/api/v1/members/:id/children", get(get_children))
        .route("/api/v1/members/:id/restart", post(restart_member))
        .route("/api/v1/members/:id/payments", get(get_member_payments))
        // Resolver queries
        .route("/api/v1/placement/:sponsor", get(get_placement))
        .route("/api/v1/sponsors/:key/active", get(get_active_sponsor))
        .route("/api/v1/beneficiary/:payer/:tier", get(get_beneficiary))
        // Payments
        .route("/api/v1/payments", post(create_payment))
        .route("/api/v1/payments/:id", get(get_payment))
        .route("/api/v1/payments/:id/confirm", post(confirm_payment))
        .route("/api/v1/payments/:id/dispute", post(dispute_payment))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Errors ---

/// A node error rendered as a JSON response.
pub struct ApiError(Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use ternion_resolver::Error as Resolve;

        let status = match &self.0 {
            Error::NotFound(_) | Error::Resolver(Resolve::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::Resolver(Resolve::InvalidTier(_)) => {
                StatusCode::BAD_REQUEST
            }
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Conflict(_) | Error::CapacityExceeded(_) => StatusCode::CONFLICT,
            Error::NoActiveSponsor(_)
            | Error::NoBeneficiary { .. }
            | Error::Resolver(Resolve::OrphanedBranch { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_key(reference: &str) -> ApiResult<MemberKey> {
    Ok(MemberKey::parse(reference)?)
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

// --- Member endpoints ---

async fn create_member(
    State(registry): State<AppState>,
    Json(req): Json<NewMember>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    let registration = registry.register(req).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn get_member(
    State(registry): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Member>> {
    Ok(Json(registry.member(&parse_key(&id)?)?))
}

async fn get_children(
    State(registry): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Member>>> {
    let member = registry.member(&parse_key(&id)?)?;
    Ok(Json(registry.children(&member.id)?))
}

async fn get_member_payments(
    State(registry): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PaymentRecord>>> {
    Ok(Json(registry.payments(&parse_key(&id)?)?))
}

#[derive(Debug, Default, Deserialize)]
struct ReceiptRequest {
    #[serde(default)]
    receipt_url: Option<String>,
}

async fn restart_member(
    State(registry): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReceiptRequest>,
) -> ApiResult<(StatusCode, Json<PaymentRecord>)> {
    let member = registry.member(&parse_key(&id)?)?;
    let payment = registry.submit_restart(&member.id, req.receipt_url).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

// --- Resolver endpoints ---

#[derive(Debug, Serialize)]
struct PlacementResponse {
    parent_id: MemberId,
    degraded: bool,
}

async fn get_placement(
    State(registry): State<AppState>,
    Path(sponsor): Path<String>,
) -> ApiResult<Json<PlacementResponse>> {
    let sponsor = registry.member(&parse_key(&sponsor)?)?;
    let placement = registry.resolver().placement(&sponsor.id).await?;
    let degraded = placement.is_degraded();
    Ok(Json(PlacementResponse {
        parent_id: placement.into_parent_id(),
        degraded,
    }))
}

#[derive(Debug, Serialize)]
struct SponsorResponse {
    sponsor_id: Option<MemberId>,
}

async fn get_active_sponsor(
    State(registry): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<SponsorResponse>> {
    let sponsor_id = registry.resolver().active_sponsor(&parse_key(&key)?).await?;
    Ok(Json(SponsorResponse { sponsor_id }))
}

#[derive(Debug, Serialize)]
struct BeneficiaryResponse {
    tier: Tier,
    beneficiary: Option<MemberId>,
    last_checked: Option<MemberId>,
}

async fn get_beneficiary(
    State(registry): State<AppState>,
    Path((payer, tier)): Path<(String, String)>,
) -> ApiResult<Json<BeneficiaryResponse>> {
    let payer = registry.member(&parse_key(&payer)?)?;
    let tier: Tier = tier.parse().map_err(Error::from)?;
    let response = match registry.resolver().beneficiary(&payer.id, tier).await? {
        Beneficiary::Found(id) => BeneficiaryResponse {
            tier,
            beneficiary: Some(id),
            last_checked: None,
        },
        Beneficiary::NoBeneficiary { last_checked } => BeneficiaryResponse {
            tier,
            beneficiary: None,
            last_checked: Some(last_checked),
        },
    };
    Ok(Json(response))
}

// --- Payment endpoints ---

#[derive(Debug, Deserialize)]
struct CreatePaymentRequest {
    payer: String,
    #[serde(default)]
    receipt_url: Option<String>,
}

async fn create_payment(
    State(registry): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentRecord>)> {
    let payer = registry.member(&parse_key(&req.payer)?)?;
    let payment = registry.submit_upgrade(&payer.id, req.receipt_url).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn get_payment(
    State(registry): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PaymentRecord>> {
    Ok(Json(registry.payment(&id)?))
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    confirmer: String,
}

async fn confirm_payment(
    State(registry): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<PaymentRecord>> {
    let confirmer = registry.member(&parse_key(&req.confirmer)?)?;
    Ok(Json(registry.confirm_payment(&id, &confirmer.id).await?))
}

async fn dispute_payment(
    State(registry): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<PaymentRecord>> {
    let confirmer = registry.member(&parse_key(&req.confirmer)?)?;
    Ok(Json(registry.dispute_payment(&id, &confirmer.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use ternion_resolver::ResolverConfig;
    use tower::ServiceExt;

    fn app() -> (tempfile::TempDir, Router) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        storage.ensure_root(&"root".into(), "root@example.com").unwrap();
        let registry = Arc::new(Registry::new(storage, ResolverConfig::new("root")));
        (dir, build_router(registry))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_dir, app) = app();
        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn register_and_fetch_member() {
        let (_dir, app) = app();
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/members",
            Some(json!({ "email": "a@example.com", "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["member"]["parent_id"], "root");
        assert_eq!(body["member"]["level"], "GUEST");
        assert_eq!(body["placement_degraded"], false);

        let (status, body) = call(&app, "GET", "/api/v1/members/a@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");

        let (status, body) = call(&app, "GET", "/api/v1/members/root/children", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let (_dir, app) = app();
        let (status, body) = call(&app, "GET", "/api/v1/members/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());

        let (status, _) = call(&app, "GET", "/api/v1/beneficiary/root/TIER9", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/api/v1/beneficiary/root/GUEST", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = json!({ "email": "a@example.com" });
        call(&app, "POST", "/api/v1/members", Some(body.clone())).await;
        let (status, _) = call(&app, "POST", "/api/v1/members", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn payment_flow() {
        let (_dir, app) = app();
        call(
            &app,
            "POST",
            "/api/v1/members",
            Some(json!({ "email": "a@example.com" })),
        )
        .await;

        let (status, body) = call(&app, "GET", "/api/v1/beneficiary/a@example.com/TIER1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["beneficiary"], "root");

        let (status, payment) = call(
            &app,
            "POST",
            "/api/v1/payments",
            Some(json!({ "payer": "a@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(payment["status"], "PENDING");
        let id = payment["id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/payments/{}/confirm", id);
        let (status, _) = call(&app, "POST", &uri, Some(json!({ "confirmer": "a@example.com" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "POST", &uri, Some(json!({ "confirmer": "root" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "CONFIRMED");

        let (_, member) = call(&app, "GET", "/api/v1/members/a@example.com", None).await;
        assert_eq!(member["level"], "TIER1");

        let (status, history) = call(&app, "GET", "/api/v1/members/a@example.com/payments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().map(Vec::len), Some(1));
        assert_eq!(history[0]["id"], id.as_str());

        let (_, root) = call(&app, "GET", "/api/v1/members/root", None).await;
        assert_eq!(root["earnings_usd"], 2);
    }

    #[tokio::test]
    async fn resolver_queries() {
        let (_dir, app) = app();
        let (status, body) = call(&app, "GET", "/api/v1/placement/root", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "parent_id": "root", "degraded": false }));

        let (status, body) = call(&app, "GET", "/api/v1/sponsors/root@example.com/active", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sponsor_id"], "root");
    }
}
