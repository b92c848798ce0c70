use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{
    domain::{
        Consultation, ConsultationId, ConsultationStatus, Lawyer, LawyerId, Review, User, UserId,
    },
    error::ApiError,
    protocol::{
        AdminUserQuery, DashboardStats, LawyerQuery, LoginRequest, LoginResponse, PaymentRecord,
        PlatformSettings, UpdateConsultationStatusRequest, UpdateUserStatusRequest,
    },
};
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod auth;
mod config;

use api::ApiContext;
use app_state::AppState;
use auth::{AuthConfig, Claims};
use config::load_settings;

type HttpResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Default, Deserialize)]
struct ConsultationFilter {
    status: Option<ConsultationStatus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    let database_url = storage::normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        auth: AuthConfig {
            secret: settings.jwt_secret,
            ttl_seconds: settings.token_ttl_seconds,
        },
    };
    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/lawyers", get(http_list_lawyers))
        .route("/lawyers/:lawyer_id", get(http_get_lawyer))
        .route("/lawyers/:lawyer_id/reviews", get(http_lawyer_reviews))
        .route("/admin/dashboard", get(http_dashboard))
        .route("/admin/users", get(http_list_users))
        .route("/admin/users/:user_id/status", post(http_set_user_status))
        .route("/admin/consultations", get(http_list_consultations))
        .route(
            "/admin/consultations/:consultation_id/status",
            post(http_set_consultation_status),
        )
        .route("/admin/payments", get(http_list_payments))
        .route(
            "/admin/settings",
            get(http_get_settings).put(http_update_settings),
        )
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<LoginResponse> {
    api::login(&state.api, &req.username)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_lawyers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LawyerQuery>,
) -> HttpResult<Vec<Lawyer>> {
    api::list_lawyers(&state.api, &query)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_lawyer(
    State(state): State<Arc<AppState>>,
    Path(lawyer_id): Path<i64>,
) -> HttpResult<Lawyer> {
    api::get_lawyer(&state.api, LawyerId(lawyer_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_lawyer_reviews(
    State(state): State<Arc<AppState>>,
    Path(lawyer_id): Path<i64>,
) -> HttpResult<Vec<Review>> {
    api::lawyer_reviews(&state.api, LawyerId(lawyer_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HttpResult<DashboardStats> {
    admin(&state, &headers).await?;
    api::dashboard(&state.api).await.map(Json).map_err(reject)
}

async fn http_list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<AdminUserQuery>,
) -> HttpResult<Vec<User>> {
    admin(&state, &headers).await?;
    api::list_users(&state.api, &filter)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_set_user_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateUserStatusRequest>,
) -> HttpResult<User> {
    let claims = admin(&state, &headers).await?;
    api::set_user_status(&state.api, &claims, UserId(user_id), req.status)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_consultations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<ConsultationFilter>,
) -> HttpResult<Vec<Consultation>> {
    admin(&state, &headers).await?;
    api::list_consultations(&state.api, filter.status)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_set_consultation_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(consultation_id): Path<i64>,
    Json(req): Json<UpdateConsultationStatusRequest>,
) -> HttpResult<Consultation> {
    let claims = admin(&state, &headers).await?;
    api::set_consultation_status(
        &state.api,
        &claims,
        ConsultationId(consultation_id),
        req.status,
    )
    .await
    .map(Json)
    .map_err(reject)
}

async fn http_list_payments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HttpResult<Vec<PaymentRecord>> {
    admin(&state, &headers).await?;
    api::list_payments(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HttpResult<PlatformSettings> {
    admin(&state, &headers).await?;
    api::get_settings(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(settings): Json<PlatformSettings>,
) -> HttpResult<PlatformSettings> {
    let claims = admin(&state, &headers).await?;
    let saved = api::update_settings(&state.api, settings)
        .await
        .map_err(reject)?;
    info!(actor = %claims.sub, "platform settings updated");
    Ok(Json(saved))
}

async fn admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Claims, (StatusCode, Json<ApiError>)> {
    api::authorize_admin(&state.api, bearer_token(headers))
        .await
        .map_err(reject)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
