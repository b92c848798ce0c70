use directory::{engine, DirectoryQuery};
use shared::{
    domain::{
        Consultation, ConsultationId, ConsultationStatus, Lawyer, LawyerId, Review, User, UserId,
        UserRole, UserStatus,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        AdminUserQuery, DashboardStats, LawyerQuery, LoginResponse, PaymentRecord,
        PlatformSettings,
    },
};
use storage::{RecordError, Storage};
use tracing::{error, info, warn};

use crate::auth::{mint_token, verify_token, AuthConfig, Claims};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
}

pub async fn login(ctx: &ApiContext, username: &str) -> Result<LoginResponse, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("username is required"));
    }
    let user = ctx
        .storage
        .find_user_by_username(username)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found(format!("user '{username}' not found")))?;
    if user.status == UserStatus::Suspended {
        return Err(ApiError::new(ErrorCode::Forbidden, "account is suspended"));
    }
    let token = mint_token(&ctx.auth, &user)
        .map_err(|err| ApiError::internal(format!("failed to issue token: {err}")))?;
    info!(user_id = user.id.0, role = user.role.as_str(), "user logged in");
    Ok(LoginResponse { user, token })
}

/// Accepts only a valid token whose holder is a still-active admin.
pub async fn authorize_admin(ctx: &ApiContext, bearer: Option<&str>) -> Result<Claims, ApiError> {
    let token = bearer
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "missing bearer token"))?;
    let claims = verify_token(&ctx.auth, token).map_err(|err| {
        warn!(error = %err, "rejected bearer token");
        ApiError::new(ErrorCode::Unauthorized, "invalid or expired token")
    })?;
    if claims.role != UserRole::Admin {
        return Err(ApiError::new(ErrorCode::Forbidden, "admin role required"));
    }
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "malformed token subject"))?;
    let user = ctx
        .storage
        .get_user(user_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "token user no longer exists"))?;
    if user.status != UserStatus::Active || user.role != UserRole::Admin {
        return Err(ApiError::new(ErrorCode::Forbidden, "admin role required"));
    }
    Ok(claims)
}

pub async fn list_lawyers(ctx: &ApiContext, query: &LawyerQuery) -> Result<Vec<Lawyer>, ApiError> {
    let lawyers = ctx.storage.list_lawyers().await.map_err(storage_error)?;
    Ok(engine::apply(&lawyers, &DirectoryQuery::from(query)))
}

pub async fn get_lawyer(ctx: &ApiContext, lawyer_id: LawyerId) -> Result<Lawyer, ApiError> {
    ctx.storage
        .get_lawyer(lawyer_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found(format!("lawyer {} not found", lawyer_id.0)))
}

pub async fn lawyer_reviews(ctx: &ApiContext, lawyer_id: LawyerId) -> Result<Vec<Review>, ApiError> {
    get_lawyer(ctx, lawyer_id).await?;
    ctx.storage
        .list_reviews_for_lawyer(lawyer_id)
        .await
        .map_err(storage_error)
}

pub async fn dashboard(ctx: &ApiContext) -> Result<DashboardStats, ApiError> {
    ctx.storage.dashboard_stats().await.map_err(storage_error)
}

pub async fn list_users(ctx: &ApiContext, filter: &AdminUserQuery) -> Result<Vec<User>, ApiError> {
    ctx.storage.list_users(filter).await.map_err(storage_error)
}

pub async fn set_user_status(
    ctx: &ApiContext,
    actor: &Claims,
    user_id: UserId,
    status: UserStatus,
) -> Result<User, ApiError> {
    if status == UserStatus::Suspended && actor.user_id() == Some(user_id) {
        return Err(ApiError::validation("admins cannot suspend themselves"));
    }
    let user = ctx
        .storage
        .set_user_status(user_id, status)
        .await
        .map_err(storage_error)?;
    info!(actor = %actor.sub, user_id = user_id.0, status = status.as_str(), "user status changed");
    Ok(user)
}

pub async fn list_consultations(
    ctx: &ApiContext,
    status: Option<ConsultationStatus>,
) -> Result<Vec<Consultation>, ApiError> {
    ctx.storage
        .list_consultations(status)
        .await
        .map_err(storage_error)
}

pub async fn set_consultation_status(
    ctx: &ApiContext,
    actor: &Claims,
    consultation_id: ConsultationId,
    status: ConsultationStatus,
) -> Result<Consultation, ApiError> {
    let consultation = ctx
        .storage
        .update_consultation_status(consultation_id, status)
        .await
        .map_err(storage_error)?;
    info!(
        actor = %actor.sub,
        consultation_id = consultation_id.0,
        status = status.as_str(),
        "consultation status changed"
    );
    Ok(consultation)
}

pub async fn list_payments(ctx: &ApiContext) -> Result<Vec<PaymentRecord>, ApiError> {
    ctx.storage.list_payments().await.map_err(storage_error)
}

pub async fn get_settings(ctx: &ApiContext) -> Result<PlatformSettings, ApiError> {
    ctx.storage.load_settings().await.map_err(storage_error)
}

pub async fn update_settings(
    ctx: &ApiContext,
    settings: PlatformSettings,
) -> Result<PlatformSettings, ApiError> {
    settings.validate().map_err(ApiError::validation)?;
    ctx.storage
        .save_settings(&settings)
        .await
        .map_err(storage_error)?;
    Ok(settings)
}

/// Maps storage rule violations onto error codes; anything else is internal.
fn storage_error(err: anyhow::Error) -> ApiError {
    let code = match err.downcast_ref::<RecordError>() {
        Some(RecordError::NotFound { .. }) => ErrorCode::NotFound,
        Some(RecordError::DuplicateUsername(_))
        | Some(RecordError::InvalidTransition { .. })
        | Some(RecordError::AlreadyReviewed(_)) => ErrorCode::Conflict,
        Some(RecordError::InvalidRating(_)) | Some(RecordError::NotReviewable(_)) => {
            ErrorCode::Validation
        }
        None => {
            error!(error = %err, "storage failure");
            return ApiError::internal("internal storage error");
        }
    };
    ApiError::new(code, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
