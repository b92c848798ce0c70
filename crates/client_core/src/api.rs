use std::future::Future;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        Consultation, ConsultationId, ConsultationStatus, Lawyer, LawyerId, Review, User, UserId,
        UserStatus,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        AdminUserQuery, DashboardStats, LawyerQuery, LoginRequest, LoginResponse, PaymentRecord,
        PlatformSettings, UpdateConsultationStatusRequest, UpdateUserStatusRequest,
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::session::UserSession;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {}", error.message)]
    Api { status: u16, error: ApiError },
    #[error("sign in required")]
    NotSignedIn,
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { error, .. } => Some(error.code),
            _ => None,
        }
    }
}

/// Result of an admin screen fetch. Failures stay visible to the operator
/// instead of being replaced by placeholder data.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenData<T> {
    Loaded(T),
    Unavailable { reason: String },
}

impl<T> ScreenData<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

pub async fn load_screen<T, F>(fetch: F) -> ScreenData<T>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match fetch.await {
        Ok(value) => ScreenData::Loaded(value),
        Err(err) => {
            warn!(error = %err, "screen data unavailable");
            ScreenData::Unavailable {
                reason: err.to_string(),
            }
        }
    }
}

/// REST client for the marketplace and back-office API.
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl MarketplaceClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn with_session(mut self, session: &UserSession) -> Self {
        self.token = Some(session.token.clone());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Exchanges a username for a bearer token and keeps the token for
    /// later calls.
    pub async fn login(&mut self, username: &str) -> Result<UserSession, ClientError> {
        let request = self.http.post(self.url("login")?).json(&LoginRequest {
            username: username.to_string(),
        });
        let response: LoginResponse = send(request).await?;
        self.token = Some(response.token.clone());
        Ok(UserSession::new(response.user, response.token))
    }

    pub async fn list_lawyers(&self, query: &LawyerQuery) -> Result<Vec<Lawyer>, ClientError> {
        send(self.http.get(self.url("lawyers")?).query(query)).await
    }

    pub async fn lawyer(&self, id: LawyerId) -> Result<Lawyer, ClientError> {
        send(self.http.get(self.url(&format!("lawyers/{}", id.0))?)).await
    }

    pub async fn lawyer_reviews(&self, id: LawyerId) -> Result<Vec<Review>, ClientError> {
        send(self.http.get(self.url(&format!("lawyers/{}/reviews", id.0))?)).await
    }

    pub async fn admin_dashboard(&self) -> Result<DashboardStats, ClientError> {
        send(self.authed(self.http.get(self.url("admin/dashboard")?))?).await
    }

    pub async fn admin_users(&self, filter: &AdminUserQuery) -> Result<Vec<User>, ClientError> {
        let request = self.http.get(self.url("admin/users")?).query(filter);
        send(self.authed(request)?).await
    }

    pub async fn admin_set_user_status(
        &self,
        id: UserId,
        status: UserStatus,
    ) -> Result<User, ClientError> {
        let request = self
            .http
            .post(self.url(&format!("admin/users/{}/status", id.0))?)
            .json(&UpdateUserStatusRequest { status });
        send(self.authed(request)?).await
    }

    pub async fn admin_consultations(
        &self,
        status: Option<ConsultationStatus>,
    ) -> Result<Vec<Consultation>, ClientError> {
        let mut request = self.http.get(self.url("admin/consultations")?);
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        send(self.authed(request)?).await
    }

    pub async fn admin_set_consultation_status(
        &self,
        id: ConsultationId,
        status: ConsultationStatus,
    ) -> Result<Consultation, ClientError> {
        let request = self
            .http
            .post(self.url(&format!("admin/consultations/{}/status", id.0))?)
            .json(&UpdateConsultationStatusRequest { status });
        send(self.authed(request)?).await
    }

    pub async fn admin_payments(&self) -> Result<Vec<PaymentRecord>, ClientError> {
        send(self.authed(self.http.get(self.url("admin/payments")?))?).await
    }

    pub async fn admin_settings(&self) -> Result<PlatformSettings, ClientError> {
        send(self.authed(self.http.get(self.url("admin/settings")?))?).await
    }

    pub async fn admin_update_settings(
        &self,
        settings: &PlatformSettings,
    ) -> Result<PlatformSettings, ClientError> {
        let request = self.http.put(self.url("admin/settings")?).json(settings);
        send(self.authed(request)?).await
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotSignedIn)?;
        Ok(request.bearer_auth(token))
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    debug!(status = status.as_u16(), url = %response.url(), "api response");
    if status.is_success() {
        return Ok(response.json().await?);
    }
    Err(api_error(status, response).await)
}

async fn api_error(status: StatusCode, response: Response) -> ClientError {
    let body = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        ApiError::new(code_for_status(status), fallback_message(status, &body))
    });
    ClientError::Api {
        status: status.as_u16(),
        error,
    }
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::CONFLICT => ErrorCode::Conflict,
        s if s.is_client_error() => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    }
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
