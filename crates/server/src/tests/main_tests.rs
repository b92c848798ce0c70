use super::*;
use axum::{
    body::{self, Body},
    http::Request,
    response::Response,
};
use directory::fixtures::sample_lawyers;
use shared::{
    domain::{ConsultationType, UserRole, UserStatus},
    error::ErrorCode,
};
use storage::{NewConsultation, NewUser};
use tower::ServiceExt;

async fn test_app() -> (Router, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    for lawyer in sample_lawyers() {
        storage.upsert_lawyer(&lawyer).await.expect("lawyer");
    }
    for (username, role) in [("root", UserRole::Admin), ("alice", UserRole::Client)] {
        storage
            .create_user(&NewUser {
                username: username.into(),
                display_name: username.into(),
                email: None,
                phone: None,
                role,
            })
            .await
            .expect("user");
    }

    let api = ApiContext {
        storage,
        auth: AuthConfig {
            secret: "s".into(),
            ttl_seconds: 60,
        },
    };
    let app = build_router(Arc::new(AppState { api: api.clone() }));
    (app, api.storage)
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn login_token(app: &Router, username: &str) -> String {
    let request = Request::post("/login")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "username": username }).to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    json_body::<LoginResponse>(response).await.token
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn login_of_unknown_user_is_not_found() {
    let (app, _storage) = test_app().await;
    let request = Request::post("/login")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"username":"ghost"}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn lawyer_routes_apply_query_string() {
    let (app, _storage) = test_app().await;

    let request = Request::get("/lawyers?specialties=%E5%A9%9A%E5%A7%BB%E5%AE%B6%E5%BA%AD")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let lawyers: Vec<Lawyer> = json_body(response).await;
    assert_eq!(lawyers.len(), 1);
    assert_eq!(lawyers[0].name, "李婉清");

    let request = Request::get("/lawyers?sort=experience&direction=asc&online=true")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let lawyers: Vec<Lawyer> = json_body(response).await;
    let experience: Vec<u32> = lawyers.iter().map(|l| l.experience).collect();
    assert_eq!(experience, vec![8, 12, 15]);

    let request = Request::get("/lawyers/42")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::get("/lawyers/3/reviews")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let reviews: Vec<Review> = json_body(response).await;
    assert!(reviews.is_empty());
}

#[tokio::test]
async fn admin_routes_require_admin_token() {
    let (app, _storage) = test_app().await;

    let request = Request::get("/admin/dashboard")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let client_token = login_token(&app, "alice").await;
    let response = app
        .clone()
        .oneshot(authed_get("/admin/payments", &client_token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin_token = login_token(&app, "root").await;
    let response = app
        .oneshot(authed_get("/admin/dashboard", &admin_token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let stats: DashboardStats = json_body(response).await;
    assert_eq!(stats.total_lawyers, 4);
    assert_eq!(stats.total_clients, 1);
}

#[tokio::test]
async fn admin_can_manage_users_and_consultations() {
    let (app, storage) = test_app().await;
    let admin_token = login_token(&app, "root").await;
    let alice = storage
        .find_user_by_username("alice")
        .await
        .expect("lookup")
        .expect("alice");
    let consultation = storage
        .insert_consultation(&NewConsultation {
            lawyer_id: LawyerId(2),
            client_id: alice.id,
            kind: ConsultationType::Text,
            scheduled_at: None,
            duration_minutes: 60,
            description: "继承纠纷".into(),
        })
        .await
        .expect("consultation");

    let response = app
        .clone()
        .oneshot(authed_get("/admin/users?role=client", &admin_token))
        .await
        .expect("response");
    let users: Vec<User> = json_body(response).await;
    assert_eq!(users.len(), 1);

    let request = Request::post(format!("/admin/users/{}/status", alice.id.0))
        .header("authorization", format!("Bearer {admin_token}"))
        .header("content-type", "application/json")
        .body(Body::from(r#"{"status":"suspended"}"#))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let updated: User = json_body(response).await;
    assert_eq!(updated.status, UserStatus::Suspended);

    let request = Request::post(format!(
        "/admin/consultations/{}/status",
        consultation.id.0
    ))
    .header("authorization", format!("Bearer {admin_token}"))
    .header("content-type", "application/json")
    .body(Body::from(r#"{"status":"completed"}"#))
    .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(authed_get("/admin/consultations?status=pending", &admin_token))
        .await
        .expect("response");
    let pending: Vec<Consultation> = json_body(response).await;
    assert_eq!(pending.len(), 1);

    let response = app
        .oneshot(authed_get("/admin/payments", &admin_token))
        .await
        .expect("response");
    let payments: Vec<PaymentRecord> = json_body(response).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, 400);
}

#[tokio::test]
async fn settings_round_trip_and_reject_invalid_values() {
    let (app, _storage) = test_app().await;
    let admin_token = login_token(&app, "root").await;

    let response = app
        .clone()
        .oneshot(authed_get("/admin/settings", &admin_token))
        .await
        .expect("response");
    let mut settings: PlatformSettings = json_body(response).await;
    assert_eq!(settings, PlatformSettings::default());

    settings.support_email = "no-at-sign".into();
    let request = Request::put("/admin/settings")
        .header("authorization", format!("Bearer {admin_token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&settings).expect("json")))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    settings.support_email = "ops@example.com".into();
    settings.maintenance_mode = true;
    let request = Request::put("/admin/settings")
        .header("authorization", format!("Bearer {admin_token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&settings).expect("json")))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authed_get("/admin/settings", &admin_token))
        .await
        .expect("response");
    let saved: PlatformSettings = json_body(response).await;
    assert!(saved.maintenance_mode);
}

#[test]
fn bearer_token_requires_scheme_and_value() {
    let mut headers = HeaderMap::new();
    assert_eq!(bearer_token(&headers), None);
    headers.insert(header::AUTHORIZATION, "Basic abc".parse().expect("header"));
    assert_eq!(bearer_token(&headers), None);
    headers.insert(header::AUTHORIZATION, "Bearer  ".parse().expect("header"));
    assert_eq!(bearer_token(&headers), None);
    headers.insert(header::AUTHORIZATION, "Bearer abc".parse().expect("header"));
    assert_eq!(bearer_token(&headers), Some("abc"));
}
