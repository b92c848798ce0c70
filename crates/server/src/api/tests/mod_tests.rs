use super::*;
use chrono::Utc;
use directory::fixtures::sample_lawyers;
use shared::domain::ConsultationType;
use storage::{NewConsultation, NewUser};

async fn setup() -> (ApiContext, User, User) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    for lawyer in sample_lawyers() {
        storage.upsert_lawyer(&lawyer).await.expect("lawyer");
    }
    let admin = storage
        .create_user(&new_user("root", UserRole::Admin))
        .await
        .expect("admin");
    let client = storage
        .create_user(&new_user("alice", UserRole::Client))
        .await
        .expect("client");
    (
        ApiContext {
            storage,
            auth: AuthConfig {
                secret: "s".into(),
                ttl_seconds: 60,
            },
        },
        admin,
        client,
    )
}

fn new_user(username: &str, role: UserRole) -> NewUser {
    NewUser {
        username: username.into(),
        display_name: username.into(),
        email: None,
        phone: None,
        role,
    }
}

#[tokio::test]
async fn login_rejects_unknown_and_suspended_users() {
    let (ctx, _, client) = setup().await;

    let err = login(&ctx, "nobody").await.expect_err("unknown");
    assert_eq!(err.code, ErrorCode::NotFound);

    ctx.storage
        .set_user_status(client.id, UserStatus::Suspended)
        .await
        .expect("suspend");
    let err = login(&ctx, "alice").await.expect_err("suspended");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = login(&ctx, "   ").await.expect_err("blank");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn admin_gate_checks_token_and_role() {
    let (ctx, _, _) = setup().await;

    let err = authorize_admin(&ctx, None).await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let err = authorize_admin(&ctx, Some("garbage"))
        .await
        .expect_err("invalid");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let client = login(&ctx, "alice").await.expect("client login");
    let err = authorize_admin(&ctx, Some(&client.token))
        .await
        .expect_err("client");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let admin = login(&ctx, "root").await.expect("admin login");
    let claims = authorize_admin(&ctx, Some(&admin.token))
        .await
        .expect("admin");
    assert_eq!(claims.user_id(), Some(admin.user.id));
}

#[tokio::test]
async fn admin_cannot_suspend_self() {
    let (ctx, admin, client) = setup().await;
    let token = login(&ctx, "root").await.expect("login").token;
    let claims = authorize_admin(&ctx, Some(&token)).await.expect("admin");

    let err = set_user_status(&ctx, &claims, admin.id, UserStatus::Suspended)
        .await
        .expect_err("self");
    assert_eq!(err.code, ErrorCode::Validation);

    let user = set_user_status(&ctx, &claims, client.id, UserStatus::Suspended)
        .await
        .expect("suspend client");
    assert_eq!(user.status, UserStatus::Suspended);

    let err = set_user_status(&ctx, &claims, UserId(404), UserStatus::Active)
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn lawyers_are_filtered_and_sorted_by_engine() {
    let (ctx, _, _) = setup().await;

    let all = list_lawyers(&ctx, &LawyerQuery::default())
        .await
        .expect("lawyers");
    let ratings: Vec<f64> = all.iter().map(|l| l.rating).collect();
    assert_eq!(ratings, vec![4.9, 4.8, 4.7, 4.6]);

    let cheap = list_lawyers(
        &ctx,
        &LawyerQuery {
            max_price: Some(400),
            sort: Some("price".into()),
            direction: Some("asc".into()),
            ..LawyerQuery::default()
        },
    )
    .await
    .expect("cheap");
    let prices: Vec<u32> = cheap.iter().map(|l| l.hourly_rate).collect();
    assert_eq!(prices, vec![300, 400]);

    let err = lawyer_reviews(&ctx, LawyerId(99))
        .await
        .expect_err("missing lawyer");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn invalid_consultation_transition_is_conflict() {
    let (ctx, _, client) = setup().await;
    let token = login(&ctx, "root").await.expect("login").token;
    let claims = authorize_admin(&ctx, Some(&token)).await.expect("admin");
    let consultation = ctx
        .storage
        .insert_consultation(&NewConsultation {
            lawyer_id: LawyerId(1),
            client_id: client.id,
            kind: ConsultationType::Video,
            scheduled_at: Some(Utc::now()),
            duration_minutes: 60,
            description: "刑事案件咨询".into(),
        })
        .await
        .expect("consultation");

    let err = set_consultation_status(
        &ctx,
        &claims,
        consultation.id,
        ConsultationStatus::Completed,
    )
    .await
    .expect_err("skip confirm");
    assert_eq!(err.code, ErrorCode::Conflict);

    let confirmed = set_consultation_status(
        &ctx,
        &claims,
        consultation.id,
        ConsultationStatus::Confirmed,
    )
    .await
    .expect("confirm");
    assert_eq!(confirmed.status, ConsultationStatus::Confirmed);
}

#[tokio::test]
async fn settings_are_validated_before_saving() {
    let (ctx, _, _) = setup().await;
    let mut settings = get_settings(&ctx).await.expect("settings");
    settings.commission_rate = 1.5;
    let err = update_settings(&ctx, settings.clone())
        .await
        .expect_err("invalid rate");
    assert_eq!(err.code, ErrorCode::Validation);

    settings.commission_rate = 0.2;
    update_settings(&ctx, settings.clone()).await.expect("save");
    assert_eq!(get_settings(&ctx).await.expect("reload"), settings);
}

#[test]
fn record_errors_map_to_error_codes() {
    let cases = [
        (RecordError::AlreadyReviewed(7), ErrorCode::Conflict),
        (RecordError::NotReviewable(7), ErrorCode::Validation),
        (
            RecordError::NotFound {
                entity: "consultation",
                id: 7,
            },
            ErrorCode::NotFound,
        ),
    ];
    for (record, code) in cases {
        let message = record.to_string();
        let err = storage_error(anyhow::Error::from(record));
        assert_eq!(err.code, code);
        assert_eq!(err.message, message);
    }
    assert_eq!(
        storage_error(anyhow::anyhow!("disk I/O error")).code,
        ErrorCode::Internal
    );
}
