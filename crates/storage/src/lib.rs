use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, info};

use shared::{
    domain::{
        consultation_fee, Consultation, ConsultationId, ConsultationStatus, ConsultationType,
        Lawyer, LawyerId, PaymentStatus, Review, ReviewId, User, UserId, UserRole, UserStatus,
        MAX_REVIEW_RATING, MIN_REVIEW_RATING,
    },
    protocol::{AdminUserQuery, DashboardStats, PaymentRecord, PlatformSettings},
};

mod script;

pub use script::ScriptReport;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Domain rule violations raised by storage. Carried inside `anyhow::Error`
/// so callers can downcast and map them to API error codes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("cannot move consultation from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("review rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("consultation {0} is not completed and cannot be reviewed")]
    NotReviewable(i64),
    #[error("consultation {0} has already been reviewed")]
    AlreadyReviewed(i64),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct NewConsultation {
    pub lawyer_id: LawyerId,
    pub client_id: UserId,
    pub kind: ConsultationType,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub description: String,
}

const USER_COLUMNS: &str =
    "id, username, display_name, email, phone, role, status, created_at";
const LAWYER_COLUMNS: &str = "id, name, avatar, bio, education, certifications, specialties, experience, rating, review_count, hourly_rate, location, response_time, languages, is_online";
const CONSULTATION_COLUMNS: &str = "id, lawyer_id, client_id, kind, status, scheduled_at, duration_minutes, fee, description, created_at";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to an in-memory database is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(%database_url, "storage ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, new_user: &NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, display_name, email, phone, role)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(username) DO NOTHING
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.display_name)
        .bind(&new_user.email)
        .bind(&new_user.phone)
        .bind(new_user.role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| RecordError::DuplicateUsername(new_user.username.clone()))?;
        let user = user_from_row(&row)?;
        info!(user_id = user.id.0, role = user.role.as_str(), "user created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn list_users(&self, query: &AdminUserQuery) -> Result<Vec<User>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1 = 1"));
        if let Some(role) = query.role {
            builder.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{search}%");
            builder
                .push(" AND (username LIKE ")
                .push_bind(pattern.clone())
                .push(" OR display_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR email LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    pub async fn set_user_status(&self, user_id: UserId, status: UserStatus) -> Result<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET status = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RecordError::NotFound {
            entity: "user",
            id: user_id.0,
        })?;
        info!(user_id = user_id.0, status = status.as_str(), "user status changed");
        user_from_row(&row)
    }

    pub async fn upsert_lawyer(&self, lawyer: &Lawyer) -> Result<()> {
        sqlx::query(
            "INSERT INTO lawyers (id, name, avatar, bio, education, certifications, specialties,
                                  experience, rating, review_count, hourly_rate, location,
                                  response_time, languages, is_online)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name, avatar=excluded.avatar, bio=excluded.bio,
                education=excluded.education, certifications=excluded.certifications,
                specialties=excluded.specialties, experience=excluded.experience,
                rating=excluded.rating, review_count=excluded.review_count,
                hourly_rate=excluded.hourly_rate, location=excluded.location,
                response_time=excluded.response_time, languages=excluded.languages,
                is_online=excluded.is_online",
        )
        .bind(lawyer.id.0)
        .bind(&lawyer.name)
        .bind(&lawyer.avatar)
        .bind(&lawyer.bio)
        .bind(&lawyer.education)
        .bind(to_json(&lawyer.certifications)?)
        .bind(to_json(&lawyer.specialties)?)
        .bind(i64::from(lawyer.experience))
        .bind(lawyer.rating)
        .bind(i64::from(lawyer.review_count))
        .bind(i64::from(lawyer.hourly_rate))
        .bind(&lawyer.location)
        .bind(&lawyer.response_time)
        .bind(to_json(&lawyer.languages)?)
        .bind(lawyer.is_online)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert lawyer {}", lawyer.id.0))?;
        Ok(())
    }

    pub async fn get_lawyer(&self, lawyer_id: LawyerId) -> Result<Option<Lawyer>> {
        let row = sqlx::query(&format!("SELECT {LAWYER_COLUMNS} FROM lawyers WHERE id = ?"))
            .bind(lawyer_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lawyer_from_row).transpose()
    }

    pub async fn list_lawyers(&self) -> Result<Vec<Lawyer>> {
        let rows = sqlx::query(&format!("SELECT {LAWYER_COLUMNS} FROM lawyers ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(lawyer_from_row).collect()
    }

    pub async fn insert_consultation(&self, new: &NewConsultation) -> Result<Consultation> {
        let lawyer = self
            .get_lawyer(new.lawyer_id)
            .await?
            .ok_or(RecordError::NotFound {
                entity: "lawyer",
                id: new.lawyer_id.0,
            })?;
        let fee = consultation_fee(lawyer.hourly_rate, new.duration_minutes);

        let row = sqlx::query(&format!(
            "INSERT INTO consultations (lawyer_id, client_id, kind, scheduled_at, duration_minutes, fee, description)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(new.lawyer_id.0)
        .bind(new.client_id.0)
        .bind(new.kind.as_str())
        .bind(new.scheduled_at)
        .bind(i64::from(new.duration_minutes))
        .bind(i64::from(fee))
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;
        consultation_from_row(&row)
    }

    pub async fn get_consultation(&self, id: ConsultationId) -> Result<Option<Consultation>> {
        let row = sqlx::query(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(consultation_from_row).transpose()
    }

    pub async fn list_consultations(
        &self,
        status: Option<ConsultationStatus>,
    ) -> Result<Vec<Consultation>> {
        let rows = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE status = ? ORDER BY id DESC"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {CONSULTATION_COLUMNS} FROM consultations ORDER BY id DESC"
            ))
            .fetch_all(&self.pool)
            .await?
        };
        rows.iter().map(consultation_from_row).collect()
    }

    pub async fn update_consultation_status(
        &self,
        id: ConsultationId,
        next: ConsultationStatus,
    ) -> Result<Consultation> {
        let current = self
            .get_consultation(id)
            .await?
            .ok_or(RecordError::NotFound {
                entity: "consultation",
                id: id.0,
            })?;
        if !current.status.can_transition_to(next) {
            return Err(RecordError::InvalidTransition {
                from: current.status.as_str(),
                to: next.as_str(),
            }
            .into());
        }

        // Guarded on the old status so a concurrent change cannot be overwritten.
        let row = sqlx::query(&format!(
            "UPDATE consultations SET status = ? WHERE id = ? AND status = ?
             RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(next.as_str())
        .bind(id.0)
        .bind(current.status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("consultation {} changed concurrently", id.0))?;

        info!(
            consultation_id = id.0,
            from = current.status.as_str(),
            to = next.as_str(),
            "consultation status changed"
        );
        consultation_from_row(&row)
    }

    /// Appends a review and folds its score into the lawyer's aggregate rating.
    pub async fn insert_review(
        &self,
        consultation_id: ConsultationId,
        rating: u8,
        comment: &str,
    ) -> Result<Review> {
        if !(MIN_REVIEW_RATING..=MAX_REVIEW_RATING).contains(&rating) {
            return Err(RecordError::InvalidRating(rating).into());
        }

        // The insert is the first statement so the transaction holds the write
        // lock from the start instead of upgrading a read lock.
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO reviews (lawyer_id, consultation_id, rating, comment)
             SELECT lawyer_id, id, ?, ? FROM consultations
             WHERE id = ? AND status = ?
             ON CONFLICT(consultation_id) DO NOTHING
             RETURNING id, lawyer_id, created_at",
        )
        .bind(i64::from(rating))
        .bind(comment)
        .bind(consultation_id.0)
        .bind(ConsultationStatus::Completed.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM consultations WHERE id = ?")
                    .bind(consultation_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            let err = match status.as_deref().map(ConsultationStatus::parse) {
                None => RecordError::NotFound {
                    entity: "consultation",
                    id: consultation_id.0,
                },
                Some(Some(ConsultationStatus::Completed)) => {
                    RecordError::AlreadyReviewed(consultation_id.0)
                }
                Some(_) => RecordError::NotReviewable(consultation_id.0),
            };
            return Err(err.into());
        };
        let lawyer_id: i64 = row.try_get("lawyer_id")?;

        sqlx::query(
            "UPDATE lawyers
             SET rating = ROUND((rating * review_count + ?) / (review_count + 1), 2),
                 review_count = review_count + 1
             WHERE id = ?",
        )
        .bind(f64::from(rating))
        .bind(lawyer_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Review {
            id: ReviewId(row.try_get("id")?),
            lawyer_id: LawyerId(lawyer_id),
            consultation_id,
            rating,
            comment: comment.to_string(),
            created_at: row.try_get("created_at")?,
        })
    }

    pub async fn list_reviews_for_lawyer(&self, lawyer_id: LawyerId) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            "SELECT id, lawyer_id, consultation_id, rating, comment, created_at
             FROM reviews WHERE lawyer_id = ? ORDER BY id DESC",
        )
        .bind(lawyer_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<Review> {
                Ok(Review {
                    id: ReviewId(r.try_get("id")?),
                    lawyer_id: LawyerId(r.try_get("lawyer_id")?),
                    consultation_id: ConsultationId(r.try_get("consultation_id")?),
                    rating: u8::try_from(r.try_get::<i64, _>("rating")?)?,
                    comment: r.try_get("comment")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn list_payments(&self) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            "SELECT c.id, c.client_id, u.display_name, c.lawyer_id, l.name, c.fee, c.status, c.created_at
             FROM consultations c
             INNER JOIN users u ON u.id = c.client_id
             INNER JOIN lawyers l ON l.id = c.lawyer_id
             ORDER BY c.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<PaymentRecord> {
                let status: String = r.get(6);
                let status = ConsultationStatus::parse(&status)
                    .ok_or_else(|| anyhow!("unknown consultation status '{status}'"))?;
                Ok(PaymentRecord {
                    consultation_id: ConsultationId(r.get::<i64, _>(0)),
                    client_id: UserId(r.get::<i64, _>(1)),
                    client_name: r.get::<String, _>(2),
                    lawyer_id: LawyerId(r.get::<i64, _>(3)),
                    lawyer_name: r.get::<String, _>(4),
                    amount: u32::try_from(r.get::<i64, _>(5))?,
                    status: PaymentStatus::for_consultation(status),
                    created_at: r.get::<DateTime<Utc>, _>(7),
                })
            })
            .collect()
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let users = sqlx::query(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN role = 'client' THEN 1 ELSE 0 END), 0)
             FROM users",
        )
        .fetch_one(&self.pool)
        .await?;
        let lawyers = sqlx::query(
            "SELECT COUNT(*), COALESCE(SUM(is_online), 0), COALESCE(AVG(rating), 0.0)
             FROM lawyers",
        )
        .fetch_one(&self.pool)
        .await?;
        let consultations = sqlx::query(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN fee ELSE 0 END), 0)
             FROM consultations",
        )
        .fetch_one(&self.pool)
        .await?;

        let average_rating: f64 = lawyers.get(2);
        Ok(DashboardStats {
            total_users: users.get::<i64, _>(0) as u64,
            total_clients: users.get::<i64, _>(1) as u64,
            total_lawyers: lawyers.get::<i64, _>(0) as u64,
            online_lawyers: lawyers.get::<i64, _>(1) as u64,
            total_consultations: consultations.get::<i64, _>(0) as u64,
            pending_consultations: consultations.get::<i64, _>(1) as u64,
            completed_consultations: consultations.get::<i64, _>(2) as u64,
            total_revenue: consultations.get::<i64, _>(3) as u64,
            average_rating: (average_rating * 100.0).round() / 100.0,
        })
    }

    pub async fn load_settings(&self) -> Result<PlatformSettings> {
        let rows = sqlx::query("SELECT key, value FROM platform_settings")
            .fetch_all(&self.pool)
            .await?;

        let mut settings = PlatformSettings::default();
        for row in rows {
            let key: String = row.get(0);
            let value: String = row.get(1);
            match key.as_str() {
                "platform_name" => settings.platform_name = value,
                "commission_rate" => {
                    settings.commission_rate = value
                        .parse()
                        .with_context(|| format!("invalid commission_rate '{value}'"))?
                }
                "support_email" => settings.support_email = value,
                "maintenance_mode" => settings.maintenance_mode = value == "true",
                other => debug!(key = other, "ignoring unknown platform setting"),
            }
        }
        Ok(settings)
    }

    pub async fn save_settings(&self, settings: &PlatformSettings) -> Result<()> {
        let entries = [
            ("platform_name", settings.platform_name.clone()),
            ("commission_rate", settings.commission_rate.to_string()),
            ("support_email", settings.support_email.clone()),
            ("maintenance_mode", settings.maintenance_mode.to_string()),
        ];

        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO platform_settings (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!("platform settings saved");
        Ok(())
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    Ok(User {
        id: UserId(row.try_get("id")?),
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        role: UserRole::parse(&role).ok_or_else(|| anyhow!("unknown user role '{role}'"))?,
        status: UserStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown user status '{status}'"))?,
        created_at: row.try_get("created_at")?,
    })
}

fn lawyer_from_row(row: &SqliteRow) -> Result<Lawyer> {
    Ok(Lawyer {
        id: LawyerId(row.try_get("id")?),
        name: row.try_get("name")?,
        avatar: row.try_get("avatar")?,
        bio: row.try_get("bio")?,
        education: row.try_get("education")?,
        certifications: from_json(&row.try_get::<String, _>("certifications")?)?,
        specialties: from_json(&row.try_get::<String, _>("specialties")?)?,
        experience: u32::try_from(row.try_get::<i64, _>("experience")?)?,
        rating: row.try_get("rating")?,
        review_count: u32::try_from(row.try_get::<i64, _>("review_count")?)?,
        hourly_rate: u32::try_from(row.try_get::<i64, _>("hourly_rate")?)?,
        location: row.try_get("location")?,
        response_time: row.try_get("response_time")?,
        languages: from_json(&row.try_get::<String, _>("languages")?)?,
        is_online: row.try_get("is_online")?,
    })
}

fn consultation_from_row(row: &SqliteRow) -> Result<Consultation> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(Consultation {
        id: ConsultationId(row.try_get("id")?),
        lawyer_id: LawyerId(row.try_get("lawyer_id")?),
        client_id: UserId(row.try_get("client_id")?),
        kind: ConsultationType::parse(&kind)
            .ok_or_else(|| anyhow!("unknown consultation type '{kind}'"))?,
        status: ConsultationStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown consultation status '{status}'"))?,
        scheduled_at: row.try_get("scheduled_at")?,
        duration_minutes: u32::try_from(row.try_get::<i64, _>("duration_minutes")?)?,
        fee: u32::try_from(row.try_get::<i64, _>("fee")?)?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("failed to encode json column")
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("failed to decode json column '{raw}'"))
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/marketplace.db";

/// Turns a bare file path or loose `sqlite:` url into a url sqlx accepts.
/// Windows drive paths keep the single-colon form.
pub fn normalize_database_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }
    if raw.starts_with("sqlite::memory:") {
        return raw.to_string();
    }

    let path = match raw.strip_prefix("sqlite://") {
        Some(path) => path,
        None if raw.contains("://") => return raw.to_string(),
        None => raw.strip_prefix("sqlite:").unwrap_or(raw),
    };
    let path = path.replace('\\', "/");
    if has_drive_prefix(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
