use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(LawyerId);
id_newtype!(ConsultationId);
id_newtype!(ReviewId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    Lawyer,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Lawyer => "lawyer",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Self::Client),
            "lawyer" => Some(Self::Lawyer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// A lawyer profile as shown in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lawyer {
    pub id: LawyerId,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub certifications: Vec<String>,
    pub specialties: Vec<String>,
    /// Years in practice.
    pub experience: u32,
    /// Average review score in `0.0..=5.0`.
    pub rating: f64,
    pub review_count: u32,
    /// Whole currency units per hour.
    pub hourly_rate: u32,
    pub location: String,
    #[serde(default)]
    pub response_time: String,
    #[serde(default)]
    pub languages: Vec<String>,
    pub is_online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationType {
    Text,
    Phone,
    Video,
}

impl ConsultationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Phone => "phone",
            Self::Video => "video",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "phone" => Some(Self::Phone),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Text consultations are asynchronous and need no appointment.
    pub fn requires_time_slot(self) -> bool {
        !matches!(self, Self::Text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// pending -> confirmed -> completed, with cancellation allowed before completion.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Confirmed, Self::Completed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: ConsultationId,
    pub lawyer_id: LawyerId,
    pub client_id: UserId,
    #[serde(rename = "type")]
    pub kind: ConsultationType,
    pub status: ConsultationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub fee: u32,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub lawyer_id: LawyerId,
    pub consultation_id: ConsultationId,
    /// Integer score in `1..=5`.
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

pub const MIN_REVIEW_RATING: u8 = 1;
pub const MAX_REVIEW_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    /// Payments mirror the consultation they belong to.
    pub fn for_consultation(status: ConsultationStatus) -> Self {
        match status {
            ConsultationStatus::Pending => Self::Pending,
            ConsultationStatus::Confirmed | ConsultationStatus::Completed => Self::Paid,
            ConsultationStatus::Cancelled => Self::Refunded,
        }
    }
}

/// Fee for a consultation billed pro rata on the lawyer's hourly rate.
pub fn consultation_fee(hourly_rate: u32, duration_minutes: u32) -> u32 {
    let scaled = u64::from(hourly_rate) * u64::from(duration_minutes);
    ((scaled + 30) / 60) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consultation_status_follows_lifecycle() {
        use ConsultationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn fee_is_pro_rata_and_rounded() {
        assert_eq!(consultation_fee(300, 60), 300);
        assert_eq!(consultation_fee(300, 30), 150);
        assert_eq!(consultation_fee(100, 20), 33);
        assert_eq!(consultation_fee(0, 45), 0);
    }

    #[test]
    fn consultation_type_serializes_as_type_field() {
        let raw = serde_json::json!({
            "id": 1,
            "lawyer_id": 2,
            "client_id": 3,
            "type": "video",
            "status": "pending",
            "duration_minutes": 60,
            "fee": 300,
            "created_at": "2024-01-01T00:00:00Z"
        });
        let consultation: Consultation = serde_json::from_value(raw).expect("decode");
        assert_eq!(consultation.kind, ConsultationType::Video);
        assert!(consultation.kind.requires_time_slot());
        assert!(!ConsultationType::Text.requires_time_slot());
    }
}
