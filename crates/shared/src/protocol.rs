use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ConsultationId, ConsultationStatus, LawyerId, PaymentStatus, User, UserId, UserRole,
    UserStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

/// Query-string form of a directory search, as accepted by `GET /lawyers`.
///
/// `specialties` is a comma separated list. Unset bounds fall back to the
/// directory defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LawyerQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialties: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_experience: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_experience: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_clients: u64,
    pub total_lawyers: u64,
    pub online_lawyers: u64,
    pub total_consultations: u64,
    pub pending_consultations: u64,
    pub completed_consultations: u64,
    /// Sum of fees over completed consultations.
    pub total_revenue: u64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminUserQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserStatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConsultationStatusRequest {
    pub status: ConsultationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub consultation_id: ConsultationId,
    pub client_id: UserId,
    pub client_name: String,
    pub lawyer_id: LawyerId,
    pub lawyer_name: String,
    pub amount: u32,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub platform_name: String,
    /// Fraction of each fee kept by the platform, `0.0..=1.0`.
    pub commission_rate: f64,
    pub support_email: String,
    pub maintenance_mode: bool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            platform_name: "Lawyer Consultation".into(),
            commission_rate: 0.1,
            support_email: "support@example.com".into(),
            maintenance_mode: false,
        }
    }
}

impl PlatformSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.platform_name.trim().is_empty() {
            return Err("platform_name must not be empty".into());
        }
        if !(0.0..=1.0).contains(&self.commission_rate) {
            return Err("commission_rate must be within 0.0..=1.0".into());
        }
        if !self.support_email.contains('@') {
            return Err("support_email must be an email address".into());
        }
        Ok(())
    }
}
