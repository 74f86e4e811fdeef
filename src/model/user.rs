use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

/// Full `users` row, including the password hash.
#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: u8,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub phone: Option<String>,
    pub joining_date: Option<NaiveDate>,
    pub status: String,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active.to_string()
    }
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 7,
    "name": "Jane Doe",
    "email": "jane@company.com",
    "role_id": 3,
    "department": "Engineering",
    "designation": "Backend Developer",
    "phone": "+8801712345678",
    "joining_date": "2025-03-01",
    "status": "active",
    "created_at": "2025-03-01T08:00:00Z"
}))]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role_id: u8,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub joining_date: Option<NaiveDate>,
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Compact user reference used in member lists and chat contacts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserSummary {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub designation: Option<String>,
}

pub const SUMMARY_COLUMNS: &str = "u.id, u.name, u.email, u.designation";

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role_id: u.role_id,
            department: u.department,
            designation: u.designation,
            phone: u.phone,
            joining_date: u.joining_date,
            status: u.status,
            created_at: u.created_at,
        }
    }
}

pub const PROFILE_COLUMNS: &str =
    "id, name, email, role_id, department, designation, phone, joining_date, status, created_at";

/// Lower-cases and trims an email address; returns `None` when it is not
/// plausibly an address (`local@domain.tld`).
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.contains('@') || email.contains(char::is_whitespace) {
        return None;
    }
    let (host, tld) = domain.rsplit_once('.')?;
    if host.is_empty() || tld.is_empty() {
        return None;
    }
    Some(email)
}

pub const MIN_PASSWORD_LEN: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_valid_emails() {
        assert_eq!(
            normalize_email("  Jane.Doe@Company.COM "),
            Some("jane.doe@company.com".to_string())
        );
    }

    #[test]
    fn rejects_malformed_emails() {
        for bad in ["", "jane", "jane@", "@company.com", "jane@company", "jane@.com", "a@b@c.com", "ja ne@x.io"] {
            assert_eq!(normalize_email(bad), None, "{bad} should be rejected");
        }
    }
}
