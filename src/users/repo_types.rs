use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Role of a user record. Serialized as its integer code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum UserType {
    Admin = 1,
    #[default]
    RegularUser = 2,
}

impl From<UserType> for i16 {
    fn from(t: UserType) -> i16 {
        t as i16
    }
}

impl TryFrom<i16> for UserType {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(UserType::Admin),
            2 => Ok(UserType::RegularUser),
            other => Err(format!("unknown user type {other}")),
        }
    }
}

/// Open OTP challenge: hash and expiry always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

/// Live server-side session: id and expiry always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub user_type: UserType,
    pub otp: Option<OtpChallenge>,
    pub session: Option<Session>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Flat row as stored in the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub user_type: i16,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<OffsetDateTime>,
    pub session_id: Option<String>,
    pub session_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let user_type = UserType::try_from(r.user_type).map_err(anyhow::Error::msg)?;
        // a half-written pair is treated as absent
        let otp = match (r.otp_hash, r.otp_expires_at) {
            (Some(hash), Some(expires_at)) => Some(OtpChallenge { hash, expires_at }),
            _ => None,
        };
        let session = match (r.session_id, r.session_expires_at) {
            (Some(id), Some(expires_at)) => Some(Session { id, expires_at }),
            _ => None,
        };
        Ok(Self {
            id: r.id,
            name: r.name,
            mobile_number: r.mobile_number,
            email: r.email,
            is_active: r.is_active,
            user_type,
            otp,
            session,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub user_type: UserType,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(mobile) = &self.mobile_number {
            user.mobile_number = mobile.clone();
        }
        if let Some(email) = &self.email {
            user.email = Some(email.clone());
        }
        if let Some(user_type) = self.user_type {
            user.user_type = user_type;
        }
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
    }
}

/// Fields of a user that may leave the service. No OTP or session secrets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub user_type: UserType,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            mobile_number: u.mobile_number.clone(),
            email: u.email.clone(),
            user_type: u.user_type,
            is_active: u.is_active,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
