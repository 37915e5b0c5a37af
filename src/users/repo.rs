use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::{info, warn};

use super::repo_types::{NewUser, OtpChallenge, Session, User, UserPatch, UserRow};
use crate::error::AuthError;

pub const MOBILE_IN_USE: &str = "Mobile number already in use";

/// Rows cleared by one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub otps: u64,
    pub sessions: u64,
}

/// Persistent table of user records.
///
/// Lookups by id and mobile number only see live (not soft-deleted) rows.
/// Every mutating call is atomic for the row it touches and bumps
/// `updated_at` to `now`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;

    async fn find_by_mobile(&self, mobile_number: &str) -> anyhow::Result<Option<User>>;

    /// Any row holding this session id, deleted or expired included.
    async fn find_by_session(&self, session_id: &str) -> anyhow::Result<Option<User>>;

    /// Live users, newest first.
    async fn list(&self) -> anyhow::Result<Vec<User>>;

    /// Fails with `Conflict` when a live user already holds the mobile number.
    async fn insert(&self, new: &NewUser, now: OffsetDateTime) -> Result<User, AuthError>;

    /// Replaces any open challenge on a live, active user.
    async fn open_otp(
        &self,
        id: i64,
        challenge: &OtpChallenge,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool>;

    /// Clears the challenge and installs `session`, but only while the stored
    /// hash is still `expected_hash` and unexpired. Returns `false` if the
    /// challenge was consumed, replaced or expired in the meantime.
    async fn redeem_otp(
        &self,
        id: i64,
        expected_hash: &str,
        session: &Session,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool>;

    async fn clear_session(&self, session_id: &str, now: OffsetDateTime) -> anyhow::Result<bool>;

    /// `Ok(None)` when the target is not a live user.
    async fn update(
        &self,
        id: i64,
        patch: &UserPatch,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AuthError>;

    /// Sets `deleted_at` and drops the session. `false` if not a live user.
    async fn soft_delete(&self, id: i64, now: OffsetDateTime) -> anyhow::Result<bool>;

    async fn sweep_expired(&self, now: OffsetDateTime) -> anyhow::Result<SweepStats>;
}

const SELECT_USER: &str = r#"
    SELECT id, name, mobile_number, email, is_active, user_type,
           otp_hash, otp_expires_at, session_id, session_expires_at,
           created_at, updated_at, deleted_at
    FROM users
"#;

const RETURNING_USER: &str = r#"
    RETURNING id, name, mobile_number, email, is_active, user_type,
              otp_hash, otp_expires_at, session_id, session_expires_at,
              created_at, updated_at, deleted_at
"#;

fn conflict_or_internal(e: sqlx::Error) -> AuthError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            warn!("mobile number uniqueness violated at store level");
            AuthError::Conflict(MOBILE_IN_USE)
        }
        _ => AuthError::from(e),
    }
}

fn into_user(row: Option<UserRow>) -> anyhow::Result<Option<User>> {
    row.map(User::try_from).transpose()
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            warn!(error = %e, "migration failed; continuing");
        } else {
            info!("migrations applied");
        }

        Ok(Self { db })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.db)
            .await
            .context("ping database")?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_USER} WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        into_user(row)
    }

    async fn find_by_mobile(&self, mobile_number: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_USER} WHERE mobile_number = $1 AND deleted_at IS NULL"
        ))
        .bind(mobile_number)
        .fetch_optional(&self.db)
        .await
        .context("find user by mobile number")?;
        into_user(row)
    }

    async fn find_by_session(&self, session_id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_USER} WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.db)
        .await
        .context("find user by session")?;
        into_user(row)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_USER} WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn insert(&self, new: &NewUser, now: OffsetDateTime) -> Result<User, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (name, mobile_number, email, is_active, user_type, created_at, updated_at)
            VALUES ($1, $2, $3, TRUE, $4, $5, $5)
            {RETURNING_USER}
            "#
        ))
        .bind(&new.name)
        .bind(&new.mobile_number)
        .bind(&new.email)
        .bind(i16::from(new.user_type))
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(conflict_or_internal)?;
        Ok(User::try_from(row)?)
    }

    async fn open_otp(
        &self,
        id: i64,
        challenge: &OtpChallenge,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET otp_hash = $2, otp_expires_at = $3, updated_at = $4
             WHERE id = $1 AND deleted_at IS NULL AND is_active
            "#,
        )
        .bind(id)
        .bind(&challenge.hash)
        .bind(challenge.expires_at)
        .bind(now)
        .execute(&self.db)
        .await
        .context("open otp challenge")?;
        Ok(res.rows_affected() == 1)
    }

    async fn redeem_otp(
        &self,
        id: i64,
        expected_hash: &str,
        session: &Session,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET otp_hash = NULL, otp_expires_at = NULL,
                   session_id = $3, session_expires_at = $4,
                   updated_at = $5
             WHERE id = $1 AND otp_hash = $2 AND otp_expires_at >= $5
               AND deleted_at IS NULL AND is_active
            "#,
        )
        .bind(id)
        .bind(expected_hash)
        .bind(&session.id)
        .bind(session.expires_at)
        .bind(now)
        .execute(&self.db)
        .await
        .context("redeem otp challenge")?;
        Ok(res.rows_affected() == 1)
    }

    async fn clear_session(&self, session_id: &str, now: OffsetDateTime) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET session_id = NULL, session_expires_at = NULL, updated_at = $2
             WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.db)
        .await
        .context("clear session")?;
        Ok(res.rows_affected() > 0)
    }

    async fn update(
        &self,
        id: i64,
        patch: &UserPatch,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AuthError> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let current: Option<(String,)> = sqlx::query_as(
            "SELECT mobile_number FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock user")?;
        let Some((current_mobile,)) = current else {
            return Ok(None);
        };

        if let Some(mobile) = patch.mobile_number.as_deref() {
            if mobile != current_mobile {
                let taken: Option<(i64,)> = sqlx::query_as(
                    "SELECT id FROM users WHERE mobile_number = $1 AND deleted_at IS NULL AND id <> $2",
                )
                .bind(mobile)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("check mobile number")?;
                if taken.is_some() {
                    return Err(AuthError::Conflict(MOBILE_IN_USE));
                }
            }
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   mobile_number = COALESCE($3, mobile_number),
                   email = COALESCE($4, email),
                   user_type = COALESCE($5, user_type),
                   is_active = COALESCE($6, is_active),
                   updated_at = $7
             WHERE id = $1
            {RETURNING_USER}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.mobile_number)
        .bind(&patch.email)
        .bind(patch.user_type.map(i16::from))
        .bind(patch.is_active)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_or_internal)?;

        tx.commit().await.context("commit tx")?;
        Ok(Some(User::try_from(row)?))
    }

    async fn soft_delete(&self, id: i64, now: OffsetDateTime) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET deleted_at = $2, session_id = NULL, session_expires_at = NULL,
                   updated_at = $2
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.db)
        .await
        .context("soft delete user")?;
        Ok(res.rows_affected() == 1)
    }

    async fn sweep_expired(&self, now: OffsetDateTime) -> anyhow::Result<SweepStats> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let otps = sqlx::query(
            r#"
            UPDATE users
               SET otp_hash = NULL, otp_expires_at = NULL, updated_at = $1
             WHERE otp_expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("sweep otps")?
        .rows_affected();
        let sessions = sqlx::query(
            r#"
            UPDATE users
               SET session_id = NULL, session_expires_at = NULL, updated_at = $1
             WHERE session_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("sweep sessions")?
        .rows_affected();
        tx.commit().await.context("commit tx")?;
        Ok(SweepStats { otps, sessions })
    }
}
