use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use rand::{rngs::OsRng, Rng};
use time::Duration;
use tracing::{error, info, warn};

use super::{jwt::JwtKeys, session};
use crate::error::{AuthError, UNKNOWN_MOBILE};
use crate::state::AppState;
use crate::users::{OtpChallenge, UserType};

pub const OTP_TTL: Duration = Duration::minutes(1);
const INVALID_OTP: &str = "Invalid or expired OTP";

/// Out-of-band delivery of a freshly issued code.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, mobile_number: &str, code: &str) -> anyhow::Result<()>;
}

/// Development delivery: writes the code to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, mobile_number: &str, code: &str) -> anyhow::Result<()> {
        info!(mobile_number, otp = code, "otp issued (log delivery, development only)");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub session_id: String,
    pub user_type: UserType,
}

/// Six-digit code drawn uniformly from 100000..=999999.
pub fn generate_code() -> String {
    OsRng.gen_range(100_000..=999_999).to_string()
}

pub fn hash_code(code: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(code.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Constant-time check of `code` against a stored argon2 hash.
pub fn verify_code(code: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(code.as_bytes(), &parsed)
        .is_ok())
}

lazy_static! {
    static ref DUMMY_HASH: Option<String> = hash_code("000000").ok();
}

/// Spends roughly one verification worth of time so a rejection for a
/// missing user or challenge costs the same as a wrong code.
fn burn_verification(code: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_code(code, hash);
    }
}

/// Opens a one-minute OTP challenge for a live, active user and hands the
/// plaintext code to the configured sender.
pub async fn request_otp(st: &AppState, mobile_number: &str) -> Result<(), AuthError> {
    let Some(user) = st.store.find_by_mobile(mobile_number).await? else {
        warn!(mobile_number, "otp requested for unknown mobile number");
        return Err(AuthError::NotFound(UNKNOWN_MOBILE));
    };
    if !user.is_active {
        warn!(user_id = user.id, "otp requested for inactive user");
        return Err(AuthError::Inactive);
    }

    let code = generate_code();
    let now = st.clock.now();
    let challenge = OtpChallenge {
        hash: hash_code(&code)?,
        expires_at: now + OTP_TTL,
    };
    if !st.store.open_otp(user.id, &challenge, now).await? {
        // deleted or deactivated between the read and the write
        return Err(AuthError::NotFound(UNKNOWN_MOBILE));
    }

    st.otp_sender.send(&user.mobile_number, &code).await?;
    info!(user_id = user.id, "otp challenge opened");
    Ok(())
}

/// Redeems an open challenge, starting a new session and minting a token.
/// Every rejection is the same `InvalidOrExpired`.
pub async fn verify_otp(
    st: &AppState,
    mobile_number: &str,
    code: &str,
) -> Result<LoginResult, AuthError> {
    let now = st.clock.now();
    let user = st
        .store
        .find_by_mobile(mobile_number)
        .await?
        .filter(|u| u.is_active);

    let (user, challenge) = match user {
        Some(mut u) => match u.otp.take() {
            Some(c) => (u, c),
            None => {
                burn_verification(code);
                return Err(AuthError::InvalidOrExpired(INVALID_OTP));
            }
        },
        None => {
            burn_verification(code);
            return Err(AuthError::InvalidOrExpired(INVALID_OTP));
        }
    };

    // hash first: an expired challenge must cost as much as any other rejection
    let matches = verify_code(code, &challenge.hash)?;
    if challenge.expires_at < now {
        warn!(user_id = user.id, "otp rejected: expired");
        return Err(AuthError::InvalidOrExpired(INVALID_OTP));
    }
    if !matches {
        warn!(user_id = user.id, "otp rejected: mismatch");
        return Err(AuthError::InvalidOrExpired(INVALID_OTP));
    }

    let session = session::create_session(now);
    if !st
        .store
        .redeem_otp(user.id, &challenge.hash, &session, now)
        .await?
    {
        warn!(user_id = user.id, "otp rejected: challenge already consumed");
        return Err(AuthError::InvalidOrExpired(INVALID_OTP));
    }

    let token = JwtKeys::from_ref(st).issue(&user.mobile_number)?;
    info!(user_id = user.id, "user logged in");
    Ok(LoginResult {
        token,
        session_id: session.id,
        user_type: user.user_type,
    })
}
