use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::state::AppState;
use crate::users::{Session, User};

pub const SESSION_TTL: Duration = Duration::days(30);
const INVALID_SESSION: &str = "Session expired or invalid";

/// New opaque session good for thirty days. Persisting it overwrites any
/// session the user already held.
pub fn create_session(now: OffsetDateTime) -> Session {
    Session {
        id: Uuid::new_v4().to_string(),
        expires_at: now + SESSION_TTL,
    }
}

/// Resolves a live session to its owner. Wrong id, expiry and a deleted
/// owner are indistinguishable to the caller.
pub async fn validate_session(st: &AppState, session_id: &str) -> Result<User, AuthError> {
    let now = st.clock.now();
    let user = st
        .store
        .find_by_session(session_id)
        .await?
        .filter(|u| !u.is_deleted())
        .filter(|u| u.session.as_ref().is_some_and(|s| s.expires_at > now));
    user.ok_or(AuthError::InvalidOrExpired(INVALID_SESSION))
}

/// Clears the session wherever it lives. `Ok(false)` means nothing held it.
pub async fn end_session(st: &AppState, session_id: &str) -> Result<bool, AuthError> {
    let ended = st.store.clear_session(session_id, st.clock.now()).await?;
    if ended {
        info!("session ended");
    } else {
        warn!("logout for unknown session");
    }
    Ok(ended)
}
