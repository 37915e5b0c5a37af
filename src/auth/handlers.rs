use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{
        HealthResponse, LoginResponse, MessageResponse, RequestOtpRequest, VerifyOtpRequest,
        VerifyResponse,
    },
    extractors::{AuthUser, SessionHeader},
    otp, session,
};
use crate::{error::AuthError, state::AppState, validation};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/request-otp", post(request_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/verify", get(verify))
        .route("/logout", post(logout))
}

#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "Healthy",
                database: "Connected",
            }),
        ),
        Err(e) => {
            error!(error = %format!("{e:#}"), "health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse {
                    status: "Unhealthy",
                    database: "Connection Failed",
                }),
            )
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestOtpRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let mobile = validation::mobile(&payload.mobile_number)?;
    otp::request_otp(&state, &mobile).await?;
    Ok(Json(MessageResponse::new("OTP sent successfully")))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let login = otp::verify_otp(&state, payload.mobile_number.trim(), payload.otp.trim()).await?;
    Ok(Json(LoginResponse {
        token: login.token,
        message: "Login successful".into(),
        session_id: login.session_id,
        user_type: login.user_type,
    }))
}

/// Confirms both the bearer token and the server-side session are live and
/// belong to the same user.
#[instrument(skip_all)]
pub async fn verify(
    State(state): State<AppState>,
    AuthUser(subject): AuthUser,
    SessionHeader(session_id): SessionHeader,
) -> Result<Json<VerifyResponse>, AuthError> {
    let user = session::validate_session(&state, &session_id).await?;
    if user.mobile_number != subject {
        warn!(user_id = user.id, "session does not belong to token subject");
        return Err(AuthError::InvalidOrExpired("Session expired or invalid"));
    }
    Ok(Json(VerifyResponse {
        message: "Token and Session are valid".into(),
        mobile_number: user.mobile_number,
        session_id,
        user_type: user.user_type,
    }))
}

/// Ends the caller's own session. A session held by someone else is refused
/// and left untouched.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(subject): AuthUser,
    SessionHeader(session_id): SessionHeader,
) -> Result<Json<MessageResponse>, AuthError> {
    if let Some(owner) = state.store.find_by_session(&session_id).await? {
        if owner.mobile_number != subject {
            warn!(user_id = owner.id, "logout for a session owned by another user");
            return Err(AuthError::InvalidOrExpired("Session expired or invalid"));
        }
    }
    // unknown sessions still answer 200 so logout stays idempotent
    if session::end_session(&state, &session_id).await? {
        info!("logged out");
    }
    Ok(Json(MessageResponse::new("Logged out successfully")))
}
