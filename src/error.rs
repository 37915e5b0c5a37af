use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Outcomes of the auth and directory workflows.
///
/// Everything except `Internal` is an expected business result; `Internal`
/// carries store or crypto failures and is reported without detail.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    NotFound(&'static str),

    /// Disabled account. Rendered exactly like an unknown mobile number.
    #[error("user is inactive")]
    Inactive,

    /// Bad or expired OTP, bad or expired session. Never split further.
    #[error("{0}")]
    InvalidOrExpired(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

pub const UNKNOWN_MOBILE: &str = "User with this mobile number does not exist";

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::NotFound(_) | AuthError::Inactive => StatusCode::NOT_FOUND,
            AuthError::InvalidOrExpired(_) | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Inactive => UNKNOWN_MOBILE.to_string(),
            AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Internal(anyhow::Error::new(e))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(e) = &self {
            error!(error = %format!("{e:#}"), "request failed");
        }
        let status = self.status();
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}
