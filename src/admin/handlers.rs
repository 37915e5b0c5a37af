use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CreateUserRequest, CreateUserResponse, UpdateUserRequest, UpdateUserResponse},
    services::{self, AdminAction},
};
use crate::{
    auth::{dto::MessageResponse, AuthUser},
    error::AuthError,
    state::AppState,
    users::PublicUser,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/create-user", post(create_user))
        .route("/users", get(list_users))
        .route("/users/:id", put(update_user).delete(delete_user))
}

/// An unreadable body is only reported once the caller is known to be an admin.
async fn admin_body<T>(
    state: &AppState,
    caller: &str,
    action: AdminAction,
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, AuthError> {
    match body {
        Ok(Json(payload)) => Ok(payload),
        Err(rejection) => {
            services::require_admin(state, caller, action).await?;
            Err(AuthError::BadRequest(rejection.body_text()))
        }
    }
}

#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let payload = admin_body(&state, &caller, AdminAction::Create, body).await?;

    match services::create_user(&state, &payload, &caller).await {
        Ok(user) => Ok(Json(CreateUserResponse::created(&user)).into_response()),
        Err(AuthError::Conflict(message)) => Ok((
            StatusCode::CONFLICT,
            Json(CreateUserResponse::conflict(message, &payload)),
        )
            .into_response()),
        Err(e) => Err(e),
    }
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<PublicUser>>, AuthError> {
    Ok(Json(services::list_users(&state, &caller).await?))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UpdateUserResponse>, AuthError> {
    let payload = admin_body(&state, &caller, AdminAction::Update, body).await?;
    let user = services::update_user(&state, id, &payload, &caller).await?;
    Ok(Json(UpdateUserResponse::from(&user)))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AuthError> {
    services::delete_user(&state, id, &caller).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
