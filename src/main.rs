use std::time::Duration;

mod admin;
mod app;
mod auth;
mod clock;
mod config;
mod error;
mod state;
mod sweeper;
mod users;
mod validation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "otpgate=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    if let Some(admin) = app_state.config.bootstrap_admin.as_ref() {
        admin::services::bootstrap_admin(&app_state, admin).await?;
    }

    let sweep_every = app_state.config.sweep_interval_secs;
    let sweeper = (sweep_every > 0)
        .then(|| sweeper::spawn(app_state.clone(), Duration::from_secs(sweep_every)));

    let result = app::serve(app::build_app(app_state)).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    result
}
