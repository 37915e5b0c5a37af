use std::sync::Arc;

use tracing::warn;

use crate::auth::otp::{LogOtpSender, OtpSender};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::users::{MemoryUserStore, PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub otp_sender: Arc<dyn OtpSender>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match config.database_url.as_deref() {
            Some(url) => Arc::new(PgUserStore::connect(url).await?) as Arc<dyn UserStore>,
            None => {
                warn!("DATABASE_URL not set; using in-memory user store (data is lost on restart)");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        Ok(Self::from_parts(
            store,
            config,
            Arc::new(LogOtpSender),
            Arc::new(SystemClock),
        ))
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        otp_sender: Arc<dyn OtpSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            otp_sender,
            clock,
        }
    }
}
