use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::state::AppState;
use crate::users::SweepStats;

/// Clears expired OTP challenges and sessions once.
pub async fn sweep_once(st: &AppState) -> anyhow::Result<SweepStats> {
    let stats = st.store.sweep_expired(st.clock.now()).await?;
    if stats.otps > 0 || stats.sessions > 0 {
        info!(otps = stats.otps, sessions = stats.sessions, "expired auth state swept");
    } else {
        debug!("expiry sweep found nothing");
    }
    Ok(stats)
}

/// Runs `sweep_once` every `every`. Lookups still check expiry themselves,
/// so a missed or failed sweep only leaves stale columns behind.
pub fn spawn(st: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(&st).await {
                error!(error = %format!("{e:#}"), "expiry sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::Harness;
    use crate::users::{UserStore, UserType};
    use time::Duration as TimeDuration;

    #[tokio::test]
    async fn sweep_clears_expired_otp_and_session() {
        let h = Harness::new();
        let a = h.seed("A", "9000000001", UserType::RegularUser).await;
        let b = h.seed("B", "9000000002", UserType::RegularUser).await;
        h.login("9000000001").await;
        crate::auth::otp::request_otp(&h.state, "9000000002").await.unwrap();

        h.clock.advance(TimeDuration::minutes(2));
        let stats = sweep_once(&h.state).await.unwrap();
        assert_eq!(stats, SweepStats { otps: 1, sessions: 0 });
        assert!(h.store.find_by_id(b.id).await.unwrap().unwrap().otp.is_none());

        h.clock.advance(TimeDuration::days(30));
        let stats = sweep_once(&h.state).await.unwrap();
        assert_eq!(stats, SweepStats { otps: 0, sessions: 1 });
        assert!(h.store.find_by_id(a.id).await.unwrap().unwrap().session.is_none());
    }

    #[tokio::test]
    async fn spawned_sweeper_can_be_aborted() {
        let h = Harness::new();
        let handle = spawn(h.state.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
