use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::repo::{SweepStats, UserStore, MOBILE_IN_USE};
use super::repo_types::{NewUser, OtpChallenge, Session, User, UserPatch};
use crate::error::AuthError;

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, User>,
}

impl Table {
    fn live(&self) -> impl Iterator<Item = &User> {
        self.rows.values().filter(|u| !u.is_deleted())
    }

    fn live_mut(&mut self, id: i64) -> Option<&mut User> {
        self.rows.get_mut(&id).filter(|u| !u.is_deleted())
    }

    fn mobile_taken(&self, mobile_number: &str, except: Option<i64>) -> bool {
        self.live()
            .any(|u| u.mobile_number == mobile_number && Some(u.id) != except)
    }
}

/// Process-local store with the same contract as the Postgres one.
/// A single lock around the table makes every call atomic.
#[derive(Default)]
pub struct MemoryUserStore {
    table: Mutex<Table>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryUserStore {
    /// Raw row by id, soft-deleted rows included.
    pub async fn raw(&self, id: i64) -> Option<User> {
        self.table.lock().await.rows.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let t = self.table.lock().await;
        let found = t.live().find(|u| u.id == id).cloned();
        Ok(found)
    }

    async fn find_by_mobile(&self, mobile_number: &str) -> anyhow::Result<Option<User>> {
        let t = self.table.lock().await;
        let found = t.live().find(|u| u.mobile_number == mobile_number).cloned();
        Ok(found)
    }

    async fn find_by_session(&self, session_id: &str) -> anyhow::Result<Option<User>> {
        let t = self.table.lock().await;
        let found = t
            .rows
            .values()
            .find(|u| u.session.as_ref().is_some_and(|s| s.id == session_id))
            .cloned();
        Ok(found)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let t = self.table.lock().await;
        let mut users: Vec<User> = t.live().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    async fn insert(&self, new: &NewUser, now: OffsetDateTime) -> Result<User, AuthError> {
        let mut t = self.table.lock().await;
        if t.mobile_taken(&new.mobile_number, None) {
            return Err(AuthError::Conflict(MOBILE_IN_USE));
        }
        t.next_id += 1;
        let user = User {
            id: t.next_id,
            name: new.name.clone(),
            mobile_number: new.mobile_number.clone(),
            email: new.email.clone(),
            is_active: true,
            user_type: new.user_type,
            otp: None,
            session: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        t.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn open_otp(
        &self,
        id: i64,
        challenge: &OtpChallenge,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut t = self.table.lock().await;
        match t.live_mut(id).filter(|u| u.is_active) {
            Some(user) => {
                user.otp = Some(challenge.clone());
                user.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn redeem_otp(
        &self,
        id: i64,
        expected_hash: &str,
        session: &Session,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut t = self.table.lock().await;
        let Some(user) = t.live_mut(id).filter(|u| u.is_active) else {
            return Ok(false);
        };
        let open = user
            .otp
            .as_ref()
            .is_some_and(|c| c.hash == expected_hash && c.expires_at >= now);
        if !open {
            return Ok(false);
        }
        user.otp = None;
        user.session = Some(session.clone());
        user.updated_at = now;
        Ok(true)
    }

    async fn clear_session(&self, session_id: &str, now: OffsetDateTime) -> anyhow::Result<bool> {
        let mut t = self.table.lock().await;
        let mut cleared = false;
        for user in t.rows.values_mut() {
            if user.session.as_ref().is_some_and(|s| s.id == session_id) {
                user.session = None;
                user.updated_at = now;
                cleared = true;
            }
        }
        Ok(cleared)
    }

    async fn update(
        &self,
        id: i64,
        patch: &UserPatch,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AuthError> {
        let mut t = self.table.lock().await;
        if let Some(mobile) = patch.mobile_number.as_deref() {
            if t.live_mut(id).is_some() && t.mobile_taken(mobile, Some(id)) {
                return Err(AuthError::Conflict(MOBILE_IN_USE));
            }
        }
        let Some(user) = t.live_mut(id) else {
            return Ok(None);
        };
        patch.apply(user);
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn soft_delete(&self, id: i64, now: OffsetDateTime) -> anyhow::Result<bool> {
        let mut t = self.table.lock().await;
        let Some(user) = t.live_mut(id) else {
            return Ok(false);
        };
        user.deleted_at = Some(now);
        user.session = None;
        user.updated_at = now;
        Ok(true)
    }

    async fn sweep_expired(&self, now: OffsetDateTime) -> anyhow::Result<SweepStats> {
        let mut t = self.table.lock().await;
        let mut stats = SweepStats::default();
        for user in t.rows.values_mut() {
            if user.otp.as_ref().is_some_and(|c| c.expires_at < now) {
                user.otp = None;
                user.updated_at = now;
                stats.otps += 1;
            }
            if user.session.as_ref().is_some_and(|s| s.expires_at <= now) {
                user.session = None;
                user.updated_at = now;
                stats.sessions += 1;
            }
        }
        Ok(stats)
    }
}
