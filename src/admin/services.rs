use tracing::{info, warn};

use super::dto::{CreateUserRequest, UpdateUserRequest};
use crate::config::BootstrapAdmin;
use crate::error::AuthError;
use crate::state::AppState;
use crate::users::{NewUser, PublicUser, User, UserType};

pub const MOBILE_EXISTS: &str = "User with this mobile number already exists";
const USER_NOT_FOUND: &str = "User not found";

/// Which admin operation is being attempted; picks the refusal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Create,
    List,
    Update,
    Delete,
}

impl AdminAction {
    fn denied(self) -> &'static str {
        match self {
            AdminAction::Create => "Only admins can create users",
            AdminAction::List => "Only admins can view users",
            AdminAction::Update => "Only admins can update users",
            AdminAction::Delete => "Only admins can delete users",
        }
    }
}

/// Re-reads the caller on every call so demotion, deactivation or deletion
/// takes effect immediately, whatever the token says.
pub async fn require_admin(
    st: &AppState,
    caller_mobile: &str,
    action: AdminAction,
) -> Result<User, AuthError> {
    match st.store.find_by_mobile(caller_mobile).await? {
        Some(caller) if caller.is_admin() && caller.is_active => Ok(caller),
        _ => {
            warn!(?action, "admin capability check failed");
            Err(AuthError::Forbidden(action.denied()))
        }
    }
}

/// Payloads are validated only after the capability check, so a non-admin
/// always sees `Forbidden`.
pub async fn create_user(
    st: &AppState,
    req: &CreateUserRequest,
    caller_mobile: &str,
) -> Result<User, AuthError> {
    let caller = require_admin(st, caller_mobile, AdminAction::Create).await?;
    let new = req.to_new_user()?;

    if st.store.find_by_mobile(&new.mobile_number).await?.is_some() {
        warn!(caller_id = caller.id, "create user: mobile number taken");
        return Err(AuthError::Conflict(MOBILE_EXISTS));
    }

    // the store's uniqueness guard still decides races between the check and the insert
    let user = match st.store.insert(&new, st.clock.now()).await {
        Err(AuthError::Conflict(_)) => return Err(AuthError::Conflict(MOBILE_EXISTS)),
        other => other?,
    };
    info!(caller_id = caller.id, user_id = user.id, user_type = ?user.user_type, "user created");
    Ok(user)
}

pub async fn list_users(st: &AppState, caller_mobile: &str) -> Result<Vec<PublicUser>, AuthError> {
    require_admin(st, caller_mobile, AdminAction::List).await?;
    let users = st.store.list().await?;
    Ok(users.iter().map(PublicUser::from).collect())
}

pub async fn update_user(
    st: &AppState,
    id: i64,
    req: &UpdateUserRequest,
    caller_mobile: &str,
) -> Result<User, AuthError> {
    let caller = require_admin(st, caller_mobile, AdminAction::Update).await?;
    let patch = req.to_patch()?;
    let user = st
        .store
        .update(id, &patch, st.clock.now())
        .await?
        .ok_or(AuthError::NotFound(USER_NOT_FOUND))?;
    info!(caller_id = caller.id, user_id = user.id, "user updated");
    Ok(user)
}

/// Soft-deletes a user. Admins may not delete themselves.
pub async fn delete_user(st: &AppState, id: i64, caller_mobile: &str) -> Result<(), AuthError> {
    let caller = require_admin(st, caller_mobile, AdminAction::Delete).await?;

    if st.store.find_by_id(id).await?.is_none() {
        return Err(AuthError::NotFound(USER_NOT_FOUND));
    }
    if id == caller.id {
        warn!(caller_id = caller.id, "admin tried to delete own account");
        return Err(AuthError::Forbidden("You cannot delete your own account"));
    }

    if !st.store.soft_delete(id, st.clock.now()).await? {
        return Err(AuthError::NotFound(USER_NOT_FOUND));
    }
    info!(caller_id = caller.id, user_id = id, "user soft-deleted");
    Ok(())
}

/// Creates the configured first admin unless a live user already holds the
/// number. Returns whether a row was inserted.
pub async fn bootstrap_admin(st: &AppState, admin: &BootstrapAdmin) -> anyhow::Result<bool> {
    if st.store.find_by_mobile(&admin.mobile_number).await?.is_some() {
        return Ok(false);
    }
    let new = NewUser {
        name: admin.name.clone(),
        mobile_number: admin.mobile_number.clone(),
        email: None,
        user_type: UserType::Admin,
    };
    match st.store.insert(&new, st.clock.now()).await {
        Ok(user) => {
            info!(user_id = user.id, "bootstrap admin created");
            Ok(true)
        }
        Err(AuthError::Conflict(_)) => Ok(false),
        Err(AuthError::Internal(e)) => Err(e),
        Err(other) => Err(anyhow::anyhow!(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::otp;
    use crate::state::testing::Harness;
    use crate::users::{UserPatch, UserStore};
    use time::Duration;

    const ADMIN: &str = "9000000001";
    const REGULAR: &str = "9000000002";

    fn new_user(mobile: &str) -> CreateUserRequest {
        CreateUserRequest {
            name: "Kiran".into(),
            mobile_number: mobile.into(),
            email: Some("Kiran@Example.com".into()),
            user_type: UserType::RegularUser,
        }
    }

    async fn harness() -> (Harness, User, User) {
        let h = Harness::new();
        let admin = h.seed("Admin", ADMIN, UserType::Admin).await;
        let regular = h.seed("Regular", REGULAR, UserType::RegularUser).await;
        (h, admin, regular)
    }

    #[tokio::test]
    async fn create_twice_conflicts_without_new_row() {
        let (h, _, _) = harness().await;
        let created = create_user(&h.state, &new_user("1112223333"), ADMIN).await.unwrap();
        assert!(created.id > 0);
        assert!(created.is_active);
        let rows = h.store.len().await;

        let err = create_user(&h.state, &new_user("1112223333"), ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(MOBILE_EXISTS)));
        assert_eq!(h.store.len().await, rows);
    }

    #[tokio::test]
    async fn non_admin_is_forbidden_everywhere() {
        let (h, admin, regular) = harness().await;

        let results = [
            create_user(&h.state, &new_user("1112223333"), REGULAR).await.err(),
            list_users(&h.state, REGULAR).await.err(),
            update_user(&h.state, regular.id, &UpdateUserRequest::default(), REGULAR).await.err(),
            delete_user(&h.state, admin.id, REGULAR).await.err(),
            list_users(&h.state, "0000000000").await.err(),
        ];
        for err in results {
            assert!(matches!(err, Some(AuthError::Forbidden(_))));
        }
        assert!(h.store.find_by_mobile("1112223333").await.unwrap().is_none());
        assert!(h.store.find_by_id(admin.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn non_admin_with_invalid_payload_is_still_forbidden() {
        let (h, _, regular) = harness().await;
        let bad_create = CreateUserRequest {
            name: "  ".into(),
            mobile_number: "not-a-number".into(),
            email: Some("nope".into()),
            user_type: UserType::Admin,
        };
        assert!(matches!(
            create_user(&h.state, &bad_create, REGULAR).await,
            Err(AuthError::Forbidden(_))
        ));

        let bad_update = UpdateUserRequest {
            mobile_number: Some("abc".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_user(&h.state, regular.id, &bad_update, REGULAR).await,
            Err(AuthError::Forbidden(_))
        ));

        // admins get the validation error instead
        assert!(matches!(
            create_user(&h.state, &bad_create, ADMIN).await,
            Err(AuthError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn demotion_takes_effect_immediately() {
        let (h, admin, _) = harness().await;
        assert!(list_users(&h.state, ADMIN).await.is_ok());

        let demote = UserPatch {
            user_type: Some(UserType::RegularUser),
            ..Default::default()
        };
        h.store.update(admin.id, &demote, h.state.clock.now()).await.unwrap();
        assert!(matches!(
            list_users(&h.state, ADMIN).await,
            Err(AuthError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_skips_deleted() {
        let (h, admin, regular) = harness().await;
        h.clock.advance(Duration::seconds(5));
        let newest = create_user(&h.state, &new_user("1112223333"), ADMIN).await.unwrap();

        let ids: Vec<i64> = list_users(&h.state, ADMIN).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids[0], newest.id);
        assert_eq!(ids.len(), 3);

        delete_user(&h.state, regular.id, ADMIN).await.unwrap();
        let ids: Vec<i64> = list_users(&h.state, ADMIN).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![newest.id, admin.id]);
    }

    #[tokio::test]
    async fn update_applies_partial_patch() {
        let (h, _, regular) = harness().await;
        h.clock.advance(Duration::seconds(10));
        let patch = UpdateUserRequest {
            name: Some("Renamed".into()),
            is_active: Some(false),
            ..Default::default()
        };
        let updated = update_user(&h.state, regular.id, &patch, ADMIN).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.mobile_number, REGULAR);
        assert!(!updated.is_active);
        assert_eq!(updated.updated_at, regular.updated_at + Duration::seconds(10));
    }

    #[tokio::test]
    async fn update_rejects_taken_mobile_and_unknown_target() {
        let (h, admin, regular) = harness().await;
        let clash = UpdateUserRequest {
            mobile_number: Some(ADMIN.into()),
            ..Default::default()
        };
        assert!(matches!(
            update_user(&h.state, regular.id, &clash, ADMIN).await,
            Err(AuthError::Conflict(_))
        ));

        // keeping your own number is not a conflict
        let same = UpdateUserRequest {
            mobile_number: Some(ADMIN.into()),
            ..Default::default()
        };
        assert!(update_user(&h.state, admin.id, &same, ADMIN).await.is_ok());

        assert!(matches!(
            update_user(&h.state, 4242, &UpdateUserRequest::default(), ADMIN).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn admin_cannot_delete_self() {
        let (h, admin, _) = harness().await;
        let before = h.store.find_by_id(admin.id).await.unwrap().unwrap();
        assert!(matches!(
            delete_user(&h.state, admin.id, ADMIN).await,
            Err(AuthError::Forbidden(_))
        ));
        let after = h.store.find_by_id(admin.id).await.unwrap().unwrap();
        assert_eq!(after.updated_at, before.updated_at);
        assert!(!after.is_deleted());
    }

    #[tokio::test]
    async fn delete_unknown_or_already_deleted_is_not_found() {
        let (h, _, regular) = harness().await;
        assert!(matches!(
            delete_user(&h.state, 4242, ADMIN).await,
            Err(AuthError::NotFound(_))
        ));
        delete_user(&h.state, regular.id, ADMIN).await.unwrap();
        assert!(matches!(
            delete_user(&h.state, regular.id, ADMIN).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_user_loses_session_and_cannot_request_otp() {
        let (h, _, regular) = harness().await;
        let login = h.login(REGULAR).await;

        delete_user(&h.state, regular.id, ADMIN).await.unwrap();

        let raw = h.store.raw(regular.id).await.unwrap();
        assert!(raw.is_deleted());
        assert!(raw.session.is_none());
        assert!(h.store.find_by_session(&login.session_id).await.unwrap().is_none());
        assert!(matches!(
            otp::request_otp(&h.state, REGULAR).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn bootstrap_creates_first_admin_once() {
        let h = Harness::new();
        let cfg = BootstrapAdmin {
            mobile_number: ADMIN.into(),
            name: "Root".into(),
        };
        assert!(bootstrap_admin(&h.state, &cfg).await.unwrap());
        assert!(!bootstrap_admin(&h.state, &cfg).await.unwrap());
        let admin = h.store.find_by_mobile(ADMIN).await.unwrap().unwrap();
        assert!(admin.is_admin());
        assert!(admin.is_active);
    }
}
