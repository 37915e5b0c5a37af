use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::users::{NewUser, User, UserPatch, UserType};
use crate::validation;

/// Request body for `/create-user`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    #[serde(default)]
    pub user_type: UserType,
}

impl CreateUserRequest {
    pub fn to_new_user(&self) -> Result<NewUser, AuthError> {
        Ok(NewUser {
            name: validation::name(&self.name)?,
            mobile_number: validation::mobile(&self.mobile_number)?,
            email: validation::email(self.email.as_deref())?,
            user_type: self.user_type,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub message: String,
    /// 0 when nothing was created.
    pub user_id: i64,
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub user_type: UserType,
}

impl CreateUserResponse {
    pub fn created(user: &User) -> Self {
        Self {
            message: "User created successfully".into(),
            user_id: user.id,
            name: user.name.clone(),
            mobile_number: user.mobile_number.clone(),
            email: user.email.clone(),
            user_type: user.user_type,
        }
    }

    pub fn conflict(message: &str, req: &CreateUserRequest) -> Self {
        Self {
            message: message.into(),
            user_id: 0,
            name: req.name.clone(),
            mobile_number: req.mobile_number.clone(),
            email: req.email.clone(),
            user_type: req.user_type,
        }
    }
}

/// Request body for `PUT /users/:id`. Absent fields stay unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    pub fn to_patch(&self) -> Result<UserPatch, AuthError> {
        Ok(UserPatch {
            name: self.name.as_deref().map(validation::name).transpose()?,
            mobile_number: self
                .mobile_number
                .as_deref()
                .map(validation::mobile)
                .transpose()?,
            email: validation::email(self.email.as_deref())?,
            user_type: self.user_type,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserResponse {
    pub message: String,
    pub id: i64,
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub user_type: UserType,
    pub is_active: bool,
}

impl From<&User> for UpdateUserResponse {
    fn from(user: &User) -> Self {
        Self {
            message: "User updated successfully".into(),
            id: user.id,
            name: user.name.clone(),
            mobile_number: user.mobile_number.clone(),
            email: user.email.clone(),
            user_type: user.user_type,
            is_active: user.is_active,
        }
    }
}
