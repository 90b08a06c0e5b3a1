use crate::auth::Principal;
use crate::errors::OAuthError;
use crate::models::User;
use crate::store::{UserLookup, UserQuery};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Profile claims released to a client holding the `profile` scope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UserInfo {
    /// Public subject identifier, never the internal user id
    pub sub: String,
    pub nickname: String,
    pub picture: String,
    pub updated_at: i64,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            sub: user.subject,
            nickname: user.nickname,
            picture: user.avatar,
            updated_at: user.updated_at,
        }
    }
}

/// Claims of the user a bearer principal acts for
pub async fn userinfo(
    users: &dyn UserLookup,
    principal: &Principal,
) -> Result<UserInfo, OAuthError> {
    let user_id = principal
        .user_id
        .ok_or_else(|| OAuthError::Forbidden("token is not bound to a user".to_string()))?;
    users
        .find_user(&UserQuery::by_id(user_id))
        .await?
        .map(UserInfo::from)
        .ok_or_else(|| OAuthError::NotFound("user not found".to_string()))
}
