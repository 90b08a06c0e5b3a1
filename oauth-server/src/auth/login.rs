//! Username and password accounts: registration, and login answered with a
//! cookie session

use super::password::Passwords;
use super::session::SessionManager;
use crate::errors::OAuthError;
use crate::models::{User, ROLE_USER};
use crate::store::{NewUser, UserRepository};
use log::{debug, info};
use std::sync::Arc;

const INVALID_CREDENTIALS: &str = "invalid username or password";

/// A successful login
#[derive(Debug)]
pub struct Login {
    pub user: User,
    /// Session token for the session cookie
    pub session: String,
    pub expires_in: i64,
}

/// Self-service registration. The account always gets the `user` role.
#[derive(Debug)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub nickname: String,
    pub avatar: String,
}

#[derive(Clone)]
pub struct LoginService {
    users: Arc<UserRepository>,
    passwords: Passwords,
    sessions: SessionManager,
}

impl LoginService {
    pub fn new(users: Arc<UserRepository>, passwords: Passwords, sessions: SessionManager) -> Self {
        Self {
            users,
            passwords,
            sessions,
        }
    }

    /// Hashes the password and creates the user under the username lock. A
    /// taken username is an `InvalidRequest`.
    pub async fn register(&self, account: NewAccount) -> Result<User, OAuthError> {
        let password_hash = self.passwords.hash_blocking(account.password).await?;
        let user = self
            .users
            .create(&NewUser {
                username: account.username,
                password_hash,
                nickname: account.nickname,
                avatar: account.avatar,
                role: ROLE_USER.to_string(),
            })
            .await?;
        debug!("Registered user {} with role {}", user.id, user.role);
        Ok(user)
    }

    /// Checks the credentials and issues a session.
    ///
    /// Unknown users and wrong passwords get the same error. Disabled accounts
    /// are reported only once the password matched.
    pub async fn login(&self, username: &str, password: &str) -> Result<Login, OAuthError> {
        let Some((user, hash)) = self.users.credentials(username).await? else {
            debug!("Login attempt for unknown user {}", username);
            return Err(OAuthError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };
        if hash.is_empty() {
            debug!("User {} has no password and cannot log in", user.id);
            return Err(OAuthError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if !self
            .passwords
            .verify_blocking(password.to_string(), hash)
            .await?
        {
            debug!("Wrong password for user {}", user.id);
            return Err(OAuthError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        if !user.is_active() {
            info!("Rejected login of disabled user {}", user.id);
            return Err(OAuthError::Forbidden(
                "the account is disabled, contact an administrator".to_string(),
            ));
        }

        let session = self.sessions.issue(&user)?;
        info!("User {} ({}) logged in", user.id, user.username);
        Ok(Login {
            user,
            session,
            expires_in: self.sessions.ttl(),
        })
    }
}
