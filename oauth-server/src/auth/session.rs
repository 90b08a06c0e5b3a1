//! Cookie sessions: an HS256 JWT carrying the user id and role

use crate::config::SessionConfig;
use crate::models::{now_ts, User};
use crate::signing::SigningError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Clone)]
pub struct SessionManager {
    cookie_name: String,
    ttl: i64,
    keys: Arc<Keys>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            cookie_name: config.cookie_name.clone(),
            ttl: config.ttl as i64,
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(config.secret.as_bytes()),
                decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            }),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Session lifetime in seconds
    pub fn ttl(&self) -> i64 {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> Result<String, SigningError> {
        let now = now_ts();
        let claims = SessionClaims {
            sub: user.id.to_string(),
            role: user.role.clone(),
            iat: now,
            exp: now + self.ttl,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(SigningError::Encode)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SigningError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        decode::<SessionClaims>(token, &self.keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(SigningError::Invalid)
    }
}
