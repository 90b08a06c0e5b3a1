//! OAuth 2.0 authorization and token lifecycle.
//!
//! - [`authorize`]: authorization code issuance and single-use redemption
//! - [`token`]: code and refresh token exchange, with refresh rotation
//! - [`revoke`]: RFC 7009 revocation with refresh to access cascade
//! - [`introspect`]: RFC 7662 introspection
//! - [`userinfo`]: profile claims for a bearer user

pub mod authorize;
pub mod client_auth;
pub mod introspect;
pub mod revoke;
pub mod scope;
pub mod token;
pub mod userinfo;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// 32 random bytes, base64url encoded without padding
pub(crate) fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
