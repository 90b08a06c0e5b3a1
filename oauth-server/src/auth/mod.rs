//! Request authentication and authorization.

pub mod gate;
pub mod login;
pub mod password;
pub mod principal;
pub mod session;

pub use gate::{
    authenticate, require_resource_owner, require_role, require_scopes, Authenticate,
    BearerPolicy, Gate, OwnerParam, RequiredRole, RequiredScopes, RoutePolicy,
};
pub use login::LoginService;
pub use password::Passwords;
pub use principal::Principal;
pub use session::SessionManager;
