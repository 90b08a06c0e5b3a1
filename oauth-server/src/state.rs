use crate::auth::{Gate, LoginService, Passwords, SessionManager};
use crate::cache::Cache;
use crate::config::Settings;
use crate::lock::LockManager;
use crate::oauth::authorize::AuthorizationCodeIssuer;
use crate::oauth::introspect::IntrospectionService;
use crate::oauth::revoke::RevocationService;
use crate::oauth::token::TokenService;
use crate::signing::SigningContexts;
use crate::store::{
    AccessTokenRepository, AuthorizationCodeRepository, ClientRepository, UserRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pool: SqlitePool,
    pub cache: Arc<Cache>,
    pub locks: Arc<LockManager>,
    pub clients: Arc<ClientRepository>,
    pub users: Arc<UserRepository>,
    pub sessions: SessionManager,
    pub login: LoginService,
    pub issuer: AuthorizationCodeIssuer,
    pub tokens: TokenService,
    pub revocation: RevocationService,
    pub introspection: IntrospectionService,
    pub gate: Gate,
}

impl AppState {
    /// Wires every component from the settings and the already opened backends
    pub fn new(
        settings: Settings,
        pool: SqlitePool,
        cache: Cache,
        locks: LockManager,
        passwords: Passwords,
    ) -> Self {
        let cache = Arc::new(cache);
        let locks = Arc::new(locks);
        let signing = SigningContexts::new(
            &settings.oauth.issuer,
            settings.oauth.signing_cache_capacity,
        );

        let clients = Arc::new(ClientRepository::new(
            pool.clone(),
            cache.clone(),
            signing.clone(),
        ));
        let users = Arc::new(UserRepository::new(
            pool.clone(),
            cache.clone(),
            locks.clone(),
            settings.subject.clone(),
            Duration::from_secs(settings.lock.ttl),
        ));
        let sessions = SessionManager::new(&settings.session);
        let login = LoginService::new(users.clone(), passwords, sessions.clone());

        let issuer = AuthorizationCodeIssuer::new(
            AuthorizationCodeRepository::new(pool.clone()),
            clients.clone(),
        );
        let tokens = TokenService::new(
            pool.clone(),
            issuer.clone(),
            clients.clone(),
            users.clone(),
            signing.clone(),
        );
        let introspection = IntrospectionService::new(
            AccessTokenRepository::new(pool.clone()),
            clients.clone(),
            users.clone(),
            signing.clone(),
        );
        let gate = Gate::new(
            AccessTokenRepository::new(pool.clone()),
            clients.clone(),
            signing,
            sessions.clone(),
        );

        Self {
            settings: Arc::new(settings),
            revocation: RevocationService::new(pool.clone()),
            pool,
            cache,
            locks,
            clients,
            users,
            sessions,
            login,
            issuer,
            tokens,
            introspection,
            gate,
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.settings.health_timeout)
    }
}
