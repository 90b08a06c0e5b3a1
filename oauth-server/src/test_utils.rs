use crate::auth::Passwords;
use crate::cache::{memory::InMemoryCache, Cache};
use crate::config::Settings;
use crate::create_app;
use crate::headers::BasicCredentials;
use crate::lock::{memory::InMemoryLocks, LockManager};
use crate::models::{OAuthClient, User, ROLE_ADMIN, ROLE_USER};
use crate::state::AppState;
use crate::store::clients::tests::sample_client;
use crate::store::tests::test_pool;
use crate::store::NewUser;
use axum::body::{Body, Bytes};
use axum::Router;
use http::header::{AsHeaderName, AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

/// Redirect URI registered for the seeded client
pub const CALLBACK: &str = "https://app/cb";

/// Test fixture wiring the real router over an isolated in-memory database,
/// an in-memory cache and in-memory locks.
///
/// The database is seeded with client `c1` (see `sample_client`), user `42`
/// (`alice`) and admin `43` (`root`). Passwords are `<username>-password`.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let code = fixture.issue_code("profile").await;
///
///     let response = fixture.exchange_code(&code).await;
///     response.assert_status(StatusCode::OK);
///     let tokens = response.json_as::<TokenResponse>();
///     assert_eq!(tokens.scope, "profile");
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// The state behind the router, for direct database and repository access
    pub state: AppState,
    /// Configuration settings
    pub settings: Settings,
    pub client: OAuthClient,
    pub user: User,
    pub admin: User,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let settings = Settings::for_test();
        let pool = test_pool().await;
        // user ids start at 42
        sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES ('users', 41)")
            .execute(&pool)
            .await
            .expect("Failed to seed user id sequence");

        let cache = Cache::InMemory(
            InMemoryCache::new(settings.cache.ttl, settings.cache.memory.capacity)
                .expect("Failed to create cache"),
        );
        let passwords = Passwords::new(&settings.password).expect("Failed to set up passwords");
        let state = AppState::new(
            settings.clone(),
            pool,
            cache,
            LockManager::InMemory(InMemoryLocks::new()),
            passwords.clone(),
        );

        let client = state
            .clients
            .create(&sample_client("c1"))
            .await
            .expect("Failed to seed client");
        let user = state
            .users
            .create(&new_user(&passwords, "alice", ROLE_USER))
            .await
            .expect("Failed to seed user");
        let admin = state
            .users
            .create(&new_user(&passwords, "root", ROLE_ADMIN))
            .await
            .expect("Failed to seed admin");

        let app = create_app(state.clone());

        Self {
            app,
            state,
            settings,
            client,
            user,
            admin,
        }
    }

    /// Initializes the test logger. Called by [`TestFixture::new`]; call it first
    /// to pick another level.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Registers another client shaped like `c1`, with secret `<id>-secret`
    pub async fn add_client(&self, id: &str) -> OAuthClient {
        self.state
            .clients
            .create(&sample_client(id))
            .await
            .expect("Failed to create client")
    }

    /// Marks `user` as disabled directly in the database
    pub async fn disable(&self, user: &User) {
        sqlx::query("UPDATE users SET status = 0 WHERE id = ?")
            .bind(user.id)
            .execute(&self.state.pool)
            .await
            .expect("Failed to disable user");
    }

    /// Sends a JSON POST
    pub async fn post_json(&self, uri: impl AsRef<str>, body: &Value) -> TestResponse {
        let request = self
            .request_builder(Method::POST, uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// POST with a session cookie for `user`
    pub async fn post_as(&self, uri: impl AsRef<str>, user: &User) -> TestResponse {
        let request = self
            .request_builder(Method::POST, uri)
            .header(COOKIE, self.session_cookie(user))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// `Cookie` header value holding a session for `user`
    pub fn session_cookie(&self, user: &User) -> String {
        let token = self
            .state
            .sessions
            .issue(user)
            .expect("Failed to issue session");
        format!("{}={}", self.settings.session.cookie_name, token)
    }

    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder().method(method).uri(uri.as_ref())
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// GET with a session cookie for `user`
    pub async fn get_as(&self, uri: impl AsRef<str>, user: &User) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .header(COOKIE, self.session_cookie(user))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn get_with_bearer(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// DELETE with a session cookie for `user`
    pub async fn delete_as(&self, uri: impl AsRef<str>, user: &User) -> TestResponse {
        let request = self
            .request_builder(Method::DELETE, uri)
            .header(COOKIE, self.session_cookie(user))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn delete_with_bearer(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let request = self
            .request_builder(Method::DELETE, uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Builds a form POST, authenticated with HTTP Basic when `credentials`
    /// (client id, secret) are given
    pub fn form_request(
        &self,
        uri: impl AsRef<str>,
        form: &[(&str, &str)],
        credentials: Option<(&str, &str)>,
    ) -> Request<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let mut builder = self
            .request_builder(Method::POST, uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some((client_id, client_secret)) = credentials {
            let basic = BasicCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            };
            builder = builder.header(AUTHORIZATION, basic.encode());
        }
        builder.body(Body::from(body)).expect("Failed to build request")
    }

    pub async fn post_form(
        &self,
        uri: impl AsRef<str>,
        form: &[(&str, &str)],
        credentials: Option<(&str, &str)>,
    ) -> TestResponse {
        self.send(self.form_request(uri, form, credentials)).await
    }

    /// Token endpoint request authenticated as `c1`
    pub fn token_request(&self, form: &[(&str, &str)]) -> Request<Body> {
        self.form_request("/oauth/token", form, Some(("c1", "c1-secret")))
    }

    /// Runs the authorize endpoint as `alice` for `c1` and returns the code
    pub async fn issue_code(&self, scope: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", "c1")
            .append_pair("redirect_uri", CALLBACK)
            .append_pair("scope", scope)
            .finish();
        let response = self
            .get_as(format!("/oauth/authorize?{query}"), &self.user)
            .await;
        response.assert_status(StatusCode::SEE_OTHER);

        let location = response.header(LOCATION).expect("Missing Location header");
        Url::parse(location)
            .expect("Invalid Location header")
            .query_pairs()
            .find(|(name, _)| name == "code")
            .map(|(_, code)| code.into_owned())
            .unwrap_or_else(|| panic!("No code in redirect {location}"))
    }

    /// Redeems `code` at the token endpoint as `c1`
    pub async fn exchange_code(&self, code: &str) -> TestResponse {
        let request = self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", CALLBACK),
        ]);
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        Self::send_to(self.app.clone(), request).await
    }

    /// Sends through `app` without borrowing a fixture, for spawned tasks
    pub async fn send_to(app: Router, request: Request<Body>) -> TestResponse {
        let response = app.oneshot(request).await.expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Seeded user with password `<username>-password`
fn new_user(passwords: &Passwords, username: &str, role: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        password_hash: passwords
            .hash(&format!("{username}-password"))
            .expect("Failed to hash password"),
        nickname: format!("{username} nick"),
        avatar: format!("https://cdn/{username}.png"),
        role: role.to_string(),
    }
}

/// Response from a test request
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Body as JSON, `{}` when empty or not JSON
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|_| serde_json::json!({}))
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to deserialize response JSON")
    }

    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
