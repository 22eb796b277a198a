//! Shared helpers: an in-memory app with fake identity providers and a
//! mailer that keeps what it sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use actix_web::cookie::Cookie;
use actix_web::{App, dev::ServiceResponse, test, web};
use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use moztrap_lib::api;
use moztrap_lib::auth::AdminKey;
use moztrap_lib::auth::backends::OpenIdResponse;
use moztrap_lib::auth::password::hash_password;
use moztrap_lib::auth::session::SESSION_COOKIE;
use moztrap_lib::auth::throttle::LoginThrottle;
use moztrap_lib::config::{ADMIN_KEY_HEADER, API_KEY_HEADER, Config, defaults};
use moztrap_lib::db::{DbPool, library, products, roles, users};
use moztrap_lib::error::{AppError, AppResult};
use moztrap_lib::models::User;
use moztrap_lib::models::library::NewStep;
use moztrap_lib::models::status::ObjectStatus;
use moztrap_lib::models::user::NewUser;
use moztrap_lib::services::browserid::BrowserIdVerifier;
use moztrap_lib::services::mailer::Mailer;
use moztrap_lib::services::openid::OpenIdVerifier;
use moztrap_lib::services::{BrowserIdHandle, MailerHandle, OpenIdHandle};

pub const ADMIN_KEY: &str = defaults::DEV_ADMIN_KEY;
pub const PASSWORD: &str = "sekrit123";

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    refusing: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every following send fail, or succeed again.
    pub fn refuse(&self, refuse: bool) {
        self.refusing.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(AppError::Mail(format!("refused mail to {}", to)));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Accepts assertions of the form `valid:<email>`.
struct FakeBrowserId;

#[async_trait]
impl BrowserIdVerifier for FakeBrowserId {
    async fn verify(&self, assertion: &str, _audience: &str) -> AppResult<Option<String>> {
        Ok(assertion.strip_prefix("valid:").map(str::to_string))
    }
}

/// Accepts tokens of the form `<subject>|<nickname>|<email>`.
struct FakeOpenId;

#[async_trait]
impl OpenIdVerifier for FakeOpenId {
    async fn verify(&self, id_token: &str) -> AppResult<OpenIdResponse> {
        let parts: Vec<&str> = id_token.split('|').collect();
        let [subject, nickname, email] = parts.as_slice() else {
            return Err(AppError::Unauthorized("OpenID token rejected".to_string()));
        };
        Ok(OpenIdResponse {
            identity_url: format!("https://id.example.com#{}", subject),
            display_id: email.to_string(),
            nickname: Some(nickname.to_string()).filter(|n| !n.is_empty()),
            email: Some(email.to_string()).filter(|e| !e.is_empty()),
            ..Default::default()
        })
    }
}

/// A fresh database plus the pieces an app is built from.
pub struct TestContext {
    pub pool: DbPool,
    pub config: Config,
    pub mailer: Arc<RecordingMailer>,
}

pub async fn setup() -> TestContext {
    setup_with(|_| {}).await
}

pub async fn setup_with(configure: impl FnOnce(&mut Config)) -> TestContext {
    let mut config = Config::for_tests();
    configure(&mut config);
    let pool = DbPool::new(&config).await.expect("in-memory database");
    pool.run_migrations().await.expect("migrations");
    TestContext {
        pool,
        config,
        mailer: Arc::new(RecordingMailer::default()),
    }
}

pub async fn create_test_app(
    ctx: &TestContext,
) -> impl actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>
{
    test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.pool.clone()))
            .app_data(web::Data::new(ctx.config.clone()))
            .app_data(web::Data::new(AdminKey::new(ctx.config.admin_key.clone())))
            .app_data(web::Data::new(LoginThrottle::new(
                ctx.config.login_attempts_per_minute,
            )))
            .app_data(web::Data::new(MailerHandle(ctx.mailer.clone())))
            .app_data(web::Data::new(BrowserIdHandle(Arc::new(FakeBrowserId))))
            .app_data(web::Data::new(OpenIdHandle(Arc::new(FakeOpenId))))
            .configure(api::configure_routes),
    )
    .await
}

/// How a request authenticates.
#[derive(Clone)]
pub enum Auth {
    Anonymous,
    Admin,
    Key(String),
    Session(Cookie<'static>),
}

impl Auth {
    fn apply(&self, req: test::TestRequest) -> test::TestRequest {
        match self {
            Auth::Anonymous => req,
            Auth::Admin => req.insert_header((ADMIN_KEY_HEADER, ADMIN_KEY)),
            Auth::Key(key) => req.insert_header((API_KEY_HEADER, key.as_str())),
            Auth::Session(cookie) => req.cookie(cookie.clone()),
        }
    }
}

/// Send a request and return the status with the JSON body (null when empty).
pub async fn send<S>(app: &S, req: test::TestRequest, auth: &Auth) -> (u16, Value)
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let resp = test::call_service(app, auth.apply(req).to_request()).await;
    let status = resp.status().as_u16();
    let body = test::read_body(resp).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get<S>(app: &S, uri: &str, auth: &Auth) -> (u16, Value)
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    send(app, test::TestRequest::get().uri(uri), auth).await
}

pub async fn post<S>(app: &S, uri: &str, body: Value, auth: &Auth) -> (u16, Value)
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    send(app, test::TestRequest::post().uri(uri).set_json(body), auth).await
}

pub async fn put<S>(app: &S, uri: &str, body: Value, auth: &Auth) -> (u16, Value)
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    send(app, test::TestRequest::put().uri(uri).set_json(body), auth).await
}

/// Active user with `PASSWORD`, holding a role with the given permissions.
pub async fn create_user(pool: &DbPool, username: &str, permissions: &[&str]) -> User {
    let hash = hash_password(PASSWORD, 4).await.unwrap();
    let user = users::create(
        pool.connection(),
        NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: Some(hash),
            is_active: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    if !permissions.is_empty() {
        let permissions: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
        let role = roles::create(pool.connection(), &format!("{} role", username), &permissions)
            .await
            .unwrap();
        roles::add_user(pool.connection(), user.id, role.id)
            .await
            .unwrap();
    }
    user
}

/// Log in with a password and return the session cookie.
pub async fn login<S>(app: &S, username: &str) -> Cookie<'static>
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "username": username, "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status().as_u16(), 200, "login as {} failed", username);
    resp.response()
        .cookies()
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.into_owned())
        .expect("session cookie")
}

/// Issue an API key for `user_id` through the admin key.
pub async fn api_key_for<S>(app: &S, user_id: Uuid) -> String
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let (status, body) = post(
        app,
        &format!("/api/v1/manage/users/{}/apikeys", user_id),
        json!({}),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 201, "{}", body);
    body["key"].as_str().unwrap().to_string()
}

/// A product with one version in two environments, two active cases with
/// two steps each, and a suite holding both cases.
pub struct Library {
    pub product_id: Uuid,
    pub version_id: Uuid,
    pub environment_ids: Vec<Uuid>,
    pub case_ids: Vec<Uuid>,
    pub caseversion_ids: Vec<Uuid>,
    pub suite_id: Uuid,
}

pub async fn seed_library(pool: &DbPool) -> Library {
    let db = pool.connection();
    let linux = products::create_environment(db, "Linux").await.unwrap();
    let windows = products::create_environment(db, "Windows").await.unwrap();
    let product = products::create_product(db, "Firefox", "The browser")
        .await
        .unwrap();
    let version = products::create_version(db, product.id, "10", "", &[linux.id, windows.id])
        .await
        .unwrap();

    let mut case_ids = Vec::new();
    let mut caseversion_ids = Vec::new();
    for name in ["Open a tab", "Close a tab"] {
        let case_id = library::create_case(db, product.id).await.unwrap();
        let cv = library::create_case_version(
            db,
            case_id,
            version.id,
            name,
            "",
            ObjectStatus::Active,
            &[
                NewStep {
                    instruction: "Press the shortcut".to_string(),
                    expected: "Something happens".to_string(),
                },
                NewStep {
                    instruction: "Look at the tab strip".to_string(),
                    expected: "It changed".to_string(),
                },
            ],
        )
        .await
        .unwrap();
        case_ids.push(case_id);
        caseversion_ids.push(cv.id);
    }

    let suite = library::create_suite(db, product.id, "Tabs", "", ObjectStatus::Active, &case_ids)
        .await
        .unwrap();

    Library {
        product_id: product.id,
        version_id: version.id,
        environment_ids: vec![linux.id, windows.id],
        case_ids,
        caseversion_ids,
        suite_id: suite.id,
    }
}

/// Create a draft run over the library's suite through the admin key.
pub async fn create_run<S>(app: &S, lib: &Library, name: &str) -> Value
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let (status, body) = post(
        app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": name,
            "start": "2026-01-05",
            "suites": [lib.suite_id.to_string()],
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 201, "{}", body);
    body
}

/// Create and activate a run; returns its id.
pub async fn active_run<S>(app: &S, lib: &Library) -> Uuid
where
    S: actix_web::dev::Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let run = create_run(app, lib, "Smoke").await;
    let id: Uuid = run["id"].as_str().unwrap().parse().unwrap();
    let (status, body) = post(
        app,
        &format!("/api/v1/manage/runs/{}/activate", id),
        json!({}),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    id
}

/// First non-field error message of a validation response.
pub fn non_field_error(body: &Value) -> &str {
    body["errors"]["__all__"][0].as_str().unwrap_or("")
}
