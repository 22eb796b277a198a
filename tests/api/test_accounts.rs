//! Login, logout, passwords, registration and federated sign-in.

use actix_web::test;
use serde_json::json;

use moztrap_lib::api::accounts::{
    ACCOUNT_ACTIVATED, ACTIVATION_FAILED, BROWSERID_FAILED, CHECK_EMAIL, PASSWORD_CHANGED,
    TOO_MANY_ATTEMPTS,
};
use moztrap_lib::db::users;
use moztrap_lib::forms::users::{INACTIVE_ACCOUNT, INVALID_LOGIN, UNKNOWN_EMAIL, USERNAME_TAKEN};

use super::helpers::*;

fn link_after<'a>(body: &'a str, prefix: &str) -> &'a str {
    let start = body.find(prefix).expect("link in mail") + prefix.len();
    let rest = &body[start..];
    &rest[..rest.find('\n').unwrap_or(rest.len())]
}

#[actix_rt::test]
async fn test_login_sets_session_and_redirects_to_next() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "alice", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/login",
        json!({ "username": "alice", "password": PASSWORD, "next": "/runtests/" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["redirect"], "/runtests/");
    assert_eq!(body["flavour"], "password");
    assert_eq!(body["user"]["username"], "alice");

    let cookie = login(&app, "alice").await;
    let (status, me) = get(&app, "/api/v1/users/me", &Auth::Session(cookie)).await;
    assert_eq!(status, 200);
    assert_eq!(me["username"], "alice");
    assert!(me["last_login"].is_string());
}

#[actix_rt::test]
async fn test_login_by_email_ignores_offsite_next() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "alice", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/login",
        json!({
            "username": "alice@example.com",
            "password": PASSWORD,
            "next": "http://elsewhere.example.com/",
        }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["redirect"], "/");
}

#[actix_rt::test]
async fn test_login_rejects_bad_password_and_inactive_user() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let bob = create_user(&ctx.pool, "bob", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/login",
        json!({ "username": "bob", "password": "wrong-password1" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(non_field_error(&body), INVALID_LOGIN);

    users::set_active(ctx.pool.connection(), bob.id, false)
        .await
        .unwrap();
    let (status, body) = post(
        &app,
        "/api/v1/users/login",
        json!({ "username": "bob", "password": PASSWORD }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(non_field_error(&body), INACTIVE_ACCOUNT);
}

#[actix_rt::test]
async fn test_login_requires_both_fields() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, body) = post(&app, "/api/v1/users/login", json!({}), &Auth::Anonymous).await;
    assert_eq!(status, 400);
    assert!(body["errors"]["username"].is_array());
    assert!(body["errors"]["password"].is_array());
}

#[actix_rt::test]
async fn test_login_attempts_are_throttled_per_username() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "carol", &[]).await;

    let attempt = json!({ "username": "carol", "password": "nope-nope1" });
    for _ in 0..ctx.config.login_attempts_per_minute {
        let (status, _) =
            post(&app, "/api/v1/users/login", attempt.clone(), &Auth::Anonymous).await;
        assert_eq!(status, 400);
    }

    let (status, body) = post(&app, "/api/v1/users/login", attempt, &Auth::Anonymous).await;
    assert_eq!(status, 429);
    assert!(body["message"].as_str().unwrap().contains(TOO_MANY_ATTEMPTS));

    create_user(&ctx.pool, "dave", &[]).await;
    login(&app, "dave").await;
}

#[actix_rt::test]
async fn test_logout_clears_cookie_and_points_at_login() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/users/logout")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let cleared = resp
        .response()
        .cookies()
        .find(|c| c.name() == "mt_session")
        .expect("cookie reset");
    assert_eq!(cleared.value(), "");
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["redirect"], "/users/login/");
}

#[actix_rt::test]
async fn test_me_is_null_when_anonymous() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, body) = get(&app, "/api/v1/users/me", &Auth::Anonymous).await;
    assert_eq!(status, 200);
    assert!(body.is_null());
}

#[actix_rt::test]
async fn test_password_change() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "erin", &[]).await;
    let session = Auth::Session(login(&app, "erin").await);

    let (status, body) = post(
        &app,
        "/api/v1/users/password/change",
        json!({
            "old_password": "not-my-password1",
            "new_password1": "fresh-pass42",
            "new_password2": "fresh-pass42",
        }),
        &session,
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["errors"]["old_password"].is_array());

    let (status, body) = post(
        &app,
        "/api/v1/users/password/change",
        json!({
            "old_password": PASSWORD,
            "new_password1": "fresh-pass42",
            "new_password2": "fresh-pass42",
        }),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["messages"][0]["level"], "success");
    assert_eq!(body["messages"][0]["text"], PASSWORD_CHANGED);

    let (status, _) = post(
        &app,
        "/api/v1/users/login",
        json!({ "username": "erin", "password": "fresh-pass42" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200);
}

#[actix_rt::test]
async fn test_password_change_requires_login() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, _) = post(
        &app,
        "/api/v1/users/password/change",
        json!({}),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_password_reset_round_trip() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let frank = create_user(&ctx.pool, "frank", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/password/reset",
        json!({ "email": "nobody@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["errors"]["email"][0], UNKNOWN_EMAIL);

    let (status, _) = post(
        &app,
        "/api/v1/users/password/reset",
        json!({ "email": "frank@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200);

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "frank@example.com");
    let link = link_after(&sent[0].body, "/users/password/reset/");
    let (uid, token) = link.trim_end_matches('/').split_once('/').unwrap();
    assert_eq!(uid, frank.id.to_string());

    let uri = format!("/api/v1/users/password/reset/{}/{}", uid, token);
    let new_password = json!({ "new_password1": "reset-pass9", "new_password2": "reset-pass9" });
    let (status, body) = post(&app, &uri, new_password.clone(), &Auth::Anonymous).await;
    assert_eq!(status, 200, "{}", body);

    // The link is spent once the password changes.
    let (status, _) = post(&app, &uri, new_password, &Auth::Anonymous).await;
    assert_eq!(status, 400);

    let (status, _) = post(
        &app,
        "/api/v1/users/login",
        json!({ "username": "frank", "password": "reset-pass9" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200);
}

#[actix_rt::test]
async fn test_password_reset_rejects_garbage_link() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/password/reset/not-a-uuid/whatever",
        json!({ "new_password1": "reset-pass9", "new_password2": "reset-pass9" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["errors"]["__all__"].is_array());
}

#[actix_rt::test]
async fn test_register_then_activate() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/register",
        json!({
            "username": "grace",
            "email": "grace@example.com",
            "password1": "hopper123",
            "password2": "hopper123",
        }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 201, "{}", body);
    assert_eq!(body["messages"][0]["text"], CHECK_EMAIL);

    // Not active until the mailed key is used.
    let (status, _) = post(
        &app,
        "/api/v1/users/login",
        json!({ "username": "grace", "password": "hopper123" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 1);
    let key = link_after(&sent[0].body, "/users/activate/").trim_end_matches('/');
    assert_eq!(key.len(), 40);

    let (status, body) = get(
        &app,
        &format!("/api/v1/users/activate/{}", key),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["messages"][0]["text"], ACCOUNT_ACTIVATED);

    // A key works once.
    let (status, body) = get(
        &app,
        &format!("/api/v1/users/activate/{}", key),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains(ACTIVATION_FAILED));

    login_with(&app, "grace", "hopper123").await;
}

async fn login_with<S>(app: &S, username: &str, password: &str)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let (status, body) = post(
        app,
        "/api/v1/users/login",
        json!({ "username": username, "password": password }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
}

#[actix_rt::test]
async fn test_register_keeps_nothing_when_mail_fails() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let form = json!({
        "username": "grace",
        "email": "grace@example.com",
        "password1": "hopper123",
        "password2": "hopper123",
    });

    ctx.mailer.refuse(true);
    let (status, body) = post(&app, "/api/v1/users/register", form.clone(), &Auth::Anonymous).await;
    assert_eq!(status, 500, "{}", body);
    assert_eq!(body["error"], "MAIL_ERROR");
    assert!(users::find_by_username(ctx.pool.connection(), "grace")
        .await
        .unwrap()
        .is_none());

    // The username and email are still free once mail works again.
    ctx.mailer.refuse(false);
    let (status, body) = post(&app, "/api/v1/users/register", form, &Auth::Anonymous).await;
    assert_eq!(status, 201, "{}", body);
    assert_eq!(ctx.mailer.sent().len(), 1);
}

#[actix_rt::test]
async fn test_register_rejects_taken_username_and_weak_password() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "heidi", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/register",
        json!({
            "username": "heidi",
            "email": "other@example.com",
            "password1": "short",
            "password2": "short",
        }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["errors"]["username"][0], USERNAME_TAKEN);
    assert!(body["errors"]["password1"].is_array());
    assert!(ctx.mailer.sent().is_empty());
}

#[actix_rt::test]
async fn test_activate_rejects_unknown_key() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, _) = get(
        &app,
        &format!("/api/v1/users/activate/{}", "a".repeat(40)),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 400);
}

#[actix_rt::test]
async fn test_set_username() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "ivan", &[]).await;
    create_user(&ctx.pool, "judy", &[]).await;
    let session = Auth::Session(login(&app, "ivan").await);

    let (status, body) = post(
        &app,
        "/api/v1/users/set_username",
        json!({ "username": "judy" }),
        &session,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["errors"]["username"][0], USERNAME_TAKEN);

    let (status, body) = post(
        &app,
        "/api/v1/users/set_username",
        json!({ "username": "ivan2", "next": "/manage/" }),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["redirect"], "/manage/");

    let (_, me) = get(&app, "/api/v1/users/me", &session).await;
    assert_eq!(me["username"], "ivan2");
}

#[actix_rt::test]
async fn test_browserid_disabled_is_not_found() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, _) = post(
        &app,
        "/api/v1/users/browserid/verify",
        json!({ "assertion": "valid:someone@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_browserid_signs_in_existing_and_new_users() {
    let ctx = setup_with(|c| c.browserid.enabled = true).await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "mallory", &[]).await;

    let (_, info) = get(&app, "/api/v1/users/login", &Auth::Anonymous).await;
    assert_eq!(info["flavour"], "browserid");

    let (status, body) = post(
        &app,
        "/api/v1/users/browserid/verify",
        json!({ "assertion": "valid:mallory@example.com", "next": "/runtests/" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["user"]["username"], "mallory");
    assert_eq!(body["redirect"], "/runtests/");

    let (status, body) = post(
        &app,
        "/api/v1/users/browserid/verify",
        json!({ "assertion": "valid:newcomer@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert!(body["user"]["username"].as_str().unwrap().starts_with(":auto:"));
    assert_eq!(body["user"]["email"], "newcomer@example.com");
}

#[actix_rt::test]
async fn test_browserid_failure_redirects_to_login() {
    let ctx = setup_with(|c| {
        c.browserid.enabled = true;
        c.browserid.create_user = false;
    })
    .await;
    let app = create_test_app(&ctx).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/browserid/verify",
        json!({ "assertion": "valid:stranger@example.com", "next": "/runs/" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["redirect"], "/users/login/?next=/runs/");
    assert_eq!(body["messages"][0]["level"], "error");
    assert_eq!(body["messages"][0]["text"], BROWSERID_FAILED);

    let (status, _) = post(
        &app,
        "/api/v1/users/browserid/verify",
        json!({ "assertion": "forged" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_openid_creates_account_with_free_username() {
    let ctx = setup_with(|c| c.openid.enabled = true).await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "peggy", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/openid/complete",
        json!({ "id_token": "sub-1|peggy|peggy.o@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["user"]["username"], "peggy2");

    // The same identity logs back into the same account.
    let (status, again) = post(
        &app,
        "/api/v1/users/openid/complete",
        json!({ "id_token": "sub-1|peggy|peggy.o@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(again["user"]["id"], body["user"]["id"]);
}

#[actix_rt::test]
async fn test_openid_never_duplicates_an_email() {
    let ctx = setup_with(|c| c.openid.enabled = true).await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "quinn", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/users/openid/complete",
        json!({ "id_token": "sub-3|quinny|quinn@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 401, "{}", body);
    assert!(body["message"].as_str().unwrap().contains("(quinn@example.com)"));
    assert!(users::find_by_username(ctx.pool.connection(), "quinny")
        .await
        .unwrap()
        .is_none());

    // A known identity reporting someone else's email keeps its own.
    let (status, body) = post(
        &app,
        "/api/v1/users/openid/complete",
        json!({ "id_token": "sub-4|rex|rex@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    let (status, body) = post(
        &app,
        "/api/v1/users/openid/complete",
        json!({ "id_token": "sub-4|rex|quinn@example.com" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["user"]["email"], "rex@example.com");
}

#[actix_rt::test]
async fn test_openid_rejects_bad_token_and_missing_attributes() {
    let ctx = setup_with(|c| {
        c.openid.enabled = true;
        c.openid.required_fields = vec!["email".to_string()];
    })
    .await;
    let app = create_test_app(&ctx).await;

    let (status, _) = post(
        &app,
        "/api/v1/users/openid/complete",
        json!({ "id_token": "garbage" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 401);

    let (status, body) = post(
        &app,
        "/api/v1/users/openid/complete",
        json!({ "id_token": "sub-2|victor|" }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 401);
    assert!(body["message"].as_str().unwrap().contains("(email)"));
}
