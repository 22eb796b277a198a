//! Users, roles, API keys, products and the case library.

use serde_json::json;
use uuid::Uuid;

use moztrap_lib::forms::users::EMAIL_TAKEN;
use moztrap_lib::models::user::perms;

use super::helpers::*;

#[actix_rt::test]
async fn test_manage_requires_credentials_and_permission() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let tester = create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let key = api_key_for(&app, tester.id).await;

    let (status, _) = get(&app, "/api/v1/manage/users", &Auth::Anonymous).await;
    assert_eq!(status, 401);

    let (status, body) = get(&app, "/api/v1/manage/users", &Auth::Key(key)).await;
    assert_eq!(status, 403, "{}", body);

    let (status, body) = get(
        &app,
        "/api/v1/manage/users",
        &Auth::Key("mt_not-a-real-key".to_string()),
    )
    .await;
    assert_eq!(status, 401, "{}", body);

    let req = actix_web::test::TestRequest::get()
        .uri("/api/v1/manage/users")
        .insert_header(("X-Admin-Key", "wrong"));
    let (status, _) = send(&app, req, &Auth::Anonymous).await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_create_list_and_delete_users() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "manager", &[perms::MANAGE_USERS]).await;
    let session = Auth::Session(login(&app, "manager").await);

    let (status, role) = post(
        &app,
        "/api/v1/manage/roles",
        json!({ "name": "Tester", "permissions": [perms::EXECUTE] }),
        &session,
    )
    .await;
    assert_eq!(status, 201, "{}", role);

    let (status, created) = post(
        &app,
        "/api/v1/manage/users",
        json!({
            "username": "newbie",
            "email": "newbie@example.com",
            "password": "newbie123",
            "roles": [role["id"]],
        }),
        &session,
    )
    .await;
    assert_eq!(status, 201, "{}", created);
    assert_eq!(created["is_active"], true);
    let newbie_id = created["id"].as_str().unwrap().to_string();

    let (status, detail) = get(
        &app,
        &format!("/api/v1/manage/users/{}", newbie_id),
        &session,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(detail["username"], "newbie");
    assert_eq!(detail["roles"][0]["name"], "Tester");

    let (status, listed) = get(&app, "/api/v1/manage/users?limit=10", &session).await;
    assert_eq!(status, 200);
    assert_eq!(listed["pagination"]["total"], 2);
    assert_eq!(listed["users"][0]["username"], "manager");
    assert_eq!(listed["users"][1]["username"], "newbie");

    let (status, body) = post(
        &app,
        "/api/v1/manage/users",
        json!({ "username": "newbie", "email": "again@example.com" }),
        &session,
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["errors"]["username"].is_array());

    let (status, _) = send(
        &app,
        actix_web::test::TestRequest::delete().uri(&format!("/api/v1/manage/users/{}", newbie_id)),
        &session,
    )
    .await;
    assert_eq!(status, 204);

    let (status, _) = get(
        &app,
        &format!("/api/v1/manage/users/{}", newbie_id),
        &session,
    )
    .await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_create_user_rejects_taken_email() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "alice", &[]).await;

    let (status, body) = post(
        &app,
        "/api/v1/manage/users",
        json!({ "username": "alice2", "email": "alice@example.com" }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 400, "{}", body);
    assert_eq!(body["errors"]["email"][0], EMAIL_TAKEN);

    let (_, listed) = get(&app, "/api/v1/manage/users", &Auth::Admin).await;
    assert_eq!(listed["pagination"]["total"], 1);
}

#[actix_rt::test]
async fn test_user_list_past_the_last_page_is_empty() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "alice", &[]).await;

    let (status, body) = get(
        &app,
        "/api/v1/manage/users?page=4294967295&limit=100",
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert!(body["users"].as_array().unwrap().is_empty());
    assert_eq!(body["pagination"]["total"], 1);
}

#[actix_rt::test]
async fn test_deactivated_user_loses_api_key_access() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let tester = create_user(&ctx.pool, "tester", &[]).await;
    let key = api_key_for(&app, tester.id).await;

    let (status, body) = get(&app, "/api/v1/manage/products", &Auth::Key(key.clone())).await;
    assert_eq!(status, 200, "{}", body);

    let (status, user) = post(
        &app,
        &format!("/api/v1/manage/users/{}/deactivate", tester.id),
        json!({}),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(user["is_active"], false);

    let (status, _) = get(&app, "/api/v1/manage/products", &Auth::Key(key)).await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_users_manage_their_own_api_keys() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let alice = create_user(&ctx.pool, "alice", &[]).await;
    let bob = create_user(&ctx.pool, "bob", &[]).await;
    let session = Auth::Session(login(&app, "alice").await);

    let (status, issued) = post(
        &app,
        &format!("/api/v1/manage/users/{}/apikeys", alice.id),
        json!({}),
        &session,
    )
    .await;
    assert_eq!(status, 201, "{}", issued);
    assert_eq!(issued["redirect"], format!("/manage/user/{}/", alice.id));
    let full_key = issued["key"].as_str().unwrap();
    assert!(full_key.starts_with(issued["key_prefix"].as_str().unwrap()));

    let (status, keys) = get(
        &app,
        &format!("/api/v1/manage/users/{}/apikeys", alice.id),
        &session,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(keys.as_array().unwrap().len(), 1);
    assert!(keys[0].get("key").is_none());

    let (status, _) = post(
        &app,
        &format!("/api/v1/manage/users/{}/apikeys", bob.id),
        json!({}),
        &session,
    )
    .await;
    assert_eq!(status, 403);

    let key_id = issued["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        actix_web::test::TestRequest::delete().uri(&format!("/api/v1/manage/apikeys/{}", key_id)),
        &session,
    )
    .await;
    assert_eq!(status, 204);

    let (status, _) = get(
        &app,
        "/api/v1/manage/products",
        &Auth::Key(full_key.to_string()),
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = send(
        &app,
        actix_web::test::TestRequest::delete()
            .uri(&format!("/api/v1/manage/apikeys/{}", Uuid::now_v7())),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_roles_reject_unknown_permissions_and_duplicates() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, body) = post(
        &app,
        "/api/v1/manage/roles",
        json!({ "name": "Odd", "permissions": ["core.fly"] }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("core.fly"));

    let (status, _) = post(
        &app,
        "/api/v1/manage/roles",
        json!({ "name": "Admin", "permissions": perms::ALL }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 201);

    let (status, _) = post(
        &app,
        "/api/v1/manage/roles",
        json!({ "name": "Admin", "permissions": [] }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 400);

    let (status, roles) = get(&app, "/api/v1/manage/roles", &Auth::Admin).await;
    assert_eq!(status, 200);
    assert_eq!(roles.as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_new_user_role_preference_applies_to_registration() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (_, role) = post(
        &app,
        "/api/v1/manage/roles",
        json!({ "name": "Tester", "permissions": [perms::EXECUTE] }),
        &Auth::Admin,
    )
    .await;

    let (status, _) = put(
        &app,
        "/api/v1/manage/preferences",
        json!({ "default_new_user_role": Uuid::now_v7() }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 404);

    let (status, prefs) = put(
        &app,
        "/api/v1/manage/preferences",
        json!({ "default_new_user_role": role["id"] }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200, "{}", prefs);
    assert_eq!(prefs["default_new_user_role"], role["id"]);

    let (status, _) = post(
        &app,
        "/api/v1/users/register",
        json!({
            "username": "rookie",
            "email": "rookie@example.com",
            "password1": "rookie123",
            "password2": "rookie123",
        }),
        &Auth::Anonymous,
    )
    .await;
    assert_eq!(status, 201);

    let (_, listed) = get(&app, "/api/v1/manage/users", &Auth::Admin).await;
    let rookie_id = listed["users"][0]["id"].as_str().unwrap().to_string();
    let (_, detail) = get(
        &app,
        &format!("/api/v1/manage/users/{}", rookie_id),
        &Auth::Admin,
    )
    .await;
    assert_eq!(detail["username"], "rookie");
    assert_eq!(detail["is_active"], false);
    assert_eq!(detail["roles"][0]["id"], role["id"]);
}

#[actix_rt::test]
async fn test_products_versions_and_environments() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    create_user(&ctx.pool, "pm", &[perms::MANAGE_PRODUCTS, perms::MANAGE_ENVIRONMENTS]).await;
    create_user(&ctx.pool, "viewer", &[]).await;
    let pm = Auth::Session(login(&app, "pm").await);
    let viewer = Auth::Session(login(&app, "viewer").await);

    let (status, _) = post(
        &app,
        "/api/v1/manage/products",
        json!({ "name": "Thunderbird" }),
        &viewer,
    )
    .await;
    assert_eq!(status, 403);

    let (status, env) = post(
        &app,
        "/api/v1/manage/environments",
        json!({ "name": "macOS" }),
        &pm,
    )
    .await;
    assert_eq!(status, 201, "{}", env);

    let (status, product) = post(
        &app,
        "/api/v1/manage/products",
        json!({ "name": "Thunderbird", "description": "Mail" }),
        &pm,
    )
    .await;
    assert_eq!(status, 201, "{}", product);
    let product_id = product["id"].as_str().unwrap();

    let (status, version) = post(
        &app,
        &format!("/api/v1/manage/products/{}/versions", product_id),
        json!({ "version": "3.0", "environments": [env["id"]] }),
        &pm,
    )
    .await;
    assert_eq!(status, 201, "{}", version);
    assert_eq!(version["environments"][0], env["id"]);

    let (status, versions) = get(
        &app,
        &format!("/api/v1/manage/products/{}/versions", product_id),
        &viewer,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(versions.as_array().unwrap().len(), 1);

    let (status, _) = get(
        &app,
        &format!("/api/v1/manage/products/{}", Uuid::now_v7()),
        &viewer,
    )
    .await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_cases_and_suites() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    create_user(&ctx.pool, "author", &[perms::MANAGE_CASES, perms::MANAGE_SUITES]).await;
    let author = Auth::Session(login(&app, "author").await);

    let (status, cv) = post(
        &app,
        "/api/v1/manage/cases",
        json!({
            "productversion": lib.version_id,
            "name": "Pin a tab",
            "status": "active",
            "steps": [
                { "instruction": "Right-click a tab", "expected": "A menu opens" },
                { "instruction": "Choose Pin" },
            ],
        }),
        &author,
    )
    .await;
    assert_eq!(status, 201, "{}", cv);
    assert_eq!(cv["steps"][0]["number"], 1);
    assert_eq!(cv["steps"][1]["number"], 2);
    assert_eq!(cv["steps"][1]["expected"], "");

    // One version of a case per product version.
    let (status, _) = post(
        &app,
        &format!("/api/v1/manage/cases/{}/versions", cv["case_id"].as_str().unwrap()),
        json!({ "productversion": lib.version_id, "name": "Pin a tab again" }),
        &author,
    )
    .await;
    assert_eq!(status, 400);

    let (status, fetched) = get(
        &app,
        &format!("/api/v1/manage/caseversions/{}", cv["id"].as_str().unwrap()),
        &author,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(fetched["name"], "Pin a tab");

    let (status, suite) = post(
        &app,
        "/api/v1/manage/suites",
        json!({
            "product": lib.product_id,
            "name": "Pinning",
            "status": "active",
            "cases": [cv["case_id"]],
        }),
        &author,
    )
    .await;
    assert_eq!(status, 201, "{}", suite);
    assert_eq!(suite["cases"][0], cv["case_id"]);

    let (status, suites) = get(
        &app,
        &format!("/api/v1/manage/suites?product={}", lib.product_id),
        &author,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(suites.as_array().unwrap().len(), 2);
}
