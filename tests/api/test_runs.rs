//! Add and edit run forms and the run lifecycle.

use serde_json::{Value, json};

use moztrap_lib::db::{library, products, runs};
use moztrap_lib::forms::INVALID_CHOICE;
use moztrap_lib::forms::runs::{CONCURRENT_EDIT, END_BEFORE_START, INVALID_SUITE};
use moztrap_lib::models::status::ObjectStatus;
use moztrap_lib::models::user::perms;

use super::helpers::*;

fn run_uri(run: &Value) -> String {
    format!("/api/v1/manage/runs/{}", run["id"].as_str().unwrap())
}

#[actix_rt::test]
async fn test_add_run_creates_draft_in_version_environments() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    create_user(&ctx.pool, "lead", &[perms::MANAGE_RUNS]).await;
    let lead = Auth::Session(login(&app, "lead").await);

    let (status, choices) = get(&app, "/api/v1/manage/runs/form", &lead).await;
    assert_eq!(status, 200, "{}", choices);
    assert_eq!(choices["productversion"][0]["label"], "Firefox 10");
    assert_eq!(choices["suites"][0]["label"], "Tabs");
    assert!(choices["readonly"].as_array().unwrap().is_empty());

    let (status, run) = post(
        &app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "  Weekly smoke  ",
            "start": "1/5/2026",
            "end": "2026-01-09",
            "suites": [lib.suite_id.to_string(), lib.suite_id.to_string()],
        }),
        &lead,
    )
    .await;
    assert_eq!(status, 201, "{}", run);
    assert_eq!(run["name"], "Weekly smoke");
    assert_eq!(run["status"], "draft");
    assert_eq!(run["start"], "2026-01-05");
    assert_eq!(run["end"], "2026-01-09");
    assert_eq!(run["cc_version"], 1);
    assert_eq!(run["product_id"], lib.product_id.to_string());
    assert_eq!(run["suites"], json!([lib.suite_id]));
    assert_eq!(run["environments"].as_array().unwrap().len(), 2);
}

#[actix_rt::test]
async fn test_add_run_validation() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;

    let (status, body) = post(&app, "/api/v1/manage/runs", json!({}), &Auth::Admin).await;
    assert_eq!(status, 400);
    for field in ["productversion", "name", "start"] {
        assert!(body["errors"][field].is_array(), "{} missing: {}", field, body);
    }

    let (status, body) = post(
        &app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "Backwards",
            "start": "2026-02-01",
            "end": "2026-01-01",
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(non_field_error(&body), END_BEFORE_START);

    let db = ctx.pool.connection();
    let other = products::create_product(db, "Thunderbird", "").await.unwrap();
    let foreign = library::create_suite(db, other.id, "Mail", "", ObjectStatus::Active, &[])
        .await
        .unwrap();
    let (status, body) = post(
        &app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "Mixed",
            "start": "2026-01-05",
            "suites": [foreign.id.to_string()],
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["errors"]["suites"][0], INVALID_SUITE);
}

#[actix_rt::test]
async fn test_run_management_needs_permission() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let tester = Auth::Session(login(&app, "tester").await);

    let (status, _) = post(
        &app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "Nope",
            "start": "2026-01-05",
        }),
        &tester,
    )
    .await;
    assert_eq!(status, 403);

    let run = create_run(&app, &lib, "Visible").await;
    let (status, fetched) = get(&app, &run_uri(&run), &tester).await;
    assert_eq!(status, 200);
    assert_eq!(fetched["name"], "Visible");
}

#[actix_rt::test]
async fn test_edit_run_checks_cc_version() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run = create_run(&app, &lib, "Draft run").await;

    let edit = |name: &str, cc_version: i64| {
        json!({
            "productversion": lib.version_id.to_string(),
            "name": name,
            "start": "2026-01-05",
            "suites": [lib.suite_id.to_string()],
            "cc_version": cc_version,
        })
    };

    let (status, saved) = put(&app, &run_uri(&run), edit("Renamed", 1), &Auth::Admin).await;
    assert_eq!(status, 200, "{}", saved);
    assert_eq!(saved["name"], "Renamed");
    assert_eq!(saved["cc_version"], 2);

    // A second editor still holding version 1 loses.
    let (status, body) = put(&app, &run_uri(&run), edit("Stale", 1), &Auth::Admin).await;
    assert_eq!(status, 400);
    assert_eq!(non_field_error(&body), CONCURRENT_EDIT);

    let (_, current) = get(&app, &run_uri(&run), &Auth::Admin).await;
    assert_eq!(current["name"], "Renamed");
}

#[actix_rt::test]
async fn test_run_write_with_stale_cc_version_changes_nothing() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run = create_run(&app, &lib, "Draft run").await;
    let run_id: uuid::Uuid = run["id"].as_str().unwrap().parse().unwrap();
    let db = ctx.pool.connection();

    let changes = |name: &str| runs::RunChanges {
        productversion_id: lib.version_id,
        name: name.to_string(),
        description: String::new(),
        start: chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        end: None,
        build: None,
        is_series: false,
        modified_by: None,
    };

    let saved = runs::update(db, run_id, 1, changes("First")).await.unwrap();
    assert_eq!(saved.map(|r| r.cc_version), Some(2));

    // A writer that read version 1 before the save above lands nowhere.
    let stale = runs::update(db, run_id, 1, changes("Second")).await.unwrap();
    assert!(stale.is_none());

    let current = runs::get(db, run_id).await.unwrap();
    assert_eq!(current.name, "First");
    assert_eq!(current.cc_version, 2);
}

#[actix_rt::test]
async fn test_active_run_pins_version_and_suites() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    let uri = format!("/api/v1/manage/runs/{}", run_id);

    let (status, choices) = get(&app, &format!("{}/form", uri), &Auth::Admin).await;
    assert_eq!(status, 200);
    assert_eq!(choices["readonly"], json!(["productversion", "suites"]));
    assert_eq!(choices["productversion"].as_array().unwrap().len(), 1);

    let (_, current) = get(&app, &uri, &Auth::Admin).await;
    assert_eq!(current["status"], "active");

    // Suites of an active run stay as they are whatever gets submitted.
    let (status, saved) = put(
        &app,
        &uri,
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "Smoke, renamed",
            "start": "2026-01-05",
            "suites": [],
            "cc_version": current["cc_version"],
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200, "{}", saved);
    assert_eq!(saved["name"], "Smoke, renamed");
    assert_eq!(saved["suites"], json!([lib.suite_id]));
}

#[actix_rt::test]
async fn test_add_series_run_drops_build() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;

    let (status, run) = post(
        &app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "Nightly",
            "start": "2026-01-05",
            "is_series": true,
            "build": "20260105",
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 201, "{}", run);
    assert_eq!(run["is_series"], true);
    assert!(run["build"].is_null());

    let (status, run) = post(
        &app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "One build",
            "start": "2026-01-05",
            "build": "20260105",
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 201, "{}", run);
    assert_eq!(run["build"], "20260105");
}

#[actix_rt::test]
async fn test_edit_form_offers_only_the_runs_product() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let db = ctx.pool.connection();
    let next = products::create_version(db, lib.product_id, "11", "", &lib.environment_ids)
        .await
        .unwrap();
    let other = products::create_product(db, "Thunderbird", "").await.unwrap();
    let foreign = products::create_version(db, other.id, "1", "", &lib.environment_ids)
        .await
        .unwrap();
    let run = create_run(&app, &lib, "Draft run").await;

    let (status, add) = get(&app, "/api/v1/manage/runs/form", &Auth::Admin).await;
    assert_eq!(status, 200);
    assert_eq!(add["productversion"].as_array().unwrap().len(), 3);

    let (status, edit) = get(&app, &format!("{}/form", run_uri(&run)), &Auth::Admin).await;
    assert_eq!(status, 200);
    let offered: Vec<&str> = edit["productversion"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(offered.len(), 2);
    assert!(offered.contains(&lib.version_id.to_string().as_str()));
    assert!(offered.contains(&next.id.to_string().as_str()));
    assert!(!offered.contains(&foreign.id.to_string().as_str()));

    // A draft run may move to another version of its product, not elsewhere.
    let (status, body) = put(
        &app,
        &run_uri(&run),
        json!({
            "productversion": foreign.id.to_string(),
            "name": "Draft run",
            "start": "2026-01-05",
            "cc_version": 1,
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["errors"]["productversion"][0], INVALID_CHOICE);

    let (status, saved) = put(
        &app,
        &run_uri(&run),
        json!({
            "productversion": next.id.to_string(),
            "name": "Draft run",
            "start": "2026-01-05",
            "suites": [lib.suite_id.to_string()],
            "cc_version": 1,
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200, "{}", saved);
    assert_eq!(saved["productversion_id"], next.id.to_string());
}

#[actix_rt::test]
async fn test_suite_names_keep_the_current_suites() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run = create_run(&app, &lib, "Draft run").await;

    let (status, saved) = put(
        &app,
        &run_uri(&run),
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "Draft run",
            "start": "2026-01-05",
            "suites": ["Tabs"],
            "cc_version": 1,
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200, "{}", saved);
    assert_eq!(saved["suites"], json!([lib.suite_id]));
}

#[actix_rt::test]
async fn test_list_runs_filters_by_status() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    create_run(&app, &lib, "Still a draft").await;
    let active_id = active_run(&app, &lib).await;

    let (status, all) = get(&app, "/api/v1/manage/runs", &Auth::Admin).await;
    assert_eq!(status, 200);
    assert_eq!(all["pagination"]["total"], 2);

    let (status, active) = get(&app, "/api/v1/manage/runs?status=active", &Auth::Admin).await;
    assert_eq!(status, 200);
    assert_eq!(active["runs"].as_array().unwrap().len(), 1);
    assert_eq!(active["runs"][0]["id"], active_id.to_string());

    let (status, disabled) = post(
        &app,
        &format!("/api/v1/manage/runs/{}/deactivate", active_id),
        json!({}),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(disabled["status"], "disabled");
}

#[actix_rt::test]
async fn test_missing_run_is_not_found() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;

    let (status, _) = get(
        &app,
        &format!("/api/v1/manage/runs/{}", uuid::Uuid::now_v7()),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 404);
}
