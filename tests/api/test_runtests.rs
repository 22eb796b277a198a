//! Executing runs: the run-tests page, result actions and series builds.

use actix_web::test::TestRequest;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use moztrap_lib::db::results;
use moztrap_lib::entity::result;
use moztrap_lib::models::user::perms;
use moztrap_lib::services::execution::UNAVAILABLE;

use super::helpers::*;

fn page_uri(run_id: Uuid, env_id: Uuid) -> String {
    format!("/api/v1/runtests/runs/{}/environments/{}", run_id, env_id)
}

fn action_uri(run_id: Uuid, env_id: Uuid, rcv: &Value, action: &str) -> String {
    format!(
        "{}/cases/{}/{}",
        page_uri(run_id, env_id),
        rcv.as_str().unwrap(),
        action
    )
}

#[actix_rt::test]
async fn test_run_tests_needs_execute_permission() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    create_user(&ctx.pool, "visitor", &[]).await;
    let visitor = Auth::Session(login(&app, "visitor").await);
    let uri = page_uri(run_id, lib.environment_ids[0]);

    let (status, _) = get(&app, &uri, &Auth::Anonymous).await;
    assert_eq!(status, 401);
    let (status, _) = get(&app, &uri, &visitor).await;
    assert_eq!(status, 403);
    // Results belong to a person; the admin key is not one.
    let (status, _) = get(&app, &uri, &Auth::Admin).await;
    assert_eq!(status, 403);
}

#[actix_rt::test]
async fn test_page_lists_locked_cases_with_default_results() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    let tester = create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let session = Auth::Session(login(&app, "tester").await);

    let (status, page) = get(&app, &page_uri(run_id, lib.environment_ids[0]), &session).await;
    assert_eq!(status, 200, "{}", page);
    assert_eq!(page["completion"], 0.0);
    assert_eq!(page["pagination"]["total"], 2);

    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        let cv: Uuid = item["caseversion"]["id"].as_str().unwrap().parse().unwrap();
        assert!(lib.caseversion_ids.contains(&cv));
        assert_eq!(item["result"]["status"], "assigned");
        assert!(item["result"]["id"].is_null());
        assert_eq!(item["result"]["tester_id"], tester.id.to_string());
        assert_eq!(item["steps"].as_array().unwrap().len(), 2);
        assert_eq!(item["suites"][0]["name"], "Tabs");
        assert!(item["other_result"].is_null());
    }

    let (status, paged) = get(
        &app,
        &format!("{}?limit=1&page=2", page_uri(run_id, lib.environment_ids[0])),
        &session,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(paged["items"].as_array().unwrap().len(), 1);
    assert_eq!(paged["pagination"]["total_pages"], 2);
}

#[actix_rt::test]
async fn test_actions_record_results_and_completion() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let session = Auth::Session(login(&app, "tester").await);
    let env = lib.environment_ids[0];

    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    let first = page["items"][0]["runcaseversion_id"].clone();
    let second = page["items"][1]["runcaseversion_id"].clone();

    let (status, item) = send(
        &app,
        TestRequest::post().uri(&action_uri(run_id, env, &first, "start")),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", item);
    assert_eq!(item["result"]["status"], "started");

    let (status, item) = post(
        &app,
        &action_uri(run_id, env, &first, "pass"),
        json!({ "comment": "ignored for passes" }),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", item);
    assert_eq!(item["result"]["status"], "passed");
    assert_eq!(item["result"]["comment"], "");
    assert_eq!(item["result"]["is_latest"], true);

    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    assert_eq!(page["completion"], 0.5);

    let (status, item) = post(
        &app,
        &action_uri(run_id, env, &second, "fail"),
        json!({
            "comment": "  Tab did not close  ",
            "stepnumber": 2,
            "bug": "https://bugzilla.example.com/show_bug.cgi?id=1",
        }),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", item);
    assert_eq!(item["result"]["status"], "failed");
    assert_eq!(item["result"]["comment"], "Tab did not close");
    assert_eq!(item["steps"][1]["stepresult"]["status"], "failed");
    assert_eq!(
        item["steps"][1]["stepresult"]["bug_url"],
        "https://bugzilla.example.com/show_bug.cgi?id=1"
    );
    assert!(item["steps"][0]["stepresult"]["id"].is_null());

    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    assert_eq!(page["completion"], 1.0);

    // Completion is per environment.
    let (_, other_env) = get(&app, &page_uri(run_id, lib.environment_ids[1]), &session).await;
    assert_eq!(other_env["completion"], 0.0);
}

#[actix_rt::test]
async fn test_duplicate_latest_results_are_repaired() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    let tester = create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let session = Auth::Session(login(&app, "tester").await);
    let env = lib.environment_ids[0];
    let db = ctx.pool.connection();

    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    let rcv: Uuid = page["items"][0]["runcaseversion_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let now = Utc::now();
    let row = |status: &str, modified_at| result::Model {
        id: Uuid::now_v7(),
        tester_id: tester.id,
        runcaseversion_id: rcv,
        environment_id: env,
        status: status.to_string(),
        comment: String::new(),
        is_latest: true,
        created_by: Some(tester.id),
        modified_by: Some(tester.id),
        created_at: modified_at,
        modified_at,
    };
    results::insert_raw(db, row("failed", now - Duration::hours(1)))
        .await
        .unwrap();
    let newest = results::insert_raw(db, row("passed", now)).await.unwrap();

    let (status, item) = get(
        &app,
        &format!("{}/cases/{}", page_uri(run_id, env), rcv),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", item);
    assert_eq!(item["result"]["status"], "passed");
    assert_eq!(item["result"]["id"], newest.id.to_string());

    let latest = results::latest_for(db, rcv, tester.id, env).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, newest.id);
}

#[actix_rt::test]
async fn test_skipped_cases_leave_the_total() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let session = Auth::Session(login(&app, "tester").await);
    let env = lib.environment_ids[0];

    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    let first = page["items"][0]["runcaseversion_id"].clone();
    let second = page["items"][1]["runcaseversion_id"].clone();

    let (status, item) = post(
        &app,
        &action_uri(run_id, env, &second, "skip"),
        json!({ "comment": "Not on this platform" }),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", item);
    assert_eq!(item["result"]["status"], "skipped");
    assert_eq!(item["result"]["comment"], "Not on this platform");

    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    assert_eq!(page["completion"], 0.0);

    post(
        &app,
        &action_uri(run_id, env, &first, "invalidate"),
        json!({ "comment": "Steps are wrong" }),
        &session,
    )
    .await;
    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    assert_eq!(page["completion"], 1.0);
}

#[actix_rt::test]
async fn test_other_testers_result_is_shown() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    create_user(&ctx.pool, "first", &[perms::EXECUTE]).await;
    create_user(&ctx.pool, "second", &[perms::EXECUTE]).await;
    let first = Auth::Session(login(&app, "first").await);
    let second = Auth::Session(login(&app, "second").await);
    let env = lib.environment_ids[0];

    let (_, page) = get(&app, &page_uri(run_id, env), &first).await;
    let rcv = page["items"][0]["runcaseversion_id"].clone();

    let (status, _) = post(
        &app,
        &action_uri(run_id, env, &rcv, "block"),
        json!({ "comment": "Crashes on start", "stepnumber": 1 }),
        &first,
    )
    .await;
    assert_eq!(status, 200);

    let detail_uri = format!("{}/cases/{}", page_uri(run_id, env), rcv.as_str().unwrap());
    let (status, item) = get(&app, &detail_uri, &second).await;
    assert_eq!(status, 200, "{}", item);
    assert_eq!(item["result"]["status"], "assigned");
    assert_eq!(item["other_result"]["status"], "blocked");
    assert_eq!(item["other_result"]["tester_username"], "first");
    assert_eq!(item["other_result"]["comment"], "Crashes on start");

    // Completion counts every tester's latest result.
    let (_, page) = get(&app, &page_uri(run_id, env), &second).await;
    assert_eq!(page["completion"], 0.5);
}

#[actix_rt::test]
async fn test_bad_actions_are_rejected() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let session = Auth::Session(login(&app, "tester").await);
    let env = lib.environment_ids[0];

    let (_, page) = get(&app, &page_uri(run_id, env), &session).await;
    let rcv = page["items"][0]["runcaseversion_id"].clone();

    let (status, body) = post(
        &app,
        &action_uri(run_id, env, &rcv, "celebrate"),
        json!({}),
        &session,
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("celebrate"));

    let (status, body) = post(
        &app,
        &action_uri(run_id, env, &rcv, "fail"),
        json!({ "comment": "Broken", "bug": "javascript:alert(1)" }),
        &session,
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["errors"]["bug"].is_array());

    // Unknown step numbers are ignored rather than refused.
    let (status, item) = post(
        &app,
        &action_uri(run_id, env, &rcv, "fail"),
        json!({ "comment": "Broken", "stepnumber": 9 }),
        &session,
    )
    .await;
    assert_eq!(status, 200, "{}", item);
    assert_eq!(item["result"]["status"], "failed");
}

#[actix_rt::test]
async fn test_unavailable_runs_environments_and_cases() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    let run_id = active_run(&app, &lib).await;
    create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let session = Auth::Session(login(&app, "tester").await);
    let env = lib.environment_ids[0];

    let (status, _) = get(&app, &page_uri(Uuid::now_v7(), env), &session).await;
    assert_eq!(status, 404);

    let (status, body) = get(&app, &page_uri(run_id, Uuid::now_v7()), &session).await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains(UNAVAILABLE));

    let (status, _) = post(
        &app,
        &action_uri(run_id, env, &json!(Uuid::now_v7().to_string()), "pass"),
        json!({}),
        &session,
    )
    .await;
    assert_eq!(status, 400);

    let draft = create_run(&app, &lib, "Not yet").await;
    let draft_id: Uuid = draft["id"].as_str().unwrap().parse().unwrap();
    let (status, _) = get(&app, &page_uri(draft_id, env), &session).await;
    assert_eq!(status, 400);

    post(
        &app,
        &format!("/api/v1/manage/runs/{}/deactivate", run_id),
        json!({}),
        &Auth::Admin,
    )
    .await;
    let (status, _) = get(&app, &page_uri(run_id, env), &session).await;
    assert_eq!(status, 400);
}

#[actix_rt::test]
async fn test_series_is_cloned_for_a_build() {
    let ctx = setup().await;
    let app = create_test_app(&ctx).await;
    let lib = seed_library(&ctx.pool).await;
    create_user(&ctx.pool, "tester", &[perms::EXECUTE]).await;
    let session = Auth::Session(login(&app, "tester").await);

    let (status, series) = post(
        &app,
        "/api/v1/manage/runs",
        json!({
            "productversion": lib.version_id.to_string(),
            "name": "Nightly",
            "start": "2026-01-05",
            "suites": [lib.suite_id.to_string()],
            "is_series": true,
            "build": "ignored for a series",
        }),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 201, "{}", series);
    assert!(series["build"].is_null());
    let series_id = series["id"].as_str().unwrap();

    let uri = format!("/api/v1/runtests/runs/{}/series", series_id);
    let (status, _) = post(&app, &uri, json!({ "build": "  " }), &session).await;
    assert_eq!(status, 400);

    // A draft series has nothing to clone yet.
    let (status, _) = post(&app, &uri, json!({ "build": "20261019" }), &session).await;
    assert_eq!(status, 400);
    let (status, _) = post(
        &app,
        &format!("/api/v1/manage/runs/{}/activate", series_id),
        json!({}),
        &Auth::Admin,
    )
    .await;
    assert_eq!(status, 200);

    let (status, child) = post(&app, &uri, json!({ "build": "20261019" }), &session).await;
    assert_eq!(status, 201, "{}", child);
    assert_eq!(child["name"], "Nightly - Build: 20261019");
    assert_eq!(child["build"], "20261019");
    assert_eq!(child["status"], "active");
    assert_eq!(child["is_series"], false);
    assert_eq!(child["series_id"], series["id"]);
    assert_eq!(child["suites"], series["suites"]);

    // The same build again is the same run.
    let (status, again) = post(&app, &uri, json!({ "build": "20261019" }), &session).await;
    assert_eq!(status, 200, "{}", again);
    assert_eq!(again["id"], child["id"]);
    let (_, listed) = get(&app, "/api/v1/manage/runs?status=active", &Auth::Admin).await;
    assert_eq!(listed["pagination"]["total"], 2);

    let child_id: Uuid = child["id"].as_str().unwrap().parse().unwrap();
    let (status, page) = get(&app, &page_uri(child_id, lib.environment_ids[0]), &session).await;
    assert_eq!(status, 200);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let (status, _) = post(
        &app,
        &format!("/api/v1/runtests/runs/{}/series", child_id),
        json!({ "build": "again" }),
        &session,
    )
    .await;
    assert_eq!(status, 400);
}
