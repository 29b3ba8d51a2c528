/// HTTP-level integration tests
///
/// Requests go through the full router (auth layers included) via
/// `tower::ServiceExt::oneshot`; no socket is opened.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{Duration, Local, NaiveTime, TimeZone, Utc};
use common::{TestContext, JWT_SECRET, PASSWORD};
use serde_json::{json, Value};
use taskledger_shared::auth::jwt::validate_access_token;
use taskledger_shared::services::user::{UpdateUser, SYSTEM_USERNAME};
use tower::ServiceExt;
use uuid::Uuid;

fn task_body(name: &str, days: i64, status: &str) -> Value {
    json!({
        "name": name,
        "due_date": (Utc::now() + Duration::days(days)).to_rfc3339(),
        "status": status,
    })
}

fn due_today_body(name: &str) -> Value {
    let noon = Local::now()
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    let due = Local
        .from_local_datetime(&noon)
        .earliest()
        .unwrap()
        .with_timezone(&Utc);
    json!({ "name": name, "due_date": due.to_rfc3339(), "status": "OPEN" })
}

async fn create_task(ctx: &TestContext, token: &str, body: Value) -> Value {
    let (status, task) = ctx.send(Method::POST, "/v1/tasks", Some(token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    task
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["connections"]["total"], 1);
}

#[tokio::test]
async fn test_login_and_use_access_token() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["username"], "alice");
    assert_eq!(body["roles"], json!(["ROLE_USER"]));

    let token = body["access_token"].as_str().unwrap();
    let (status, tasks) = ctx.send(Method::GET, "/v1/tasks", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks, json!([]));
}

#[tokio::test]
async fn test_login_failures_are_unauthorized() {
    let ctx = TestContext::new().await;

    for (username, password) in [("alice", "wrong-password"), ("nobody", PASSWORD)] {
        let (status, body) = ctx
            .send(
                Method::POST,
                "/v1/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    ctx.state.users.deactivate(ctx.alice.id).await.unwrap();
    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "username": "", "password": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_refresh_token_flow() {
    let ctx = TestContext::new().await;

    let (_, login) = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": PASSWORD })),
        )
        .await;

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": login["refresh_token"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access_token = body["access_token"].as_str().unwrap();

    let (status, _) = ctx
        .send(Method::GET, "/v1/tasks", Some(access_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // an access token is not accepted as a refresh token, and vice versa
    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": login["access_token"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let refresh_token = login["refresh_token"].as_str().unwrap();
    let (status, _) = ctx
        .send(Method::GET, "/v1/tasks", Some(refresh_token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_user_tokens_stop_working() {
    let ctx = TestContext::new().await;

    let (_, login) = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": PASSWORD })),
        )
        .await;
    let access_token = login["access_token"].as_str().unwrap();

    let (status, _) = ctx
        .send(
            Method::POST,
            &format!("/v1/users/{}/deactivate", ctx.alice.id),
            Some(ctx.admin_token.as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx
        .send(Method::GET, "/v1/tasks", Some(access_token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": login["refresh_token"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    // reactivation restores both
    ctx.state.users.activate(ctx.alice.id).await.unwrap();
    let (status, _) = ctx
        .send(Method::GET, "/v1/tasks", Some(access_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_tokens_carry_current_roles() {
    let ctx = TestContext::new().await;
    let (carol, _) = ctx.user_with_token("carol").await;
    ctx.state
        .users
        .update(
            carol.id,
            UpdateUser {
                roles: Some(vec!["admin".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (_, login) = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "username": "carol", "password": PASSWORD })),
        )
        .await;
    let access_token = login["access_token"].as_str().unwrap();

    let (status, _) = ctx
        .send(Method::GET, "/v1/users", Some(access_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // demoted after the token was issued
    ctx.state
        .users
        .update(
            carol.id,
            UpdateUser {
                roles: Some(vec!["user".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, _) = ctx
        .send(Method::GET, "/v1/users", Some(access_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": login["refresh_token"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let refreshed = body["access_token"].as_str().unwrap();
    let claims = validate_access_token(refreshed, JWT_SECRET).unwrap();
    assert_eq!(claims.roles, vec!["ROLE_USER".to_string()]);

    // a deleted user's token is rejected outright
    ctx.state.users.delete(carol.id).await.unwrap();
    let (status, _) = ctx
        .send(Method::GET, "/v1/tasks", Some(access_token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.send(Method::GET, "/v1/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = ctx
        .send(Method::GET, "/v1/tasks", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/v1/users")
        .header(header::AUTHORIZATION, "Basic YWRtaW46c2VjcmV0")
        .body(Body::empty())
        .unwrap();
    let status = ctx.app.clone().oneshot(request).await.unwrap().status();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_task_crud() {
    let ctx = TestContext::new().await;
    let token = ctx.alice_token.as_str();

    let created = create_task(
        &ctx,
        token,
        json!({
            "name": "Report",
            "description": "quarterly numbers",
            "category": "work",
            "due_date": (Utc::now() + Duration::days(3)).to_rfc3339(),
            "status": "OPEN",
        }),
    )
    .await;
    assert_eq!(created["name"], "Report");
    assert_eq!(created["category"], "work");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = ctx
        .send(Method::GET, &format!("/v1/tasks/{}", id), Some(token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, updated) = ctx
        .send(
            Method::PUT,
            &format!("/v1/tasks/{}", id),
            Some(token),
            Some(task_body("Final report", 4, "DONE")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Final report");
    assert_eq!(updated["status"], "DONE");
    assert_eq!(updated["description"], Value::Null);
    assert_eq!(updated["category"], Value::Null);

    let (status, list) = ctx.send(Method::GET, "/v1/tasks", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = ctx
        .send(Method::DELETE, &format!("/v1/tasks/{}", id), Some(token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = ctx
        .send(Method::GET, &format!("/v1/tasks/{}", id), Some(token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_tasks_of_other_users_are_not_found() {
    let ctx = TestContext::new().await;
    let (_, bob_token) = ctx.user_with_token("bob").await;

    let task = create_task(&ctx, &ctx.alice_token, task_body("Report", 1, "OPEN")).await;
    let uri = format!("/v1/tasks/{}", task["id"].as_str().unwrap());

    let (status, _) = ctx.send(Method::GET, &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .send(Method::PUT, &uri, Some(&bob_token), Some(task_body("Mine", 1, "DONE")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx.send(Method::DELETE, &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = ctx.send(Method::GET, "/v1/tasks", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));

    let (status, fetched) = ctx.send(Method::GET, &uri, Some(&ctx.alice_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Report");
}

#[tokio::test]
async fn test_task_validation_errors() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/tasks",
            Some(&ctx.alice_token),
            Some(json!({ "name": "Report", "status": "OPEN" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "due_date");

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/tasks",
            Some(&ctx.alice_token),
            Some(task_body("  ", 1, "OPEN")),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "name");

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/tasks",
            Some(&ctx.alice_token),
            Some(task_body(&"x".repeat(51), 1, "OPEN")),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, list) = ctx
        .send(Method::GET, "/v1/tasks", Some(&ctx.alice_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_due_today_and_upcoming() {
    let ctx = TestContext::new().await;
    let token = ctx.alice_token.as_str();

    create_task(&ctx, token, due_today_body("Today")).await;
    create_task(&ctx, token, task_body("Far", 10, "OPEN")).await;
    create_task(&ctx, token, task_body("Near", 2, "OPEN")).await;
    create_task(&ctx, token, task_body("Overdue", -3, "OPEN")).await;

    let (status, today) = ctx.send(Method::GET, "/v1/tasks/today", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = today
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Today"]);

    let (status, upcoming) = ctx
        .send(Method::GET, "/v1/tasks/upcoming", Some(token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = upcoming
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Near", "Far"]);
}

#[tokio::test]
async fn test_export() {
    let ctx = TestContext::new().await;
    let token = ctx.alice_token.as_str();
    create_task(&ctx, token, task_body("Report, Q1", 1, "OPEN")).await;

    let (status, headers, body) = ctx
        .send_raw(Method::GET, "/v1/tasks/export", Some(token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"tasks.csv\""
    );
    let csv = String::from_utf8(body).unwrap();
    assert!(csv.starts_with("ID,Name,Description,Category,Due Date,Status\r\n"));
    assert!(csv.contains("\"Report, Q1\""));

    let (status, headers, body) = ctx
        .send_raw(Method::GET, "/v1/tasks/export?format=JSON", Some(token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json[0]["Name"], "Report, Q1");
    assert_eq!(json[0]["Status"], "OPEN");

    let (status, body) = ctx
        .send(Method::GET, "/v1/tasks/export?format=xml", Some(token), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "format");
}

#[tokio::test]
async fn test_user_routes_require_admin() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx
        .send(Method::GET, "/v1/users", Some(&ctx.alice_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = ctx
        .send(
            Method::POST,
            &format!("/v1/users/{}/deactivate", ctx.admin.id),
            Some(&ctx.alice_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, users) = ctx
        .send(Method::GET, "/v1/users", Some(&ctx.admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["admin", "alice", "system"]);
    assert!(users[0].get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_user() {
    let ctx = TestContext::new().await;
    let token = Some(ctx.admin_token.as_str());

    let (status, user) = ctx
        .send(
            Method::POST,
            "/v1/users",
            token,
            Some(json!({ "username": "carol", "email": "carol@x.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["username"], "carol");
    assert_eq!(user["active"], true);
    assert_eq!(user["roles"], json!(["ROLE_USER"]));

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/users",
            token,
            Some(json!({ "username": "carol", "email": "other@x.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Username is already taken");

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/users",
            token,
            Some(json!({ "username": "dave", "email": "not-an-email", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/users",
            token,
            Some(json!({
                "username": "dave",
                "email": "dave@x.com",
                "password": PASSWORD,
                "roles": ["owner"],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "roles");
}

#[tokio::test]
async fn test_update_and_toggle_user() {
    let ctx = TestContext::new().await;
    let token = Some(ctx.admin_token.as_str());
    let uri = format!("/v1/users/{}", ctx.alice.id);

    let (status, user) = ctx
        .send(
            Method::PUT,
            &uri,
            token,
            Some(json!({ "email": "alice@example.com", "roles": ["user", "admin"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(user["username"], "alice");
    assert_eq!(user["roles"], json!(["ROLE_USER", "ROLE_ADMIN"]));

    let (status, _) = ctx
        .send(Method::PUT, &uri, token, Some(json!({ "email": "admin@x.com" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, user) = ctx
        .send(Method::POST, &format!("{}/deactivate", uri), token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["active"], false);

    let (status, user) = ctx
        .send(Method::POST, &format!("{}/activate", uri), token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["active"], true);

    let (status, _) = ctx
        .send(
            Method::PUT,
            &format!("/v1/users/{}", Uuid::new_v4()),
            token,
            Some(json!({ "email": "ghost@x.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let system = ctx
        .state
        .users
        .find_by_username(SYSTEM_USERNAME)
        .await
        .unwrap()
        .unwrap();
    let (status, body) = ctx
        .send(Method::POST, &format!("/v1/users/{}/deactivate", system.id), token, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_delete_user() {
    let ctx = TestContext::new().await;
    let token = Some(ctx.admin_token.as_str());
    let (carol, _) = ctx.user_with_token("carol").await;

    let (status, _) = ctx
        .send(Method::DELETE, &format!("/v1/users/{}", carol.id), token, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(ctx.state.users.find_by_username("carol").await.unwrap().is_none());

    // alice owns a task and cannot be removed
    create_task(&ctx, &ctx.alice_token, task_body("Report", 1, "OPEN")).await;
    let (status, _) = ctx
        .send(Method::DELETE, &format!("/v1/users/{}", ctx.alice.id), token, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(ctx.state.users.find_by_username("alice").await.unwrap().is_some());
}

#[tokio::test]
async fn test_audit_log_queries() {
    let ctx = TestContext::new().await;
    let token = Some(ctx.admin_token.as_str());

    let task = create_task(&ctx, &ctx.alice_token, task_body("Report", 1, "OPEN")).await;
    let task_id = task["id"].as_str().unwrap();
    ctx.send(
        Method::PUT,
        &format!("/v1/tasks/{}", task_id),
        Some(&ctx.alice_token),
        Some(task_body("Report", 1, "DONE")),
    )
    .await;

    let (status, entries) = ctx
        .send(
            Method::GET,
            &format!("/v1/audit-logs/entity/task/{}", task_id),
            token,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "UPDATE");
    assert_eq!(entries[1]["action"], "CREATE");
    assert_eq!(entries[0]["entity_type"], "TASK");
    assert_eq!(entries[0]["changed_by_username"], "alice");

    let (status, entries) = ctx
        .send(Method::GET, "/v1/audit-logs/user/alice", token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 2);

    let (status, entries) = ctx
        .send(
            Method::GET,
            &format!("/v1/audit-logs/entity/USER/{}", ctx.alice.id),
            token,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries[0]["action"], "CREATE");
    assert_eq!(entries[0]["changed_by_username"], "system");

    let (status, _) = ctx
        .send(
            Method::GET,
            &format!("/v1/audit-logs/entity/widget/{}", task_id),
            token,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .send(Method::GET, "/v1/audit-logs/user/nobody", token, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .send(
            Method::GET,
            "/v1/audit-logs/user/alice",
            Some(&ctx.alice_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
