/// End-to-end tests over the REST router: registration, room lifecycle,
/// admission, ratings and the live view they drive.
///
/// Each test builds its own in-memory store and drives the router with
/// `oneshot`, so no sockets are involved.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use huddle_api::auth::{AppState, AppStateInner};
use huddle_db::Database;
use huddle_gateway::binder::{LiveView, Signal};
use huddle_gateway::dispatcher::Dispatcher;

struct TestApp {
    router: Router,
    state: AppState,
}

struct User {
    id: Uuid,
    token: String,
}

fn test_app() -> TestApp {
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        dispatcher: Dispatcher::new(),
        jwt_secret: "test-secret".into(),
        token_ttl_days: 1,
        bootstrap_admin: Some("admin".into()),
    });
    TestApp {
        router: huddle_api::router(state.clone()),
        state,
    }
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &TestApp, username: &str, name: &str, role: &str) -> User {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": username,
            "password": "correct horse battery",
            "display_name": name,
            "role": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");

    User {
        id: body["profile"]["id"].as_str().unwrap().parse().unwrap(),
        token: body["token"].as_str().unwrap().to_string(),
    }
}

async fn create_room(app: &TestApp, host: &User) -> Uuid {
    let (status, body) = call(
        app,
        Method::POST,
        "/rooms",
        Some(&host.token),
        Some(json!({
            "topic": "Should exams be open-book?",
            "domain": "education",
            "meeting_url": "https://meet.example/gd-42",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create room: {body}");
    assert_eq!(body["status"], "waiting");
    body["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn full_session_scenario() {
    let app = test_app();
    let admin = register(&app, "admin", "Admin", "student").await;
    let expert = register(&app, "mei", "Mei", "expert").await;
    let student = register(&app, "xavier", "Xavier", "student").await;
    let room_id = create_room(&app, &admin).await;

    // First view load makes the room live without touching the roster.
    let (status, room) = call(&app, Method::GET, &format!("/rooms/{room_id}"), Some(&student.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["status"], "live");
    assert_eq!(room["participants"].as_array().unwrap().len(), 0);

    // The student's live view of the room.
    let mut view = LiveView::watch(&app.state.dispatcher, student.id, room_id);
    view.load(app.state.db.get_room(room_id).unwrap().unwrap(), vec![]);

    let (status, joined) = call(&app, Method::POST, &format!("/rooms/{room_id}/join"), Some(&student.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["admitted"], true);
    assert_eq!(joined["meeting_url"], "https://meet.example/gd-42");
    let roster = joined["room"]["participants"].as_array().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0]["id"], student.id.to_string());
    assert_eq!(roster[0]["role"], "student");

    let (status, rated) = call(
        &app,
        Method::POST,
        &format!("/rooms/{room_id}/feedback"),
        Some(&expert.token),
        Some(json!({ "student_id": student.id, "rating": 4, "comment": "Good structure" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "rate: {rated}");
    assert_eq!(rated["points"], 40);

    let (_, me) = call(&app, Method::GET, "/profiles/me", Some(&student.token), None).await;
    assert_eq!(me["points"], 40);

    let (_, listed) = call(&app, Method::GET, &format!("/rooms/{room_id}/feedback"), Some(&student.token), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["comment"], "Good structure");

    let signals = view.drain();
    assert!(signals.contains(&Signal::Notify("Good structure".into())), "{signals:?}");
    assert!(signals.contains(&Signal::ProfileRefresh(40)));
    assert_eq!(view.room().unwrap().room.participants.len(), 1);
}

#[tokio::test]
async fn concurrent_joins_all_land_on_the_roster() {
    let app = test_app();
    let admin = register(&app, "admin", "Admin", "student").await;
    let room_id = create_room(&app, &admin).await;

    let mut students = Vec::new();
    for i in 0..6 {
        students.push(register(&app, &format!("student{i}"), &format!("Student {i}"), "student").await);
    }

    let uri = format!("/rooms/{room_id}/join");
    let joins = students
        .iter()
        .map(|s| call(&app, Method::POST, &uri, Some(&s.token), None));
    for (status, _) in futures_util::future::join_all(joins).await {
        assert_eq!(status, StatusCode::OK);
    }

    let room = app.state.db.get_room(room_id).unwrap().unwrap();
    assert_eq!(room.participants.len(), students.len());
    for s in &students {
        assert!(room.has_participant(s.id));
    }
}

#[tokio::test]
async fn concurrent_ratings_are_both_counted() {
    let app = test_app();
    let admin = register(&app, "admin", "Admin", "student").await;
    let expert = register(&app, "mei", "Mei", "expert").await;
    let student = register(&app, "xavier", "Xavier", "student").await;
    let room_id = create_room(&app, &admin).await;

    let uri = format!("/rooms/{room_id}/feedback");
    let body = json!({ "student_id": student.id, "rating": 1 });
    let (a, b) = tokio::join!(
        call(&app, Method::POST, &uri, Some(&admin.token), Some(body.clone())),
        call(&app, Method::POST, &uri, Some(&expert.token), Some(body.clone())),
    );
    assert_eq!(a.0, StatusCode::CREATED);
    assert_eq!(b.0, StatusCode::CREATED);

    let (_, profile) = call(&app, Method::GET, &format!("/profiles/{}", student.id), Some(&student.token), None).await;
    assert_eq!(profile["points"], 20);
}

#[tokio::test]
async fn rating_rules_are_enforced() {
    let app = test_app();
    let admin = register(&app, "admin", "Admin", "student").await;
    let expert = register(&app, "mei", "Mei", "expert").await;
    let student = register(&app, "xavier", "Xavier", "student").await;
    let other = register(&app, "yara", "Yara", "student").await;
    let room_id = create_room(&app, &admin).await;
    let uri = format!("/rooms/{room_id}/feedback");

    let (status, _) = call(&app, Method::POST, &uri, Some(&other.token), Some(json!({ "student_id": student.id, "rating": 5 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for rating in [0, 6, -1] {
        let (status, body) = call(&app, Method::POST, &uri, Some(&expert.token), Some(json!({ "student_id": student.id, "rating": rating }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "rating {rating}");
        assert_eq!(body["error"], "rating must be between 1 and 5");
    }

    let (status, _) = call(&app, Method::POST, &uri, Some(&expert.token), Some(json!({ "student_id": expert.id, "rating": 5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, &uri, Some(&expert.token), Some(json!({ "student_id": Uuid::new_v4(), "rating": 5 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing_room = format!("/rooms/{}/feedback", Uuid::new_v4());
    let (status, _) = call(&app, Method::POST, &missing_room, Some(&expert.token), Some(json!({ "student_id": student.id, "rating": 5 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, profile) = call(&app, Method::GET, "/profiles/me", Some(&student.token), None).await;
    assert_eq!(profile["points"], 0);
}

#[tokio::test]
async fn last_leave_completes_room_and_blocks_admission() {
    let app = test_app();
    let admin = register(&app, "admin", "Admin", "student").await;
    let student = register(&app, "xavier", "Xavier", "student").await;
    let latecomer = register(&app, "zoe", "Zoe", "student").await;
    let room_id = create_room(&app, &admin).await;

    call(&app, Method::GET, &format!("/rooms/{room_id}"), Some(&student.token), None).await;
    call(&app, Method::POST, &format!("/rooms/{room_id}/join"), Some(&student.token), None).await;

    let (status, room) = call(&app, Method::POST, &format!("/rooms/{room_id}/leave"), Some(&student.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["status"], "completed");

    let (status, body) = call(&app, Method::POST, &format!("/rooms/{room_id}/join"), Some(&latecomer.token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "room has ended");
    assert!(body.get("meeting_url").is_none());

    // Terminal: loading it again does not revive it.
    let (_, room) = call(&app, Method::GET, &format!("/rooms/{room_id}"), Some(&student.token), None).await;
    assert_eq!(room["status"], "completed");
}

#[tokio::test]
async fn only_host_or_admin_may_close() {
    let app = test_app();
    let admin = register(&app, "admin", "Admin", "student").await;
    let expert = register(&app, "mei", "Mei", "expert").await;
    let student = register(&app, "xavier", "Xavier", "student").await;
    let room_id = create_room(&app, &expert).await;

    let mut watcher = LiveView::watch(&app.state.dispatcher, student.id, room_id);
    watcher.load(app.state.db.get_room(room_id).unwrap().unwrap(), vec![]);

    let close = format!("/rooms/{room_id}/close");
    let (status, _) = call(&app, Method::POST, &close, Some(&student.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, room) = call(&app, Method::POST, &close, Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["status"], "completed");

    let (status, _) = call(&app, Method::POST, &close, Some(&expert.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let signals = watcher.drain();
    assert!(signals.contains(&Signal::SessionClosed(room_id)), "{signals:?}");
    assert!(!watcher.is_open());
}

#[tokio::test]
async fn students_cannot_open_rooms_or_change_roles() {
    let app = test_app();
    let admin = register(&app, "admin", "Admin", "student").await;
    let student = register(&app, "xavier", "Xavier", "student").await;

    let (status, _) = call(&app, Method::POST, "/rooms", Some(&student.token), Some(json!({ "topic": "t", "domain": "d" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let role_uri = format!("/profiles/{}/role", student.id);
    let (status, _) = call(&app, Method::PUT, &role_uri, Some(&student.token), Some(json!({ "role": "expert" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, promoted) = call(&app, Method::PUT, &role_uri, Some(&admin.token), Some(json!({ "role": "expert" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "expert");

    // The new role applies to the next request on the same session.
    let (status, _) = call(&app, Method::POST, "/rooms", Some(&student.token), Some(json!({ "topic": "t", "domain": "d" }))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn registration_rules() {
    let app = test_app();
    register(&app, "xavier", "Xavier", "student").await;

    let attempt = |username: &str, role: &str| {
        json!({
            "username": username,
            "password": "correct horse battery",
            "display_name": "Someone",
            "role": role,
        })
    };

    let (status, _) = call(&app, Method::POST, "/auth/register", None, Some(attempt("xavier", "student"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::POST, "/auth/register", None, Some(attempt("sneaky", "admin"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::POST, "/auth/register", None, Some(attempt("admin", "student"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["profile"]["role"], "admin");
}

#[tokio::test]
async fn sign_out_revokes_the_token() {
    let app = test_app();
    let student = register(&app, "xavier", "Xavier", "student").await;

    let (status, _) = call(&app, Method::GET, "/profiles/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::POST, "/auth/login", None, Some(json!({ "username": "xavier", "password": "wrong password" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, second) = call(&app, Method::POST, "/auth/login", None, Some(json!({ "username": "xavier", "password": "correct horse battery" }))).await;
    assert_eq!(status, StatusCode::OK);
    let second_token = second["token"].as_str().unwrap().to_string();

    let (status, _) = call(&app, Method::POST, "/auth/logout", Some(&student.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::GET, "/profiles/me", Some(&student.token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other sessions of the same user are unaffected.
    let (status, me) = call(&app, Method::GET, "/profiles/me", Some(&second_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Xavier");
}
