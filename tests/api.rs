use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use hopealong::{app, config::Config, db::{TripKind, TripRef}, res, AppState};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

struct TestApp {
    state: AppState,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        res::apply_schema(&db_pool).await.unwrap();

        let state = AppState::new(Config::for_tests(), db_pool);
        let router = app(state.clone());
        Self { state, router }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn sign_in(&self, user_id: &str, role: &str) -> String {
        let request = Request::post("/api/auth/session")
            .header("x-collaborator-key", "test-key")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "userId": user_id, "role": role, "name": user_id }).to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        cookie.split(';').next().unwrap().to_owned()
    }
}

fn call(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn approve(key: &str) -> Request<Body> {
    Request::post("/api/bookings/approved")
        .header("x-collaborator-key", key)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "tripId": "rideA",
                "tripModel": "Ride",
                "captainId": "cap1",
                "passengerId": "u1",
                "roomId": "r1",
                "seats": 3
            })
            .to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn ride_lifecycle_over_http() {
    let app = TestApp::new().await;
    let captain = app.sign_in("cap1", "captain").await;
    let passenger = app.sign_in("u1", "user").await;
    let mut settlements = app.state.trips.settlements();

    let (status, _) = app.send(approve("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.send(approve("test-key")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "roomId": "r1", "tripId": "rideA", "tripModel": "Ride", "status": "pending" }));

    let otp = app.state.store.trip(&TripRef::ride("rideA")).await.unwrap().unwrap().otp;
    let wrong = if otp == "0000" { "1111" } else { "0000" };

    let (status, body) = app.send(call(Method::GET, "/api/notifications", Some(&passenger), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body[0]["message"].as_str().unwrap().contains(&otp));

    fn start(cookie: &str, otp: &str) -> Request<Body> {
        call(Method::POST, "/api/rides/rideA/start", Some(cookie), Some(json!({ "otp": otp })))
    }

    let (status, body) = app.send(start(&passenger, &otp)).await;
    assert_eq!((status, body["kind"].as_str()), (StatusCode::FORBIDDEN, Some("Forbidden")));

    let (status, body) = app.send(start(&captain, wrong)).await;
    assert_eq!((status, body["kind"].as_str()), (StatusCode::UNPROCESSABLE_ENTITY, Some("OtpMismatch")));

    let (status, body) = app.send(start(&captain, &otp)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "tripId": "rideA", "tripModel": "Ride", "status": "started" }));

    let (status, body) = app.send(start(&captain, &otp)).await;
    assert_eq!((status, body["kind"].as_str()), (StatusCode::CONFLICT, Some("InvalidTransition")));

    let (status, body) = app.send(call(Method::GET, "/api/rides/rideA", Some(&passenger), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");
    assert_eq!(body["captainId"], "cap1");
    assert!(body.get("otp").is_none());

    let (status, body) = app.send(call(Method::POST, "/api/rides/rideA/complete", Some(&captain), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, _) = app.send(call(Method::POST, "/api/rides/rideA/complete", Some(&captain), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let settlement = settlements.try_recv().unwrap();
    assert_eq!((settlement.trip_id.as_str(), settlement.captain_id.as_str()), ("rideA", "cap1"));
}

#[tokio::test]
async fn approval_rejects_conflicting_bookings() {
    let app = TestApp::new().await;
    let (status, _) = app.send(approve("test-key")).await;
    assert_eq!(status, StatusCode::CREATED);

    let other_captain = Request::post("/api/bookings/approved")
        .header("x-collaborator-key", "test-key")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "tripId": "rideA", "captainId": "cap2", "passengerId": "u2" }).to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(other_captain).await;
    assert_eq!((status, body["kind"].as_str()), (StatusCode::FORBIDDEN, Some("Forbidden")));

    let reused_room = Request::post("/api/bookings/approved")
        .header("x-collaborator-key", "test-key")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "tripId": "g1", "tripModel": "GoodsDelivery", "captainId": "cap1", "passengerId": "u1", "roomId": "r1" }).to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(reused_room).await;
    assert_eq!((status, body["kind"].as_str()), (StatusCode::CONFLICT, Some("InvalidTransition")));

    let orphan = app.state.store.trip(&TripRef::new(TripKind::GoodsDelivery, "g1")).await.unwrap();
    assert!(orphan.is_none());
}

#[tokio::test]
async fn chat_endpoints_respect_room_participants() {
    let app = TestApp::new().await;
    app.send(approve("test-key")).await;
    let passenger = app.sign_in("u1", "user").await;
    let stranger = app.sign_in("u9", "user").await;

    let (status, body) = app.send(call(Method::GET, "/api/chatroom/r1", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "roomId": "r1", "tripId": "rideA", "tripModel": "Ride" }));

    let (status, body) = app.send(call(Method::GET, "/api/chatroom/nope", None, None)).await;
    assert_eq!((status, body["kind"].as_str()), (StatusCode::NOT_FOUND, Some("NotFound")));

    let (status, body) = app.send(call(Method::GET, "/api/chat/r1", Some(&passenger), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = app.send(call(Method::GET, "/api/chat/r1", Some(&stranger), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(call(Method::GET, "/api/chat/r1", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_handoff_and_logout() {
    let app = TestApp::new().await;

    let (status, body) = app.send(call(Method::GET, "/api/auth/me", None, None)).await;
    assert_eq!((status, body["kind"].as_str()), (StatusCode::UNAUTHORIZED, Some("Unauthorized")));

    let cookie = app.sign_in("cap1", "captain").await;
    let (status, body) = app.send(call(Method::GET, "/api/auth/me", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "userId": "cap1", "role": "captain", "name": "cap1" }));

    let response = app.router.clone()
        .oneshot(call(Method::GET, "/logout?return_url=https://evil.example", Some(&cookie), None))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/");

    let (status, _) = app.send(call(Method::GET, "/api/auth/me", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
