#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use lendhub_server::{app, config::Config, db::Database, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::util::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

pub async fn spawn() -> TestApp {
    let db = Database::in_memory().await.expect("in-memory database");
    let pool = db.pool.clone();
    let state = AppState {
        db,
        config: Config {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
        },
    };

    TestApp {
        router: app(state),
        pool,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user_id: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user_id {
            builder = builder.header("X-Sharer-User-Id", id.to_string());
        }

        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };

        (status, value)
    }

    pub async fn create_user(&self, name: &str, email: &str) -> i64 {
        let (status, body) = self
            .request(
                "POST",
                "/users",
                None,
                Some(json!({ "name": name, "email": email })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user: {body}");
        body["id"].as_i64().expect("user id")
    }

    pub async fn create_item(&self, owner_id: i64, name: &str, available: bool) -> i64 {
        let (status, body) = self
            .request(
                "POST",
                "/items",
                Some(owner_id),
                Some(json!({
                    "name": name,
                    "description": format!("{name} in good shape"),
                    "available": available,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create item: {body}");
        body["id"].as_i64().expect("item id")
    }

    pub async fn create_booking(
        &self,
        booker_id: i64,
        item_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Value {
        let (status, body) = self
            .request(
                "POST",
                "/bookings",
                Some(booker_id),
                Some(json!({ "item_id": item_id, "start": start, "end": end })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create booking: {body}");
        body
    }

    /// Insert a booking row directly, bypassing the creation-time validation.
    /// The only way for tests to produce past or already-decided bookings.
    pub async fn insert_booking(
        &self,
        booker_id: i64,
        item_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: &str,
    ) -> i64 {
        let result = sqlx::query(
            "INSERT INTO bookings (start_date, end_date, item_id, booker_id, status) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(start)
        .bind(end)
        .bind(item_id)
        .bind(booker_id)
        .bind(status)
        .execute(&self.pool)
        .await
        .expect("insert booking");

        result.last_insert_rowid()
    }
}
