mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

fn parse_ts(value: &Value) -> DateTime<Utc> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("timestamp")
}

#[tokio::test]
async fn created_booking_is_waiting_and_round_trips() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let item = app.create_item(owner, "Power drill", true).await;

    let start = Utc::now() + Duration::hours(1);
    let end = Utc::now() + Duration::hours(2);
    let created = app.create_booking(booker, item, start, end).await;

    assert_eq!(created["status"], "WAITING");
    assert_eq!(created["booker"]["id"].as_i64(), Some(booker));
    assert_eq!(created["item"]["id"].as_i64(), Some(item));
    assert_eq!(parse_ts(&created["start"]), start);
    assert_eq!(parse_ts(&created["end"]), end);

    let id = created["id"].as_i64().unwrap();
    let (status, fetched) = app
        .request("GET", &format!("/bookings/{id}"), Some(booker), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], created["status"]);
    assert_eq!(parse_ts(&fetched["start"]), start);
    assert_eq!(parse_ts(&fetched["end"]), end);
    assert_eq!(fetched["item"]["id"], created["item"]["id"]);
    assert_eq!(fetched["booker"]["id"], created["booker"]["id"]);
}

#[tokio::test]
async fn booking_unavailable_item_fails() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let item = app.create_item(owner, "Broken ladder", false).await;

    let (status, body) = app
        .request(
            "POST",
            "/bookings",
            Some(booker),
            Some(json!({
                "item_id": item,
                "start": Utc::now() + Duration::hours(1),
                "end": Utc::now() + Duration::hours(2),
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Item is not available");
}

#[tokio::test]
async fn booking_own_item_fails() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let (status, body) = app
        .request(
            "POST",
            "/bookings",
            Some(owner),
            Some(json!({
                "item_id": item,
                "start": Utc::now() + Duration::hours(1),
                "end": Utc::now() + Duration::hours(2),
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You can't book your own item");
}

#[tokio::test]
async fn booking_missing_item_fails() {
    let app = common::spawn().await;
    let booker = app.create_user("Boris", "boris@example.com").await;

    let (status, body) = app
        .request(
            "POST",
            "/bookings",
            Some(booker),
            Some(json!({
                "item_id": 42,
                "start": Utc::now() + Duration::hours(1),
                "end": Utc::now() + Duration::hours(2),
            })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Item with id 42 not found");
}

#[tokio::test]
async fn booking_timestamps_must_not_be_in_the_past() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let (status, _) = app
        .request(
            "POST",
            "/bookings",
            Some(booker),
            Some(json!({
                "item_id": item,
                "start": Utc::now() - Duration::hours(1),
                "end": Utc::now() + Duration::hours(1),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            "POST",
            "/bookings",
            Some(booker),
            Some(json!({
                "item_id": item,
                "start": Utc::now() + Duration::hours(1),
                "end": Utc::now() - Duration::hours(1),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_decision_on_a_booking_conflicts() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let created = app
        .create_booking(
            booker,
            item,
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await;
    let id = created["id"].as_i64().unwrap();

    let (status, approved) = app
        .request(
            "PATCH",
            &format!("/bookings/{id}?approved=true"),
            Some(owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "APPROVED");

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/bookings/{id}?approved=false"),
            Some(owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"],
        format!("Item Already reserved for booking {id}")
    );
}

#[tokio::test]
async fn only_the_owner_decides_a_booking() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let stranger = app.create_user("Vera", "vera@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let created = app
        .create_booking(
            booker,
            item,
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await;
    let id = created["id"].as_i64().unwrap();

    for caller in [booker, stranger] {
        let (status, _) = app
            .request(
                "PATCH",
                &format!("/bookings/{id}?approved=true"),
                Some(caller),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    // Missing the approved parameter defaults to a rejection.
    let (status, body) = app
        .request("PATCH", &format!("/bookings/{id}"), Some(owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REJECTED");
}

#[tokio::test]
async fn booking_detail_is_hidden_from_third_parties() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let stranger = app.create_user("Vera", "vera@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let created = app
        .create_booking(
            booker,
            item,
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await;
    let id = created["id"].as_i64().unwrap();

    for caller in [booker, owner] {
        let (status, _) = app
            .request("GET", &format!("/bookings/{id}"), Some(caller), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = app
        .request("GET", &format!("/bookings/{id}"), Some(stranger), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn temporal_states_partition_all_and_sort_by_start() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let now = Utc::now();
    let past = app
        .insert_booking(
            booker,
            item,
            now - Duration::hours(3),
            now - Duration::hours(2),
            "APPROVED",
        )
        .await;
    let current = app
        .insert_booking(
            booker,
            item,
            now - Duration::hours(1),
            now + Duration::hours(1),
            "APPROVED",
        )
        .await;
    let future = app
        .insert_booking(
            booker,
            item,
            now + Duration::hours(2),
            now + Duration::hours(3),
            "WAITING",
        )
        .await;

    let ids = |body: &Value| -> Vec<i64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_i64().unwrap())
            .collect()
    };

    let (status, all) = app.request("GET", "/bookings?state=ALL", Some(booker), None).await;
    assert_eq!(status, StatusCode::OK);
    // Ascending by start: past, current, future.
    assert_eq!(ids(&all), vec![past, current, future]);

    let (_, body) = app
        .request("GET", "/bookings?state=PAST", Some(booker), None)
        .await;
    assert_eq!(ids(&body), vec![past]);

    let (_, body) = app
        .request("GET", "/bookings?state=CURRENT", Some(booker), None)
        .await;
    assert_eq!(ids(&body), vec![current]);

    let (_, body) = app
        .request("GET", "/bookings?state=FUTURE", Some(booker), None)
        .await;
    assert_eq!(ids(&body), vec![future]);

    // The three temporal classes partition ALL for a fixed booker.
    let mut partition = Vec::new();
    for state in ["PAST", "CURRENT", "FUTURE"] {
        let (_, body) = app
            .request("GET", &format!("/bookings?state={state}"), Some(booker), None)
            .await;
        partition.extend(ids(&body));
    }
    partition.sort_unstable();
    let mut everything = ids(&all);
    everything.sort_unstable();
    assert_eq!(partition, everything);
}

#[tokio::test]
async fn status_filters_select_waiting_and_rejected() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let waiting = app
        .create_booking(
            booker,
            item,
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await["id"]
        .as_i64()
        .unwrap();
    let rejected = app
        .create_booking(
            booker,
            item,
            Utc::now() + Duration::hours(3),
            Utc::now() + Duration::hours(4),
        )
        .await["id"]
        .as_i64()
        .unwrap();
    let (status, _) = app
        .request(
            "PATCH",
            &format!("/bookings/{rejected}?approved=false"),
            Some(owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .request("GET", "/bookings?state=WAITING", Some(booker), None)
        .await;
    assert_eq!(body[0]["id"].as_i64(), Some(waiting));
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Case-insensitive at the boundary.
    let (_, body) = app
        .request("GET", "/bookings?state=rejected", Some(booker), None)
        .await;
    assert_eq!(body[0]["id"].as_i64(), Some(rejected));
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn owner_listing_covers_bookings_on_owned_items() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let id = app
        .create_booking(
            booker,
            item,
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await["id"]
        .as_i64()
        .unwrap();

    let (status, body) = app
        .request("GET", "/bookings/owner", Some(owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"].as_i64(), Some(id));

    // The booker owns no items, so the owner view is empty for them.
    let (status, body) = app
        .request("GET", "/bookings/owner", Some(booker), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_state_is_rejected() {
    let app = common::spawn().await;
    let user = app.create_user("Anna", "anna@example.com").await;

    let (status, body) = app
        .request("GET", "/bookings?state=SOMEDAY", Some(user), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown state: SOMEDAY");
}

#[tokio::test]
async fn listing_requires_a_known_user() {
    let app = common::spawn().await;

    let (status, _) = app.request("GET", "/bookings", Some(999), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn identity_header_is_required() {
    let app = common::spawn().await;

    let (status, body) = app.request("GET", "/bookings", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "X-Sharer-User-Id header is required");
}

#[tokio::test]
async fn overlapping_bookings_are_accepted() {
    // No interval-overlap check exists; concurrent requests for the same
    // window all land as WAITING and the owner arbitrates.
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let first = app.create_user("Boris", "boris@example.com").await;
    let second = app.create_user("Vera", "vera@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let start = Utc::now() + Duration::hours(1);
    let end = Utc::now() + Duration::hours(2);
    let a = app.create_booking(first, item, start, end).await;
    let b = app.create_booking(second, item, start, end).await;

    assert_eq!(a["status"], "WAITING");
    assert_eq!(b["status"], "WAITING");
    assert_ne!(a["id"], b["id"]);
}

#[tokio::test]
async fn any_caller_may_delete_a_booking() {
    let app = common::spawn().await;
    let owner = app.create_user("Anna", "anna@example.com").await;
    let booker = app.create_user("Boris", "boris@example.com").await;
    let stranger = app.create_user("Vera", "vera@example.com").await;
    let item = app.create_item(owner, "Ladder", true).await;

    let id = app
        .create_booking(
            booker,
            item,
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await["id"]
        .as_i64()
        .unwrap();

    // Deletion carries no ownership check.
    let (status, _) = app
        .request("DELETE", &format!("/bookings/{id}"), Some(stranger), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request("GET", &format!("/bookings/{id}"), Some(booker), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
