use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::models::ItemRequest,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::users::fetch_user,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(find_own_requests)
                .post(create_request)
                .put(update_request),
        )
        .route("/all", get(find_other_requests))
        .route("/:id", get(get_request).delete(delete_request))
}

#[derive(Debug, Deserialize)]
pub struct NewRequestBody {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequestBody {
    pub id: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub id: i64,
    pub description: String,
    pub requestor_id: i64,
    pub created: DateTime<Utc>,
    pub items: Vec<FulfillingItem>,
}

/// A listing that references this request as the need it fulfills.
#[derive(Debug, Serialize)]
pub struct FulfillingItem {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
}

type FulfillingRow = (i64, String, i64, i64);

fn request_response(request: ItemRequest, items: Vec<FulfillingItem>) -> RequestResponse {
    RequestResponse {
        id: request.id,
        description: request.description,
        requestor_id: request.requestor_id,
        created: request.created,
        items,
    }
}

async fn fetch_request(pool: &SqlitePool, request_id: i64) -> Result<ItemRequest> {
    sqlx::query_as::<_, ItemRequest>(
        "SELECT id, description, requestor_id, created FROM requests WHERE id = ?",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Request with id {request_id} not found")))
}

async fn fulfilling_items(pool: &SqlitePool, request_id: i64) -> Result<Vec<FulfillingItem>> {
    let rows = sqlx::query_as::<_, (i64, String, i64)>(
        "SELECT id, name, owner_id FROM items WHERE request_id = ? ORDER BY id ASC",
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, owner_id)| FulfillingItem { id, name, owner_id })
        .collect())
}

async fn create_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<NewRequestBody>,
) -> Result<(StatusCode, Json<RequestResponse>)> {
    let description = match body.description {
        Some(description) if !description.trim().is_empty() => description,
        _ => {
            return Err(AppError::Validation(
                "Request description must not be blank".to_string(),
            ))
        }
    };

    let requestor = fetch_user(&state.db.pool, user.id).await?;
    let created = Utc::now();

    let result =
        sqlx::query("INSERT INTO requests (description, requestor_id, created) VALUES (?, ?, ?)")
            .bind(&description)
            .bind(requestor.id)
            .bind(created)
            .execute(&state.db.pool)
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(RequestResponse {
            id: result.last_insert_rowid(),
            description,
            requestor_id: requestor.id,
            created,
            items: Vec::new(),
        }),
    ))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RequestResponse>> {
    let request = fetch_request(&state.db.pool, id).await?;
    let items = fulfilling_items(&state.db.pool, id).await?;

    Ok(Json(request_response(request, items)))
}

/// The caller's own requests, newest first, with fulfilling items filled via
/// one grouped lookup rather than a query per request.
async fn find_own_requests(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RequestResponse>>> {
    fetch_user(&state.db.pool, user.id).await?;

    let requests = sqlx::query_as::<_, ItemRequest>(
        "SELECT id, description, requestor_id, created FROM requests WHERE requestor_id = ? ORDER BY created DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let rows = sqlx::query_as::<_, FulfillingRow>(
        r#"
        SELECT i.id, i.name, i.owner_id, i.request_id
        FROM items i
        JOIN requests r ON r.id = i.request_id
        WHERE r.requestor_id = ?
        ORDER BY i.id ASC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let mut items_by_request: HashMap<i64, Vec<FulfillingItem>> = HashMap::new();
    for (id, name, owner_id, request_id) in rows {
        items_by_request
            .entry(request_id)
            .or_default()
            .push(FulfillingItem { id, name, owner_id });
    }

    let responses = requests
        .into_iter()
        .map(|request| {
            let items = items_by_request.remove(&request.id).unwrap_or_default();
            request_response(request, items)
        })
        .collect();

    Ok(Json(responses))
}

/// Other users' requests, the caller's own excluded, newest first. Fulfilling
/// items are not aggregated on this listing.
async fn find_other_requests(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RequestResponse>>> {
    let requests = sqlx::query_as::<_, ItemRequest>(
        "SELECT id, description, requestor_id, created FROM requests WHERE requestor_id <> ? ORDER BY created DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(
        requests
            .into_iter()
            .map(|request| request_response(request, Vec::new()))
            .collect(),
    ))
}

async fn update_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateRequestBody>,
) -> Result<Json<RequestResponse>> {
    fetch_user(&state.db.pool, user.id).await?;

    let id = body
        .id
        .ok_or_else(|| AppError::Validation("request id should be specified".to_string()))?;

    let mut request = fetch_request(&state.db.pool, id).await?;

    if let Some(description) = body.description.filter(|d| !d.trim().is_empty()) {
        request.description = description;
    }

    sqlx::query("UPDATE requests SET description = ? WHERE id = ?")
        .bind(&request.description)
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    let items = fulfilling_items(&state.db.pool, id).await?;
    Ok(Json(request_response(request, items)))
}

async fn delete_request(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<()>> {
    fetch_request(&state.db.pool, id).await?;

    sqlx::query("DELETE FROM requests WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}
