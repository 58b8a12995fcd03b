use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::models::Item,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::users::fetch_user,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/search", get(search_items))
        .route(
            "/:id",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/:id/comment", post(add_comment))
}

#[derive(Debug, Deserialize)]
pub struct NewItemBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub available: Option<bool>,
    pub request_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub available: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct NewCommentBody {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub available: bool,
    pub owner_id: i64,
    pub request_id: Option<i64>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            description: item.description,
            available: item.available,
            owner_id: item.owner_id,
            request_id: item.request_id,
        }
    }
}

/// Detail view of an item: comments always, last/next booking timestamps
/// only when the caller owns the item.
#[derive(Debug, Serialize)]
pub struct FullItemResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub available: bool,
    pub owner_id: i64,
    pub request_id: Option<i64>,
    pub last_booking: Option<DateTime<Utc>>,
    pub next_booking: Option<DateTime<Utc>>,
    pub comments: Vec<CommentResponse>,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub text: String,
    pub item_id: i64,
    pub author_name: String,
    pub created: DateTime<Utc>,
}

type CommentRow = (i64, String, i64, String, DateTime<Utc>);

fn comment_response(row: CommentRow) -> CommentResponse {
    let (id, text, item_id, author_name, created) = row;
    CommentResponse {
        id,
        text,
        item_id,
        author_name,
        created,
    }
}

pub async fn fetch_item(pool: &SqlitePool, item_id: i64) -> Result<Item> {
    sqlx::query_as::<_, Item>(
        "SELECT id, name, description, available, owner_id, request_id FROM items WHERE id = ?",
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Item with id {item_id} not found")))
}

async fn item_comments(pool: &SqlitePool, item_id: i64) -> Result<Vec<CommentResponse>> {
    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.id, c.text, c.item_id, u.name, c.created
        FROM comments c
        JOIN users u ON u.id = c.author_id
        WHERE c.item_id = ?
        ORDER BY c.created ASC
        "#,
    )
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(comment_response).collect())
}

fn full_item_response(
    item: Item,
    comments: Vec<CommentResponse>,
    last_booking: Option<DateTime<Utc>>,
    next_booking: Option<DateTime<Utc>>,
) -> FullItemResponse {
    FullItemResponse {
        id: item.id,
        name: item.name,
        description: item.description,
        available: item.available,
        owner_id: item.owner_id,
        request_id: item.request_id,
        last_booking,
        next_booking,
        comments,
    }
}

async fn create_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<NewItemBody>,
) -> Result<(StatusCode, Json<ItemResponse>)> {
    let name = match body.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(AppError::Validation("Item name is required".to_string())),
    };
    let description = match body.description {
        Some(description) if !description.trim().is_empty() => description,
        _ => {
            return Err(AppError::Validation(
                "Item description is required".to_string(),
            ))
        }
    };
    let available = body
        .available
        .ok_or_else(|| AppError::Validation("Item availability is required".to_string()))?;

    let owner = fetch_user(&state.db.pool, user.id).await?;

    if let Some(request_id) = body.request_id {
        // The listing claims to fulfill a posted request; the reference must resolve.
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM requests WHERE id = ?")
            .bind(request_id)
            .fetch_one(&state.db.pool)
            .await?;
        if exists == 0 {
            return Err(AppError::NotFound(format!(
                "Request with id {request_id} not found"
            )));
        }
    }

    let result = sqlx::query(
        "INSERT INTO items (name, description, available, owner_id, request_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&name)
    .bind(&description)
    .bind(available)
    .bind(owner.id)
    .bind(body.request_id)
    .execute(&state.db.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ItemResponse {
            id: result.last_insert_rowid(),
            name,
            description,
            available,
            owner_id: owner.id,
            request_id: body.request_id,
        }),
    ))
}

async fn get_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<FullItemResponse>> {
    let item = fetch_item(&state.db.pool, id).await?;
    let comments = item_comments(&state.db.pool, id).await?;

    // Booking history is only the owner's business.
    if item.owner_id != user.id {
        return Ok(Json(full_item_response(item, comments, None, None)));
    }

    let now = Utc::now();
    let last_booking = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MAX(end_date) FROM bookings WHERE item_id = ? AND end_date < ?",
    )
    .bind(id)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await?;

    let next_booking = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MIN(start_date) FROM bookings WHERE item_id = ? AND start_date > ?",
    )
    .bind(id)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(full_item_response(
        item,
        comments,
        last_booking,
        next_booking,
    )))
}

async fn list_items(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<FullItemResponse>>> {
    let items = sqlx::query_as::<_, Item>(
        "SELECT id, name, description, available, owner_id, request_id FROM items WHERE owner_id = ? ORDER BY id ASC",
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await?;

    if items.is_empty() {
        return Ok(Json(Vec::new()));
    }

    // One pass over the owner's booking rows instead of two queries per item:
    // group by item and keep the extremal timestamps on either side of now.
    let now = Utc::now();
    let booking_rows = sqlx::query_as::<_, (i64, DateTime<Utc>, DateTime<Utc>)>(
        r#"
        SELECT b.item_id, b.start_date, b.end_date
        FROM bookings b
        JOIN items i ON i.id = b.item_id
        WHERE i.owner_id = ?
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let mut last_bookings: HashMap<i64, DateTime<Utc>> = HashMap::new();
    let mut next_bookings: HashMap<i64, DateTime<Utc>> = HashMap::new();
    for (item_id, start, end) in booking_rows {
        if end < now {
            let entry = last_bookings.entry(item_id).or_insert(end);
            *entry = (*entry).max(end);
        }
        if start > now {
            let entry = next_bookings.entry(item_id).or_insert(start);
            *entry = (*entry).min(start);
        }
    }

    let comment_rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.id, c.text, c.item_id, u.name, c.created
        FROM comments c
        JOIN users u ON u.id = c.author_id
        JOIN items i ON i.id = c.item_id
        WHERE i.owner_id = ?
        ORDER BY c.created ASC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let mut comments_by_item: HashMap<i64, Vec<CommentResponse>> = HashMap::new();
    for row in comment_rows {
        comments_by_item
            .entry(row.2)
            .or_default()
            .push(comment_response(row));
    }

    let responses = items
        .into_iter()
        .map(|item| {
            let item_id = item.id;
            full_item_response(
                item,
                comments_by_item.remove(&item_id).unwrap_or_default(),
                last_bookings.get(&item_id).copied(),
                next_bookings.get(&item_id).copied(),
            )
        })
        .collect();

    Ok(Json(responses))
}

async fn search_items(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ItemResponse>>> {
    let text = query.text.trim();
    if text.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let items = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, description, available, owner_id, request_id
        FROM items
        WHERE available = 1
          AND (name LIKE '%' || ? || '%' OR description LIKE '%' || ? || '%')
        ORDER BY id ASC
        "#,
    )
    .bind(text)
    .bind(text)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(items.into_iter().map(ItemResponse::from).collect()))
}

async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateItemBody>,
) -> Result<Json<ItemResponse>> {
    let mut item = fetch_item(&state.db.pool, id).await?;

    if item.owner_id != user.id {
        return Err(AppError::Forbidden(format!(
            "user {} doesn't have permission to access this resource",
            user.id
        )));
    }

    // Blank or absent fields preserve the stored values.
    if let Some(name) = body.name.filter(|n| !n.trim().is_empty()) {
        item.name = name;
    }
    if let Some(description) = body.description.filter(|d| !d.trim().is_empty()) {
        item.description = description;
    }
    if let Some(available) = body.available {
        item.available = available;
    }

    sqlx::query("UPDATE items SET name = ?, description = ?, available = ? WHERE id = ?")
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.available)
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(item.into()))
}

async fn delete_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<()>> {
    let item = fetch_item(&state.db.pool, id).await?;

    if item.owner_id != user.id {
        return Err(AppError::Forbidden(format!(
            "user {} doesn't have permission to access this resource",
            user.id
        )));
    }

    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}

async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<NewCommentBody>,
) -> Result<(StatusCode, Json<CommentResponse>)> {
    let text = match body.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(AppError::Validation(
                "Comment text must not be blank".to_string(),
            ))
        }
    };

    let author = fetch_user(&state.db.pool, user.id).await?;
    let item = fetch_item(&state.db.pool, id).await?;

    // Feedback requires proof of completed use: a booking by the author on
    // this item that already ended.
    let now = Utc::now();
    let completed = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM bookings WHERE booker_id = ? AND item_id = ? AND end_date < ?",
    )
    .bind(author.id)
    .bind(item.id)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await?;

    if completed == 0 {
        return Err(AppError::Validation(format!(
            "user {} cannot comment on item '{}' without a completed booking",
            author.id, item.name
        )));
    }

    let result =
        sqlx::query("INSERT INTO comments (text, item_id, author_id, created) VALUES (?, ?, ?, ?)")
            .bind(&text)
            .bind(item.id)
            .bind(author.id)
            .bind(now)
            .execute(&state.db.pool)
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            id: result.last_insert_rowid(),
            text,
            item_id: item.id,
            author_name: author.name,
            created: now,
        }),
    ))
}
