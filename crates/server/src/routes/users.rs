use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::models::User,
    error::{AppError, Result},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user))
        .route(
            "/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[derive(Debug, Deserialize)]
pub struct NewUserBody {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserBody {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Shared lookup used by every subsystem that must resolve a caller or an
/// entity reference to an existing user.
pub async fn fetch_user(pool: &SqlitePool, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT id, name, email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {user_id} not found")))
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

async fn email_taken(pool: &SqlitePool, email: &str, exclude_id: i64) -> Result<bool> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ? AND id <> ?")
            .bind(email)
            .bind(exclude_id)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<NewUserBody>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    if is_blank(&body.name) {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let email = match body.email {
        Some(ref email) if !email.trim().is_empty() && email.contains('@') => email.clone(),
        _ => return Err(AppError::Validation("Invalid email address".to_string())),
    };

    if email_taken(&state.db.pool, &email, 0).await? {
        return Err(AppError::EmailConflict(email));
    }

    let name = body.name.unwrap_or_default();
    let result = sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
        .bind(&name)
        .bind(&email)
        .execute(&state.db.pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: result.last_insert_rowid(),
            name,
            email,
        }),
    ))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>> {
    let user = fetch_user(&state.db.pool, id).await?;
    Ok(Json(user.into()))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Json<UserResponse>> {
    let mut user = fetch_user(&state.db.pool, id).await?;

    // Blank or absent fields preserve the stored values.
    if let Some(name) = body.name.filter(|n| !n.trim().is_empty()) {
        user.name = name;
    }
    if let Some(email) = body.email.filter(|e| !e.trim().is_empty()) {
        if email_taken(&state.db.pool, &email, id).await? {
            return Err(AppError::EmailConflict(email));
        }
        user.email = email;
    }

    sqlx::query("UPDATE users SET name = ?, email = ? WHERE id = ?")
        .bind(&user.name)
        .bind(&user.email)
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(user.into()))
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<()>> {
    fetch_user(&state.db.pool, id).await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}
