use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::models::{Booking, BookingStatus},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{
        items::{fetch_item, ItemResponse},
        users::{fetch_user, UserResponse},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(find_all_by_booker).post(create_booking))
        .route("/owner", get(find_all_by_owner_items))
        .route(
            "/:id",
            get(find_booking)
                .patch(approve_booking)
                .delete(delete_booking),
        )
}

/// Classification filter for booking lists, evaluated against now at query
/// time. CURRENT, PAST and FUTURE partition a booker's bookings for a fixed
/// now; WAITING and REJECTED select on status instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StateFilter {
    All,
    Current,
    Past,
    Future,
    Waiting,
    Rejected,
}

impl StateFilter {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "CURRENT" => Ok(Self::Current),
            "PAST" => Ok(Self::Past),
            "FUTURE" => Ok(Self::Future),
            "WAITING" => Ok(Self::Waiting),
            "REJECTED" => Ok(Self::Rejected),
            _ => Err(AppError::Validation(format!("Unknown state: {value}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewBookingBody {
    pub item_id: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveQuery {
    pub approved: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BookingStatus,
    pub booker: UserResponse,
    pub item: ItemResponse,
}

/// Booking joined with its booker and item, the shape every read returns.
type BookingRow = (
    i64,                // b.id
    DateTime<Utc>,      // b.start_date
    DateTime<Utc>,      // b.end_date
    BookingStatus,      // b.status
    i64,                // u.id
    String,             // u.name
    String,             // u.email
    i64,                // i.id
    String,             // i.name
    String,             // i.description
    bool,               // i.available
    i64,                // i.owner_id
    Option<i64>,        // i.request_id
);

const BOOKING_SELECT: &str = r#"
    SELECT b.id, b.start_date, b.end_date, b.status,
           u.id, u.name, u.email,
           i.id, i.name, i.description, i.available, i.owner_id, i.request_id
    FROM bookings b
    JOIN users u ON u.id = b.booker_id
    JOIN items i ON i.id = b.item_id
"#;

fn booking_response(row: BookingRow) -> BookingResponse {
    let (
        id,
        start,
        end,
        status,
        booker_id,
        booker_name,
        booker_email,
        item_id,
        item_name,
        item_description,
        available,
        owner_id,
        request_id,
    ) = row;

    BookingResponse {
        id,
        start,
        end,
        status,
        booker: UserResponse {
            id: booker_id,
            name: booker_name,
            email: booker_email,
        },
        item: ItemResponse {
            id: item_id,
            name: item_name,
            description: item_description,
            available,
            owner_id,
            request_id,
        },
    }
}

async fn fetch_booking(pool: &SqlitePool, booking_id: i64) -> Result<Booking> {
    sqlx::query_as::<_, Booking>(
        "SELECT id, start_date, end_date, item_id, booker_id, status FROM bookings WHERE id = ?",
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Booking with id {booking_id} not found")))
}

async fn fetch_booking_row(pool: &SqlitePool, booking_id: i64) -> Result<BookingRow> {
    let sql = format!("{BOOKING_SELECT} WHERE b.id = ?");
    sqlx::query_as::<_, BookingRow>(&sql)
        .bind(booking_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking with id {booking_id} not found")))
}

/// State-filtered booking list, scoped either to a booker or to the owner of
/// the booked items. Sorted ascending by start.
async fn find_bookings(
    pool: &SqlitePool,
    scope_column: &str,
    scope_id: i64,
    filter: StateFilter,
) -> Result<Vec<BookingResponse>> {
    let predicate = match filter {
        StateFilter::All => "",
        StateFilter::Current => "AND ?2 BETWEEN b.start_date AND b.end_date",
        StateFilter::Past => "AND b.end_date < ?2",
        StateFilter::Future => "AND b.start_date > ?2",
        StateFilter::Waiting | StateFilter::Rejected => "AND b.status = ?2",
    };

    let sql = format!(
        "{BOOKING_SELECT} WHERE {scope_column} = ?1 {predicate} ORDER BY b.start_date ASC"
    );

    let query = sqlx::query_as::<_, BookingRow>(&sql).bind(scope_id);
    let query = match filter {
        StateFilter::All => query,
        StateFilter::Waiting => query.bind(BookingStatus::Waiting),
        StateFilter::Rejected => query.bind(BookingStatus::Rejected),
        _ => query.bind(Utc::now()),
    };

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(booking_response).collect())
}

async fn create_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<NewBookingBody>,
) -> Result<(StatusCode, Json<BookingResponse>)> {
    let item_id = body
        .item_id
        .ok_or_else(|| AppError::Validation("Item id is required".to_string()))?;
    let start = body
        .start
        .ok_or_else(|| AppError::Validation("Booking start is required".to_string()))?;
    let end = body
        .end
        .ok_or_else(|| AppError::Validation("Booking end is required".to_string()))?;

    // Request-shape constraints, checked before any engine logic.
    let now = Utc::now();
    if start < now {
        return Err(AppError::Validation(
            "Booking start must not be in the past".to_string(),
        ));
    }
    if end <= now {
        return Err(AppError::Validation(
            "Booking end must be in the future".to_string(),
        ));
    }

    let item = fetch_item(&state.db.pool, item_id).await?;
    let booker = fetch_user(&state.db.pool, user.id).await?;

    if !item.available {
        return Err(AppError::Validation("Item is not available".to_string()));
    }

    if booker.id == item.owner_id {
        return Err(AppError::Validation(
            "You can't book your own item".to_string(),
        ));
    }

    // Overlapping bookings on the same item are accepted; availability is
    // decided by the owner through approve/reject, not by interval checks.
    let result = sqlx::query(
        "INSERT INTO bookings (start_date, end_date, item_id, booker_id, status) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(start)
    .bind(end)
    .bind(item.id)
    .bind(booker.id)
    .bind(BookingStatus::Waiting)
    .execute(&state.db.pool)
    .await?;

    let booking_id = result.last_insert_rowid();
    tracing::debug!(booking_id, item_id = item.id, booker_id = booker.id, "booking created");

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            id: booking_id,
            start,
            end,
            status: BookingStatus::Waiting,
            booker: booker.into(),
            item: item.into(),
        }),
    ))
}

async fn find_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BookingResponse>> {
    let row = fetch_booking_row(&state.db.pool, id).await?;
    let booking = booking_response(row);

    // Only the booker and the item's owner may see a booking.
    if booking.booker.id != user.id && booking.item.owner_id != user.id {
        return Err(AppError::Forbidden(format!(
            "user {} doesn't have permission to access this resource",
            user.id
        )));
    }

    Ok(Json(booking))
}

async fn find_all_by_booker(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<StateQuery>,
) -> Result<Json<Vec<BookingResponse>>> {
    let filter = StateFilter::parse(query.state.as_deref().unwrap_or("ALL"))?;
    fetch_user(&state.db.pool, user.id).await?;

    let bookings = find_bookings(&state.db.pool, "b.booker_id", user.id, filter).await?;
    Ok(Json(bookings))
}

async fn find_all_by_owner_items(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<StateQuery>,
) -> Result<Json<Vec<BookingResponse>>> {
    let filter = StateFilter::parse(query.state.as_deref().unwrap_or("ALL"))?;
    fetch_user(&state.db.pool, user.id).await?;

    let bookings = find_bookings(&state.db.pool, "i.owner_id", user.id, filter).await?;
    Ok(Json(bookings))
}

async fn approve_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<ApproveQuery>,
) -> Result<Json<BookingResponse>> {
    let approved = query.approved.unwrap_or(false);
    let booking = fetch_booking(&state.db.pool, id).await?;
    let item = fetch_item(&state.db.pool, booking.item_id).await?;

    if item.owner_id != user.id {
        return Err(AppError::Forbidden(format!(
            "user {} doesn't have permission to access this resource",
            user.id
        )));
    }

    // A booking leaves WAITING exactly once.
    if booking.status != BookingStatus::Waiting {
        return Err(AppError::BookingStatus(id));
    }

    let status = if approved {
        BookingStatus::Approved
    } else {
        BookingStatus::Rejected
    };

    sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    tracing::debug!(booking_id = id, ?status, "booking decided");

    let row = fetch_booking_row(&state.db.pool, id).await?;
    Ok(Json(booking_response(row)))
}

async fn delete_booking(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<()>> {
    fetch_booking(&state.db.pool, id).await?;

    sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}
