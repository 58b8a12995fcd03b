use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;

/// Identity header carried on every authenticated route. The value is
/// trusted as-is; there is no session or token layer in front of it.
pub const USER_ID_HEADER: &str = "X-Sharer-User-Id";

#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    pub id: i64,
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok());

    let raw = header.ok_or_else(|| {
        AppError::Validation(format!("{USER_ID_HEADER} header is required"))
    })?;

    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{USER_ID_HEADER} header must be numeric")))?;

    request.extensions_mut().insert(AuthUser { id });

    Ok(next.run(request).await)
}

// Extractor for getting the caller identity from request extensions
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(StatusCode::BAD_REQUEST)
    }
}
