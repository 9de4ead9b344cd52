use axum::{extract::State, http::HeaderMap, Json};
use board_shared::User;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::{db, error::AppError, AppState};

const TOKEN_TTL_SECS: usize = 30 * 24 * 60 * 60;

// ── JWT Claims ──

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,   // user id
    pub exp: usize, // expiry (unix timestamp)
}

impl Claims {
    pub fn new(user_id: i64) -> Self {
        Self {
            sub: user_id,
            exp: unix_now() + TOKEN_TTL_SECS,
        }
    }
}

fn unix_now() -> usize {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

/// Tokens are normally minted by the identity provider sharing `JWT_SECRET`;
/// this is for local development and tests.
pub fn issue_token(user_id: i64, jwt_secret: &str) -> Result<String, AppError> {
    encode(
        &Header::default(),
        &Claims::new(user_id),
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
}

// ── Extract authenticated user from Authorization header ──

pub fn extract_user_id(headers: &HeaderMap, jwt_secret: &str) -> Result<i64, AppError> {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("login required".into()))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::Unauthorized("invalid token".into())
    })?;

    Ok(data.claims.sub)
}

/// Like `extract_user_id`, but anonymous callers get `None` instead of an error.
pub fn optional_user_id(headers: &HeaderMap, jwt_secret: &str) -> Option<i64> {
    extract_user_id(headers, jwt_secret).ok()
}

pub fn load_user(conn: &Connection, user_id: i64) -> Result<Option<User>, AppError> {
    let user = conn
        .query_row(
            "SELECT id, username, is_staff FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    is_staff: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// A valid token whose user no longer exists is treated as unauthenticated.
pub fn require_user(conn: &Connection, user_id: i64) -> Result<User, AppError> {
    load_user(conn, user_id)?.ok_or_else(|| AppError::Unauthorized("unknown user".into()))
}

/// Authors may change their own content; staff may change anything.
pub fn ensure_can_edit(user: &User, author_id: i64) -> Result<(), AppError> {
    if user.is_staff || user.id == author_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("only the author or staff may do this".into()))
    }
}

// ── Handlers ──

/// GET /auth/me — return current user
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>, AppError> {
    let user_id = extract_user_id(&headers, &state.jwt_secret)?;
    let user = db::with_conn(&state.db, move |conn| require_user(conn, user_id)).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use super::*;
    use crate::testing;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn issued_tokens_round_trip() {
        let token = issue_token(42, "k").unwrap();
        assert_eq!(extract_user_id(&bearer(&token), "k").unwrap(), 42);
    }

    #[test]
    fn wrong_secret_or_missing_header_is_unauthorized() {
        let token = issue_token(42, "k").unwrap();
        let err = extract_user_id(&bearer(&token), "other").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(matches!(
            extract_user_id(&HeaderMap::new(), "k"),
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(optional_user_id(&HeaderMap::new(), "k"), None);
    }

    #[test]
    fn edit_rights() {
        let author = User { id: 5, username: "a".into(), is_staff: false };
        let staff = User { id: 6, username: "s".into(), is_staff: true };
        assert!(ensure_can_edit(&author, 5).is_ok());
        assert!(ensure_can_edit(&staff, 5).is_ok());
        assert!(matches!(ensure_can_edit(&author, 6), Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn me_returns_the_caller() {
        let (_dir, pool) = testing::temp_pool();
        let alice = testing::create_user(&pool, "alice", false);
        let app = crate::router(testing::state(pool));

        let (status, body) =
            testing::send(&app, "GET", "/auth/me", Some(&testing::token(alice)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");

        let (status, body) =
            testing::send(&app, "GET", "/auth/me", Some(&testing::token(999)), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }
}
