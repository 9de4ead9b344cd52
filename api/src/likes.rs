use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use board_shared::LikeResponse;

use crate::{
    auth, db,
    error::AppError,
    ledger::{self, LikeTarget},
    AppState,
};

#[derive(Debug, Clone, Copy)]
enum Toggle {
    On,
    Off,
}

async fn toggle(
    state: AppState,
    headers: &HeaderMap,
    kind: LikeTarget,
    target_id: i64,
    direction: Toggle,
) -> Result<Json<LikeResponse>, AppError> {
    let user_id = auth::extract_user_id(headers, &state.jwt_secret)?;

    let resp = db::with_conn(&state.db, move |conn| {
        let user = auth::require_user(conn, user_id)?;
        let resp = match direction {
            Toggle::On => LikeResponse {
                like_count: ledger::like_on(conn, kind, user.id, target_id)?,
                liked: true,
            },
            Toggle::Off => LikeResponse {
                like_count: ledger::like_off(conn, kind, user.id, target_id)?,
                liked: false,
            },
        };
        Ok(resp)
    })
    .await?;

    Ok(Json(resp))
}

/// GET /article/{id}/like/
pub async fn like_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<LikeResponse>, AppError> {
    toggle(state, &headers, LikeTarget::Article, id, Toggle::On).await
}

/// GET /article/{id}/unlike/
pub async fn unlike_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<LikeResponse>, AppError> {
    toggle(state, &headers, LikeTarget::Article, id, Toggle::Off).await
}

/// GET /comment/{id}/like/
pub async fn like_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<LikeResponse>, AppError> {
    toggle(state, &headers, LikeTarget::Comment, id, Toggle::On).await
}

/// GET /comment/{id}/unlike/
pub async fn unlike_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<LikeResponse>, AppError> {
    toggle(state, &headers, LikeTarget::Comment, id, Toggle::Off).await
}
