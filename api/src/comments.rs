use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use board_shared::{Comment, CreateComment, Paginated, User};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    auth, db,
    error::AppError,
    pagination::Paginator,
    AppState,
};

pub const MAX_COMMENT_LEN: usize = 400;

const COMMENT_SELECT: &str = "SELECT c.id, c.article_id, c.text, c.created_at, c.updated_at,
                                     c.comm_like_count, u.id, u.username, u.is_staff
                              FROM comments c
                              JOIN users u ON c.author_id = u.id";

fn comment_from_row(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        article_id: row.get(1)?,
        text: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        comm_like_count: row.get(5)?,
        author: User {
            id: row.get(6)?,
            username: row.get(7)?,
            is_staff: row.get(8)?,
        },
    })
}

/// The limit applies to what the user typed, not to the sanitized markup.
fn clean_text(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    let len = raw.chars().count();
    if len == 0 || len > MAX_COMMENT_LEN {
        return Err(AppError::Validation(format!(
            "comment text must be 1 to {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(ammonia::clean(raw).trim().to_string())
}

fn load_comment(conn: &Connection, id: i64) -> Result<Comment, AppError> {
    conn.query_row(&format!("{COMMENT_SELECT} WHERE c.id = ?1"), [id], comment_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("comment", id))
}

fn comment_author(conn: &Connection, id: i64) -> Result<i64, AppError> {
    conn.query_row("SELECT author_id FROM comments WHERE id = ?1", [id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| AppError::not_found("comment", id))
}

/// Comments of one article, newest first, paginated.
pub fn comment_page(
    conn: &Connection,
    article_id: i64,
    raw_page: Option<&str>,
    per_page: i64,
    orphans: i64,
) -> Result<Paginated<Comment>, AppError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE article_id = ?1",
        [article_id],
        |row| row.get(0),
    )?;

    let paginator = Paginator::new(total, per_page, orphans);
    let page = paginator.get_page(raw_page);

    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT}
         WHERE c.article_id = ?1
         ORDER BY c.created_at DESC, c.id DESC
         LIMIT ?2 OFFSET ?3"
    ))?;
    let items = stmt
        .query_map(params![article_id, page.limit, page.offset], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(page.wrap(&paginator, items))
}

/// POST /article/{id}/comments/
pub async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(article_id): Path<i64>,
    Json(payload): Json<CreateComment>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let text = clean_text(&payload.text)?;

    let comment = db::with_conn(&state.db, move |conn| {
        let user = auth::require_user(conn, user_id)?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM articles WHERE id = ?1)",
            [article_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(AppError::not_found("article", article_id));
        }

        conn.execute(
            "INSERT INTO comments (article_id, text, author_id) VALUES (?1, ?2, ?3)",
            params![article_id, text, user.id],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(comment_id = id, article_id, user_id, "comment created");

        load_comment(conn, id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// PUT /comment/{id}/
pub async fn update_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<CreateComment>,
) -> Result<Json<Comment>, AppError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let text = clean_text(&payload.text)?;

    let comment = db::with_conn(&state.db, move |conn| {
        let user = auth::require_user(conn, user_id)?;
        auth::ensure_can_edit(&user, comment_author(conn, id)?)?;

        conn.execute(
            "UPDATE comments
             SET text = ?1, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
             WHERE id = ?2",
            params![text, id],
        )?;

        load_comment(conn, id)
    })
    .await?;

    Ok(Json(comment))
}

/// DELETE /comment/{id}/
pub async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;

    db::with_conn(&state.db, move |conn| {
        let user = auth::require_user(conn, user_id)?;
        auth::ensure_can_edit(&user, comment_author(conn, id)?)?;
        conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
        tracing::info!(comment_id = id, user_id, "comment deleted");
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
