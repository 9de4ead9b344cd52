use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use board_shared::{
    Article, ArticleDetail, ArticleStatus, CreateArticle, Paginated, UpdateArticle, User,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Deserialize;

use crate::{
    auth, comments, db,
    error::AppError,
    ledger::{self, LikeTarget},
    moderation::ModerationFilter,
    pagination::Paginator,
    tags, AppState,
};

pub const MIN_TITLE_LEN: usize = 10;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_TEXT_LEN: usize = 3000;

const ARTICLE_SELECT: &str = "SELECT a.id, a.title, a.text, a.status, a.created_at, a.updated_at,
                                     a.like_count, u.id, u.username, u.is_staff
                              FROM articles a
                              JOIN users u ON a.author_id = u.id";

// ── Query params ──

#[derive(Deserialize)]
pub struct ArticleListParams {
    q: Option<String>,
    page: Option<String>,
    is_admin: Option<String>,
}

#[derive(Deserialize)]
pub struct ArticleDetailParams {
    page: Option<String>,
}

// ── Row mapping & validation ──

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let status: String = row.get(3)?;
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        text: row.get(2)?,
        status: ArticleStatus::parse(&status).unwrap_or_default(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        like_count: row.get(6)?,
        author: User {
            id: row.get(7)?,
            username: row.get(8)?,
            is_staff: row.get(9)?,
        },
        tags: Vec::new(),
    })
}

fn load_article(conn: &Connection, id: i64) -> Result<Article, AppError> {
    let mut article = conn
        .query_row(&format!("{ARTICLE_SELECT} WHERE a.id = ?1"), [id], article_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("article", id))?;
    article.tags = tags::tags_for_article(conn, id)?;
    Ok(article)
}

fn article_author(conn: &Connection, id: i64) -> Result<i64, AppError> {
    conn.query_row("SELECT author_id FROM articles WHERE id = ?1", [id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| AppError::not_found("article", id))
}

struct ArticleInput {
    title: String,
    text: String,
    tags: Vec<String>,
}

/// Title and text are stored as typed (trimmed); escaping is left to whoever renders them.
fn validate(title: &str, text: &str, tag_names: &[String]) -> Result<ArticleInput, AppError> {
    let title = title.trim().to_string();
    let text = text.trim().to_string();

    let title_len = title.chars().count();
    if !(MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&title_len) {
        return Err(AppError::Validation(format!(
            "title must be {MIN_TITLE_LEN} to {MAX_TITLE_LEN} characters"
        )));
    }
    let text_len = text.chars().count();
    if text_len == 0 || text_len > MAX_TEXT_LEN {
        return Err(AppError::Validation(format!(
            "text must be 1 to {MAX_TEXT_LEN} characters"
        )));
    }

    let tags = tag_names
        .iter()
        .map(|name| tags::normalize_tag(name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ArticleInput { title, text, tags })
}

/// Requested tags plus one named after the author (cut to the tag length limit).
fn attach_tags(
    conn: &Connection,
    article_id: i64,
    names: &[String],
    author: &User,
) -> Result<(), AppError> {
    for name in names {
        tags::attach_tag(conn, article_id, name)?;
    }
    let author_tag: String = author.username.chars().take(tags::MAX_TAG_LEN).collect();
    tags::attach_tag(conn, article_id, &author_tag)
}

// ── Handlers ──

/// GET /articles/?q=...&page=...&is_admin=...
pub async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<ArticleListParams>,
) -> Result<Json<Paginated<Article>>, AppError> {
    let filter = ModerationFilter::from_flag(params.is_admin.as_deref());
    let status = filter.required_status().map(|s| s.as_str());
    let needle = params
        .q
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    let per_page = state.articles_per_page;
    let orphans = state.paginate_orphans;

    let result = db::with_conn(&state.db, move |conn| {
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM articles a
             JOIN users u ON a.author_id = u.id
             WHERE (?1 IS NULL OR a.status = ?1)
               AND (?2 IS NULL
                    OR instr(unicode_lower(a.title), ?2) > 0
                    OR instr(unicode_lower(u.username), ?2) > 0)",
            params![status, needle],
            |row| row.get(0),
        )?;

        let paginator = Paginator::new(total, per_page, orphans);
        let page = paginator.get_page(params.page.as_deref());

        let mut stmt = conn.prepare(&format!(
            "{ARTICLE_SELECT}
             WHERE (?1 IS NULL OR a.status = ?1)
               AND (?2 IS NULL
                    OR instr(unicode_lower(a.title), ?2) > 0
                    OR instr(unicode_lower(u.username), ?2) > 0)
             ORDER BY a.created_at DESC, a.id DESC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let mut items = stmt
            .query_map(params![status, needle, page.limit, page.offset], article_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for article in &mut items {
            article.tags = tags::tags_for_article(conn, article.id)?;
        }

        Ok(page.wrap(&paginator, items))
    })
    .await?;

    Ok(Json(result))
}

/// GET /article/{id}/?page=... — article, caller's like state, comment page
pub async fn get_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<ArticleDetailParams>,
) -> Result<Json<ArticleDetail>, AppError> {
    let viewer = auth::optional_user_id(&headers, &state.jwt_secret);
    let per_page = state.comments_per_page;
    let orphans = state.paginate_orphans;

    let detail = db::with_conn(&state.db, move |conn| {
        let article = load_article(conn, id)?;
        let liked = match viewer {
            Some(user_id) => ledger::has_liked(conn, LikeTarget::Article, user_id, id)?,
            None => false,
        };
        let comments =
            comments::comment_page(conn, id, params.page.as_deref(), per_page, orphans)?;
        Ok(ArticleDetail {
            article,
            liked,
            comments,
        })
    })
    .await?;

    Ok(Json(detail))
}

/// POST /articles/
pub async fn create_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateArticle>,
) -> Result<(StatusCode, Json<Article>), AppError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let input = validate(&payload.title, &payload.text, &payload.tags)?;

    let article = db::with_conn(&state.db, move |conn| {
        let user = auth::require_user(conn, user_id)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO articles (title, text, author_id) VALUES (?1, ?2, ?3)",
            params![input.title, input.text, user.id],
        )?;
        let id = tx.last_insert_rowid();
        attach_tags(&tx, id, &input.tags, &user)?;
        tx.commit()?;

        tracing::info!(article_id = id, user_id, "article created");
        load_article(conn, id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(article)))
}

/// PUT /article/{id}/ — replaces title, text and tags; status for staff only
pub async fn update_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateArticle>,
) -> Result<Json<Article>, AppError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let input = validate(&payload.title, &payload.text, &payload.tags)?;
    let requested_status = payload.status;

    let article = db::with_conn(&state.db, move |conn| {
        let user = auth::require_user(conn, user_id)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        auth::ensure_can_edit(&user, article_author(&tx, id)?)?;

        tx.execute(
            "UPDATE articles
             SET title = ?1, text = ?2, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
             WHERE id = ?3",
            params![input.title, input.text, id],
        )?;

        match requested_status {
            Some(status) if user.is_staff => {
                tx.execute(
                    "UPDATE articles SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
                tracing::info!(article_id = id, status = status.as_str(), "article moderated");
            }
            Some(_) => {
                tracing::debug!(article_id = id, user_id, "ignoring status change from non-staff");
            }
            None => {}
        }

        tx.execute("DELETE FROM article_tags WHERE article_id = ?1", [id])?;
        attach_tags(&tx, id, &input.tags, &user)?;
        tx.commit()?;

        load_article(conn, id)
    })
    .await?;

    Ok(Json(article))
}

/// DELETE /article/{id}/
pub async fn delete_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;

    db::with_conn(&state.db, move |conn| {
        let user = auth::require_user(conn, user_id)?;
        auth::ensure_can_edit(&user, article_author(conn, id)?)?;
        conn.execute("DELETE FROM articles WHERE id = ?1", [id])?;
        tracing::info!(article_id = id, user_id, "article deleted");
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
