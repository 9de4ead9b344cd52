use axum::{extract::State, Json};
use board_shared::{Tag, TagSummary};
use rusqlite::{params, Connection};

use crate::{db, error::AppError, AppState};

pub const MAX_TAG_LEN: usize = 31;

/// Trims and validates a tag name.
pub fn normalize_tag(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_TAG_LEN {
        return Err(AppError::Validation(format!(
            "tag names must be 1 to {MAX_TAG_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Insert-if-absent keyed on the unique name, then read back the id.
pub fn get_or_create_tag(conn: &Connection, name: &str) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO tags (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
        [name],
    )?;
    let id = conn.query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| row.get(0))?;
    Ok(id)
}

pub fn attach_tag(conn: &Connection, article_id: i64, name: &str) -> Result<(), AppError> {
    let tag_id = get_or_create_tag(conn, name)?;
    conn.execute(
        "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
        params![article_id, tag_id],
    )?;
    Ok(())
}

pub fn tags_for_article(conn: &Connection, article_id: i64) -> Result<Vec<Tag>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name FROM tags t
         JOIN article_tags link ON link.tag_id = t.id
         WHERE link.article_id = ?1
         ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map([article_id], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// GET /tags/
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagSummary>>, AppError> {
    let tags = db::with_conn(&state.db, |conn| {
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.created_at,
                    (SELECT COUNT(*) FROM article_tags WHERE tag_id = t.id)
             FROM tags t
             ORDER BY t.name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TagSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    article_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await?;

    Ok(Json(tags))
}
