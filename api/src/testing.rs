//! Fixtures shared by the unit and router tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rusqlite::params;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{auth, db, AppState, DbPool};

pub const SECRET: &str = "test-secret";

/// Fresh migrated database in a temp dir; keep the `TempDir` alive.
pub fn temp_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.db");
    let pool = db::open_pool(path.to_str().unwrap()).unwrap();
    db::run_migrations(&pool).unwrap();
    (dir, pool)
}

pub fn create_user(pool: &DbPool, username: &str, is_staff: bool) -> i64 {
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO users (username, is_staff) VALUES (?1, ?2)",
        params![username, is_staff],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn create_article(pool: &DbPool, author_id: i64, title: &str, status: &str) -> i64 {
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO articles (title, text, author_id, status) VALUES (?1, 'body', ?2, ?3)",
        params![title, author_id, status],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn create_comment(pool: &DbPool, article_id: i64, author_id: i64, text: &str) -> i64 {
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO comments (article_id, text, author_id) VALUES (?1, ?2, ?3)",
        params![article_id, text, author_id],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn state(pool: DbPool) -> AppState {
    AppState {
        db: pool,
        jwt_secret: SECRET.to_string(),
        articles_per_page: 2,
        comments_per_page: 2,
        paginate_orphans: 0,
    }
}

pub fn token(user_id: i64) -> String {
    auth::issue_token(user_id, SECRET).unwrap()
}

/// Sends one request through the router and decodes the JSON body
/// (`Value::Null` for empty bodies).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header("Authorization", format!("Bearer {t}"));
    }
    let req = match body {
        Some(json) => req
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
