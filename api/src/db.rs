use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{functions::FunctionFlags, Connection};

use crate::{error::AppError, DbPool};

/// Owner of content whose author was deleted (`ON DELETE SET DEFAULT`).
pub const SENTINEL_USER_ID: i64 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_pool(database_url: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_url).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        register_functions(conn)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    r2d2::Pool::new(manager)
}

/// `unicode_lower(text)`: SQLite's own `lower()` only folds ASCII.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
    )
}

/// Runs `f` with a pooled connection on the blocking thread pool.
pub async fn with_conn<F, T>(pool: &DbPool, f: F) -> Result<T, AppError>
where
    F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut *conn)
    })
    .await?
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT UNIQUE NOT NULL,
            is_staff    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        -- Sentinel owner for orphaned content
        INSERT OR IGNORE INTO users (id, username, is_staff) VALUES (1, 'deleted', 0);

        CREATE TABLE IF NOT EXISTS articles (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            text        TEXT NOT NULL,
            author_id   INTEGER NOT NULL DEFAULT 1
                        REFERENCES users(id) ON DELETE SET DEFAULT,
            status      TEXT NOT NULL DEFAULT 'new'
                        CHECK (status IN ('new', 'moderated', 'rejected')),
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            like_count  INTEGER NOT NULL DEFAULT 0 CHECK (like_count >= 0)
        );
        CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status, created_at);

        CREATE TABLE IF NOT EXISTS comments (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id      INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            text            TEXT NOT NULL,
            author_id       INTEGER NOT NULL DEFAULT 1
                            REFERENCES users(id) ON DELETE SET DEFAULT,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            comm_like_count INTEGER NOT NULL DEFAULT 0 CHECK (comm_like_count >= 0)
        );
        CREATE INDEX IF NOT EXISTS idx_comments_article ON comments(article_id);

        CREATE TABLE IF NOT EXISTS tags (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT UNIQUE NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE TABLE IF NOT EXISTS article_tags (
            article_id  INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            tag_id      INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (article_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS article_likes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            article_id  INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            UNIQUE(user_id, article_id)
        );
        CREATE INDEX IF NOT EXISTS idx_article_likes_target ON article_likes(article_id);

        CREATE TABLE IF NOT EXISTS comment_likes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            comment_id  INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            UNIQUE(user_id, comment_id)
        );
        CREATE INDEX IF NOT EXISTS idx_comment_likes_target ON comment_likes(comment_id);
        ",
    )?;

    tracing::debug!("migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testing;

    #[test]
    fn migrations_are_idempotent_and_seed_the_sentinel() {
        let (_dir, pool) = testing::temp_pool();
        super::run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let name: String = conn
            .query_row("SELECT username FROM users WHERE id = ?1", [super::SENTINEL_USER_ID], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(name, "deleted");
    }

    #[test]
    fn pooled_connections_enforce_foreign_keys() {
        let (_dir, pool) = testing::temp_pool();
        let conn = pool.get().unwrap();
        let err = conn.execute(
            "INSERT INTO comments (article_id, text, author_id) VALUES (999, 'x', 1)",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn unicode_lower_folds_beyond_ascii() {
        let (_dir, pool) = testing::temp_pool();
        let conn = pool.get().unwrap();
        let folded: String = conn
            .query_row("SELECT unicode_lower('ПРИВЕТ Straße')", [], |r| r.get(0))
            .unwrap();
        assert_eq!(folded, "привет straße");
    }

    #[test]
    fn deleting_an_article_cascades_comments_and_likes() {
        let (_dir, pool) = testing::temp_pool();
        let alice = testing::create_user(&pool, "alice", false);
        let article = testing::create_article(&pool, alice, "A title long enough", "moderated");
        let comment = testing::create_comment(&pool, article, alice, "first");

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO comment_likes (user_id, comment_id) VALUES (?1, ?2)",
            [alice, comment],
        )
        .unwrap();
        conn.execute("DELETE FROM articles WHERE id = ?1", [article]).unwrap();

        let left: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM comments) + (SELECT COUNT(*) FROM comment_likes)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(left, 0);
    }
}
