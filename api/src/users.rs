use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use rusqlite::{Connection, TransactionBehavior};

use crate::{
    auth,
    db::{self, SENTINEL_USER_ID},
    error::AppError,
    ledger::{self, Drift, LikeTarget},
    AppState,
};

/// Deletes a user. Their articles and comments move to the sentinel user via
/// the foreign keys; their like rows cascade away, so the counters are
/// reconciled inside the same transaction.
pub fn remove_user(conn: &mut Connection, user_id: i64) -> Result<(), AppError> {
    if user_id == SENTINEL_USER_ID {
        return Err(AppError::Forbidden("the sentinel user cannot be deleted".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
    if deleted == 0 {
        return Err(AppError::not_found("user", user_id));
    }

    let mut repaired = 0;
    for kind in LikeTarget::ALL {
        repaired += ledger::reconcile(&tx, kind, Drift::Expected)?;
    }
    tx.commit()?;

    tracing::info!(user_id, repaired, "user deleted");
    Ok(())
}

/// DELETE /user/{id}/ — staff only
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let caller_id = auth::extract_user_id(&headers, &state.jwt_secret)?;

    db::with_conn(&state.db, move |conn| {
        let caller = auth::require_user(conn, caller_id)?;
        if !caller.is_staff {
            return Err(AppError::Forbidden("staff only".into()));
        }
        remove_user(conn, id)?;
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn content_moves_to_sentinel_and_counters_stay_consistent() {
        let (_dir, pool) = testing::temp_pool();
        let alice = testing::create_user(&pool, "alice", false);
        let bob = testing::create_user(&pool, "bob", false);
        let article = testing::create_article(&pool, alice, "A title long enough", "moderated");
        let comment = testing::create_comment(&pool, article, bob, "bob was here");
        let mut conn = pool.get().unwrap();
        ledger::like_on(&mut conn, LikeTarget::Article, bob, article).unwrap();
        ledger::like_on(&mut conn, LikeTarget::Article, alice, article).unwrap();
        ledger::like_on(&mut conn, LikeTarget::Comment, bob, comment).unwrap();

        remove_user(&mut conn, bob).unwrap();

        let (author, like_count): (i64, i64) = conn
            .query_row(
                "SELECT c.author_id, a.like_count FROM comments c
                 JOIN articles a ON a.id = c.article_id WHERE c.id = ?1",
                [comment],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(author, SENTINEL_USER_ID);
        assert_eq!(like_count, 1);
        let comm_likes: i64 = conn
            .query_row("SELECT comm_like_count FROM comments WHERE id = ?1", [comment], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(comm_likes, 0);
        assert!(ledger::has_liked(&conn, LikeTarget::Article, alice, article).unwrap());
    }

    #[test]
    fn sentinel_and_unknown_users() {
        let (_dir, pool) = testing::temp_pool();
        let mut conn = pool.get().unwrap();
        assert!(matches!(remove_user(&mut conn, SENTINEL_USER_ID), Err(AppError::Forbidden(_))));
        assert!(matches!(remove_user(&mut conn, 4242), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn only_staff_may_delete() {
        let (_dir, pool) = testing::temp_pool();
        let alice = testing::create_user(&pool, "alice", false);
        let admin = testing::create_user(&pool, "admin", true);
        let app = crate::router(testing::state(pool));
        let uri = format!("/user/{alice}/");

        let (status, _) =
            testing::send(&app, "DELETE", &uri, Some(&testing::token(alice)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            testing::send(&app, "DELETE", &uri, Some(&testing::token(admin)), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
