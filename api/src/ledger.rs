//! Like ledger: at most one like row per (user, target), with a denormalized
//! counter on the target kept equal to the number of rows.
//!
//! Every mutation runs in a `BEGIN IMMEDIATE` transaction so the existence
//! check, the row write and the counter write are one unit. The immediate
//! transaction takes SQLite's write lock up front, which means two identical
//! requests cannot both observe "no row" and both increment.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Article,
    Comment,
}

impl LikeTarget {
    pub const ALL: [LikeTarget; 2] = [LikeTarget::Article, LikeTarget::Comment];

    pub fn label(&self) -> &'static str {
        match self {
            LikeTarget::Article => "article",
            LikeTarget::Comment => "comment",
        }
    }

    fn target_table(&self) -> &'static str {
        match self {
            LikeTarget::Article => "articles",
            LikeTarget::Comment => "comments",
        }
    }

    fn like_table(&self) -> &'static str {
        match self {
            LikeTarget::Article => "article_likes",
            LikeTarget::Comment => "comment_likes",
        }
    }

    fn target_column(&self) -> &'static str {
        match self {
            LikeTarget::Article => "article_id",
            LikeTarget::Comment => "comment_id",
        }
    }

    fn counter_column(&self) -> &'static str {
        match self {
            LikeTarget::Article => "like_count",
            LikeTarget::Comment => "comm_like_count",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{} {id} not found", .kind.label())]
    TargetNotFound { kind: LikeTarget, id: i64 },

    #[error("no like on {} {id}", .kind.label())]
    NotLiked { kind: LikeTarget, id: i64 },

    #[error("{} {id} already liked", .kind.label())]
    AlreadyLiked { kind: LikeTarget, id: i64 },

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Records a like and returns the new counter value.
pub fn like_on(
    conn: &mut Connection,
    kind: LikeTarget,
    user_id: i64,
    target_id: i64,
) -> Result<i64, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = read_counter(&tx, kind, target_id)?
        .ok_or(LedgerError::TargetNotFound { kind, id: target_id })?;

    let inserted = tx.execute(
        &format!(
            "INSERT INTO {table} (user_id, {col}) VALUES (?1, ?2)
             ON CONFLICT (user_id, {col}) DO NOTHING",
            table = kind.like_table(),
            col = kind.target_column(),
        ),
        params![user_id, target_id],
    )?;

    if inserted == 0 {
        // Dropping `tx` rolls back; nothing was written anyway.
        tracing::debug!(user_id, target_id, kind = kind.label(), "duplicate like");
        return Err(LedgerError::AlreadyLiked { kind, id: target_id });
    }

    let updated = current + 1;
    write_counter(&tx, kind, target_id, updated)?;
    tx.commit()?;

    tracing::info!(user_id, target_id, kind = kind.label(), count = updated, "liked");
    Ok(updated)
}

/// Removes a like and returns the new counter value.
///
/// A counter that is already 0 while a row exists is a consistency fault: it
/// is logged and the counter stays at 0.
pub fn like_off(
    conn: &mut Connection,
    kind: LikeTarget,
    user_id: i64,
    target_id: i64,
) -> Result<i64, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = read_counter(&tx, kind, target_id)?
        .ok_or(LedgerError::TargetNotFound { kind, id: target_id })?;

    let deleted = tx.execute(
        &format!(
            "DELETE FROM {table} WHERE user_id = ?1 AND {col} = ?2",
            table = kind.like_table(),
            col = kind.target_column(),
        ),
        params![user_id, target_id],
    )?;

    if deleted == 0 {
        return Err(LedgerError::NotLiked { kind, id: target_id });
    }

    let updated = if current > 0 {
        current - 1
    } else {
        tracing::warn!(
            user_id,
            target_id,
            kind = kind.label(),
            "like counter already 0 while a like row existed, clamping"
        );
        0
    };
    write_counter(&tx, kind, target_id, updated)?;
    tx.commit()?;

    tracing::info!(user_id, target_id, kind = kind.label(), count = updated, "unliked");
    Ok(updated)
}

pub fn has_liked(
    conn: &Connection,
    kind: LikeTarget,
    user_id: i64,
    target_id: i64,
) -> Result<bool, LedgerError> {
    let exists = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE user_id = ?1 AND {col} = ?2)",
            table = kind.like_table(),
            col = kind.target_column(),
        ),
        params![user_id, target_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Whether a counter mismatch found by [`reconcile`] points at a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// Nothing should have moved the counters (startup check): log at `warn`.
    Unexpected,
    /// Like rows were just cascaded away on purpose: log at `info`.
    Expected,
}

/// Rewrites every counter of `kind` that disagrees with its like rows and
/// returns how many were fixed. Callers own the transaction.
pub fn reconcile(conn: &Connection, kind: LikeTarget, drift: Drift) -> Result<usize, LedgerError> {
    let sql = format!(
        "SELECT id, stored, actual FROM (
             SELECT t.id AS id,
                    t.{counter} AS stored,
                    (SELECT COUNT(*) FROM {likes} l WHERE l.{col} = t.id) AS actual
             FROM {targets} t
         ) WHERE stored != actual",
        counter = kind.counter_column(),
        likes = kind.like_table(),
        col = kind.target_column(),
        targets = kind.target_table(),
    );

    let drifted = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    for (id, stored, actual) in &drifted {
        match drift {
            Drift::Unexpected => {
                tracing::warn!(kind = kind.label(), id, stored, actual, "repairing like counter")
            }
            Drift::Expected => {
                tracing::info!(kind = kind.label(), id, stored, actual, "adjusting like counter")
            }
        }
        write_counter(conn, kind, *id, *actual)?;
    }

    Ok(drifted.len())
}

/// Reconciles all target kinds in one transaction.
pub fn reconcile_all(conn: &mut Connection) -> Result<usize, LedgerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut fixed = 0;
    for kind in LikeTarget::ALL {
        fixed += reconcile(&tx, kind, Drift::Unexpected)?;
    }
    tx.commit()?;
    Ok(fixed)
}

fn read_counter(conn: &Connection, kind: LikeTarget, id: i64) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        &format!(
            "SELECT {counter} FROM {table} WHERE id = ?1",
            counter = kind.counter_column(),
            table = kind.target_table(),
        ),
        [id],
        |row| row.get(0),
    )
    .optional()
}

fn write_counter(conn: &Connection, kind: LikeTarget, id: i64, value: i64) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "UPDATE {table} SET {counter} = ?1 WHERE id = ?2",
            counter = kind.counter_column(),
            table = kind.target_table(),
        ),
        params![value, id],
    )?;
    Ok(())
}
