use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{StateStore, quote_ident};

/// Proof of holding the run lock; hand it back to [`StateStore::release_lock`].
#[derive(Debug, PartialEq, Eq)]
pub struct LockToken {
    owner: String,
}

impl LockToken {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Current lock row, as seen by another invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub owner: String,
    pub acquired_at: String,
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

impl StateStore {
    /// Try to take the advisory lock once. `None` means another run holds it.
    ///
    /// Must be called outside of any transaction so the lock row is
    /// visible to other connections immediately.
    pub fn try_lock(&self, conn: &Connection) -> Result<Option<LockToken>, StoreError> {
        match self.ensure_tables(conn) {
            Err(StoreError::Io(e)) if is_contention(&e) => {
                debug!("database busy while preparing lock table");
                return Ok(None);
            }
            other => other?,
        }

        let owner = Uuid::new_v4().to_string();
        let result = conn.execute(
            &format!(
                "INSERT INTO {} (id, owner, acquired_at) VALUES (1, ?1, ?2)",
                quote_ident(self.lock_table())
            ),
            params![owner, Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)],
        );

        match result {
            Ok(_) => {
                debug!(%owner, "acquired run lock");
                Ok(Some(LockToken { owner }))
            }
            Err(e) if is_contention(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Release a lock taken by this run. A row owned by someone else is left alone.
    pub fn release_lock(&self, conn: &Connection, token: LockToken) -> Result<(), StoreError> {
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE id = 1 AND owner = ?1", quote_ident(self.lock_table())),
            params![token.owner],
        )?;
        if deleted == 0 {
            warn!(owner = %token.owner, "run lock was already released");
        } else {
            debug!(owner = %token.owner, "released run lock");
        }
        Ok(())
    }

    pub fn lock_holder(&self, conn: &Connection) -> Result<Option<LockHolder>, StoreError> {
        self.ensure_tables(conn)?;
        let holder = conn
            .query_row(
                &format!(
                    "SELECT owner, acquired_at FROM {} WHERE id = 1",
                    quote_ident(self.lock_table())
                ),
                [],
                |row| {
                    Ok(LockHolder {
                        owner: row.get(0)?,
                        acquired_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(holder)
    }

    /// Drop the lock row whoever owns it. Returns the previous holder, if any.
    pub fn force_unlock(&self, conn: &Connection) -> Result<Option<LockHolder>, StoreError> {
        let holder = self.lock_holder(conn)?;
        if holder.is_some() {
            conn.execute(
                &format!("DELETE FROM {} WHERE id = 1", quote_ident(self.lock_table())),
                [],
            )?;
            warn!("run lock force-released");
        }
        Ok(holder)
    }
}
