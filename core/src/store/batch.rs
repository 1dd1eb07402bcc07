use rusqlite::{params, OptionalExtension};

use super::{BatchRow, EngineStore};
use crate::error::{EngineError, EngineResult};

impl EngineStore {
    pub fn insert_batch(&self, b: &BatchRow) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO import_batch
             (batch_id, source, fingerprint, label,
              rows_seen, rows_imported, rows_skipped, rows_errored, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                b.batch_id,
                b.source,
                b.fingerprint,
                b.label,
                b.rows_seen,
                b.rows_imported,
                b.rows_skipped,
                b.rows_errored,
                b.created_at,
            ],
        )?;
        Ok(())
    }

    /// Counters are immutable after the ingest that created the batch;
    /// this is only called from within that ingest's transaction.
    pub fn update_batch_counters(
        &self,
        batch_id: &str,
        rows_seen: i64,
        rows_imported: i64,
        rows_skipped: i64,
        rows_errored: i64,
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE import_batch
             SET rows_seen = ?2, rows_imported = ?3, rows_skipped = ?4, rows_errored = ?5
             WHERE batch_id = ?1",
            params![batch_id, rows_seen, rows_imported, rows_skipped, rows_errored],
        )?;
        Ok(())
    }

    pub fn batch(&self, batch_id: &str) -> EngineResult<Option<BatchRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {BATCH_COLS} FROM import_batch WHERE batch_id = ?1"),
                params![batch_id],
                Self::map_batch_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn batch_required(&self, batch_id: &str) -> EngineResult<BatchRow> {
        self.batch(batch_id)?
            .ok_or_else(|| EngineError::not_found("import batch", batch_id))
    }

    /// Most recent batch with this source/fingerprint pair, if any.
    pub fn find_batch(&self, source: &str, fingerprint: &str) -> EngineResult<Option<BatchRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {BATCH_COLS} FROM import_batch
                     WHERE source = ?1 AND fingerprint = ?2
                     ORDER BY created_at DESC, batch_id DESC LIMIT 1"
                ),
                params![source, fingerprint],
                Self::map_batch_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn batch_count(&self) -> EngineResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM import_batch", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_batch_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BatchRow> {
        Ok(BatchRow {
            batch_id: row.get(0)?,
            source: row.get(1)?,
            fingerprint: row.get(2)?,
            label: row.get(3)?,
            rows_seen: row.get(4)?,
            rows_imported: row.get(5)?,
            rows_skipped: row.get(6)?,
            rows_errored: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

const BATCH_COLS: &str = "batch_id, source, fingerprint, label, \
                          rows_seen, rows_imported, rows_skipped, rows_errored, created_at";
