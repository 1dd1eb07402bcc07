use rusqlite::{params, OptionalExtension};

use super::{ActivityRow, EngineStore, StatementRow};
use crate::error::{EngineError, EngineResult};

impl EngineStore {
    /// Per-advisor aggregation of matched, split commissions paid in
    /// [from, to). Rows without computed shares are clearance cases and are
    /// deliberately excluded.
    pub fn settlement_activity(&self, from: &str, to: &str) -> EngineResult<Vec<ActivityRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT cm.advisor_id,
                    COALESCE(SUM(CASE WHEN cm.amount_cents > 0
                                      THEN cm.advisor_share_cents + cm.team_lead_share_cents
                                      ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN cm.amount_cents > 0
                                      THEN cm.team_lead_share_cents ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN cm.amount_cents < 0
                                      THEN cm.advisor_share_cents ELSE 0 END), 0),
                    COUNT(*)
             FROM commission cm
             WHERE cm.match_status IN ('auto_matched', 'manual_matched')
               AND cm.advisor_id IS NOT NULL
               AND cm.advisor_share_cents IS NOT NULL
               AND cm.paid_on >= ?1 AND cm.paid_on < ?2
             GROUP BY cm.advisor_id
             ORDER BY cm.advisor_id ASC",
        )?;
        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok(ActivityRow {
                    advisor_id: row.get(0)?,
                    gross_cents: row.get(1)?,
                    team_lead_cut_cents: row.get(2)?,
                    chargeback_cents: row.get(3)?,
                    commission_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Override income per team lead for [from, to): the team-lead shares
    /// deducted from their supervised advisors' commissions.
    pub fn override_income(&self, from: &str, to: &str) -> EngineResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.team_lead_id, COALESCE(SUM(cm.team_lead_share_cents), 0)
             FROM commission cm
             JOIN advisor a ON a.advisor_id = cm.advisor_id
             WHERE a.team_lead_id IS NOT NULL
               AND cm.match_status IN ('auto_matched', 'manual_matched')
               AND cm.advisor_share_cents IS NOT NULL
               AND cm.paid_on >= ?1 AND cm.paid_on < ?2
             GROUP BY a.team_lead_id
             ORDER BY a.team_lead_id ASC",
        )?;
        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Statement rows ─────────────────────────────────────────

    pub fn insert_statement(&self, s: &StatementRow) -> EngineResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO settlement_statement ({STATEMENT_COLS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                s.statement_id,
                s.month,
                s.advisor_id,
                s.revision,
                s.gross_cents,
                s.team_lead_cut_cents,
                s.net_cents,
                s.chargeback_cents,
                s.override_cents,
                s.payout_cents,
                s.commission_count,
                s.status,
                s.locked as i64,
                s.created_at,
                s.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete_statement(&self, statement_id: &str) -> EngineResult<()> {
        self.conn.execute(
            "DELETE FROM settlement_statement WHERE statement_id = ?1",
            params![statement_id],
        )?;
        Ok(())
    }

    pub fn update_statement_status(
        &self,
        statement_id: &str,
        status: &str,
        locked: bool,
        ts: &str,
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE settlement_statement
             SET status = ?2, locked = ?3, updated_at = ?4
             WHERE statement_id = ?1",
            params![statement_id, status, locked as i64, ts],
        )?;
        Ok(())
    }

    pub fn statement(&self, statement_id: &str) -> EngineResult<Option<StatementRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {STATEMENT_COLS} FROM settlement_statement WHERE statement_id = ?1"
                ),
                params![statement_id],
                Self::map_statement_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn statement_required(&self, statement_id: &str) -> EngineResult<StatementRow> {
        self.statement(statement_id)?
            .ok_or_else(|| EngineError::not_found("settlement statement", statement_id))
    }

    /// Highest revision for (month, advisor), if any.
    pub fn latest_statement(
        &self,
        month: &str,
        advisor_id: &str,
    ) -> EngineResult<Option<StatementRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {STATEMENT_COLS} FROM settlement_statement
                     WHERE month = ?1 AND advisor_id = ?2
                     ORDER BY revision DESC LIMIT 1"
                ),
                params![month, advisor_id],
                Self::map_statement_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn statements_for_month(&self, month: &str) -> EngineResult<Vec<StatementRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATEMENT_COLS} FROM settlement_statement
             WHERE month = ?1 ORDER BY advisor_id ASC, revision ASC"
        ))?;
        let rows = stmt
            .query_map(params![month], Self::map_statement_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn statement_count(&self) -> EngineResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM settlement_statement",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_statement_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatementRow> {
        Ok(StatementRow {
            statement_id: row.get(0)?,
            month: row.get(1)?,
            advisor_id: row.get(2)?,
            revision: row.get(3)?,
            gross_cents: row.get(4)?,
            team_lead_cut_cents: row.get(5)?,
            net_cents: row.get(6)?,
            chargeback_cents: row.get(7)?,
            override_cents: row.get(8)?,
            payout_cents: row.get(9)?,
            commission_count: row.get(10)?,
            status: row.get(11)?,
            locked: row.get::<_, i64>(12)? != 0,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

const STATEMENT_COLS: &str = "statement_id, month, advisor_id, revision, gross_cents, \
                              team_lead_cut_cents, net_cents, chargeback_cents, \
                              override_cents, payout_cents, commission_count, status, \
                              locked, created_at, updated_at";
