use rusqlite::{params, OptionalExtension};

use super::{
    AdvisorPeriodTotals, ClearanceCounts, CommissionRow, EngineStore, SplitWork,
};
use crate::error::{EngineError, EngineResult};
use crate::split::Split;
use crate::types::match_status;

impl EngineStore {
    pub fn insert_commission(&self, cm: &CommissionRow) -> EngineResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO commission ({COMMISSION_COLS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                         ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
            ),
            params![
                cm.commission_id,
                cm.batch_id,
                cm.policy_number,
                cm.policy_key,
                cm.account_holder,
                cm.holder_key,
                cm.broker_name,
                cm.broker_key,
                cm.amount_cents,
                cm.kind,
                cm.paid_on,
                cm.installment_no,
                cm.installment_count,
                cm.row_fingerprint,
                cm.match_status,
                cm.match_confidence,
                cm.contract_id,
                cm.advisor_id,
                cm.advisor_share_cents,
                cm.team_lead_share_cents,
                cm.agency_share_cents,
                cm.created_at,
                cm.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn commission(&self, commission_id: &str) -> EngineResult<Option<CommissionRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {COMMISSION_COLS} FROM commission WHERE commission_id = ?1"),
                params![commission_id],
                Self::map_commission_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn commission_required(&self, commission_id: &str) -> EngineResult<CommissionRow> {
        self.commission(commission_id)?
            .ok_or_else(|| EngineError::not_found("commission", commission_id))
    }

    pub fn fingerprint_exists(&self, row_fingerprint: &str) -> EngineResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM commission WHERE row_fingerprint = ?1",
            params![row_fingerprint],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ── Set-based automatic matching ───────────────────────────
    //
    // Every step filters on match_status = 'unmatched' and threads the
    // explicit batch scope, so re-runs and concurrent manual assignments
    // are safe. Candidate subqueries carry their own aliases (c, c2) and
    // never reference the outer statement's columns by bare name.

    /// Step 1: exact policy-key match against contracts. Confidence 1.0.
    pub fn match_exact_policy(&self, scope: Option<&str>, ts: &str) -> EngineResult<usize> {
        let changed = self.conn.execute(
            "UPDATE commission
             SET contract_id = (SELECT c.contract_id FROM contract c
                                WHERE c.policy_key = commission.policy_key),
                 advisor_id = (SELECT c.advisor_id FROM contract c
                               WHERE c.policy_key = commission.policy_key),
                 match_status = 'auto_matched',
                 match_confidence = 1.0,
                 updated_at = ?1
             WHERE match_status = 'unmatched'
               AND policy_key <> ''
               AND EXISTS (SELECT 1 FROM contract c2
                           WHERE c2.policy_key = commission.policy_key)
               AND (?2 IS NULL OR batch_id = ?2)",
            params![ts, scope],
        )?;
        Ok(changed)
    }

    /// Step 2: alternate-policy-key fallback, same effect as step 1.
    /// `alt_policy_key` is not unique; ties break on the lowest contract id.
    pub fn match_alternate_policy(&self, scope: Option<&str>, ts: &str) -> EngineResult<usize> {
        let changed = self.conn.execute(
            "UPDATE commission
             SET contract_id = (SELECT c.contract_id FROM contract c
                                WHERE c.alt_policy_key = commission.policy_key
                                ORDER BY c.contract_id ASC LIMIT 1),
                 advisor_id = (SELECT c.advisor_id FROM contract c
                               WHERE c.alt_policy_key = commission.policy_key
                               ORDER BY c.contract_id ASC LIMIT 1),
                 match_status = 'auto_matched',
                 match_confidence = 1.0,
                 updated_at = ?1
             WHERE match_status = 'unmatched'
               AND policy_key <> ''
               AND EXISTS (SELECT 1 FROM contract c2
                           WHERE c2.alt_policy_key = commission.policy_key)
               AND (?2 IS NULL OR batch_id = ?2)",
            params![ts, scope],
        )?;
        Ok(changed)
    }

    /// Distinct policy keys of still-unmatched commissions that have at
    /// least one consultation record (step 3 candidates).
    pub fn unmatched_policy_keys_with_consultation(
        &self,
        scope: Option<&str>,
    ) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT cm.policy_key FROM commission cm
             WHERE cm.match_status = 'unmatched'
               AND cm.policy_key <> ''
               AND EXISTS (SELECT 1 FROM consultation cn
                           WHERE cn.policy_key = cm.policy_key)
               AND (?1 IS NULL OR cm.batch_id = ?1)
             ORDER BY cm.policy_key ASC",
        )?;
        let keys = stmt
            .query_map(params![scope], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Link every still-unmatched commission on a policy key to a contract.
    /// Used by the consultation step (auto, with confidence) and by sibling
    /// propagation during manual assignment (manual, no confidence).
    pub fn link_unmatched_commissions(
        &self,
        policy_key: &str,
        contract_id: &str,
        advisor_id: Option<&str>,
        status: &str,
        confidence: Option<f64>,
        scope: Option<&str>,
        ts: &str,
    ) -> EngineResult<usize> {
        let changed = self.conn.execute(
            "UPDATE commission
             SET contract_id = ?2,
                 advisor_id = COALESCE(?3, advisor_id),
                 match_status = ?4,
                 match_confidence = ?5,
                 updated_at = ?6
             WHERE match_status = 'unmatched'
               AND policy_key = ?1
               AND (?7 IS NULL OR batch_id = ?7)",
            params![policy_key, contract_id, advisor_id, status, confidence, ts, scope],
        )?;
        Ok(changed)
    }

    /// Step 4 (commission side): matched commissions without an advisor
    /// adopt their contract's advisor once the contract has one.
    pub fn adopt_contract_advisors(&self, scope: Option<&str>, ts: &str) -> EngineResult<usize> {
        let changed = self.conn.execute(
            "UPDATE commission
             SET advisor_id = (SELECT c.advisor_id FROM contract c
                               WHERE c.contract_id = commission.contract_id),
                 updated_at = ?1
             WHERE match_status IN ('auto_matched', 'manual_matched')
               AND advisor_id IS NULL
               AND contract_id IS NOT NULL
               AND EXISTS (SELECT 1 FROM contract c2
                           WHERE c2.contract_id = commission.contract_id
                             AND c2.advisor_id IS NOT NULL)
               AND (?2 IS NULL OR batch_id = ?2)",
            params![ts, scope],
        )?;
        Ok(changed)
    }

    /// Step 5: resolve the advisor of matched-but-advisorless commissions
    /// through the broker mapping table on the normalized broker name.
    pub fn resolve_broker_mappings(&self, scope: Option<&str>, ts: &str) -> EngineResult<usize> {
        let changed = self.conn.execute(
            "UPDATE commission
             SET advisor_id = (SELECT m.advisor_id FROM broker_mapping m
                               WHERE m.broker_key = commission.broker_key),
                 updated_at = ?1
             WHERE match_status IN ('auto_matched', 'manual_matched')
               AND advisor_id IS NULL
               AND contract_id IS NOT NULL
               AND broker_key IS NOT NULL AND broker_key <> ''
               AND EXISTS (SELECT 1 FROM broker_mapping m2
                           WHERE m2.broker_key = commission.broker_key)
               AND (?2 IS NULL OR batch_id = ?2)",
            params![ts, scope],
        )?;
        Ok(changed)
    }

    /// Step 6 work list: matched commissions with an advisor that carries a
    /// rate model but whose shares are not computed yet.
    pub fn rows_needing_split(&self, scope: Option<&str>) -> EngineResult<Vec<SplitWork>> {
        let mut stmt = self.conn.prepare(
            "SELECT cm.commission_id, cm.amount_cents, cm.advisor_id
             FROM commission cm
             JOIN advisor a ON a.advisor_id = cm.advisor_id
             WHERE cm.match_status IN ('auto_matched', 'manual_matched')
               AND cm.advisor_share_cents IS NULL
               AND a.commission_rate IS NOT NULL
               AND (?1 IS NULL OR cm.batch_id = ?1)
             ORDER BY cm.commission_id ASC",
        )?;
        let rows = stmt
            .query_map(params![scope], Self::map_split_work)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Matched commissions of one advisor (rate-change recompute scope).
    pub fn matched_rows_for_advisor(&self, advisor_id: &str) -> EngineResult<Vec<SplitWork>> {
        let mut stmt = self.conn.prepare(
            "SELECT cm.commission_id, cm.amount_cents, cm.advisor_id
             FROM commission cm
             WHERE cm.match_status IN ('auto_matched', 'manual_matched')
               AND cm.advisor_id = ?1
             ORDER BY cm.commission_id ASC",
        )?;
        let rows = stmt
            .query_map(params![advisor_id], Self::map_split_work)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Matched commissions of one contract (contract-scoped recompute).
    pub fn matched_rows_for_contract(&self, contract_id: &str) -> EngineResult<Vec<SplitWork>> {
        let mut stmt = self.conn.prepare(
            "SELECT cm.commission_id, cm.amount_cents, cm.advisor_id
             FROM commission cm
             WHERE cm.match_status IN ('auto_matched', 'manual_matched')
               AND cm.advisor_id IS NOT NULL
               AND cm.contract_id = ?1
             ORDER BY cm.commission_id ASC",
        )?;
        let rows = stmt
            .query_map(params![contract_id], Self::map_split_work)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Write (or clear, with `None`) the computed shares of one commission.
    pub fn apply_split(
        &self,
        commission_id: &str,
        split: Option<Split>,
        ts: &str,
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE commission
             SET advisor_share_cents = ?2, team_lead_share_cents = ?3,
                 agency_share_cents = ?4, updated_at = ?5
             WHERE commission_id = ?1",
            params![
                commission_id,
                split.map(|s| s.advisor_cents),
                split.map(|s| s.team_lead_cents),
                split.map(|s| s.agency_cents),
                ts,
            ],
        )?;
        Ok(())
    }

    // ── Manual assignment ──────────────────────────────────────

    /// Point one commission at a contract/advisor as a manual match.
    /// Shares are cleared; the caller recomputes them in the same
    /// transaction.
    pub fn assign_commission(
        &self,
        commission_id: &str,
        contract_id: &str,
        advisor_id: Option<&str>,
        ts: &str,
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE commission
             SET contract_id = ?2, advisor_id = ?3,
                 match_status = 'manual_matched', match_confidence = NULL,
                 advisor_share_cents = NULL, team_lead_share_cents = NULL,
                 agency_share_cents = NULL, updated_at = ?4
             WHERE commission_id = ?1",
            params![commission_id, contract_id, advisor_id, ts],
        )?;
        Ok(())
    }

    pub fn set_ignored(&self, commission_id: &str, ignored: bool, ts: &str) -> EngineResult<bool> {
        let (from, to) = if ignored {
            (match_status::UNMATCHED, match_status::IGNORED)
        } else {
            (match_status::IGNORED, match_status::UNMATCHED)
        };
        let changed = self.conn.execute(
            "UPDATE commission SET match_status = ?3, updated_at = ?4
             WHERE commission_id = ?1 AND match_status = ?2",
            params![commission_id, from, to, ts],
        )?;
        Ok(changed > 0)
    }

    // ── Suggestion candidates (contract → commission direction) ─

    pub fn unmatched_by_policy_key(&self, policy_key: &str) -> EngineResult<Vec<CommissionRow>> {
        self.commission_query(
            &format!(
                "SELECT {COMMISSION_COLS} FROM commission
                 WHERE match_status = 'unmatched' AND policy_key = ?1 AND ?1 <> ''
                 ORDER BY commission_id ASC"
            ),
            policy_key,
        )
    }

    pub fn unmatched_by_holder_key(&self, holder_key: &str) -> EngineResult<Vec<CommissionRow>> {
        self.commission_query(
            &format!(
                "SELECT {COMMISSION_COLS} FROM commission
                 WHERE match_status = 'unmatched' AND holder_key = ?1 AND ?1 <> ''
                 ORDER BY commission_id ASC"
            ),
            holder_key,
        )
    }

    pub fn unmatched_by_holder_containment(
        &self,
        holder_key: &str,
    ) -> EngineResult<Vec<CommissionRow>> {
        self.commission_query(
            &format!(
                "SELECT {COMMISSION_COLS} FROM commission
                 WHERE match_status = 'unmatched'
                   AND holder_key IS NOT NULL AND holder_key <> '' AND ?1 <> ''
                   AND (instr(holder_key, ?1) > 0 OR instr(?1, holder_key) > 0)
                 ORDER BY commission_id ASC"
            ),
            holder_key,
        )
    }

    /// Still-unmatched siblings sharing a source policy key.
    pub fn sibling_unmatched_ids(
        &self,
        policy_key: &str,
        exclude_id: &str,
    ) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT commission_id FROM commission
             WHERE match_status = 'unmatched' AND policy_key = ?1 AND ?1 <> ''
               AND commission_id <> ?2
             ORDER BY commission_id ASC",
        )?;
        let ids = stmt
            .query_map(params![policy_key, exclude_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // ── Read aggregations ──────────────────────────────────────

    /// Clearance counts in a single pass over the commission table.
    /// Categories form a cascade, so each row lands in exactly one bucket.
    pub fn clearance_counts(&self) -> EngineResult<ClearanceCounts> {
        let counts = self.conn.query_row(
            "SELECT
                 COALESCE(SUM(CASE WHEN cm.match_status = 'unmatched'
                                   THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN cm.match_status IN ('auto_matched', 'manual_matched')
                                    AND cm.advisor_id IS NULL
                                   THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN cm.match_status IN ('auto_matched', 'manual_matched')
                                    AND cm.advisor_id IS NOT NULL
                                    AND a.commission_rate IS NULL
                                   THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN cm.match_status IN ('auto_matched', 'manual_matched')
                                    AND cm.advisor_id IS NOT NULL
                                    AND a.commission_rate IS NOT NULL
                                    AND cm.advisor_share_cents IS NULL
                                   THEN 1 ELSE 0 END), 0)
             FROM commission cm
             LEFT JOIN advisor a ON a.advisor_id = cm.advisor_id
             WHERE cm.match_status <> 'ignored'",
            [],
            |row| {
                Ok(ClearanceCounts {
                    no_contract: row.get(0)?,
                    unknown_broker: row.get(1)?,
                    no_rate_model: row.get(2)?,
                    no_split: row.get(3)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Per-advisor gross/net/chargeback totals for a period (dashboard).
    pub fn dashboard_totals(
        &self,
        from: &str,
        to: &str,
    ) -> EngineResult<Vec<AdvisorPeriodTotals>> {
        let mut stmt = self.conn.prepare(
            "SELECT cm.advisor_id, a.name,
                    COALESCE(SUM(CASE WHEN cm.amount_cents > 0
                                      THEN cm.advisor_share_cents + cm.team_lead_share_cents
                                      ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN cm.amount_cents > 0
                                      THEN cm.advisor_share_cents ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN cm.amount_cents < 0
                                      THEN cm.advisor_share_cents ELSE 0 END), 0),
                    COUNT(*)
             FROM commission cm
             JOIN advisor a ON a.advisor_id = cm.advisor_id
             WHERE cm.match_status IN ('auto_matched', 'manual_matched')
               AND cm.advisor_share_cents IS NOT NULL
               AND cm.paid_on >= ?1 AND cm.paid_on < ?2
             GROUP BY cm.advisor_id, a.name
             ORDER BY 3 DESC",
        )?;
        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok(AdvisorPeriodTotals {
                    advisor_id: row.get(0)?,
                    name: row.get(1)?,
                    gross_cents: row.get(2)?,
                    net_cents: row.get(3)?,
                    chargeback_cents: row.get(4)?,
                    commission_count: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn recent_commissions_for_advisor(
        &self,
        advisor_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<CommissionRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMMISSION_COLS} FROM commission
             WHERE advisor_id = ?1 AND match_status IN ('auto_matched', 'manual_matched')
             ORDER BY paid_on DESC, commission_id DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![advisor_id, limit as i64], Self::map_commission_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Test and tooling helpers ───────────────────────────────

    pub fn commission_count(&self) -> EngineResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commission", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn commissions_in_batch(&self, batch_id: &str) -> EngineResult<Vec<CommissionRow>> {
        self.commission_query(
            &format!(
                "SELECT {COMMISSION_COLS} FROM commission
                 WHERE batch_id = ?1 ORDER BY commission_id ASC"
            ),
            batch_id,
        )
    }

    pub fn list_commissions(&self) -> EngineResult<Vec<CommissionRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMMISSION_COLS} FROM commission ORDER BY commission_id ASC"
        ))?;
        let rows = stmt
            .query_map([], Self::map_commission_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn commission_query(&self, sql: &str, key: &str) -> EngineResult<Vec<CommissionRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![key], Self::map_commission_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_split_work(row: &rusqlite::Row<'_>) -> rusqlite::Result<SplitWork> {
        Ok(SplitWork {
            commission_id: row.get(0)?,
            amount_cents: row.get(1)?,
            advisor_id: row.get(2)?,
        })
    }

    fn map_commission_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommissionRow> {
        Ok(CommissionRow {
            commission_id: row.get(0)?,
            batch_id: row.get(1)?,
            policy_number: row.get(2)?,
            policy_key: row.get(3)?,
            account_holder: row.get(4)?,
            holder_key: row.get(5)?,
            broker_name: row.get(6)?,
            broker_key: row.get(7)?,
            amount_cents: row.get(8)?,
            kind: row.get(9)?,
            paid_on: row.get(10)?,
            installment_no: row.get(11)?,
            installment_count: row.get(12)?,
            row_fingerprint: row.get(13)?,
            match_status: row.get(14)?,
            match_confidence: row.get(15)?,
            contract_id: row.get(16)?,
            advisor_id: row.get(17)?,
            advisor_share_cents: row.get(18)?,
            team_lead_share_cents: row.get(19)?,
            agency_share_cents: row.get(20)?,
            created_at: row.get(21)?,
            updated_at: row.get(22)?,
        })
    }
}

const COMMISSION_COLS: &str = "commission_id, batch_id, policy_number, policy_key, \
                               account_holder, holder_key, broker_name, broker_key, \
                               amount_cents, kind, paid_on, installment_no, installment_count, \
                               row_fingerprint, match_status, match_confidence, contract_id, \
                               advisor_id, advisor_share_cents, team_lead_share_cents, \
                               agency_share_cents, created_at, updated_at";
