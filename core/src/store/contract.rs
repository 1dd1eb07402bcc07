use rusqlite::{params, OptionalExtension};

use super::{ContractRow, ConsultationRow, EngineStore};
use crate::error::{EngineError, EngineResult};
use crate::types::contract_status;

impl EngineStore {
    // ── Contract ───────────────────────────────────────────────

    pub fn insert_contract(&self, c: &ContractRow) -> EngineResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO contract ({CONTRACT_COLS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                c.contract_id,
                c.policy_number,
                c.policy_key,
                c.alt_policy_key,
                c.account_holder,
                c.holder_key,
                c.insurer,
                c.product,
                c.advisor_id,
                c.status,
                c.source,
                c.begin_date,
                c.created_at,
                c.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_contract(&self, c: &ContractRow) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE contract
             SET policy_number = ?2, alt_policy_key = ?3, account_holder = ?4,
                 holder_key = ?5, insurer = ?6, product = ?7, advisor_id = ?8,
                 status = ?9, begin_date = ?10, updated_at = ?11
             WHERE contract_id = ?1",
            params![
                c.contract_id,
                c.policy_number,
                c.alt_policy_key,
                c.account_holder,
                c.holder_key,
                c.insurer,
                c.product,
                c.advisor_id,
                c.status,
                c.begin_date,
                c.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn contract(&self, contract_id: &str) -> EngineResult<Option<ContractRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CONTRACT_COLS} FROM contract WHERE contract_id = ?1"),
                params![contract_id],
                Self::map_contract_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn contract_required(&self, contract_id: &str) -> EngineResult<ContractRow> {
        self.contract(contract_id)?
            .ok_or_else(|| EngineError::not_found("contract", contract_id))
    }

    pub fn contract_by_policy_key(&self, policy_key: &str) -> EngineResult<Option<ContractRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CONTRACT_COLS} FROM contract WHERE policy_key = ?1"),
                params![policy_key],
                Self::map_contract_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn contracts_by_alt_policy_key(&self, key: &str) -> EngineResult<Vec<ContractRow>> {
        self.contract_query(
            &format!(
                "SELECT {CONTRACT_COLS} FROM contract
                 WHERE alt_policy_key = ?1 ORDER BY contract_id ASC"
            ),
            key,
        )
    }

    pub fn contracts_by_holder_key(&self, holder_key: &str) -> EngineResult<Vec<ContractRow>> {
        self.contract_query(
            &format!(
                "SELECT {CONTRACT_COLS} FROM contract
                 WHERE holder_key = ?1 ORDER BY contract_id ASC"
            ),
            holder_key,
        )
    }

    /// Contracts whose holder key contains, or is contained in, the probe.
    pub fn contracts_by_holder_containment(
        &self,
        holder_key: &str,
    ) -> EngineResult<Vec<ContractRow>> {
        self.contract_query(
            &format!(
                "SELECT {CONTRACT_COLS} FROM contract
                 WHERE holder_key IS NOT NULL AND holder_key <> '' AND ?1 <> ''
                   AND (instr(holder_key, ?1) > 0 OR instr(?1, holder_key) > 0)
                 ORDER BY contract_id ASC"
            ),
            holder_key,
        )
    }

    fn contract_query(&self, sql: &str, key: &str) -> EngineResult<Vec<ContractRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![key], Self::map_contract_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn contract_count(&self) -> EngineResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contract", [], |row| row.get(0))?;
        Ok(count)
    }

    // ── Set-based matching side effects ────────────────────────

    /// Contracts without an advisor adopt the advisor of their newest
    /// consultation. Scoped: with a batch id, only contracts referenced by
    /// that batch's commissions are touched.
    pub fn backfill_contract_advisors(
        &self,
        scope: Option<&str>,
        ts: &str,
    ) -> EngineResult<usize> {
        let changed = self.conn.execute(
            "UPDATE contract
             SET advisor_id = (SELECT cn.advisor_id FROM consultation cn
                               WHERE cn.policy_key = contract.policy_key
                                 AND cn.advisor_id IS NOT NULL
                               ORDER BY cn.created_at DESC, cn.consultation_id DESC
                               LIMIT 1),
                 updated_at = ?1
             WHERE advisor_id IS NULL
               AND EXISTS (SELECT 1 FROM consultation cn2
                           WHERE cn2.policy_key = contract.policy_key
                             AND cn2.advisor_id IS NOT NULL)
               AND (?2 IS NULL OR EXISTS
                    (SELECT 1 FROM commission cm
                     WHERE cm.contract_id = contract.contract_id AND cm.batch_id = ?2))",
            params![ts, scope],
        )?;
        Ok(changed)
    }

    /// Guarded status advance. Only this method (and nothing else in the
    /// engine) moves contracts into `commission_received` or `chargeback`;
    /// the NOT IN guards make re-runs no-ops and forbid regression.
    pub fn advance_contract_statuses(
        &self,
        scope: Option<&str>,
        ts: &str,
    ) -> EngineResult<usize> {
        let received = self.conn.execute(
            &format!(
                "UPDATE contract SET status = '{received}', updated_at = ?1
                 WHERE status NOT IN ('{received}', '{chargeback}', '{cancelled}')
                   AND EXISTS (SELECT 1 FROM commission cm
                               WHERE cm.contract_id = contract.contract_id
                                 AND cm.match_status IN ('auto_matched', 'manual_matched')
                                 AND cm.amount_cents > 0
                                 AND (?2 IS NULL OR cm.batch_id = ?2))",
                received = contract_status::COMMISSION_RECEIVED,
                chargeback = contract_status::CHARGEBACK,
                cancelled = contract_status::CANCELLED,
            ),
            params![ts, scope],
        )?;
        // Chargebacks run second: a cancellation outranks a received payment.
        let charged_back = self.conn.execute(
            &format!(
                "UPDATE contract SET status = '{chargeback}', updated_at = ?1
                 WHERE status NOT IN ('{chargeback}', '{cancelled}')
                   AND EXISTS (SELECT 1 FROM commission cm
                               WHERE cm.contract_id = contract.contract_id
                                 AND cm.match_status IN ('auto_matched', 'manual_matched')
                                 AND (cm.amount_cents < 0 OR cm.kind = 'chargeback')
                                 AND (?2 IS NULL OR cm.batch_id = ?2))",
                chargeback = contract_status::CHARGEBACK,
                cancelled = contract_status::CANCELLED,
            ),
            params![ts, scope],
        )?;
        Ok(received + charged_back)
    }

    /// Same guarded advance, scoped to a single contract (manual assign).
    pub fn advance_status_for_contract(&self, contract_id: &str, ts: &str) -> EngineResult<()> {
        self.conn.execute(
            &format!(
                "UPDATE contract SET status = '{received}', updated_at = ?1
                 WHERE contract_id = ?2
                   AND status NOT IN ('{received}', '{chargeback}', '{cancelled}')
                   AND EXISTS (SELECT 1 FROM commission cm
                               WHERE cm.contract_id = ?2
                                 AND cm.match_status IN ('auto_matched', 'manual_matched')
                                 AND cm.amount_cents > 0)",
                received = contract_status::COMMISSION_RECEIVED,
                chargeback = contract_status::CHARGEBACK,
                cancelled = contract_status::CANCELLED,
            ),
            params![ts, contract_id],
        )?;
        self.conn.execute(
            &format!(
                "UPDATE contract SET status = '{chargeback}', updated_at = ?1
                 WHERE contract_id = ?2
                   AND status NOT IN ('{chargeback}', '{cancelled}')
                   AND EXISTS (SELECT 1 FROM commission cm
                               WHERE cm.contract_id = ?2
                                 AND cm.match_status IN ('auto_matched', 'manual_matched')
                                 AND (cm.amount_cents < 0 OR cm.kind = 'chargeback'))",
                chargeback = contract_status::CHARGEBACK,
                cancelled = contract_status::CANCELLED,
            ),
            params![ts, contract_id],
        )?;
        Ok(())
    }

    // ── Consultation ───────────────────────────────────────────

    pub fn insert_consultation(&self, cn: &ConsultationRow) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO consultation
             (consultation_id, batch_id, policy_number, policy_key, account_holder,
              holder_key, advisor_name, advisor_id, insurer, product, consulted_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                cn.consultation_id,
                cn.batch_id,
                cn.policy_number,
                cn.policy_key,
                cn.account_holder,
                cn.holder_key,
                cn.advisor_name,
                cn.advisor_id,
                cn.insurer,
                cn.product,
                cn.consulted_on,
                cn.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn latest_consultation_for_policy(
        &self,
        policy_key: &str,
    ) -> EngineResult<Option<ConsultationRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT consultation_id, batch_id, policy_number, policy_key, account_holder,
                        holder_key, advisor_name, advisor_id, insurer, product, consulted_on,
                        created_at
                 FROM consultation WHERE policy_key = ?1
                 ORDER BY created_at DESC, consultation_id DESC LIMIT 1",
                params![policy_key],
                |row| {
                    Ok(ConsultationRow {
                        consultation_id: row.get(0)?,
                        batch_id: row.get(1)?,
                        policy_number: row.get(2)?,
                        policy_key: row.get(3)?,
                        account_holder: row.get(4)?,
                        holder_key: row.get(5)?,
                        advisor_name: row.get(6)?,
                        advisor_id: row.get(7)?,
                        insurer: row.get(8)?,
                        product: row.get(9)?,
                        consulted_on: row.get(10)?,
                        created_at: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn consultation_count(&self) -> EngineResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM consultation", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_contract_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContractRow> {
        Ok(ContractRow {
            contract_id: row.get(0)?,
            policy_number: row.get(1)?,
            policy_key: row.get(2)?,
            alt_policy_key: row.get(3)?,
            account_holder: row.get(4)?,
            holder_key: row.get(5)?,
            insurer: row.get(6)?,
            product: row.get(7)?,
            advisor_id: row.get(8)?,
            status: row.get(9)?,
            source: row.get(10)?,
            begin_date: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

const CONTRACT_COLS: &str = "contract_id, policy_number, policy_key, alt_policy_key, \
                             account_holder, holder_key, insurer, product, advisor_id, \
                             status, source, begin_date, created_at, updated_at";
