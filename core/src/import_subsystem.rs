//! Import batch manager — persists already-tokenized rows from the two
//! external sources, deduplicates at batch and row level and keeps the
//! per-batch counters.
//!
//! Design:
//!   - A batch whose (source, fingerprint) pair was already ingested is a
//!     no-op returning the prior batch, unless the caller forces it.
//!   - Commission rows carry a SHA-256 fingerprint over their normalized
//!     business fields; a fingerprint seen before (earlier batch or earlier
//!     row of the same file) is skipped and counted, never inserted twice.
//!   - Contract rows are upserted through the pure merge policy so that a
//!     re-import can never regress an engine-owned contract status.
//!   - Malformed rows are counted in `rows_errored` and do not abort the
//!     batch; the whole ingest is one transaction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::event::EngineEvent;
use crate::merge::{merge_contract, ContractPatch};
use crate::normalize::{normalize_account_holder, normalize_broker_name, normalize_policy_number};
use crate::store::{
    now_iso, BatchRow, CommissionRow, ConsultationRow, ContractRow, EngineStore,
};
use crate::types::{contract_status, match_status, Cents, PaymentKind, SourceType};

/// One tokenized commission-statement row, as delivered by the parsing
/// layer. `amount` is in currency units (euros), converted to cents here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionRowInput {
    pub policy_number: String,
    pub amount: f64,
    pub kind: Option<PaymentKind>,
    pub paid_on: String,
    pub broker_name: Option<String>,
    pub account_holder: Option<String>,
    pub installment_no: Option<i64>,
    pub installment_count: Option<i64>,
}

/// One tokenized portfolio-export contract row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRowInput {
    pub policy_number: String,
    pub alternate_policy_number: Option<String>,
    pub account_holder: Option<String>,
    pub insurer: Option<String>,
    pub product: Option<String>,
    pub advisor_name: Option<String>,
    pub status: Option<String>,
    pub begin_date: Option<String>,
}

/// One tokenized consultation-protocol row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRowInput {
    pub policy_number: String,
    pub account_holder: Option<String>,
    pub advisor_name: Option<String>,
    pub insurer: Option<String>,
    pub product: Option<String>,
    pub consulted_on: Option<String>,
}

/// The rows of one upload, typed by source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", content = "rows", rename_all = "snake_case")]
pub enum ImportRows {
    Commission(Vec<CommissionRowInput>),
    Contract(Vec<ContractRowInput>),
    Consultation(Vec<ConsultationRowInput>),
}

impl ImportRows {
    pub fn source(&self) -> SourceType {
        match self {
            ImportRows::Commission(_) => SourceType::Commission,
            ImportRows::Contract(_) => SourceType::Contract,
            ImportRows::Consultation(_) => SourceType::Consultation,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ImportRows::Commission(rows) => rows.len(),
            ImportRows::Contract(rows) => rows.len(),
            ImportRows::Consultation(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Importer<'a> {
    store: &'a EngineStore,
}

struct Counters {
    imported: i64,
    skipped: i64,
    errored: i64,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a EngineStore) -> Self {
        Self { store }
    }

    /// Ingest one upload. Returns the batch row with final counters; for a
    /// duplicate fingerprint the *prior* batch is returned untouched.
    pub fn ingest(
        &self,
        rows: ImportRows,
        fingerprint: &str,
        label: Option<&str>,
        forced: bool,
    ) -> EngineResult<BatchRow> {
        let source = rows.source();

        if !forced {
            if let Some(existing) = self.store.find_batch(source.as_str(), fingerprint)? {
                log::info!(
                    "duplicate {} upload (fingerprint {fingerprint}) rejected, returning batch {}",
                    source.as_str(),
                    existing.batch_id
                );
                return Ok(existing);
            }
        }

        let tx = self.store.begin()?;
        let ts = now_iso();
        let batch_id = Uuid::new_v4().to_string();
        let rows_seen = rows.len() as i64;

        self.store.insert_batch(&BatchRow {
            batch_id: batch_id.clone(),
            source: source.as_str().to_string(),
            fingerprint: fingerprint.to_string(),
            label: label.map(String::from),
            rows_seen,
            rows_imported: 0,
            rows_skipped: 0,
            rows_errored: 0,
            created_at: ts.clone(),
        })?;

        let counters = match rows {
            ImportRows::Commission(rows) => self.ingest_commissions(&batch_id, &rows, &ts)?,
            ImportRows::Contract(rows) => self.ingest_contracts(&rows, &ts)?,
            ImportRows::Consultation(rows) => self.ingest_consultations(&batch_id, &rows, &ts)?,
        };

        self.store.update_batch_counters(
            &batch_id,
            rows_seen,
            counters.imported,
            counters.skipped,
            counters.errored,
        )?;
        self.store.append_event(
            "import",
            &EngineEvent::BatchIngested {
                batch_id: batch_id.clone(),
                source: source.as_str().to_string(),
                rows_seen,
                rows_imported: counters.imported,
                rows_skipped: counters.skipped,
                rows_errored: counters.errored,
            },
        )?;
        tx.commit()?;

        log::info!(
            "ingested {} batch {batch_id}: {} seen, {} imported, {} skipped, {} errored",
            source.as_str(),
            rows_seen,
            counters.imported,
            counters.skipped,
            counters.errored
        );
        self.store.batch_required(&batch_id)
    }

    fn ingest_commissions(
        &self,
        batch_id: &str,
        rows: &[CommissionRowInput],
        ts: &str,
    ) -> EngineResult<Counters> {
        let mut counters = Counters {
            imported: 0,
            skipped: 0,
            errored: 0,
        };

        for row in rows {
            if let Some(reason) = commission_row_defect(row) {
                log::warn!("commission row rejected ({reason}): {:?}", row.policy_number);
                counters.errored += 1;
                continue;
            }

            let policy_key = normalize_policy_number(&row.policy_number);
            let holder_key = row.account_holder.as_deref().map(normalize_account_holder);
            let broker_key = row.broker_name.as_deref().map(normalize_broker_name);
            let amount_cents = to_cents(row.amount);
            let kind = row.kind.unwrap_or(if amount_cents < 0 {
                PaymentKind::Chargeback
            } else {
                PaymentKind::Payment
            });

            let row_fingerprint = commission_fingerprint(
                &policy_key,
                amount_cents,
                kind,
                &row.paid_on,
                row.installment_no,
                broker_key.as_deref(),
            );
            if self.store.fingerprint_exists(&row_fingerprint)? {
                counters.skipped += 1;
                continue;
            }

            self.store.insert_commission(&CommissionRow {
                commission_id: Uuid::new_v4().to_string(),
                batch_id: batch_id.to_string(),
                policy_number: row.policy_number.trim().to_string(),
                policy_key,
                account_holder: row.account_holder.clone(),
                holder_key,
                broker_name: row.broker_name.clone(),
                broker_key,
                amount_cents,
                kind: kind.as_str().to_string(),
                paid_on: row.paid_on.clone(),
                installment_no: row.installment_no,
                installment_count: row.installment_count,
                row_fingerprint,
                match_status: match_status::UNMATCHED.to_string(),
                match_confidence: None,
                contract_id: None,
                advisor_id: None,
                advisor_share_cents: None,
                team_lead_share_cents: None,
                agency_share_cents: None,
                created_at: ts.to_string(),
                updated_at: ts.to_string(),
            })?;
            counters.imported += 1;
        }

        Ok(counters)
    }

    fn ingest_contracts(&self, rows: &[ContractRowInput], ts: &str) -> EngineResult<Counters> {
        let mut counters = Counters {
            imported: 0,
            skipped: 0,
            errored: 0,
        };

        for row in rows {
            let policy_key = normalize_policy_number(&row.policy_number);
            if row.policy_number.trim().is_empty() || policy_key.is_empty() {
                log::warn!("contract row rejected (unusable policy number): {:?}", row.policy_number);
                counters.errored += 1;
                continue;
            }
            if let Some(status) = &row.status {
                if !contract_status::ALL.contains(&status.as_str()) {
                    log::warn!("contract row rejected (unknown status '{status}')");
                    counters.errored += 1;
                    continue;
                }
            }

            let advisor_id = self.resolve_advisor(row.advisor_name.as_deref())?;
            let patch = ContractPatch {
                policy_number: row.policy_number.trim().to_string(),
                alt_policy_key: row
                    .alternate_policy_number
                    .as_deref()
                    .map(normalize_policy_number)
                    .filter(|k| !k.is_empty()),
                account_holder: row.account_holder.clone(),
                holder_key: row.account_holder.as_deref().map(normalize_account_holder),
                insurer: row.insurer.clone(),
                product: row.product.clone(),
                advisor_id,
                status: row.status.clone(),
                begin_date: row.begin_date.clone(),
            };

            match self.store.contract_by_policy_key(&policy_key)? {
                Some(current) => {
                    let mut merged = merge_contract(&current, &patch);
                    merged.updated_at = ts.to_string();
                    self.store.update_contract(&merged)?;
                }
                None => {
                    self.store.insert_contract(&ContractRow {
                        contract_id: Uuid::new_v4().to_string(),
                        policy_number: patch.policy_number.clone(),
                        policy_key,
                        alt_policy_key: patch.alt_policy_key.clone(),
                        account_holder: patch.account_holder.clone(),
                        holder_key: patch.holder_key.clone(),
                        insurer: patch.insurer.clone(),
                        product: patch.product.clone(),
                        advisor_id: patch.advisor_id.clone(),
                        status: patch
                            .status
                            .clone()
                            .unwrap_or_else(|| contract_status::OPEN.to_string()),
                        source: SourceType::Contract.as_str().to_string(),
                        begin_date: patch.begin_date.clone(),
                        created_at: ts.to_string(),
                        updated_at: ts.to_string(),
                    })?;
                }
            }
            counters.imported += 1;
        }

        Ok(counters)
    }

    fn ingest_consultations(
        &self,
        batch_id: &str,
        rows: &[ConsultationRowInput],
        ts: &str,
    ) -> EngineResult<Counters> {
        let mut counters = Counters {
            imported: 0,
            skipped: 0,
            errored: 0,
        };

        for row in rows {
            let policy_key = normalize_policy_number(&row.policy_number);
            if row.policy_number.trim().is_empty() || policy_key.is_empty() {
                log::warn!("consultation row rejected (unusable policy number): {:?}", row.policy_number);
                counters.errored += 1;
                continue;
            }

            let advisor_id = self.resolve_advisor(row.advisor_name.as_deref())?;
            self.store.insert_consultation(&ConsultationRow {
                consultation_id: Uuid::new_v4().to_string(),
                batch_id: batch_id.to_string(),
                policy_number: row.policy_number.trim().to_string(),
                policy_key,
                account_holder: row.account_holder.clone(),
                holder_key: row.account_holder.as_deref().map(normalize_account_holder),
                advisor_name: row.advisor_name.clone(),
                advisor_id,
                insurer: row.insurer.clone(),
                product: row.product.clone(),
                consulted_on: row.consulted_on.clone(),
                created_at: ts.to_string(),
            })?;
            counters.imported += 1;
        }

        Ok(counters)
    }

    /// Resolve a free-text advisor/broker name through the mapping table.
    fn resolve_advisor(&self, name: Option<&str>) -> EngineResult<Option<String>> {
        let Some(name) = name else { return Ok(None) };
        let key = normalize_broker_name(name);
        if key.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .mapping_by_key(&key)?
            .map(|mapping| mapping.advisor_id))
    }
}

/// Returns the defect of a commission row, or None when it is well-formed.
fn commission_row_defect(row: &CommissionRowInput) -> Option<&'static str> {
    if row.policy_number.trim().is_empty() {
        return Some("empty policy number");
    }
    if !row.amount.is_finite() {
        return Some("non-finite amount");
    }
    if NaiveDate::parse_from_str(&row.paid_on, "%Y-%m-%d").is_err() {
        return Some("unparseable payment date");
    }
    None
}

/// Currency units to integer cents, half away from zero.
fn to_cents(amount: f64) -> Cents {
    (amount * 100.0).round() as Cents
}

/// Row-level fingerprint over the normalized business fields.
fn commission_fingerprint(
    policy_key: &str,
    amount_cents: Cents,
    kind: PaymentKind,
    paid_on: &str,
    installment_no: Option<i64>,
    broker_key: Option<&str>,
) -> String {
    let installment = installment_no.map(|n| n.to_string()).unwrap_or_default();
    let material = format!(
        "{policy_key}|{amount_cents}|{}|{paid_on}|{installment}|{}",
        kind.as_str(),
        broker_key.unwrap_or_default(),
    );
    format!("{:x}", Sha256::digest(material.as_bytes()))
}
