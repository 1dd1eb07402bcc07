use rusqlite::{params, OptionalExtension};

use super::{now_iso, AdvisorRow, EngineStore, MappingRow};
use crate::error::{EngineError, EngineResult};

impl EngineStore {
    // ── Advisor ────────────────────────────────────────────────

    pub fn insert_advisor(&self, a: &AdvisorRow) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO advisor
             (advisor_id, name, role, commission_rate, team_lead_id,
              override_rate, override_basis, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                a.advisor_id,
                a.name,
                a.role,
                a.commission_rate,
                a.team_lead_id,
                a.override_rate,
                a.override_basis,
                a.active as i64,
                a.created_at,
                a.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_advisor(&self, a: &AdvisorRow) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE advisor
             SET name = ?2, role = ?3, commission_rate = ?4, team_lead_id = ?5,
                 override_rate = ?6, override_basis = ?7, active = ?8, updated_at = ?9
             WHERE advisor_id = ?1",
            params![
                a.advisor_id,
                a.name,
                a.role,
                a.commission_rate,
                a.team_lead_id,
                a.override_rate,
                a.override_basis,
                a.active as i64,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    pub fn advisor(&self, advisor_id: &str) -> EngineResult<Option<AdvisorRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ADVISOR_COLS} FROM advisor WHERE advisor_id = ?1"),
                params![advisor_id],
                Self::map_advisor_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn advisor_required(&self, advisor_id: &str) -> EngineResult<AdvisorRow> {
        self.advisor(advisor_id)?
            .ok_or_else(|| EngineError::not_found("advisor", advisor_id))
    }

    pub fn list_advisors(&self, active_only: bool) -> EngineResult<Vec<AdvisorRow>> {
        let sql = if active_only {
            format!("SELECT {ADVISOR_COLS} FROM advisor WHERE active = 1 ORDER BY name ASC")
        } else {
            format!("SELECT {ADVISOR_COLS} FROM advisor ORDER BY name ASC")
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_advisor_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_advisor_active(&self, advisor_id: &str, active: bool) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE advisor SET active = ?2, updated_at = ?3 WHERE advisor_id = ?1",
            params![advisor_id, active as i64, now_iso()],
        )?;
        Ok(())
    }

    /// Advisors supervised by the given team lead (for override recomputes).
    pub fn advisors_led_by(&self, team_lead_id: &str) -> EngineResult<Vec<AdvisorRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ADVISOR_COLS} FROM advisor WHERE team_lead_id = ?1"
        ))?;
        let rows = stmt
            .query_map(params![team_lead_id], Self::map_advisor_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Broker mapping ─────────────────────────────────────────

    pub fn upsert_mapping(&self, m: &MappingRow) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO broker_mapping (mapping_id, broker_name, broker_key, advisor_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(broker_key) DO UPDATE
             SET broker_name = excluded.broker_name, advisor_id = excluded.advisor_id",
            params![m.mapping_id, m.broker_name, m.broker_key, m.advisor_id, m.created_at],
        )?;
        Ok(())
    }

    pub fn mapping_by_key(&self, broker_key: &str) -> EngineResult<Option<MappingRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT mapping_id, broker_name, broker_key, advisor_id, created_at
                 FROM broker_mapping WHERE broker_key = ?1",
                params![broker_key],
                Self::map_mapping_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_mappings(&self) -> EngineResult<Vec<MappingRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT mapping_id, broker_name, broker_key, advisor_id, created_at
             FROM broker_mapping ORDER BY broker_name ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_mapping_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns true when a mapping existed and was deleted.
    pub fn delete_mapping(&self, broker_key: &str) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM broker_mapping WHERE broker_key = ?1",
            params![broker_key],
        )?;
        Ok(changed > 0)
    }

    fn map_advisor_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdvisorRow> {
        Ok(AdvisorRow {
            advisor_id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            commission_rate: row.get(3)?,
            team_lead_id: row.get(4)?,
            override_rate: row.get(5)?,
            override_basis: row.get(6)?,
            active: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn map_mapping_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MappingRow> {
        Ok(MappingRow {
            mapping_id: row.get(0)?,
            broker_name: row.get(1)?,
            broker_key: row.get(2)?,
            advisor_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

const ADVISOR_COLS: &str = "advisor_id, name, role, commission_rate, team_lead_id, \
                            override_rate, override_basis, active, created_at, updated_at";
