use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;
use crate::tooth::ToothId;
use crate::zones::Zone;

use super::ProcedureStore;

const PROCEDURE_COLUMNS: &str = "id, patient_id, tooth_number, code_id, code, sub_surfaces,
    filling_material, status, notes, date, bridge_id, bridge_role";

pub fn insert_procedure(conn: &Connection, proc: &Procedure) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO procedures (id, patient_id, tooth_number, code_id, code, sub_surfaces,
         filling_material, status, notes, date, bridge_id, bridge_role)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            proc.id.to_string(),
            proc.patient_id.to_string(),
            proc.tooth_number.map(u8::from),
            proc.code_id.to_string(),
            proc.code,
            serde_json::to_string(&proc.sub_surfaces)?,
            proc.filling_material.map(|m| m.as_str()),
            proc.status.as_str(),
            proc.notes,
            proc.date.to_string(),
            proc.bridge_id.map(|id| id.to_string()),
            proc.bridge_role.map(|r| r.as_str()),
        ],
    )?;
    Ok(())
}

pub fn get_procedure(conn: &Connection, id: &Uuid) -> Result<Option<Procedure>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PROCEDURE_COLUMNS} FROM procedures WHERE id = ?1"),
            params![id.to_string()],
            ProcedureRow::read,
        )
        .optional()?;
    row.map(ProcedureRow::into_procedure).transpose()
}

/// All procedures of one patient, oldest first.
pub fn get_procedures_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Procedure>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROCEDURE_COLUMNS} FROM procedures
         WHERE patient_id = ?1 ORDER BY date ASC, created_at ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![patient_id.to_string()], ProcedureRow::read)?;

    let mut procedures = Vec::new();
    for row in rows {
        procedures.push(row?.into_procedure()?);
    }
    Ok(procedures)
}

pub fn delete_procedure(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM procedures WHERE id = ?1",
        params![id.to_string()],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Procedure".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Raw column values, converted after the row borrow ends.
struct ProcedureRow {
    id: String,
    patient_id: String,
    tooth_number: Option<u8>,
    code_id: String,
    code: String,
    sub_surfaces: String,
    filling_material: Option<String>,
    status: String,
    notes: Option<String>,
    date: String,
    bridge_id: Option<String>,
    bridge_role: Option<String>,
}

impl ProcedureRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            tooth_number: row.get(2)?,
            code_id: row.get(3)?,
            code: row.get(4)?,
            sub_surfaces: row.get(5)?,
            filling_material: row.get(6)?,
            status: row.get(7)?,
            notes: row.get(8)?,
            date: row.get(9)?,
            bridge_id: row.get(10)?,
            bridge_role: row.get(11)?,
        })
    }

    fn into_procedure(self) -> Result<Procedure, DatabaseError> {
        let tooth_number = self
            .tooth_number
            .map(ToothId::new)
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
        let sub_surfaces: BTreeSet<Zone> = serde_json::from_str(&self.sub_surfaces)?;

        Ok(Procedure {
            id: parse_uuid(&self.id)?,
            patient_id: parse_uuid(&self.patient_id)?,
            tooth_number,
            code_id: parse_uuid(&self.code_id)?,
            code: self.code,
            sub_surfaces,
            filling_material: self
                .filling_material
                .as_deref()
                .map(FillingMaterial::from_str)
                .transpose()?,
            status: ProcedureStatus::from_str(&self.status)?,
            notes: self.notes,
            date: NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            bridge_id: self.bridge_id.as_deref().map(parse_uuid).transpose()?,
            bridge_role: self
                .bridge_role
                .as_deref()
                .map(BridgeRole::from_str)
                .transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// ═══════════════════════════════════════════
// Store
// ═══════════════════════════════════════════

/// `ProcedureStore` backed by one SQLite connection.
pub struct SqliteProcedureStore {
    conn: Connection,
}

impl SqliteProcedureStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl ProcedureStore for SqliteProcedureStore {
    fn create(&self, patient_id: &Uuid, new: &NewProcedure) -> Result<Procedure, DatabaseError> {
        let procedure = new.clone().into_procedure(Uuid::new_v4(), *patient_id);
        insert_procedure(&self.conn, &procedure)?;
        tracing::debug!(
            id = %procedure.id,
            code = %procedure.code,
            tooth = ?procedure.tooth_number.map(u8::from),
            "Procedure stored"
        );
        Ok(procedure)
    }

    fn list(&self, patient_id: &Uuid) -> Result<Vec<Procedure>, DatabaseError> {
        get_procedures_for_patient(&self.conn, patient_id)
    }

    fn delete(&self, id: &Uuid) -> Result<(), DatabaseError> {
        delete_procedure(&self.conn, id)
    }

    fn create_all(&self, patient_id: &Uuid, batch: &[NewProcedure]) -> Result<Vec<Procedure>, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut created = Vec::with_capacity(batch.len());
        for new in batch {
            let procedure = new.clone().into_procedure(Uuid::new_v4(), *patient_id);
            insert_procedure(&tx, &procedure)?;
            created.push(procedure);
        }
        tx.commit()?;
        tracing::debug!(count = created.len(), "Procedure batch stored");
        Ok(created)
    }
}
