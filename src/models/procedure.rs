use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{BridgeRole, FillingMaterial, ProcedureStatus};
use crate::tooth::ToothId;
use crate::zones::Zone;

/// A persisted procedure record, as returned by the procedure store.
///
/// `tooth_number` is absent only for chart-level records such as the
/// saved chart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub tooth_number: Option<ToothId>,
    pub code_id: Uuid,
    pub code: String,
    pub sub_surfaces: BTreeSet<Zone>,
    pub filling_material: Option<FillingMaterial>,
    pub status: ProcedureStatus,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub bridge_id: Option<Uuid>,
    pub bridge_role: Option<BridgeRole>,
}

/// Input for creating a procedure. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProcedure {
    pub tooth_number: Option<ToothId>,
    pub code_id: Uuid,
    pub code: String,
    pub sub_surfaces: BTreeSet<Zone>,
    pub filling_material: Option<FillingMaterial>,
    pub status: ProcedureStatus,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub bridge_id: Option<Uuid>,
    pub bridge_role: Option<BridgeRole>,
}

impl NewProcedure {
    pub fn for_tooth(
        tooth: ToothId,
        code_id: Uuid,
        code: &str,
        status: ProcedureStatus,
        date: NaiveDate,
    ) -> Self {
        Self {
            tooth_number: Some(tooth),
            code_id,
            code: code.to_string(),
            sub_surfaces: BTreeSet::new(),
            filling_material: None,
            status,
            notes: None,
            date,
            bridge_id: None,
            bridge_role: None,
        }
    }

    pub fn into_procedure(self, id: Uuid, patient_id: Uuid) -> Procedure {
        Procedure {
            id,
            patient_id,
            tooth_number: self.tooth_number,
            code_id: self.code_id,
            code: self.code,
            sub_surfaces: self.sub_surfaces,
            filling_material: self.filling_material,
            status: self.status,
            notes: self.notes,
            date: self.date,
            bridge_id: self.bridge_id,
            bridge_role: self.bridge_role,
        }
    }
}
