//! Repository layer: patient-scoped procedure persistence.

mod procedure;

use uuid::Uuid;

use super::DatabaseError;
use crate::models::{NewProcedure, Procedure};

/// Durable procedure storage. The chart is always derived from what this
/// returns; nothing else is persisted.
pub trait ProcedureStore {
    fn create(&self, patient_id: &Uuid, new: &NewProcedure) -> Result<Procedure, DatabaseError>;
    fn list(&self, patient_id: &Uuid) -> Result<Vec<Procedure>, DatabaseError>;
    fn delete(&self, id: &Uuid) -> Result<(), DatabaseError>;

    /// Create every record or none. The default undoes earlier creates when
    /// a later one fails; stores with transactions should override it.
    fn create_all(&self, patient_id: &Uuid, batch: &[NewProcedure]) -> Result<Vec<Procedure>, DatabaseError> {
        let mut created = Vec::with_capacity(batch.len());
        for new in batch {
            match self.create(patient_id, new) {
                Ok(procedure) => created.push(procedure),
                Err(e) => {
                    for procedure in &created {
                        if let Err(undo) = self.delete(&procedure.id) {
                            tracing::error!(id = %procedure.id, error = %undo, "Could not undo partial batch");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(created)
    }
}

pub use procedure::*;
