//! Chart workflow: turns notation input, zone gestures, bridge drags and
//! whole-tooth toggles into persisted procedures, then re-derives the
//! chart from the store.
//!
//! Every action resolves all of its codes before the first store call and
//! is written as one batch. A lookup miss or a store failure aborts the
//! action with nothing written and the last-known-good chart in place.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::bridge::{BridgeGesture, BridgeSpan};
use crate::catalog::CodeCatalog;
use crate::chart::{reconcile, ChartState};
use crate::codes::{
    self, resolve_crown_code, resolve_extraction_code, resolve_filling_code, resolve_scaling,
    resolve_sealing, ProcedureKind, SealingDecision, ToolOptions,
};
use crate::db::{DatabaseError, ProcedureStore};
use crate::gesture::{GestureBatch, IdempotencyKey, PendingOperations};
use crate::models::enums::{BridgeRole, FillingMaterial, ProcedureStatus, Tool};
use crate::models::{DentalCodeRef, NewProcedure, Procedure};
use crate::notation::{parse_all_fillings, parse_notation, FillingNotation, NotationIntent};
use crate::surface::MainSurface;
use crate::tooth::ToothId;
use crate::zones::{expand, expand_all, Zone};

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Could not find code {code}")]
    CodeNotFound { code: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result of committing one piece of chart input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotationOutcome {
    /// Procedures written to the store.
    Created { procedures: Vec<Procedure> },
    /// `18v9`: the clinician picked a material for the next filling on a tooth.
    MaterialSelected { tooth: ToothId, material: FillingMaterial },
    /// Input named a single catalog code.
    Code { code: DentalCodeRef },
    /// Free text: catalog search results.
    Search { results: Vec<DentalCodeRef> },
}

/// Result of a whole-tooth toggle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Created { procedure: Procedure },
    Removed { ids: Vec<Uuid> },
}

/// One billable code on the checkout list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLine {
    pub code: String,
    pub count: usize,
    pub teeth: Vec<ToothId>,
}

/// Pending procedures grouped per code, sentinel markers excluded.
pub fn checkout_summary(procedures: &[Procedure]) -> Vec<CheckoutLine> {
    let mut lines: BTreeMap<&str, CheckoutLine> = BTreeMap::new();
    for procedure in procedures {
        if procedure.status != ProcedureStatus::Pending {
            continue;
        }
        if matches!(
            ProcedureKind::from_code(&procedure.code),
            ProcedureKind::Disabled | ProcedureKind::Snapshot
        ) {
            continue;
        }
        let line = lines.entry(procedure.code.as_str()).or_insert_with(|| CheckoutLine {
            code: procedure.code.clone(),
            count: 0,
            teeth: Vec::new(),
        });
        line.count += 1;
        if let Some(tooth) = procedure.tooth_number {
            if !line.teeth.contains(&tooth) {
                line.teeth.push(tooth);
            }
        }
    }
    lines
        .into_values()
        .map(|mut line| {
            line.teeth.sort_by_key(|t| t.chart_order());
            line
        })
        .collect()
}

/// A store call prepared but not yet dispatched.
struct PlannedProcedure {
    key: IdempotencyKey,
    new: NewProcedure,
}

// ═══════════════════════════════════════════
// Service
// ═══════════════════════════════════════════

/// Chart of one patient over a procedure store and a code catalog.
pub struct ChartService<S: ProcedureStore, C: CodeCatalog> {
    store: S,
    catalog: C,
    patient_id: Uuid,
    procedures: Vec<Procedure>,
    chart: ChartState,
    pending: PendingOperations,
    issued: HashMap<Uuid, IdempotencyKey>,
}

impl<S: ProcedureStore, C: CodeCatalog> ChartService<S, C> {
    /// Create a service with an empty chart. Call `refresh` to load.
    pub fn new(store: S, catalog: C, patient_id: Uuid) -> Self {
        Self {
            store,
            catalog,
            patient_id,
            procedures: Vec::new(),
            chart: ChartState::default(),
            pending: PendingOperations::new(),
            issued: HashMap::new(),
        }
    }

    /// Create a service and load the patient's chart.
    pub fn load(store: S, catalog: C, patient_id: Uuid) -> Result<Self, ChartError> {
        let mut service = Self::new(store, catalog, patient_id);
        service.refresh()?;
        Ok(service)
    }

    pub fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    pub fn chart(&self) -> &ChartState {
        &self.chart
    }

    /// Procedures as of the last successful `refresh`.
    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn pending_operations(&self) -> &PendingOperations {
        &self.pending
    }

    /// Re-read the store and rebuild the chart. On failure the previous
    /// chart stays in place.
    pub fn refresh(&mut self) -> Result<&ChartState, ChartError> {
        match self.store.list(&self.patient_id) {
            Ok(procedures) => {
                self.chart = reconcile(&procedures, None);
                self.procedures = procedures;
                Ok(&self.chart)
            }
            Err(e) => {
                tracing::warn!(patient_id = %self.patient_id, error = %e, "Chart refresh failed, keeping last state");
                Err(e.into())
            }
        }
    }

    pub fn search_codes(&self, query: &str) -> Vec<DentalCodeRef> {
        self.catalog.search(query)
    }

    pub fn checkout_summary(&self) -> Vec<CheckoutLine> {
        checkout_summary(&self.procedures)
    }

    // ─── Notation ───────────────────────────────

    /// Interpret one input and commit it when it describes a procedure.
    pub fn commit_notation(
        &mut self,
        input: &str,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<NotationOutcome, ChartError> {
        match parse_notation(input) {
            Some(NotationIntent::Filling(filling)) => {
                let procedures = self.commit_fillings(&[filling], options, today)?;
                Ok(NotationOutcome::Created { procedures })
            }
            Some(NotationIntent::ToothMaterial(notation)) => match notation.surface_count {
                None => Ok(NotationOutcome::MaterialSelected {
                    tooth: notation.tooth,
                    material: notation.material,
                }),
                Some(count) => {
                    let code = filling_code(usize::from(count), notation.material)?;
                    let code_ref = self.lookup(code)?;
                    let mut planned = vec![self.plan_filling(
                        notation.tooth,
                        BTreeSet::new(),
                        notation.material,
                        &code_ref,
                        options,
                        today,
                    )];
                    planned.extend(self.plan_companions(notation.tooth, options, today)?);
                    let procedures = self.dispatch(planned)?;
                    Ok(NotationOutcome::Created { procedures })
                }
            },
            Some(NotationIntent::MaterialShorthand { code, .. })
            | Some(NotationIntent::DirectCode { code }) => match self.catalog.exact(&code) {
                Some(code) => Ok(NotationOutcome::Code { code }),
                None => Ok(NotationOutcome::Search {
                    results: self.catalog.search(input),
                }),
            },
            None => Ok(NotationOutcome::Search {
                results: self.catalog.search(input),
            }),
        }
    }

    /// Commit every filling written in a free-form note, e.g.
    /// `"17dob, 26mo"`. Tokens that are not filling notation are ignored.
    pub fn commit_note(
        &mut self,
        text: &str,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        let fillings = parse_all_fillings(text);
        self.commit_fillings(&fillings, options, today)
    }

    /// Commit parsed fillings, one procedure per filling plus companion
    /// codes once per filled tooth. Zones are the full expansion of each
    /// named surface.
    pub fn commit_fillings(
        &mut self,
        fillings: &[FillingNotation],
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        let mut planned = Vec::new();
        let mut filled = Vec::new();
        for filling in fillings {
            let code = filling_code(filling.surface_count, options.filling_material)?;
            let code_ref = self.lookup(code)?;
            let zones = expand_all(&filling.surfaces, filling.tooth);
            planned.push(self.plan_filling(
                filling.tooth,
                zones,
                options.filling_material,
                &code_ref,
                options,
                today,
            ));
            if !filled.contains(&filling.tooth) {
                filled.push(filling.tooth);
            }
        }
        for tooth in filled {
            planned.extend(self.plan_companions(tooth, options, today)?);
        }
        self.dispatch(planned)
    }

    // ─── Zone gestures ──────────────────────────

    /// Commit everything touched in one drag as a single batch.
    pub fn commit_zone_gesture(
        &mut self,
        batch: GestureBatch,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        match batch.tool {
            Some(Tool::Filling) => {
                let mut planned = Vec::new();
                for (tooth, zones) in &batch.teeth {
                    let count = batch.surfaces(*tooth).len();
                    let code = filling_code(count, options.filling_material)?;
                    let code_ref = self.lookup(code)?;
                    planned.push(self.plan_filling(
                        *tooth,
                        zones.clone(),
                        options.filling_material,
                        &code_ref,
                        options,
                        today,
                    ));
                }
                for tooth in batch.teeth.keys() {
                    planned.extend(self.plan_companions(*tooth, options, today)?);
                }
                self.dispatch(planned)
            }
            Some(Tool::Sealing) => {
                let teeth: Vec<(ToothId, BTreeSet<Zone>)> = batch.teeth.into_iter().collect();
                self.seal(teeth, options, today)
            }
            other => Err(ChartError::InvalidInput(format!(
                "Zone gesture not supported for tool {}",
                other.map(|t| t.as_str()).unwrap_or("none")
            ))),
        }
    }

    // ─── Sealing & scaling ──────────────────────

    /// Seal the occlusal surface of each tooth. Teeth already sealed are
    /// skipped; the first sealing of the day is `V30`, later ones `V35`.
    pub fn apply_sealing(
        &mut self,
        teeth: &[ToothId],
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        let teeth = teeth
            .iter()
            .map(|tooth| (*tooth, expand(MainSurface::Occlusal, *tooth)))
            .collect();
        self.seal(teeth, options, today)
    }

    fn seal(
        &mut self,
        teeth: Vec<(ToothId, BTreeSet<Zone>)>,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        let mut planned = Vec::new();
        let mut seen = BTreeSet::new();
        let mut first_planned = false;

        for (tooth, zones) in teeth {
            if !seen.insert(tooth) {
                continue;
            }
            let code = match resolve_sealing(tooth, &self.procedures, today) {
                SealingDecision::AlreadySealed { existing } => {
                    tracing::info!(tooth = %tooth, %existing, "Tooth already sealed, skipping");
                    continue;
                }
                SealingDecision::Issue(code) if code == codes::SEALING_FIRST && first_planned => {
                    codes::SEALING_ADDITIONAL
                }
                SealingDecision::Issue(code) => code,
            };
            first_planned |= code == codes::SEALING_FIRST;

            let code_ref = self.lookup(code)?;
            let key = IdempotencyKey::new(Tool::Sealing, Some(tooth), &zones, None);
            let new = NewProcedure {
                sub_surfaces: zones,
                ..NewProcedure::for_tooth(tooth, code_ref.id, &code_ref.code, options.status, today)
            };
            planned.push(PlannedProcedure { key, new });
        }
        self.dispatch(planned)
    }

    /// Record one scaling session: `T021` first of the day, `T022` after.
    pub fn apply_scaling(
        &mut self,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        let code = resolve_scaling(&self.procedures, today);
        let code_ref = self.lookup(code)?;
        let sessions_today = self
            .procedures
            .iter()
            .filter(|p| p.date == today && ProcedureKind::from_code(&p.code) == ProcedureKind::Scaling)
            .count();
        let discriminator = format!("{code}:{today}:{sessions_today}");
        let key = IdempotencyKey::new(Tool::Scaling, None, &BTreeSet::new(), Some(&discriminator));
        let new = NewProcedure {
            tooth_number: None,
            code_id: code_ref.id,
            code: code_ref.code,
            sub_surfaces: BTreeSet::new(),
            filling_material: None,
            status: options.status,
            notes: None,
            date: today,
            bridge_id: None,
            bridge_role: None,
        };
        self.dispatch(vec![PlannedProcedure { key, new }])
    }

    // ─── Bridges ────────────────────────────────

    /// Pointer-up on a bridge drag. Fewer than two teeth commit nothing.
    pub fn finish_bridge_gesture(
        &mut self,
        gesture: &mut BridgeGesture,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        match gesture.finish() {
            Some(span) => self.commit_bridge(&span, options, today),
            None => {
                tracing::debug!("Bridge gesture ended without a valid span");
                Ok(Vec::new())
            }
        }
    }

    /// Persist one procedure per bridge tooth sharing the span's id.
    /// Abutments carry the selected crown code, pontics `R40`.
    pub fn commit_bridge(
        &mut self,
        span: &BridgeSpan,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<Procedure>, ChartError> {
        let mut planned = Vec::new();
        for tooth in &span.teeth {
            let role = span.roles.get(tooth).copied().unwrap_or(BridgeRole::Abutment);
            let code = match role {
                BridgeRole::Abutment => resolve_crown_code(options.crown_material),
                BridgeRole::Pontic => codes::BRIDGE_PONTIC,
            };
            let code_ref = self.lookup(code)?;
            let discriminator = format!("{}:{role}", span.bridge_id);
            let key = IdempotencyKey::new(Tool::Bridge, Some(*tooth), &BTreeSet::new(), Some(&discriminator));
            let new = NewProcedure {
                bridge_id: Some(span.bridge_id),
                bridge_role: Some(role),
                ..NewProcedure::for_tooth(*tooth, code_ref.id, &code_ref.code, options.status, today)
            };
            planned.push(PlannedProcedure { key, new });
        }
        let created = self.dispatch(planned)?;
        tracing::info!(bridge_id = %span.bridge_id, teeth = span.teeth.len(), "Bridge committed");
        Ok(created)
    }

    // ─── Whole-tooth toggles ────────────────────

    /// Extraction, disabled and crown are toggles: applied to a tooth that
    /// already carries one, the existing procedures are deleted.
    pub fn toggle_whole_tooth(
        &mut self,
        tooth: ToothId,
        tool: Tool,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<ToggleOutcome, ChartError> {
        let matches_tool = |procedure: &Procedure| match (tool, ProcedureKind::from_code(&procedure.code)) {
            (Tool::Extraction, ProcedureKind::Extraction(_)) => true,
            (Tool::Disabled, ProcedureKind::Disabled) => true,
            (Tool::Crown, ProcedureKind::Crown(_)) => procedure.bridge_role.is_none(),
            _ => false,
        };
        let code = match tool {
            Tool::Extraction => resolve_extraction_code(options.extraction_variant),
            Tool::Disabled => codes::TOOTH_DISABLED,
            Tool::Crown => resolve_crown_code(options.crown_material),
            other => {
                return Err(ChartError::InvalidInput(format!(
                    "Tool {other} does not toggle a whole tooth"
                )))
            }
        };

        let existing: Vec<Uuid> = self
            .procedures
            .iter()
            .filter(|p| p.tooth_number == Some(tooth) && matches_tool(*p))
            .map(|p| p.id)
            .collect();

        if !existing.is_empty() {
            for id in &existing {
                self.remove(id)?;
            }
            self.refresh_after_mutation();
            tracing::info!(tooth = %tooth, tool = %tool, removed = existing.len(), "Whole-tooth state toggled off");
            return Ok(ToggleOutcome::Removed { ids: existing });
        }

        let code_ref = self.lookup(code)?;
        let key = IdempotencyKey::new(tool, Some(tooth), &BTreeSet::new(), Some(code));
        let new = NewProcedure::for_tooth(tooth, code_ref.id, &code_ref.code, options.status, today);
        let mut created = self.dispatch(vec![PlannedProcedure { key, new }])?;
        match created.pop() {
            Some(procedure) => Ok(ToggleOutcome::Created { procedure }),
            None => Ok(ToggleOutcome::Removed { ids: Vec::new() }),
        }
    }

    /// Delete one procedure and rebuild the chart.
    pub fn delete_procedure(&mut self, id: &Uuid) -> Result<(), ChartError> {
        self.remove(id)?;
        self.refresh_after_mutation();
        Ok(())
    }

    // ─── Internals ──────────────────────────────

    fn lookup(&self, code: &str) -> Result<DentalCodeRef, ChartError> {
        self.catalog.exact(code).ok_or_else(|| {
            tracing::warn!(code, "Code missing from catalog, nothing written");
            ChartError::CodeNotFound { code: code.to_string() }
        })
    }

    fn plan_filling(
        &self,
        tooth: ToothId,
        zones: BTreeSet<Zone>,
        material: FillingMaterial,
        code_ref: &DentalCodeRef,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> PlannedProcedure {
        let discriminator = format!("{material}:{}", code_ref.code);
        let key = IdempotencyKey::new(Tool::Filling, Some(tooth), &zones, Some(&discriminator));
        let new = NewProcedure {
            sub_surfaces: zones,
            filling_material: Some(material),
            ..NewProcedure::for_tooth(tooth, code_ref.id, &code_ref.code, options.status, today)
        };
        PlannedProcedure { key, new }
    }

    /// `A10` / `C022` for a filled tooth, when selected in the options. At
    /// most one of each per tooth and day.
    fn plan_companions(
        &self,
        tooth: ToothId,
        options: &ToolOptions,
        today: NaiveDate,
    ) -> Result<Vec<PlannedProcedure>, ChartError> {
        options
            .companion_codes()
            .into_iter()
            .map(|code| -> Result<PlannedProcedure, ChartError> {
                let code_ref = self.lookup(code)?;
                let discriminator = format!("{code}:{today}");
                let key = IdempotencyKey::new(Tool::Filling, Some(tooth), &BTreeSet::new(), Some(&discriminator));
                let new = NewProcedure::for_tooth(tooth, code_ref.id, &code_ref.code, options.status, today);
                Ok(PlannedProcedure { key, new })
            })
            .collect()
    }

    /// Send planned procedures to the store as one batch, skipping any
    /// whose key is already in flight or done. Either the whole batch is
    /// stored or nothing is; the chart is rebuilt in both cases.
    fn dispatch(&mut self, planned: Vec<PlannedProcedure>) -> Result<Vec<Procedure>, ChartError> {
        let mut keys = Vec::new();
        let mut batch = Vec::new();
        for PlannedProcedure { key, new } in planned {
            if !self.pending.begin(key.clone()) {
                tracing::debug!(key = %key, code = %new.code, "Duplicate dispatch skipped");
                continue;
            }
            keys.push(key);
            batch.push(new);
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        match self.store.create_all(&self.patient_id, &batch) {
            Ok(created) => {
                for (procedure, key) in created.iter().zip(keys) {
                    self.issued.insert(procedure.id, key);
                }
                tracing::info!(
                    patient_id = %self.patient_id,
                    count = created.len(),
                    "Procedures committed"
                );
                self.refresh_after_mutation();
                Ok(created)
            }
            Err(e) => {
                tracing::warn!(count = batch.len(), error = %e, "Procedure batch failed, nothing written");
                for key in &keys {
                    self.pending.release(key);
                }
                self.refresh_after_mutation();
                Err(e.into())
            }
        }
    }

    fn remove(&mut self, id: &Uuid) -> Result<(), ChartError> {
        self.store.delete(id).map_err(|e| {
            tracing::warn!(%id, error = %e, "Procedure deletion failed");
            ChartError::from(e)
        })?;
        if let Some(key) = self.issued.remove(id) {
            self.pending.release(&key);
        }
        Ok(())
    }

    /// The mutation itself succeeded; a failed re-read only means the
    /// chart lags until the next refresh.
    fn refresh_after_mutation(&mut self) {
        let _ = self.refresh();
    }
}

fn filling_code(surface_count: usize, material: FillingMaterial) -> Result<&'static str, ChartError> {
    resolve_filling_code(surface_count, material).ok_or_else(|| ChartError::CodeNotFound {
        code: format!("filling ({surface_count} surfaces, {material})"),
    })
}
