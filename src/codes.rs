//! Procedure code resolution.
//!
//! Filling codes are derived from (surface count, material); crown and
//! extraction codes from the selected variant. Every other code the chart
//! issues is a fixed constant. Tool selections travel in an explicit
//! `ToolOptions` value rather than shared state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::{CrownMaterial, ExtractionVariant, FillingMaterial, ProcedureStatus};
use crate::models::Procedure;
use crate::tooth::ToothId;

// ═══════════════════════════════════════════
// Fixed codes
// ═══════════════════════════════════════════

pub const ANESTHESIA: &str = "A10";
pub const ADDITIONAL_C022: &str = "C022";
pub const SEALING_FIRST: &str = "V30";
pub const SEALING_ADDITIONAL: &str = "V35";
pub const SCALING_FIRST: &str = "T021";
pub const SCALING_ADDITIONAL: &str = "T022";
pub const EXTRACTION_SIMPLE: &str = "H11";
pub const EXTRACTION_SURGICAL: &str = "H35";
pub const CROWN_PORCELAIN: &str = "R24";
pub const CROWN_GOLD: &str = "R29";
pub const BRIDGE_PONTIC: &str = "R40";

/// Marker for a tooth flagged as missing/disabled on the chart. Not billed.
pub const TOOTH_DISABLED: &str = "TOOTH_DISABLED";
/// Sentinel whose notes field carries a legacy chart snapshot.
pub const SAVED_DENTAL_CHART: &str = "SAVED_DENTAL_CHART";

/// Highest surface count with its own filling code; larger counts clamp here.
pub const MAX_FILLING_SURFACES: usize = 4;

const FILLING_CODES: [(u8, FillingMaterial, &str); 12] = [
    (1, FillingMaterial::Amalgam, "V71"),
    (2, FillingMaterial::Amalgam, "V72"),
    (3, FillingMaterial::Amalgam, "V73"),
    (4, FillingMaterial::Amalgam, "V74"),
    (1, FillingMaterial::Glasionomeer, "V81"),
    (2, FillingMaterial::Glasionomeer, "V82"),
    (3, FillingMaterial::Glasionomeer, "V83"),
    (4, FillingMaterial::Glasionomeer, "V84"),
    (1, FillingMaterial::Composite, "V91"),
    (2, FillingMaterial::Composite, "V92"),
    (3, FillingMaterial::Composite, "V93"),
    (4, FillingMaterial::Composite, "V94"),
];

// ═══════════════════════════════════════════
// Tool options
// ═══════════════════════════════════════════

/// Selections of the active chart tool, passed into every resolver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOptions {
    pub filling_material: FillingMaterial,
    pub crown_material: CrownMaterial,
    pub extraction_variant: ExtractionVariant,
    /// Add one anesthesia code per treated tooth.
    pub anesthesia: bool,
    /// Add one C022 code per treated tooth.
    pub additional_c022: bool,
    /// Status new procedures are created with.
    pub status: ProcedureStatus,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            filling_material: FillingMaterial::Composite,
            crown_material: CrownMaterial::Porcelain,
            extraction_variant: ExtractionVariant::Simple,
            anesthesia: false,
            additional_c022: false,
            status: ProcedureStatus::Pending,
        }
    }
}

impl ToolOptions {
    pub fn with_filling_material(self, filling_material: FillingMaterial) -> Self {
        Self { filling_material, ..self }
    }

    pub fn with_crown_material(self, crown_material: CrownMaterial) -> Self {
        Self { crown_material, ..self }
    }

    pub fn with_extraction_variant(self, extraction_variant: ExtractionVariant) -> Self {
        Self { extraction_variant, ..self }
    }

    pub fn with_anesthesia(self, anesthesia: bool) -> Self {
        Self { anesthesia, ..self }
    }

    pub fn with_additional_c022(self, additional_c022: bool) -> Self {
        Self { additional_c022, ..self }
    }

    pub fn with_status(self, status: ProcedureStatus) -> Self {
        Self { status, ..self }
    }

    /// Companion codes added alongside every treated tooth.
    pub fn companion_codes(&self) -> Vec<&'static str> {
        let mut codes = Vec::new();
        if self.anesthesia {
            codes.push(ANESTHESIA);
        }
        if self.additional_c022 {
            codes.push(ADDITIONAL_C022);
        }
        codes
    }
}

// ═══════════════════════════════════════════
// Derived codes
// ═══════════════════════════════════════════

/// Filling code for a surface count and material. Counts above 4 clamp
/// to 4; a count of zero has no code.
pub fn resolve_filling_code(surface_count: usize, material: FillingMaterial) -> Option<&'static str> {
    if surface_count == 0 {
        return None;
    }
    let clamped = surface_count.min(MAX_FILLING_SURFACES) as u8;
    FILLING_CODES
        .iter()
        .find(|(count, m, _)| *count == clamped && *m == material)
        .map(|(_, _, code)| *code)
}

/// Crown code. Depends on the material only, never on the tooth type.
pub fn resolve_crown_code(material: CrownMaterial) -> &'static str {
    match material {
        CrownMaterial::Porcelain => CROWN_PORCELAIN,
        CrownMaterial::Gold => CROWN_GOLD,
    }
}

pub fn resolve_extraction_code(variant: ExtractionVariant) -> &'static str {
    match variant {
        ExtractionVariant::Simple => EXTRACTION_SIMPLE,
        ExtractionVariant::Surgical => EXTRACTION_SURGICAL,
    }
}

/// Outcome of a sealing request for one tooth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealingDecision {
    Issue(&'static str),
    /// The tooth already carries a sealing; no second code is issued.
    AlreadySealed { existing: Uuid },
}

/// First sealing of the day is `V30`, every later one `V35`. A tooth
/// holds at most one sealing.
pub fn resolve_sealing(tooth: ToothId, existing: &[Procedure], today: NaiveDate) -> SealingDecision {
    if let Some(sealed) = existing.iter().find(|p| {
        p.tooth_number == Some(tooth) && matches!(p.code.as_str(), SEALING_FIRST | SEALING_ADDITIONAL)
    }) {
        return SealingDecision::AlreadySealed { existing: sealed.id };
    }
    let first_done = existing
        .iter()
        .any(|p| p.code == SEALING_FIRST && p.date == today);
    SealingDecision::Issue(if first_done { SEALING_ADDITIONAL } else { SEALING_FIRST })
}

/// Scaling follows the same first/additional rule per day.
pub fn resolve_scaling(existing: &[Procedure], today: NaiveDate) -> &'static str {
    if existing
        .iter()
        .any(|p| p.code == SCALING_FIRST && p.date == today)
    {
        SCALING_ADDITIONAL
    } else {
        SCALING_FIRST
    }
}

// ═══════════════════════════════════════════
// Code classification
// ═══════════════════════════════════════════

/// What a persisted code means for the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Filling { material: FillingMaterial, surface_count: u8 },
    Sealing,
    Crown(CrownMaterial),
    BridgePontic,
    Extraction(ExtractionVariant),
    Disabled,
    Anesthesia,
    Additional,
    Scaling,
    Snapshot,
    Other,
}

impl ProcedureKind {
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        match code.to_ascii_uppercase().as_str() {
            SEALING_FIRST | SEALING_ADDITIONAL => return ProcedureKind::Sealing,
            CROWN_PORCELAIN => return ProcedureKind::Crown(CrownMaterial::Porcelain),
            CROWN_GOLD => return ProcedureKind::Crown(CrownMaterial::Gold),
            BRIDGE_PONTIC => return ProcedureKind::BridgePontic,
            EXTRACTION_SIMPLE => return ProcedureKind::Extraction(ExtractionVariant::Simple),
            EXTRACTION_SURGICAL => return ProcedureKind::Extraction(ExtractionVariant::Surgical),
            ANESTHESIA => return ProcedureKind::Anesthesia,
            ADDITIONAL_C022 => return ProcedureKind::Additional,
            SCALING_FIRST | SCALING_ADDITIONAL => return ProcedureKind::Scaling,
            TOOTH_DISABLED => return ProcedureKind::Disabled,
            SAVED_DENTAL_CHART => return ProcedureKind::Snapshot,
            _ => {}
        }
        FILLING_CODES
            .iter()
            .find(|(_, _, c)| c.eq_ignore_ascii_case(code))
            .map(|(surface_count, material, _)| ProcedureKind::Filling {
                material: *material,
                surface_count: *surface_count,
            })
            .unwrap_or(ProcedureKind::Other)
    }

    /// Kinds that occupy the whole tooth rather than individual zones.
    pub fn is_whole_tooth(&self) -> bool {
        matches!(
            self,
            ProcedureKind::Crown(_)
                | ProcedureKind::BridgePontic
                | ProcedureKind::Extraction(_)
                | ProcedureKind::Disabled
        )
    }

    /// Whether the tooth counts as missing for bridge role assignment.
    pub fn is_missing_tooth(&self) -> bool {
        matches!(self, ProcedureKind::Extraction(_) | ProcedureKind::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::FillingMaterial::*;
    use std::collections::BTreeSet;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    fn t(n: u8) -> ToothId {
        ToothId::new(n).unwrap()
    }

    fn proc(tooth: u8, code: &str, date: NaiveDate) -> Procedure {
        Procedure {
            id: Uuid::new_v4(),
            patient_id: Uuid::nil(),
            tooth_number: Some(t(tooth)),
            code_id: Uuid::nil(),
            code: code.into(),
            sub_surfaces: BTreeSet::new(),
            filling_material: None,
            status: ProcedureStatus::Pending,
            notes: None,
            date,
            bridge_id: None,
            bridge_role: None,
        }
    }

    #[test]
    fn filling_table_by_count_and_material() {
        assert_eq!(resolve_filling_code(3, Composite), Some("V93"));
        assert_eq!(resolve_filling_code(1, Amalgam), Some("V71"));
        assert_eq!(resolve_filling_code(2, Glasionomeer), Some("V82"));
    }

    #[test]
    fn filling_counts_above_four_clamp() {
        assert_eq!(resolve_filling_code(7, Amalgam), Some("V74"));
        assert_eq!(resolve_filling_code(7, Amalgam), resolve_filling_code(4, Amalgam));
        assert_eq!(resolve_filling_code(5, Composite), Some("V94"));
    }

    #[test]
    fn zero_surfaces_has_no_code() {
        assert_eq!(resolve_filling_code(0, Composite), None);
    }

    #[test]
    fn every_material_and_count_resolves() {
        for material in FillingMaterial::ALL {
            for count in 1..=6 {
                let code = resolve_filling_code(count, *material).unwrap();
                assert_eq!(
                    ProcedureKind::from_code(code),
                    ProcedureKind::Filling {
                        material: *material,
                        surface_count: count.min(4) as u8
                    }
                );
            }
        }
    }

    #[test]
    fn crown_code_depends_on_material_only() {
        assert_eq!(resolve_crown_code(CrownMaterial::Porcelain), "R24");
        assert_eq!(resolve_crown_code(CrownMaterial::Gold), "R29");
    }

    #[test]
    fn first_sealing_of_day_is_v30() {
        assert_eq!(resolve_sealing(t(16), &[], day()), SealingDecision::Issue("V30"));
    }

    #[test]
    fn sealing_exclusive_per_tooth_and_v35_afterwards() {
        let existing = vec![proc(16, "V30", day())];
        assert_eq!(
            resolve_sealing(t(16), &existing, day()),
            SealingDecision::AlreadySealed { existing: existing[0].id }
        );
        assert_eq!(resolve_sealing(t(17), &existing, day()), SealingDecision::Issue("V35"));
    }

    #[test]
    fn sealing_from_earlier_day_restarts_at_v30() {
        let yesterday = day().pred_opt().unwrap();
        let existing = vec![proc(16, "V30", yesterday)];
        assert_eq!(resolve_sealing(t(17), &existing, day()), SealingDecision::Issue("V30"));
        assert!(matches!(
            resolve_sealing(t(16), &existing, day()),
            SealingDecision::AlreadySealed { .. }
        ));
    }

    #[test]
    fn scaling_first_then_additional() {
        assert_eq!(resolve_scaling(&[], day()), "T021");
        assert_eq!(resolve_scaling(&[proc(11, "T021", day())], day()), "T022");
    }

    #[test]
    fn classifies_fixed_codes() {
        assert_eq!(ProcedureKind::from_code("v30"), ProcedureKind::Sealing);
        assert_eq!(ProcedureKind::from_code("H35"), ProcedureKind::Extraction(ExtractionVariant::Surgical));
        assert_eq!(ProcedureKind::from_code("TOOTH_DISABLED"), ProcedureKind::Disabled);
        assert_eq!(ProcedureKind::from_code("SAVED_DENTAL_CHART"), ProcedureKind::Snapshot);
        assert_eq!(ProcedureKind::from_code("X99"), ProcedureKind::Other);
        assert!(ProcedureKind::from_code("R24").is_whole_tooth());
        assert!(ProcedureKind::from_code("H11").is_missing_tooth());
        assert!(!ProcedureKind::from_code("V93").is_whole_tooth());
    }

    #[test]
    fn companion_codes_follow_options() {
        assert!(ToolOptions::default().companion_codes().is_empty());
        let options = ToolOptions::default()
            .with_anesthesia(true)
            .with_additional_c022(true);
        assert_eq!(options.companion_codes(), vec!["A10", "C022"]);
    }
}
