//! Chart state reconciliation.
//!
//! The persisted procedure list is the only durable truth. `reconcile`
//! folds it into per-tooth zone and whole-tooth tags for the rendering
//! layer. It is a pure function: the same procedures in any order give
//! the same chart.
//!
//! Older charts were saved as a JSON snapshot in the notes of a sentinel
//! procedure. The snapshot only fills in teeth that no procedure covers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bridge::{reconstruct_bridges, BridgeSpan};
use crate::codes::{ProcedureKind, SAVED_DENTAL_CHART};
use crate::models::enums::{BridgeRole, CrownMaterial, FillingMaterial, Lifecycle};
use crate::models::Procedure;
use crate::surface::MainSurface;
use crate::tooth::ToothId;
use crate::zones::{expand, Zone};

// ═══════════════════════════════════════════
// Tags
// ═══════════════════════════════════════════

/// What occupies a zone or a whole tooth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TagKind {
    Filling(FillingMaterial),
    Sealing,
    Crown(CrownMaterial),
    Extraction,
    Disabled,
    Bridge(BridgeRole),
}

/// Render tag for one zone or tooth: kind plus lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcedureTag {
    pub kind: TagKind,
    pub lifecycle: Lifecycle,
}

impl ProcedureTag {
    pub fn new(kind: TagKind, lifecycle: Lifecycle) -> Self {
        Self { kind, lifecycle }
    }

    pub fn is_missing_tooth(&self) -> bool {
        matches!(self.kind, TagKind::Extraction | TagKind::Disabled)
    }
}

/// Flat token form, e.g. `filling-current-composite` or `bridge-pending-pontic`.
/// Only used at the legacy snapshot boundary.
impl fmt::Display for ProcedureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.lifecycle.as_str();
        match self.kind {
            TagKind::Filling(m) => write!(f, "filling-{lifecycle}-{m}"),
            TagKind::Sealing => write!(f, "sealing-{lifecycle}"),
            TagKind::Crown(m) => write!(f, "crown-{lifecycle}-{m}"),
            TagKind::Extraction => write!(f, "extraction-{lifecycle}"),
            TagKind::Disabled => write!(f, "disabled-{lifecycle}"),
            TagKind::Bridge(role) => write!(f, "bridge-{lifecycle}-{role}"),
        }
    }
}

/// Accepts `kind`, `kind-lifecycle`, `kind-lifecycle-detail` and
/// `kind-detail`. A missing lifecycle reads as current.
impl FromStr for ProcedureTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '-');
        let kind = parts.next().unwrap_or_default();
        let mut rest: Vec<&str> = parts.collect();

        let lifecycle = match rest.first().and_then(|p| p.parse::<Lifecycle>().ok()) {
            Some(lifecycle) => {
                rest.remove(0);
                lifecycle
            }
            None => Lifecycle::Current,
        };
        let detail = rest.first().copied();
        let invalid = || format!("Invalid procedure tag: {s}");

        let kind = match (kind, detail) {
            ("filling", Some(m)) => TagKind::Filling(m.parse().map_err(|_| invalid())?),
            ("sealing", None) => TagKind::Sealing,
            ("crown", Some(m)) => TagKind::Crown(m.parse().map_err(|_| invalid())?),
            ("extraction", None) => TagKind::Extraction,
            ("disabled", None) => TagKind::Disabled,
            ("bridge", Some(role)) => TagKind::Bridge(role.parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(ProcedureTag { kind, lifecycle })
    }
}

// ═══════════════════════════════════════════
// Chart state
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToothState {
    pub zones: BTreeMap<Zone, ProcedureTag>,
    pub whole_tooth: Option<ProcedureTag>,
}

impl ToothState {
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() && self.whole_tooth.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartState {
    pub teeth: BTreeMap<ToothId, ToothState>,
    pub bridges: Vec<BridgeSpan>,
}

impl ChartState {
    pub fn tooth(&self, tooth: ToothId) -> Option<&ToothState> {
        self.teeth.get(&tooth)
    }

    pub fn zone_tag(&self, tooth: ToothId, zone: Zone) -> Option<ProcedureTag> {
        self.teeth.get(&tooth).and_then(|s| s.zones.get(&zone)).copied()
    }

    pub fn whole_tooth(&self, tooth: ToothId) -> Option<ProcedureTag> {
        self.teeth.get(&tooth).and_then(|s| s.whole_tooth)
    }

    /// Teeth shown as extracted or disabled. Bridge gestures use this to
    /// decide pontic roles.
    pub fn missing_teeth(&self) -> BTreeSet<ToothId> {
        self.teeth
            .iter()
            .filter(|(_, state)| state.whole_tooth.is_some_and(|tag| tag.is_missing_tooth()))
            .map(|(tooth, _)| *tooth)
            .collect()
    }
}

// ═══════════════════════════════════════════
// Legacy snapshot
// ═══════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
struct LegacySnapshot {
    #[serde(default)]
    teeth: BTreeMap<String, LegacyTooth>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTooth {
    #[serde(default)]
    zones: BTreeMap<String, String>,
    #[serde(default)]
    whole_tooth: Option<String>,
}

/// Parse a saved chart snapshot. Malformed input is treated as absent;
/// individual unreadable entries are skipped.
pub fn parse_legacy_snapshot(json: &str) -> BTreeMap<ToothId, ToothState> {
    let snapshot: LegacySnapshot = match serde_json::from_str(json) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, "Saved dental chart unreadable, ignoring");
            return BTreeMap::new();
        }
    };

    let mut teeth = BTreeMap::new();
    for (number, legacy) in snapshot.teeth {
        let Ok(tooth) = number.parse::<ToothId>() else {
            tracing::debug!(tooth = %number, "Snapshot entry for invalid tooth skipped");
            continue;
        };
        let mut state = ToothState::default();
        for (zone_id, token) in legacy.zones {
            match (zone_id.parse::<Zone>(), token.parse::<ProcedureTag>()) {
                (Ok(zone), Ok(tag)) if zone.is_valid_for(tooth.tooth_type()) => {
                    state.zones.insert(zone, tag);
                }
                _ => tracing::debug!(tooth = %tooth, zone = %zone_id, "Snapshot zone skipped"),
            }
        }
        state.whole_tooth = legacy.whole_tooth.and_then(|token| token.parse().ok());
        if !state.is_empty() {
            teeth.insert(tooth, state);
        }
    }
    teeth
}

// ═══════════════════════════════════════════
// Reconciliation
// ═══════════════════════════════════════════

/// Rebuild the chart from persisted procedures.
///
/// When `legacy_snapshot` is `None`, the notes of the latest
/// `SAVED_DENTAL_CHART` procedure are used instead, if any.
pub fn reconcile(procedures: &[Procedure], legacy_snapshot: Option<&str>) -> ChartState {
    let mut ordered: Vec<&Procedure> = procedures.iter().collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

    let stored_snapshot = ordered
        .iter()
        .rev()
        .find(|p| p.code == SAVED_DENTAL_CHART)
        .and_then(|p| p.notes.as_deref());
    let snapshot = legacy_snapshot.or(stored_snapshot);

    let mut teeth: BTreeMap<ToothId, ToothState> = BTreeMap::new();
    for procedure in &ordered {
        apply_procedure(&mut teeth, procedure);
    }

    if let Some(json) = snapshot {
        for (tooth, state) in parse_legacy_snapshot(json) {
            teeth.entry(tooth).or_insert(state);
        }
    }

    ChartState {
        teeth,
        bridges: reconstruct_bridges(procedures),
    }
}

fn apply_procedure(teeth: &mut BTreeMap<ToothId, ToothState>, procedure: &Procedure) {
    let Some(tooth) = procedure.tooth_number else {
        return;
    };
    let lifecycle = Lifecycle::from(procedure.status);

    let (kind, zones) = match ProcedureKind::from_code(&procedure.code) {
        ProcedureKind::Filling { material, .. } => (
            TagKind::Filling(procedure.filling_material.unwrap_or(material)),
            procedure.sub_surfaces.clone(),
        ),
        ProcedureKind::Sealing => {
            let zones = if procedure.sub_surfaces.is_empty() {
                expand(MainSurface::Occlusal, tooth)
            } else {
                procedure.sub_surfaces.clone()
            };
            (TagKind::Sealing, zones)
        }
        ProcedureKind::Crown(material) => {
            let kind = match procedure.bridge_role {
                Some(role) => TagKind::Bridge(role),
                None => TagKind::Crown(material),
            };
            return set_whole_tooth(teeth, tooth, ProcedureTag::new(kind, lifecycle));
        }
        ProcedureKind::BridgePontic => {
            let tag = ProcedureTag::new(TagKind::Bridge(BridgeRole::Pontic), lifecycle);
            return set_whole_tooth(teeth, tooth, tag);
        }
        ProcedureKind::Extraction(_) => {
            let tag = ProcedureTag::new(TagKind::Extraction, lifecycle);
            return set_whole_tooth(teeth, tooth, tag);
        }
        ProcedureKind::Disabled => {
            let tag = ProcedureTag::new(TagKind::Disabled, lifecycle);
            return set_whole_tooth(teeth, tooth, tag);
        }
        ProcedureKind::Anesthesia
        | ProcedureKind::Additional
        | ProcedureKind::Scaling
        | ProcedureKind::Snapshot
        | ProcedureKind::Other => return,
    };

    let tag = ProcedureTag::new(kind, lifecycle);
    let tooth_type = tooth.tooth_type();
    let state = teeth.entry(tooth).or_default();
    for zone in zones {
        if zone.is_valid_for(tooth_type) {
            state.zones.insert(zone, tag);
        } else {
            tracing::debug!(tooth = %tooth, zone = %zone, "Stored zone not drawn on tooth type");
        }
    }
}

/// A pontic replaces the missing tooth it spans, so a missing-tooth tag
/// never hides a bridge tag.
fn set_whole_tooth(teeth: &mut BTreeMap<ToothId, ToothState>, tooth: ToothId, tag: ProcedureTag) {
    let state = teeth.entry(tooth).or_default();
    let keeps_bridge = matches!(
        state.whole_tooth,
        Some(ProcedureTag { kind: TagKind::Bridge(_), .. })
    );
    if keeps_bridge && tag.is_missing_tooth() {
        return;
    }
    state.whole_tooth = Some(tag);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::ProcedureStatus;
    use crate::zones::expand_all;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn t(n: u8) -> ToothId {
        ToothId::new(n).unwrap()
    }

    fn proc(tooth: u8, code: &str, status: ProcedureStatus, zones: BTreeSet<Zone>, day: u32) -> Procedure {
        Procedure {
            id: Uuid::new_v4(),
            patient_id: Uuid::nil(),
            tooth_number: Some(t(tooth)),
            code_id: Uuid::nil(),
            code: code.into(),
            sub_surfaces: zones,
            filling_material: None,
            status,
            notes: None,
            date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            bridge_id: None,
            bridge_role: None,
        }
    }

    fn snapshot_proc(json: &str) -> Procedure {
        Procedure {
            tooth_number: None,
            notes: Some(json.into()),
            ..proc(11, SAVED_DENTAL_CHART, ProcedureStatus::Completed, BTreeSet::new(), 1)
        }
    }

    #[test]
    fn tag_tokens_round_trip() {
        for tag in [
            ProcedureTag::new(TagKind::Filling(FillingMaterial::Composite), Lifecycle::Current),
            ProcedureTag::new(TagKind::Sealing, Lifecycle::Pending),
            ProcedureTag::new(TagKind::Crown(CrownMaterial::Gold), Lifecycle::History),
            ProcedureTag::new(TagKind::Extraction, Lifecycle::Pending),
            ProcedureTag::new(TagKind::Disabled, Lifecycle::Current),
            ProcedureTag::new(TagKind::Bridge(BridgeRole::Pontic), Lifecycle::Pending),
        ] {
            assert_eq!(tag.to_string().parse::<ProcedureTag>(), Ok(tag));
        }
        assert_eq!(
            ProcedureTag::new(TagKind::Filling(FillingMaterial::Composite), Lifecycle::Current)
                .to_string(),
            "filling-current-composite"
        );
    }

    #[test]
    fn tag_parsing_tolerates_missing_lifecycle() {
        let tag: ProcedureTag = "extraction".parse().unwrap();
        assert_eq!(tag, ProcedureTag::new(TagKind::Extraction, Lifecycle::Current));
        let tag: ProcedureTag = "filling-amalgam".parse().unwrap();
        assert_eq!(tag.kind, TagKind::Filling(FillingMaterial::Amalgam));
        assert!("filling".parse::<ProcedureTag>().is_err());
        assert!("sparkle-current".parse::<ProcedureTag>().is_err());
    }

    #[test]
    fn filling_zones_tagged_with_lifecycle_and_material() {
        let zones = expand(MainSurface::Occlusal, t(16));
        let chart = reconcile(&[proc(16, "V91", ProcedureStatus::InProgress, zones, 3)], None);
        let tag = chart.zone_tag(t(16), Zone::Occlusal(Some(2))).unwrap();
        assert_eq!(tag.kind, TagKind::Filling(FillingMaterial::Composite));
        assert_eq!(tag.lifecycle, Lifecycle::Current);
        assert_eq!(chart.zone_tag(t(16), Zone::Buccal(Some(1))), None);
    }

    #[test]
    fn status_lifecycle_mapping() {
        let z = || expand(MainSurface::Occlusal, t(11));
        let chart = reconcile(
            &[
                proc(11, "V71", ProcedureStatus::Pending, z(), 1),
                proc(12, "V71", ProcedureStatus::Completed, expand(MainSurface::Occlusal, t(12)), 1),
            ],
            None,
        );
        assert_eq!(chart.zone_tag(t(11), Zone::Occlusal(None)).unwrap().lifecycle, Lifecycle::Pending);
        assert_eq!(chart.zone_tag(t(12), Zone::Occlusal(None)).unwrap().lifecycle, Lifecycle::History);
    }

    #[test]
    fn reconcile_is_order_independent() {
        let surfaces = [MainSurface::Occlusal, MainSurface::Distal];
        let procedures = vec![
            proc(26, "V72", ProcedureStatus::Completed, expand_all(&surfaces, t(26)), 1),
            proc(26, "V92", ProcedureStatus::Pending, expand_all(&surfaces, t(26)), 5),
            proc(26, "H11", ProcedureStatus::Pending, BTreeSet::new(), 6),
            proc(27, "V30", ProcedureStatus::Pending, BTreeSet::new(), 2),
        ];
        let forward = reconcile(&procedures, None);
        let mut reversed = procedures.clone();
        reversed.reverse();
        assert_eq!(reconcile(&reversed, None), forward);
        assert_eq!(reconcile(&procedures, None), forward);

        // Latest filling wins the zone.
        let tag = forward.zone_tag(t(26), Zone::InterdentalDistal).unwrap();
        assert_eq!(tag.kind, TagKind::Filling(FillingMaterial::Composite));
    }

    #[test]
    fn sealing_without_zones_covers_occlusal() {
        let chart = reconcile(&[proc(37, "V30", ProcedureStatus::Pending, BTreeSet::new(), 1)], None);
        let state = chart.tooth(t(37)).unwrap();
        assert_eq!(state.zones.len(), 4);
        assert!(state.zones.values().all(|tag| tag.kind == TagKind::Sealing));
    }

    #[test]
    fn whole_tooth_kinds() {
        let chart = reconcile(
            &[
                proc(18, "H11", ProcedureStatus::Pending, BTreeSet::new(), 1),
                proc(28, "TOOTH_DISABLED", ProcedureStatus::Completed, BTreeSet::new(), 1),
                proc(36, "R29", ProcedureStatus::Pending, BTreeSet::new(), 1),
                proc(46, "A10", ProcedureStatus::Pending, BTreeSet::new(), 1),
            ],
            None,
        );
        assert_eq!(chart.whole_tooth(t(18)).unwrap().kind, TagKind::Extraction);
        assert_eq!(chart.whole_tooth(t(28)).unwrap().kind, TagKind::Disabled);
        assert_eq!(chart.whole_tooth(t(36)).unwrap().kind, TagKind::Crown(CrownMaterial::Gold));
        assert!(chart.tooth(t(46)).is_none());
        assert_eq!(chart.missing_teeth(), BTreeSet::from([t(18), t(28)]));
    }

    #[test]
    fn bridge_roles_rendered_on_whole_tooth() {
        let id = Uuid::new_v4();
        let mut abutment = proc(14, "R24", ProcedureStatus::Pending, BTreeSet::new(), 1);
        abutment.bridge_id = Some(id);
        abutment.bridge_role = Some(BridgeRole::Abutment);
        let mut pontic = proc(15, "R40", ProcedureStatus::Pending, BTreeSet::new(), 1);
        pontic.bridge_id = Some(id);
        pontic.bridge_role = Some(BridgeRole::Pontic);

        let chart = reconcile(&[abutment, pontic], None);
        assert_eq!(chart.whole_tooth(t(14)).unwrap().kind, TagKind::Bridge(BridgeRole::Abutment));
        assert_eq!(chart.whole_tooth(t(15)).unwrap().kind, TagKind::Bridge(BridgeRole::Pontic));
        assert_eq!(chart.bridges.len(), 1);
    }

    #[test]
    fn pontic_not_hidden_by_missing_marker() {
        let id = Uuid::new_v4();
        let mut pontic = proc(25, "R40", ProcedureStatus::Pending, BTreeSet::new(), 2);
        pontic.bridge_id = Some(id);
        pontic.bridge_role = Some(BridgeRole::Pontic);
        let disabled = proc(25, "TOOTH_DISABLED", ProcedureStatus::Completed, BTreeSet::new(), 3);

        let chart = reconcile(&[disabled, pontic], None);
        assert_eq!(chart.whole_tooth(t(25)).unwrap().kind, TagKind::Bridge(BridgeRole::Pontic));
        assert!(chart.missing_teeth().is_empty());
    }

    #[test]
    fn legacy_snapshot_fills_uncovered_teeth_only() {
        let json = r#"{"teeth": {
            "16": {"zones": {"occlusal-1": "filling-history-amalgam"}},
            "21": {"zones": {"occlusal": "sealing-current"}, "wholeTooth": "crown-history-porcelain"},
            "19": {"zones": {"occlusal": "sealing-current"}}
        }}"#;
        let procedures = vec![proc(
            21,
            "H11",
            ProcedureStatus::Pending,
            BTreeSet::new(),
            1,
        )];
        let chart = reconcile(&procedures, Some(json));
        assert_eq!(
            chart.zone_tag(t(16), Zone::Occlusal(Some(1))).unwrap().kind,
            TagKind::Filling(FillingMaterial::Amalgam)
        );
        assert_eq!(chart.whole_tooth(t(21)).unwrap().kind, TagKind::Extraction);
        assert!(chart.zone_tag(t(21), Zone::Occlusal(None)).is_none());
        assert_eq!(chart.teeth.len(), 2);
    }

    #[test]
    fn stored_snapshot_procedure_is_used() {
        let json = r#"{"teeth": {"47": {"wholeTooth": "disabled-current"}}}"#;
        let chart = reconcile(&[snapshot_proc(json)], None);
        assert_eq!(chart.whole_tooth(t(47)).unwrap().kind, TagKind::Disabled);
    }

    #[test]
    fn malformed_snapshot_treated_as_absent() {
        let chart = reconcile(&[snapshot_proc("{not json")], None);
        assert!(chart.teeth.is_empty());
        assert!(parse_legacy_snapshot("[]").is_empty());
    }

    #[test]
    fn invalid_stored_zones_skipped() {
        let zones = BTreeSet::from([Zone::Occlusal(None), Zone::Occlusal(Some(1))]);
        let chart = reconcile(&[proc(16, "V91", ProcedureStatus::Pending, zones, 1)], None);
        let state = chart.tooth(t(16)).unwrap();
        assert_eq!(state.zones.len(), 1);
        assert!(state.zones.contains_key(&Zone::Occlusal(Some(1))));
    }
}
