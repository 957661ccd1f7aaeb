//! Bridge assembly.
//!
//! A bridge is drawn with one pointer drag across neighbouring teeth.
//! Teeth that were already missing when the drag started become pontics,
//! all others abutments. On load, bridges are rebuilt from persisted
//! procedures grouped by their shared bridge id; pontics persisted without
//! an id are re-attached to an adjacent abutment.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use uuid::Uuid;

use crate::codes::ProcedureKind;
use crate::models::enums::BridgeRole;
use crate::models::Procedure;
use crate::tooth::ToothId;

/// Minimum number of teeth in a bridge. A cantilever has exactly two.
pub const MIN_BRIDGE_TEETH: usize = 2;

/// FDI offsets searched, nearest first, when attaching an orphan pontic.
const PONTIC_SEARCH_OFFSETS: [i8; 4] = [-1, 1, -2, 2];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeSpan {
    pub bridge_id: Uuid,
    pub teeth: Vec<ToothId>,
    pub roles: BTreeMap<ToothId, BridgeRole>,
}

impl BridgeSpan {
    pub fn abutments(&self) -> impl Iterator<Item = ToothId> + '_ {
        self.with_role(BridgeRole::Abutment)
    }

    pub fn pontics(&self) -> impl Iterator<Item = ToothId> + '_ {
        self.with_role(BridgeRole::Pontic)
    }

    /// Exactly one abutment carrying one pontic.
    pub fn is_cantilever(&self) -> bool {
        self.teeth.len() == 2 && self.abutments().count() == 1
    }

    fn with_role(&self, role: BridgeRole) -> impl Iterator<Item = ToothId> + '_ {
        self.teeth
            .iter()
            .copied()
            .filter(move |t| self.roles.get(t) == Some(&role))
    }
}

/// Role a tooth takes in a new bridge, from the chart state at drag start.
pub fn role_for(tooth: ToothId, missing: &BTreeSet<ToothId>) -> BridgeRole {
    if missing.contains(&tooth) {
        BridgeRole::Pontic
    } else {
        BridgeRole::Abutment
    }
}

/// Build a bridge from teeth in touch order. Repeated touches are ignored.
///
/// Returns `None` for fewer than two distinct teeth or when no tooth can
/// act as abutment.
pub fn assemble_bridge(ordered_teeth: &[ToothId], missing: &BTreeSet<ToothId>) -> Option<BridgeSpan> {
    let mut teeth = Vec::new();
    let mut roles = BTreeMap::new();
    for tooth in ordered_teeth {
        if roles.insert(*tooth, role_for(*tooth, missing)).is_none() {
            teeth.push(*tooth);
        }
    }

    if teeth.len() < MIN_BRIDGE_TEETH {
        return None;
    }
    if !roles.values().any(|r| *r == BridgeRole::Abutment) {
        tracing::warn!(teeth = ?teeth, "Bridge without abutment discarded");
        return None;
    }

    Some(BridgeSpan {
        bridge_id: Uuid::new_v4(),
        teeth,
        roles,
    })
}

// ═══════════════════════════════════════════
// Drag gesture
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum GestureState {
    #[default]
    Idle,
    Tracking {
        teeth: Vec<ToothId>,
        missing: BTreeSet<ToothId>,
    },
}

/// Tracks one bridge-drawing drag from first touch to pointer-up.
#[derive(Debug, Clone, Default)]
pub struct BridgeGesture {
    state: GestureState,
}

impl BridgeGesture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, GestureState::Tracking { .. })
    }

    /// Teeth touched so far, in touch order.
    pub fn teeth(&self) -> &[ToothId] {
        match &self.state {
            GestureState::Idle => &[],
            GestureState::Tracking { teeth, .. } => teeth,
        }
    }

    /// Register a touched tooth. The first touch starts tracking and
    /// snapshots which teeth are missing; later touches are judged against
    /// that snapshot. Returns the role of a newly added tooth.
    pub fn touch(&mut self, tooth: ToothId, missing: &BTreeSet<ToothId>) -> Option<BridgeRole> {
        if let GestureState::Tracking { teeth, missing: snapshot } = &mut self.state {
            if teeth.contains(&tooth) {
                return None;
            }
            teeth.push(tooth);
            return Some(role_for(tooth, snapshot));
        }
        self.state = GestureState::Tracking {
            teeth: vec![tooth],
            missing: missing.clone(),
        };
        Some(role_for(tooth, missing))
    }

    /// Pointer-up: back to idle, yielding a bridge when at least two teeth
    /// were touched.
    pub fn finish(&mut self) -> Option<BridgeSpan> {
        match std::mem::take(&mut self.state) {
            GestureState::Idle => None,
            GestureState::Tracking { teeth, missing } => assemble_bridge(&teeth, &missing),
        }
    }

    /// Pointer left the chart or the tool changed: drop everything.
    pub fn cancel(&mut self) {
        self.state = GestureState::Idle;
    }
}

// ═══════════════════════════════════════════
// Reconstruction
// ═══════════════════════════════════════════

fn persisted_role(procedure: &Procedure) -> BridgeRole {
    procedure.bridge_role.unwrap_or_else(|| {
        if ProcedureKind::from_code(&procedure.code) == ProcedureKind::BridgePontic {
            BridgeRole::Pontic
        } else {
            BridgeRole::Abutment
        }
    })
}

/// Rebuild bridges from persisted procedures.
///
/// Procedures sharing a bridge id form one bridge. A pontic stored without
/// a bridge id joins the first bridge holding an abutment at FDI offset
/// -1, +1, -2 or +2. Groups with fewer than two teeth are dropped.
pub fn reconstruct_bridges(procedures: &[Procedure]) -> Vec<BridgeSpan> {
    let mut groups: BTreeMap<Uuid, BTreeMap<ToothId, BridgeRole>> = BTreeMap::new();
    let mut orphans: BTreeSet<ToothId> = BTreeSet::new();

    for procedure in procedures {
        let Some(tooth) = procedure.tooth_number else {
            continue;
        };
        match procedure.bridge_id {
            Some(bridge_id) => {
                groups
                    .entry(bridge_id)
                    .or_default()
                    .insert(tooth, persisted_role(procedure));
            }
            None => {
                let is_pontic = procedure.bridge_role == Some(BridgeRole::Pontic)
                    || ProcedureKind::from_code(&procedure.code) == ProcedureKind::BridgePontic;
                if is_pontic {
                    orphans.insert(tooth);
                }
            }
        }
    }

    for pontic in orphans {
        let target = PONTIC_SEARCH_OFFSETS.iter().find_map(|delta| {
            let neighbour = pontic.offset(*delta)?;
            groups
                .iter()
                .find(|(_, roles)| roles.get(&neighbour) == Some(&BridgeRole::Abutment))
                .map(|(id, _)| *id)
        });
        match target {
            Some(bridge_id) => {
                if let Some(roles) = groups.get_mut(&bridge_id) {
                    roles.entry(pontic).or_insert(BridgeRole::Pontic);
                }
            }
            None => tracing::debug!(tooth = %pontic, "Pontic without adjacent abutment"),
        }
    }

    groups
        .into_iter()
        .filter_map(|(bridge_id, roles)| {
            if roles.len() < MIN_BRIDGE_TEETH {
                tracing::debug!(%bridge_id, "Bridge group with a single tooth ignored");
                return None;
            }
            let mut teeth: Vec<ToothId> = roles.keys().copied().collect();
            teeth.sort_by_key(|t| t.chart_order());
            Some(BridgeSpan {
                bridge_id,
                teeth,
                roles,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::ProcedureStatus;
    use chrono::NaiveDate;

    fn t(n: u8) -> ToothId {
        ToothId::new(n).unwrap()
    }

    fn missing(teeth: &[u8]) -> BTreeSet<ToothId> {
        teeth.iter().map(|n| t(*n)).collect()
    }

    fn bridge_proc(tooth: u8, code: &str, bridge_id: Option<Uuid>, role: Option<BridgeRole>) -> Procedure {
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
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            bridge_id,
            bridge_role: role,
        }
    }

    #[test]
    fn single_tooth_drag_produces_nothing() {
        let mut gesture = BridgeGesture::new();
        assert_eq!(gesture.touch(t(14), &missing(&[])), Some(BridgeRole::Abutment));
        assert!(gesture.is_tracking());
        assert_eq!(gesture.finish(), None);
        assert!(!gesture.is_tracking());
    }

    #[test]
    fn first_touch_recorded_immediately() {
        let mut gesture = BridgeGesture::new();
        gesture.touch(t(15), &missing(&[15]));
        assert_eq!(gesture.teeth(), &[t(15)]);
    }

    #[test]
    fn cantilever_bridge_accepted() {
        let span = assemble_bridge(&[t(14), t(15)], &missing(&[15])).unwrap();
        assert_eq!(span.roles[&t(14)], BridgeRole::Abutment);
        assert_eq!(span.roles[&t(15)], BridgeRole::Pontic);
        assert!(span.is_cantilever());
    }

    #[test]
    fn roles_use_state_at_drag_start() {
        let mut gesture = BridgeGesture::new();
        gesture.touch(t(14), &missing(&[15]));
        // A later chart change does not affect the running gesture.
        assert_eq!(gesture.touch(t(15), &missing(&[])), Some(BridgeRole::Pontic));
        assert_eq!(gesture.touch(t(16), &missing(&[16])), Some(BridgeRole::Abutment));
        let span = gesture.finish().unwrap();
        assert_eq!(span.teeth, vec![t(14), t(15), t(16)]);
        assert_eq!(span.pontics().collect::<Vec<_>>(), vec![t(15)]);
        assert_eq!(span.abutments().collect::<Vec<_>>(), vec![t(14), t(16)]);
        assert!(!span.is_cantilever());
    }

    #[test]
    fn repeated_touches_are_deduplicated() {
        let mut gesture = BridgeGesture::new();
        gesture.touch(t(24), &missing(&[]));
        assert_eq!(gesture.touch(t(24), &missing(&[])), None);
        gesture.touch(t(25), &missing(&[]));
        gesture.touch(t(24), &missing(&[]));
        assert_eq!(gesture.finish().unwrap().teeth, vec![t(24), t(25)]);
    }

    #[test]
    fn cancel_discards_gesture() {
        let mut gesture = BridgeGesture::new();
        gesture.touch(t(24), &missing(&[]));
        gesture.touch(t(25), &missing(&[]));
        gesture.cancel();
        assert_eq!(gesture.finish(), None);
    }

    #[test]
    fn all_pontics_is_not_a_bridge() {
        assert_eq!(assemble_bridge(&[t(35), t(36)], &missing(&[35, 36])), None);
    }

    #[test]
    fn each_assembly_gets_fresh_id() {
        let a = assemble_bridge(&[t(14), t(15)], &missing(&[])).unwrap();
        let b = assemble_bridge(&[t(14), t(15)], &missing(&[])).unwrap();
        assert_ne!(a.bridge_id, b.bridge_id);
    }

    #[test]
    fn reconstruct_groups_by_bridge_id() {
        let id = Uuid::new_v4();
        let procedures = vec![
            bridge_proc(16, "R24", Some(id), Some(BridgeRole::Abutment)),
            bridge_proc(15, "R40", Some(id), Some(BridgeRole::Pontic)),
            bridge_proc(14, "R24", Some(id), Some(BridgeRole::Abutment)),
        ];
        let spans = reconstruct_bridges(&procedures);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].bridge_id, id);
        assert_eq!(spans[0].teeth, vec![t(16), t(15), t(14)]);
    }

    #[test]
    fn reconstruct_attaches_orphan_pontic_by_adjacency() {
        let id = Uuid::new_v4();
        let procedures = vec![
            bridge_proc(34, "R24", Some(id), Some(BridgeRole::Abutment)),
            bridge_proc(36, "R24", Some(id), Some(BridgeRole::Abutment)),
            bridge_proc(35, "R40", None, Some(BridgeRole::Pontic)),
        ];
        let spans = reconstruct_bridges(&procedures);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].roles[&t(35)], BridgeRole::Pontic);
        assert_eq!(spans[0].teeth.len(), 3);
    }

    #[test]
    fn orphan_pontic_two_away_joins_bridge() {
        let id = Uuid::new_v4();
        let procedures = vec![
            bridge_proc(44, "R24", Some(id), Some(BridgeRole::Abutment)),
            bridge_proc(45, "R40", Some(id), None),
            bridge_proc(46, "R40", None, None),
        ];
        let spans = reconstruct_bridges(&procedures);
        assert_eq!(spans[0].roles[&t(45)], BridgeRole::Pontic);
        assert_eq!(spans[0].roles[&t(46)], BridgeRole::Pontic);
    }

    #[test]
    fn single_tooth_groups_and_lonely_pontics_excluded() {
        let procedures = vec![
            bridge_proc(14, "R24", Some(Uuid::new_v4()), Some(BridgeRole::Abutment)),
            bridge_proc(26, "R40", None, Some(BridgeRole::Pontic)),
        ];
        assert!(reconstruct_bridges(&procedures).is_empty());
    }

    #[test]
    fn reconstructed_cantilever_is_valid() {
        let id = Uuid::new_v4();
        let procedures = vec![
            bridge_proc(21, "R24", Some(id), Some(BridgeRole::Abutment)),
            bridge_proc(22, "R40", Some(id), Some(BridgeRole::Pontic)),
        ];
        let spans = reconstruct_bridges(&procedures);
        assert!(spans[0].is_cantilever());
    }
}
