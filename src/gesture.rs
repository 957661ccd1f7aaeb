//! Zone gestures and request de-duplication.
//!
//! One pointer drag can cross the same zone many times. A `ZoneGesture`
//! keeps each (tooth, zone) pair once and hands the whole set over as a
//! single batch on pointer-up, or nothing at all when cancelled.
//!
//! Store calls are keyed by a content hash of what they would create, so
//! a repeated dispatch of the same operation is skipped.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::models::enums::Tool;
use crate::surface::MainSurface;
use crate::tooth::ToothId;
use crate::zones::{surfaces_of, Zone};

// ═══════════════════════════════════════════
// Idempotency
// ═══════════════════════════════════════════

/// Content-addressed key of one store operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Hash of tool, tooth, sorted zone ids and material/code discriminator.
    pub fn new(
        tool: Tool,
        tooth: Option<ToothId>,
        zones: &BTreeSet<Zone>,
        discriminator: Option<&str>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tool.as_str().as_bytes());
        hasher.update(b"|");
        if let Some(tooth) = tooth {
            hasher.update(tooth.to_string().as_bytes());
        }
        hasher.update(b"|");
        let zone_ids: Vec<String> = zones.iter().map(|z| z.to_string()).collect();
        hasher.update(zone_ids.join(",").as_bytes());
        hasher.update(b"|");
        if let Some(discriminator) = discriminator {
            hasher.update(discriminator.as_bytes());
        }
        let digest = hasher.finalize();
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys of operations already dispatched to the store.
#[derive(Debug, Default)]
pub struct PendingOperations {
    keys: HashSet<IdempotencyKey>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a key. `false` when the same operation was already dispatched.
    pub fn begin(&mut self, key: IdempotencyKey) -> bool {
        self.keys.insert(key)
    }

    /// Release a key so the operation may be retried (after a failure or
    /// after the record it created was deleted).
    pub fn release(&mut self, key: &IdempotencyKey) {
        self.keys.remove(key);
    }

    pub fn contains(&self, key: &IdempotencyKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

// ═══════════════════════════════════════════
// Zone gesture
// ═══════════════════════════════════════════

/// Zones touched during one drag, grouped per tooth.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GestureBatch {
    pub tool: Option<Tool>,
    pub teeth: BTreeMap<ToothId, BTreeSet<Zone>>,
}

impl GestureBatch {
    pub fn is_empty(&self) -> bool {
        self.teeth.is_empty()
    }

    /// Distinct main surfaces touched on a tooth.
    pub fn surfaces(&self, tooth: ToothId) -> BTreeSet<MainSurface> {
        self.teeth
            .get(&tooth)
            .map(|zones| surfaces_of(zones, tooth))
            .unwrap_or_default()
    }
}

/// Collects (tooth, zone) touches of a single drag.
#[derive(Debug, Clone, Default)]
pub struct ZoneGesture {
    tool: Option<Tool>,
    touched: BTreeSet<(ToothId, Zone)>,
}

impl ZoneGesture {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool: Some(tool),
            touched: BTreeSet::new(),
        }
    }

    pub fn tool(&self) -> Option<Tool> {
        self.tool
    }

    /// Record a touch. Returns `false` for repeats and for zones that are
    /// not drawn on this tooth type.
    pub fn touch(&mut self, tooth: ToothId, zone: Zone) -> bool {
        if !zone.is_valid_for(tooth.tooth_type()) {
            tracing::debug!(tooth = %tooth, zone = %zone, "Zone not drawn on tooth type");
            return false;
        }
        self.touched.insert((tooth, zone))
    }

    pub fn len(&self) -> usize {
        self.touched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Switch tools mid-drag: the running gesture is discarded.
    pub fn switch_tool(&mut self, tool: Tool) {
        if self.tool != Some(tool) {
            self.cancel();
            self.tool = Some(tool);
        }
    }

    /// Pointer released outside the chart: nothing is committed.
    pub fn cancel(&mut self) {
        self.touched.clear();
    }

    /// Pointer-up: hand over everything touched as one batch.
    pub fn finish(&mut self) -> GestureBatch {
        let mut teeth: BTreeMap<ToothId, BTreeSet<Zone>> = BTreeMap::new();
        for (tooth, zone) in std::mem::take(&mut self.touched) {
            teeth.entry(tooth).or_default().insert(zone);
        }
        GestureBatch {
            tool: self.tool,
            teeth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: u8) -> ToothId {
        ToothId::new(n).unwrap()
    }

    #[test]
    fn same_zone_counted_once_per_gesture() {
        let mut gesture = ZoneGesture::new(Tool::Filling);
        assert!(gesture.touch(t(16), Zone::Occlusal(Some(1))));
        assert!(!gesture.touch(t(16), Zone::Occlusal(Some(1))));
        assert!(gesture.touch(t(16), Zone::Occlusal(Some(2))));
        assert!(gesture.touch(t(17), Zone::Occlusal(Some(1))));
        assert_eq!(gesture.len(), 3);

        let batch = gesture.finish();
        assert_eq!(batch.teeth.len(), 2);
        assert_eq!(batch.surfaces(t(16)), BTreeSet::from([MainSurface::Occlusal]));
        assert!(gesture.is_empty());
    }

    #[test]
    fn rejects_zones_not_on_tooth_type() {
        let mut gesture = ZoneGesture::new(Tool::Filling);
        assert!(!gesture.touch(t(14), Zone::Occlusal(Some(3))));
        assert!(!gesture.touch(t(16), Zone::Occlusal(None)));
        assert!(gesture.touch(t(14), Zone::Occlusal(None)));
    }

    #[test]
    fn cancel_commits_nothing() {
        let mut gesture = ZoneGesture::new(Tool::Filling);
        gesture.touch(t(16), Zone::Buccal(Some(1)));
        gesture.cancel();
        assert!(gesture.finish().is_empty());
    }

    #[test]
    fn switching_tool_discards_gesture() {
        let mut gesture = ZoneGesture::new(Tool::Filling);
        gesture.touch(t(16), Zone::Buccal(Some(1)));
        gesture.switch_tool(Tool::Sealing);
        let batch = gesture.finish();
        assert!(batch.is_empty());
        assert_eq!(batch.tool, Some(Tool::Sealing));
    }

    #[test]
    fn key_is_content_addressed() {
        let zones = BTreeSet::from([Zone::Occlusal(Some(1)), Zone::Triangle(2)]);
        let a = IdempotencyKey::new(Tool::Filling, Some(t(16)), &zones, Some("composite"));
        let b = IdempotencyKey::new(Tool::Filling, Some(t(16)), &zones.clone(), Some("composite"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 43);

        let other_material = IdempotencyKey::new(Tool::Filling, Some(t(16)), &zones, Some("amalgam"));
        let other_tooth = IdempotencyKey::new(Tool::Filling, Some(t(17)), &zones, Some("composite"));
        let other_tool = IdempotencyKey::new(Tool::Sealing, Some(t(16)), &zones, Some("composite"));
        assert_ne!(a, other_material);
        assert_ne!(a, other_tooth);
        assert_ne!(a, other_tool);
    }

    #[test]
    fn pending_operations_block_duplicates_until_released() {
        let mut pending = PendingOperations::new();
        let key = IdempotencyKey::new(Tool::Extraction, Some(t(38)), &BTreeSet::new(), None);
        assert!(pending.begin(key.clone()));
        assert!(!pending.begin(key.clone()));
        assert!(pending.contains(&key));
        pending.release(&key);
        assert!(pending.begin(key));
        assert_eq!(pending.len(), 1);
    }
}
