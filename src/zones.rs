//! Subsurface (zone) mapping.
//!
//! Each main surface is drawn and persisted as a set of finer zones.
//! Molars split occlusal into four quadrants and buccal/lingual/cervical
//! into pairs; premolars and anteriors use a single zone per surface.
//! Both tooth types share four corner triangles and two interdental zones.
//!
//! `expand` and `collapse` are table-driven inverses: every zone collapses
//! to a surface whose expansion contains it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::surface::MainSurface;
use crate::tooth::{ToothId, ToothType};

/// A fine-grained region of a tooth, identified by its persisted string id.
///
/// Indexed variants carry `Some(n)` on molars and `None` on other teeth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Zone {
    Occlusal(Option<u8>),
    Buccal(Option<u8>),
    Lingual(Option<u8>),
    CervicalBuccal(Option<u8>),
    CervicalLingual(Option<u8>),
    Triangle(u8),
    InterdentalMesial,
    InterdentalDistal,
}

/// Triangles 1–2 sit on the lingual corners, 3–4 on the buccal corners,
/// for every quadrant.
static TRIANGLE_SURFACES: [(u8, MainSurface); 4] = [
    (1, MainSurface::Lingual),
    (2, MainSurface::Lingual),
    (3, MainSurface::Buccal),
    (4, MainSurface::Buccal),
];

fn triangle_surface(index: u8) -> Option<MainSurface> {
    TRIANGLE_SURFACES
        .iter()
        .find(|(i, _)| *i == index)
        .map(|(_, surface)| *surface)
}

fn triangles_for(surface: MainSurface) -> impl Iterator<Item = Zone> {
    TRIANGLE_SURFACES
        .iter()
        .filter(move |(_, s)| *s == surface)
        .map(|(i, _)| Zone::Triangle(*i))
}

// ═══════════════════════════════════════════
// Expansion
// ═══════════════════════════════════════════

/// All zones that make up `surface` on `tooth`.
pub fn expand(surface: MainSurface, tooth: ToothId) -> BTreeSet<Zone> {
    let molar = tooth.tooth_type() == ToothType::Molar;
    let pair = |make: fn(Option<u8>) -> Zone| -> Vec<Zone> {
        if molar {
            vec![make(Some(1)), make(Some(2))]
        } else {
            vec![make(None)]
        }
    };

    match surface {
        MainSurface::Occlusal => {
            if molar {
                (1..=4).map(|i| Zone::Occlusal(Some(i))).collect()
            } else {
                BTreeSet::from([Zone::Occlusal(None)])
            }
        }
        MainSurface::Buccal => pair(Zone::Buccal)
            .into_iter()
            .chain(pair(Zone::CervicalBuccal))
            .chain(triangles_for(MainSurface::Buccal))
            .collect(),
        MainSurface::Lingual => pair(Zone::Lingual)
            .into_iter()
            .chain(pair(Zone::CervicalLingual))
            .chain(triangles_for(MainSurface::Lingual))
            .collect(),
        MainSurface::Mesial => BTreeSet::from([Zone::InterdentalMesial]),
        MainSurface::Distal => BTreeSet::from([Zone::InterdentalDistal]),
    }
}

/// Union of the expansions of several surfaces.
pub fn expand_all<'a>(
    surfaces: impl IntoIterator<Item = &'a MainSurface>,
    tooth: ToothId,
) -> BTreeSet<Zone> {
    surfaces
        .into_iter()
        .flat_map(|surface| expand(*surface, tooth))
        .collect()
}

/// Every zone drawn for a tooth type.
pub fn zones_for(tooth_type: ToothType) -> Vec<Zone> {
    let index = |i: u8| {
        if tooth_type == ToothType::Molar {
            Some(i)
        } else {
            None
        }
    };
    let pairs: &[u8] = if tooth_type == ToothType::Molar { &[1, 2] } else { &[1] };
    let quads: &[u8] = if tooth_type == ToothType::Molar { &[1, 2, 3, 4] } else { &[1] };

    let mut zones: Vec<Zone> = quads.iter().map(|i| Zone::Occlusal(index(*i))).collect();
    for make in [
        Zone::Buccal as fn(Option<u8>) -> Zone,
        Zone::Lingual,
        Zone::CervicalBuccal,
        Zone::CervicalLingual,
    ] {
        zones.extend(pairs.iter().map(|i| make(index(*i))));
    }
    zones.extend((1..=4).map(Zone::Triangle));
    zones.push(Zone::InterdentalMesial);
    zones.push(Zone::InterdentalDistal);
    zones
}

// ═══════════════════════════════════════════
// Collapse
// ═══════════════════════════════════════════

/// Main surface a zone belongs to.
pub fn collapse(zone: &Zone, _tooth: ToothId) -> MainSurface {
    match zone {
        Zone::Occlusal(_) => MainSurface::Occlusal,
        Zone::Buccal(_) | Zone::CervicalBuccal(_) => MainSurface::Buccal,
        Zone::Lingual(_) | Zone::CervicalLingual(_) => MainSurface::Lingual,
        Zone::Triangle(i) => triangle_surface(*i).unwrap_or(MainSurface::Buccal),
        Zone::InterdentalMesial => MainSurface::Mesial,
        Zone::InterdentalDistal => MainSurface::Distal,
    }
}

/// Collapse a raw zone id by prefix. Unrecognized ids come back unchanged
/// in the `Err` so callers can pass them through.
pub fn collapse_id(id: &str, tooth: ToothId) -> Result<MainSurface, String> {
    if let Ok(zone) = id.parse::<Zone>() {
        return Ok(collapse(&zone, tooth));
    }
    let prefixes: [(&str, MainSurface); 7] = [
        ("occlusal", MainSurface::Occlusal),
        ("cervical-buccal", MainSurface::Buccal),
        ("cervical-lingual", MainSurface::Lingual),
        ("buccal", MainSurface::Buccal),
        ("lingual", MainSurface::Lingual),
        ("interdental-mesial", MainSurface::Mesial),
        ("interdental-distal", MainSurface::Distal),
    ];
    prefixes
        .iter()
        .find(|(prefix, _)| id.starts_with(prefix))
        .map(|(_, surface)| *surface)
        .ok_or_else(|| id.to_string())
}

/// Distinct main surfaces covered by a zone set.
pub fn surfaces_of<'a>(
    zones: impl IntoIterator<Item = &'a Zone>,
    tooth: ToothId,
) -> BTreeSet<MainSurface> {
    zones.into_iter().map(|zone| collapse(zone, tooth)).collect()
}

impl Zone {
    /// Whether this zone is drawn on the given tooth type.
    pub fn is_valid_for(&self, tooth_type: ToothType) -> bool {
        zones_for(tooth_type).contains(self)
    }
}

// ═══════════════════════════════════════════
// String ids
// ═══════════════════════════════════════════

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, index) = match self {
            Zone::Occlusal(i) => ("occlusal", *i),
            Zone::Buccal(i) => ("buccal", *i),
            Zone::Lingual(i) => ("lingual", *i),
            Zone::CervicalBuccal(i) => ("cervical-buccal", *i),
            Zone::CervicalLingual(i) => ("cervical-lingual", *i),
            Zone::Triangle(i) => ("triangle", Some(*i)),
            Zone::InterdentalMesial => ("interdental-mesial", None),
            Zone::InterdentalDistal => ("interdental-distal", None),
        };
        match index {
            Some(i) => write!(f, "{name}-{i}"),
            None => f.write_str(name),
        }
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interdental-mesial" => return Ok(Zone::InterdentalMesial),
            "interdental-distal" => return Ok(Zone::InterdentalDistal),
            _ => {}
        }

        let (name, index) = match s.rsplit_once('-') {
            Some((name, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                let index: u8 = digits.parse().map_err(|_| format!("Unknown zone: {s}"))?;
                (name, Some(index))
            }
            _ => (s, None),
        };

        let zone = match name {
            "occlusal" if within(index, 4) => Zone::Occlusal(index),
            "buccal" if within(index, 2) => Zone::Buccal(index),
            "lingual" if within(index, 2) => Zone::Lingual(index),
            "cervical-buccal" if within(index, 2) => Zone::CervicalBuccal(index),
            "cervical-lingual" if within(index, 2) => Zone::CervicalLingual(index),
            "triangle" => match index {
                Some(i @ 1..=4) => Zone::Triangle(i),
                _ => return Err(format!("Unknown zone: {s}")),
            },
            _ => return Err(format!("Unknown zone: {s}")),
        };
        Ok(zone)
    }
}

fn within(index: Option<u8>, max: u8) -> bool {
    index.map_or(true, |i| (1..=max).contains(&i))
}

impl TryFrom<String> for Zone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.to_string()
    }
}
