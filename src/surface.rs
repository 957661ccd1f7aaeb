//! Surface normalization.
//!
//! Raw surface letters as typed by the clinician (`o d m b l f p i c`)
//! are mapped to one of five canonical main surfaces. Molars in quadrants
//! 2 and 3 have their letters mirrored; every other tooth keeps the
//! letter's literal meaning. Canonical names are never mirrored again,
//! which keeps normalization idempotent.
//!
//! `lingual` is the only internal name for the tongue/palate side.
//! `palatal` exists purely as a display label for upper teeth.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tooth::{Quadrant, ToothId};

// ═══════════════════════════════════════════
// Types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainSurface {
    Occlusal,
    Mesial,
    Distal,
    Buccal,
    Lingual,
}

impl MainSurface {
    pub const ALL: [MainSurface; 5] = [
        MainSurface::Occlusal,
        MainSurface::Mesial,
        MainSurface::Distal,
        MainSurface::Buccal,
        MainSurface::Lingual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MainSurface::Occlusal => "occlusal",
            MainSurface::Mesial => "mesial",
            MainSurface::Distal => "distal",
            MainSurface::Buccal => "buccal",
            MainSurface::Lingual => "lingual",
        }
    }

    fn swap_mesiodistal(self) -> Self {
        match self {
            MainSurface::Mesial => MainSurface::Distal,
            MainSurface::Distal => MainSurface::Mesial,
            other => other,
        }
    }

    fn swap_buccolingual(self) -> Self {
        match self {
            MainSurface::Buccal => MainSurface::Lingual,
            MainSurface::Lingual => MainSurface::Buccal,
            other => other,
        }
    }
}

impl fmt::Display for MainSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses canonical names plus the display-only and anatomical aliases.
/// `palatal` resolves to `Lingual`, which makes display labels reversible.
impl FromStr for MainSurface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "occlusal" | "incisal" => Ok(MainSurface::Occlusal),
            "mesial" => Ok(MainSurface::Mesial),
            "distal" => Ok(MainSurface::Distal),
            "buccal" | "facial" | "labial" | "vestibular" => Ok(MainSurface::Buccal),
            "lingual" | "palatal" => Ok(MainSurface::Lingual),
            other => Err(format!("Unknown surface: {other}")),
        }
    }
}

/// A surface as entered: either a raw letter or an already-canonical surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceToken {
    Letter(char),
    Canonical(MainSurface),
}

impl SurfaceToken {
    /// Every letter the notation grammar accepts.
    pub const LETTERS: [char; 9] = ['o', 'd', 'm', 'b', 'l', 'f', 'p', 'i', 'c'];

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let mut chars = raw.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return letter_base(c).map(|_| SurfaceToken::Letter(c.to_ascii_lowercase()));
        }
        raw.parse().ok().map(SurfaceToken::Canonical)
    }
}

/// Base surface for a raw letter, before any quadrant mirroring.
pub fn letter_base(letter: char) -> Option<MainSurface> {
    match letter.to_ascii_lowercase() {
        'o' | 'i' | 'c' => Some(MainSurface::Occlusal),
        'm' => Some(MainSurface::Mesial),
        'd' => Some(MainSurface::Distal),
        'b' | 'f' => Some(MainSurface::Buccal),
        'l' | 'p' => Some(MainSurface::Lingual),
        _ => None,
    }
}

// ═══════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════

/// Normalize a surface token for a tooth.
///
/// Letters on molars are mirrored: quadrant 2 swaps buccal/lingual and
/// mesial/distal, quadrant 3 swaps mesial/distal only. Non-molars are
/// never mirrored. Canonical surfaces pass through unchanged.
pub fn normalize(token: SurfaceToken, tooth: ToothId) -> Option<MainSurface> {
    let letter = match token {
        SurfaceToken::Canonical(surface) => return Some(surface),
        SurfaceToken::Letter(letter) => letter,
    };
    let base = letter_base(letter)?;
    if !tooth.is_molar() {
        return Some(base);
    }
    let mirrored = match tooth.quadrant() {
        Quadrant::UpperLeft => base.swap_buccolingual().swap_mesiodistal(),
        Quadrant::LowerLeft => base.swap_mesiodistal(),
        Quadrant::UpperRight | Quadrant::LowerRight => base,
    };
    Some(mirrored)
}

/// Normalize a raw string (letter or surface name). `None` for unknown input.
pub fn normalize_str(raw: &str, tooth: ToothId) -> Option<MainSurface> {
    SurfaceToken::parse(raw).and_then(|token| normalize(token, tooth))
}

// ═══════════════════════════════════════════
// Display
// ═══════════════════════════════════════════

/// Presentation name of a surface. Lingual is shown as palatal on upper teeth.
pub fn display_label(surface: MainSurface, tooth: ToothId) -> &'static str {
    if surface == MainSurface::Lingual && tooth.quadrant().is_upper() {
        "palatal"
    } else {
        surface.as_str()
    }
}

/// Single-letter abbreviation matching `display_label`.
pub fn display_letter(surface: MainSurface, tooth: ToothId) -> char {
    match display_label(surface, tooth) {
        "palatal" => 'P',
        label => label
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?'),
    }
}
