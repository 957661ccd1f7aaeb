//! Compact chart notation.
//!
//! Clinicians type fillings as tooth + surface letters (`17dob`), pick a
//! material per tooth (`18v9`, `18v93`) or enter a material shorthand
//! without tooth (`v91`). Parsers return `None` on any mismatch so input
//! can fall through to the next interpretation and finally to free-text
//! code search.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::codes::resolve_filling_code;
use crate::models::enums::FillingMaterial;
use crate::surface::{normalize, MainSurface, SurfaceToken};
use crate::tooth::ToothId;

static FILLING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{1,2})([dobmlipfc]+)$").unwrap());

static TOOTH_MATERIAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{1,2})v([987])([1-4])?$").unwrap());

static MATERIAL_SHORTHAND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^v([987])([1-4])$").unwrap());

static DIRECT_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z]\d{2,3}$").unwrap());

// ═══════════════════════════════════════════
// Types
// ═══════════════════════════════════════════

/// A parsed filling: tooth plus its normalized, de-duplicated surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillingNotation {
    pub tooth: ToothId,
    pub surfaces: BTreeSet<MainSurface>,
    pub surface_count: usize,
}

/// Material picked directly for a tooth, optionally with a surface count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToothMaterialNotation {
    pub tooth: ToothId,
    pub material: FillingMaterial,
    pub surface_count: Option<u8>,
}

/// What a piece of chart input means, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotationIntent {
    Filling(FillingNotation),
    ToothMaterial(ToothMaterialNotation),
    MaterialShorthand {
        material: FillingMaterial,
        surface_count: u8,
        code: String,
    },
    DirectCode {
        code: String,
    },
}

// ═══════════════════════════════════════════
// Parsers
// ═══════════════════════════════════════════

/// Parse `^(\d{1,2})([dobmlipfc]+)$`, e.g. `17dob`.
///
/// The tooth must be a valid permanent or primary FDI number. Letters are
/// normalized for the tooth before counting, so `17oi` counts one surface.
pub fn parse_filling_notation(input: &str) -> Option<FillingNotation> {
    let caps = FILLING_PATTERN.captures(input.trim())?;
    let tooth: ToothId = caps.get(1)?.as_str().parse().ok()?;

    let mut surfaces = BTreeSet::new();
    for letter in caps.get(2)?.as_str().chars() {
        surfaces.insert(normalize(SurfaceToken::Letter(letter), tooth)?);
    }

    Some(FillingNotation {
        tooth,
        surface_count: surfaces.len(),
        surfaces,
    })
}

/// Parse `^(\d{1,2})v([987])([1-4])?$`, e.g. `18v9` or `18v93`.
/// `9` is composite, `8` glasionomeer, `7` amalgam.
pub fn check_tooth_specific_pattern(input: &str) -> Option<ToothMaterialNotation> {
    let caps = TOOTH_MATERIAL_PATTERN.captures(input.trim())?;
    let tooth: ToothId = caps.get(1)?.as_str().parse().ok()?;
    let material = material_digit(caps.get(2)?.as_str())?;
    let surface_count = match caps.get(3) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };
    Some(ToothMaterialNotation {
        tooth,
        material,
        surface_count,
    })
}

/// Parse a material shorthand without tooth, e.g. `v91`.
pub fn parse_material_shorthand(input: &str) -> Option<(FillingMaterial, u8)> {
    let caps = MATERIAL_SHORTHAND_PATTERN.captures(input.trim())?;
    let material = material_digit(caps.get(1)?.as_str())?;
    let count: u8 = caps.get(2)?.as_str().parse().ok()?;
    Some((material, count))
}

/// Parse every filling in a free-form note. Tokens are separated by
/// whitespace or commas; tokens that are not filling notation are dropped.
pub fn parse_all_fillings(text: &str) -> Vec<FillingNotation> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .filter_map(parse_filling_notation)
        .collect()
}

/// Interpret a single input in precedence order: filling notation, tooth
/// material, material shorthand, direct code. `None` means free text.
pub fn parse_notation(input: &str) -> Option<NotationIntent> {
    let input = input.trim();
    if let Some(filling) = parse_filling_notation(input) {
        return Some(NotationIntent::Filling(filling));
    }
    if let Some(tooth_material) = check_tooth_specific_pattern(input) {
        return Some(NotationIntent::ToothMaterial(tooth_material));
    }
    if let Some((material, surface_count)) = parse_material_shorthand(input) {
        let code = resolve_filling_code(usize::from(surface_count), material)?;
        return Some(NotationIntent::MaterialShorthand {
            material,
            surface_count,
            code: code.to_string(),
        });
    }
    if DIRECT_CODE_PATTERN.is_match(input) {
        return Some(NotationIntent::DirectCode {
            code: input.to_ascii_uppercase(),
        });
    }
    None
}

fn material_digit(digit: &str) -> Option<FillingMaterial> {
    digit.parse().ok().and_then(FillingMaterial::from_code_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use MainSurface::*;

    fn t(n: u8) -> ToothId {
        ToothId::new(n).unwrap()
    }

    #[test]
    fn parses_basic_filling() {
        let parsed = parse_filling_notation("17dob").unwrap();
        assert_eq!(parsed.tooth, t(17));
        assert_eq!(parsed.surfaces, BTreeSet::from([Distal, Occlusal, Buccal]));
        assert_eq!(parsed.surface_count, 3);
    }

    #[test]
    fn surface_order_does_not_matter() {
        assert_eq!(
            parse_filling_notation("17bod").unwrap(),
            parse_filling_notation("17dob").unwrap()
        );
    }

    #[test]
    fn case_insensitive() {
        let parsed = parse_filling_notation("46MOD").unwrap();
        assert_eq!(parsed.surfaces, BTreeSet::from([Mesial, Occlusal, Distal]));
    }

    #[test]
    fn surfaces_normalized_before_counting() {
        let parsed = parse_filling_notation("16oic").unwrap();
        assert_eq!(parsed.surface_count, 1);

        let parsed = parse_filling_notation("27b").unwrap();
        assert_eq!(parsed.surfaces, BTreeSet::from([Lingual]));

        let parsed = parse_filling_notation("11fp").unwrap();
        assert_eq!(parsed.surfaces, BTreeSet::from([Buccal, Lingual]));
    }

    #[test]
    fn rejects_invalid_teeth() {
        assert_eq!(parse_filling_notation("19o"), None);
        assert_eq!(parse_filling_notation("7o"), None);
        assert_eq!(parse_filling_notation("56o"), None);
        assert!(parse_filling_notation("55o").is_some());
    }

    #[test]
    fn rejects_non_notation() {
        assert_eq!(parse_filling_notation("17"), None);
        assert_eq!(parse_filling_notation("17x"), None);
        assert_eq!(parse_filling_notation("dob"), None);
        assert_eq!(parse_filling_notation("117o"), None);
        assert_eq!(parse_filling_notation("composite"), None);
    }

    #[test]
    fn tooth_specific_material() {
        let parsed = check_tooth_specific_pattern("18v9").unwrap();
        assert_eq!(parsed.tooth, t(18));
        assert_eq!(parsed.material, FillingMaterial::Composite);
        assert_eq!(parsed.surface_count, None);

        let parsed = check_tooth_specific_pattern("36V72").unwrap();
        assert_eq!(parsed.material, FillingMaterial::Amalgam);
        assert_eq!(parsed.surface_count, Some(2));

        assert_eq!(check_tooth_specific_pattern("18v6"), None);
        assert_eq!(check_tooth_specific_pattern("18v95"), None);
        assert_eq!(check_tooth_specific_pattern("19v9"), None);
    }

    #[test]
    fn material_shorthand() {
        assert_eq!(parse_material_shorthand("v91"), Some((FillingMaterial::Composite, 1)));
        assert_eq!(parse_material_shorthand("V84"), Some((FillingMaterial::Glasionomeer, 4)));
        assert_eq!(parse_material_shorthand("v9"), None);
    }

    #[test]
    fn parse_all_fillings_skips_noise() {
        let parsed = parse_all_fillings("17dob, 26mo  hello 19o,,36o");
        let teeth: Vec<u8> = parsed.iter().map(|f| f.tooth.number()).collect();
        assert_eq!(teeth, vec![17, 26, 36]);
        assert!(parse_all_fillings("").is_empty());
    }

    #[test]
    fn notation_precedence() {
        assert!(matches!(parse_notation("17dob"), Some(NotationIntent::Filling(_))));
        assert!(matches!(parse_notation("18v9"), Some(NotationIntent::ToothMaterial(_))));
        assert_eq!(
            parse_notation("v91"),
            Some(NotationIntent::MaterialShorthand {
                material: FillingMaterial::Composite,
                surface_count: 1,
                code: "V91".into(),
            })
        );
        assert_eq!(
            parse_notation("h11"),
            Some(NotationIntent::DirectCode { code: "H11".into() })
        );
        assert_eq!(
            parse_notation("c022"),
            Some(NotationIntent::DirectCode { code: "C022".into() })
        );
        assert_eq!(parse_notation("composite filling"), None);
    }
}
