//! Code catalog: read-only billing-code reference data.
//!
//! The chart never mutates catalog entries. `InMemoryCatalog` ships with
//! the codes the chart tools issue and can also be loaded from JSON.

use crate::codes;
use crate::models::enums::{CodeCategory, FillingMaterial};
use crate::models::DentalCodeRef;

/// Lookup interface onto the billing-code catalog.
pub trait CodeCatalog {
    /// Free-text search over code and description.
    fn search(&self, query: &str) -> Vec<DentalCodeRef>;

    /// Exact, case-insensitive code lookup.
    fn exact(&self, code: &str) -> Option<DentalCodeRef>;

    /// Lookup by category and derivation parameters.
    fn by_parameters(
        &self,
        category: CodeCategory,
        surface_count: u8,
        material: FillingMaterial,
    ) -> Option<DentalCodeRef>;
}

/// Catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    codes: Vec<DentalCodeRef>,
}

impl InMemoryCatalog {
    pub fn new(codes: Vec<DentalCodeRef>) -> Self {
        Self { codes }
    }

    /// Catalog with every code the chart tools can issue.
    pub fn builtin() -> Self {
        let mut entries = Vec::new();

        for material in FillingMaterial::ALL {
            for count in 1..=codes::MAX_FILLING_SURFACES {
                if let Some(code) = codes::resolve_filling_code(count, *material) {
                    let description = format!(
                        "Filling, {count} surface{}, {material}",
                        if count == 1 { "" } else { "s" }
                    );
                    entries.push(
                        DentalCodeRef::new(code, CodeCategory::Filling, &description)
                            .with_parameters(count as u8, *material),
                    );
                }
            }
        }

        let fixed = [
            (codes::SEALING_FIRST, CodeCategory::Sealing, "Fissure sealing, first element"),
            (codes::SEALING_ADDITIONAL, CodeCategory::Sealing, "Fissure sealing, each additional element"),
            (codes::ANESTHESIA, CodeCategory::Anesthesia, "Local anesthesia"),
            (codes::ADDITIONAL_C022, CodeCategory::Additional, "Additional consultation time"),
            (codes::SCALING_FIRST, CodeCategory::Scaling, "Scaling, first session of the day"),
            (codes::SCALING_ADDITIONAL, CodeCategory::Scaling, "Scaling, each additional session"),
            (codes::EXTRACTION_SIMPLE, CodeCategory::Extraction, "Extraction, single element"),
            (codes::EXTRACTION_SURGICAL, CodeCategory::Extraction, "Surgical extraction"),
            (codes::CROWN_PORCELAIN, CodeCategory::Crown, "Crown, porcelain"),
            (codes::CROWN_GOLD, CodeCategory::Crown, "Crown, gold"),
            (codes::BRIDGE_PONTIC, CodeCategory::Bridge, "Bridge pontic"),
            (codes::TOOTH_DISABLED, CodeCategory::Marker, "Tooth marked missing"),
            (codes::SAVED_DENTAL_CHART, CodeCategory::Marker, "Saved dental chart"),
        ];
        entries.extend(
            fixed
                .iter()
                .map(|(code, category, description)| DentalCodeRef::new(code, *category, description)),
        );

        Self { codes: entries }
    }

    /// Load a catalog from a JSON array of code references.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            codes: serde_json::from_str(json)?,
        })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl CodeCatalog for InMemoryCatalog {
    fn search(&self, query: &str) -> Vec<DentalCodeRef> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        // Rank: exact code, code prefix, description substring.
        let mut ranked: Vec<(u8, &DentalCodeRef)> = self
            .codes
            .iter()
            .filter_map(|c| {
                let code = c.code.to_lowercase();
                if code == query {
                    Some((0, c))
                } else if code.starts_with(&query) {
                    Some((1, c))
                } else if c.description.to_lowercase().contains(&query) {
                    Some((2, c))
                } else {
                    None
                }
            })
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.code.cmp(&b.1.code)));
        ranked.into_iter().map(|(_, c)| c.clone()).collect()
    }

    fn exact(&self, code: &str) -> Option<DentalCodeRef> {
        let code = code.trim();
        self.codes
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .cloned()
    }

    fn by_parameters(
        &self,
        category: CodeCategory,
        surface_count: u8,
        material: FillingMaterial,
    ) -> Option<DentalCodeRef> {
        self.codes
            .iter()
            .find(|c| {
                c.category == category
                    && c.surface_count == Some(surface_count)
                    && c.material == Some(material)
            })
            .cloned()
    }
}
