use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CodeCategory, FillingMaterial};

/// Read-only reference to a billing code from the code catalog.
///
/// `surface_count` and `material` are the lookup parameters of
/// derived codes (fillings); fixed codes leave them empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DentalCodeRef {
    pub id: Uuid,
    pub code: String,
    pub category: CodeCategory,
    pub description: String,
    pub surface_count: Option<u8>,
    pub material: Option<FillingMaterial>,
}

impl DentalCodeRef {
    /// Builds a reference with an id derived from the code string,
    /// stable across catalog instances.
    pub fn new(code: &str, category: CodeCategory, description: &str) -> Self {
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, code.as_bytes()),
            code: code.to_string(),
            category,
            description: description.to_string(),
            surface_count: None,
            material: None,
        }
    }

    pub fn with_parameters(mut self, surface_count: u8, material: FillingMaterial) -> Self {
        self.surface_count = Some(surface_count);
        self.material = Some(material);
        self
    }
}
