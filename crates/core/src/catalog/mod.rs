//! The house catalog.
//!
//! A [`Catalog`] is built once at startup (from the embedded JSON or an
//! override file) and shared read-only afterwards. Houses and add-on modules
//! are kept in separate collections; only houses are selectable.

mod bedrooms;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AddOnModuleRecord, HouseId, HouseRecord};

pub use bedrooms::bedroom_count;

/// Catalog shipped with the crate.
const BUILTIN_CATALOG: &str = include_str!("../../data/catalog.json");

/// Errors that can occur when loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog document is not valid JSON or has the wrong shape.
    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two records share an identifier.
    #[error("Duplicate catalog id: {0}")]
    DuplicateId(HouseId),

    /// A record has an empty identifier.
    #[error("Catalog record has an empty id")]
    EmptyId,

    /// A record's floor area is zero, negative or not a number.
    #[error("Catalog record {id} has invalid area: {area}")]
    InvalidArea { id: HouseId, area: f64 },
}

/// On-disk shape of a catalog document.
#[derive(Deserialize)]
struct CatalogDocument {
    houses: Vec<HouseRecord>,
    #[serde(default)]
    tiny_modules: Vec<AddOnModuleRecord>,
}

/// Immutable collection of house models and add-on modules.
///
/// Serializes to the same `{"houses": [...], "tiny_modules": [...]}` shape it
/// is loaded from, which is also what the model is shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    houses: Vec<HouseRecord>,
    #[serde(rename = "tiny_modules")]
    add_ons: Vec<AddOnModuleRecord>,
}

impl Catalog {
    /// Build a catalog from its two collections, validating every record.
    ///
    /// # Errors
    ///
    /// Returns an error if an id is empty or repeated (across both
    /// collections), or if an area is not a positive number.
    pub fn new(
        houses: Vec<HouseRecord>,
        add_ons: Vec<AddOnModuleRecord>,
    ) -> Result<Self, CatalogError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for record in houses.iter().chain(&add_ons) {
            if record.id.as_str().is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if !seen.insert(record.id.as_str()) {
                return Err(CatalogError::DuplicateId(record.id.clone()));
            }
            if !record.total_area_m2.is_finite() || record.total_area_m2 <= 0.0 {
                return Err(CatalogError::InvalidArea {
                    id: record.id.clone(),
                    area: record.total_area_m2,
                });
            }
        }

        Ok(Self { houses, add_ons })
    }

    /// Parse and validate a catalog document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::new(doc.houses, doc.tiny_modules)
    }

    /// The catalog embedded at compile time.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded document is invalid.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// House models, in catalog order.
    #[must_use]
    pub fn houses(&self) -> &[HouseRecord] {
        &self.houses
    }

    /// Add-on modules, in catalog order.
    #[must_use]
    pub fn add_ons(&self) -> &[AddOnModuleRecord] {
        &self.add_ons
    }

    /// Identifiers of every house, in catalog order.
    pub fn house_ids(&self) -> impl Iterator<Item = &HouseId> {
        self.houses.iter().map(|h| &h.id)
    }

    /// Look up a house by id. Add-on modules are not returned.
    #[must_use]
    pub fn house(&self, id: &str) -> Option<&HouseRecord> {
        self.houses.iter().find(|h| h.id.as_str() == id)
    }

    /// Whether `id` names a house in this catalog.
    #[must_use]
    pub fn contains_house(&self, id: &str) -> bool {
        self.house(id).is_some()
    }

    /// Every house whose bedroom count equals `bedrooms`, in catalog order.
    #[must_use]
    pub fn filter_houses_by_bedrooms(&self, bedrooms: u32) -> Vec<&HouseRecord> {
        self.houses
            .iter()
            .filter(|h| h.bedrooms() == bedrooms)
            .collect()
    }

    /// Resolve ids to house records.
    ///
    /// Records come back in the order requested, each at most once.
    /// Unknown ids are skipped.
    #[must_use]
    pub fn resolve_houses<S: AsRef<str>>(&self, ids: &[S]) -> Vec<&HouseRecord> {
        let mut seen: HashSet<&str> = HashSet::new();
        ids.iter()
            .filter_map(|id| self.house(id.as_ref()))
            .filter(|house| seen.insert(house.id.as_str()))
            .collect()
    }
}
