//! Rubric loading and validation.
//!
//! A rubric is a JSON file with an ordered list of categories. It is
//! validated once at load and immutable afterwards; every classification
//! run borrows the same parsed rubric.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::UNCLASSIFIED;

/// One rubric category: a name plus the description, filename patterns,
/// and content keywords the model is prompted with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Ordered, validated category list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    categories: Vec<Category>,
}

impl Rubric {
    /// Build a rubric from already-parsed categories, applying the same
    /// validation as [`Rubric::load`].
    pub fn new(categories: Vec<Category>) -> Result<Rubric> {
        if categories.is_empty() {
            return Err(Error::RubricFormat(
                "rubric must define at least one category".into(),
            ));
        }
        let mut seen = HashSet::new();
        for cat in &categories {
            if cat.name.trim().is_empty() {
                return Err(Error::RubricFormat("category name must not be empty".into()));
            }
            if cat.name == UNCLASSIFIED {
                return Err(Error::RubricFormat(format!(
                    "category name '{UNCLASSIFIED}' is reserved"
                )));
            }
            if !seen.insert(cat.name.clone()) {
                return Err(Error::RubricFormat(format!(
                    "duplicate category name '{}'",
                    cat.name
                )));
            }
        }
        Ok(Rubric { categories })
    }

    /// Load and validate a rubric JSON file.
    pub fn load(path: &Path) -> Result<Rubric> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::RubricNotFound(format!("{}: {e}", path.display())))?;
        let parsed: RubricFile = serde_json::from_str(&raw)
            .map_err(|e| Error::RubricFormat(format!("{}: {e}", path.display())))?;
        Rubric::new(parsed.categories)
    }

    /// Categories in declaration order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// True when `name` is a rubric category or the `unclassified`
    /// sentinel. The strict response parser accepts nothing else.
    pub fn is_valid_category(&self, name: &str) -> bool {
        name == UNCLASSIFIED || self.categories.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct RubricFile {
    categories: Vec<Category>,
}
