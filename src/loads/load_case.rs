//! Load cases

use serde::{Deserialize, Serialize};

/// Origin of a load case, used by combination rules to pick factors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadCategory {
    /// Self-weight and permanent loads
    Dead,
    /// Occupancy loads
    Live,
    Wind,
    Seismic,
    Snow,
    #[default]
    Other,
}

/// A load case groups related loads under a common name.
///
/// The loads themselves live in the model store, in the order they were added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadCase {
    /// Name of the load case
    pub name: String,
    #[serde(default)]
    pub category: LoadCategory,
    /// Description of the load case
    #[serde(default)]
    pub description: Option<String>,

    /// Indices of this case's loads in the store, in insertion order
    #[serde(skip)]
    pub(crate) loads: Vec<usize>,
}

impl LoadCase {
    /// Create a new load case
    pub fn new(name: &str, category: LoadCategory) -> Self {
        Self {
            name: name.to_string(),
            category,
            description: None,
            loads: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn dead(name: &str) -> Self {
        Self::new(name, LoadCategory::Dead)
    }

    pub fn live(name: &str) -> Self {
        Self::new(name, LoadCategory::Live)
    }

    pub fn wind(name: &str) -> Self {
        Self::new(name, LoadCategory::Wind)
    }

    pub fn seismic(name: &str) -> Self {
        Self::new(name, LoadCategory::Seismic)
    }

    /// Number of loads assigned to the case
    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }
}
