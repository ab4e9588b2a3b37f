//! Load combinations and the rules that generate them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::load_case::LoadCategory;
use crate::error::{FrameError, FrameResult};
use crate::model::StructuralModel;

/// A load combination defines how load cases are combined for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadCombination {
    /// Unique id of the combination
    pub id: String,
    /// Display name
    pub name: String,
    /// Factors for each load case (case id -> factor)
    pub factors: HashMap<String, f64>,
    /// Optional tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LoadCombination {
    /// Create a new load combination; the name defaults to the id
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            factors: HashMap::new(),
            tags: Vec::new(),
        }
    }

    /// Create a load combination with a single load case at factor 1.0
    pub fn single(id: &str, case: &str) -> Self {
        Self::new(id).with_case(case, 1.0)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add a load case with a factor
    pub fn with_case(mut self, case: &str, factor: f64) -> Self {
        self.factors.insert(case.to_string(), factor);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Get the factor for a load case
    pub fn factor(&self, case: &str) -> f64 {
        self.factors.get(case).copied().unwrap_or(0.0)
    }

    /// Check if this combination includes a specific load case
    pub fn includes(&self, case: &str) -> bool {
        self.factor(case).abs() > 0.0
    }

    /// Check every referenced case exists and every factor is finite
    pub fn validate(&self, model: &StructuralModel) -> FrameResult<()> {
        for (case, factor) in &self.factors {
            if model.load_case(case).is_none() {
                return Err(FrameError::reference(
                    crate::error::EntityKind::LoadCase,
                    case,
                    &self.id,
                ));
            }
            if !factor.is_finite() {
                return Err(FrameError::validation(
                    &self.id,
                    format!("factor for load case '{}' is not finite", case),
                ));
            }
        }
        Ok(())
    }
}

/// A design-code style rule mapping load categories to factors.
///
/// Expanding a rule against a model yields concrete combinations. Cases of a
/// non-reversible category are all included together. Cases of a reversible
/// category (typically wind or seismic) are taken one at a time with both
/// signs, producing one combination per case and sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationRule {
    pub name: String,
    pub factors: HashMap<LoadCategory, f64>,
    #[serde(default)]
    pub reversible: Vec<LoadCategory>,
}

impl CombinationRule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            factors: HashMap::new(),
            reversible: Vec::new(),
        }
    }

    pub fn with_factor(mut self, category: LoadCategory, factor: f64) -> Self {
        self.factors.insert(category, factor);
        self
    }

    /// Apply a category one case at a time with both signs
    pub fn reversible(mut self, category: LoadCategory) -> Self {
        if !self.reversible.contains(&category) {
            self.reversible.push(category);
        }
        self
    }

    /// Expand the rule against the load cases of a model.
    ///
    /// Categories without any case in the model are skipped. The result is
    /// deterministic: cases follow model insertion order.
    pub fn expand(&self, model: &StructuralModel) -> Vec<LoadCombination> {
        let mut base: Vec<(String, f64)> = Vec::new();
        let mut choices: Vec<Vec<(String, f64)>> = Vec::new();

        let mut categories: Vec<(LoadCategory, f64)> =
            self.factors.iter().map(|(&c, &f)| (c, f)).collect();
        categories.sort_by_key(|(c, _)| *c as u8);

        for (category, factor) in categories {
            let cases: Vec<&str> = model
                .load_cases()
                .filter(|(_, case)| case.category == category)
                .map(|(id, _)| id)
                .collect();
            if cases.is_empty() {
                continue;
            }
            if self.reversible.contains(&category) {
                let options = cases
                    .iter()
                    .flat_map(|id| [(id.to_string(), factor), (id.to_string(), -factor)])
                    .collect();
                choices.push(options);
            } else {
                base.extend(cases.iter().map(|id| (id.to_string(), factor)));
            }
        }

        // Cartesian product over reversible categories
        let mut variants: Vec<Vec<(String, f64)>> = vec![Vec::new()];
        for options in &choices {
            variants = variants
                .iter()
                .flat_map(|prefix| {
                    options.iter().map(move |choice| {
                        let mut next = prefix.clone();
                        next.push(choice.clone());
                        next
                    })
                })
                .collect();
        }

        let single = variants.len() == 1;
        variants
            .into_iter()
            .enumerate()
            .map(|(i, variant)| {
                let id = if single {
                    self.name.clone()
                } else {
                    format!("{} #{}", self.name, i + 1)
                };
                let suffix: Vec<String> = variant
                    .iter()
                    .map(|(case, f)| format!("{}{}", if *f < 0.0 { "-" } else { "+" }, case))
                    .collect();
                let name = if suffix.is_empty() {
                    self.name.clone()
                } else {
                    format!("{} ({})", self.name, suffix.join(", "))
                };
                let mut combo = LoadCombination::new(&id).with_name(&name).with_tag(&self.name);
                for (case, factor) in base.iter().chain(variant.iter()) {
                    combo = combo.with_case(case, *factor);
                }
                combo
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loads::LoadCase;

    fn model_with_cases() -> StructuralModel {
        let mut model = StructuralModel::new();
        model.add_load_case("D", LoadCase::dead("Self weight")).unwrap();
        model.add_load_case("L", LoadCase::live("Office")).unwrap();
        model.add_load_case("WX", LoadCase::wind("Wind X")).unwrap();
        model.add_load_case("WZ", LoadCase::wind("Wind Z")).unwrap();
        model
    }

    #[test]
    fn test_factor_lookup() {
        let combo = LoadCombination::new("ULS1")
            .with_case("D", 1.2)
            .with_case("L", 1.6);
        assert_eq!(combo.factor("D"), 1.2);
        assert_eq!(combo.factor("W"), 0.0);
        assert!(combo.includes("L"));
        assert!(!combo.includes("W"));
    }

    #[test]
    fn test_unknown_case_is_reference_error() {
        let model = model_with_cases();
        let combo = LoadCombination::single("C1", "missing");
        assert!(matches!(
            combo.validate(&model),
            Err(FrameError::Reference { .. })
        ));
    }

    #[test]
    fn test_rule_without_reversible_yields_one_combo() {
        let model = model_with_cases();
        let rule = CombinationRule::new("1.2D+1.6L")
            .with_factor(LoadCategory::Dead, 1.2)
            .with_factor(LoadCategory::Live, 1.6)
            .with_factor(LoadCategory::Snow, 0.5);
        let combos = rule.expand(&model);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].id, "1.2D+1.6L");
        assert_eq!(combos[0].factor("D"), 1.2);
        assert_eq!(combos[0].factor("L"), 1.6);
        assert_eq!(combos[0].factors.len(), 2);
    }

    #[test]
    fn test_reversible_category_is_enumerated() {
        let model = model_with_cases();
        let rule = CombinationRule::new("1.2D+1.0W")
            .with_factor(LoadCategory::Dead, 1.2)
            .with_factor(LoadCategory::Wind, 1.0)
            .reversible(LoadCategory::Wind);
        let combos = rule.expand(&model);
        // two wind cases, two signs each
        assert_eq!(combos.len(), 4);
        for combo in &combos {
            assert_eq!(combo.factor("D"), 1.2);
            let wind: Vec<f64> = ["WX", "WZ"]
                .iter()
                .map(|c| combo.factor(c))
                .filter(|f| *f != 0.0)
                .collect();
            assert_eq!(wind.len(), 1);
            assert_eq!(wind[0].abs(), 1.0);
        }
        assert_eq!(combos[1].factor("WX"), -1.0);
    }
}
