//! Error types for the frame solver

use std::fmt;
use thiserror::Error;

use crate::elements::Dof;

/// Kind of model entity, used to name the target of a dangling reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Element,
    Material,
    Section,
    LoadCase,
    Load,
    Combination,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "node",
            Self::Element => "element",
            Self::Material => "material",
            Self::Section => "section",
            Self::LoadCase => "load case",
            Self::Load => "load",
            Self::Combination => "load combination",
        };
        f.write_str(name)
    }
}

/// Main error type for frame analysis operations
#[derive(Error, Debug)]
pub enum FrameError {
    /// Malformed or incomplete model input, caught before any numerical work
    #[error("validation failed for '{entity}': {constraint}")]
    Validation { entity: String, constraint: String },

    /// A foreign id that does not exist in the model
    #[error("{kind} '{id}' referenced by '{referrer}' does not exist")]
    Reference {
        kind: EntityKind,
        id: String,
        referrer: String,
    },

    /// Topological singularity found before factorization
    #[error("singular model: node '{node}' is not connected to any element but has free DOFs {}", format_dofs(.dofs))]
    SingularModel { node: String, dofs: Vec<Dof> },

    /// Near-zero pivot during factorization of the stiffness matrix.
    /// `equation` is the global DOF index (node position * 6 + DOF).
    #[error("singular stiffness matrix at {location}: pivot {pivot:.3e} is below the relative tolerance, the model is likely a mechanism")]
    SingularMatrix {
        equation: usize,
        location: String,
        pivot: f64,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("eigensolver did not converge within {iterations} iterations: {context}")]
    NumericalInstability { iterations: usize, context: String },

    #[error("analysis run was cancelled")]
    Cancelled,

    /// The worker running an analysis stopped without producing a result
    #[error("analysis worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FrameError {
    pub(crate) fn validation(entity: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::Validation {
            entity: entity.into(),
            constraint: constraint.into(),
        }
    }

    pub(crate) fn reference(
        kind: EntityKind,
        id: impl Into<String>,
        referrer: impl Into<String>,
    ) -> Self {
        Self::Reference {
            kind,
            id: id.into(),
            referrer: referrer.into(),
        }
    }

    /// Whether retrying the same request could ever succeed.
    ///
    /// Validation and reference errors describe a model authored incorrectly
    /// and are never retried.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Reference { .. }
                | Self::SingularModel { .. }
                | Self::SingularMatrix { .. }
        )
    }
}

fn format_dofs(dofs: &[Dof]) -> String {
    let names: Vec<String> = dofs.iter().map(|d| d.to_string()).collect();
    format!("[{}]", names.join(", "))
}

/// Result type for frame analysis operations
pub type FrameResult<T> = Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_entity() {
        let err = FrameError::reference(EntityKind::Material, "S355", "B1");
        assert_eq!(
            err.to_string(),
            "material 'S355' referenced by 'B1' does not exist"
        );

        let err = FrameError::SingularModel {
            node: "N9".into(),
            dofs: vec![Dof::Dx, Dof::Rz],
        };
        assert!(err.to_string().contains("'N9'"));
        assert!(err.to_string().contains("[DX, RZ]"));
    }

    #[test]
    fn test_model_errors_are_not_retryable() {
        assert!(FrameError::validation("N1", "duplicate id").is_model_error());
        assert!(!FrameError::Cancelled.is_model_error());
    }
}
