//! Structural entities of the idealized frame model

mod boundary;
mod element;
mod material;
mod node;
mod section;

pub use boundary::BoundaryCondition;
pub use element::{Element, ElementKind, EndReleases};
pub use material::Material;
pub use node::{Dof, Node};
pub use section::Section;
