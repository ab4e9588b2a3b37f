//! Loads, load cases, load combinations and the combination engine

pub mod engine;
mod load;
mod load_case;
mod load_combo;

pub use engine::{combine, CombinedLoads, MemberLoad};
pub use load::{Load, LoadAxes, LoadKind, LoadTarget};
pub use load_case::{LoadCase, LoadCategory};
pub use load_combo::{CombinationRule, LoadCombination};
