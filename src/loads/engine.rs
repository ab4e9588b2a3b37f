//! Load combination engine: superposes factored case loads into one global
//! load vector per combination

use log::debug;
use nalgebra::DVector;

use super::{Load, LoadAxes, LoadCombination, LoadKind, LoadTarget};
use crate::assembly::{AssembledSystem, ElementFrame};
use crate::error::{EntityKind, FrameError, FrameResult};
use crate::math::{self, Vec12, Vec3};
use crate::model::StructuralModel;

/// A factored element load in the element's local axes, kept for diagrams
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemberLoad {
    /// Concentrated force at `position` from the start node
    Point { position: f64, force: Vec3 },
    /// Line load varying linearly from `w1` at `x1` to `w2` at `x2`
    Linear { x1: f64, x2: f64, w1: Vec3, w2: Vec3 },
}

impl MemberLoad {
    /// Resultant force in local axes
    pub fn resultant(&self) -> Vec3 {
        match self {
            Self::Point { force, .. } => *force,
            Self::Linear { x1, x2, w1, w2 } => (w1 + w2) * (0.5 * (x2 - x1)),
        }
    }
}

/// The loads of one combination, ready to solve
#[derive(Debug, Clone)]
pub struct CombinedLoads {
    pub combination: String,
    /// Applied nodal loads plus equivalent element loads, indexed by global DOF
    pub nodal: DVector<f64>,
    /// Condensed fixed-end reactions per element, local axes
    pub fer: Vec<Vec12>,
    /// Factored element loads per element, local axes
    pub member_loads: Vec<Vec<MemberLoad>>,
    /// Resultant of every applied force in global axes
    pub total_force: Vec3,
}

/// Superpose the factored loads of every case in `combination`.
///
/// Cases are visited in model order and their loads in insertion order, so
/// the result is deterministic. The model is never mutated; an unknown case
/// is a `Reference` error.
pub fn combine(
    model: &StructuralModel,
    system: &AssembledSystem,
    combination: &LoadCombination,
) -> FrameResult<CombinedLoads> {
    combination.validate(model)?;

    let dof_map = &system.dof_map;
    let frames = &system.frames;
    let mut nodal = DVector::zeros(dof_map.num_total());
    let mut fer_raw = vec![Vec12::zeros(); frames.len()];
    let mut member_loads: Vec<Vec<MemberLoad>> = vec![Vec::new(); frames.len()];
    let mut total_force = Vec3::zeros();
    let mut count = 0;

    for (case_id, _) in model.load_cases() {
        let factor = combination.factor(case_id);
        if factor == 0.0 {
            continue;
        }
        for (load_id, load) in model.loads_in_case(case_id) {
            count += 1;
            match &load.target {
                LoadTarget::Node(node) => {
                    let position = model
                        .node_registry()
                        .position(node)
                        .ok_or_else(|| FrameError::reference(EntityKind::Node, node, load_id))?;
                    if let LoadKind::Point { components, .. } = &load.kind {
                        for (k, value) in components.iter().enumerate() {
                            nodal[position * 6 + k] += factor * value;
                        }
                        total_force += Vec3::new(components[0], components[1], components[2]) * factor;
                    }
                }
                LoadTarget::Element(element) => {
                    let index = model.element_position(element).ok_or_else(|| {
                        FrameError::reference(EntityKind::Element, element, load_id)
                    })?;
                    let frame = &frames[index];
                    let member_load = to_local(frame, load, factor);
                    fer_raw[index] += fixed_end_reactions(&member_load, frame.length);
                    total_force += frame.rotation.transpose() * member_load.resultant();
                    member_loads[index].push(member_load);
                }
            }
        }
    }

    let mut fer = Vec::with_capacity(frames.len());
    for (frame, raw) in frames.iter().zip(&fer_raw) {
        let condensed = if raw.iter().all(|&v| v == 0.0) {
            *raw
        } else {
            math::apply_fer_releases(raw, &frame.k_local, &frame.releases).ok_or_else(|| {
                FrameError::SingularMatrix {
                    equation: frame.dofs[0],
                    location: format!("element '{}' (end releases form a mechanism)", frame.id),
                    pivot: 0.0,
                }
            })?
        };

        // Equivalent nodal loads oppose the fixed-end reactions
        let equivalent = frame.t.transpose() * condensed;
        for (a, &global) in frame.dofs.iter().enumerate() {
            nodal[global] -= equivalent[a];
        }
        fer.push(condensed);
    }

    debug!(
        "combination '{}': {} loads, resultant [{:.3e}, {:.3e}, {:.3e}]",
        combination.id, count, total_force[0], total_force[1], total_force[2]
    );

    Ok(CombinedLoads {
        combination: combination.id.clone(),
        nodal,
        fer,
        member_loads,
        total_force,
    })
}

/// Express an element load in local axes, scaled by `factor`
fn to_local(frame: &ElementFrame, load: &Load, factor: f64) -> MemberLoad {
    let local = |v: Vec3| match load.axes {
        LoadAxes::Local => v * factor,
        LoadAxes::Global => frame.rotation * v * factor,
    };
    match &load.kind {
        LoadKind::Point {
            components,
            position,
        } => MemberLoad::Point {
            position: *position,
            force: local(Vec3::new(components[0], components[1], components[2])),
        },
        LoadKind::Distributed {
            w_start,
            w_end,
            from,
            to,
        } => MemberLoad::Linear {
            x1: *from,
            x2: to.unwrap_or(frame.length).min(frame.length),
            w1: local(Vec3::from(*w_start)),
            w2: local(Vec3::from(*w_end)),
        },
    }
}

fn fixed_end_reactions(load: &MemberLoad, length: f64) -> Vec12 {
    let mut fer = Vec12::zeros();
    for direction in 0..3 {
        fer += match load {
            MemberLoad::Point { position, force } => {
                if force[direction] == 0.0 {
                    continue;
                }
                math::fer_point_load(force[direction], *position, length, direction)
            }
            MemberLoad::Linear { x1, x2, w1, w2 } => {
                if w1[direction] == 0.0 && w2[direction] == 0.0 {
                    continue;
                }
                math::fer_linear_load(w1[direction], w2[direction], *x1, *x2, length, direction)
            }
        };
    }
    fer
}
