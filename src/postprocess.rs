//! Result post-processor: nodal results, element end forces, force diagrams,
//! fiber stress extremes and per-combination summaries

use log::debug;
use nalgebra::DVector;

use crate::assembly::{AssembledSystem, ElementFrame};
use crate::elements::Section;
use crate::error::{EntityKind, FrameError, FrameResult};
use crate::loads::{CombinedLoads, MemberLoad};
use crate::math::{Vec12, Vec3};
use crate::modal::Mode;
use crate::model::StructuralModel;
use crate::results::{
    AnalysisSummary, CombinationResult, DiagramPoint, ElementResult, MemberForces, ModeResult,
    NodeDisplacement, NodeResult, Reactions, StressExtremes,
};
use crate::solver::StaticSolution;

// ========================
// Element forces
// ========================

/// Local end forces of an element: K_condensed·u_local plus the condensed
/// fixed-end reactions of its loads
pub fn element_end_forces(frame: &ElementFrame, displacements: &DVector<f64>, fer: &Vec12) -> Vec12 {
    let u_global = Vec12::from_fn(|a, _| displacements[frame.dofs[a]]);
    let u_local = frame.t * u_global;
    frame.k_condensed * u_local + fer
}

/// Internal forces at `x` from the start-end forces and the loads left of `x`
pub fn internal_forces_at(end_forces: &Vec12, loads: &[MemberLoad], x: f64) -> MemberForces {
    let mut q = Vec3::zeros();
    let mut m = Vec3::zeros();

    for load in loads {
        match *load {
            MemberLoad::Point { position, force } => {
                if position <= x {
                    q += force;
                    m += force * (x - position);
                }
            }
            MemberLoad::Linear { x1, x2, w1, w2 } => {
                if x <= x1 || x2 <= x1 {
                    continue;
                }
                let c = x.min(x2) - x1;
                let k = (w2 - w1) / (x2 - x1);
                let resultant = w1 * c + k * (c * c / 2.0);
                let first_moment = w1 * (c * c / 2.0) + k * (c * c * c / 3.0);
                q += resultant;
                m += resultant * (x - x1) - first_moment;
            }
        }
    }

    let f = end_forces;
    MemberForces {
        axial: -(f[0] + q[0]),
        shear_y: f[1] + q[1],
        shear_z: f[2] + q[2],
        torsion: -f[3],
        moment_y: f[4] + x * f[2] + m[2],
        moment_z: f[5] - x * f[1] - m[1],
    }
}

/// Diagram stations: `stations` evenly spaced points plus every load
/// position and load bound inside the element, ascending and deduplicated
pub fn diagram_stations(length: f64, loads: &[MemberLoad], stations: usize) -> Vec<f64> {
    let count = stations.max(2);
    let mut xs: Vec<f64> = (0..count)
        .map(|i| length * i as f64 / (count - 1) as f64)
        .collect();
    for load in loads {
        match *load {
            MemberLoad::Point { position, .. } => xs.push(position),
            MemberLoad::Linear { x1, x2, .. } => {
                xs.push(x1);
                xs.push(x2);
            }
        }
    }
    xs.retain(|x| (0.0..=length).contains(x));
    xs.sort_by(f64::total_cmp);
    let tolerance = length * 1e-9;
    xs.dedup_by(|a, b| (*a - *b).abs() <= tolerance);
    xs
}

/// Axial, shear, torsion and moment diagram of one element
pub fn force_diagram(
    length: f64,
    end_forces: &Vec12,
    loads: &[MemberLoad],
    stations: usize,
) -> Vec<DiagramPoint> {
    diagram_stations(length, loads, stations)
        .into_iter()
        .map(|x| DiagramPoint {
            x,
            forces: internal_forces_at(end_forces, loads, x),
        })
        .collect()
}

/// Extreme fiber stresses over the diagram stations: N/A ± (|My|·c_strong/Iy
/// + |Mz|·c_weak/Iz) at the corner fiber, or N/A ± √(My² + Mz²)·c/I for round
/// sections
pub fn stress_extremes(section: &Section, diagram: &[DiagramPoint]) -> StressExtremes {
    let mut extremes = StressExtremes {
        max: f64::NEG_INFINITY,
        max_at: 0.0,
        min: f64::INFINITY,
        min_at: 0.0,
    };
    for point in diagram {
        let f = &point.forces;
        let direct = f.axial / section.a;
        let bending = if section.round {
            f.moment_y.hypot(f.moment_z) * section.c_strong() / section.iy
        } else {
            f.moment_y.abs() * section.c_strong() / section.iy + f.moment_z.abs() * section.c_weak() / section.iz
        };
        if direct + bending > extremes.max {
            extremes.max = direct + bending;
            extremes.max_at = point.x;
        }
        if direct - bending < extremes.min {
            extremes.min = direct - bending;
            extremes.min_at = point.x;
        }
    }
    if diagram.is_empty() {
        extremes.max = 0.0;
        extremes.min = 0.0;
    }
    extremes
}

// ========================
// Assembling result records
// ========================

fn node_results(system: &AssembledSystem, model: &StructuralModel, solution: &StaticSolution) -> Vec<NodeResult> {
    let dof_map = &system.dof_map;
    (0..dof_map.num_nodes())
        .map(|position| {
            let id = dof_map.node_id(position);
            let slice = |v: &DVector<f64>| {
                let mut arr = [0.0; 6];
                for (k, value) in arr.iter_mut().enumerate() {
                    *value = v[position * 6 + k];
                }
                arr
            };
            let displacement = NodeDisplacement::from_array(slice(&solution.displacements));
            let reaction = model
                .boundary_condition(id)
                .is_supported()
                .then(|| Reactions::from_array(slice(&solution.reactions)));
            NodeResult {
                node: id.to_string(),
                translation: displacement.translation_magnitude(),
                rotation: displacement.rotation_magnitude(),
                displacement,
                reaction,
            }
        })
        .collect()
}

fn element_result(
    frame: &ElementFrame,
    section: &Section,
    displacements: &DVector<f64>,
    fer: &Vec12,
    loads: &[MemberLoad],
    stations: usize,
) -> ElementResult {
    let forces = element_end_forces(frame, displacements, fer);
    let mut end_forces = [0.0; 12];
    end_forces.copy_from_slice(forces.as_slice());
    let diagram = force_diagram(frame.length, &forces, loads, stations);
    let stress = stress_extremes(section, &diagram);
    ElementResult {
        element: frame.id.clone(),
        length: frame.length,
        start: MemberForces::from_start_forces(&end_forces),
        end: MemberForces::from_end_forces(&end_forces),
        end_forces,
        diagram,
        stress,
    }
}

fn summarize(
    system: &AssembledSystem,
    nodes: &[NodeResult],
    elements: &[ElementResult],
    loads: &CombinedLoads,
) -> AnalysisSummary {
    let mut summary = AnalysisSummary {
        num_nodes: system.dof_map.num_nodes(),
        num_elements: system.frames.len(),
        total_dofs: system.dof_map.num_total(),
        free_dofs: system.dof_map.num_free(),
        applied_force: [loads.total_force[0], loads.total_force[1], loads.total_force[2]],
        ..Default::default()
    };

    for node in nodes {
        if node.translation > summary.max_displacement {
            summary.max_displacement = node.translation;
            summary.max_disp_node = node.node.clone();
        }
        if let Some(reaction) = &node.reaction {
            summary.reaction_force[0] += reaction.fx;
            summary.reaction_force[1] += reaction.fy;
            summary.reaction_force[2] += reaction.fz;
            if reaction.force_magnitude() > summary.max_reaction {
                summary.max_reaction = reaction.force_magnitude();
                summary.max_reaction_node = node.node.clone();
            }
        }
    }

    for element in elements {
        if element.max_axial() > summary.max_axial {
            summary.max_axial = element.max_axial();
            summary.max_axial_element = element.element.clone();
        }
        if element.max_moment() > summary.max_moment {
            summary.max_moment = element.max_moment();
            summary.max_moment_element = element.element.clone();
        }
    }
    summary
}

/// Build the full result record of one solved combination
pub fn combination_result(
    model: &StructuralModel,
    system: &AssembledSystem,
    loads: &CombinedLoads,
    solution: &StaticSolution,
    stations: usize,
) -> FrameResult<CombinationResult> {
    let nodes = node_results(system, model, solution);

    let mut elements = Vec::with_capacity(system.frames.len());
    for (index, frame) in system.frames.iter().enumerate() {
        let element = model.element(&frame.id).ok_or_else(|| {
            FrameError::reference(EntityKind::Element, &frame.id, &solution.combination)
        })?;
        let section = model.section(&element.section).ok_or_else(|| {
            FrameError::reference(EntityKind::Section, &element.section, &frame.id)
        })?;
        elements.push(element_result(
            frame,
            section,
            &solution.displacements,
            &loads.fer[index],
            &loads.member_loads[index],
            stations,
        ));
    }

    let summary = summarize(system, &nodes, &elements, loads);
    debug!(
        "combination '{}': max displacement {:.4e} at '{}', equilibrium residual {:.3e}",
        solution.combination,
        summary.max_displacement,
        summary.max_disp_node,
        summary.equilibrium_residual()
    );

    Ok(CombinationResult {
        combination: solution.combination.clone(),
        displacements: solution.displacements.iter().copied().collect(),
        reactions: solution.reactions.iter().copied().collect(),
        nodes,
        elements,
        summary,
    })
}

/// Expand a mode over the free DOFs into a global-DOF result record
pub fn mode_result(system: &AssembledSystem, mode: &Mode) -> ModeResult {
    let dof_map = &system.dof_map;
    let shape = dof_map.merge(&mode.shape, &DVector::zeros(dof_map.num_restrained()));
    ModeResult {
        number: mode.number,
        eigenvalue: mode.eigenvalue,
        angular_frequency: mode.angular_frequency,
        frequency: mode.frequency,
        period: mode.period,
        participation: mode.participation,
        shape: shape.iter().copied().collect(),
    }
}
