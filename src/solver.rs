//! Linear static solver: one factorization of K_ff, one back-substitution
//! per load combination

use log::{debug, info};
use nalgebra::DVector;
use std::time::Instant;

use crate::analysis::CancelToken;
use crate::assembly::AssembledSystem;
use crate::error::{FrameError, FrameResult};
use crate::loads::CombinedLoads;
use crate::math::sparse::sparse_matvec;
use crate::math::{reverse_cuthill_mckee, SkylineCholesky};

/// Default relative pivot tolerance
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-10;

/// Displacements and reactions of one combination
#[derive(Debug, Clone)]
pub struct StaticSolution {
    pub combination: String,
    /// Displacements indexed by global DOF (prescribed values at restrained DOFs)
    pub displacements: DVector<f64>,
    /// Reactions indexed by global DOF (zero at free DOFs)
    pub reactions: DVector<f64>,
}

/// Factorize the free-free stiffness block.
///
/// With `reorder` the equations are permuted by reverse Cuthill-McKee before
/// the skyline factorization. A failing pivot is reported against the node
/// and DOF that owns it.
pub fn factorize(
    system: &AssembledSystem,
    pivot_tolerance: f64,
    reorder: bool,
    cancel: &CancelToken,
) -> FrameResult<SkylineCholesky> {
    let started = Instant::now();
    let perm = reorder.then(|| reverse_cuthill_mckee(&system.k_ff));
    let factor = SkylineCholesky::factorize(&system.k_ff, perm, pivot_tolerance, &|| {
        cancel.is_cancelled()
    })
    .map_err(|err| system.dof_map.annotate(err))?;

    info!(
        "factorized {} equations (profile {} entries, reordered: {}) in {:?}",
        factor.size(),
        factor.profile(),
        reorder,
        started.elapsed()
    );
    Ok(factor)
}

/// Solve one combination against a shared factorization.
///
/// Prescribed displacements move to the right-hand side:
/// K_ff·U_f = F_f − K_fr·U_r, and reactions are recovered from the
/// restrained rows: R = K_rf·U_f + K_rr·U_r − F_r.
pub fn solve(
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    loads: &CombinedLoads,
) -> StaticSolution {
    let dof_map = &system.dof_map;
    let (f_free, f_restrained) = dof_map.split(&loads.nodal);
    let u_restrained = dof_map.prescribed();

    let rhs = &f_free - sparse_matvec(&system.k_fr, u_restrained);
    let u_free = factor.solve(&rhs);

    let reactions = sparse_matvec(&system.k_rf, &u_free) + sparse_matvec(&system.k_rr, u_restrained)
        - f_restrained;

    debug!(
        "combination '{}': max |U_f| = {:.4e}",
        loads.combination,
        u_free.amax()
    );

    StaticSolution {
        combination: loads.combination.clone(),
        displacements: dof_map.merge(&u_free, u_restrained),
        reactions: dof_map.merge(&DVector::zeros(dof_map.num_free()), &reactions),
    }
}

/// Solve many combinations against one factorization.
///
/// Combinations are independent; with `parallel` (and the `parallel`
/// feature) they are back-substituted concurrently. Results keep the input
/// order. Cancellation is checked before each combination.
pub fn solve_many(
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    loads: &[CombinedLoads],
    parallel: bool,
    cancel: &CancelToken,
) -> FrameResult<Vec<StaticSolution>> {
    if parallel && loads.len() > 1 {
        solve_many_parallel(system, factor, loads, cancel)
    } else {
        loads
            .iter()
            .map(|combined| solve_checked(system, factor, combined, cancel))
            .collect()
    }
}

fn solve_checked(
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    loads: &CombinedLoads,
    cancel: &CancelToken,
) -> FrameResult<StaticSolution> {
    if cancel.is_cancelled() {
        return Err(FrameError::Cancelled);
    }
    Ok(solve(system, factor, loads))
}

#[cfg(feature = "parallel")]
fn solve_many_parallel(
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    loads: &[CombinedLoads],
    cancel: &CancelToken,
) -> FrameResult<Vec<StaticSolution>> {
    use rayon::prelude::*;

    loads
        .par_iter()
        .map(|combined| solve_checked(system, factor, combined, cancel))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn solve_many_parallel(
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    loads: &[CombinedLoads],
    cancel: &CancelToken,
) -> FrameResult<Vec<StaticSolution>> {
    loads
        .iter()
        .map(|combined| solve_checked(system, factor, combined, cancel))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::assemble;
    use crate::elements::{BoundaryCondition, Dof, Element, Material, Node, Section};
    use crate::loads::{combine, Load, LoadCase, LoadCombination};
    use crate::model::StructuralModel;
    use approx::assert_relative_eq;

    fn column_model(settlement: f64) -> StructuralModel {
        let mut model = StructuralModel::new();
        model.add_node("Base", Node::new(0.0, 0.0, 0.0)).unwrap();
        model.add_node("Top", Node::new(0.0, 3.0, 0.0)).unwrap();
        model
            .add_material("M", Material::isotropic(30e9, 0.2, 2400.0))
            .unwrap();
        model
            .add_section("S", Section::rectangular(0.3, 0.3))
            .unwrap();
        model
            .add_element("C1", Element::column("Base", "Top", "M", "S"))
            .unwrap();
        model
            .set_boundary_condition("Base", BoundaryCondition::fixed())
            .unwrap();
        model
            .set_boundary_condition(
                "Top",
                BoundaryCondition::free().with_prescribed(Dof::Dy, settlement),
            )
            .unwrap();
        model.add_load_case("D", LoadCase::dead("Dead")).unwrap();
        model
            .add_load("P", Load::node_force("D", "Top", 10e3, 0.0, 0.0))
            .unwrap();
        model.assign_dof_numbering();
        model
    }

    #[test]
    fn test_prescribed_displacement_produces_reaction() {
        let model = column_model(-0.001);
        let system = assemble(&model, None).unwrap();
        let factor = factorize(&system, DEFAULT_PIVOT_TOLERANCE, true, &CancelToken::new()).unwrap();
        let loads = combine(&model, &system, &LoadCombination::single("C", "D")).unwrap();
        let solution = solve(&system, &factor, &loads);

        // Top DY is held at the prescribed settlement
        assert_relative_eq!(solution.displacements[7], -0.001);
        // Axial force EA/L * δ pulls the top down
        let ea_l = 30e9 * 0.09 / 3.0;
        assert_relative_eq!(solution.reactions[7], -ea_l * 0.001, max_relative = 1e-9);
        assert_relative_eq!(solution.reactions[1], ea_l * 0.001, max_relative = 1e-9);
        // Lateral load is carried by the base
        assert_relative_eq!(solution.reactions[0], -10e3, max_relative = 1e-9);
    }

    #[test]
    fn test_parallel_and_serial_agree() {
        let model = column_model(0.0);
        let system = assemble(&model, None).unwrap();
        let cancel = CancelToken::new();
        let factor = factorize(&system, DEFAULT_PIVOT_TOLERANCE, false, &cancel).unwrap();
        let loads: Vec<_> = [1.0, 2.0, -0.5]
            .iter()
            .map(|&f| {
                let combo = LoadCombination::new(&format!("C{}", f)).with_case("D", f);
                combine(&model, &system, &combo).unwrap()
            })
            .collect();

        let serial = solve_many(&system, &factor, &loads, false, &cancel).unwrap();
        let parallel = solve_many(&system, &factor, &loads, true, &cancel).unwrap();
        for (a, b) in serial.iter().zip(&parallel) {
            assert_eq!(a.combination, b.combination);
            assert_relative_eq!(a.displacements, b.displacements);
        }
        assert_relative_eq!(
            serial[1].displacements,
            &serial[0].displacements * 2.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_cancelled_before_solving() {
        let model = column_model(0.0);
        let system = assemble(&model, None).unwrap();
        let cancel = CancelToken::new();
        let factor = factorize(&system, DEFAULT_PIVOT_TOLERANCE, false, &cancel).unwrap();
        let loads = vec![combine(&model, &system, &LoadCombination::single("C", "D")).unwrap()];
        cancel.cancel();
        assert!(matches!(
            solve_many(&system, &factor, &loads, false, &cancel),
            Err(FrameError::Cancelled)
        ));
    }
}
