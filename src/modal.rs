//! Modal solver: lowest natural modes of K·Φ = λ·M·Φ on the free system
//!
//! Both paths reuse the stiffness factor K = L·Lᵗ from the static solve and
//! look for the largest eigenvalues μ = 1/λ of K⁻¹·M:
//! - small systems reduce to the dense symmetric matrix A = L⁻¹·M·L⁻ᵗ and
//!   solve it completely;
//! - larger systems run a Lanczos iteration on K⁻¹·M in the M inner product
//!   with full reorthogonalization, stopping once the wanted Ritz pairs
//!   converge.
//!
//! A positive semi-definite (lumped) mass matrix is fine: massless DOFs show
//! up as μ ≈ 0 and are never reported.

use log::{debug, info};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Instant;

use crate::analysis::CancelToken;
use crate::assembly::AssembledSystem;
use crate::error::{FrameError, FrameResult};
use crate::math::sparse::sparse_matvec;
use crate::math::SkylineCholesky;

/// Relative size below which an eigenvalue of A counts as massless
const MASSLESS_RATIO: f64 = 1e-10;

/// Free-DOF count up to which the dense reduction is used
pub const DENSE_MODAL_LIMIT: usize = 120;

/// Relative Ritz residual ‖K⁻¹M·y − μ·y‖_M / μ accepted as converged
const RITZ_TOLERANCE: f64 = 1e-10;

/// Lanczos steps between convergence checks once `count` vectors exist
const RITZ_CHECK_INTERVAL: usize = 4;

/// Convergence controls of the eigensolver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EigenSettings {
    /// Off-diagonal tolerance of the symmetric QR iteration
    pub tolerance: f64,
    /// Iteration cap; exceeding it is a `NumericalInstability` error
    pub max_iterations: usize,
}

impl Default for EigenSettings {
    fn default() -> Self {
        Self {
            tolerance: f64::EPSILON,
            max_iterations: 100_000,
        }
    }
}

/// One natural mode of vibration
#[derive(Debug, Clone)]
pub struct Mode {
    /// 1-based mode number, ascending frequency
    pub number: usize,
    /// λ = ω²
    pub eigenvalue: f64,
    /// ω in rad per unit time
    pub angular_frequency: f64,
    /// f = ω / 2π in Hz
    pub frequency: f64,
    /// T = 1 / f
    pub period: f64,
    /// Effective modal mass ratio in global X, Y, Z
    pub participation: [f64; 3],
    /// Mass-normalized shape over the free DOFs (ΦᵗMΦ = 1)
    pub shape: DVector<f64>,
}

/// Compute the `count` lowest modes.
///
/// Fails with `InvalidArgument` when `count` is zero, exceeds the number of
/// free DOFs, or exceeds the number of mass-carrying modes, with
/// `NumericalInstability` when the eigen-iteration does not converge, and
/// with `Cancelled` between iterations.
pub fn solve_modes(
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    count: usize,
    settings: &EigenSettings,
    cancel: &CancelToken,
) -> FrameResult<Vec<Mode>> {
    let n = system.dof_map.num_free();
    if count == 0 {
        return Err(FrameError::InvalidArgument(
            "number of modes must be at least 1".to_string(),
        ));
    }
    if count > n {
        return Err(FrameError::InvalidArgument(format!(
            "requested {} modes but the model has only {} free DOFs",
            count, n
        )));
    }
    let mass = system.m_ff.as_ref().ok_or_else(|| {
        FrameError::InvalidArgument("mass matrix was not assembled".to_string())
    })?;

    let started = Instant::now();
    let pairs = if n <= DENSE_MODAL_LIMIT {
        dense_spectrum(mass, factor, count, settings, cancel)?
    } else {
        lanczos_spectrum(mass, factor, count, settings, cancel)?
    };

    let directions = influence_vectors(system);
    let totals: Vec<f64> = directions
        .iter()
        .map(|r| r.dot(&sparse_matvec(mass, r)))
        .collect();

    let mut modes = Vec::with_capacity(count);
    for (k, (mu, mut shape)) in pairs.into_iter().enumerate() {
        // Mass normalization and a deterministic sign: largest entry positive
        let m_shape = sparse_matvec(mass, &shape);
        let scale = shape.dot(&m_shape).sqrt();
        let largest = shape.iamax();
        let sign = if shape[largest] < 0.0 { -1.0 } else { 1.0 };
        shape *= sign / scale;
        let m_shape = m_shape * (sign / scale);

        let mut participation = [0.0; 3];
        for (d, r) in directions.iter().enumerate() {
            if totals[d] > 0.0 {
                let gamma = m_shape.dot(r);
                participation[d] = gamma * gamma / totals[d];
            }
        }

        let eigenvalue = 1.0 / mu;
        let angular_frequency = eigenvalue.sqrt();
        let frequency = angular_frequency / (2.0 * PI);
        debug!(
            "mode {}: {:.4} Hz, participation X {:.3} Y {:.3} Z {:.3}",
            k + 1,
            frequency,
            participation[0],
            participation[1],
            participation[2]
        );
        modes.push(Mode {
            number: k + 1,
            eigenvalue,
            angular_frequency,
            frequency,
            period: 1.0 / frequency,
            participation,
            shape,
        });
    }

    info!(
        "extracted {} of {} modes in {:?}",
        modes.len(),
        n,
        started.elapsed()
    );
    Ok(modes)
}

fn too_few_massive_modes(count: usize, found: usize) -> FrameError {
    FrameError::InvalidArgument(format!(
        "requested {} modes but only {} modes carry mass",
        count, found
    ))
}

fn no_mass() -> FrameError {
    FrameError::InvalidArgument("model has no mass on its free DOFs".to_string())
}

// ========================
// Dense reduction
// ========================

/// The `count` largest μ with unnormalized shapes, from the full
/// eigen-decomposition of A = L⁻¹·M·L⁻ᵗ
fn dense_spectrum(
    mass: &CsrMatrix<f64>,
    factor: &SkylineCholesky,
    count: usize,
    settings: &EigenSettings,
    cancel: &CancelToken,
) -> FrameResult<Vec<(f64, DVector<f64>)>> {
    let n = factor.size();

    // Mass in the factor's ordering
    let mut mp = DMatrix::zeros(n, n);
    for (row, col, &val) in mass.triplet_iter() {
        mp[(factor.permuted_index(row), factor.permuted_index(col))] += val;
    }
    cancel.check()?;

    // A = L⁻¹·Mp·L⁻ᵗ, built as L⁻¹·(L⁻¹·Mp)ᵗ
    let b = apply_inverse_factor(factor, &mp);
    cancel.check()?;
    let mut a = apply_inverse_factor(factor, &b.transpose());
    a = (&a + a.transpose()) * 0.5;
    cancel.check()?;

    let eigen = SymmetricEigen::try_new(a, settings.tolerance, settings.max_iterations)
        .ok_or_else(|| FrameError::NumericalInstability {
            iterations: settings.max_iterations,
            context: format!("symmetric eigenproblem of order {}", n),
        })?;
    cancel.check()?;

    let mu_max = eigen.eigenvalues.max();
    if !(mu_max > 0.0) {
        return Err(no_mass());
    }

    let mut order: Vec<usize> = (0..n)
        .filter(|&i| eigen.eigenvalues[i] > MASSLESS_RATIO * mu_max)
        .collect();
    if count > order.len() {
        return Err(too_few_massive_modes(count, order.len()));
    }
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));

    Ok(order
        .into_iter()
        .take(count)
        .map(|i| {
            let mut y: Vec<f64> = eigen.eigenvectors.column(i).iter().copied().collect();
            factor.backward_substitute(&mut y);
            (eigen.eigenvalues[i], factor.unpermute(&y))
        })
        .collect())
}

/// L⁻¹ applied to every column of `m`
fn apply_inverse_factor(factor: &SkylineCholesky, m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();
    let mut out = DMatrix::zeros(n, m.ncols());
    let mut column = vec![0.0; n];
    for j in 0..m.ncols() {
        column.copy_from_slice(m.column(j).as_slice());
        factor.forward_substitute(&mut column);
        out.column_mut(j).copy_from_slice(&column);
    }
    out
}

// ========================
// Lanczos iteration
// ========================

/// The `count` largest μ of K⁻¹·M with unnormalized shapes, by Lanczos
/// with full reorthogonalization in the M inner product.
///
/// The starting vector is K⁻¹·M applied to a fixed pattern, so it has no
/// component along massless DOFs. The iteration ends when the Krylov space
/// becomes invariant (every mass-carrying mode found) or when the residual
/// bound β·|s_m,i| of each wanted Ritz pair falls below `RITZ_TOLERANCE`·μ_i.
fn lanczos_spectrum(
    mass: &CsrMatrix<f64>,
    factor: &SkylineCholesky,
    count: usize,
    settings: &EigenSettings,
    cancel: &CancelToken,
) -> FrameResult<Vec<(f64, DVector<f64>)>> {
    let n = factor.size();
    let seed = DVector::from_fn(n, |i, _| ((i * 7 + 13) % 101) as f64 / 100.0 - 0.5);
    let mut q = factor.solve(&sparse_matvec(mass, &seed));
    let mut mq = sparse_matvec(mass, &q);
    let norm = q.dot(&mq).max(0.0).sqrt();
    if !(norm > 0.0) {
        return Err(no_mass());
    }
    q /= norm;
    mq /= norm;

    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut m_basis: Vec<DVector<f64>> = Vec::new();
    let mut alpha: Vec<f64> = Vec::new();
    let mut beta: Vec<f64> = Vec::new();
    let mut scale = 0.0_f64;

    loop {
        cancel.check()?;
        let mut w = factor.solve(&mq);
        let a = w.dot(&mq);
        alpha.push(a);
        scale = scale.max(a.abs());
        basis.push(q);
        m_basis.push(mq);

        // Two Gram-Schmidt sweeps against the whole basis
        for _ in 0..2 {
            for (v, mv) in basis.iter().zip(&m_basis) {
                let c = w.dot(mv);
                w.axpy(-c, v, 1.0);
            }
        }
        let mw = sparse_matvec(mass, &w);
        let b = w.dot(&mw).max(0.0).sqrt();

        let m = basis.len();
        let exhausted = m == n || b <= MASSLESS_RATIO * scale;
        let due = m >= count && (m - count) % RITZ_CHECK_INTERVAL == 0;
        if exhausted || due {
            let (theta, s) = ritz_pairs(&alpha, &beta, settings)?;
            let theta_max = theta.iter().copied().fold(0.0_f64, f64::max);
            if !(theta_max > 0.0) {
                return Err(no_mass());
            }
            let mut order: Vec<usize> = (0..m)
                .filter(|&i| theta[i] > MASSLESS_RATIO * theta_max)
                .collect();
            order.sort_by(|&i, &j| theta[j].total_cmp(&theta[i]));

            let converged = order.len() >= count
                && order
                    .iter()
                    .take(count)
                    .all(|&i| (b * s[(m - 1, i)]).abs() <= RITZ_TOLERANCE * theta[i]);
            if exhausted && order.len() < count {
                return Err(too_few_massive_modes(count, order.len()));
            }
            if exhausted || converged {
                debug!("Lanczos converged after {} steps on {} DOFs", m, n);
                return Ok(order
                    .into_iter()
                    .take(count)
                    .map(|i| {
                        let mut y = DVector::zeros(n);
                        for (k, v) in basis.iter().enumerate() {
                            y.axpy(s[(k, i)], v, 1.0);
                        }
                        (theta[i], y)
                    })
                    .collect());
            }
        }
        beta.push(b);
        q = w / b;
        mq = mw / b;
    }
}

/// Eigenpairs of the Lanczos tridiagonal matrix
fn ritz_pairs(
    alpha: &[f64],
    beta: &[f64],
    settings: &EigenSettings,
) -> FrameResult<(DVector<f64>, DMatrix<f64>)> {
    let m = alpha.len();
    let t = DMatrix::from_fn(m, m, |i, j| {
        if i == j {
            alpha[i]
        } else if i == j + 1 {
            beta[j]
        } else if j == i + 1 {
            beta[i]
        } else {
            0.0
        }
    });
    let eigen = SymmetricEigen::try_new(t, settings.tolerance, settings.max_iterations)
        .ok_or_else(|| FrameError::NumericalInstability {
            iterations: settings.max_iterations,
            context: format!("Lanczos tridiagonal problem of order {}", m),
        })?;
    Ok((eigen.eigenvalues, eigen.eigenvectors))
}

/// Rigid-body translation of the free DOFs in global X, Y and Z
fn influence_vectors(system: &AssembledSystem) -> [DVector<f64>; 3] {
    let dof_map = &system.dof_map;
    let n = dof_map.num_free();
    [0, 1, 2].map(|d| DVector::from_fn(n, |eq, _| if dof_map.free_dof(eq) % 6 == d { 1.0 } else { 0.0 }))
}
