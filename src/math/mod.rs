//! Element formulation library: local matrices, transformations, releases
//! and fixed-end forces for the 3D frame element

pub mod sparse;

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

pub use sparse::{reverse_cuthill_mckee, SkylineCholesky, SparseMatrixBuilder};

pub type Mat = DMatrix<f64>;
pub type Mat3 = Matrix3<f64>;
pub type Vec3 = Vector3<f64>;

/// 12x12 matrix for element stiffness and mass
pub type Mat12 = SMatrix<f64, 12, 12>;
/// 12-element vector for element end forces/displacements
pub type Vec12 = SVector<f64, 12>;

/// Tolerance below which a length or cross product counts as zero
const GEOMETRY_EPS: f64 = 1e-10;

/// Mass matrix formulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassFormulation {
    /// Cubic-shape-function consistent mass
    #[default]
    Consistent,
    /// Half the translational and torsional mass at each end, no bending
    /// rotational inertia
    Lumped,
}

/// Compute the local axes of a frame element as the rows of a 3x3 direction
/// cosine matrix.
///
/// * local x runs from the start node to the end node
/// * local z lies in the plane of x and the reference vector, on the
///   reference side; local y = z × x completes a right-handed system
/// * the reference vector defaults to global +Y. When the element is
///   parallel to +Y (a column) and no reference is given, global +X is
///   used instead, so columns bend about their local y axis under X sway
/// * `rotation` rolls y and z about x afterwards (radians)
///
/// Returns `None` for a zero-length element or a reference vector that is
/// zero or parallel to the element axis.
pub fn local_axes(
    i_node: &[f64; 3],
    j_node: &[f64; 3],
    reference: Option<[f64; 3]>,
    rotation: f64,
) -> Option<Mat3> {
    let d = Vec3::new(
        j_node[0] - i_node[0],
        j_node[1] - i_node[1],
        j_node[2] - i_node[2],
    );
    let length = d.norm();
    if length < GEOMETRY_EPS {
        return None;
    }
    let x = d / length;

    let reference = match reference {
        Some(r) => {
            let r = Vec3::from(r);
            if r.norm() < GEOMETRY_EPS {
                return None;
            }
            r.normalize()
        }
        None => {
            let up = Vec3::y();
            if x.cross(&up).norm() < 1e-6 {
                Vec3::x()
            } else {
                up
            }
        }
    };

    // Component of the reference vector normal to the axis
    let z = reference - x * x.dot(&reference);
    if z.norm() < 1e-6 {
        return None;
    }
    let z = z.normalize();
    let y = z.cross(&x);

    let (y, z) = if rotation.abs() > GEOMETRY_EPS {
        let (s, c) = rotation.sin_cos();
        (y * c + z * s, z * c - y * s)
    } else {
        (y, z)
    };

    Some(Mat3::new(
        x[0], x[1], x[2],
        y[0], y[1], y[2],
        z[0], z[1], z[2],
    ))
}

/// Build the 12x12 transformation matrix from a 3x3 direction cosine matrix.
///
/// The result maps global element vectors to local ones: `u_local = T * u_global`.
pub fn member_transformation_matrix(r: &Mat3) -> Mat12 {
    let mut t = Mat12::zeros();
    for block in 0..4 {
        t.fixed_view_mut::<3, 3>(block * 3, block * 3).copy_from(r);
    }
    t
}

/// Transform a local element matrix to global axes: Tᵗ·K·T
pub fn transform_to_global(k_local: &Mat12, t: &Mat12) -> Mat12 {
    t.transpose() * k_local * t
}

/// Compute the local stiffness matrix for a 3D Euler-Bernoulli frame element
///
/// Local DOF order per end is [u, v, w, θx, θy, θz]. Bending in the local
/// x-y plane engages `iz`, bending in the x-z plane engages `iy`.
pub fn member_local_stiffness(
    e: f64,
    g: f64,
    a: f64,
    iy: f64,
    iz: f64,
    j: f64,
    length: f64,
) -> Mat12 {
    let l = length;
    let l2 = l * l;
    let l3 = l2 * l;

    let ea_l = e * a / l;
    let gj_l = g * j / l;

    let eiy_l3 = e * iy / l3;
    let eiy_l2 = e * iy / l2;
    let eiy_l = e * iy / l;

    let eiz_l3 = e * iz / l3;
    let eiz_l2 = e * iz / l2;
    let eiz_l = e * iz / l;

    #[rustfmt::skip]
    let data = [
        ea_l,   0.0,           0.0,           0.0,   0.0,          0.0,          -ea_l,  0.0,           0.0,           0.0,   0.0,          0.0,
        0.0,    12.0*eiz_l3,   0.0,           0.0,   0.0,          6.0*eiz_l2,   0.0,    -12.0*eiz_l3,  0.0,           0.0,   0.0,          6.0*eiz_l2,
        0.0,    0.0,           12.0*eiy_l3,   0.0,   -6.0*eiy_l2,  0.0,          0.0,    0.0,           -12.0*eiy_l3,  0.0,   -6.0*eiy_l2,  0.0,
        0.0,    0.0,           0.0,           gj_l,  0.0,          0.0,          0.0,    0.0,           0.0,           -gj_l, 0.0,          0.0,
        0.0,    0.0,           -6.0*eiy_l2,   0.0,   4.0*eiy_l,    0.0,          0.0,    0.0,           6.0*eiy_l2,    0.0,   2.0*eiy_l,    0.0,
        0.0,    6.0*eiz_l2,    0.0,           0.0,   0.0,          4.0*eiz_l,    0.0,    -6.0*eiz_l2,   0.0,           0.0,   0.0,          2.0*eiz_l,
        -ea_l,  0.0,           0.0,           0.0,   0.0,          0.0,          ea_l,   0.0,           0.0,           0.0,   0.0,          0.0,
        0.0,    -12.0*eiz_l3,  0.0,           0.0,   0.0,          -6.0*eiz_l2,  0.0,    12.0*eiz_l3,   0.0,           0.0,   0.0,          -6.0*eiz_l2,
        0.0,    0.0,           -12.0*eiy_l3,  0.0,   6.0*eiy_l2,   0.0,          0.0,    0.0,           12.0*eiy_l3,   0.0,   6.0*eiy_l2,   0.0,
        0.0,    0.0,           0.0,           -gj_l, 0.0,          0.0,          0.0,    0.0,           0.0,           gj_l,  0.0,          0.0,
        0.0,    0.0,           -6.0*eiy_l2,   0.0,   2.0*eiy_l,    0.0,          0.0,    0.0,           6.0*eiy_l2,    0.0,   4.0*eiy_l,    0.0,
        0.0,    6.0*eiz_l2,    0.0,           0.0,   0.0,          2.0*eiz_l,    0.0,    -6.0*eiz_l2,   0.0,           0.0,   0.0,          4.0*eiz_l,
    ];

    Mat12::from_row_slice(&data)
}

/// Compute the local mass matrix of a frame element
///
/// # Arguments
/// * `rho` - Mass density
/// * `a` - Cross-sectional area
/// * `iy`, `iz` - Moments of inertia (their sum is used for torsional inertia)
/// * `length` - Element length
pub fn member_local_mass(
    formulation: MassFormulation,
    rho: f64,
    a: f64,
    iy: f64,
    iz: f64,
    length: f64,
) -> Mat12 {
    let l = length;
    let m = rho * a * l;
    let mt = rho * (iy + iz) * l;

    match formulation {
        MassFormulation::Lumped => {
            let mut mass = Mat12::zeros();
            for offset in [0, 6] {
                for k in 0..3 {
                    mass[(offset + k, offset + k)] = m / 2.0;
                }
                mass[(offset + 3, offset + 3)] = mt / 2.0;
            }
            mass
        }
        MassFormulation::Consistent => {
            let c = m / 420.0;
            let l2 = l * l;
            let mut mass = Mat12::zeros();

            // Axial and torsion
            for (dof, total) in [(0, m), (3, mt)] {
                mass[(dof, dof)] = total / 3.0;
                mass[(dof + 6, dof + 6)] = total / 3.0;
                mass[(dof, dof + 6)] = total / 6.0;
                mass[(dof + 6, dof)] = total / 6.0;
            }

            // Bending in x-y plane: v1, θz1, v2, θz2
            #[rustfmt::skip]
            let xy = [
                156.0,      22.0 * l,   54.0,       -13.0 * l,
                22.0 * l,   4.0 * l2,   13.0 * l,   -3.0 * l2,
                54.0,       13.0 * l,   156.0,      -22.0 * l,
                -13.0 * l,  -3.0 * l2,  -22.0 * l,  4.0 * l2,
            ];
            // Bending in x-z plane: w1, θy1, w2, θy2 (rotation couples with opposite sign)
            #[rustfmt::skip]
            let xz = [
                156.0,      -22.0 * l,  54.0,       13.0 * l,
                -22.0 * l,  4.0 * l2,   -13.0 * l,  -3.0 * l2,
                54.0,       -13.0 * l,  156.0,      22.0 * l,
                13.0 * l,   -3.0 * l2,  22.0 * l,   4.0 * l2,
            ];
            for (dofs, block) in [([1, 5, 7, 11], xy), ([2, 4, 8, 10], xz)] {
                for (r, &dr) in dofs.iter().enumerate() {
                    for (s, &ds) in dofs.iter().enumerate() {
                        mass[(dr, ds)] = c * block[r * 4 + s];
                    }
                }
            }
            mass
        }
    }
}

fn partition(releases: &[bool; 12]) -> (Vec<usize>, Vec<usize>) {
    (0..12).partition(|&i| !releases[i])
}

/// Condensation terms shared by the stiffness and load condensation:
/// returns (retained, released, k12 * inv(k22)) or `None` when k22 is singular
fn condensation_terms(
    k: &Mat12,
    releases: &[bool; 12],
) -> Option<(Vec<usize>, Vec<usize>, DMatrix<f64>)> {
    let (retained, released) = partition(releases);

    let k12 = DMatrix::from_fn(retained.len(), released.len(), |i, j| {
        k[(retained[i], released[j])]
    });
    let k22 = DMatrix::from_fn(released.len(), released.len(), |i, j| {
        k[(released[i], released[j])]
    });

    // A released DOF with no stiffness of its own (e.g. torsion released at
    // both ends) makes k22 singular
    let scale = k22.diagonal().amax().max(f64::MIN_POSITIVE);
    let lu = k22.lu();
    let det = lu.determinant();
    if !det.is_finite() || det.abs() <= (1e-12 * scale).powi(released.len() as i32) {
        return None;
    }
    let k22_inv = lu.try_inverse()?;

    Some((retained, released, k12 * k22_inv))
}

/// Apply static condensation for released DOFs
///
/// Returns the condensed 12x12 matrix with zero rows and columns at the
/// released DOFs, or `None` when the releases leave the element without
/// stiffness in a released direction (a local mechanism).
pub fn apply_releases(k: &Mat12, releases: &[bool; 12]) -> Option<Mat12> {
    if !releases.iter().any(|&r| r) {
        return Some(*k);
    }
    let (retained, released, k12_k22inv) = condensation_terms(k, releases)?;

    let mut k_result = Mat12::zeros();
    for (i, &ui) in retained.iter().enumerate() {
        for &uj in retained.iter() {
            let mut value = k[(ui, uj)];
            for (r, &rr) in released.iter().enumerate() {
                value -= k12_k22inv[(i, r)] * k[(rr, uj)];
            }
            k_result[(ui, uj)] = value;
        }
    }
    Some(k_result)
}

/// Apply static condensation to a fixed-end reaction vector:
/// fer_condensed = fer1 - k12 * inv(k22) * fer2, with zeros at released DOFs
pub fn apply_fer_releases(fer: &Vec12, k: &Mat12, releases: &[bool; 12]) -> Option<Vec12> {
    if !releases.iter().any(|&r| r) {
        return Some(*fer);
    }
    let (retained, released, k12_k22inv) = condensation_terms(k, releases)?;

    let fer2 = DVector::from_fn(released.len(), |i, _| fer[released[i]]);
    let correction = k12_k22inv * fer2;

    let mut result = Vec12::zeros();
    for (i, &ui) in retained.iter().enumerate() {
        result[ui] = fer[ui] - correction[i];
    }
    Some(result)
}

/// Compute fixed-end reactions for a concentrated force
///
/// # Arguments
/// * `p` - Load magnitude in the positive local direction
/// * `a` - Distance from the start node to the load
/// * `length` - Element length
/// * `direction` - Local direction index (0=x, 1=y, 2=z)
pub fn fer_point_load(p: f64, a: f64, length: f64, direction: usize) -> Vec12 {
    let l = length;
    let b = l - a;
    let l2 = l * l;
    let l3 = l2 * l;

    let mut fer = Vec12::zeros();

    match direction {
        0 => {
            fer[0] = -p * b / l;
            fer[6] = -p * a / l;
        }
        1 => {
            fer[1] = -p * b * b * (3.0 * a + b) / l3;
            fer[5] = -p * a * b * b / l2;
            fer[7] = -p * a * a * (a + 3.0 * b) / l3;
            fer[11] = p * a * a * b / l2;
        }
        2 => {
            fer[2] = -p * b * b * (3.0 * a + b) / l3;
            fer[4] = p * a * b * b / l2;
            fer[8] = -p * a * a * (a + 3.0 * b) / l3;
            fer[10] = -p * a * a * b / l2;
        }
        _ => {}
    }

    fer
}

/// Compute fixed-end reactions for a linearly varying line load from `w1` at
/// `x1` to `w2` at `x2`.
///
/// The point-load reactions are polynomials of degree 3 in the load position,
/// so a three-point Gauss-Legendre rule integrates the linear load exactly.
pub fn fer_linear_load(
    w1: f64,
    w2: f64,
    x1: f64,
    x2: f64,
    length: f64,
    direction: usize,
) -> Vec12 {
    const POINTS: [(f64, f64); 3] = [
        (-0.774_596_669_241_483_4, 5.0 / 9.0),
        (0.0, 8.0 / 9.0),
        (0.774_596_669_241_483_4, 5.0 / 9.0),
    ];

    let span = x2 - x1;
    let mut fer = Vec12::zeros();
    if span <= 0.0 {
        return fer;
    }
    for (xi, weight) in POINTS {
        let t = 0.5 * (xi + 1.0);
        let x = x1 + t * span;
        let w = w1 + t * (w2 - w1);
        fer += fer_point_load(w, x, length, direction) * (weight * 0.5 * span);
    }
    fer
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axes_horizontal() {
        let r = local_axes(&[0.0, 0.0, 0.0], &[10.0, 0.0, 0.0], None, 0.0).unwrap();

        // local x = global X, local z = global Y (up), local y = -global Z
        assert_relative_eq!(r[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(r[(2, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(r[(1, 2)], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_axes_vertical_fallback() {
        let up = local_axes(&[0.0, 0.0, 0.0], &[0.0, 4.0, 0.0], None, 0.0).unwrap();
        assert_relative_eq!(up[(0, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(up[(2, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(up[(1, 2)], 1.0, epsilon = 1e-12);

        let down = local_axes(&[0.0, 4.0, 0.0], &[0.0, 0.0, 0.0], None, 0.0).unwrap();
        assert_relative_eq!(down[(0, 1)], -1.0, epsilon = 1e-12);
        assert_relative_eq!(down[(2, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_axes_are_orthonormal() {
        let r = local_axes(&[1.0, 2.0, 3.0], &[4.0, 7.0, -2.0], Some([0.3, 1.0, 0.2]), 0.4)
            .unwrap();
        let identity = r * r.transpose();
        assert_relative_eq!(identity, Mat3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_reference_is_rejected() {
        assert!(local_axes(&[0.0; 3], &[5.0, 0.0, 0.0], Some([2.0, 0.0, 0.0]), 0.0).is_none());
        assert!(local_axes(&[0.0; 3], &[0.0; 3], None, 0.0).is_none());
    }

    #[test]
    fn test_roll_rotates_transverse_axes() {
        let r = local_axes(
            &[0.0; 3],
            &[10.0, 0.0, 0.0],
            None,
            std::f64::consts::FRAC_PI_2,
        )
        .unwrap();
        // y rolls onto the old z (global Y)
        assert_relative_eq!(r[(1, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_local_stiffness_symmetry() {
        let k = member_local_stiffness(200e9, 77e9, 0.01, 1e-4, 2e-4, 1e-5, 10.0);
        assert_relative_eq!(k, k.transpose(), epsilon = 1e-6);
    }

    #[test]
    fn test_consistent_mass_total() {
        let m = member_local_mass(MassFormulation::Consistent, 7850.0, 0.01, 1e-4, 2e-4, 4.0);
        assert_relative_eq!(m, m.transpose(), epsilon = 1e-12);
        let total = 7850.0 * 0.01 * 4.0;
        // Rigid translation in each direction recovers the full element mass
        for dir in [0, 1, 2] {
            let mut r = Vec12::zeros();
            r[dir] = 1.0;
            r[dir + 6] = 1.0;
            assert_relative_eq!((r.transpose() * m * r)[(0, 0)], total, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_lumped_mass_has_no_bending_inertia() {
        let m = member_local_mass(MassFormulation::Lumped, 7850.0, 0.01, 1e-4, 2e-4, 4.0);
        assert_relative_eq!(m[(0, 0)], 7850.0 * 0.01 * 2.0, epsilon = 1e-9);
        assert_eq!(m[(4, 4)], 0.0);
        assert_eq!(m[(11, 11)], 0.0);
        assert!(m[(3, 3)] > 0.0);
    }

    #[test]
    fn test_pinned_releases_remove_end_moment_stiffness() {
        let k = member_local_stiffness(200e9, 77e9, 0.01, 1e-4, 2e-4, 1e-5, 5.0);
        let mut releases = [false; 12];
        releases[11] = true;
        let kc = apply_releases(&k, &releases).unwrap();
        for i in 0..12 {
            assert_eq!(kc[(11, i)], 0.0);
        }
        // Propped cantilever: 3EI/L³ transverse stiffness
        assert_relative_eq!(kc[(7, 7)], 3.0 * 200e9 * 2e-4 / 125.0, max_relative = 1e-9);
    }

    #[test]
    fn test_torsion_released_at_both_ends_is_singular() {
        let k = member_local_stiffness(200e9, 77e9, 0.01, 1e-4, 2e-4, 1e-5, 5.0);
        let mut releases = [false; 12];
        releases[3] = true;
        releases[9] = true;
        assert!(apply_releases(&k, &releases).is_none());
    }

    #[test]
    fn test_uniform_load_matches_closed_form() {
        let (w, l) = (-10.0, 6.0);
        let fer = fer_linear_load(w, w, 0.0, l, l, 1);
        assert_relative_eq!(fer[1], -w * l / 2.0, epsilon = 1e-9);
        assert_relative_eq!(fer[5], -w * l * l / 12.0, epsilon = 1e-9);
        assert_relative_eq!(fer[7], -w * l / 2.0, epsilon = 1e-9);
        assert_relative_eq!(fer[11], w * l * l / 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_triangular_load_matches_closed_form() {
        // Zero at start rising to w at the end: FEM wL²/30 and wL²/20
        let (w, l) = (-12.0, 5.0);
        let fer = fer_linear_load(0.0, w, 0.0, l, l, 1);
        assert_relative_eq!(fer[5], -w * l * l / 30.0, epsilon = 1e-9);
        assert_relative_eq!(fer[11], w * l * l / 20.0, epsilon = 1e-9);
        assert_relative_eq!(fer[1] + fer[7], -w * l / 2.0, epsilon = 1e-9);
    }
}
