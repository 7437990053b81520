//! Small numeric helpers: symmetric 3x3 eigendecomposition, nullspace
//! extraction, and a couple of scalar special functions.
//!
//! Symmetric 3x3 matrices are passed as row-major `[f64; 9]` (for a
//! symmetric matrix the distinction is moot, but the convention matches the
//! Hessian answer layout). Conversions to `glam::DMat3` exist for the few
//! places that compose with world transforms.

use glam::{DMat3, DVec3};

/// Build a `DMat3` from a row-major array. `glam` stores column-major.
pub fn dmat3_from_rows(r: &[f64; 9]) -> DMat3 {
    DMat3::from_cols_array(&[
        r[0], r[3], r[6], //
        r[1], r[4], r[7], //
        r[2], r[5], r[8],
    ])
}

/// Row-major array from a `DMat3`.
pub fn dmat3_to_rows(m: &DMat3) -> [f64; 9] {
    let c = m.to_cols_array();
    [c[0], c[3], c[6], c[1], c[4], c[7], c[2], c[5], c[8]]
}

pub fn m3_trace(m: &[f64; 9]) -> f64 {
    m[0] + m[4] + m[8]
}

pub fn m3_frob(m: &[f64; 9]) -> f64 {
    m.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Error function, via the Abramowitz & Stegun 7.1.26 rational
/// approximation (|error| < 1.5e-7, plenty for kernel-integral checks).
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Eigenvalue mode: +1 for two small/one large (linear), -1 for two
/// large/one small (planar), 0 for all distinct evenly. Zero when the
/// eigenvalues are all equal.
pub fn mode3(l0: f64, l1: f64, l2: f64) -> f64 {
    let num = (l0 + l1 - 2.0 * l2) * (2.0 * l0 - l1 - l2) * (l0 - 2.0 * l1 + l2);
    let den = l0 * l0 + l1 * l1 + l2 * l2 - l0 * l1 - l1 * l2 - l0 * l2;
    let den = 2.0 * den.max(0.0).powf(1.5);
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Best effort 1-D nullspace of a (near-)rank-2 symmetric matrix: the
/// sign-aligned average of the pairwise row cross products, normalized.
/// Returns the zero vector when the matrix is not close to rank 2.
pub fn nullspace1(m: &[f64; 9]) -> [f64; 3] {
    let r0 = DVec3::new(m[0], m[1], m[2]);
    let r1 = DVec3::new(m[3], m[4], m[5]);
    let r2 = DVec3::new(m[6], m[7], m[8]);
    let c01 = r0.cross(r1);
    let c02 = r0.cross(r2);
    let c12 = r1.cross(r2);
    // Align signs with the longest cross product before summing, so the
    // contributions reinforce instead of cancel.
    let mut best = c01;
    if c02.length_squared() > best.length_squared() {
        best = c02;
    }
    if c12.length_squared() > best.length_squared() {
        best = c12;
    }
    let mut sum = DVec3::ZERO;
    for c in [c01, c02, c12] {
        sum += if c.dot(best) < 0.0 { -c } else { c };
    }
    let len = sum.length();
    if len > 0.0 {
        let v = sum / len;
        [v.x, v.y, v.z]
    } else {
        [0.0, 0.0, 0.0]
    }
}

fn sub_diag(m: &[f64; 9], lambda: f64) -> [f64; 9] {
    let mut out = *m;
    out[0] -= lambda;
    out[4] -= lambda;
    out[8] -= lambda;
    out
}

/// Any unit vector perpendicular to `v` (which must be nonzero).
fn perpendicular(v: DVec3) -> DVec3 {
    let axis = if v.x.abs() < v.y.abs().min(v.z.abs()) {
        DVec3::X
    } else if v.y.abs() < v.z.abs() {
        DVec3::Y
    } else {
        DVec3::Z
    };
    v.cross(axis).normalize()
}

/// Eigenvalues (descending) and matching unit eigenvectors of a symmetric
/// 3x3 matrix, by the trigonometric closed form on the deviator.
pub fn eigen_symm3(m: &[f64; 9]) -> ([f64; 3], [[f64; 3]; 3]) {
    let mean = m3_trace(m) / 3.0;
    let a = sub_diag(m, mean);
    // p = sum of squares of the deviator / 6; q = det(deviator) / 2.
    let p = a.iter().map(|v| v * v).sum::<f64>() / 6.0;
    let det = a[0] * (a[4] * a[8] - a[5] * a[7]) - a[1] * (a[3] * a[8] - a[5] * a[6])
        + a[2] * (a[3] * a[7] - a[4] * a[6]);
    let q = det / 2.0;

    let scale = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if p.sqrt() <= 1e-14 * scale.max(1.0) {
        // Isotropic: every direction is an eigenvector.
        return (
            [mean, mean, mean],
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        );
    }

    let sp = p.sqrt();
    let phi = (q / (sp * sp * sp)).clamp(-1.0, 1.0).acos() / 3.0;
    let two_pi_3 = 2.0 * std::f64::consts::PI / 3.0;
    let mut evals = [
        mean + 2.0 * sp * phi.cos(),
        mean + 2.0 * sp * (phi + two_pi_3).cos(),
        mean + 2.0 * sp * (phi + 2.0 * two_pi_3).cos(),
    ];
    evals.sort_by(|x, y| y.total_cmp(x));

    let tol = 1e-10 * (evals[0].abs().max(evals[2].abs()).max(1.0));
    let evecs;
    if evals[0] - evals[1] <= tol && evals[1] - evals[2] <= tol {
        evecs = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    } else if evals[0] - evals[1] <= tol {
        // Double large eigenvalue: solve the distinct one, span the rest.
        let v2arr = nullspace1(&sub_diag(m, evals[2]));
        let v2 = DVec3::from_array(v2arr);
        let v0 = perpendicular(v2);
        let v1 = v2.cross(v0);
        evecs = [v0.to_array(), v1.to_array(), v2arr];
    } else if evals[1] - evals[2] <= tol {
        let v0arr = nullspace1(&sub_diag(m, evals[0]));
        let v0 = DVec3::from_array(v0arr);
        let v1 = perpendicular(v0);
        let v2 = v0.cross(v1);
        evecs = [v0arr, v1.to_array(), v2.to_array()];
    } else {
        let v0 = nullspace1(&sub_diag(m, evals[0]));
        let v1 = nullspace1(&sub_diag(m, evals[1]));
        let v2 = nullspace1(&sub_diag(m, evals[2]));
        evecs = [v0, v1, v2];
    }
    (evals, evecs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_eigenpair(m: &[f64; 9], lambda: f64, v: &[f64; 3]) {
        let mv = [
            m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
            m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
            m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
        ];
        for i in 0..3 {
            assert!(
                (mv[i] - lambda * v[i]).abs() < 1e-8,
                "M v != lambda v: component {i}: {} vs {}",
                mv[i],
                lambda * v[i]
            );
        }
    }

    #[test]
    fn eigen_diagonal() {
        let m = [3.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 7.0];
        let (vals, vecs) = eigen_symm3(&m);
        assert!((vals[0] - 7.0).abs() < 1e-12);
        assert!((vals[1] - 3.0).abs() < 1e-12);
        assert!((vals[2] + 1.0).abs() < 1e-12);
        for i in 0..3 {
            check_eigenpair(&m, vals[i], &vecs[i]);
        }
    }

    #[test]
    fn eigen_general_symmetric() {
        let m = [2.0, 1.0, 0.5, 1.0, 3.0, -1.0, 0.5, -1.0, 1.5];
        let (vals, vecs) = eigen_symm3(&m);
        assert!(vals[0] >= vals[1] && vals[1] >= vals[2], "descending order");
        assert!(
            (vals[0] + vals[1] + vals[2] - m3_trace(&m)).abs() < 1e-10,
            "eigenvalues must sum to the trace"
        );
        for i in 0..3 {
            check_eigenpair(&m, vals[i], &vecs[i]);
        }
    }

    #[test]
    fn eigen_degenerate_pair() {
        // Two equal eigenvalues (2, 2, 5) around a rotated axis.
        let m = [3.0, 0.0, 1.5, 0.0, 2.0, 0.0, 1.5, 0.0, 4.0];
        let (vals, vecs) = eigen_symm3(&m);
        for i in 0..3 {
            check_eigenpair(&m, vals[i], &vecs[i]);
            let n: f64 = vecs[i].iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((n - 1.0).abs() < 1e-9, "eigenvector {i} must be unit");
        }
    }

    #[test]
    fn eigen_isotropic() {
        let m = [4.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 4.0];
        let (vals, _) = eigen_symm3(&m);
        assert_eq!(vals, [4.0, 4.0, 4.0]);
    }

    #[test]
    fn nullspace_of_rank2() {
        // Projection onto the xy-plane has nullspace z.
        let m = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let v = nullspace1(&m);
        assert!(v[0].abs() < 1e-12 && v[1].abs() < 1e-12);
        assert!((v[2].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn erf_reference_values() {
        // The rational approximation carries ~1.5e-7 of error even at 0.
        assert!(erf(0.0).abs() < 1.5e-7);
        assert!((erf(1.0) - 0.8427007929).abs() < 1e-6);
        assert!((erf(-1.0) + 0.8427007929).abs() < 1e-6);
        assert!((erf(3.0) - 0.9999779095).abs() < 1e-6);
    }

    #[test]
    fn mode_extremes() {
        assert!((mode3(1.0, 0.0, 0.0) - 1.0).abs() < 1e-12, "linear case");
        assert!((mode3(1.0, 1.0, 0.0) + 1.0).abs() < 1e-12, "planar case");
        assert_eq!(mode3(2.0, 2.0, 2.0), 0.0, "isotropic case");
    }
}
