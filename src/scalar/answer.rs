//! From filtered value/gradient/Hessian to every queried scalar item.
//!
//! Computation order follows the dependency chains: normal before its
//! perpendicular projector, geometry tensor before the curvatures derived
//! from it. Query resolution guarantees that whenever an item is on, the
//! items its formula reads are on too.

use glam::DVec3;

use crate::binding::VolumeBinding;
use crate::kind::{answer_offset, ProbeArgs};
use crate::math;
use crate::scalar::ScalarItem::{self, *};

// Frangi-style tubularity constants.
const TUBE_ALPHA: f64 = 0.5;
const TUBE_BETA: f64 = 0.5;
const TUBE_GAMMA: f64 = 5.0;
const TUBE_EPS: f64 = 1e-6;

fn load<const N: usize>(binding: &VolumeBinding, it: ScalarItem) -> [f64; N] {
    let o = answer_offset(&super::TABLE, it as usize);
    let mut out = [0.0; N];
    out.copy_from_slice(&binding.answer[o..o + N]);
    out
}

fn store(binding: &mut VolumeBinding, it: ScalarItem, vals: &[f64]) {
    let o = answer_offset(&super::TABLE, it as usize);
    binding.answer[o..o + vals.len()].copy_from_slice(vals);
}

pub(crate) fn answer(args: &ProbeArgs, binding: &mut VolumeBinding) {
    let q = binding.query();
    let on = |it: ScalarItem| q.test(it as usize);

    // The filter stage already wrote Value, GradVec, and Hessian.
    let gvec: [f64; 3] = load(binding, GradVec);
    let hess: [f64; 9] = load(binding, Hessian);

    let mut gmag = 0.0;
    if on(GradMag) {
        gmag = DVec3::from_array(gvec).length();
        store(binding, GradMag, &[gmag]);
    }

    let mut norm = [0.0f64; 3];
    if on(Normal) {
        if gmag > 0.0 {
            norm = (DVec3::from_array(gvec) / gmag).to_array();
        }
        store(binding, Normal, &norm);
    }

    // Projectors onto and across the normal.
    let mut nperp = [0.0f64; 9];
    let mut nproj = [0.0f64; 9];
    if on(NPerp) {
        for r in 0..3 {
            for c in 0..3 {
                nproj[c + 3 * r] = norm[r] * norm[c];
                nperp[c + 3 * r] = if r == c { 1.0 } else { 0.0 } - nproj[c + 3 * r];
            }
        }
        store(binding, NPerp, &nperp);
    }

    if on(Laplacian) {
        store(binding, Laplacian, &[math::m3_trace(&hess)]);
    }
    if on(HessFrob) {
        store(binding, HessFrob, &[math::m3_frob(&hess)]);
    }

    let mut heval = [0.0f64; 3];
    if on(HessEval) {
        let (vals, vecs) = math::eigen_symm3(&hess);
        heval = vals;
        store(binding, HessEval, &heval);
        if on(HessEvec) {
            let flat = [
                vecs[0][0], vecs[0][1], vecs[0][2], //
                vecs[1][0], vecs[1][1], vecs[1][2], //
                vecs[2][0], vecs[2][1], vecs[2][2],
            ];
            store(binding, HessEvec, &flat);
        }
    }

    if on(Ridgeness) {
        store(binding, Ridgeness, &[ridgeness(&heval)]);
    }
    if on(Valleyness) {
        store(binding, Valleyness, &[valleyness(&heval)]);
    }
    if on(Mode) {
        store(binding, Mode, &[math::mode3(heval[0], heval[1], heval[2])]);
    }

    if on(SecondDD) {
        let n = DVec3::from_array(norm);
        let hn = math::dmat3_from_rows(&hess) * n;
        store(binding, SecondDD, &[n.dot(hn)]);
    }

    // Isosurface geometry tensor and everything downstream of it.
    let mut shess = [0.0f64; 9];
    let mut gten = [0.0f64; 9];
    if on(GeomTens) {
        if gmag > args.parm.grad_mag_curv_min && gmag > 0.0 {
            let scl = -(args.parm.curv_normal_side as f64) / gmag;
            for (o, &h) in shess.iter_mut().zip(hess.iter()) {
                *o = scl * h;
            }
            let np = math::dmat3_from_rows(&nperp);
            let gt = np * math::dmat3_from_rows(&shess) * np;
            gten = math::dmat3_to_rows(&gt);
        }
        store(binding, GeomTens, &gten);
    }

    let mut totalcurv = 0.0;
    if on(TotalCurv) {
        totalcurv = math::m3_frob(&gten);
        store(binding, TotalCurv, &[totalcurv]);
    }
    if on(ShapeTrace) {
        let st = if totalcurv > 0.0 {
            math::m3_trace(&gten) / totalcurv
        } else {
            0.0
        };
        store(binding, ShapeTrace, &[st]);
    }

    let mut k1 = 0.0;
    let mut k2 = 0.0;
    if on(K1) || on(K2) {
        let tr = math::m3_trace(&gten);
        let disc = (2.0 * totalcurv * totalcurv - tr * tr).max(0.0).sqrt();
        k1 = 0.5 * (tr + disc);
        k2 = 0.5 * (tr - disc);
        if on(K1) {
            store(binding, K1, &[k1]);
        }
        if on(K2) {
            store(binding, K2, &[k2]);
        }
    }
    if on(ShapeIndex) {
        let si = -(2.0 / std::f64::consts::PI) * (k1 + k2).atan2(k1 - k2);
        store(binding, ShapeIndex, &[si]);
    }
    if on(MeanCurv) {
        store(binding, MeanCurv, &[0.5 * (k1 + k2)]);
    }
    if on(GaussCurv) {
        store(binding, GaussCurv, &[k1 * k2]);
    }
    if on(CurvDir1) {
        store(binding, CurvDir1, &curv_dir(&gten, k1));
    }
    if on(CurvDir2) {
        store(binding, CurvDir2, &curv_dir(&gten, k2));
    }
    if on(FlowlineCurv) {
        let np = math::dmat3_from_rows(&nperp);
        let m = np * math::dmat3_from_rows(&shess) * math::dmat3_from_rows(&nproj);
        store(binding, FlowlineCurv, &[math::m3_frob(&math::dmat3_to_rows(&m))]);
    }

    if on(Median) {
        let med = median(args, binding);
        store(binding, Median, &[med]);
    }
}

/// Eigenvector of the geometry tensor for curvature `k`.
fn curv_dir(gten: &[f64; 9], k: f64) -> [f64; 3] {
    let mut m = *gten;
    m[0] -= k;
    m[4] -= k;
    m[8] -= k;
    math::nullspace1(&m)
}

/// Tubular ridge measure: strong when the two minor eigenvalues are both
/// clearly negative and similar, the major one near zero.
fn ridgeness(heval: &[f64; 3]) -> f64 {
    if heval[1] > 0.0 || heval[2] > 0.0 {
        return 0.0;
    }
    if heval[1].abs() < TUBE_EPS || heval[2].abs() < TUBE_EPS {
        return 0.0;
    }
    let a = heval[1].abs() / heval[2].abs();
    let b = heval[0].abs() / (heval[1] * heval[2]).abs().sqrt();
    tube_measure(a, b, heval)
}

/// Mirror of `ridgeness` for dark tubes.
fn valleyness(heval: &[f64; 3]) -> f64 {
    if heval[0] < 0.0 || heval[1] < 0.0 {
        return 0.0;
    }
    if heval[0].abs() < TUBE_EPS || heval[1].abs() < TUBE_EPS {
        return 0.0;
    }
    let a = heval[1].abs() / heval[0].abs();
    let b = heval[2].abs() / (heval[0] * heval[1]).abs().sqrt();
    tube_measure(a, b, heval)
}

fn tube_measure(a: f64, b: f64, heval: &[f64; 3]) -> f64 {
    let s2: f64 = heval.iter().map(|v| v * v).sum();
    (1.0 - (-a * a / (2.0 * TUBE_ALPHA * TUBE_ALPHA)).exp())
        * (-b * b / (2.0 * TUBE_BETA * TUBE_BETA)).exp()
        * (1.0 - (-s2 / (2.0 * TUBE_GAMMA * TUBE_GAMMA)).exp())
}

/// Weighted median of the raw value neighborhood, weighted by the value
/// kernel's separable weights.
fn median(args: &ProbeArgs, binding: &VolumeBinding) -> f64 {
    let fd = args.fd();
    let wx = args.weights(crate::kernel::KernelRole::Value00, 0);
    let wy = args.weights(crate::kernel::KernelRole::Value00, 1);
    let wz = args.weights(crate::kernel::KernelRole::Value00, 2);
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(fd * fd * fd);
    let mut total = 0.0;
    let mut ci = 0;
    for z in 0..fd {
        for y in 0..fd {
            for x in 0..fd {
                let w = wx[x] * wy[y] * wz[z];
                pairs.push((binding.iv3[ci], w));
                total += w;
                ci += 1;
            }
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut acc = 0.0;
    for (v, w) in &pairs {
        acc += w;
        if acc >= total / 2.0 {
            return *v;
        }
    }
    pairs.last().map(|p| p.0).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ridge_and_valley_select_opposite_signs() {
        // Bright tube along x: strongly negative minor eigenvalues.
        let bright = [0.01, -7.0, -8.0];
        assert!(ridgeness(&bright) > 0.5, "bright tube must score as ridge");
        assert_eq!(valleyness(&bright), 0.0);
        let dark = [8.0, 7.0, -0.01];
        assert!(valleyness(&dark) > 0.5, "dark tube must score as valley");
        assert_eq!(ridgeness(&dark), 0.0);
    }

    #[test]
    fn plate_scores_below_tube() {
        let tube = [0.0, -4.0, -4.0];
        let plate = [0.0, -0.1, -4.0];
        assert!(
            ridgeness(&tube) > ridgeness(&plate),
            "tube {} should outrank plate {}",
            ridgeness(&tube),
            ridgeness(&plate)
        );
    }
}
