//! Separable convolution of the scalar value cache down to the filtered
//! value, gradient, and Hessian.
//!
//! Each output is three 1-D convolutions, one per axis, choosing per axis
//! between the value, first-derivative, and second-derivative weights.
//! Collapses are shared: one x-collapse serves every output with the same
//! x weights, and likewise for y.

use log::warn;

use crate::binding::VolumeBinding;
use crate::kernel::KernelRole;
use crate::kind::ProbeArgs;
use crate::math;
use crate::scalar::ScalarItem;

pub(crate) fn filter(args: &ProbeArgs, binding: &mut VolumeBinding) {
    let [do_v, do_d1, do_d2] = binding.need_d();
    if !(do_v || do_d1 || do_d2) {
        return;
    }
    if !args.parm.k3pack {
        // Separate reconstruction kernels per derivative order are not
        // supported; the three-kernel scheme covers every shipped kernel.
        warn!("only 3-pack filtering is implemented; skipping filter stage");
        return;
    }
    let fd = args.fd();

    let w00 = [
        args.weights(KernelRole::Value00, 0),
        args.weights(KernelRole::Value00, 1),
        args.weights(KernelRole::Value00, 2),
    ];
    let w11 = [
        args.weights(KernelRole::D1Measure11, 0),
        args.weights(KernelRole::D1Measure11, 1),
        args.weights(KernelRole::D1Measure11, 2),
    ];
    let w22 = [
        args.weights(KernelRole::D2Measure22, 0),
        args.weights(KernelRole::D2Measure22, 1),
        args.weights(KernelRole::D2Measure22, 2),
    ];

    let voff = binding.answer_offset(ScalarItem::Value as usize);
    let goff = binding.answer_offset(ScalarItem::GradVec as usize);
    let hoff = binding.answer_offset(ScalarItem::Hessian as usize);

    let mut value = 0.0;
    let mut gvec = [0.0f64; 3];
    let mut hess = [0.0f64; 9];

    // x collapse with value weights serves the value, the z and y gradient
    // components, and the yz block of the Hessian.
    collapse_x(&binding.iv3, &mut binding.iv2, w00[0], fd);
    collapse_y(&binding.iv2, &mut binding.iv1, w00[1], fd);
    if do_v {
        value = dot(&binding.iv1, w00[2]);
    }
    if do_d1 {
        gvec[2] = dot(&binding.iv1, w11[2]);
    }
    if do_d2 {
        hess[8] = dot(&binding.iv1, w22[2]); // d2/dz2
    }
    if do_d1 || do_d2 {
        collapse_y(&binding.iv2, &mut binding.iv1, w11[1], fd);
        if do_d1 {
            gvec[1] = dot(&binding.iv1, w00[2]);
        }
        if do_d2 {
            hess[5] = dot(&binding.iv1, w11[2]); // d2/dydz
        }
    }
    if do_d2 {
        collapse_y(&binding.iv2, &mut binding.iv1, w22[1], fd);
        hess[4] = dot(&binding.iv1, w00[2]); // d2/dy2
    }

    if do_d1 || do_d2 {
        collapse_x(&binding.iv3, &mut binding.iv2, w11[0], fd);
        collapse_y(&binding.iv2, &mut binding.iv1, w00[1], fd);
        if do_d1 {
            gvec[0] = dot(&binding.iv1, w00[2]);
        }
        if do_d2 {
            hess[2] = dot(&binding.iv1, w11[2]); // d2/dxdz
        }
        if do_d2 {
            collapse_y(&binding.iv2, &mut binding.iv1, w11[1], fd);
            hess[1] = dot(&binding.iv1, w00[2]); // d2/dxdy
        }
    }

    if do_d2 {
        collapse_x(&binding.iv3, &mut binding.iv2, w22[0], fd);
        collapse_y(&binding.iv2, &mut binding.iv1, w00[1], fd);
        hess[0] = dot(&binding.iv1, w00[2]); // d2/dx2
        hess[3] = hess[1];
        hess[6] = hess[2];
        hess[7] = hess[5];
    }

    // Index-space measurements to world space: gradients transform with
    // the inverse transpose, Hessians with it on both sides.
    let m = args.shape.grad_xform();
    if do_d1 {
        let g = m * glam::DVec3::from_array(gvec);
        gvec = g.to_array();
    }
    if do_d2 {
        let h = m * math::dmat3_from_rows(&hess) * m.transpose();
        hess = math::dmat3_to_rows(&h);
    }

    if do_v {
        binding.answer[voff] = value;
    }
    if do_d1 {
        binding.answer[goff..goff + 3].copy_from_slice(&gvec);
    }
    if do_d2 {
        binding.answer[hoff..hoff + 9].copy_from_slice(&hess);
    }
}

/// Collapse the x axis: `fd^3` cache to `fd^2`, dotting each x run with
/// the weights.
fn collapse_x(iv3: &[f64], iv2: &mut [f64], w: &[f64], fd: usize) {
    for (row, out) in iv2.iter_mut().enumerate().take(fd * fd) {
        let run = &iv3[fd * row..fd * (row + 1)];
        *out = dot(run, w);
    }
}

/// Collapse the y axis: `fd^2` to `fd`.
fn collapse_y(iv2: &[f64], iv1: &mut [f64], w: &[f64], fd: usize) {
    for (z, out) in iv1.iter_mut().enumerate().take(fd) {
        let run = &iv2[fd * z..fd * (z + 1)];
        *out = dot(run, w);
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
