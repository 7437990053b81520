//! Scale stacks: probing a family of pre-blurred copies of one volume as a
//! continuous function of blur scale.
//!
//! The stack is attached as N sample volumes (ascending blur) plus one base
//! volume, which receives the blended value cache and produces all answers.
//! Blending is either a weighted sum with the stack kernel's weights, or a
//! Hermite spline that uses the scale-space relation ds/dsigma = sigma *
//! laplacian to estimate endpoint derivatives.

use log::debug;

use crate::binding::VolumeBinding;
use crate::context::{BindingId, ProbeContext};
use crate::error::ProbeError;
use crate::shape::VolumeShape;

impl ProbeContext {
    /// Attach a scale stack: `samples` at strictly increasing blur scales
    /// `positions`, plus the `base` volume that answers are probed from.
    /// The context must be empty. Returns the base volume's id.
    pub fn attach_stack(
        &mut self,
        base: VolumeBinding,
        samples: Vec<VolumeBinding>,
        positions: &[f64],
    ) -> Result<BindingId, ProbeError> {
        if !self.bindings.is_empty() {
            return Err(ProbeError::StackNotEmpty(self.bindings.len()));
        }
        if samples.len() < 2 || samples.len() != positions.len() {
            return Err(ProbeError::StackTooFew(samples.len()));
        }
        for (index, &value) in positions.iter().enumerate() {
            if !value.is_finite() {
                return Err(ProbeError::StackPosNotFinite { index, value });
            }
        }
        for index in 0..positions.len() - 1 {
            if positions[index] >= positions[index + 1] {
                return Err(ProbeError::StackPosNotIncreasing {
                    index,
                    index_next: index + 1,
                    lo: positions[index],
                    hi: positions[index + 1],
                });
            }
        }
        // Pre-validate shapes so a mismatch cannot leave a partial stack.
        let settings = self.shape_settings();
        let first = VolumeShape::from_volume(samples[0].volume(), &settings)?;
        for binding in samples.iter().skip(1).chain(std::iter::once(&base)) {
            let candidate = VolumeShape::from_volume(binding.volume(), &settings)?;
            if candidate != first {
                return Err(ProbeError::ShapeMismatch {
                    expected: first.size(),
                    got: candidate.size(),
                });
            }
        }
        debug!(
            "attaching stack of {} samples, scales {:?}..{:?}",
            samples.len(),
            positions.first(),
            positions.last()
        );
        for sample in samples {
            self.attach(sample)?;
        }
        let base_id = self.attach(base)?;
        self.stack_pos = positions.to_vec();
        self.stack_fslw = vec![0.0; self.stack_pos.len()];
        Ok(base_id)
    }
}

/// Blend the sample bindings' value caches into the base binding's.
pub(crate) fn blend_iv3(
    samples: &[VolumeBinding],
    base: &mut VolumeBinding,
    fslw: &[f64],
    pos: &[f64],
    fd: usize,
    hermite: bool,
) {
    let fddd = fd * fd * fd;
    let vl = base.kind().val_len();
    for w in base.iv3.iter_mut() {
        *w = 0.0;
    }
    if !hermite {
        for (ii, &w) in fslw.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            for (o, &v) in base.iv3.iter_mut().zip(samples[ii].iv3.iter()) {
                *o += w * v;
            }
        }
        return;
    }

    // Hermite path. The first nonzero weight locates the bracketing pair;
    // with tent-shaped weights its value is 1 minus the in-interval
    // fraction.
    let num = samples.len();
    let first = fslw.iter().position(|&w| w != 0.0).unwrap_or(0);
    let (blur, xx) = if first == num - 1 {
        (first - 1, 1.0)
    } else {
        (first, 1.0 - fslw[first])
    };
    let s0 = pos[blur];
    let s1 = pos[blur + 1];
    let ds = s1 - s0;
    // Only cache voxels with a full 6-neighborhood get a Laplacian; the
    // outermost ring stays zero, which is harmless because the widened
    // filter radius gives it zero weight.
    for t in 0..vl {
        let off_t = fddd * t;
        let a0 = &samples[blur].iv3[off_t..off_t + fddd];
        let a1 = &samples[blur + 1].iv3[off_t..off_t + fddd];
        for zi in 1..fd - 1 {
            for yi in 1..fd - 1 {
                for xi in 1..fd - 1 {
                    let ci = xi + fd * (yi + fd * zi);
                    let lapl = |a: &[f64]| {
                        a[ci - 1] + a[ci + 1] + a[ci - fd] + a[ci + fd] + a[ci - fd * fd]
                            + a[ci + fd * fd]
                            - 6.0 * a[ci]
                    };
                    let v0 = a0[ci];
                    let v1 = a1[ci];
                    let drv0 = s0 * lapl(a0) * ds;
                    let drv1 = s1 * lapl(a1) * ds;
                    let aa = drv0 + drv1 + 2.0 * v0 - 2.0 * v1;
                    let bb = -2.0 * drv0 - drv1 - 3.0 * v0 + 3.0 * v1;
                    base.iv3[off_t + ci] = v0 + xx * (drv0 + xx * (bb + xx * aa));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scale reparameterization
// ---------------------------------------------------------------------------
//
// tau is a reparameterization of blur scale under which feature drift is
// roughly uniform: tau grows like sqrt(t) for small scales and like log(t)
// for large ones, switching branches where their slopes match.

const TEE_BRANCH: f64 = 2.526917043979558;
const SQRT_COEF: f64 = 0.629078014852877;
const LOG_SHIFT: f64 = 0.5365;

/// tau as a function of t = sigma^2.
pub fn tau_of_tee(tee: f64) -> f64 {
    if tee < TEE_BRANCH {
        SQRT_COEF * tee.sqrt()
    } else {
        LOG_SHIFT + tee.ln() / 2.0
    }
}

/// t = sigma^2 as a function of tau.
pub fn tee_of_tau(tau: f64) -> f64 {
    // TEE_BRANCH is where tau crosses 1.
    if tau < 1.0 {
        (tau / SQRT_COEF) * (tau / SQRT_COEF)
    } else {
        (2.0 * (tau - LOG_SHIFT)).exp()
    }
}

pub fn sig_of_tau(tau: f64) -> f64 {
    tee_of_tau(tau).sqrt()
}

pub fn tau_of_sig(sig: f64) -> f64 {
    tau_of_tee(sig * sig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::VolumeBinding;
    use crate::scalar::{ScalarItem, SCALAR};
    use crate::volume::Volume;

    #[test]
    fn tau_round_trips() {
        for sig in [0.0, 0.1, 0.5, 1.0, 1.5896, 3.0, 10.0] {
            let tau = tau_of_sig(sig);
            let back = sig_of_tau(tau);
            assert!(
                (back - sig).abs() < 1e-6,
                "sigma {sig} -> tau {tau} -> {back}"
            );
        }
    }

    #[test]
    fn tau_is_monotonic_and_continuous_at_branch() {
        let mut prev = f64::NEG_INFINITY;
        for i in 0..200 {
            let tee = 0.05 * i as f64;
            let tau = tau_of_tee(tee);
            assert!(tau >= prev, "tau must not decrease (tee {tee})");
            prev = tau;
        }
        let eps = 1e-9;
        let below = tau_of_tee(TEE_BRANCH - eps);
        let above = tau_of_tee(TEE_BRANCH + eps);
        assert!(
            (below - above).abs() < 1e-4,
            "branch mismatch: {below} vs {above}"
        );
    }

    fn stack_binding(value: f64) -> VolumeBinding {
        let vol = Volume::new(vec![value; 64], 1, [4, 4, 4]).unwrap();
        let mut b = VolumeBinding::new(&SCALAR, vol).unwrap();
        b.item_on(ScalarItem::Value as usize).unwrap();
        b
    }

    #[test]
    fn attach_stack_validates_positions() {
        let mut ctx = crate::context::ProbeContext::new();
        let err = ctx
            .attach_stack(
                stack_binding(0.0),
                vec![stack_binding(0.0), stack_binding(1.0)],
                &[1.0, 1.0],
            )
            .unwrap_err();
        assert!(matches!(err, ProbeError::StackPosNotIncreasing { .. }));
        let err = ctx
            .attach_stack(
                stack_binding(0.0),
                vec![stack_binding(0.0), stack_binding(1.0)],
                &[1.0, f64::NAN],
            )
            .unwrap_err();
        assert!(matches!(err, ProbeError::StackPosNotFinite { index: 1, .. }));
        let err = ctx
            .attach_stack(stack_binding(0.0), vec![stack_binding(0.0)], &[1.0])
            .unwrap_err();
        assert!(matches!(err, ProbeError::StackTooFew(1)));
        assert_eq!(ctx.binding_count(), 0, "failed attach must leave nothing behind");
    }

    #[test]
    fn attach_stack_requires_empty_context() {
        let mut ctx = crate::context::ProbeContext::new();
        ctx.attach(stack_binding(0.0)).unwrap();
        let err = ctx
            .attach_stack(
                stack_binding(0.0),
                vec![stack_binding(0.0), stack_binding(1.0)],
                &[1.0, 2.0],
            )
            .unwrap_err();
        assert!(matches!(err, ProbeError::StackNotEmpty(1)));
    }
}
