//! Per-probe machinery: locating a point, refreshing filter sample
//! locations and weights, refilling value caches, and dispatching the
//! kind's filter and answer stages.
//!
//! Work is elided between consecutive probes: weights are recomputed only
//! when the in-voxel fraction changes, and each binding's value cache is
//! refilled only when it does not already hold the current voxel's
//! neighborhood. Probing nearby locations in sequence is therefore much
//! cheaper than jumping around.

use glam::DVec3;
use log::trace;

use crate::binding::VolumeBinding;
use crate::context::ProbeContext;
use crate::error::ProbeError;
use crate::kernel::KernelRole;
use crate::kind::ProbeArgs;
use crate::shape::VolumeShape;
use crate::stack;

impl ProbeContext {
    /// Probe at an index-space location. With stack use enabled this probes
    /// at stack coordinate 0.
    pub fn probe(&mut self, x: f64, y: f64, z: f64) -> Result<(), ProbeError> {
        let r = self.probe_inner(x, y, z, 0.0);
        self.record(r)
    }

    /// Probe at an index-space location and stack coordinate (in units of
    /// stack samples, `[0, samples-1]`).
    pub fn probe_stack(&mut self, x: f64, y: f64, z: f64, s: f64) -> Result<(), ProbeError> {
        let r = if self.parm.stack_use {
            self.probe_inner(x, y, z, s)
        } else {
            Err(ProbeError::StackNotEnabled)
        };
        self.record(r)
    }

    /// Probe at a location in either index or world space, optionally
    /// clamping it into bounds first.
    pub fn probe_space(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        index_space: bool,
        clamp: bool,
    ) -> Result<(), ProbeError> {
        let r = self
            .spatial_coords(x, y, z, index_space, clamp)
            .and_then(|p| self.probe_inner(p[0], p[1], p[2], 0.0));
        self.record(r)
    }

    /// Stack probing in either index or world space. In world space the
    /// stack coordinate is a blur scale, mapped to stack index space by
    /// piecewise-linear search through the stack positions.
    pub fn probe_stack_space(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        s: f64,
        index_space: bool,
        clamp: bool,
    ) -> Result<(), ProbeError> {
        let r = if !self.parm.stack_use {
            Err(ProbeError::StackNotEnabled)
        } else {
            self.spatial_coords(x, y, z, index_space, clamp)
                .and_then(|p| {
                    let si = self.stack_index(s, index_space, clamp)?;
                    self.probe_inner(p[0], p[1], p[2], si)
                })
        };
        self.record(r)
    }

    fn record(&mut self, r: Result<(), ProbeError>) -> Result<(), ProbeError> {
        match &r {
            Ok(()) => self.last_error = None,
            Err(e) => self.last_error = Some(e.clone()),
        }
        r
    }

    fn spatial_coords(
        &self,
        x: f64,
        y: f64,
        z: f64,
        index_space: bool,
        clamp: bool,
    ) -> Result<[f64; 3], ProbeError> {
        let shape = self.shape.as_ref().ok_or(ProbeError::NoBindings)?;
        let mut p = if index_space {
            [x, y, z]
        } else {
            let idx = shape.world_to_index(DVec3::new(x, y, z));
            [idx.x, idx.y, idx.z]
        };
        if clamp {
            for (axis, v) in p.iter_mut().enumerate() {
                let (lo, hi) = shape.axis_bounds(axis);
                *v = v.clamp(lo, hi);
            }
        }
        Ok(p)
    }

    fn stack_index(&self, s: f64, index_space: bool, clamp: bool) -> Result<f64, ProbeError> {
        let num = self.stack_pos.len();
        if num < 2 {
            return Err(ProbeError::StackTooFew(num));
        }
        let max = (num - 1) as f64;
        if index_space {
            return Ok(if clamp { s.clamp(0.0, max) } else { s });
        }
        let first = self.stack_pos[0];
        let last = self.stack_pos[num - 1];
        let s = if clamp { s.clamp(first, last) } else { s };
        if !(s >= first && s <= last) {
            return Err(ProbeError::BoundsStack {
                s,
                min: first,
                max: last,
            });
        }
        // Piecewise linear: find the bracketing pair of stack positions.
        let mut ii = 0;
        while ii + 2 < num && self.stack_pos[ii + 1] <= s {
            ii += 1;
        }
        let lo = self.stack_pos[ii];
        let hi = self.stack_pos[ii + 1];
        Ok(ii as f64 + (s - lo) / (hi - lo))
    }

    fn probe_inner(&mut self, x: f64, y: f64, z: f64, s: f64) -> Result<(), ProbeError> {
        if self.radius == 0 {
            return Err(ProbeError::NotUpdated);
        }
        self.location_set(x, y, z, s)?;
        let idx3 = [self.point.idx[0], self.point.idx[1], self.point.idx[2]];
        let radius = self.radius;
        let stack_use = self.parm.stack_use;
        let Some(shape) = self.shape.as_ref() else {
            return Err(ProbeError::NoBindings);
        };

        // Refill any cache not already holding this voxel's neighborhood.
        // Stack samples with zero weight contribute nothing and are skipped.
        if stack_use {
            let n = self.bindings.len();
            for (ii, binding) in self.bindings[..n - 1].iter_mut().enumerate() {
                if self.stack_fslw[ii] != 0.0 && binding.iv3_idx != Some(idx3) {
                    trace!("refilling stack sample {} at voxel {:?}", ii, idx3);
                    iv3_fill(binding, shape, &self.off, radius, idx3);
                }
            }
        } else {
            for binding in &mut self.bindings {
                if binding.iv3_idx != Some(idx3) {
                    trace!("refilling cache at voxel {:?}", idx3);
                    iv3_fill(binding, shape, &self.off, radius, idx3);
                }
            }
        }

        let args = ProbeArgs {
            shape,
            parm: &self.parm,
            radius,
            fw: &self.fw,
        };
        if stack_use {
            let hermite = self
                .ksp[KernelRole::Stack.index()]
                .as_ref()
                .map(|k| k.kernel.hermite_flag())
                .unwrap_or(false);
            let n = self.bindings.len();
            let (samples, base) = self.bindings.split_at_mut(n - 1);
            let base = &mut base[0];
            stack::blend_iv3(
                samples,
                base,
                &self.stack_fslw,
                &self.stack_pos,
                2 * radius,
                hermite,
            );
            let kind = base.kind;
            kind.filter(&args, base);
            kind.answer(&args, base);
        } else {
            for binding in &mut self.bindings {
                if binding.query.is_empty() {
                    continue;
                }
                let kind = binding.kind;
                kind.filter(&args, binding);
                kind.answer(&args, binding);
            }
        }
        Ok(())
    }

    /// Split the location into integer voxel and fraction, after bounds
    /// checks, and refresh the filter weights as needed. Errors leave the
    /// context untouched.
    fn location_set(&mut self, x: f64, y: f64, z: f64, s: f64) -> Result<(), ProbeError> {
        let shape = self.shape.as_ref().ok_or(ProbeError::NoBindings)?;
        let size = shape.size();
        let centering = shape.centering();
        let pos = [x, y, z];
        let mut new_idx = [0usize; 4];
        let mut new_frac = [0.0f64; 4];
        for axis in 0..3 {
            let (lo, hi) = shape.axis_bounds(axis);
            let v = pos[axis];
            if !(v >= lo && v <= hi) {
                return Err(ProbeError::BoundsSpace {
                    x,
                    y,
                    z,
                    centering,
                    min: lo,
                    max_x: shape.axis_bounds(0).1,
                    max_y: shape.axis_bounds(1).1,
                    max_z: shape.axis_bounds(2).1,
                });
            }
            // Truncate, then pull the node-centered top boundary inward so
            // the voxel is always the lower sample of an existing pair.
            let mut vi = v as isize;
            let clamp_at = match centering {
                crate::shape::Centering::Node => size[axis] as isize - 1,
                crate::shape::Centering::Cell => size[axis] as isize,
            };
            if vi == clamp_at {
                vi -= 1;
            }
            new_idx[axis] = vi as usize;
            new_frac[axis] = v - vi as f64;
        }
        if self.parm.stack_use {
            let num = self.stack_pos.len();
            let smax = num as f64 - 1.0;
            if !(s >= 0.0 && s <= smax) {
                return Err(ProbeError::BoundsStack {
                    s,
                    min: 0.0,
                    max: smax,
                });
            }
            let mut si = s as usize;
            if si == num - 1 {
                si -= 1;
            }
            new_idx[3] = si;
            new_frac[3] = s - si as f64;
        }

        let frac_changed = new_frac != self.point.frac;
        if self.parm.stack_use || frac_changed {
            self.fsl_set(&[new_frac[0], new_frac[1], new_frac[2]]);
            self.fw_set();
            if self.parm.stack_use {
                self.stack_weights_set(s)?;
                if self.parm.stack_renormalize && (self.need_d[1] || self.need_d[2]) {
                    self.stack_renormalize_weights(new_idx[3], new_frac[3]);
                }
            }
        }
        self.point.idx = new_idx;
        self.point.frac = new_frac;
        Ok(())
    }

    /// Filter sample locations: distance from the probe location to each of
    /// the `fd` support samples, per axis.
    fn fsl_set(&mut self, frac: &[f64; 3]) {
        let r = self.radius as isize;
        let fd = 2 * self.radius;
        match self.radius {
            1 => {
                for axis in 0..3 {
                    self.fsl[fd * axis] = frac[axis];
                    self.fsl[1 + fd * axis] = frac[axis] - 1.0;
                }
            }
            2 => {
                for axis in 0..3 {
                    let f = frac[axis];
                    let o = fd * axis;
                    self.fsl[o] = f + 1.0;
                    self.fsl[o + 1] = f;
                    self.fsl[o + 2] = f - 1.0;
                    self.fsl[o + 3] = f - 2.0;
                }
            }
            _ => {
                for axis in 0..3 {
                    for i in (1 - r)..=r {
                        self.fsl[(i + r - 1) as usize + fd * axis] = frac[axis] - i as f64;
                    }
                }
            }
        }
    }

    /// Evaluate every needed kernel over the sample locations, one batched
    /// call per role, then apply renormalization if enabled.
    fn fw_set(&mut self) {
        let fd = 2 * self.radius;
        for role in KernelRole::ALL {
            if role == KernelRole::Stack || !self.need_k[role.index()] {
                continue;
            }
            let Some(spec) = self.ksp[role.index()].as_ref() else {
                continue;
            };
            let start = fd * 3 * role.index();
            spec.evaluate_many(&self.fsl, &mut self.fw[start..start + fd * 3]);
        }
        if self.parm.renormalize {
            for role in KernelRole::ALL {
                if role == KernelRole::Stack || !self.need_k[role.index()] {
                    continue;
                }
                let Some(spec) = self.ksp[role.index()].as_ref() else {
                    continue;
                };
                let integral = spec.integral();
                let start = fd * 3 * role.index();
                let block = &mut self.fw[start..start + fd * 3];
                if role.is_reconstruction() {
                    renormalize_value(block, fd, integral);
                } else {
                    renormalize_deriv(block, fd);
                }
            }
        }
    }

    /// Stack reconstruction weights, evaluated in stack index space and
    /// normalized to unit sum.
    fn stack_weights_set(&mut self, s: f64) -> Result<(), ProbeError> {
        let spec = self.ksp[KernelRole::Stack.index()]
            .as_ref()
            .ok_or(ProbeError::StackNeedsKernel)?;
        for (ii, w) in self.stack_fslw.iter_mut().enumerate() {
            *w = spec.evaluate(s - ii as f64);
        }
        let sum: f64 = self.stack_fslw.iter().sum();
        if sum == 0.0 {
            return Err(ProbeError::StackIntegralZero);
        }
        for w in &mut self.stack_fslw {
            *w /= sum;
        }
        Ok(())
    }

    /// Scale derivative weights by the world blur scale at the probe's
    /// stack position, so derivatives are per-unit-scale.
    fn stack_renormalize_weights(&mut self, si: usize, sfrac: f64) {
        let scl = self.stack_pos[si] + sfrac * (self.stack_pos[si + 1] - self.stack_pos[si]);
        let fd = 2 * self.radius;
        let start = fd * 3 * KernelRole::D1Measure11.index();
        for w in &mut self.fw[start..start + fd * 3] {
            *w *= scl;
        }
        let start = fd * 3 * KernelRole::D2Measure22.index();
        for w in &mut self.fw[start..start + fd * 3] {
            *w *= scl * scl;
        }
    }
}

/// Scale each axis's weights so their sum matches the kernel's continuous
/// integral.
fn renormalize_value(block: &mut [f64], fd: usize, integral: f64) {
    for axis in 0..3 {
        let ws = &mut block[fd * axis..fd * (axis + 1)];
        let sum: f64 = ws.iter().sum();
        if sum != 0.0 {
            let scl = integral / sum;
            for w in ws {
                *w *= scl;
            }
        }
    }
}

/// Balance the positive and negative lobes of a derivative kernel's weights
/// so they sum to zero, preserving their geometric mean.
fn renormalize_deriv(block: &mut [f64], fd: usize) {
    for axis in 0..3 {
        let ws = &mut block[fd * axis..fd * (axis + 1)];
        let mut pos = 0.0;
        let mut neg = 0.0;
        for w in ws.iter() {
            if *w > 0.0 {
                pos += *w;
            } else {
                neg += *w;
            }
        }
        if pos > 0.0 && neg < 0.0 {
            let fix = (pos / -neg).sqrt();
            for w in ws {
                if *w > 0.0 {
                    *w /= fix;
                } else {
                    *w *= fix;
                }
            }
        }
    }
}

/// Fill a binding's value cache with the `fd^3` neighborhood around the
/// current voxel. Interior windows walk the precomputed offset table;
/// windows poking outside the volume clamp each sample to the boundary.
pub(crate) fn iv3_fill(
    binding: &mut VolumeBinding,
    shape: &VolumeShape,
    off: &[usize],
    radius: usize,
    idx: [usize; 3],
) {
    let fd = 2 * radius;
    let fddd = fd * fd * fd;
    let [sx, sy, sz] = shape.size();
    let vl = binding.kind().val_len();
    let r = radius as isize;
    let lx = idx[0] as isize - (r - 1);
    let ly = idx[1] as isize - (r - 1);
    let lz = idx[2] as isize - (r - 1);
    let span = 2 * r - 1;
    let inside = lx >= 0
        && ly >= 0
        && lz >= 0
        && lx + span <= sx as isize - 1
        && ly + span <= sy as isize - 1
        && lz + span <= sz as isize - 1;
    if inside {
        let base = lx as usize + sx * (ly as usize + sy * lz as usize);
        for ci in 0..fddd {
            let sample = base + off[ci];
            for t in 0..vl {
                binding.iv3[ci + fddd * t] = binding.volume.data().lookup(t + vl * sample);
            }
        }
    } else {
        let clampi = |v: isize, n: usize| v.clamp(0, n as isize - 1) as usize;
        let mut ci = 0;
        for k in 0..fd {
            let vz = clampi(lz + k as isize, sz);
            for j in 0..fd {
                let vy = clampi(ly + j as isize, sy);
                for i in 0..fd {
                    let vx = clampi(lx + i as isize, sx);
                    for t in 0..vl {
                        binding.iv3[ci + fddd * t] = binding.volume.lookup(vx, vy, vz, t);
                    }
                    ci += 1;
                }
            }
        }
    }
    binding.iv3_idx = Some(idx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::VolumeBinding;
    use crate::kernel::KernelSpec;
    use crate::scalar::{ScalarItem, SCALAR};
    use crate::volume::Volume;

    fn value_ctx(size: [usize; 3], data: Vec<f64>) -> (ProbeContext, crate::context::BindingId) {
        let vol = Volume::new(data, 1, size).unwrap();
        let mut b = VolumeBinding::new(&SCALAR, vol).unwrap();
        b.item_on(ScalarItem::Value as usize).unwrap();
        let mut ctx = ProbeContext::new();
        let id = ctx.attach(b).unwrap();
        ctx.set_kernel(KernelRole::Value00, KernelSpec::tent()).unwrap();
        ctx.update().unwrap();
        (ctx, id)
    }

    fn ramp(size: [usize; 3]) -> Vec<f64> {
        let mut v = Vec::with_capacity(size[0] * size[1] * size[2]);
        for z in 0..size[2] {
            for y in 0..size[1] {
                for x in 0..size[0] {
                    v.push(x as f64 + 10.0 * y as f64 + 100.0 * z as f64);
                }
            }
        }
        v
    }

    #[test]
    fn tent_value_interpolates_ramp() {
        let (mut ctx, id) = value_ctx([5, 5, 5], ramp([5, 5, 5]));
        ctx.probe(1.5, 2.0, 3.25).unwrap();
        let v = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
        let want = 1.5 + 10.0 * 2.0 + 100.0 * 3.25;
        assert!((v - want).abs() < 1e-12, "tent on a ramp is exact: {v} vs {want}");
    }

    #[test]
    fn out_of_bounds_sets_last_error_and_preserves_answers() {
        let (mut ctx, id) = value_ctx([5, 5, 5], ramp([5, 5, 5]));
        ctx.probe(1.0, 1.0, 1.0).unwrap();
        assert!(ctx.last_error().is_none());
        let before = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
        let err = ctx.probe(1.0, 1.0, 99.0).unwrap_err();
        assert!(matches!(err, ProbeError::BoundsSpace { .. }));
        assert!(ctx.last_error().is_some(), "failed probe must be recorded");
        let after = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
        assert_eq!(before, after, "failed probe must not disturb answers");
        ctx.probe(2.0, 2.0, 2.0).unwrap();
        assert!(ctx.last_error().is_none(), "success clears the record");
    }

    #[test]
    fn nan_coordinates_are_out_of_bounds() {
        let (mut ctx, _) = value_ctx([5, 5, 5], ramp([5, 5, 5]));
        assert!(ctx.probe(f64::NAN, 1.0, 1.0).is_err());
    }

    #[test]
    fn node_centered_top_boundary_is_probeable() {
        let vol = Volume::new(ramp([5, 5, 5]), 1, [5, 5, 5])
            .unwrap()
            .with_centering(crate::shape::Centering::Node);
        let mut b = VolumeBinding::new(&SCALAR, vol).unwrap();
        b.item_on(ScalarItem::Value as usize).unwrap();
        let mut ctx = ProbeContext::new();
        let id = ctx.attach(b).unwrap();
        ctx.set_kernel(KernelRole::Value00, KernelSpec::tent()).unwrap();
        ctx.update().unwrap();
        ctx.probe(4.0, 4.0, 4.0).unwrap();
        let v = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
        let want = 4.0 + 10.0 * 4.0 + 100.0 * 4.0;
        assert!((v - want).abs() < 1e-12, "corner sample: {v} vs {want}");
        assert!(ctx.probe(4.5, 4.0, 4.0).is_err(), "past the last node is out");
    }

    #[test]
    fn world_space_probe_matches_index_space() {
        let vol = Volume::new(ramp([5, 5, 5]), 1, [5, 5, 5])
            .unwrap()
            .with_spacing([2.0, 2.0, 2.0]);
        let mut b = VolumeBinding::new(&SCALAR, vol).unwrap();
        b.item_on(ScalarItem::Value as usize).unwrap();
        let mut ctx = ProbeContext::new();
        let id = ctx.attach(b).unwrap();
        ctx.set_kernel(KernelRole::Value00, KernelSpec::tent()).unwrap();
        ctx.update().unwrap();
        ctx.probe(1.5, 1.0, 2.0).unwrap();
        let via_index = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
        ctx.probe_space(3.0, 2.0, 4.0, false, false).unwrap();
        let via_world = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
        assert_eq!(via_index, via_world);
    }

    #[test]
    fn clamped_probe_accepts_outside_locations() {
        let (mut ctx, id) = value_ctx([5, 5, 5], ramp([5, 5, 5]));
        ctx.probe_space(99.0, -99.0, 2.0, true, true).unwrap();
        let clamped = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
        ctx.probe(4.5, -0.5, 2.0).unwrap();
        assert_eq!(
            clamped,
            ctx.answer(id, ScalarItem::Value as usize).unwrap()[0],
            "clamping must land on the nearest in-bounds location"
        );
    }

    #[test]
    fn boundary_neighborhood_clamps_to_edge_samples() {
        // Radius-2 windows near either end of the raster poke outside and
        // clamp their samples to the edge, so a constant volume reads
        // exactly constant there.
        let vol = Volume::new(vec![7.0f64; 64], 1, [4, 4, 4]).unwrap();
        let mut b = VolumeBinding::new(&SCALAR, vol).unwrap();
        b.item_on(ScalarItem::Value as usize).unwrap();
        let mut ctx = ProbeContext::new();
        let id = ctx.attach(b).unwrap();
        ctx.set_kernel(KernelRole::Value00, KernelSpec::catmull_rom())
            .unwrap();
        ctx.update().unwrap();
        for p in [0.25f64, 1.5, 3.25] {
            ctx.probe(p, 1.0, 1.0).unwrap();
            let v = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
            assert!((v - 7.0).abs() < 1e-12, "constant at x={p}: {v}");
        }
    }

    #[test]
    fn cell_centered_low_boundary_keeps_negative_fraction() {
        // Locations in [-0.5, 0) truncate to voxel 0 with a negative
        // fraction; the tent weights then sum below one and the value
        // attenuates accordingly.
        let (mut ctx, id) = value_ctx([4, 4, 4], vec![7.0; 64]);
        for (p, want) in [(-0.5f64, 3.5), (-0.25, 5.25), (0.0, 7.0)] {
            ctx.probe(p, 1.0, 1.0).unwrap();
            let v = ctx.answer(id, ScalarItem::Value as usize).unwrap()[0];
            assert!((v - want).abs() < 1e-12, "value at x={p}: {v} vs {want}");
        }
    }
}
