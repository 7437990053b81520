//! The staged update pipeline: settings flow downstream through dirty
//! flags, so repeated `update` calls only redo what changed.
//!
//! Stage order: per-volume derivative needs, merged derivative needs,
//! needed kernels, filter radius, cache sizes, neighborhood offsets. Each
//! stage runs only when a flag it depends on is raised, and raises the
//! flags of the stages downstream of it.

use log::{debug, trace};

use crate::context::{ProbeContext, ProbePoint};
use crate::error::ProbeError;
use crate::kernel::{KernelRole, NUM_ROLES};

impl ProbeContext {
    /// Bring every derived field in sync with the current settings. Must be
    /// called (successfully) before probing, and again after any change to
    /// kernels, queries, parameters, or attachments.
    pub fn update(&mut self) -> Result<(), ProbeError> {
        if self.bindings.is_empty() {
            return Err(ProbeError::NoBindings);
        }
        if self.bindings.iter().all(|b| b.query().is_empty()) {
            return Err(ProbeError::EmptyQuery);
        }
        if self.parm.stack_use {
            self.check_stack()?;
        }

        // Per-volume: resolved query -> exact derivative orders.
        for binding in &mut self.bindings {
            if binding.flag_query {
                if binding.refresh_need_d() {
                    binding.flag_need_d = true;
                }
                binding.flag_query = false;
            }
        }

        // Merge derivative needs across volumes.
        if self.bindings.iter().any(|b| b.flag_need_d) {
            let mut need_d = [false; 3];
            for binding in &self.bindings {
                for (m, &n) in need_d.iter_mut().zip(binding.need_d().iter()) {
                    *m |= n;
                }
            }
            if need_d != self.need_d {
                self.need_d = need_d;
                self.flags.need_d = true;
            }
            for binding in &mut self.bindings {
                binding.flag_need_d = false;
            }
        }

        if self.flags.need_d || self.flags.k3pack {
            self.update_need_k();
        }
        if self.flags.need_k || self.flags.kernel {
            self.update_radius()?;
        }
        let new_volume = self.bindings.iter().any(|b| b.flag_volume);
        if self.flags.radius || new_volume {
            self.update_cache_sizes();
        }
        if self.flags.radius || self.flags.shape || new_volume {
            self.update_offsets();
        }

        for binding in &mut self.bindings {
            binding.flag_volume = false;
            if let Some(data) = binding.data.as_mut() {
                data.update();
            }
        }
        self.flags = Default::default();
        self.point = ProbePoint::reset();
        debug!(
            "update done: radius {}, needD {:?}",
            self.radius, self.need_d
        );
        Ok(())
    }

    fn check_stack(&self) -> Result<(), ProbeError> {
        if self.kernel(KernelRole::Stack).is_none() {
            return Err(ProbeError::StackNeedsKernel);
        }
        if self.bindings.len() < 2 || self.stack_pos.len() + 1 != self.bindings.len() {
            return Err(ProbeError::StackTooFew(self.bindings.len()));
        }
        let first = self.bindings[0].kind();
        for (i, binding) in self.bindings.iter().enumerate().skip(1) {
            if !std::ptr::eq(
                binding.kind() as *const _ as *const u8,
                first as *const _ as *const u8,
            ) {
                return Err(ProbeError::StackKindMismatch {
                    index: i,
                    expected: first.name(),
                    got: binding.kind().name(),
                });
            }
        }
        Ok(())
    }

    /// Which kernel roles the merged derivative needs imply.
    fn update_need_k(&mut self) {
        let mut need_k = [false; NUM_ROLES];
        let k3 = self.parm.k3pack;
        if self.need_d[0] {
            need_k[KernelRole::Value00.index()] = true;
        }
        if self.need_d[1] {
            need_k[KernelRole::D1Measure11.index()] = true;
            if k3 {
                need_k[KernelRole::Value00.index()] = true;
            } else {
                need_k[KernelRole::D1Recon10.index()] = true;
            }
        }
        if self.need_d[2] {
            need_k[KernelRole::D2Measure22.index()] = true;
            if k3 {
                need_k[KernelRole::Value00.index()] = true;
                need_k[KernelRole::D1Measure11.index()] = true;
            } else {
                need_k[KernelRole::D2Recon20.index()] = true;
                need_k[KernelRole::D2Partial21.index()] = true;
            }
        }
        need_k[KernelRole::Stack.index()] = self.parm.stack_use;
        if need_k != self.need_k {
            self.need_k = need_k;
            self.flags.need_k = true;
        }
        trace!("needK now {:?}", self.need_k);
    }

    /// Filter radius: the widest support among needed spatial kernels,
    /// rounded up, at least 1. Hermite stack blending needs one more ring
    /// of samples for its discrete scale derivatives.
    fn update_radius(&mut self) -> Result<(), ProbeError> {
        let mut max_support = 0.0f64;
        for role in KernelRole::ALL {
            if role == KernelRole::Stack || !self.need_k[role.index()] {
                continue;
            }
            let spec = self
                .kernel(role)
                .ok_or(ProbeError::MissingKernel(role))?;
            max_support = max_support.max(spec.support());
        }
        let mut radius = (max_support.ceil() as usize).max(1);
        if self.parm.stack_use {
            let hermite = self
                .kernel(KernelRole::Stack)
                .map(|s| s.kernel.hermite_flag())
                .unwrap_or(false);
            if hermite {
                radius += 1;
            }
        }
        if radius != self.radius {
            debug!("filter radius {} -> {}", self.radius, radius);
            self.radius = radius;
            self.flags.radius = true;
        }
        Ok(())
    }

    fn update_cache_sizes(&mut self) {
        let fd = 2 * self.radius;
        self.fsl = vec![0.0; fd * 3];
        self.fw = vec![0.0; fd * 3 * NUM_ROLES];
        self.off = vec![0; fd * fd * fd];
        self.stack_fslw = vec![0.0; self.stack_pos.len()];
        for binding in &mut self.bindings {
            binding.resize_caches(fd);
        }
    }

    /// Raster offsets of the filter neighborhood, in samples. Lets the
    /// interior fill path walk the volume without index arithmetic.
    fn update_offsets(&mut self) {
        // Guarded by the binding check at the top of update.
        let Some(shape) = self.shape.as_ref() else {
            return;
        };
        let [sx, sy, _] = shape.size();
        let fd = 2 * self.radius;
        for k in 0..fd {
            for j in 0..fd {
                for i in 0..fd {
                    self.off[i + fd * (j + fd * k)] = i + sx * (j + sy * k);
                }
            }
        }
    }
}
