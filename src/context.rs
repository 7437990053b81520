//! The probing context: kernels, parameters, attached volumes, and the
//! shared filter caches. One context serves one thread; `copy` produces an
//! independent clone for concurrent probing of the same volumes.

use log::debug;

use crate::binding::VolumeBinding;
use crate::error::ProbeError;
use crate::kernel::{KernelRole, KernelSpec, NUM_ROLES};
use crate::shape::{Centering, ShapeSettings, VolumeShape};

/// Stable handle to an attached volume; survives detaching other volumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

/// Tunable parameters. Set them through the `ProbeContext` setters so the
/// right recomputation gets scheduled.
#[derive(Clone, Copy, Debug)]
pub struct ProbeParams {
    /// Rescale filter weights so discrete sums match continuous integrals.
    pub renormalize: bool,
    /// Validate kernel integrals in `set_kernel`.
    pub check_integrals: bool,
    /// Use 3 kernels (value, first, second derivative) instead of 6.
    pub k3pack: bool,
    /// Gradient magnitude below which curvature answers are zeroed.
    pub grad_mag_curv_min: f64,
    /// Tolerance for "integral is zero" in derivative kernel checks.
    pub kernel_integral_near_zero: f64,
    pub default_spacing: f64,
    /// +1 or -1: which side of an isosurface the normal points to.
    pub curv_normal_side: i32,
    pub require_all_spacings: bool,
    pub require_equal_centers: bool,
    pub default_center: Centering,
    /// Treat attached volumes as a scale stack.
    pub stack_use: bool,
    /// Rescale derivative weights by the world-space blur scale.
    pub stack_renormalize: bool,
}

impl Default for ProbeParams {
    fn default() -> Self {
        ProbeParams {
            renormalize: false,
            check_integrals: true,
            k3pack: true,
            grad_mag_curv_min: 0.0,
            kernel_integral_near_zero: 1e-4,
            default_spacing: 1.0,
            curv_normal_side: 1,
            require_all_spacings: false,
            require_equal_centers: false,
            default_center: Centering::Cell,
            stack_use: false,
            stack_renormalize: false,
        }
    }
}

/// Dirty bits driving the staged update.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CtxFlags {
    pub need_d: bool,
    pub k3pack: bool,
    pub need_k: bool,
    pub kernel: bool,
    pub radius: bool,
    pub shape: bool,
}

/// Last probed location, split into integer voxel and in-voxel fraction.
/// Axis 3 is the stack coordinate. Reset state compares unequal to every
/// real location, forcing the first probe to do full work.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProbePoint {
    pub idx: [usize; 4],
    pub frac: [f64; 4],
}

impl ProbePoint {
    pub fn reset() -> Self {
        ProbePoint {
            idx: [usize::MAX; 4],
            frac: [f64::NAN; 4],
        }
    }
}

pub struct ProbeContext {
    pub(crate) parm: ProbeParams,
    pub(crate) ksp: [Option<KernelSpec>; NUM_ROLES],
    pub(crate) bindings: Vec<VolumeBinding>,
    pub(crate) ids: Vec<BindingId>,
    next_id: u64,
    pub(crate) shape: Option<VolumeShape>,
    /// Stack scale positions, one per stack sample binding.
    pub(crate) stack_pos: Vec<f64>,
    /// Stack reconstruction weights, recomputed per probe.
    pub(crate) stack_fslw: Vec<f64>,
    pub(crate) flags: CtxFlags,
    pub(crate) need_d: [bool; 3],
    pub(crate) need_k: [bool; NUM_ROLES],
    pub(crate) radius: usize,
    /// Filter sample locations, `fd` per axis.
    pub(crate) fsl: Vec<f64>,
    /// Filter weights, `fd` per axis per kernel role.
    pub(crate) fw: Vec<f64>,
    /// Raster offsets of the `fd^3` neighborhood samples.
    pub(crate) off: Vec<usize>,
    pub(crate) point: ProbePoint,
    pub(crate) last_error: Option<ProbeError>,
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeContext {
    pub fn new() -> Self {
        ProbeContext {
            parm: ProbeParams::default(),
            ksp: Default::default(),
            bindings: Vec::new(),
            ids: Vec::new(),
            next_id: 0,
            shape: None,
            stack_pos: Vec::new(),
            stack_fslw: Vec::new(),
            flags: CtxFlags::default(),
            need_d: [false; 3],
            need_k: [false; NUM_ROLES],
            radius: 0,
            fsl: Vec::new(),
            fw: Vec::new(),
            off: Vec::new(),
            point: ProbePoint::reset(),
            last_error: None,
        }
    }

    /// Independent copy for probing from another thread. Scratch caches are
    /// fresh and the tracked point is reset, so the copy's first probe does
    /// full work; no update is needed if the source was up to date.
    pub fn copy(&self) -> Self {
        ProbeContext {
            parm: self.parm,
            ksp: self.ksp.clone(),
            bindings: self.bindings.clone(),
            ids: self.ids.clone(),
            next_id: self.next_id,
            shape: self.shape.clone(),
            stack_pos: self.stack_pos.clone(),
            stack_fslw: vec![0.0; self.stack_fslw.len()],
            flags: self.flags,
            need_d: self.need_d,
            need_k: self.need_k,
            radius: self.radius,
            fsl: vec![0.0; self.fsl.len()],
            fw: vec![0.0; self.fw.len()],
            off: self.off.clone(),
            point: ProbePoint::reset(),
            last_error: None,
        }
    }

    // -- volume attachment --------------------------------------------------

    /// Attach a volume binding. The first binding fixes the context's
    /// shape; later ones must agree with it exactly.
    pub fn attach(&mut self, mut binding: VolumeBinding) -> Result<BindingId, ProbeError> {
        let settings = self.shape_settings();
        let candidate = VolumeShape::from_volume(binding.volume(), &settings)?;
        match &self.shape {
            None => {
                self.shape = Some(candidate);
                self.flags.shape = true;
            }
            Some(shape) => {
                if *shape != candidate {
                    return Err(ProbeError::ShapeMismatch {
                        expected: shape.size(),
                        got: candidate.size(),
                    });
                }
            }
        }
        binding.flag_volume = true;
        let id = BindingId(self.next_id);
        self.next_id += 1;
        self.bindings.push(binding);
        self.ids.push(id);
        debug!("attached volume {:?}; {} now attached", id, self.bindings.len());
        Ok(id)
    }

    /// Detach a binding, preserving the order of the rest. The shape is
    /// forgotten when the last volume leaves.
    pub fn detach(&mut self, id: BindingId) -> Result<VolumeBinding, ProbeError> {
        let pos = self
            .ids
            .iter()
            .position(|&i| i == id)
            .ok_or(ProbeError::NotAttached)?;
        self.ids.remove(pos);
        let binding = self.bindings.remove(pos);
        if self.bindings.is_empty() {
            self.shape = None;
            self.flags.shape = true;
        }
        Ok(binding)
    }

    pub fn is_attached(&self, id: BindingId) -> bool {
        self.ids.contains(&id)
    }

    pub fn binding(&self, id: BindingId) -> Result<&VolumeBinding, ProbeError> {
        let pos = self
            .ids
            .iter()
            .position(|&i| i == id)
            .ok_or(ProbeError::NotAttached)?;
        Ok(&self.bindings[pos])
    }

    pub fn binding_mut(&mut self, id: BindingId) -> Result<&mut VolumeBinding, ProbeError> {
        let pos = self
            .ids
            .iter()
            .position(|&i| i == id)
            .ok_or(ProbeError::NotAttached)?;
        Ok(&mut self.bindings[pos])
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn binding_ids(&self) -> &[BindingId] {
        &self.ids
    }

    /// The answer slice for one item of one attached volume.
    pub fn answer(&self, id: BindingId, item: usize) -> Result<&[f64], ProbeError> {
        self.binding(id)?.answer(item)
    }

    // -- kernels ------------------------------------------------------------

    /// Set the kernel for a role, validating parameter count, support, and
    /// (unless disabled) the integral appropriate to the role.
    pub fn set_kernel(&mut self, role: KernelRole, spec: KernelSpec) -> Result<(), ProbeError> {
        if spec.parms.len() != spec.kernel.num_parms() {
            return Err(ProbeError::KernelParmCount {
                kernel: spec.kernel.name(),
                expected: spec.kernel.num_parms(),
                got: spec.parms.len(),
            });
        }
        let support = spec.support();
        if !(support > 0.0) {
            return Err(ProbeError::KernelSupport {
                kernel: spec.kernel.name(),
                support,
            });
        }
        if self.parm.check_integrals {
            let integral = spec.integral();
            if role.is_reconstruction() {
                if !(integral > 0.0) {
                    return Err(ProbeError::ReconIntegral {
                        kernel: spec.kernel.name(),
                        integral,
                    });
                }
            } else if integral.abs() > self.parm.kernel_integral_near_zero {
                return Err(ProbeError::DerivIntegral {
                    kernel: spec.kernel.name(),
                    integral,
                    tolerance: self.parm.kernel_integral_near_zero,
                });
            }
        }
        self.ksp[role.index()] = Some(spec);
        self.flags.kernel = true;
        Ok(())
    }

    pub fn kernel(&self, role: KernelRole) -> Option<&KernelSpec> {
        self.ksp[role.index()].as_ref()
    }

    pub fn reset_kernels(&mut self) {
        self.ksp = Default::default();
        self.flags.kernel = true;
    }

    // -- parameters ---------------------------------------------------------

    pub fn params(&self) -> &ProbeParams {
        &self.parm
    }

    /// Renormalization changes filter weights, so the tracked point is
    /// reset to force their recomputation.
    pub fn set_renormalize(&mut self, on: bool) {
        if self.parm.renormalize != on {
            self.parm.renormalize = on;
            self.point = ProbePoint::reset();
        }
    }

    pub fn set_k3pack(&mut self, on: bool) {
        if self.parm.k3pack != on {
            self.parm.k3pack = on;
            self.flags.k3pack = true;
        }
    }

    pub fn set_check_integrals(&mut self, on: bool) {
        self.parm.check_integrals = on;
    }

    pub fn set_kernel_integral_near_zero(&mut self, tol: f64) {
        self.parm.kernel_integral_near_zero = tol;
    }

    pub fn set_grad_mag_curv_min(&mut self, min: f64) {
        self.parm.grad_mag_curv_min = min;
    }

    pub fn set_curv_normal_side(&mut self, side: i32) {
        self.parm.curv_normal_side = if side < 0 { -1 } else { 1 };
    }

    pub fn set_default_spacing(&mut self, spacing: f64) {
        self.parm.default_spacing = spacing;
    }

    pub fn set_default_center(&mut self, center: Centering) {
        self.parm.default_center = center;
    }

    pub fn set_require_all_spacings(&mut self, on: bool) {
        self.parm.require_all_spacings = on;
    }

    pub fn set_require_equal_centers(&mut self, on: bool) {
        self.parm.require_equal_centers = on;
    }

    /// Stack use changes which kernels are needed and the filter radius.
    pub fn set_stack_use(&mut self, on: bool) {
        if self.parm.stack_use != on {
            self.parm.stack_use = on;
            self.flags.need_k = true;
        }
    }

    pub fn set_stack_renormalize(&mut self, on: bool) {
        if self.parm.stack_renormalize != on {
            self.parm.stack_renormalize = on;
            self.point = ProbePoint::reset();
        }
    }

    // -- inspection ---------------------------------------------------------

    pub fn shape(&self) -> Option<&VolumeShape> {
        self.shape.as_ref()
    }

    /// Current filter radius; meaningful after `update`.
    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn stack_positions(&self) -> &[f64] {
        &self.stack_pos
    }

    /// The error recorded by the most recent failed probe, if any. Cleared
    /// by the next successful probe.
    pub fn last_error(&self) -> Option<&ProbeError> {
        self.last_error.as_ref()
    }

    pub(crate) fn shape_settings(&self) -> ShapeSettings {
        ShapeSettings {
            default_spacing: self.parm.default_spacing,
            default_center: self.parm.default_center,
            require_all_spacings: self.parm.require_all_spacings,
            require_equal_centers: self.parm.require_equal_centers,
        }
    }
}
