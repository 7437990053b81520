//! Convolution kernels and the roles they play during probing.
//!
//! A kernel is a 1-D function with bounded support; the engine evaluates it
//! in batches over the filter sample locations. Kernels carry no state of
//! their own, parameters live in the [`KernelSpec`] that pairs a kernel with
//! its parameter vector.

use std::fmt;
use std::sync::Arc;

use crate::math;

/// Number of distinct kernel roles.
pub const NUM_ROLES: usize = 7;

/// What a kernel is used for. Reconstruction roles ("recon") interpolate
/// values; measurement roles ("measure") apply a derivative directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelRole {
    /// Value reconstruction.
    Value00,
    /// Value reconstruction along the two axes orthogonal to a first
    /// derivative, when not 3-packing.
    D1Recon10,
    /// First-derivative measurement.
    D1Measure11,
    /// Value reconstruction orthogonal to a second derivative, when not
    /// 3-packing.
    D2Recon20,
    /// First-derivative measurement for mixed second partials, when not
    /// 3-packing.
    D2Partial21,
    /// Second-derivative measurement.
    D2Measure22,
    /// Reconstruction across the samples of a scale stack.
    Stack,
}

impl KernelRole {
    pub const ALL: [KernelRole; NUM_ROLES] = [
        KernelRole::Value00,
        KernelRole::D1Recon10,
        KernelRole::D1Measure11,
        KernelRole::D2Recon20,
        KernelRole::D2Partial21,
        KernelRole::D2Measure22,
        KernelRole::Stack,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            KernelRole::Value00 => 0,
            KernelRole::D1Recon10 => 1,
            KernelRole::D1Measure11 => 2,
            KernelRole::D2Recon20 => 3,
            KernelRole::D2Partial21 => 4,
            KernelRole::D2Measure22 => 5,
            KernelRole::Stack => 6,
        }
    }

    /// Reconstruction roles must have integral near 1; measurement roles
    /// must have integral near 0.
    pub fn is_reconstruction(self) -> bool {
        matches!(
            self,
            KernelRole::Value00
                | KernelRole::D1Recon10
                | KernelRole::D2Recon20
                | KernelRole::Stack
        )
    }
}

/// A 1-D convolution kernel with compact support.
pub trait Kernel: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of parameters `support`/`integral`/`evaluate` expect.
    fn num_parms(&self) -> usize;

    /// Half-width of the region where the kernel may be nonzero.
    fn support(&self, parms: &[f64]) -> f64;

    /// Integral over the whole real line.
    fn integral(&self, parms: &[f64]) -> f64;

    fn evaluate(&self, x: f64, parms: &[f64]) -> f64;

    /// Batch evaluation; the hot path during filtering.
    fn evaluate_many(&self, xs: &[f64], out: &mut [f64], parms: &[f64]) {
        for (o, &x) in out.iter_mut().zip(xs.iter()) {
            *o = self.evaluate(x, parms);
        }
    }

    /// Whether, when used in the stack role, blending should use the
    /// boundary-aware Hermite scheme instead of a plain weighted sum.
    fn hermite_flag(&self) -> bool {
        false
    }
}

/// A kernel bound to a concrete parameter vector.
#[derive(Clone, Debug)]
pub struct KernelSpec {
    pub kernel: Arc<dyn Kernel>,
    pub parms: Vec<f64>,
}

impl KernelSpec {
    pub fn new(kernel: Arc<dyn Kernel>, parms: Vec<f64>) -> Self {
        KernelSpec { kernel, parms }
    }

    pub fn support(&self) -> f64 {
        self.kernel.support(&self.parms)
    }

    pub fn integral(&self) -> f64 {
        self.kernel.integral(&self.parms)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.kernel.evaluate(x, &self.parms)
    }

    pub fn evaluate_many(&self, xs: &[f64], out: &mut [f64]) {
        self.kernel.evaluate_many(xs, out, &self.parms);
    }

    // Convenience constructors for the built-in kernels.

    pub fn boxcar() -> Self {
        KernelSpec::new(Arc::new(BoxKernel), vec![])
    }

    pub fn tent() -> Self {
        KernelSpec::new(Arc::new(TentKernel), vec![])
    }

    pub fn bc_cubic(b: f64, c: f64) -> Self {
        KernelSpec::new(Arc::new(BcCubic), vec![b, c])
    }

    pub fn bc_cubic_d(b: f64, c: f64) -> Self {
        KernelSpec::new(Arc::new(BcCubicD), vec![b, c])
    }

    pub fn bc_cubic_dd(b: f64, c: f64) -> Self {
        KernelSpec::new(Arc::new(BcCubicDD), vec![b, c])
    }

    /// Catmull-Rom: the interpolating member of the BC family.
    pub fn catmull_rom() -> Self {
        KernelSpec::bc_cubic(0.0, 0.5)
    }

    pub fn gaussian(sigma: f64, cutoff: f64) -> Self {
        KernelSpec::new(Arc::new(Gaussian), vec![sigma, cutoff])
    }

    pub fn hermite() -> Self {
        KernelSpec::new(Arc::new(HermiteFlag), vec![])
    }
}

// ---------------------------------------------------------------------------
// Built-in kernels
// ---------------------------------------------------------------------------

/// Nearest-neighbor box: 1 inside [-1/2, 1/2].
#[derive(Debug)]
pub struct BoxKernel;

impl Kernel for BoxKernel {
    fn name(&self) -> &'static str {
        "box"
    }
    fn num_parms(&self) -> usize {
        0
    }
    fn support(&self, _: &[f64]) -> f64 {
        0.5
    }
    fn integral(&self, _: &[f64]) -> f64 {
        1.0
    }
    fn evaluate(&self, x: f64, _: &[f64]) -> f64 {
        let ax = x.abs();
        if ax < 0.5 {
            1.0
        } else if ax == 0.5 {
            0.5
        } else {
            0.0
        }
    }
}

/// Linear interpolation tent: max(0, 1 - |x|).
#[derive(Debug)]
pub struct TentKernel;

impl Kernel for TentKernel {
    fn name(&self) -> &'static str {
        "tent"
    }
    fn num_parms(&self) -> usize {
        0
    }
    fn support(&self, _: &[f64]) -> f64 {
        1.0
    }
    fn integral(&self, _: &[f64]) -> f64 {
        1.0
    }
    fn evaluate(&self, x: f64, _: &[f64]) -> f64 {
        (1.0 - x.abs()).max(0.0)
    }
}

/// Mitchell-Netravali two-parameter cubic. B=0, C=1/2 is Catmull-Rom;
/// B=1, C=0 is the cubic B-spline.
#[derive(Debug)]
pub struct BcCubic;

#[inline]
fn bc_eval(ax: f64, b: f64, c: f64) -> f64 {
    if ax < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * ax * ax * ax
            + (-18.0 + 12.0 * b + 6.0 * c) * ax * ax
            + (6.0 - 2.0 * b))
            / 6.0
    } else if ax < 2.0 {
        ((-b - 6.0 * c) * ax * ax * ax
            + (6.0 * b + 30.0 * c) * ax * ax
            + (-12.0 * b - 48.0 * c) * ax
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

impl Kernel for BcCubic {
    fn name(&self) -> &'static str {
        "cubic"
    }
    fn num_parms(&self) -> usize {
        2
    }
    fn support(&self, _: &[f64]) -> f64 {
        2.0
    }
    fn integral(&self, _: &[f64]) -> f64 {
        1.0
    }
    fn evaluate(&self, x: f64, parms: &[f64]) -> f64 {
        bc_eval(x.abs(), parms[0], parms[1])
    }
}

/// First derivative of the BC cubic (odd).
#[derive(Debug)]
pub struct BcCubicD;

#[inline]
fn bc_eval_d(ax: f64, b: f64, c: f64) -> f64 {
    if ax < 1.0 {
        (3.0 * (12.0 - 9.0 * b - 6.0 * c) * ax * ax
            + 2.0 * (-18.0 + 12.0 * b + 6.0 * c) * ax)
            / 6.0
    } else if ax < 2.0 {
        (3.0 * (-b - 6.0 * c) * ax * ax
            + 2.0 * (6.0 * b + 30.0 * c) * ax
            + (-12.0 * b - 48.0 * c))
            / 6.0
    } else {
        0.0
    }
}

impl Kernel for BcCubicD {
    fn name(&self) -> &'static str {
        "cubicd"
    }
    fn num_parms(&self) -> usize {
        2
    }
    fn support(&self, _: &[f64]) -> f64 {
        2.0
    }
    fn integral(&self, _: &[f64]) -> f64 {
        0.0
    }
    fn evaluate(&self, x: f64, parms: &[f64]) -> f64 {
        let v = bc_eval_d(x.abs(), parms[0], parms[1]);
        if x < 0.0 {
            -v
        } else {
            v
        }
    }
}

/// Second derivative of the BC cubic (even).
#[derive(Debug)]
pub struct BcCubicDD;

#[inline]
fn bc_eval_dd(ax: f64, b: f64, c: f64) -> f64 {
    if ax < 1.0 {
        (6.0 * (12.0 - 9.0 * b - 6.0 * c) * ax + 2.0 * (-18.0 + 12.0 * b + 6.0 * c)) / 6.0
    } else if ax < 2.0 {
        (6.0 * (-b - 6.0 * c) * ax + 2.0 * (6.0 * b + 30.0 * c)) / 6.0
    } else {
        0.0
    }
}

impl Kernel for BcCubicDD {
    fn name(&self) -> &'static str {
        "cubicdd"
    }
    fn num_parms(&self) -> usize {
        2
    }
    fn support(&self, _: &[f64]) -> f64 {
        2.0
    }
    fn integral(&self, _: &[f64]) -> f64 {
        0.0
    }
    fn evaluate(&self, x: f64, parms: &[f64]) -> f64 {
        bc_eval_dd(x.abs(), parms[0], parms[1])
    }
}

/// Truncated Gaussian, parameterized by (sigma, cutoff-in-sigmas).
#[derive(Debug)]
pub struct Gaussian;

impl Kernel for Gaussian {
    fn name(&self) -> &'static str {
        "gauss"
    }
    fn num_parms(&self) -> usize {
        2
    }
    fn support(&self, parms: &[f64]) -> f64 {
        parms[0] * parms[1]
    }
    fn integral(&self, parms: &[f64]) -> f64 {
        // Mass actually inside the truncation radius.
        math::erf(parms[1] / std::f64::consts::SQRT_2)
    }
    fn evaluate(&self, x: f64, parms: &[f64]) -> f64 {
        let (sigma, cutoff) = (parms[0], parms[1]);
        if x.abs() > sigma * cutoff {
            return 0.0;
        }
        let t = x / sigma;
        (-t * t / 2.0).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
    }
}

/// Evaluates as the tent, but flags Hermite-spline blending across the
/// samples of a scale stack (and widens the filter radius by one).
#[derive(Debug)]
pub struct HermiteFlag;

impl Kernel for HermiteFlag {
    fn name(&self) -> &'static str {
        "hermite"
    }
    fn num_parms(&self) -> usize {
        0
    }
    fn support(&self, _: &[f64]) -> f64 {
        1.0
    }
    fn integral(&self, _: &[f64]) -> f64 {
        1.0
    }
    fn evaluate(&self, x: f64, _: &[f64]) -> f64 {
        (1.0 - x.abs()).max(0.0)
    }
    fn hermite_flag(&self) -> bool {
        true
    }
}
