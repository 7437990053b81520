//! Error types for the probing engine.
//!
//! Two families share one enum: configuration errors (bad kernels, shape
//! mismatches, missing kernels) abort the call that raised them and must be
//! fixed before `update`/`probe` is retried; probe-time errors (out-of-bounds
//! locations, degenerate stack weights) are expected steady-state conditions
//! that leave the context untouched and can simply be probed past.

use crate::kernel::KernelRole;
use crate::shape::Centering;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("kernel parameter count {got} does not match kernel '{kernel}' (expects {expected})")]
    KernelParmCount {
        kernel: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("kernel '{kernel}' support ({support}) not > 0")]
    KernelSupport { kernel: &'static str, support: f64 },

    #[error("reconstruction kernel '{kernel}' integral ({integral}) not > 0")]
    ReconIntegral { kernel: &'static str, integral: f64 },

    #[error("derivative kernel '{kernel}' integral ({integral}) not within {tolerance} of 0")]
    DerivIntegral {
        kernel: &'static str,
        integral: f64,
        tolerance: f64,
    },

    #[error("volume tuple length {got} does not match kind '{kind}' (expects {expected})")]
    VolumeKindMismatch {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("volume byte length {got} does not match raster size (expected {expected})")]
    VolumeLength { expected: usize, got: usize },

    #[error("volume spacing on axis {axis} is unset but all spacings are required")]
    SpacingUnset { axis: usize },

    #[error("volume spacing {spacing} on axis {axis} is not usable")]
    SpacingInvalid { axis: usize, spacing: f64 },

    #[error("volume centering is unset but equal centerings are required")]
    CenteringUnset,

    #[error("new volume shape {got:?} disagrees with context shape {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        got: [usize; 3],
    },

    #[error("no binding with the given id is attached")]
    NotAttached,

    #[error("item {item} is not valid for kind '{kind}'")]
    InvalidItem { kind: &'static str, item: usize },

    #[error("item {item} ('{name}') needs per-binding data, but none was provided")]
    ItemNeedsData { item: usize, name: &'static str },

    #[error("context has no attached volumes")]
    NoBindings,

    #[error("all bindings have empty queries")]
    EmptyQuery,

    #[error("kernel role {0:?} is needed by the current query but no kernel is set for it")]
    MissingKernel(KernelRole),

    #[error("stack use requires a kernel in the stack role")]
    StackNeedsKernel,

    #[error("stack use requires at least 2 attached volumes, have {0}")]
    StackTooFew(usize),

    #[error("stack volume {index} kind '{got}' differs from first volume kind '{expected}'")]
    StackKindMismatch {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("stack position [{index}] = {value} is not finite")]
    StackPosNotFinite { index: usize, value: f64 },

    #[error("stack positions [{index}] = {lo} and [{index_next}] = {hi} are not strictly increasing")]
    StackPosNotIncreasing {
        index: usize,
        index_next: usize,
        lo: f64,
        hi: f64,
    },

    #[error("stack volumes must be attached to an empty context (context has {0} bindings)")]
    StackNotEmpty(usize),

    #[error(
        "position ({x}, {y}, {z}) outside ({centering:?}-centered) bounds \
         [{min},{max_x}]x[{min},{max_y}]x[{min},{max_z}]"
    )]
    BoundsSpace {
        x: f64,
        y: f64,
        z: f64,
        centering: Centering,
        min: f64,
        max_x: f64,
        max_y: f64,
        max_z: f64,
    },

    #[error("stack position {s} outside bounds [{min},{max}]")]
    BoundsStack { s: f64, min: f64, max: f64 },

    #[error("stack reconstruction weights sum to zero")]
    StackIntegralZero,

    #[error("probing with a stack coordinate requires stack use to be enabled")]
    StackNotEnabled,

    #[error("context must be updated before probing")]
    NotUpdated,
}

impl ProbeError {
    /// Whether this error is a recoverable probe-time condition, as opposed
    /// to a configuration error that must be fixed before probing again.
    pub fn is_probe_time(&self) -> bool {
        matches!(
            self,
            ProbeError::BoundsSpace { .. }
                | ProbeError::BoundsStack { .. }
                | ProbeError::StackIntegralZero
        )
    }
}
