//! Differential probing of sampled volumes.
//!
//! A [`ProbeContext`] holds convolution kernels and one or more attached
//! volumes sharing a geometry; after [`ProbeContext::update`] it can be
//! probed at arbitrary (fractional, world- or index-space) locations for
//! the quantities its volumes' queries request: interpolated values,
//! gradients, Hessians, and the curvature measures derived from them.
//! Scale stacks of pre-blurred volumes extend probing with a continuous
//! blur-scale axis.
//!
//! ```no_run
//! use volprobe::{KernelRole, KernelSpec, ProbeContext, ScalarItem, Volume, VolumeBinding, SCALAR};
//!
//! # fn main() -> Result<(), volprobe::ProbeError> {
//! let volume = Volume::new(vec![0.0f64; 64 * 64 * 64], 1, [64, 64, 64])?;
//! let mut binding = VolumeBinding::new(&SCALAR, volume)?;
//! binding.item_on(ScalarItem::GradVec as usize)?;
//!
//! let mut ctx = ProbeContext::new();
//! let id = ctx.attach(binding)?;
//! ctx.set_kernel(KernelRole::Value00, KernelSpec::catmull_rom())?;
//! ctx.set_kernel(KernelRole::D1Measure11, KernelSpec::bc_cubic_d(0.0, 0.5))?;
//! ctx.update()?;
//!
//! ctx.probe(31.25, 32.0, 30.5)?;
//! let grad = ctx.answer(id, ScalarItem::GradVec as usize)?;
//! # let _ = grad;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod context;
pub mod dump;
pub mod error;
pub mod kernel;
pub mod kind;
pub mod math;
pub mod query;
pub mod scalar;
pub mod shape;
pub mod stack;
pub mod volume;

mod probe;
mod update;

pub use binding::VolumeBinding;
pub use context::{BindingId, ProbeContext, ProbeParams};
pub use error::ProbeError;
pub use kernel::{Kernel, KernelRole, KernelSpec};
pub use kind::Kind;
pub use query::Query;
pub use scalar::{ScalarItem, SCALAR};
pub use shape::{Centering, VolumeShape};
pub use volume::{ScalarType, Volume, VolumeData};

#[cfg(test)]
mod tests;
