//! Geometry of a sampled volume: raster size, sample spacing, centering,
//! and the index/world transforms derived from them.
//!
//! All volumes attached to one context must agree on shape; equality here is
//! exact, not approximate, because the shared filter caches assume one
//! geometry for everybody.

use glam::{DMat3, DMat4, DVec3};

use crate::error::ProbeError;
use crate::volume::Volume;

/// Where a sample sits within its grid slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Centering {
    /// Samples at integer lattice points; valid index range [0, N-1].
    Node,
    /// Samples at cell centers; valid index range [-1/2, N-1/2].
    Cell,
}

/// How to fill in metadata a volume leaves unset.
#[derive(Clone, Copy, Debug)]
pub struct ShapeSettings {
    pub default_spacing: f64,
    pub default_center: Centering,
    pub require_all_spacings: bool,
    pub require_equal_centers: bool,
}

impl Default for ShapeSettings {
    fn default() -> Self {
        ShapeSettings {
            default_spacing: 1.0,
            default_center: Centering::Cell,
            require_all_spacings: false,
            require_equal_centers: false,
        }
    }
}

/// Resolved geometry shared by all volumes of a context.
#[derive(Clone, Debug)]
pub struct VolumeShape {
    size: [usize; 3],
    spacing: [f64; 3],
    centering: Centering,
    ito_w: DMat4,
    w_to_i: DMat4,
    grad_xform: DMat3,
}

impl PartialEq for VolumeShape {
    fn eq(&self, other: &Self) -> bool {
        // Exact comparison: derived transforms follow from these fields.
        self.size == other.size
            && self.spacing == other.spacing
            && self.centering == other.centering
    }
}

impl VolumeShape {
    /// Resolve a volume's geometry against the context's defaults.
    pub fn from_volume(vol: &Volume, settings: &ShapeSettings) -> Result<Self, ProbeError> {
        let mut spacing = [0.0f64; 3];
        for axis in 0..3 {
            spacing[axis] = match vol.spacing()[axis] {
                Some(s) if s.is_finite() && s > 0.0 => s,
                Some(s) => return Err(ProbeError::SpacingInvalid { axis, spacing: s }),
                None if settings.require_all_spacings => {
                    return Err(ProbeError::SpacingUnset { axis })
                }
                None => settings.default_spacing,
            };
        }
        let centering = match vol.centering() {
            Some(c) => c,
            None if settings.require_equal_centers => return Err(ProbeError::CenteringUnset),
            None => settings.default_center,
        };
        let ito_w = DMat4::from_scale(DVec3::new(spacing[0], spacing[1], spacing[2]));
        let w_to_i = ito_w.inverse();
        // Covariant transform for gradients: inverse transpose of the 3x3
        // sub-matrix of ItoW.
        let sub = DMat3::from_mat4(ito_w);
        let grad_xform = sub.inverse().transpose();
        Ok(VolumeShape {
            size: vol.size(),
            spacing,
            centering,
            ito_w,
            w_to_i,
            grad_xform,
        })
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn centering(&self) -> Centering {
        self.centering
    }

    pub fn grad_xform(&self) -> DMat3 {
        self.grad_xform
    }

    /// Closed interval of valid fractional indices along `axis`.
    pub fn axis_bounds(&self, axis: usize) -> (f64, f64) {
        let n = self.size[axis] as f64;
        match self.centering {
            Centering::Node => (0.0, n - 1.0),
            Centering::Cell => (-0.5, n - 0.5),
        }
    }

    pub fn index_to_world(&self, index: DVec3) -> DVec3 {
        self.ito_w.transform_point3(index)
    }

    pub fn world_to_index(&self, world: DVec3) -> DVec3 {
        self.w_to_i.transform_point3(world)
    }
}
