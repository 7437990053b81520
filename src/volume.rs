//! Sampled volumes: a shared read-only raster plus the per-axis metadata
//! needed to place it in world space.
//!
//! The backing buffer is immutable and reference counted, so volumes clone
//! cheaply and can be shared across probing contexts on different threads.

use std::sync::Arc;

use crate::error::ProbeError;
use crate::shape::Centering;

/// Element type of the raster samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl ScalarType {
    pub fn size_of(self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::I8 => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }
}

/// Typed, shared sample storage. Lookup converts to `f64`, which is the
/// currency of every downstream computation.
#[derive(Clone, Debug)]
pub enum VolumeData {
    U8(Arc<[u8]>),
    I8(Arc<[i8]>),
    U16(Arc<[u16]>),
    I16(Arc<[i16]>),
    U32(Arc<[u32]>),
    I32(Arc<[i32]>),
    F32(Arc<[f32]>),
    F64(Arc<[f64]>),
}

macro_rules! data_from_vec {
    ($($variant:ident: $ty:ty),* $(,)?) => {
        $(impl From<Vec<$ty>> for VolumeData {
            fn from(v: Vec<$ty>) -> Self {
                VolumeData::$variant(v.into())
            }
        })*
    };
}

data_from_vec! {
    U8: u8, I8: i8, U16: u16, I16: i16, U32: u32, I32: i32, F32: f32, F64: f64,
}

impl VolumeData {
    /// Reinterpret a raw byte buffer as samples of the given type. The byte
    /// length must be a multiple of the element size; elements are taken in
    /// native byte order.
    pub fn from_bytes(ty: ScalarType, bytes: &[u8]) -> Result<Self, ProbeError> {
        if bytes.len() % ty.size_of() != 0 {
            return Err(ProbeError::VolumeLength {
                expected: bytes.len() / ty.size_of() * ty.size_of(),
                got: bytes.len(),
            });
        }
        fn cast<T: bytemuck::Pod>(bytes: &[u8]) -> Arc<[T]> {
            bytemuck::cast_slice::<u8, T>(bytes).to_vec().into()
        }
        Ok(match ty {
            ScalarType::U8 => VolumeData::U8(bytes.to_vec().into()),
            ScalarType::I8 => VolumeData::I8(cast(bytes)),
            ScalarType::U16 => VolumeData::U16(cast(bytes)),
            ScalarType::I16 => VolumeData::I16(cast(bytes)),
            ScalarType::U32 => VolumeData::U32(cast(bytes)),
            ScalarType::I32 => VolumeData::I32(cast(bytes)),
            ScalarType::F32 => VolumeData::F32(cast(bytes)),
            ScalarType::F64 => VolumeData::F64(cast(bytes)),
        })
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            VolumeData::U8(_) => ScalarType::U8,
            VolumeData::I8(_) => ScalarType::I8,
            VolumeData::U16(_) => ScalarType::U16,
            VolumeData::I16(_) => ScalarType::I16,
            VolumeData::U32(_) => ScalarType::U32,
            VolumeData::I32(_) => ScalarType::I32,
            VolumeData::F32(_) => ScalarType::F32,
            VolumeData::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VolumeData::U8(d) => d.len(),
            VolumeData::I8(d) => d.len(),
            VolumeData::U16(d) => d.len(),
            VolumeData::I16(d) => d.len(),
            VolumeData::U32(d) => d.len(),
            VolumeData::I32(d) => d.len(),
            VolumeData::F32(d) => d.len(),
            VolumeData::F64(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn lookup(&self, i: usize) -> f64 {
        match self {
            VolumeData::U8(d) => d[i] as f64,
            VolumeData::I8(d) => d[i] as f64,
            VolumeData::U16(d) => d[i] as f64,
            VolumeData::I16(d) => d[i] as f64,
            VolumeData::U32(d) => d[i] as f64,
            VolumeData::I32(d) => d[i] as f64,
            VolumeData::F32(d) => d[i] as f64,
            VolumeData::F64(d) => d[i],
        }
    }
}

/// A 3-D raster of `val_len`-tuples. Samples are laid out with the tuple
/// axis fastest, then x, then y, then z slowest.
#[derive(Clone, Debug)]
pub struct Volume {
    data: VolumeData,
    val_len: usize,
    size: [usize; 3],
    spacing: [Option<f64>; 3],
    centering: Option<Centering>,
}

impl Volume {
    pub fn new(
        data: impl Into<VolumeData>,
        val_len: usize,
        size: [usize; 3],
    ) -> Result<Self, ProbeError> {
        let data = data.into();
        let expected = val_len * size[0] * size[1] * size[2];
        if data.len() != expected {
            return Err(ProbeError::VolumeLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Volume {
            data,
            val_len,
            size,
            spacing: [None; 3],
            centering: None,
        })
    }

    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = [Some(spacing[0]), Some(spacing[1]), Some(spacing[2])];
        self
    }

    pub fn with_centering(mut self, centering: Centering) -> Self {
        self.centering = Some(centering);
        self
    }

    pub fn data(&self) -> &VolumeData {
        &self.data
    }

    pub fn val_len(&self) -> usize {
        self.val_len
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn spacing(&self) -> [Option<f64>; 3] {
        self.spacing
    }

    pub fn centering(&self) -> Option<Centering> {
        self.centering
    }

    /// Value `t` of the tuple at raster position (x, y, z).
    #[inline]
    pub fn lookup(&self, x: usize, y: usize, z: usize, t: usize) -> f64 {
        let idx = t + self.val_len * (x + self.size[0] * (y + self.size[1] * z));
        self.data.lookup(idx)
    }
}
