//! The scalar kind: one value per sample, and every differential quantity
//! measurable from it, from plain interpolation up to the curvature of
//! isosurfaces and flow lines.

mod answer;
mod filter;

use std::str::FromStr;

use crate::binding::VolumeBinding;
use crate::kind::{ItemEntry, Kind, ProbeArgs, ITEM_PREREQ_MAX};

/// Items measurable from a scalar volume. Discriminants are the item
/// indices used in queries and the item table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ScalarItem {
    /// Interpolated value.
    Value = 1,
    /// Gradient vector, world space.
    GradVec = 2,
    /// Gradient magnitude.
    GradMag = 3,
    /// Unit normal (normalized gradient; zero where the gradient vanishes).
    Normal = 4,
    /// Projection onto the plane perpendicular to the normal.
    NPerp = 5,
    /// Hessian matrix, world space.
    Hessian = 6,
    /// Trace of the Hessian.
    Laplacian = 7,
    /// Frobenius norm of the Hessian.
    HessFrob = 8,
    /// Hessian eigenvalues, descending.
    HessEval = 9,
    HessEval0 = 10,
    HessEval1 = 11,
    HessEval2 = 12,
    /// Hessian eigenvectors, rows matching the eigenvalues.
    HessEvec = 13,
    HessEvec0 = 14,
    HessEvec1 = 15,
    HessEvec2 = 16,
    /// Second directional derivative along the normal.
    SecondDD = 17,
    /// Isosurface geometry tensor.
    GeomTens = 18,
    /// Principal curvatures of the isosurface, K1 >= K2.
    K1 = 19,
    K2 = 20,
    /// Total curvature (Frobenius norm of the geometry tensor).
    TotalCurv = 21,
    /// Trace of the geometry tensor over its norm.
    ShapeTrace = 22,
    /// Koenderink shape index.
    ShapeIndex = 23,
    MeanCurv = 24,
    GaussCurv = 25,
    /// Principal curvature directions.
    CurvDir1 = 26,
    CurvDir2 = 27,
    /// Curvature of the gradient flow line.
    FlowlineCurv = 28,
    /// Weighted median of the value neighborhood.
    Median = 29,
    /// Frangi-style valley (dark tube) measure from Hessian eigenvalues.
    Valleyness = 30,
    /// Frangi-style ridge (bright tube) measure.
    Ridgeness = 31,
    /// Hessian eigenvalue mode.
    Mode = 32,
}

impl FromStr for ScalarItem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ScalarItem::*;
        Ok(match s {
            "v" | "val" | "value" => Value,
            "grad" | "gvec" | "gradvec" => GradVec,
            "gm" | "gmag" | "gradmag" => GradMag,
            "n" | "norm" | "normal" => Normal,
            "np" | "nperp" => NPerp,
            "h" | "hess" | "hessian" => Hessian,
            "l" | "lapl" | "laplacian" => Laplacian,
            "hf" | "hessfrob" => HessFrob,
            "heval" => HessEval,
            "heval0" => HessEval0,
            "heval1" => HessEval1,
            "heval2" => HessEval2,
            "hevec" => HessEvec,
            "hevec0" => HessEvec0,
            "hevec1" => HessEvec1,
            "hevec2" => HessEvec2,
            "2d" | "2nddd" => SecondDD,
            "gten" | "geomten" | "geomtens" => GeomTens,
            "k1" => K1,
            "k2" => K2,
            "tc" | "totalcurv" => TotalCurv,
            "st" | "shapetrace" => ShapeTrace,
            "si" | "shapeindex" => ShapeIndex,
            "mc" | "meancurv" => MeanCurv,
            "gc" | "gausscurv" => GaussCurv,
            "cdir1" | "curvdir1" => CurvDir1,
            "cdir2" | "curvdir2" => CurvDir2,
            "fc" | "flowlinecurv" => FlowlineCurv,
            "med" | "median" => Median,
            "hvalley" | "valleyness" => Valleyness,
            "hridge" | "ridgeness" => Ridgeness,
            "hmode" | "mode" => Mode,
            other => return Err(format!("unknown scalar item '{other}'")),
        })
    }
}

const fn prq<const N: usize>(items: [usize; N]) -> [usize; ITEM_PREREQ_MAX] {
    let mut out = [0usize; ITEM_PREREQ_MAX];
    let mut i = 0;
    while i < N {
        out[i] = items[i];
        i += 1;
    }
    out
}

const NONE: [usize; ITEM_PREREQ_MAX] = [0; ITEM_PREREQ_MAX];

use ScalarItem as I;

/// The scalar item table; entry 0 is reserved.
static TABLE: [ItemEntry; 33] = [
    ItemEntry::leaf(0, 0, NONE),
    ItemEntry::leaf(1, 0, NONE),                               // Value
    ItemEntry::leaf(3, 1, NONE),                               // GradVec
    ItemEntry::leaf(1, 1, prq([I::GradVec as usize])),         // GradMag
    ItemEntry::leaf(3, 1, prq([I::GradVec as usize, I::GradMag as usize])), // Normal
    ItemEntry::leaf(9, 1, prq([I::Normal as usize])),          // NPerp
    ItemEntry::leaf(9, 2, NONE),                               // Hessian
    ItemEntry::leaf(1, 2, prq([I::Hessian as usize])),         // Laplacian
    ItemEntry::leaf(1, 2, prq([I::Hessian as usize])),         // HessFrob
    ItemEntry::leaf(3, 2, prq([I::Hessian as usize])),         // HessEval
    ItemEntry::child(1, 2, prq([I::HessEval as usize]), I::HessEval as usize, 0),
    ItemEntry::child(1, 2, prq([I::HessEval as usize]), I::HessEval as usize, 1),
    ItemEntry::child(1, 2, prq([I::HessEval as usize]), I::HessEval as usize, 2),
    ItemEntry::leaf(9, 2, prq([I::Hessian as usize, I::HessEval as usize])), // HessEvec
    ItemEntry::child(3, 2, prq([I::HessEvec as usize]), I::HessEvec as usize, 0),
    ItemEntry::child(3, 2, prq([I::HessEvec as usize]), I::HessEvec as usize, 3),
    ItemEntry::child(3, 2, prq([I::HessEvec as usize]), I::HessEvec as usize, 6),
    ItemEntry::leaf(1, 2, prq([I::Hessian as usize, I::Normal as usize])), // SecondDD
    ItemEntry::leaf(
        9,
        2,
        prq([
            I::GradMag as usize,
            I::Normal as usize,
            I::NPerp as usize,
            I::Hessian as usize,
        ]),
    ), // GeomTens
    ItemEntry::leaf(1, 2, prq([I::TotalCurv as usize, I::ShapeTrace as usize])), // K1
    ItemEntry::leaf(1, 2, prq([I::TotalCurv as usize, I::ShapeTrace as usize])), // K2
    ItemEntry::leaf(1, 2, prq([I::GeomTens as usize])),        // TotalCurv
    ItemEntry::leaf(1, 2, prq([I::GeomTens as usize, I::TotalCurv as usize])), // ShapeTrace
    ItemEntry::leaf(1, 2, prq([I::K1 as usize, I::K2 as usize])), // ShapeIndex
    ItemEntry::leaf(1, 2, prq([I::K1 as usize, I::K2 as usize])), // MeanCurv
    ItemEntry::leaf(1, 2, prq([I::K1 as usize, I::K2 as usize])), // GaussCurv
    ItemEntry::leaf(
        3,
        2,
        prq([I::GeomTens as usize, I::K1 as usize, I::K2 as usize]),
    ), // CurvDir1
    ItemEntry::leaf(
        3,
        2,
        prq([I::GeomTens as usize, I::K1 as usize, I::K2 as usize]),
    ), // CurvDir2
    ItemEntry::leaf(1, 2, prq([I::NPerp as usize, I::GeomTens as usize])), // FlowlineCurv
    ItemEntry::leaf(1, 0, NONE),                               // Median
    ItemEntry::leaf(1, 2, prq([I::HessEval as usize])),        // Valleyness
    ItemEntry::leaf(1, 2, prq([I::HessEval as usize])),        // Ridgeness
    ItemEntry::leaf(1, 2, prq([I::HessEval as usize])),        // Mode
];

/// The scalar kind singleton.
pub static SCALAR: ScalarKind = ScalarKind;

#[derive(Debug)]
pub struct ScalarKind;

impl Kind for ScalarKind {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn val_len(&self) -> usize {
        1
    }

    fn table(&self) -> &'static [ItemEntry] {
        &TABLE
    }

    fn item_str(&self, item: usize) -> &'static str {
        use ScalarItem::*;
        const NAMES: [(ScalarItem, &str); 32] = [
            (Value, "value"),
            (GradVec, "gradvec"),
            (GradMag, "gradmag"),
            (Normal, "normal"),
            (NPerp, "nperp"),
            (Hessian, "hessian"),
            (Laplacian, "laplacian"),
            (HessFrob, "hessfrob"),
            (HessEval, "heval"),
            (HessEval0, "heval0"),
            (HessEval1, "heval1"),
            (HessEval2, "heval2"),
            (HessEvec, "hevec"),
            (HessEvec0, "hevec0"),
            (HessEvec1, "hevec1"),
            (HessEvec2, "hevec2"),
            (SecondDD, "2nddd"),
            (GeomTens, "geomtens"),
            (K1, "k1"),
            (K2, "k2"),
            (TotalCurv, "totalcurv"),
            (ShapeTrace, "shapetrace"),
            (ShapeIndex, "shapeindex"),
            (MeanCurv, "meancurv"),
            (GaussCurv, "gausscurv"),
            (CurvDir1, "curvdir1"),
            (CurvDir2, "curvdir2"),
            (FlowlineCurv, "flowlinecurv"),
            (Median, "median"),
            (Valleyness, "valleyness"),
            (Ridgeness, "ridgeness"),
            (Mode, "mode"),
        ];
        for (it, name) in NAMES {
            if it as usize == item {
                return name;
            }
        }
        "unknown"
    }

    fn filter(&self, args: &ProbeArgs, binding: &mut VolumeBinding) {
        filter::filter(args, binding);
    }

    fn answer(&self, args: &ProbeArgs, binding: &mut VolumeBinding) {
        answer::answer(args, binding);
    }
}
