//! A volume attached to a probing context: the volume itself, its kind, the
//! resolved query, and the per-binding scratch buffers the probe stages
//! write into.

use crate::error::ProbeError;
use crate::kind::{self, BindingData, Kind};
use crate::query::Query;
use crate::volume::Volume;

/// One attached volume and everything probed about it.
#[derive(Clone, Debug)]
pub struct VolumeBinding {
    pub(crate) kind: &'static dyn Kind,
    pub(crate) volume: Volume,
    pub(crate) query: Query,
    /// Which derivative orders the resolved query needs, by exact order.
    pub(crate) need_d: [bool; 3],
    // Dirty flags consumed by the context update.
    pub(crate) flag_volume: bool,
    pub(crate) flag_query: bool,
    pub(crate) flag_need_d: bool,
    /// Value cache: the `fd^3` neighborhood, `val_len` tuples per sample.
    pub(crate) iv3: Vec<f64>,
    /// Voxel whose neighborhood `iv3` currently holds, if any.
    pub(crate) iv3_idx: Option<[usize; 3]>,
    /// Intermediate caches for the two collapse passes of separable
    /// filtering (`fd^2` and `fd` samples).
    pub(crate) iv2: Vec<f64>,
    pub(crate) iv1: Vec<f64>,
    /// Packed answers for every item of the kind.
    pub(crate) answer: Vec<f64>,
    /// Per-item offsets into `answer`.
    offsets: Vec<usize>,
    pub(crate) data: Option<Box<dyn BindingData>>,
}

impl VolumeBinding {
    pub fn new(kind: &'static dyn Kind, volume: Volume) -> Result<Self, ProbeError> {
        if volume.val_len() != kind.val_len() {
            return Err(ProbeError::VolumeKindMismatch {
                kind: kind.name(),
                expected: kind.val_len(),
                got: volume.val_len(),
            });
        }
        let table = kind.table();
        let offsets = (0..table.len())
            .map(|item| if item == 0 { 0 } else { kind::answer_offset(table, item) })
            .collect();
        Ok(VolumeBinding {
            kind,
            volume,
            query: Query::new(),
            need_d: [false; 3],
            // A fresh binding forces cache reallocation at the next update.
            flag_volume: true,
            flag_query: false,
            flag_need_d: false,
            iv3: Vec::new(),
            iv3_idx: None,
            iv2: Vec::new(),
            iv1: Vec::new(),
            answer: vec![0.0; kind::total_answer_length(table)],
            offsets,
            data: kind.binding_data_new(),
        })
    }

    pub fn kind(&self) -> &'static dyn Kind {
        self.kind
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn query(&self) -> Query {
        self.query
    }

    pub fn need_d(&self) -> [bool; 3] {
        self.need_d
    }

    /// Replace the query. Prerequisites are pulled in until the set is
    /// closed, then items needing per-binding data are validated.
    pub fn set_query(&mut self, query: Query) -> Result<(), ProbeError> {
        let table = self.kind.table();
        let item_max = self.kind.item_max();
        for item in query.iter() {
            if item > item_max {
                return Err(ProbeError::InvalidItem {
                    kind: self.kind.name(),
                    item,
                });
            }
        }
        let mut resolved = query;
        loop {
            let mut changed = false;
            for item in (1..=item_max).rev() {
                if !resolved.test(item) {
                    continue;
                }
                for &p in &table[item].prereq {
                    if p != 0 && !resolved.test(p) {
                        resolved.set(p);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        for item in resolved.iter() {
            if table[item].needs_data && self.data.is_none() {
                return Err(ProbeError::ItemNeedsData {
                    item,
                    name: self.kind.item_str(item),
                });
            }
        }
        if resolved != self.query {
            self.query = resolved;
            self.flag_query = true;
        }
        Ok(())
    }

    /// Union more items into the query.
    pub fn add_query(&mut self, more: Query) -> Result<(), ProbeError> {
        let mut q = self.query;
        q.add(&more);
        self.set_query(q)
    }

    /// Turn on a single item (plus its prerequisites).
    pub fn item_on(&mut self, item: usize) -> Result<(), ProbeError> {
        self.add_query(Query::from_items(&[item]))
    }

    /// Recompute the exact-order derivative flags from the query.
    /// Returns true when they changed.
    pub(crate) fn refresh_need_d(&mut self) -> bool {
        let table = self.kind.table();
        let mut need_d = [false; 3];
        for item in self.query.iter() {
            need_d[table[item].need_deriv as usize] = true;
        }
        let changed = need_d != self.need_d;
        self.need_d = need_d;
        changed
    }

    /// The answer slice for one item. Valid after a successful probe; the
    /// content is meaningful only for items the query contains.
    pub fn answer(&self, item: usize) -> Result<&[f64], ProbeError> {
        if item == 0 || item > self.kind.item_max() {
            return Err(ProbeError::InvalidItem {
                kind: self.kind.name(),
                item,
            });
        }
        let off = self.offsets[item];
        let len = self.kind.table()[item].answer_length;
        Ok(&self.answer[off..off + len])
    }

    pub(crate) fn answer_offset(&self, item: usize) -> usize {
        self.offsets[item]
    }

    /// Size the scratch caches for a filter diameter `fd`.
    pub(crate) fn resize_caches(&mut self, fd: usize) {
        let vl = self.kind.val_len();
        self.iv3 = vec![0.0; vl * fd * fd * fd];
        self.iv3_idx = None;
        self.iv2 = vec![0.0; vl * fd * fd];
        self.iv1 = vec![0.0; vl * fd];
    }
}
