//! The kind abstraction: what the values in a volume mean and which
//! quantities ("items") can be measured from them.
//!
//! A kind supplies an item table describing every measurable quantity (its
//! answer length, derivative needs, prerequisites) plus the two per-probe
//! stages: `filter` turns the cached value neighborhood into filtered
//! derivatives, `answer` turns those into the queried items.

use std::fmt;

use crate::binding::VolumeBinding;
use crate::context::ProbeParams;
use crate::error::ProbeError;
use crate::kernel::KernelRole;
use crate::shape::VolumeShape;

/// Maximum number of prerequisite items one item may list.
pub const ITEM_PREREQ_MAX: usize = 8;

/// One row of a kind's item table. Index 0 of the table is reserved and
/// never a real item, so 0 doubles as "none" in `prereq` and `parent_item`.
#[derive(Clone, Copy, Debug)]
pub struct ItemEntry {
    /// Number of doubles in this item's answer.
    pub answer_length: usize,
    /// Highest derivative order needed to compute it (0, 1, or 2).
    pub need_deriv: u8,
    /// Items that must be computed first; 0-padded.
    pub prereq: [usize; ITEM_PREREQ_MAX],
    /// If nonzero, this item is a sub-range of its parent's answer.
    pub parent_item: usize,
    /// Offset within the parent's answer.
    pub parent_index: usize,
    /// Whether computing this item requires per-binding auxiliary data.
    pub needs_data: bool,
}

impl ItemEntry {
    pub const fn leaf(answer_length: usize, need_deriv: u8, prereq: [usize; ITEM_PREREQ_MAX]) -> Self {
        ItemEntry {
            answer_length,
            need_deriv,
            prereq,
            parent_item: 0,
            parent_index: 0,
            needs_data: false,
        }
    }

    pub const fn child(
        answer_length: usize,
        need_deriv: u8,
        prereq: [usize; ITEM_PREREQ_MAX],
        parent_item: usize,
        parent_index: usize,
    ) -> Self {
        ItemEntry {
            answer_length,
            need_deriv,
            prereq,
            parent_item,
            parent_index,
            needs_data: false,
        }
    }
}

/// Optional per-binding auxiliary state a kind may need (for example a
/// precomputed lookup structure). Cloned along with context copies and
/// refreshed after each `update`.
pub trait BindingData: fmt::Debug + Send + Sync {
    fn clone_box(&self) -> Box<dyn BindingData>;
    /// Called at the end of a successful context update.
    fn update(&mut self);
}

impl Clone for Box<dyn BindingData> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Read-only view of the context state the per-probe stages need.
pub struct ProbeArgs<'a> {
    pub shape: &'a VolumeShape,
    pub parm: &'a ProbeParams,
    /// Filter radius; the filter diameter is `2 * radius`.
    pub radius: usize,
    /// Filter weights, `fd` per axis per kernel role, laid out as
    /// `fw[i + fd*(axis + 3*role)]`.
    pub fw: &'a [f64],
}

impl<'a> ProbeArgs<'a> {
    #[inline]
    pub fn fd(&self) -> usize {
        2 * self.radius
    }

    /// Weights of one role along one axis.
    #[inline]
    pub fn weights(&self, role: KernelRole, axis: usize) -> &'a [f64] {
        let fd = self.fd();
        let start = fd * (axis + 3 * role.index());
        &self.fw[start..start + fd]
    }
}

/// What a volume's values mean, and how to measure items from them.
pub trait Kind: fmt::Debug + Sync {
    fn name(&self) -> &'static str;

    /// Values per sample expected of attached volumes.
    fn val_len(&self) -> usize;

    /// The item table; entry 0 is reserved.
    fn table(&self) -> &'static [ItemEntry];

    fn item_max(&self) -> usize {
        self.table().len() - 1
    }

    /// Printable name of an item index.
    fn item_str(&self, item: usize) -> &'static str;

    /// Convolve the cached value neighborhood down to filtered values and
    /// derivatives, writing into the binding's answer buffer.
    fn filter(&self, args: &ProbeArgs, binding: &mut VolumeBinding);

    /// Compute every queried item from the filtered results.
    fn answer(&self, args: &ProbeArgs, binding: &mut VolumeBinding);

    /// Multi-line rendering of the binding's value cache, for debug output.
    fn iv3_string(&self, binding: &VolumeBinding, radius: usize) -> String {
        use std::fmt::Write as _;
        let fd = 2 * radius;
        let fddd = fd * fd * fd;
        let mut out = String::new();
        for t in 0..self.val_len() {
            if self.val_len() > 1 {
                let _ = writeln!(out, "tuple {t}:");
            }
            for z in 0..fd {
                let _ = writeln!(out, "z = {z}:");
                for y in 0..fd {
                    for x in 0..fd {
                        let v = binding.iv3[x + fd * (y + fd * z) + fddd * t];
                        let _ = write!(out, " {v:12.6}");
                    }
                    let _ = writeln!(out);
                }
            }
        }
        out
    }

    /// Fresh per-binding auxiliary data, if this kind uses any.
    fn binding_data_new(&self) -> Option<Box<dyn BindingData>> {
        None
    }
}

/// Offset of an item's answer within the kind's packed answer buffer.
/// Child items alias a sub-range of their parent.
pub fn answer_offset(table: &[ItemEntry], item: usize) -> usize {
    let entry = &table[item];
    if entry.parent_item != 0 {
        return answer_offset(table, entry.parent_item) + entry.parent_index;
    }
    table[1..item]
        .iter()
        .filter(|e| e.parent_item == 0)
        .map(|e| e.answer_length)
        .sum()
}

pub fn answer_length(table: &[ItemEntry], item: usize) -> usize {
    table[item].answer_length
}

/// Total length of the packed answer buffer (parentless items only; child
/// items alias their parents).
pub fn total_answer_length(table: &[ItemEntry]) -> usize {
    table[1..]
        .iter()
        .filter(|e| e.parent_item == 0)
        .map(|e| e.answer_length)
        .sum()
}

/// Validate a kind's item table: prerequisites must be real items (they may
/// be higher-numbered; query resolution iterates to a fixed point), parents
/// must come earlier, and child ranges must fit inside their parents.
pub fn check_kind(kind: &dyn Kind) -> Result<(), ProbeError> {
    let table = kind.table();
    let bad = |item| ProbeError::InvalidItem {
        kind: kind.name(),
        item,
    };
    if table.is_empty() {
        return Err(bad(0));
    }
    for (item, entry) in table.iter().enumerate().skip(1) {
        if entry.answer_length == 0 || entry.need_deriv > 2 {
            return Err(bad(item));
        }
        for &p in &entry.prereq {
            if p == item || p >= table.len() {
                return Err(bad(item));
            }
        }
        if entry.parent_item != 0 {
            if entry.parent_item >= item {
                return Err(bad(item));
            }
            let parent = &table[entry.parent_item];
            if entry.parent_index + entry.answer_length > parent.answer_length {
                return Err(bad(item));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const P0: [usize; ITEM_PREREQ_MAX] = [0; ITEM_PREREQ_MAX];

    fn tiny_table() -> Vec<ItemEntry> {
        vec![
            ItemEntry::leaf(0, 0, P0), // reserved
            ItemEntry::leaf(1, 0, P0),
            ItemEntry::leaf(3, 1, [1, 0, 0, 0, 0, 0, 0, 0]),
            ItemEntry::child(1, 1, [2, 0, 0, 0, 0, 0, 0, 0], 2, 1),
            ItemEntry::leaf(9, 2, P0),
        ]
    }

    #[test]
    fn offsets_pack_parentless_items() {
        let t = tiny_table();
        assert_eq!(answer_offset(&t, 1), 0);
        assert_eq!(answer_offset(&t, 2), 1);
        assert_eq!(answer_offset(&t, 4), 4);
        assert_eq!(total_answer_length(&t), 13);
    }

    #[test]
    fn child_offset_aliases_parent() {
        let t = tiny_table();
        assert_eq!(
            answer_offset(&t, 3),
            answer_offset(&t, 2) + 1,
            "child answer must sit inside the parent's range"
        );
        assert_eq!(
            total_answer_length(&t),
            13,
            "child items must not widen the buffer"
        );
    }
}
