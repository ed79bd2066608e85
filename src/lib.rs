//! Persistent, mappable sets of position-annotated decorations.
//!
//! A [`DecorationSet`] stores ranged and point-wise annotations over a linear
//! text buffer in a balanced immutable tree. Nodes keep a sorted local array
//! of decorations (ranges that straddle a child boundary live in the parent)
//! and an ordered list of child subtrees, so that bulk updates, position
//! remapping through edits, ordered traversal, and structural comparison are
//! all sublinear in the number of decorations.
//!
//! Every operation returns a new set that shares untouched subtrees with its
//! input. Subtree identity (`Arc` pointer equality) is what lets
//! [`DecorationSet::changed_ranges`] walk two revisions in lockstep and skip
//! everything they have in common.
//!
//! The crate stores no text. Edits arrive as [`Change`] values describing
//! replaced ranges, and the text diff between two revisions arrives as
//! [`ChangedRange`] tuples.

mod change;
mod compare;
mod decoration;
mod iter;
mod line_builder;
mod set;

pub use change::{map_pos, Change, ChangedRange};
pub use compare::{join_ranges, DirtyRanges};
pub use decoration::{
    Collapsed, Decoration, DecorationError, Descriptor, PointDescriptor, PointSpec,
    RangeDescriptor, RangeSpec, Widget,
};
pub use line_builder::{build_line_elements, LineElementBuilder};
pub use set::{DecorationFilter, DecorationSet};
