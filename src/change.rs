//! Edit descriptions and position mapping.
//!
//! A [`Change`] replaces the range `from..to` with `inserted` new units of
//! text. Sequences of changes are ordered: each change is expressed in the
//! coordinates produced by the changes before it. Mapping a position through
//! a change takes an association (`assoc`): a negative association sticks to
//! the text before an insertion at that exact position, a positive one to the
//! text after it.

use std::ops::Range;

/// A single replacement in the document: `from..to` is removed and
/// `inserted` units of new text take its place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Change {
    /// Start of the replaced range.
    pub from: usize,
    /// End of the replaced range (exclusive).
    pub to: usize,
    /// Length of the inserted text.
    pub inserted: usize,
}

impl Change {
    /// Create a change replacing `from..to` with `inserted` units.
    pub fn new(from: usize, to: usize, inserted: usize) -> Self {
        debug_assert!(from <= to, "replaced range is reversed: {from}..{to}");
        Self { from, to, inserted }
    }

    /// A pure insertion at `pos`.
    pub fn insert(pos: usize, len: usize) -> Self {
        Self::new(pos, pos, len)
    }

    /// A pure deletion of `range`.
    pub fn delete(range: Range<usize>) -> Self {
        Self::new(range.start, range.end, 0)
    }

    /// How much this change grows (positive) or shrinks (negative) the
    /// document.
    pub fn len_delta(&self) -> i64 {
        self.inserted as i64 - (self.to - self.from) as i64
    }

    /// Map `pos` through this change.
    ///
    /// Positions inside the replaced range are clamped to one of its sides:
    /// `assoc <= 0` keeps them at the start of the replacement, `assoc > 0`
    /// moves them past the inserted text. At the exact boundaries the
    /// association decides which side of the inserted text the position
    /// sticks to.
    pub fn map_pos(&self, pos: usize, assoc: i32) -> usize {
        if pos < self.from {
            return pos;
        }
        if pos > self.to {
            return (pos as i64 + self.len_delta()) as usize;
        }
        // On or inside the replaced range.
        let before = if pos == self.from { assoc <= 0 } else { assoc < 0 };
        if before {
            self.from
        } else {
            self.from + self.inserted
        }
    }

    /// Like [`Change::map_pos`], but returns `None` when `pos` lies strictly
    /// inside the deleted range.
    pub(crate) fn map_pos_tracking(&self, pos: usize, assoc: i32) -> Option<usize> {
        if pos > self.from && pos < self.to {
            return None;
        }
        Some(self.map_pos(pos, assoc))
    }
}

/// Map `pos` through a sequence of changes.
pub fn map_pos(changes: &[Change], pos: usize, assoc: i32) -> usize {
    changes
        .iter()
        .fold(pos, |pos, change| change.map_pos(pos, assoc))
}

/// Map `pos` through a sequence of changes, reporting deletion: the result
/// is `None` as soon as the position falls strictly inside a removed range.
pub(crate) fn map_pos_tracking(changes: &[Change], pos: usize, assoc: i32) -> Option<usize> {
    let mut pos = pos;
    for change in changes {
        pos = change.map_pos_tracking(pos, assoc)?;
    }
    Some(pos)
}

/// Whether any change overlaps `from..=to`, with both endpoints given in
/// the coordinates of the original document. Positions are shifted forward
/// through each non-overlapping change so later changes are compared in the
/// right coordinate space.
pub(crate) fn touches_changes(from: usize, to: usize, changes: &[Change]) -> bool {
    let (mut from, mut to) = (from as i64, to as i64);
    for change in changes {
        if change.to as i64 >= from && change.from as i64 <= to {
            return true;
        }
        let diff = change.len_delta();
        if from > change.to as i64 {
            from += diff;
        }
        if to > change.to as i64 {
            to += diff;
        }
    }
    false
}

/// A region that differs between two revisions of a document:
/// `from_a..to_a` in the old text corresponds to `from_b..to_b` in the new
/// text. Produced by a text differ, consumed by
/// [`DecorationSet::changed_ranges`](crate::DecorationSet::changed_ranges).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangedRange {
    pub from_a: usize,
    pub to_a: usize,
    pub from_b: usize,
    pub to_b: usize,
}

impl ChangedRange {
    pub fn new(from_a: usize, to_a: usize, from_b: usize, to_b: usize) -> Self {
        Self {
            from_a,
            to_a,
            from_b,
            to_b,
        }
    }
}
