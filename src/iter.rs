//! Traversal machinery shared by ordered emission and set comparison.
//!
//! Iteration over a [`DecorationSet`] walks an explicit stack of
//! [`IteratedSet`] entries. Each visited node first hands out its local
//! array as a [`LocalSet`] cursor, then descends into children, skipping
//! subtrees that end before the region of interest. Cursors and
//! still-open ranges both live on a min-heap keyed by `(position, bias)`,
//! with the key computed once per push.
//!
//! Offsets are signed: the comparison walks one side shifted by the
//! difference between the two documents' coordinates, which can place
//! early decorations at negative positions (they are skipped, never
//! emitted).

use crate::decoration::Decoration;
use crate::set::DecorationSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A node being iterated: its absolute start offset, how far we are into
/// its children, and whether its local array was already handed out.
pub(crate) struct IteratedSet {
    pub offset: i64,
    pub set: DecorationSet,
    index: usize,
    child_offset: i64,
    local_done: bool,
}

impl IteratedSet {
    pub fn new(offset: i64, set: DecorationSet) -> IteratedSet {
        IteratedSet {
            offset,
            set,
            index: 0,
            child_offset: offset,
            local_done: false,
        }
    }
}

/// A cursor into one node's local decoration array.
pub(crate) struct LocalSet {
    pub offset: i64,
    pub set: DecorationSet,
    pub index: usize,
    /// Whether exhausting this cursor should advance the iteration stack.
    /// Only the leaf-most cursor of a descent carries the continuation.
    pub continues: bool,
    /// Which input's stack this cursor came from.
    pub source: usize,
}

impl LocalSet {
    fn new(offset: i64, set: DecorationSet) -> LocalSet {
        LocalSet {
            offset,
            set,
            index: 0,
            continues: false,
            source: 0,
        }
    }

    pub fn decoration(&self) -> &Decoration {
        &self.set.local()[self.index]
    }

    pub fn exhausted(&self) -> bool {
        self.index >= self.set.local().len()
    }
}

/// Advance `stack` to the next leaf, collecting every non-empty local
/// array passed on the way. The last cursor returned is the continuation
/// point. Children ending before `skip_to` are not entered.
pub(crate) fn iter_deco_set(stack: &mut Vec<IteratedSet>, skip_to: i64) -> Vec<LocalSet> {
    iter_deco_set_shared(stack, skip_to, None)
}

/// Like [`iter_deco_set`], but for lockstep iteration of two trees: when
/// the child about to be entered is the identical subtree the other stack
/// is about to enter at the same offset, both stacks step over it.
/// Structurally shared subtrees contribute the same events to both sides,
/// so skipping them changes nothing about the comparison's outcome.
pub(crate) fn iter_deco_set_shared(
    stack: &mut Vec<IteratedSet>,
    skip_to: i64,
    mut other: Option<&mut Vec<IteratedSet>>,
) -> Vec<LocalSet> {
    let mut found: Vec<LocalSet> = Vec::new();
    loop {
        let Some(top) = stack.last_mut() else { break };
        if !top.local_done {
            top.local_done = true;
            if !top.set.local().is_empty() {
                let is_leaf = top.set.children().is_empty();
                found.push(LocalSet::new(top.offset, top.set.clone()));
                if is_leaf {
                    break;
                }
            }
        }
        if top.index == top.set.children().len() {
            stack.pop();
            continue;
        }
        let child = top.set.children()[top.index].clone();
        let start = top.child_offset;
        top.index += 1;
        top.child_offset += child.length() as i64;
        if child.size() == 0 || start + (child.length() as i64) < skip_to {
            continue;
        }
        if let Some(other_stack) = other.as_deref_mut() {
            if let Some(other_top) = other_stack.last_mut() {
                if other_top.index < other_top.set.children().len()
                    && other_top.child_offset == start
                    && other_top.set.children()[other_top.index].ptr_eq(&child)
                {
                    other_top.index += 1;
                    other_top.child_offset += child.length() as i64;
                    continue;
                }
            }
        }
        stack.push(IteratedSet::new(start, child));
    }
    if let Some(last) = found.last_mut() {
        last.continues = true;
    }
    found
}

/// Something waiting on the event heap: either a cursor about to yield a
/// decoration's start, or a range waiting for its end position.
pub(crate) enum HeapItem {
    Local(LocalSet),
    Active { to: i64, desc: crate::decoration::Descriptor },
}

/// A heap entry with its `(position, bias)` key computed up front, so heap
/// comparisons never inspect the payload.
pub(crate) struct HeapEntry {
    pub pos: i64,
    pub bias: i32,
    pub item: HeapItem,
}

impl HeapEntry {
    pub fn local(cursor: LocalSet) -> HeapEntry {
        let deco = cursor.decoration();
        HeapEntry {
            pos: deco.from as i64 + cursor.offset,
            bias: deco.bias(),
            item: HeapItem::Local(cursor),
        }
    }

    /// An open range, keyed by where it will close.
    pub fn active(to: i64, desc: crate::decoration::Descriptor) -> HeapEntry {
        HeapEntry {
            pos: to,
            bias: desc.end_bias(),
            item: HeapItem::Active { to, desc },
        }
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &HeapEntry) -> bool {
        self.pos == other.pos && self.bias == other.bias
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &HeapEntry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &HeapEntry) -> Ordering {
        self.pos.cmp(&other.pos).then(self.bias.cmp(&other.bias))
    }
}

/// Min-heap of pending events.
pub(crate) type EventHeap = BinaryHeap<std::cmp::Reverse<HeapEntry>>;
