//! Structural comparison of two decoration sets.
//!
//! [`DecorationSet::changed_ranges`] walks the old and new set over every
//! region the text diff reports as unchanged, and collects the regions
//! where the decorations themselves disagree: those are the screen areas
//! that must be redrawn even though the text under them did not move.
//! Identical subtrees (shared between the two revisions) are stepped over
//! without producing events.
//!
//! Results come back as flat pair arrays `[from, to, from, to, ..]` in
//! new-document coordinates. Adjacent pairs closer than [`MIN_RANGE_GAP`]
//! are merged, both while collecting and in [`join_ranges`].

use crate::change::ChangedRange;
use crate::decoration::{widgets_equal, Descriptor, RangeDescriptor, Widget};
use crate::iter::{iter_deco_set_shared, EventHeap, HeapEntry, HeapItem, IteratedSet, LocalSet};
use crate::set::DecorationSet;
use std::cmp::Reverse;
use std::sync::Arc;

/// Ranges closer together than this are reported as one.
pub(crate) const MIN_RANGE_GAP: usize = 4;

/// The regions that need redrawing after an update: `content` for span
/// output, `height` for vertical layout. Both are flat `[from, to, ..]`
/// pair arrays in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyRanges {
    pub content: Vec<usize>,
    pub height: Vec<usize>,
}

impl DirtyRanges {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.height.is_empty()
    }
}

/// Append `from..to` to a flat pair array, merging with the previous pair
/// when the gap between them is below [`MIN_RANGE_GAP`].
fn add_range(from: usize, to: usize, ranges: &mut Vec<usize>) {
    if let Some(&last_to) = ranges.last() {
        if last_to + MIN_RANGE_GAP > from {
            let last = ranges.len() - 1;
            ranges[last] = ranges[last].max(to);
            return;
        }
    }
    ranges.push(from);
    ranges.push(to);
}

/// Merge two sorted flat pair arrays into one, with the same gap-merging
/// rule as range collection.
pub fn join_ranges(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut ia, mut ib) = (0, 0);
    loop {
        let (from, to) = if ia < a.len() && (ib >= b.len() || a[ia] < b[ib]) {
            let pair = (a[ia], a[ia + 1]);
            ia += 2;
            pair
        } else if ib < b.len() {
            let pair = (b[ib], b[ib + 1]);
            ib += 2;
            pair
        } else {
            break;
        };
        add_range(from, to, &mut result);
    }
    result
}

impl DecorationSet {
    /// Compare `self` (the old revision) against `other` (the new one),
    /// given the text diff between the two documents, and report which
    /// regions of the new document render differently. Regions the text
    /// diff already covers are skipped; so are subtrees the two sets share.
    pub fn changed_ranges(&self, other: &DecorationSet, text_diff: &[ChangedRange]) -> DirtyRanges {
        let mut dirty = DirtyRanges::default();
        let mut pos_a = 0usize;
        let mut pos_b = 0usize;
        for i in 0..=text_diff.len() {
            let end_b = match text_diff.get(i) {
                Some(range) => range.from_b,
                // Past the last change the documents run in parallel; cover
                // whatever either set still extends over.
                None => (pos_b + (self.length().saturating_sub(pos_a))).max(other.length()),
            };
            if pos_b < end_b && !(self.ptr_eq(other) && pos_a == pos_b) {
                DecorationSetComparison::new(self, pos_a, other, pos_b, end_b, &mut dirty).run();
            }
            let Some(range) = text_diff.get(i) else { break };
            pos_a = range.to_a;
            pos_b = range.to_b;
        }
        tracing::trace!(
            "DecorationSet.changed_ranges: {} diff ranges -> {} content / {} height pairs",
            text_diff.len(),
            dirty.content.len() / 2,
            dirty.height.len() / 2
        );
        dirty
    }
}

const SIDE_A: u8 = 0;
const SIDE_B: u8 = 1;

/// One side of a comparison: its iteration state plus everything open at
/// the current position.
struct ComparisonSide {
    stack: Vec<IteratedSet>,
    heap: EventHeap,
    active: Vec<Arc<RangeDescriptor>>,
    widgets: Vec<Arc<dyn Widget>>,
    /// Furthest end of any collapsed range opened so far, -1 when none.
    collapsed_to: i64,
}

impl ComparisonSide {
    fn new(offset: i64, set: &DecorationSet) -> ComparisonSide {
        let stack = if set.size() > 0 {
            vec![IteratedSet::new(offset, set.clone())]
        } else {
            Vec::new()
        };
        ComparisonSide {
            stack,
            heap: EventHeap::new(),
            active: Vec::new(),
            widgets: Vec::new(),
            collapsed_to: -1,
        }
    }
}

/// Walks two sets in lockstep over one gap of unchanged text, collecting
/// positions where their decorations disagree.
struct DecorationSetComparison<'a> {
    a: ComparisonSide,
    b: ComparisonSide,
    /// Current position, in new-document coordinates.
    pos: i64,
    end: i64,
    dirty: &'a mut DirtyRanges,
}

impl<'a> DecorationSetComparison<'a> {
    fn new(
        a: &DecorationSet,
        start_a: usize,
        b: &DecorationSet,
        start_b: usize,
        end_b: usize,
        dirty: &'a mut DirtyRanges,
    ) -> DecorationSetComparison<'a> {
        // Side A iterates shifted into new-document coordinates.
        let mut comparison = DecorationSetComparison {
            a: ComparisonSide::new(start_b as i64 - start_a as i64, a),
            b: ComparisonSide::new(0, b),
            pos: start_b as i64,
            end: end_b as i64,
            dirty,
        };
        comparison.forward(SIDE_A);
        comparison.forward(SIDE_B);
        comparison
    }

    fn side_mut(&mut self, which: u8) -> &mut ComparisonSide {
        if which == SIDE_A {
            &mut self.a
        } else {
            &mut self.b
        }
    }

    /// Push the next batch of local-set cursors for one side, stepping over
    /// subtrees both sides are about to visit at the same offset.
    fn forward(&mut self, which: u8) {
        let pos = self.pos;
        let (stack, other_stack, heap) = if which == SIDE_A {
            (&mut self.a.stack, &mut self.b.stack, &mut self.a.heap)
        } else {
            (&mut self.b.stack, &mut self.a.stack, &mut self.b.heap)
        };
        for cursor in iter_deco_set_shared(stack, pos, Some(other_stack)) {
            heap.push(Reverse(HeapEntry::local(cursor)));
        }
    }

    fn run(&mut self) {
        loop {
            let which = match (self.a.heap.peek(), self.b.heap.peek()) {
                (None, None) => break,
                (Some(_), None) => SIDE_A,
                (None, Some(_)) => SIDE_B,
                (Some(Reverse(ea)), Some(Reverse(eb))) => {
                    if (ea.pos, ea.bias) <= (eb.pos, eb.bias) {
                        SIDE_A
                    } else {
                        SIDE_B
                    }
                }
            };
            let Reverse(entry) = self.side_mut(which).heap.pop().expect("peeked entry");
            if entry.pos > self.end {
                break;
            }
            self.handle(which, entry);
        }
        let end = self.end;
        self.advance_pos(end);
    }

    fn handle(&mut self, which: u8, entry: HeapEntry) {
        match entry.item {
            HeapItem::Local(cursor) => {
                let deco = cursor.decoration().clone();
                let from = deco.from as i64 + cursor.offset;
                let to = deco.to as i64 + cursor.offset;
                // Events entirely behind the cursor are stale; this also
                // silences everything inside a region both sides collapse.
                if to >= self.pos {
                    match &deco.desc {
                        Descriptor::Range(range) if range.affects_spans => {
                            self.advance_pos(from);
                            self.side_mut(which).active.push(range.clone());
                            if let Some(collapsed) = range.collapsed() {
                                if let Some(widget) = collapsed.widget() {
                                    self.side_mut(which).widgets.push(widget.clone());
                                }
                                let side = self.side_mut(which);
                                side.collapsed_to = side.collapsed_to.max(to);
                                if self.a.collapsed_to > self.pos
                                    && self.b.collapsed_to > self.pos
                                {
                                    // Both sides hide this region; nothing in
                                    // it can show a difference.
                                    self.pos =
                                        self.a.collapsed_to.min(self.b.collapsed_to).min(self.end);
                                }
                            }
                            self.side_mut(which)
                                .heap
                                .push(Reverse(HeapEntry::active(to, deco.desc.clone())));
                        }
                        Descriptor::Range(_) => {}
                        Descriptor::Point(point) => {
                            if let Some(widget) = point.widget() {
                                self.advance_pos(from);
                                self.side_mut(which).widgets.push(widget.clone());
                            }
                        }
                    }
                }
                self.advance_cursor(which, cursor);
            }
            HeapItem::Active { to, desc } => {
                self.advance_pos(to);
                if let Descriptor::Range(range) = &desc {
                    let active = &mut self.side_mut(which).active;
                    if let Some(found) = active.iter().position(|r| Arc::ptr_eq(r, range)) {
                        active.remove(found);
                    }
                }
            }
        }
    }

    fn advance_cursor(&mut self, which: u8, mut cursor: LocalSet) {
        cursor.index += 1;
        if !cursor.exhausted() {
            self.side_mut(which).heap.push(Reverse(HeapEntry::local(cursor)));
            return;
        }
        if cursor.continues {
            self.forward(which);
        }
    }

    /// Move the comparison position forward, flushing any accumulated
    /// disagreement between the two sides into the dirty ranges.
    fn advance_pos(&mut self, pos: i64) {
        let pos = pos.min(self.end);
        if pos <= self.pos {
            return;
        }
        if !self.a.widgets.is_empty() || !self.b.widgets.is_empty() {
            if !compare_widget_sets(&self.a.widgets, &self.b.widgets) {
                let at = self.pos as usize;
                add_range(at, at, &mut self.dirty.content);
                add_range(at, at, &mut self.dirty.height);
            }
            self.a.widgets.clear();
            self.b.widgets.clear();
        }
        if !compare_active_sets(&self.a.active, &self.b.active) {
            let (from, to) = (self.pos as usize, pos as usize);
            add_range(from, to, &mut self.dirty.content);
            if (self.a.collapsed_to > self.pos) != (self.b.collapsed_to > self.pos) {
                add_range(from, to, &mut self.dirty.height);
            }
        }
        self.pos = pos;
    }
}

/// Whether two active-range lists render the same: equal length, and every
/// descriptor on one side has an identical or equally rendering partner on
/// the other.
fn compare_active_sets(a: &[Arc<RangeDescriptor>], b: &[Arc<RangeDescriptor>]) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|x| b.iter().any(|y| Arc::ptr_eq(x, y) || x.compare(y)))
}

fn compare_widget_sets(a: &[Arc<dyn Widget>], b: &[Arc<dyn Widget>]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| widgets_equal(x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangedRange;
    use crate::decoration::{Decoration, PointSpec, RangeSpec};
    use crate::set::DecorationFilter;
    use std::any::Any;

    #[derive(PartialEq)]
    struct Block(u32);

    impl Widget for Block {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn compare(&self, other: &dyn Widget) -> bool {
            other.as_any().downcast_ref::<Block>() == Some(self)
        }
    }

    #[test]
    fn add_range_merges_close_pairs() {
        let mut ranges = Vec::new();
        add_range(0, 5, &mut ranges);
        add_range(7, 10, &mut ranges);
        assert_eq!(ranges, vec![0, 10]);
        add_range(20, 25, &mut ranges);
        assert_eq!(ranges, vec![0, 10, 20, 25]);
        add_range(25, 24, &mut ranges);
        assert_eq!(ranges, vec![0, 10, 20, 25], "contained pairs never shrink the last range");
    }

    #[test]
    fn join_ranges_interleaves_and_merges() {
        assert_eq!(join_ranges(&[0, 5, 20, 25], &[7, 10]), vec![0, 10, 20, 25]);
        assert_eq!(join_ranges(&[], &[1, 2]), vec![1, 2]);
        assert_eq!(join_ranges(&[1, 2], &[]), vec![1, 2]);
    }

    #[test]
    fn identical_sets_report_nothing() {
        let set = DecorationSet::of(vec![
            Decoration::range(0, 10, RangeSpec::class("c")).unwrap(),
        ]);
        assert!(set.changed_ranges(&set, &[]).is_empty());
    }

    #[test]
    fn removed_range_dirties_the_unchanged_gaps() {
        let set = DecorationSet::of(vec![
            Decoration::range(0, 20, RangeSpec::class("c")).unwrap(),
        ]);
        let emptied = set.update(Vec::new(), Some(DecorationFilter::new(|_, _, _| false)));
        let dirty = set.changed_ranges(&emptied, &[ChangedRange::new(5, 15, 5, 25)]);
        assert_eq!(dirty.content, vec![0, 5, 25, 30]);
    }

    #[test]
    fn equal_fresh_descriptors_compare_equal() {
        // Two sets built independently: no shared descriptors, but the
        // rendering is the same.
        let a = DecorationSet::of(vec![
            Decoration::range(2, 8, RangeSpec::class("c")).unwrap(),
        ]);
        let b = DecorationSet::of(vec![
            Decoration::range(2, 8, RangeSpec::class("c")).unwrap(),
        ]);
        assert!(a.changed_ranges(&b, &[]).is_empty());
    }

    #[test]
    fn changes_inside_a_mutually_collapsed_region_stay_silent() {
        let mut decorations: Vec<Decoration> = (0..200)
            .map(|i| Decoration::range(2 * i, 2 * i + 2, RangeSpec::class("c")).unwrap())
            .collect();
        decorations.push(Decoration::range(3, 350, RangeSpec::collapsed()).unwrap());
        let set = DecorationSet::of(decorations);
        let grown = set.update(
            vec![Decoration::range(100, 120, RangeSpec::class("new")).unwrap()],
            None,
        );
        let dirty = set.changed_ranges(&grown, &[]);
        assert!(dirty.is_empty(), "hidden content never dirties: {dirty:?}");
    }

    #[test]
    fn collapse_extending_past_the_old_one_is_reported() {
        let set = DecorationSet::of(vec![
            Decoration::range(3, 50, RangeSpec::collapsed()).unwrap(),
        ]);
        let grown = set.update(
            vec![Decoration::range(40, 80, RangeSpec::collapsed()).unwrap()],
            None,
        );
        let dirty = set.changed_ranges(&grown, &[]);
        assert_eq!(dirty.content, vec![50, 80]);
        assert_eq!(dirty.height, vec![50, 80]);
    }

    #[test]
    fn widget_changes_report_a_point() {
        let shared = Decoration::range(8, 10, RangeSpec::class("c")).unwrap();
        let set = DecorationSet::of(vec![
            Decoration::point(5, PointSpec::widget(0, Arc::new(Block(1)))),
            shared,
        ]);
        let grown = set.update(
            vec![Decoration::point(5, PointSpec::widget(1, Arc::new(Block(2))))],
            None,
        );
        let dirty = set.changed_ranges(&grown, &[]);
        assert_eq!(dirty.content, vec![5, 5]);
        assert_eq!(dirty.height, vec![5, 5]);
    }

    #[test]
    fn shared_subtrees_are_skipped_wholesale() {
        let set = DecorationSet::of(
            (0..2000)
                .map(|i| Decoration::range(i, i + 1, RangeSpec::class("c")).unwrap())
                .collect(),
        );
        // Touch only the tail; everything before stays shared.
        let touched = set.update(
            vec![Decoration::range(1990, 1995, RangeSpec::class("x")).unwrap()],
            None,
        );
        let dirty = set.changed_ranges(&touched, &[]);
        assert_eq!(dirty.content, vec![1990, 1995]);
    }
}
