//! Ordered emission of decorations into a line layout builder.
//!
//! [`build_line_elements`] merges any number of decoration sets and walks
//! the window `from..to` in position order, telling the builder where span
//! boundaries fall, where collapsed regions skip ahead, and where widgets
//! sit. Range descriptors stay in the builder's `active` list from their
//! start position until their end position.

use crate::decoration::{Descriptor, RangeDescriptor, Widget};
use crate::iter::{iter_deco_set, EventHeap, HeapEntry, HeapItem, IteratedSet, LocalSet};
use crate::set::DecorationSet;
use std::cmp::Reverse;
use std::sync::Arc;

/// The sink [`build_line_elements`] drives. `advance` moves the build
/// position forward through ordinary text, `advance_collapsed` through
/// hidden text, and `add_widget` places a widget at the current position.
/// Calls that do not move the position forward may occur and should be
/// ignored.
pub trait LineElementBuilder {
    fn advance(&mut self, pos: usize);
    fn advance_collapsed(&mut self, pos: usize);
    fn add_widget(&mut self, widget: &Arc<dyn Widget>, side: i32);
    /// The ranges currently open at the build position.
    fn active_mut(&mut self) -> &mut Vec<Arc<RangeDescriptor>>;
}

/// Walk `from..to` across all `sets` in `(position, bias)` order, driving
/// `builder`. With `height_only`, only decorations that can influence
/// vertical layout are emitted: collapsed ranges, and widgets with a known
/// height estimate.
pub fn build_line_elements(
    sets: &[DecorationSet],
    from: usize,
    to: usize,
    builder: &mut dyn LineElementBuilder,
    height_only: bool,
) {
    let mut heap: EventHeap = EventHeap::new();
    let mut stacks: Vec<Vec<IteratedSet>> = Vec::new();
    for set in sets {
        if set.size() == 0 {
            continue;
        }
        let mut stack = vec![IteratedSet::new(0, set.clone())];
        for mut cursor in iter_deco_set(&mut stack, from as i64) {
            cursor.source = stacks.len();
            heap.push(Reverse(HeapEntry::local(cursor)));
        }
        stacks.push(stack);
    }

    let mut from = from;
    while let Some(Reverse(entry)) = heap.pop() {
        match entry.item {
            HeapItem::Local(cursor) => {
                let deco = cursor.decoration().clone();
                let abs_from = deco.from as i64 + cursor.offset;
                let abs_to = deco.to as i64 + cursor.offset;
                if abs_from > to as i64 {
                    break;
                }
                if abs_to >= from as i64 {
                    match &deco.desc {
                        Descriptor::Range(range) => {
                            let relevant = if height_only {
                                range.collapsed().is_some()
                            } else {
                                range.affects_spans
                            };
                            if relevant {
                                builder.advance(abs_from as usize);
                                if let Some(collapsed) = range.collapsed() {
                                    if let Some(widget) = collapsed.widget() {
                                        builder.add_widget(widget, 0);
                                    }
                                    // The collapsed region is consumed in one
                                    // step; nothing inside it gets emitted.
                                    from = abs_to as usize;
                                    builder.advance_collapsed(from.min(to));
                                } else {
                                    builder.active_mut().push(range.clone());
                                    heap.push(Reverse(HeapEntry::active(
                                        abs_to,
                                        deco.desc.clone(),
                                    )));
                                }
                            }
                        }
                        Descriptor::Point(point) => {
                            if let Some(widget) = point.widget() {
                                if !height_only || widget.estimated_height() > -1 {
                                    builder.advance(abs_from as usize);
                                    builder.add_widget(widget, point.bias);
                                }
                            }
                        }
                    }
                }
                advance_cursor(&mut heap, &mut stacks, cursor, from as i64);
            }
            HeapItem::Active { to: abs_to, desc } => {
                if abs_to >= to as i64 {
                    break;
                }
                builder.advance(abs_to as usize);
                if let Descriptor::Range(range) = &desc {
                    let active = builder.active_mut();
                    if let Some(found) = active.iter().position(|r| Arc::ptr_eq(r, range)) {
                        active.remove(found);
                    }
                }
            }
        }
    }
    builder.advance(to);
}

/// Step a cursor past the decoration just handled; when its local array is
/// spent, resume that input's stack iteration.
fn advance_cursor(
    heap: &mut EventHeap,
    stacks: &mut [Vec<IteratedSet>],
    mut cursor: LocalSet,
    skip_to: i64,
) {
    cursor.index += 1;
    if !cursor.exhausted() {
        heap.push(Reverse(HeapEntry::local(cursor)));
        return;
    }
    if !cursor.continues {
        return;
    }
    let source = cursor.source;
    for mut next in iter_deco_set(&mut stacks[source], skip_to) {
        next.source = source;
        heap.push(Reverse(HeapEntry::local(next)));
    }
}
