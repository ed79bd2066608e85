//! The decoration tree.
//!
//! A [`DecorationSet`] is an immutable balanced tree. Every node stores a
//! sorted array of decorations local to it plus an ordered list of child
//! subtrees; a decoration lives in the lowest node whose extent fully
//! contains it, so ranges that straddle a child boundary stay in the parent.
//! Leaves hold up to [`BASE_NODE_SIZE`] decorations.
//!
//! Sets are never mutated. `update` and `map` build replacement trees that
//! share every untouched subtree with the input (`Arc` identity), which is
//! what makes the structural comparison in [`crate::compare`] able to skip
//! common subtrees wholesale.

use crate::change::{self, Change};
use crate::decoration::{cmp_by_pos, insert_sorted, Decoration, Descriptor};
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::sync::Arc;

/// Target capacity for leaf nodes. Leaves past this size are split and
/// small nodes are flattened back into leaves.
pub(crate) const BASE_NODE_SIZE: usize = 32;

/// `size >> BASE_NODE_SIZE_SHIFT` is the target child size when splitting a
/// node into subtrees.
const BASE_NODE_SIZE_SHIFT: u32 = 5;

struct SetNode {
    /// Text length covered by this subtree.
    length: usize,
    /// Total decoration count in this subtree.
    size: usize,
    /// Decorations local to this node, sorted by `(from, bias)`, with
    /// positions relative to the node's start.
    local: Vec<Decoration>,
    /// Child subtrees, in order. Their lengths sum to at most `length`.
    children: Vec<DecorationSet>,
}

/// A persistent set of decorations over a text buffer.
#[derive(Clone)]
pub struct DecorationSet(Arc<SetNode>);

static EMPTY: Lazy<DecorationSet> = Lazy::new(|| {
    DecorationSet(Arc::new(SetNode {
        length: 0,
        size: 0,
        local: Vec::new(),
        children: Vec::new(),
    }))
});

/// A predicate deciding which existing decorations an
/// [`DecorationSet::update`] keeps, restricted to a window of the document.
/// Decorations entirely outside the window are always kept.
pub struct DecorationFilter<'a> {
    from: usize,
    to: usize,
    predicate: Box<dyn FnMut(usize, usize, &Descriptor) -> bool + 'a>,
}

impl<'a> DecorationFilter<'a> {
    /// Filter the whole set with `predicate`.
    pub fn new(predicate: impl FnMut(usize, usize, &Descriptor) -> bool + 'a) -> Self {
        Self::within(0, usize::MAX, predicate)
    }

    /// Filter only decorations overlapping `from..=to`.
    pub fn within(
        from: usize,
        to: usize,
        predicate: impl FnMut(usize, usize, &Descriptor) -> bool + 'a,
    ) -> Self {
        Self {
            from,
            to,
            predicate: Box::new(predicate),
        }
    }
}

impl DecorationSet {
    /// The shared empty set.
    pub fn empty() -> DecorationSet {
        EMPTY.clone()
    }

    /// Build a set from a collection of decorations.
    pub fn of(decorations: Vec<Decoration>) -> DecorationSet {
        if decorations.is_empty() {
            return DecorationSet::empty();
        }
        DecorationSet::empty().update(decorations, None)
    }

    /// Text length covered by this set.
    pub fn length(&self) -> usize {
        self.0.length
    }

    /// Number of decorations in this set.
    pub fn size(&self) -> usize {
        self.0.size
    }

    pub fn is_empty(&self) -> bool {
        self.0.size == 0
    }

    /// Whether two sets are the same object. Untouched subtrees keep their
    /// identity through `update` and `map`, so this is how consumers detect
    /// sharing.
    pub fn ptr_eq(&self, other: &DecorationSet) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn local(&self) -> &[Decoration] {
        &self.0.local
    }

    pub(crate) fn children(&self) -> &[DecorationSet] {
        &self.0.children
    }

    fn is_leaf(&self) -> bool {
        self.0.children.is_empty()
    }

    fn node(
        length: usize,
        size: usize,
        local: Vec<Decoration>,
        children: Vec<DecorationSet>,
    ) -> DecorationSet {
        debug_assert!(
            local
                .windows(2)
                .all(|w| cmp_by_pos(&w[0], &w[1]) != std::cmp::Ordering::Greater),
            "node locals must stay sorted by (from, bias)"
        );
        debug_assert!(local.iter().all(|d| d.to <= length));
        debug_assert_eq!(
            size,
            local.len() + children.iter().map(DecorationSet::size).sum::<usize>()
        );
        debug_assert!(children.iter().map(DecorationSet::length).sum::<usize>() <= length);
        DecorationSet(Arc::new(SetNode {
            length,
            size,
            local,
            children,
        }))
    }

    /// The same content covering `extra` more text at the end.
    pub(crate) fn grow(&self, extra: usize) -> DecorationSet {
        if extra == 0 {
            return self.clone();
        }
        DecorationSet::node(
            self.0.length + extra,
            self.0.size,
            self.0.local.clone(),
            self.0.children.clone(),
        )
    }

    fn resized(&self, length: usize) -> DecorationSet {
        DecorationSet::node(length, self.0.size, self.0.local.clone(), self.0.children.clone())
    }

    /// Return a new set with `decorations` added and, when `filter` is
    /// given, existing decorations inside the filter window kept only if the
    /// predicate approves them. Untouched subtrees are shared with `self`;
    /// an update that changes nothing returns `self` itself.
    pub fn update(
        &self,
        mut decorations: Vec<Decoration>,
        mut filter: Option<DecorationFilter>,
    ) -> DecorationSet {
        let length = decorations.iter().fold(self.length(), |len, d| len.max(d.to));
        decorations.sort_by(cmp_by_pos);
        tracing::trace!(
            "DecorationSet.update: {} additions into {} existing",
            decorations.len(),
            self.size()
        );
        self.update_inner(&decorations, &mut filter, 0, length)
    }

    /// `decorations` must be sorted by `(from, bias)` and use absolute
    /// positions; `offset` is this node's absolute start and `length` its
    /// new extent.
    fn update_inner(
        &self,
        decorations: &[Decoration],
        filter: &mut Option<DecorationFilter>,
        offset: usize,
        length: usize,
    ) -> DecorationSet {
        let node = &*self.0;
        let mut local = filter_locals(&node.local, filter, offset);
        let mut children: Option<Vec<DecorationSet>> = None;

        let mut pos = offset;
        let mut dec_i = 0;
        for (i, child) in node.children.iter().enumerate() {
            let end_pos = pos + child.length();
            let mut child_decos: Vec<Decoration> = Vec::new();
            while let Some(next) = decorations.get(dec_i) {
                if next.from >= end_pos {
                    break;
                }
                dec_i += 1;
                if next.to > end_pos {
                    // Straddles the child boundary; keep it local.
                    let local = local.get_or_insert_with(|| node.local.clone());
                    insert_sorted(local, next.moved(-(offset as i64)));
                } else {
                    child_decos.push(next.clone());
                }
            }
            let filter_hits = filter
                .as_ref()
                .is_some_and(|f| f.from <= end_pos && f.to >= pos);
            let new_child = if !child_decos.is_empty() || filter_hits {
                child.update_inner(&child_decos, filter, pos, child.length())
            } else {
                child.clone()
            };
            if !new_child.ptr_eq(child) {
                children
                    .get_or_insert_with(|| node.children[..i].to_vec())
                    .push(new_child);
            } else if let Some(children) = children.as_mut() {
                children.push(new_child);
            }
            pos = end_pos;
        }

        if local.is_none() && children.is_none() && dec_i == decorations.len() {
            return self.clone();
        }

        let size = local.as_ref().map_or(node.local.len(), Vec::len)
            + children
                .as_deref()
                .unwrap_or(&node.children)
                .iter()
                .map(DecorationSet::size)
                .sum::<usize>()
            + (decorations.len() - dec_i);

        if size <= BASE_NODE_SIZE {
            return collapse_set(
                children.unwrap_or_else(|| node.children.clone()),
                local.unwrap_or_else(|| node.local.clone()),
                &decorations[dec_i..],
                offset,
                length,
            );
        }

        let child_size = BASE_NODE_SIZE.max(size >> BASE_NODE_SIZE_SHIFT);
        let children_touched = children.is_some() || dec_i < decorations.len();
        let mut local = local.unwrap_or_else(|| node.local.clone());
        let mut children = children.unwrap_or_else(|| node.children.clone());

        if dec_i < decorations.len() {
            append_decorations(
                &mut local,
                &mut children,
                &decorations[dec_i..],
                offset,
                length,
                pos,
                child_size,
            );
        }
        if children_touched {
            rebalance_children(&mut local, &mut children, child_size);
        }

        DecorationSet::node(length, size, local, children)
    }

    /// Map every decoration through `changes`, dropping the ones whose
    /// range disappears, and return the remapped set. Subtrees no change
    /// touches are shared with `self`.
    pub fn map(&self, changes: &[Change]) -> DecorationSet {
        if changes.is_empty() || self.size() == 0 {
            return self.clone();
        }
        tracing::trace!(
            "DecorationSet.map: {} changes over {} decorations",
            changes.len(),
            self.size()
        );
        let new_length = change::map_pos(changes, self.length(), 1);
        let (set, escaped) = self.map_inner(changes, 0, 0, new_length);
        debug_assert!(
            escaped.is_empty(),
            "the mapped root covers all surviving decorations"
        );
        if set.size() == 0 {
            return DecorationSet::empty();
        }
        set
    }

    /// Returns the mapped subtree plus the decorations whose mapped
    /// positions fell outside `new_offset..new_end` (absolute new-document
    /// coordinates); the caller decides where those land.
    fn map_inner(
        &self,
        changes: &[Change],
        old_offset: usize,
        new_offset: usize,
        new_end: usize,
    ) -> (DecorationSet, SmallVec<[Decoration; 4]>) {
        let node = &*self.0;
        let length = new_end - new_offset;
        let mut escaped: SmallVec<[Decoration; 4]> = SmallVec::new();
        let mut local: Vec<Decoration> = Vec::with_capacity(node.local.len());
        let mut local_changed = false;

        for deco in &node.local {
            match deco.map(changes, old_offset) {
                None => local_changed = true,
                Some((from, to)) => {
                    if from < new_offset || to > new_end {
                        escaped.push(Decoration {
                            from,
                            to,
                            desc: deco.desc.clone(),
                        });
                        local_changed = true;
                    } else {
                        let (from, to) = (from - new_offset, to - new_offset);
                        if from != deco.from || to != deco.to {
                            local_changed = true;
                        }
                        local.push(Decoration {
                            from,
                            to,
                            desc: deco.desc.clone(),
                        });
                    }
                }
            }
        }

        let mut children: Vec<DecorationSet> = Vec::with_capacity(node.children.len());
        let mut children_changed = false;
        let mut old_pos = old_offset;
        let mut new_pos = new_offset;
        for child in &node.children {
            let old_end = old_pos + child.length();
            let new_child_end = change::map_pos(changes, old_end, 1);
            let new_child = if change::touches_changes(old_pos, old_end, changes) {
                let (mapped, child_escaped) =
                    child.map_inner(changes, old_pos, new_pos, new_child_end);
                for deco in child_escaped {
                    if deco.from >= new_offset && deco.to <= new_end {
                        insert_sorted(&mut local, deco.moved(-(new_offset as i64)));
                        local_changed = true;
                    } else {
                        escaped.push(deco);
                    }
                }
                mapped
            } else if new_child_end - new_pos != child.length() {
                child.resized(new_child_end - new_pos)
            } else {
                child.clone()
            };

            if !new_child.ptr_eq(child) {
                children_changed = true;
                if new_child.size() == 0 {
                    // The mapping emptied this child. Its length has to stay
                    // covered, so merge it into the previous sibling when
                    // there is one.
                    match children.last_mut() {
                        Some(prev) => *prev = prev.grow(new_child.length()),
                        None => children.push(DecorationSet::node(
                            new_child.length(),
                            0,
                            Vec::new(),
                            Vec::new(),
                        )),
                    }
                } else {
                    children.push(new_child);
                }
            } else {
                children.push(new_child);
            }
            old_pos = old_end;
            new_pos = new_child_end;
        }

        if !local_changed && !children_changed && escaped.is_empty() && length == node.length {
            return (self.clone(), escaped);
        }

        let size = local.len() + children.iter().map(DecorationSet::size).sum::<usize>();
        (DecorationSet::node(length, size, local, children), escaped)
    }

    /// All decorations in the set, in `(from, bias)` order, with absolute
    /// positions.
    pub fn collect(&self) -> Vec<Decoration> {
        let mut all = Vec::with_capacity(self.size());
        self.collect_into(&mut all, 0);
        all.sort_by(cmp_by_pos);
        all
    }

    pub(crate) fn collect_into(&self, target: &mut Vec<Decoration>, offset: i64) {
        let node = &*self.0;
        for deco in &node.local {
            target.push(deco.moved(offset));
        }
        let mut off = offset;
        for child in &node.children {
            child.collect_into(target, off);
            off += child.length() as i64;
        }
    }
}

impl std::fmt::Debug for DecorationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationSet")
            .field("length", &self.0.length)
            .field("size", &self.0.size)
            .field("local", &self.0.local.len())
            .field("children", &self.0.children.len())
            .finish()
    }
}

/// Apply `filter` to a local array. `None` means nothing was dropped and
/// the original array stands.
fn filter_locals(
    local: &[Decoration],
    filter: &mut Option<DecorationFilter>,
    offset: usize,
) -> Option<Vec<Decoration>> {
    let f = filter.as_mut()?;
    let mut copy: Option<Vec<Decoration>> = None;
    for (i, deco) in local.iter().enumerate() {
        let (from, to) = (deco.from + offset, deco.to + offset);
        if f.from > to || f.to < from || (f.predicate)(from, to, &deco.desc) {
            if let Some(copy) = copy.as_mut() {
                copy.push(deco.clone());
            }
        } else if copy.is_none() {
            copy = Some(local[..i].to_vec());
        }
    }
    copy
}

/// Flatten a small node into a single leaf: collect every child, add the
/// remaining additions, and sort.
fn collapse_set(
    children: Vec<DecorationSet>,
    mut local: Vec<Decoration>,
    add: &[Decoration],
    offset: usize,
    length: usize,
) -> DecorationSet {
    let mut off = 0i64;
    for child in &children {
        child.collect_into(&mut local, off);
        off += child.length() as i64;
    }
    for deco in add {
        local.push(deco.moved(-(offset as i64)));
    }
    // Collected child content, straddlers, and additions interleave freely.
    local.sort_by(cmp_by_pos);
    let size = local.len();
    DecorationSet::node(length, size, local, Vec::new())
}

/// Group the additions past the last child into new trailing children of
/// roughly `child_size` decorations each. Additions crossing a group
/// boundary stay in the parent's local array.
fn append_decorations(
    local: &mut Vec<Decoration>,
    children: &mut Vec<DecorationSet>,
    decorations: &[Decoration],
    offset: usize,
    length: usize,
    mut pos: usize,
    child_size: usize,
) {
    let mut i = 0;
    while i < decorations.len() {
        let group_end = (i + child_size).min(decorations.len());
        let end_pos = if group_end == decorations.len() {
            offset + length
        } else {
            decorations[group_end].from
        };
        let mut group: Vec<Decoration> = Vec::new();
        for deco in &decorations[i..group_end] {
            if deco.to > end_pos {
                insert_sorted(local, deco.moved(-(offset as i64)));
            } else {
                group.push(deco.clone());
            }
        }
        i = group_end;
        if !group.is_empty() {
            let child =
                DecorationSet::empty().update_inner(&group, &mut None, pos, end_pos - pos);
            children.push(child);
            pos = end_pos;
        }
    }
}

/// Restore the shape constraints after an update touched `children`: drop
/// emptied children, unwrap oversized ones, merge small leaves, and wrap
/// runs of undersized children.
fn rebalance_children(
    local: &mut Vec<Decoration>,
    children: &mut Vec<DecorationSet>,
    child_size: usize,
) {
    let mut i = 0;
    let mut off = 0usize;
    while i < children.len() {
        let child = children[i].clone();
        if child.size() == 0 && i > 0 {
            // The predecessor absorbs the dropped child's length so the
            // total text coverage is unchanged.
            children.remove(i);
            children[i - 1] = children[i - 1].grow(child.length());
            off += child.length();
        } else if child.size() > child_size << 1 && child.local().len() < child.length() >> 1 {
            // Oversized wrapper: splice its children into place and lift
            // its locals up.
            for deco in child.local() {
                insert_sorted(local, deco.moved(off as i64));
            }
            children.splice(i..i + 1, child.children().iter().cloned());
        } else if i + 1 < children.len()
            && child.is_leaf()
            && children[i + 1].is_leaf()
            && child.size() + children[i + 1].size() <= BASE_NODE_SIZE
        {
            let next = children[i + 1].clone();
            let mut merged: Vec<Decoration> = child.local().to_vec();
            merged.extend(next.local().iter().map(|d| d.moved(child.length() as i64)));
            let joined = DecorationSet::node(
                child.length() + next.length(),
                child.size() + next.size(),
                merged,
                Vec::new(),
            );
            children.splice(i..i + 2, [joined]);
        } else {
            let mut join_to = i + 1;
            let mut size = child.size();
            let mut length = child.length();
            if child.size() < child_size >> 1 {
                while let Some(next) = children.get(join_to) {
                    if size + next.size() > child_size {
                        break;
                    }
                    size += next.size();
                    length += next.length();
                    join_to += 1;
                }
            }
            if join_to > i + 1 {
                let run: Vec<DecorationSet> = children[i..join_to].to_vec();
                let mut joined = DecorationSet::node(length, size, Vec::new(), run);
                // Straddlers now fully inside the wrapper move down into it.
                let mut joined_locals: Vec<Decoration> = Vec::new();
                let mut j = 0;
                while j < local.len() {
                    let deco = &local[j];
                    if deco.from >= off && deco.to <= off + length {
                        joined_locals.push(local.remove(j).moved(-(off as i64)));
                    } else {
                        j += 1;
                    }
                }
                if !joined_locals.is_empty() {
                    joined = joined.update(joined_locals, None);
                }
                children.splice(i..join_to, [joined]);
                i += 1;
                off += length;
            } else {
                i += 1;
                off += child.length();
            }
        }
    }
}

#[cfg(test)]
impl DecorationSet {
    fn depth(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(DecorationSet::depth)
            .max()
            .unwrap_or(0)
    }

    fn max_local_len(&self) -> usize {
        self.local()
            .len()
            .max(self.children().iter().map(DecorationSet::max_local_len).max().unwrap_or(0))
    }

    /// Sum of `local.len() + children.len()` over all nodes, plus the node
    /// count, for average-fill checks.
    fn fill_stats(&self) -> (usize, usize) {
        let mut fill = self.local().len() + self.children().len();
        let mut nodes = 1;
        for child in self.children() {
            let (f, n) = child.fill_stats();
            fill += f;
            nodes += n;
        }
        (fill, nodes)
    }

    fn check_invariants(&self) {
        let node = &*self.0;
        assert_eq!(
            node.size,
            node.local.len() + node.children.iter().map(DecorationSet::size).sum::<usize>(),
            "size accounts for locals plus children"
        );
        assert!(
            node.children.iter().map(DecorationSet::length).sum::<usize>() <= node.length,
            "children cover at most the node's length"
        );
        assert!(
            node.local
                .windows(2)
                .all(|w| cmp_by_pos(&w[0], &w[1]) != std::cmp::Ordering::Greater),
            "locals sorted by (from, bias)"
        );
        for deco in &node.local {
            assert!(deco.from <= deco.to && deco.to <= node.length);
        }
        for child in &node.children {
            child.check_invariants();
        }
    }
}
