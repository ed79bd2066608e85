//! End-to-end exercises of the decoration pipeline: building sets, mapping
//! them through edits, diffing revisions, and driving a line builder.

use decoration_set::{
    build_line_elements, Change, ChangedRange, Decoration, DecorationFilter, DecorationSet,
    LineElementBuilder, PointSpec, RangeDescriptor, RangeSpec, Widget,
};
use std::any::Any;
use std::sync::Arc;

fn highlight(from: usize, to: usize) -> Decoration {
    Decoration::range(from, to, RangeSpec::class("hl")).unwrap()
}

#[test]
fn an_edit_cycle_keeps_decorations_aligned() {
    let set = DecorationSet::of((0..100).map(|i| highlight(10 * i, 10 * i + 5)).collect());
    assert_eq!(set.size(), 100);

    let mapped = set.map(&[Change::insert(42, 3)]);
    assert_eq!(mapped.size(), 100);
    for (i, deco) in mapped.collect().iter().enumerate() {
        let (from, to) = (10 * i, 10 * i + 5);
        let expected = match (from, to) {
            // The insertion falls inside this range, stretching it.
            (40, 45) => (40, 48),
            _ if from >= 42 => (from + 3, to + 3),
            _ => (from, to),
        };
        assert_eq!((deco.from, deco.to), expected, "decoration {i}");
    }
}

#[test]
fn deletions_remove_swallowed_decorations() {
    let set = DecorationSet::of((0..100).map(|i| highlight(10 * i, 10 * i + 5)).collect());
    // Wipe out the decorations living entirely inside 200..400.
    let mapped = set.map(&[Change::delete(198..402)]);
    assert_eq!(mapped.size(), 80);
    let survivors = mapped.collect();
    assert!(survivors.iter().all(|d| d.from < d.to));
    assert_eq!(mapped.length(), set.length() - 204);
}

#[test]
fn mapping_agrees_with_per_decoration_position_mapping() {
    let spans: Vec<(usize, usize)> = (0..30).map(|i| (7 * i, 7 * i + 4)).collect();
    let mut set = DecorationSet::of(
        spans
            .iter()
            .map(|&(from, to)| highlight(from, to))
            .collect(),
    );
    let mut model = spans;

    let edits = [
        Change::insert(15, 4),
        Change::delete(40..55),
        Change::new(80, 90, 3),
        Change::insert(0, 2),
        Change::delete(100..101),
        Change::new(3, 3, 10),
    ];
    for edit in edits {
        let changes = [edit];
        set = set.map(&changes);
        model = model
            .iter()
            .filter_map(|&(from, to)| {
                // A class-only range is exclusive on both sides.
                let from = edit.map_pos(from, 1);
                let to = edit.map_pos(to, -1);
                (from < to).then_some((from, to))
            })
            .collect();
        let got: Vec<(usize, usize)> = set.collect().iter().map(|d| (d.from, d.to)).collect();
        assert_eq!(got, model, "after {edit:?}");
    }
}

#[test]
fn redraw_regions_follow_an_addition_through_an_edit() {
    let v1 = DecorationSet::of((0..500).map(|i| highlight(2 * i, 2 * i + 2)).collect());
    let changes = [Change::insert(100, 10)];
    let v2 = v1.map(&changes);
    let v3 = v2.update(
        vec![Decoration::range(300, 310, RangeSpec::class("sel")).unwrap()],
        None,
    );

    let dirty = v1.changed_ranges(&v3, &[ChangedRange::new(100, 100, 100, 110)]);
    assert_eq!(
        dirty.content,
        vec![300, 310],
        "only the fresh selection needs redrawing"
    );
    assert!(dirty.height.is_empty());
}

#[test]
fn filtering_and_diffing_report_the_vacated_regions() {
    let set = DecorationSet::of(vec![
        Decoration::range(0, 20, RangeSpec::class("hl")).unwrap(),
    ]);
    let emptied = set.update(Vec::new(), Some(DecorationFilter::new(|_, _, _| false)));
    assert_eq!(emptied.size(), 0);

    let dirty = set.changed_ranges(&emptied, &[ChangedRange::new(5, 15, 5, 25)]);
    assert_eq!(dirty.content, vec![0, 5, 25, 30]);
    assert_eq!(
        decoration_set::join_ranges(&dirty.content, &[8, 12]),
        vec![0, 12, 25, 30]
    );
}

#[derive(PartialEq)]
struct Pin(&'static str);

impl Widget for Pin {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn Widget) -> bool {
        other.as_any().downcast_ref::<Pin>() == Some(self)
    }

    fn estimated_height(&self) -> i32 {
        10
    }
}

struct Events {
    log: Vec<String>,
    active: Vec<Arc<RangeDescriptor>>,
    pos: usize,
}

impl LineElementBuilder for Events {
    fn advance(&mut self, pos: usize) {
        if pos > self.pos {
            self.log.push(format!("text->{pos}"));
            self.pos = pos;
        }
    }

    fn advance_collapsed(&mut self, pos: usize) {
        if pos > self.pos {
            self.log.push(format!("hidden->{pos}"));
            self.pos = pos;
        }
    }

    fn add_widget(&mut self, widget: &Arc<dyn Widget>, side: i32) {
        let name = widget.as_any().downcast_ref::<Pin>().map_or("?", |p| p.0);
        self.log.push(format!("widget {name}/{side}"));
    }

    fn active_mut(&mut self) -> &mut Vec<Arc<RangeDescriptor>> {
        &mut self.active
    }
}

#[test]
fn multiple_sets_drive_one_builder() {
    let syntax = DecorationSet::of(vec![highlight(2, 6), highlight(10, 14)]);
    let overlays = DecorationSet::of(vec![
        Decoration::point(4, PointSpec::widget(-1, Arc::new(Pin("gutter")))),
        Decoration::range(8, 12, RangeSpec::collapsed_widget(Arc::new(Pin("fold")))).unwrap(),
    ]);

    let mut events = Events {
        log: Vec::new(),
        active: Vec::new(),
        pos: 0,
    };
    build_line_elements(&[syntax, overlays], 0, 20, &mut events, false);

    assert_eq!(
        events.log,
        vec![
            "text->2",
            "text->4",
            "widget gutter/-1",
            "text->6",
            "text->8",
            "widget fold/0",
            "hidden->12",
            "text->14",
            "text->20",
        ]
    );
    assert!(events.active.is_empty());
}
