//! Decorations: position-annotated values attached to a buffer.
//!
//! A [`Decoration`] pairs a `from..to` range (or a single point, when the
//! two are equal) with a descriptor saying how the region behaves. Range
//! descriptors carry styling and an optional collapse, point descriptors an
//! optional widget. Both derive a *bias*: the signed weight that decides
//! which side of an insertion an endpoint sticks to, and that orders
//! decorations sharing a position. Range biases use a magnitude far above
//! any point side so that range endpoints sort outside point widgets at the
//! same position.

use crate::change::{self, Change};
use snafu::Snafu;
use std::{any::Any, cmp::Ordering, collections::HashMap, fmt, sync::Arc};

/// Bias magnitude for range endpoints. Large enough to dominate any point
/// `side` value when sorting by `(from, bias)`.
pub(crate) const RANGE_BIAS: i32 = 2_000_000_000;

/// Errors from decoration construction.
#[derive(Debug, Snafu)]
pub enum DecorationError {
    #[snafu(display("Invalid range: {from} >= {to}"))]
    InvalidRange { from: usize, to: usize },
}

/// An opaque presentational object attached to a point decoration or to a
/// collapsed range.
///
/// The core never renders widgets; it only stores handles, compares them
/// structurally, and asks for their estimated height. Renderers recover the
/// concrete type through [`Widget::as_any`].
pub trait Widget: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// Structural equality: true when `other` is the same concrete type
    /// with equal content. Typically implemented by downcasting through
    /// [`Widget::as_any`].
    fn compare(&self, other: &dyn Widget) -> bool;

    /// Estimated height in pixels, or -1 when unknown.
    fn estimated_height(&self) -> i32 {
        -1
    }
}

pub(crate) fn widgets_equal(a: &Arc<dyn Widget>, b: &Arc<dyn Widget>) -> bool {
    Arc::ptr_eq(a, b) || a.compare(b.as_ref())
}

/// How a collapsed range hides its content: plainly, or behind a
/// replacement widget.
#[derive(Clone)]
pub enum Collapsed {
    Hidden,
    Widget(Arc<dyn Widget>),
}

impl Collapsed {
    pub fn widget(&self) -> Option<&Arc<dyn Widget>> {
        match self {
            Collapsed::Hidden => None,
            Collapsed::Widget(widget) => Some(widget),
        }
    }

    fn equivalent(a: &Option<Collapsed>, b: &Option<Collapsed>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(Collapsed::Hidden), Some(Collapsed::Hidden)) => true,
            (Some(Collapsed::Widget(a)), Some(Collapsed::Widget(b))) => widgets_equal(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Collapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collapsed::Hidden => f.write_str("Hidden"),
            Collapsed::Widget(_) => f.write_str("Widget(..)"),
        }
    }
}

/// Specification for a range decoration.
#[derive(Clone, Debug, Default)]
pub struct RangeSpec {
    /// When true, the start maps with negative bias: text inserted exactly
    /// at the start becomes part of the range.
    pub inclusive_start: bool,
    /// When true, the end maps with positive bias: text inserted exactly at
    /// the end becomes part of the range.
    pub inclusive_end: bool,
    /// Attributes to add to the text spans in the range.
    pub attributes: Option<HashMap<String, String>>,
    /// Class name to add to the text spans in the range.
    pub class: Option<String>,
    /// Tag name to wrap the text spans in.
    pub tag_name: Option<String>,
    /// Attributes for the lines the range touches.
    pub line_attributes: Option<HashMap<String, String>>,
    /// When present, the range's content is hidden.
    pub collapsed: Option<Collapsed>,
}

impl RangeSpec {
    /// A spec that only sets a span class.
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            class: Some(name.into()),
            ..Self::default()
        }
    }

    /// A spec that only sets span attributes.
    pub fn attributes(attributes: HashMap<String, String>) -> Self {
        Self {
            attributes: Some(attributes),
            ..Self::default()
        }
    }

    /// A spec for a plainly collapsed range.
    pub fn collapsed() -> Self {
        Self {
            collapsed: Some(Collapsed::Hidden),
            ..Self::default()
        }
    }

    /// A spec for a range collapsed behind a replacement widget.
    pub fn collapsed_widget(widget: Arc<dyn Widget>) -> Self {
        Self {
            collapsed: Some(Collapsed::Widget(widget)),
            ..Self::default()
        }
    }
}

/// Specification for a point decoration.
#[derive(Clone, Default)]
pub struct PointSpec {
    /// Which side of inserted text the point sticks to, and how it orders
    /// against other decorations at the same position. Defaults to 0.
    pub side: i32,
    /// Widget to draw at the point.
    pub widget: Option<Arc<dyn Widget>>,
    /// Attributes for the line holding the point.
    pub line_attributes: Option<HashMap<String, String>>,
}

impl fmt::Debug for PointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointSpec")
            .field("side", &self.side)
            .field("widget", &self.widget.is_some())
            .field("line_attributes", &self.line_attributes)
            .finish()
    }
}

impl PointSpec {
    /// A spec placing `widget` at the point with the given side.
    pub fn widget(side: i32, widget: Arc<dyn Widget>) -> Self {
        Self {
            side,
            widget: Some(widget),
            ..Self::default()
        }
    }

    /// A spec that only sets line attributes.
    pub fn line_attributes(attributes: HashMap<String, String>) -> Self {
        Self {
            line_attributes: Some(attributes),
            ..Self::default()
        }
    }
}

/// A range descriptor with its derived mapping and ordering data.
#[derive(Debug)]
pub struct RangeDescriptor {
    pub spec: RangeSpec,
    /// Bias the start position maps and sorts with.
    pub start_bias: i32,
    /// Bias the end position maps and sorts with.
    pub end_bias: i32,
    /// Whether this range changes how the text spans inside it render.
    pub affects_spans: bool,
}

impl RangeDescriptor {
    fn new(spec: RangeSpec) -> Self {
        let start_bias = if spec.inclusive_start { -RANGE_BIAS } else { RANGE_BIAS };
        let end_bias = if spec.inclusive_end { RANGE_BIAS } else { -RANGE_BIAS };
        let affects_spans = spec.attributes.is_some()
            || spec.class.is_some()
            || spec.tag_name.is_some()
            || spec.collapsed.is_some();
        Self {
            spec,
            start_bias,
            end_bias,
            affects_spans,
        }
    }

    /// Whether two descriptors render identically: same tag, class,
    /// attributes, and equivalent collapse.
    pub fn compare(&self, other: &RangeDescriptor) -> bool {
        self.spec.tag_name == other.spec.tag_name
            && self.spec.class == other.spec.class
            && self.spec.attributes == other.spec.attributes
            && Collapsed::equivalent(&self.spec.collapsed, &other.spec.collapsed)
    }

    pub fn collapsed(&self) -> Option<&Collapsed> {
        self.spec.collapsed.as_ref()
    }
}

/// A point descriptor with its derived bias.
#[derive(Debug)]
pub struct PointDescriptor {
    pub spec: PointSpec,
    pub bias: i32,
}

impl PointDescriptor {
    fn new(spec: PointSpec) -> Self {
        let bias = spec.side;
        Self { spec, bias }
    }

    pub fn widget(&self) -> Option<&Arc<dyn Widget>> {
        self.spec.widget.as_ref()
    }
}

/// The behavior attached to a decoration: either a range descriptor or a
/// point descriptor. Cheap to clone and compared by identity where the same
/// descriptor is reused across revisions.
#[derive(Clone, Debug)]
pub enum Descriptor {
    Range(Arc<RangeDescriptor>),
    Point(Arc<PointDescriptor>),
}

impl Descriptor {
    /// The bias a decoration with this descriptor sorts by at its start.
    pub fn bias(&self) -> i32 {
        match self {
            Descriptor::Range(range) => range.start_bias,
            Descriptor::Point(point) => point.bias,
        }
    }

    /// The bias a decoration with this descriptor sorts by at its end.
    pub(crate) fn end_bias(&self) -> i32 {
        match self {
            Descriptor::Range(range) => range.end_bias,
            Descriptor::Point(point) => point.bias,
        }
    }
}

/// An immutable annotation on a range or point of the text.
#[derive(Clone, Debug)]
pub struct Decoration {
    pub from: usize,
    pub to: usize,
    pub desc: Descriptor,
}

impl Decoration {
    /// Create a range decoration over `from..to`. Fails when the range is
    /// empty or reversed.
    pub fn range(from: usize, to: usize, spec: RangeSpec) -> Result<Decoration, DecorationError> {
        if from >= to {
            return InvalidRangeSnafu { from, to }.fail();
        }
        Ok(Decoration {
            from,
            to,
            desc: Descriptor::Range(Arc::new(RangeDescriptor::new(spec))),
        })
    }

    /// Create a point decoration at `pos`.
    pub fn point(pos: usize, spec: PointSpec) -> Decoration {
        Decoration {
            from: pos,
            to: pos,
            desc: Descriptor::Point(Arc::new(PointDescriptor::new(spec))),
        }
    }

    /// The bias this decoration sorts by at its `from` position.
    pub fn bias(&self) -> i32 {
        self.desc.bias()
    }

    /// A copy shifted by `delta`.
    pub(crate) fn moved(&self, delta: i64) -> Decoration {
        Decoration {
            from: (self.from as i64 + delta) as usize,
            to: (self.to as i64 + delta) as usize,
            desc: self.desc.clone(),
        }
    }

    /// Map this decoration through `changes`, with its positions offset by
    /// `old_offset`. Returns the surviving absolute positions in the new
    /// document, or `None` when the decoration is dropped: a range whose
    /// mapped endpoints collapse together, or a point inside a deletion.
    pub(crate) fn map(&self, changes: &[Change], old_offset: usize) -> Option<(usize, usize)> {
        match &self.desc {
            Descriptor::Range(range) => {
                let from = change::map_pos(changes, self.from + old_offset, range.start_bias);
                let to = change::map_pos(changes, self.to + old_offset, range.end_bias);
                (from < to).then_some((from, to))
            }
            Descriptor::Point(point) => {
                let pos =
                    change::map_pos_tracking(changes, self.from + old_offset, point.bias)?;
                Some((pos, pos))
            }
        }
    }
}

/// Sort order for decoration arrays: ascending `from`, ties broken by
/// ascending bias.
pub(crate) fn cmp_by_pos(a: &Decoration, b: &Decoration) -> Ordering {
    a.from.cmp(&b.from).then(a.bias().cmp(&b.bias()))
}

/// Insert `deco` into `sorted` keeping `(from, bias)` order, after any
/// entries it ties with.
pub(crate) fn insert_sorted(sorted: &mut Vec<Decoration>, deco: Decoration) {
    let at = sorted.partition_point(|d| cmp_by_pos(d, &deco) != Ordering::Greater);
    sorted.insert(at, deco);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(PartialEq)]
    struct Marker(u32);

    impl Widget for Marker {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn compare(&self, other: &dyn Widget) -> bool {
            other.as_any().downcast_ref::<Marker>() == Some(self)
        }

        fn estimated_height(&self) -> i32 {
            self.0 as i32
        }
    }

    #[test]
    fn empty_range_is_rejected() {
        assert!(matches!(
            Decoration::range(3, 3, RangeSpec::default()),
            Err(DecorationError::InvalidRange { from: 3, to: 3 })
        ));
        assert!(Decoration::range(5, 2, RangeSpec::default()).is_err());
    }

    #[test]
    fn bias_derivation_follows_inclusivity() {
        let deco = Decoration::range(
            0,
            2,
            RangeSpec {
                inclusive_start: true,
                inclusive_end: true,
                ..RangeSpec::default()
            },
        )
        .unwrap();
        let Descriptor::Range(range) = &deco.desc else {
            panic!("expected a range descriptor");
        };
        assert_eq!(range.start_bias, -RANGE_BIAS);
        assert_eq!(range.end_bias, RANGE_BIAS);

        let exclusive = Decoration::range(0, 2, RangeSpec::class("c")).unwrap();
        let Descriptor::Range(range) = &exclusive.desc else {
            panic!("expected a range descriptor");
        };
        assert_eq!(range.start_bias, RANGE_BIAS);
        assert_eq!(range.end_bias, -RANGE_BIAS);
        assert!(range.affects_spans);
    }

    #[test]
    fn bare_ranges_affect_nothing() {
        let deco = Decoration::range(0, 2, RangeSpec::default()).unwrap();
        let Descriptor::Range(range) = &deco.desc else {
            panic!("expected a range descriptor");
        };
        assert!(!range.affects_spans);
    }

    #[test]
    fn inclusive_range_absorbs_insertions_at_both_ends() {
        let deco = Decoration::range(
            1,
            2,
            RangeSpec {
                inclusive_start: true,
                inclusive_end: true,
                ..RangeSpec::default()
            },
        )
        .unwrap();
        let changes = [Change::insert(1, 2), Change::insert(4, 2)];
        assert_eq!(deco.map(&changes, 0), Some((1, 6)));
    }

    #[test]
    fn collapsing_range_is_dropped() {
        let deco = Decoration::range(2, 4, RangeSpec::class("c")).unwrap();
        assert_eq!(deco.map(&[Change::delete(1..5)], 0), None);
    }

    #[test]
    fn point_inside_deletion_is_dropped() {
        let point = Decoration::point(3, PointSpec::default());
        assert_eq!(point.map(&[Change::delete(2..5)], 0), None);
        assert_eq!(point.map(&[Change::delete(4..5)], 0), Some((3, 3)));
    }

    #[test]
    fn point_side_picks_insertion_side() {
        let after = Decoration::point(1, PointSpec { side: 1, ..PointSpec::default() });
        let before = Decoration::point(1, PointSpec { side: -1, ..PointSpec::default() });
        let changes = [Change::insert(1, 2)];
        assert_eq!(after.map(&changes, 0), Some((3, 3)));
        assert_eq!(before.map(&changes, 0), Some((1, 1)));
    }

    #[test]
    fn descriptors_compare_structurally() {
        let widget: Arc<dyn Widget> = Arc::new(Marker(7));
        let a = Arc::new(RangeDescriptor::new(RangeSpec::collapsed_widget(widget.clone())));
        let b = Arc::new(RangeDescriptor::new(RangeSpec::collapsed_widget(Arc::new(Marker(7)))));
        let c = Arc::new(RangeDescriptor::new(RangeSpec::collapsed_widget(Arc::new(Marker(8)))));
        assert!(a.compare(&b));
        assert!(!a.compare(&c));
        assert!(!a.compare(&RangeDescriptor::new(RangeSpec::collapsed())));
    }

    #[test]
    fn sorted_insertion_respects_bias_ties() {
        let mut sorted = vec![
            Decoration::point(1, PointSpec { side: -1, ..PointSpec::default() }),
            Decoration::point(1, PointSpec { side: 1, ..PointSpec::default() }),
        ];
        insert_sorted(&mut sorted, Decoration::point(1, PointSpec::default()));
        let biases: Vec<i32> = sorted.iter().map(Decoration::bias).collect();
        assert_eq!(biases, vec![-1, 0, 1]);
    }
}
