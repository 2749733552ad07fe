//! Predicate / value-range inference.
//!
//! A predicate is the set of values a variable is known to take at a
//! program point: for float64 variables an ordered disjoint union of
//! intervals over the extended real line, for boolean variables a subset
//! of {true, false}, and `Unknown` otherwise. Branch conditions feed
//! constraints in through [`Float64Predicate::union`] /
//! [`Float64Predicate::intersect`]; dominated branches are then decided
//! with [`Float64Predicate::infer`].
//!
//! An empty set answers every query with [`Inference::Unknown`]: with no
//! inhabitants any statement is vacuously provable, so nothing useful can
//! be concluded.

use crate::node::BinOp;

/// Result of asking whether a constraint must hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inference {
    AlwaysTrue,
    AlwaysFalse,
    Unknown,
}

/// Classification of one interval against another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeTest {
    /// Identical sets
    Same,
    /// The receiver is a superset
    Include,
    /// Disjoint, receiver entirely to the left
    LExclude,
    /// Disjoint, receiver entirely to the right
    RExclude,
    /// Anything else (partial overlap or proper subset)
    Overlap,
}

/// An interval endpoint; `value` may be ±infinity (always open there).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumberPoint {
    pub value: f64,
    pub closed: bool,
}

impl NumberPoint {
    pub const NEG_INF: NumberPoint = NumberPoint {
        value: f64::NEG_INFINITY,
        closed: false,
    };
    pub const POS_INF: NumberPoint = NumberPoint {
        value: f64::INFINITY,
        closed: false,
    };

    pub fn new(value: f64, closed: bool) -> Self {
        Self { value, closed }
    }
}

/// A single interval with open/closed endpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range {
    pub lower: NumberPoint,
    pub upper: NumberPoint,
}

impl Range {
    pub fn new(lower: NumberPoint, upper: NumberPoint) -> Self {
        Self { lower, upper }
    }

    /// Convenience constructor for a bounded interval.
    pub fn bounded(lo: f64, lo_closed: bool, hi: f64, hi_closed: bool) -> Self {
        Self::new(NumberPoint::new(lo, lo_closed), NumberPoint::new(hi, hi_closed))
    }

    pub fn singleton(value: f64) -> Self {
        Self::bounded(value, true, value, true)
    }

    /// True when no value satisfies both endpoints.
    pub fn is_empty(&self) -> bool {
        if self.lower.value > self.upper.value {
            return true;
        }
        if self.lower.value == self.upper.value {
            return !(self.lower.closed && self.upper.closed);
        }
        false
    }

    /// Lower-bound order: is `a` a weaker-or-equal lower bound than `b`
    /// (every value admitted by `b` is admitted by `a`)?
    fn lower_covers(a: NumberPoint, b: NumberPoint) -> bool {
        a.value < b.value || (a.value == b.value && (a.closed || !b.closed))
    }

    /// Upper-bound order: does `a` admit everything `b` admits?
    fn upper_covers(a: NumberPoint, b: NumberPoint) -> bool {
        a.value > b.value || (a.value == b.value && (a.closed || !b.closed))
    }

    /// Superset check.
    fn includes(&self, other: &Range) -> bool {
        Self::lower_covers(self.lower, other.lower) && Self::upper_covers(self.upper, other.upper)
    }

    /// Disjointness with `self` entirely on the left.
    fn left_of(&self, other: &Range) -> bool {
        self.upper.value < other.lower.value
            || (self.upper.value == other.lower.value
                && !(self.upper.closed && other.lower.closed))
    }

    /// Classify this interval against `other`.
    pub fn test(&self, other: &Range) -> RangeTest {
        if self == other {
            RangeTest::Same
        } else if self.includes(other) {
            RangeTest::Include
        } else if self.left_of(other) {
            RangeTest::LExclude
        } else if other.left_of(self) {
            RangeTest::RExclude
        } else {
            RangeTest::Overlap
        }
    }

    /// Intersection, `None` when empty.
    fn intersect(&self, other: &Range) -> Option<Range> {
        let lower = if Self::lower_covers(self.lower, other.lower) {
            other.lower
        } else {
            self.lower
        };
        let upper = if Self::upper_covers(self.upper, other.upper) {
            other.upper
        } else {
            self.upper
        };
        let r = Range::new(lower, upper);
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    /// True when the union with a range starting at-or-after this one is a
    /// single interval: they overlap, or they are adjacent at one value
    /// with at least one side closed (no gap in between).
    fn touches(&self, other: &Range) -> bool {
        !(self.upper.value < other.lower.value
            || (self.upper.value == other.lower.value
                && !self.upper.closed
                && !other.lower.closed))
    }
}

/// Ordered disjoint union of intervals for a float64 variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Float64Predicate {
    ranges: Vec<Range>,
}

/// Intervals satisfying `x op c`.
fn op_ranges(op: BinOp, c: f64) -> Vec<Range> {
    match op {
        BinOp::Lt => vec![Range::new(NumberPoint::NEG_INF, NumberPoint::new(c, false))],
        BinOp::Le => vec![Range::new(NumberPoint::NEG_INF, NumberPoint::new(c, true))],
        BinOp::Gt => vec![Range::new(NumberPoint::new(c, false), NumberPoint::POS_INF)],
        BinOp::Ge => vec![Range::new(NumberPoint::new(c, true), NumberPoint::POS_INF)],
        BinOp::Eq => vec![Range::singleton(c)],
        BinOp::Ne => vec![
            Range::new(NumberPoint::NEG_INF, NumberPoint::new(c, false)),
            Range::new(NumberPoint::new(c, false), NumberPoint::POS_INF),
        ],
        _ => vec![],
    }
}

impl Float64Predicate {
    /// The empty set. Constraints are folded in with `union`/`intersect`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Fold `x op c` in as a union.
    pub fn union(&mut self, op: BinOp, c: f64) {
        debug_assert!(op.is_comparison());
        for r in op_ranges(op, c) {
            self.union_range(r);
        }
    }

    /// Fold `x op c` in as an intersection.
    pub fn intersect(&mut self, op: BinOp, c: f64) {
        debug_assert!(op.is_comparison());
        let constraint = op_ranges(op, c);
        let mut next = Vec::new();
        for have in &self.ranges {
            for want in &constraint {
                if let Some(r) = have.intersect(want) {
                    next.push(r);
                }
            }
        }
        self.ranges = next;
        self.normalize();
    }

    fn union_range(&mut self, range: Range) {
        if range.is_empty() {
            return;
        }
        self.ranges.push(range);
        self.normalize();
    }

    /// Re-establish sorted disjoint order, merging touching intervals.
    fn normalize(&mut self) {
        self.ranges.sort_by(|a, b| {
            a.lower
                .value
                .partial_cmp(&b.lower.value)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.lower.closed.cmp(&a.lower.closed))
        });
        let mut merged: Vec<Range> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.touches(&r) => {
                    if !Range::upper_covers(last.upper, r.upper) {
                        last.upper = r.upper;
                    }
                    if !Range::lower_covers(last.lower, r.lower) {
                        last.lower = r.lower;
                    }
                }
                _ => merged.push(r),
            }
        }
        self.ranges = merged;
    }

    /// Is the whole set inside the constraint region?
    fn subset_of(&self, region: &[Range]) -> bool {
        self.ranges
            .iter()
            .all(|r| region.iter().any(|c| c.includes(r)))
    }

    /// Is the whole set disjoint from the constraint region?
    fn disjoint_from(&self, region: &[Range]) -> bool {
        self.ranges
            .iter()
            .all(|r| region.iter().all(|c| c.intersect(r).is_none()))
    }

    /// Decide whether `x op c` must hold, must fail, or is undetermined
    /// for every `x` in this set.
    pub fn infer(&self, op: BinOp, c: f64) -> Inference {
        if self.is_empty() {
            return Inference::Unknown;
        }
        let region = op_ranges(op, c);
        if self.subset_of(&region) {
            Inference::AlwaysTrue
        } else if self.disjoint_from(&region) {
            Inference::AlwaysFalse
        } else {
            Inference::Unknown
        }
    }

    /// Set union with another predicate.
    pub fn union_with(&mut self, other: &Float64Predicate) {
        for r in &other.ranges {
            self.ranges.push(*r);
        }
        self.normalize();
    }

    /// Set intersection with another predicate.
    pub fn intersect_with(&mut self, other: &Float64Predicate) {
        let mut next = Vec::new();
        for have in &self.ranges {
            for want in &other.ranges {
                if let Some(r) = have.intersect(want) {
                    next.push(r);
                }
            }
        }
        self.ranges = next;
        self.normalize();
    }

    /// Set-level inference against another predicate: inclusion, exclusion
    /// or overlap.
    pub fn infer_predicate(&self, other: &Float64Predicate) -> Inference {
        if self.is_empty() || other.is_empty() {
            return Inference::Unknown;
        }
        if self.subset_of(&other.ranges) {
            Inference::AlwaysTrue
        } else if self.disjoint_from(&other.ranges) {
            Inference::AlwaysFalse
        } else {
            Inference::Unknown
        }
    }
}

/// Subset of {true, false} for a boolean variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BooleanPredicate {
    has_true: bool,
    has_false: bool,
}

impl BooleanPredicate {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: bool) -> Self {
        let mut p = Self::new();
        p.union(value);
        p
    }

    pub fn is_empty(&self) -> bool {
        !self.has_true && !self.has_false
    }

    pub fn union(&mut self, value: bool) {
        if value {
            self.has_true = true;
        } else {
            self.has_false = true;
        }
    }

    pub fn intersect(&mut self, value: bool) {
        if value {
            self.has_false = false;
        } else {
            self.has_true = false;
        }
    }

    /// Decide `x op value` for `op` in {==, !=}.
    pub fn infer(&self, op: BinOp, value: bool) -> Inference {
        let eq = match op {
            BinOp::Eq => true,
            BinOp::Ne => false,
            _ => return Inference::Unknown,
        };
        let result = match (self.has_true, self.has_false) {
            (true, true) | (false, false) => return Inference::Unknown,
            (true, false) => value,
            (false, true) => !value,
        };
        if result == eq {
            Inference::AlwaysTrue
        } else {
            Inference::AlwaysFalse
        }
    }

    /// Set union with another predicate.
    pub fn union_with(&mut self, other: &BooleanPredicate) {
        self.has_true |= other.has_true;
        self.has_false |= other.has_false;
    }

    /// Set intersection with another predicate.
    pub fn intersect_with(&mut self, other: &BooleanPredicate) {
        self.has_true &= other.has_true;
        self.has_false &= other.has_false;
    }

    pub fn infer_predicate(&self, other: &BooleanPredicate) -> Inference {
        if self.is_empty() || other.is_empty() {
            return Inference::Unknown;
        }
        if self.has_true && self.has_false {
            return Inference::Unknown;
        }
        let contained = (self.has_true && other.has_true) || (self.has_false && other.has_false);
        let disjoint = !(self.has_true && other.has_true) && !(self.has_false && other.has_false);
        if contained && (!self.has_true || other.has_true) && (!self.has_false || other.has_false) {
            Inference::AlwaysTrue
        } else if disjoint {
            Inference::AlwaysFalse
        } else {
            Inference::Unknown
        }
    }
}

/// The per-variable predicate a condition group stores.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Float64(Float64Predicate),
    Boolean(BooleanPredicate),
    /// Top: no information
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lopen(r: f64, closed: bool) -> Range {
        Range::new(NumberPoint::NEG_INF, NumberPoint::new(r, closed))
    }

    fn ropen(l: f64, closed: bool) -> Range {
        Range::new(NumberPoint::new(l, closed), NumberPoint::POS_INF)
    }

    fn single(v: f64) -> Range {
        Range::singleton(v)
    }

    #[test]
    fn range_classifier() {
        use RangeTest::*;
        // include
        assert_eq!(lopen(3.0, true).test(&lopen(3.0, false)), Include);
        assert_eq!(ropen(3.0, true).test(&ropen(3.0, false)), Include);
        assert_eq!(lopen(3.0, true).test(&lopen(2.0, true)), Include);
        assert_eq!(
            Range::bounded(-2.0, true, 3.0, true).test(&Range::bounded(-2.0, true, 1.0, true)),
            Include
        );
        assert_eq!(
            Range::bounded(-2.0, true, 3.0, true).test(&Range::bounded(-1.0, true, 3.0, true)),
            Include
        );
        assert_eq!(
            Range::bounded(-3.0, true, 3.0, false).test(&Range::bounded(-3.0, false, 2.0, false)),
            Include
        );

        // same
        assert_eq!(lopen(3.0, true).test(&lopen(3.0, true)), Same);
        assert_eq!(ropen(3.0, false).test(&ropen(3.0, false)), Same);
        assert_eq!(
            Range::bounded(-2.0, false, 3.0, false).test(&Range::bounded(-2.0, false, 3.0, false)),
            Same
        );

        // lexclude
        assert_eq!(lopen(2.0, false).test(&ropen(2.0, true)), LExclude);
        assert_eq!(lopen(1.0, true).test(&ropen(2.0, true)), LExclude);

        // rexclude
        assert_eq!(ropen(2.0, true).test(&lopen(2.0, false)), RExclude);
        assert_eq!(ropen(2.0, false).test(&lopen(2.0, true)), RExclude);
        assert_eq!(ropen(2.0, true).test(&lopen(1.0, true)), RExclude);

        // overlap
        assert_eq!(ropen(2.0, true).test(&lopen(2.0, true)), Overlap);
        assert_eq!(lopen(1.0, true).test(&ropen(1.0, true)), Overlap);
        assert_eq!(ropen(2.0, true).test(&lopen(3.0, true)), Overlap);

        // singleton ranges
        assert_eq!(single(2.0).test(&single(2.0)), Same);
        assert_eq!(single(2.0).test(&single(1.0)), RExclude);
        assert_eq!(single(2.0).test(&single(3.0)), LExclude);
        assert_eq!(single(2.0).test(&ropen(2.0, true)), Overlap);
        assert_eq!(ropen(2.0, true).test(&single(2.0)), Include);
        assert_eq!(single(2.0).test(&ropen(2.0, false)), LExclude);
        assert_eq!(ropen(2.0, false).test(&single(2.0)), RExclude);
        assert_eq!(single(2.0).test(&lopen(2.0, true)), Overlap);
        assert_eq!(lopen(2.0, true).test(&single(2.0)), Include);
    }

    #[test]
    fn union_grows_to_half_line() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Eq, 5.0);
        range.union(BinOp::Gt, 5.0);
        range.union(BinOp::Ge, 5.0);
        range.union(BinOp::Eq, 5.0);

        assert_eq!(range.infer(BinOp::Ge, 5.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Ge, 4.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Gt, 4.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Ne, 4.99), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Eq, 3.0), Inference::AlwaysFalse);
    }

    #[test]
    fn union_merges_touching_point() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Lt, 2.0);
        range.union(BinOp::Eq, 2.0);
        range.union(BinOp::Eq, 2.0);
        range.union(BinOp::Le, 2.0);

        assert_eq!(range.ranges().len(), 1);
        assert_eq!(range.infer(BinOp::Le, 2.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Le, 3.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Gt, 2.0), Inference::AlwaysFalse);
        assert_eq!(range.infer(BinOp::Ge, 3.0), Inference::AlwaysFalse);
        assert_eq!(range.infer(BinOp::Eq, 2.0), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Ne, 2.1), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Eq, 3.0), Inference::AlwaysFalse);
    }

    #[test]
    fn union_of_disjoint_halves() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Lt, 2.0);
        range.union(BinOp::Gt, 3.0);
        range.union(BinOp::Le, 3.0);
        assert_eq!(range.infer(BinOp::Ne, 3.0), Inference::Unknown);
    }

    #[test]
    fn half_line_with_left_union() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Gt, 10.0);
        range.union(BinOp::Ge, 10.0);
        range.union(BinOp::Ge, 20.0);

        assert_eq!(range.infer(BinOp::Eq, 10.0), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Gt, 9.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Lt, 10.0), Inference::AlwaysFalse);

        range.union(BinOp::Le, -100.0);
        assert_eq!(range.infer(BinOp::Le, -99.0), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Ne, -101.0), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Eq, -100.0), Inference::Unknown);
    }

    #[test]
    fn predicate_against_predicate() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Gt, 10.0);
        range.union(BinOp::Lt, 1.0);

        {
            let mut r = Float64Predicate::new();
            r.union(BinOp::Gt, 9.0);
            r.union(BinOp::Lt, 2.0);
            assert_eq!(range.infer_predicate(&r), Inference::AlwaysTrue);
        }
        {
            let mut r = Float64Predicate::new();
            r.union(BinOp::Gt, 100.0);
            r.union(BinOp::Lt, 0.0);
            assert_eq!(range.infer_predicate(&r), Inference::Unknown);
        }
        {
            let mut r = Float64Predicate::new();
            r.union(BinOp::Lt, 3.0);
            r.intersect(BinOp::Gt, 2.0);
            assert_eq!(range.infer_predicate(&r), Inference::AlwaysFalse);
        }
        {
            let mut r = Float64Predicate::new();
            r.union(BinOp::Lt, 10.0);
            r.intersect(BinOp::Gt, 0.0);
            assert_eq!(range.infer_predicate(&r), Inference::Unknown);
        }
        {
            let mut r = Float64Predicate::new();
            r.union(BinOp::Le, 10.0);
            r.intersect(BinOp::Ge, 1.0);
            assert_eq!(range.infer_predicate(&r), Inference::AlwaysFalse);
        }
    }

    #[test]
    fn intersect_sharpens_bound() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Le, 10.0);
        range.intersect(BinOp::Lt, 10.0);
        assert_eq!(range.infer(BinOp::Eq, 10.0), Inference::AlwaysFalse);
        assert_eq!(range.infer(BinOp::Eq, 9.0), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Lt, 10.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Lt, 11.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Ge, 10.0), Inference::AlwaysFalse);
        assert_eq!(range.infer(BinOp::Gt, 10.1), Inference::AlwaysFalse);
    }

    #[test]
    fn intersect_to_window() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Le, 10.0);
        range.intersect(BinOp::Gt, 4.0);
        assert_eq!(range.infer(BinOp::Eq, 4.0), Inference::AlwaysFalse);
        assert_eq!(range.infer(BinOp::Ne, 10.0), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Le, 10.0), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Gt, 4.0), Inference::AlwaysTrue);
    }

    #[test]
    fn empty_intersection_answers_unknown() {
        let mut range = Float64Predicate::new();
        range.union(BinOp::Le, 10.0);
        range.intersect(BinOp::Gt, 10.0);
        assert!(range.is_empty());
        assert_eq!(range.infer(BinOp::Eq, 10.0), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Eq, -1_000_000.0), Inference::Unknown);
    }

    #[test]
    fn multi_window_inclusion() {
        // [1,10] ∪ [20,30] ∪ [40,50]
        let mut range = Float64Predicate::new();
        range.union(BinOp::Ge, 20.0);
        range.intersect(BinOp::Le, 30.0);
        range.union(BinOp::Ge, 40.0);
        // keep [20,30] and add [40,50]
        let mut second = Float64Predicate::new();
        second.union(BinOp::Ge, 40.0);
        second.intersect(BinOp::Le, 50.0);
        let mut window = Float64Predicate::new();
        window.union(BinOp::Ge, 1.0);
        window.intersect(BinOp::Le, 10.0);
        assert_eq!(second.infer_predicate(&window), Inference::AlwaysFalse);

        let mut wide = Float64Predicate::new();
        wide.union(BinOp::Ge, 0.0);
        assert_eq!(second.infer_predicate(&wide), Inference::AlwaysTrue);
    }

    #[test]
    fn boolean_union_and_infer() {
        let mut range = BooleanPredicate::new();
        range.union(true);
        assert_eq!(range.infer(BinOp::Eq, true), Inference::AlwaysTrue);
        assert_eq!(range.infer(BinOp::Eq, false), Inference::AlwaysFalse);
        assert_eq!(range.infer(BinOp::Ne, false), Inference::AlwaysTrue);

        range.union(false);
        assert_eq!(range.infer(BinOp::Eq, true), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Eq, false), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Ne, true), Inference::Unknown);
    }

    #[test]
    fn boolean_predicate_vs_predicate() {
        let range = BooleanPredicate::with_value(true);
        assert_eq!(
            range.infer_predicate(&BooleanPredicate::with_value(false)),
            Inference::AlwaysFalse
        );
        assert_eq!(
            range.infer_predicate(&BooleanPredicate::with_value(true)),
            Inference::AlwaysTrue
        );
        let mut both = BooleanPredicate::with_value(true);
        both.union(false);
        assert_eq!(range.infer_predicate(&both), Inference::AlwaysTrue);

        let mut unknown = BooleanPredicate::with_value(true);
        unknown.union(false);
        assert_eq!(unknown.infer_predicate(&BooleanPredicate::with_value(true)), Inference::Unknown);
    }

    #[test]
    fn boolean_empty_intersection() {
        let mut range = BooleanPredicate::with_value(true);
        range.intersect(false);
        assert!(range.is_empty());
        assert_eq!(range.infer(BinOp::Eq, true), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Eq, false), Inference::Unknown);
        assert_eq!(range.infer(BinOp::Ne, true), Inference::Unknown);
    }
}
