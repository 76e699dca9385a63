//! Step taxonomy and step payload types.
//!
//! [`StepKind`] is the closed vocabulary strategies are written against.
//! Matching is exhaustive, so adding a step kind is a compile-time-checked
//! change across every strategy rather than an open class hierarchy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::pipeline::Pipeline;

/// Direction of an edge hop relative to the current vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    /// The direction looking back along the same edge. `Both` is its own
    /// opposite.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }
}

/// Which vertex an edge-endpoint-resolution step lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    /// The endpoint the traverser did not arrive from (used after a
    /// bidirectional hop, where either end may be "other").
    Other,
    /// The endpoint at a fixed end of the edge.
    Fixed { direction: Direction },
}

/// Inclusive-low / exclusive-high window bounds for a skip/limit step.
///
/// `high: None` means unbounded. A bounded window with `low >= high` can
/// never emit anything; [`Bounds::compose`] normalizes such windows into
/// [`ComposedWindow::NoMatch`] rather than treating them as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: u64,
    pub high: Option<u64>,
}

impl Bounds {
    pub fn new(low: u64, high: Option<u64>) -> Bounds {
        Bounds { low, high }
    }

    /// `skip(n)`: drop the first `n` results, no upper bound.
    pub fn skip(n: u64) -> Bounds {
        Bounds { low: n, high: None }
    }

    /// `limit(n)`: keep at most the first `n` results.
    pub fn limit(n: u64) -> Bounds {
        Bounds { low: 0, high: Some(n) }
    }

    pub fn is_unbounded(&self) -> bool {
        self.high.is_none()
    }

    /// A bounded window whose low edge has already consumed its high edge.
    pub fn is_empty(&self) -> bool {
        matches!(self.high, Some(high) if self.low >= high)
    }

    /// Compose `later` applied to the output of `self`, as in slicing a
    /// slice: the result is a single window equivalent to running `self`
    /// first and `later` on what survives.
    ///
    /// Empty results are normalized to [`ComposedWindow::NoMatch`]; window
    /// composition is associative over chains of three or more windows.
    ///
    /// Edge arithmetic saturates at `u64::MAX`: a saturated low edge against
    /// a bounded high edge still normalizes to no-match.
    pub fn compose(self, later: Bounds) -> ComposedWindow {
        let low = self.low.saturating_add(later.low);
        let high = match (self.high, later.high) {
            (None, later_high) => later_high.map(|h| self.low.saturating_add(h)),
            // `later` is unbounded: the remaining capacity of `self` caps it.
            (Some(self_high), None) => Some(self_high),
            (Some(self_high), Some(later_high)) => {
                Some(self.low.saturating_add(later_high).min(self_high))
            }
        };
        match high {
            Some(high) if low >= high => ComposedWindow::NoMatch,
            _ => ComposedWindow::Window(Bounds { low, high }),
        }
    }
}

/// Result of composing two windows: either a single equivalent window, or
/// the marker that the combination is unsatisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposedWindow {
    Window(Bounds),
    NoMatch,
}

/// A boolean predicate over a traverser: the logical conjunction of one or
/// more sub-pipelines, each evaluated in boolean-filter mode by the
/// execution engine.
///
/// Cloning a predicate deep-clones every clause pipeline, so two filter
/// steps embedding "the same" predicate never share mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    clauses: Vec<Pipeline>,
}

impl Predicate {
    /// A single-clause predicate: "the sub-pipeline matches".
    pub fn from_pipeline(clause: Pipeline) -> Predicate {
        Predicate {
            clauses: vec![clause],
        }
    }

    /// The conjunction of several sub-pipelines.
    pub fn and(clauses: Vec<Pipeline>) -> Predicate {
        Predicate { clauses }
    }

    pub fn clauses(&self) -> &[Pipeline] {
        &self.clauses
    }

    /// Conjoin one more clause onto this predicate.
    pub fn push_clause(&mut self, clause: Pipeline) {
        self.clauses.push(clause);
    }
}

/// One typed stage of a traversal pipeline: a taxonomy tag plus any output
/// labels attached to the results this stage produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub labels: BTreeSet<String>,
}

impl Step {
    pub fn new(kind: StepKind) -> Step {
        Step {
            kind,
            labels: BTreeSet::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Step {
        self.labels.insert(label.into());
        self
    }
}

/// The closed step taxonomy strategies pattern-match against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Graph-entry step producing vertices (`g.V()`).
    EntryVertex,
    /// Graph-entry step producing edges (`g.E()`).
    EntryEdge,
    /// A fused hop: walks an edge and lands directly on the neighboring
    /// vertex without ever exposing the edge itself (`out()`, `both()`).
    FusedVertexHop {
        direction: Direction,
        edge_labels: Vec<String>,
    },
    /// A hop that stops on the edge (`outE()`, `bothE()`).
    EdgeHop {
        direction: Direction,
        edge_labels: Vec<String>,
    },
    /// Resolve an edge to one of its endpoint vertices.
    EdgeEndpoint { endpoint: Endpoint },
    /// Vertex creation.
    AddVertex,
    /// Edge creation.
    AddEdge,
    /// Keep only traversers for which the embedded predicate holds.
    Filter { predicate: Predicate },
    /// Full-barrier step: drains its upstream before emitting.
    Barrier,
    /// Branching step (union/choose style).
    Branch,
    /// One-to-many mapping step.
    FlatMap,
    /// Looping step.
    Repeat,
    /// A step that writes to declared side-effect storage.
    SideEffect,
    /// Skip/limit window over the result stream.
    Window { bounds: Bounds },
    /// Terminal marker: this pipeline can never produce output. Not an
    /// error; the silent encoding of an unsatisfiable window.
    NoMatch,
}

impl StepKind {
    pub fn tag(&self) -> StepTag {
        match self {
            StepKind::EntryVertex => StepTag::EntryVertex,
            StepKind::EntryEdge => StepTag::EntryEdge,
            StepKind::FusedVertexHop { .. } => StepTag::FusedVertexHop,
            StepKind::EdgeHop { .. } => StepTag::EdgeHop,
            StepKind::EdgeEndpoint { .. } => StepTag::EdgeEndpoint,
            StepKind::AddVertex => StepTag::AddVertex,
            StepKind::AddEdge => StepTag::AddEdge,
            StepKind::Filter { .. } => StepTag::Filter,
            StepKind::Barrier => StepTag::Barrier,
            StepKind::Branch => StepTag::Branch,
            StepKind::FlatMap => StepTag::FlatMap,
            StepKind::Repeat => StepTag::Repeat,
            StepKind::SideEffect => StepTag::SideEffect,
            StepKind::Window { .. } => StepTag::Window,
            StepKind::NoMatch => StepTag::NoMatch,
        }
    }
}

/// Fieldless discriminant of [`StepKind`], for kind lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTag {
    EntryVertex,
    EntryEdge,
    FusedVertexHop,
    EdgeHop,
    EdgeEndpoint,
    AddVertex,
    AddEdge,
    Filter,
    Barrier,
    Branch,
    FlatMap,
    Repeat,
    SideEffect,
    Window,
    NoMatch,
}
