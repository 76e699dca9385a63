//! Traversal pipeline core: step taxonomy, window bounds, predicates, and the
//! arena-backed step pipeline that strategies rewrite.
//!
//! A compiled traversal is an ordered sequence of typed [`Step`]s. Strategy
//! passes ([`TraversalStrategy`]) mutate that sequence in place before the
//! (out-of-scope) execution engine walks it. This crate owns:
//!
//! - the closed [`StepKind`] taxonomy strategies pattern-match against,
//! - [`Bounds`] window arithmetic (skip/limit composition),
//! - [`Predicate`] conjunctions of boolean sub-pipelines,
//! - the [`Pipeline`] itself with its structural surgery operations.
//!
//! The pipeline is deliberately **not** a shifting `Vec<Step>`: steps live in
//! an index-stable arena keyed by [`StepId`] handles with an explicit
//! prev/next link table, so a strategy can insert, replace, and remove steps
//! mid-scan without invalidating the handles it already holds.

pub mod pipeline;
pub mod step;
pub mod strategy;

pub use pipeline::{InvariantViolation, Pipeline, StepId};
pub use step::{
    Bounds, ComposedWindow, Direction, Endpoint, Predicate, Step, StepKind, StepTag,
};
pub use strategy::TraversalStrategy;
