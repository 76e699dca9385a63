//! The contract every rewrite pass implements.

use crate::pipeline::{InvariantViolation, Pipeline};

/// A decoration or optimization pass over a traversal pipeline.
///
/// `apply` mutates the pipeline in place, synchronously and with no I/O. A
/// strategy must not observe any pipeline other than the one passed in, and
/// must not retain handles into it after `apply` returns.
///
/// Re-applying a strategy to a pipeline it has already rewritten must be a
/// no-op: the driver may run strategy passes to a fixed point. Any
/// [`InvariantViolation`] aborts compilation of the traversal; a partially
/// rewritten pipeline is never handed to execution.
pub trait TraversalStrategy {
    fn apply(&self, pipeline: &mut Pipeline) -> Result<(), InvariantViolation>;
}
