//! Early-limit optimization.
//!
//! A skip/limit window late in a pipeline forces every upstream step to
//! produce results that are then thrown away. This pass scans the pipeline
//! once, left to right, and moves each window as far upstream as is safe:
//! just past the most recent barrier/branch/flat-map/filter/repeat step.
//! When the landing site is itself a window, the two are merged
//! arithmetically into a single equivalent window (slicing a slice).
//!
//! Side effects constrain the merge: a side-effect step between two windows
//! must still observe the unmerged upstream cardinality, so in that case the
//! composed window stays at the *later* position and the upstream window is
//! left in place.
//!
//! An unsatisfiable composition (the upstream window is exhausted before the
//! downstream skip completes) is not an error: it becomes an explicit
//! no-match terminal, and everything after it except side-effect steps is
//! dropped, since declared side effects must still materialize (as empty).

use tracing::debug;

use stratagraph_pipeline::{
    Bounds, ComposedWindow, InvariantViolation, Pipeline, Step, StepId, StepKind,
    TraversalStrategy,
};

/// Stateless; a unit value applies the pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarlyLimitStrategy;

impl TraversalStrategy for EarlyLimitStrategy {
    fn apply(&self, pipeline: &mut Pipeline) -> Result<(), InvariantViolation> {
        // `anchor`: the most recent step a window may legally land after.
        // `collapsible`: whether a window merged into an anchor window may
        // replace it (true until a side-effect step intervenes).
        let mut anchor: Option<StepId> = None;
        let mut collapsible = false;

        let mut cursor = pipeline.head();
        while let Some(id) = cursor {
            cursor = pipeline.next_of(id);
            let scanned = {
                let step = pipeline
                    .get(id)
                    .ok_or(InvariantViolation::CorruptLinks(id))?;
                Scanned::of(&step.kind)
            };
            match scanned {
                Scanned::Window(bounds) => {
                    let Some(anchor_id) = anchor else {
                        // Nowhere upstream to go; leave it and keep scanning.
                        continue;
                    };
                    match self.relocate_window(pipeline, id, bounds, anchor_id, collapsible)? {
                        Placed::Window(at) => anchor = Some(at),
                        Placed::NoMatch(at) => {
                            truncate_after(pipeline, at)?;
                            break;
                        }
                    }
                }
                Scanned::Anchor => {
                    anchor = Some(id);
                    collapsible = true;
                }
                Scanned::SideEffect => collapsible = false,
                Scanned::Other => {}
            }
        }
        Ok(())
    }
}

/// What the scan needs to know about a step, copied out so the pipeline can
/// be mutated while handling it.
enum Scanned {
    Window(Bounds),
    Anchor,
    SideEffect,
    Other,
}

impl Scanned {
    fn of(kind: &StepKind) -> Scanned {
        match kind {
            StepKind::Window { bounds } => Scanned::Window(*bounds),
            StepKind::Barrier
            | StepKind::Branch
            | StepKind::FlatMap
            | StepKind::Filter { .. }
            | StepKind::Repeat => Scanned::Anchor,
            StepKind::SideEffect => Scanned::SideEffect,
            _ => Scanned::Other,
        }
    }
}

/// Where a processed window ended up.
enum Placed {
    Window(StepId),
    NoMatch(StepId),
}

impl EarlyLimitStrategy {
    /// Move the window at `id` next to `anchor_id`, merging if the anchor is
    /// itself a window. Returns the handle of the resulting step, which
    /// becomes the new anchor for any later window.
    fn relocate_window(
        &self,
        pipeline: &mut Pipeline,
        id: StepId,
        bounds: Bounds,
        anchor_id: StepId,
        collapsible: bool,
    ) -> Result<Placed, InvariantViolation> {
        // The window's output labels belong to whatever now occupies its
        // position: move them onto the preceding step first.
        if let Some(prev) = pipeline.prev_of(id) {
            relocate_labels(pipeline, id, prev)?;
        }

        let anchor_bounds = match pipeline.get(anchor_id) {
            Some(step) => match step.kind {
                StepKind::Window { bounds } => Some(bounds),
                _ => None,
            },
            None => return Err(InvariantViolation::StepNotFound(anchor_id)),
        };

        let Some(anchor_bounds) = anchor_bounds else {
            // Pure relocation, no arithmetic.
            if pipeline.next_of(anchor_id) == Some(id) {
                // Already directly after the anchor.
                return Ok(Placed::Window(id));
            }
            debug!(?bounds, "relocating window upstream");
            let moved =
                pipeline.insert_after(Step::new(StepKind::Window { bounds }), anchor_id)?;
            pipeline.remove(id)?;
            return Ok(Placed::Window(moved));
        };

        match anchor_bounds.compose(bounds) {
            ComposedWindow::Window(merged) => {
                debug!(?anchor_bounds, ?bounds, ?merged, "merging windows");
                let composed = Step::new(StepKind::Window { bounds: merged });
                if collapsible {
                    // Two steps collapse into one at the anchor's position.
                    pipeline.replace(anchor_id, composed)?;
                    pipeline.remove(id)?;
                    Ok(Placed::Window(anchor_id))
                } else {
                    // A side effect intervened: merge arithmetically but keep
                    // the result at the later position so the side effect
                    // still sees the anchor window's output.
                    pipeline.replace(id, composed)?;
                    Ok(Placed::Window(id))
                }
            }
            ComposedWindow::NoMatch => {
                debug!(?anchor_bounds, ?bounds, "window composition is unsatisfiable");
                let no_match = Step::new(StepKind::NoMatch);
                if collapsible {
                    pipeline.replace(anchor_id, no_match)?;
                    pipeline.remove(id)?;
                    Ok(Placed::NoMatch(anchor_id))
                } else {
                    pipeline.replace(id, no_match)?;
                    Ok(Placed::NoMatch(id))
                }
            }
        }
    }
}

/// Move all output labels from `from` onto `to`.
fn relocate_labels(
    pipeline: &mut Pipeline,
    from: StepId,
    to: StepId,
) -> Result<(), InvariantViolation> {
    let labels = match pipeline.get_mut(from) {
        Some(step) => std::mem::take(&mut step.labels),
        None => return Err(InvariantViolation::StepNotFound(from)),
    };
    match pipeline.get_mut(to) {
        Some(step) => {
            step.labels.extend(labels);
            Ok(())
        }
        None => Err(InvariantViolation::StepNotFound(to)),
    }
}

/// Nothing past a no-match terminal can produce output; drop every later
/// step except side-effect steps, whose declared effects must still
/// materialize as empty.
fn truncate_after(pipeline: &mut Pipeline, no_match: StepId) -> Result<(), InvariantViolation> {
    let mut cursor = pipeline.next_of(no_match);
    while let Some(id) = cursor {
        cursor = pipeline.next_of(id);
        let keep = matches!(
            pipeline.get(id).map(|step| &step.kind),
            Some(StepKind::SideEffect)
        );
        if !keep {
            pipeline.remove(id)?;
        }
    }
    Ok(())
}
