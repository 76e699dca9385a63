//! The arena-backed step pipeline.
//!
//! The original mutable-list rendition of this structure (insert/replace/
//! remove by index while a strategy scans forward) invites iterator
//! invalidation: every splice shifts the positions the scan is holding.
//! Here steps live in a slot arena keyed by stable [`StepId`] handles, and
//! order is carried by an explicit prev/next link table. Removal tombstones
//! a slot; it never shifts live handles, so a strategy may hold handles
//! across arbitrary structural surgery.
//!
//! All operations are synchronous and total over a consistent pipeline. On
//! failure they return [`InvariantViolation`] and leave the pipeline
//! untouched (every operation validates its handles before mutating).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

use crate::step::{Step, StepTag};

/// Process-unique pipeline tokens, so a handle issued by one pipeline is
/// rejected by every other instead of silently aliasing a slot.
static NEXT_PIPELINE_TOKEN: AtomicU32 = AtomicU32::new(0);

/// Stable handle to a step within one [`Pipeline`].
///
/// Handles are never reused within a pipeline and stay valid across
/// insertions and removals of other steps. A handle carries the identity of
/// the pipeline that issued it: using it against any other pipeline (a clone
/// excepted, whose arena layout is shared at the moment of cloning) fails
/// with [`InvariantViolation::StepNotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId {
    pipeline: u32,
    slot: u32,
}

/// Structural-contract failure: an operation referenced a step that is not
/// a live member, or an internal consistency check failed. Not
/// user-recoverable; aborts the strategy pass and the whole compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("step {0:?} is not a live member of this pipeline")]
    StepNotFound(StepId),
    #[error("pipeline link table is inconsistent at step {0:?}")]
    CorruptLinks(StepId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Node {
    step: Step,
    prev: Option<StepId>,
    next: Option<StepId>,
}

/// An ordered, mutably-editable sequence of owned [`Step`]s.
///
/// Sequence order is the only ordering that matters. A pipeline may itself
/// appear, fully cloned, as a predicate clause inside a filter step;
/// embedding is always by deep copy (`Clone`), never by shared reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    token: u32,
    slots: Vec<Option<Node>>,
    head: Option<StepId>,
    tail: Option<StepId>,
    len: usize,
}

impl Default for Pipeline {
    fn default() -> Pipeline {
        Pipeline::new()
    }
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline {
            token: NEXT_PIPELINE_TOKEN.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<StepId> {
        self.head
    }

    pub fn tail(&self) -> Option<StepId> {
        self.tail
    }

    /// Whether `id` refers to a live step of this pipeline.
    pub fn contains(&self, id: StepId) -> bool {
        self.node(id).is_ok()
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.node(id).ok().map(|node| &node.step)
    }

    pub fn get_mut(&mut self, id: StepId) -> Option<&mut Step> {
        self.node_mut(id).ok().map(|node| &mut node.step)
    }

    pub fn next_of(&self, id: StepId) -> Option<StepId> {
        self.node(id).ok().and_then(|node| node.next)
    }

    pub fn prev_of(&self, id: StepId) -> Option<StepId> {
        self.node(id).ok().and_then(|node| node.prev)
    }

    /// Live step handles in pipeline order.
    pub fn ids(&self) -> impl Iterator<Item = StepId> + '_ {
        std::iter::successors(self.head, move |id| self.next_of(*id))
    }

    /// Live steps in pipeline order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> + '_ {
        self.ids().filter_map(move |id| self.get(id))
    }

    /// Zero-based position of a live step, in pipeline order.
    pub fn index_of(&self, id: StepId) -> Option<usize> {
        self.ids().position(|candidate| candidate == id)
    }

    /// Handles of every live step with the given kind tag, stable with
    /// respect to pipeline order at call time.
    pub fn find_by_kind(&self, tag: StepTag) -> Vec<StepId> {
        self.ids()
            .filter(|id| {
                self.get(*id)
                    .map(|step| step.kind.tag() == tag)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Append a step at the end of the pipeline.
    pub fn push_back(&mut self, step: Step) -> StepId {
        let id = self.alloc(Node {
            step,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => {
                if let Some(Some(node)) = self.slots.get_mut(tail.slot as usize) {
                    node.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        id
    }

    /// Splice `step` immediately after `anchor`.
    pub fn insert_after(
        &mut self,
        step: Step,
        anchor: StepId,
    ) -> Result<StepId, InvariantViolation> {
        let after = self.node(anchor)?.next;
        let id = self.alloc(Node {
            step,
            prev: Some(anchor),
            next: after,
        });
        self.node_mut(anchor)?.next = Some(id);
        match after {
            Some(after) => self.node_mut(after)?.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
        Ok(id)
    }

    /// Replace the step at `old` with `step`, keeping `old`'s position and
    /// handle. `old`'s output labels are merged onto the replacement.
    pub fn replace(&mut self, old: StepId, mut step: Step) -> Result<(), InvariantViolation> {
        let node = self.node_mut(old)?;
        step.labels.extend(std::mem::take(&mut node.step.labels));
        node.step = step;
        Ok(())
    }

    /// Unlink and return the step at `id`. Removing an already-removed step
    /// is an error and leaves the pipeline unchanged.
    pub fn remove(&mut self, id: StepId) -> Result<Step, InvariantViolation> {
        let (prev, next) = {
            let node = self.node(id)?;
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.node_mut(prev)?.next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next)?.prev = prev,
            None => self.tail = prev,
        }
        let node = self.slots[id.slot as usize]
            .take()
            .ok_or(InvariantViolation::CorruptLinks(id))?;
        self.len -= 1;
        Ok(node.step)
    }

    fn alloc(&mut self, node: Node) -> StepId {
        let id = StepId {
            pipeline: self.token,
            slot: self.slots.len() as u32,
        };
        self.slots.push(Some(node));
        id
    }

    fn node(&self, id: StepId) -> Result<&Node, InvariantViolation> {
        if id.pipeline != self.token {
            return Err(InvariantViolation::StepNotFound(id));
        }
        self.slots
            .get(id.slot as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(InvariantViolation::StepNotFound(id))
    }

    fn node_mut(&mut self, id: StepId) -> Result<&mut Node, InvariantViolation> {
        if id.pipeline != self.token {
            return Err(InvariantViolation::StepNotFound(id));
        }
        self.slots
            .get_mut(id.slot as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(InvariantViolation::StepNotFound(id))
    }
}

/// Pipelines compare by their live step sequences, not by arena layout: two
/// pipelines that went through different surgeries but ended with the same
/// steps in the same order are equal.
impl PartialEq for Pipeline {
    fn eq(&self, other: &Pipeline) -> bool {
        self.len == other.len && self.steps().eq(other.steps())
    }
}
