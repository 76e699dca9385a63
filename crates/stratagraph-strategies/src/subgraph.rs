//! Subgraph-view decoration.
//!
//! Given a vertex predicate and/or an edge predicate, this strategy rewrites
//! a pipeline so that no path through it can yield an element the predicates
//! exclude, regardless of which step produced the element:
//!
//! - a vertex filter is injected after every vertex-producing step,
//! - an edge filter after every edge-producing step,
//! - fused vertex hops (which walk an edge without exposing it) are
//!   decomposed into an edge hop plus an endpoint resolution whenever an
//!   edge predicate is active, because the edge is otherwise invisible to
//!   the predicate.
//!
//! A vertex predicate also implies an edge condition even when the caller
//! never phrased one: an edge whose endpoint is excluded must not be
//! traversed. The builder synthesizes that condition as the conjunction
//! "head endpoint satisfies the vertex predicate AND tail endpoint satisfies
//! the vertex predicate" and conjoins it onto any caller-supplied edge
//! predicate.

use thiserror::Error;
use tracing::debug;

use stratagraph_pipeline::{
    Direction, Endpoint, InvariantViolation, Pipeline, Predicate, Step, StepId, StepKind, StepTag,
    TraversalStrategy,
};

/// Invalid strategy construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("a subgraph view requires a vertex predicate, an edge predicate, or both")]
    MissingPredicate,
}

/// Restricts a traversal to the subgraph admitted by the configured
/// predicates. Build one with [`SubgraphStrategy::build`].
#[derive(Debug, Clone)]
pub struct SubgraphStrategy {
    vertex_predicate: Option<Predicate>,
    edge_predicate: Option<Predicate>,
}

impl SubgraphStrategy {
    pub fn build() -> SubgraphStrategyBuilder {
        SubgraphStrategyBuilder::default()
    }

    pub fn vertex_predicate(&self) -> Option<&Predicate> {
        self.vertex_predicate.as_ref()
    }

    /// The effective edge predicate, including any synthesized endpoint
    /// conditions.
    pub fn edge_predicate(&self) -> Option<&Predicate> {
        self.edge_predicate.as_ref()
    }

    /// Insert a filter for `predicate` right after `anchor`, unless the
    /// immediately following step is already that exact filter. The skip is
    /// what makes re-application a no-op.
    fn insert_filter_after(
        pipeline: &mut Pipeline,
        anchor: StepId,
        predicate: &Predicate,
    ) -> Result<(), InvariantViolation> {
        if let Some(next) = pipeline.next_of(anchor) {
            if let Some(step) = pipeline.get(next) {
                if matches!(&step.kind, StepKind::Filter { predicate: existing } if existing == predicate)
                {
                    return Ok(());
                }
            }
        }
        pipeline.insert_after(
            Step::new(StepKind::Filter {
                predicate: predicate.clone(),
            }),
            anchor,
        )?;
        Ok(())
    }

    /// Rewrite one fused vertex hop. With no edge predicate the edge is never
    /// inspected, so a vertex filter after the hop suffices. With an edge
    /// predicate the hop is decomposed so the edge becomes a first-class
    /// traverser: `EdgeHop → Filter(edge) → EdgeEndpoint → [Filter(vertex)]`.
    fn rewrite_fused_hop(
        &self,
        pipeline: &mut Pipeline,
        hop: StepId,
    ) -> Result<(), InvariantViolation> {
        let (direction, edge_labels) = match pipeline.get(hop).map(|step| &step.kind) {
            Some(StepKind::FusedVertexHop {
                direction,
                edge_labels,
            }) => (*direction, edge_labels.clone()),
            // Concurrent strategies may have rewritten it already.
            _ => return Ok(()),
        };

        let Some(edge_predicate) = &self.edge_predicate else {
            if let Some(vertex_predicate) = &self.vertex_predicate {
                Self::insert_filter_after(pipeline, hop, vertex_predicate)?;
            }
            return Ok(());
        };

        debug!(?direction, "decomposing fused vertex hop for edge predicate");

        let endpoint = if direction == Direction::Both {
            Endpoint::Other
        } else {
            Endpoint::Fixed {
                direction: direction.opposite(),
            }
        };

        // The replacement keeps the fused step's handle, position, and
        // output labels.
        pipeline.replace(
            hop,
            Step::new(StepKind::EdgeHop {
                direction,
                edge_labels,
            }),
        )?;
        let edge_filter = pipeline.insert_after(
            Step::new(StepKind::Filter {
                predicate: edge_predicate.clone(),
            }),
            hop,
        )?;
        let resolve =
            pipeline.insert_after(Step::new(StepKind::EdgeEndpoint { endpoint }), edge_filter)?;
        if let Some(vertex_predicate) = &self.vertex_predicate {
            Self::insert_filter_after(pipeline, resolve, vertex_predicate)?;
        }
        Ok(())
    }
}

impl TraversalStrategy for SubgraphStrategy {
    fn apply(&self, pipeline: &mut Pipeline) -> Result<(), InvariantViolation> {
        // Collect every target before any surgery; arena handles stay valid
        // across the insertions below.
        let fused_hops = pipeline.find_by_kind(StepTag::FusedVertexHop);

        if let Some(vertex_predicate) = &self.vertex_predicate {
            let mut producers = pipeline.find_by_kind(StepTag::EntryVertex);
            producers.extend(pipeline.find_by_kind(StepTag::AddVertex));
            producers.extend(pipeline.find_by_kind(StepTag::EdgeEndpoint));
            for id in producers {
                Self::insert_filter_after(pipeline, id, vertex_predicate)?;
            }
        }

        if let Some(edge_predicate) = &self.edge_predicate {
            let mut producers = pipeline.find_by_kind(StepTag::EntryEdge);
            producers.extend(pipeline.find_by_kind(StepTag::AddEdge));
            producers.extend(pipeline.find_by_kind(StepTag::EdgeHop));
            for id in producers {
                Self::insert_filter_after(pipeline, id, edge_predicate)?;
            }
        }

        // Fused hops last: decomposition inserts its own filters.
        for hop in fused_hops {
            self.rewrite_fused_hop(pipeline, hop)?;
        }
        Ok(())
    }
}

/// Builder for [`SubgraphStrategy`].
#[derive(Debug, Clone, Default)]
pub struct SubgraphStrategyBuilder {
    vertex_predicate: Option<Predicate>,
    edge_predicate: Option<Predicate>,
}

impl SubgraphStrategyBuilder {
    pub fn vertex_predicate(mut self, predicate: Predicate) -> Self {
        self.vertex_predicate = Some(predicate);
        self
    }

    pub fn edge_predicate(mut self, predicate: Predicate) -> Self {
        self.edge_predicate = Some(predicate);
        self
    }

    /// Finalize the strategy, synthesizing the implied endpoint conditions
    /// when a vertex predicate is present.
    pub fn create(self) -> Result<SubgraphStrategy, ConfigurationError> {
        if self.vertex_predicate.is_none() && self.edge_predicate.is_none() {
            return Err(ConfigurationError::MissingPredicate);
        }

        let edge_predicate = match &self.vertex_predicate {
            // No vertex predicate: nothing to test on either side of an edge.
            None => self.edge_predicate,
            Some(vertex_predicate) => {
                let head = endpoint_clause(Direction::In, vertex_predicate);
                let tail = endpoint_clause(Direction::Out, vertex_predicate);
                Some(match self.edge_predicate {
                    None => Predicate::and(vec![head, tail]),
                    Some(mut edge_predicate) => {
                        edge_predicate.push_clause(head);
                        edge_predicate.push_clause(tail);
                        edge_predicate
                    }
                })
            }
        };

        Ok(SubgraphStrategy {
            vertex_predicate: self.vertex_predicate,
            edge_predicate,
        })
    }
}

/// "The vertex at this end of the edge satisfies the vertex predicate", as a
/// boolean sub-pipeline.
fn endpoint_clause(direction: Direction, vertex_predicate: &Predicate) -> Pipeline {
    let mut clause = Pipeline::new();
    clause.push_back(Step::new(StepKind::EdgeEndpoint {
        endpoint: Endpoint::Fixed { direction },
    }));
    clause.push_back(Step::new(StepKind::Filter {
        predicate: vertex_predicate.clone(),
    }));
    clause
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_predicate(name: &str) -> Predicate {
        // Stand-in for a `has(...)` sub-query: a single filter clause whose
        // inner predicate carries a recognizable pipeline.
        let mut clause = Pipeline::new();
        clause.push_back(Step::new(StepKind::EntryVertex).with_label(name));
        Predicate::from_pipeline(clause)
    }

    fn edge_label_predicate(name: &str) -> Predicate {
        let mut clause = Pipeline::new();
        clause.push_back(Step::new(StepKind::EntryEdge).with_label(name));
        Predicate::from_pipeline(clause)
    }

    fn tags(pipeline: &Pipeline) -> Vec<StepTag> {
        pipeline.steps().map(|step| step.kind.tag()).collect()
    }

    #[test]
    fn builder_requires_at_least_one_predicate() {
        let err = SubgraphStrategy::build().create().unwrap_err();
        assert_eq!(err, ConfigurationError::MissingPredicate);
    }

    #[test]
    fn edge_only_builder_leaves_vertex_predicate_unset() {
        let strategy = SubgraphStrategy::build()
            .edge_predicate(edge_label_predicate("weight"))
            .create()
            .unwrap();
        assert!(strategy.vertex_predicate().is_none());
        assert_eq!(
            strategy.edge_predicate(),
            Some(&edge_label_predicate("weight"))
        );
    }

    #[test]
    fn vertex_only_builder_synthesizes_endpoint_edge_predicate() {
        let vp = label_predicate("person");
        let strategy = SubgraphStrategy::build()
            .vertex_predicate(vp.clone())
            .create()
            .unwrap();

        let expected = Predicate::and(vec![
            endpoint_clause(Direction::In, &vp),
            endpoint_clause(Direction::Out, &vp),
        ]);
        assert_eq!(strategy.edge_predicate(), Some(&expected));
    }

    #[test]
    fn both_predicates_conjoin_endpoint_conditions_onto_the_edge_predicate() {
        let vp = label_predicate("person");
        let ep = edge_label_predicate("knows");
        let strategy = SubgraphStrategy::build()
            .vertex_predicate(vp.clone())
            .edge_predicate(ep.clone())
            .create()
            .unwrap();

        let effective = strategy.edge_predicate().unwrap();
        assert_eq!(effective.clauses().len(), ep.clauses().len() + 2);
        assert_eq!(effective.clauses()[0], ep.clauses()[0]);
        assert_eq!(effective.clauses()[1], endpoint_clause(Direction::In, &vp));
        assert_eq!(effective.clauses()[2], endpoint_clause(Direction::Out, &vp));
    }

    #[test]
    fn vertex_filter_is_inserted_after_every_vertex_producer() {
        let strategy = SubgraphStrategy::build()
            .vertex_predicate(label_predicate("person"))
            .create()
            .unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.push_back(Step::new(StepKind::EntryVertex));
        pipeline.push_back(Step::new(StepKind::AddVertex));
        pipeline.push_back(Step::new(StepKind::EdgeEndpoint {
            endpoint: Endpoint::Other,
        }));
        strategy.apply(&mut pipeline).unwrap();

        assert_eq!(
            tags(&pipeline),
            vec![
                StepTag::EntryVertex,
                StepTag::Filter,
                StepTag::AddVertex,
                StepTag::Filter,
                StepTag::EdgeEndpoint,
                StepTag::Filter,
            ]
        );
    }

    #[test]
    fn edge_filter_is_inserted_after_every_edge_producer() {
        let strategy = SubgraphStrategy::build()
            .edge_predicate(edge_label_predicate("knows"))
            .create()
            .unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.push_back(Step::new(StepKind::EntryEdge));
        pipeline.push_back(Step::new(StepKind::AddEdge));
        pipeline.push_back(Step::new(StepKind::EdgeHop {
            direction: Direction::Out,
            edge_labels: vec![],
        }));
        strategy.apply(&mut pipeline).unwrap();

        assert_eq!(
            tags(&pipeline),
            vec![
                StepTag::EntryEdge,
                StepTag::Filter,
                StepTag::AddEdge,
                StepTag::Filter,
                StepTag::EdgeHop,
                StepTag::Filter,
            ]
        );
    }

    #[test]
    fn fused_hop_without_edge_predicate_only_gains_a_vertex_filter() {
        // Vertex predicate alone still synthesizes an edge predicate, so to
        // exercise the no-decomposition path the strategy must be edge-free:
        // that only happens when the caller supplies no vertex predicate
        // either, which the builder rejects. Model it directly instead.
        let strategy = SubgraphStrategy {
            vertex_predicate: Some(label_predicate("person")),
            edge_predicate: None,
        };

        let mut pipeline = Pipeline::new();
        pipeline.push_back(Step::new(StepKind::EntryVertex));
        pipeline.push_back(Step::new(StepKind::FusedVertexHop {
            direction: Direction::Out,
            edge_labels: vec!["knows".into()],
        }));
        strategy.apply(&mut pipeline).unwrap();

        assert_eq!(
            tags(&pipeline),
            vec![
                StepTag::EntryVertex,
                StepTag::Filter,
                StepTag::FusedVertexHop,
                StepTag::Filter,
            ]
        );
    }

    #[test]
    fn fused_hop_with_edge_predicate_is_decomposed_in_order() {
        let strategy = SubgraphStrategy::build()
            .vertex_predicate(label_predicate("person"))
            .create()
            .unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.push_back(Step::new(StepKind::EntryVertex));
        let hop = pipeline.push_back(
            Step::new(StepKind::FusedVertexHop {
                direction: Direction::Out,
                edge_labels: vec!["knows".into()],
            })
            .with_label("friend"),
        );
        strategy.apply(&mut pipeline).unwrap();

        assert_eq!(
            tags(&pipeline),
            vec![
                StepTag::EntryVertex,
                StepTag::Filter,
                StepTag::EdgeHop,
                StepTag::Filter,
                StepTag::EdgeEndpoint,
                StepTag::Filter,
            ]
        );

        // The replacement edge hop keeps the fused hop's handle, direction,
        // edge-label restriction, and output labels.
        let replaced = pipeline.get(hop).unwrap();
        assert!(replaced.labels.contains("friend"));
        match &replaced.kind {
            StepKind::EdgeHop {
                direction,
                edge_labels,
            } => {
                assert_eq!(*direction, Direction::Out);
                assert_eq!(edge_labels, &vec!["knows".to_string()]);
            }
            other => panic!("expected edge hop, got {other:?}"),
        }

        // A one-sided hop resolves the endpoint at the opposite end.
        let resolve_id = pipeline.find_by_kind(StepTag::EdgeEndpoint)[0];
        assert_eq!(
            pipeline.get(resolve_id).unwrap().kind,
            StepKind::EdgeEndpoint {
                endpoint: Endpoint::Fixed {
                    direction: Direction::In
                }
            }
        );
    }

    #[test]
    fn bidirectional_fused_hop_resolves_the_other_endpoint() {
        let strategy = SubgraphStrategy::build()
            .vertex_predicate(label_predicate("person"))
            .create()
            .unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.push_back(Step::new(StepKind::FusedVertexHop {
            direction: Direction::Both,
            edge_labels: vec![],
        }));
        strategy.apply(&mut pipeline).unwrap();

        let resolve_id = pipeline.find_by_kind(StepTag::EdgeEndpoint)[0];
        assert_eq!(
            pipeline.get(resolve_id).unwrap().kind,
            StepKind::EdgeEndpoint {
                endpoint: Endpoint::Other
            }
        );
    }

    #[test]
    fn decomposition_filters_carry_the_effective_predicates() {
        let vp = label_predicate("person");
        let strategy = SubgraphStrategy::build()
            .vertex_predicate(vp.clone())
            .create()
            .unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.push_back(Step::new(StepKind::FusedVertexHop {
            direction: Direction::In,
            edge_labels: vec![],
        }));
        strategy.apply(&mut pipeline).unwrap();

        let filters = pipeline.find_by_kind(StepTag::Filter);
        assert_eq!(filters.len(), 2);
        let edge_filter = pipeline.get(filters[0]).unwrap();
        let vertex_filter = pipeline.get(filters[1]).unwrap();
        assert_eq!(
            edge_filter.kind,
            StepKind::Filter {
                predicate: strategy.edge_predicate().unwrap().clone()
            }
        );
        assert_eq!(
            vertex_filter.kind,
            StepKind::Filter {
                predicate: vp
            }
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let strategy = SubgraphStrategy::build()
            .vertex_predicate(label_predicate("person"))
            .edge_predicate(edge_label_predicate("knows"))
            .create()
            .unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.push_back(Step::new(StepKind::EntryVertex));
        pipeline.push_back(Step::new(StepKind::FusedVertexHop {
            direction: Direction::Both,
            edge_labels: vec![],
        }));
        pipeline.push_back(Step::new(StepKind::EntryEdge));

        strategy.apply(&mut pipeline).unwrap();
        let once = pipeline.clone();
        strategy.apply(&mut pipeline).unwrap();
        assert_eq!(pipeline, once);
    }
}
