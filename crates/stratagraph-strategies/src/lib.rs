//! Strategy passes that rewrite a traversal pipeline before execution.
//!
//! Two passes live here:
//!
//! - [`SubgraphStrategy`] (decoration): restricts a traversal to the
//!   subgraph admitted by vertex/edge predicates, injecting filters after
//!   every element-producing step and decomposing fused vertex hops when the
//!   edge must become visible to a predicate.
//! - [`EarlyLimitStrategy`] (optimization): relocates skip/limit windows as
//!   far upstream as is safe and merges adjacent windows arithmetically, so
//!   upstream steps stop producing results nobody will consume.
//!
//! Both passes are idempotent on their own output and compose with each
//! other in either order.

pub mod early_limit;
pub mod subgraph;

pub use early_limit::EarlyLimitStrategy;
pub use subgraph::{ConfigurationError, SubgraphStrategy, SubgraphStrategyBuilder};
