//! Relational to document schema conversion
//!
//! Tables are ordered by their foreign-key dependencies ([`queue`]), each
//! one is given a [`Placement`] by an ordered rule list ([`placement`]),
//! and the [`SchemaTransformer`] turns the placements into a collection tree.

pub mod placement;
pub mod queue;
pub mod transformer;

pub use placement::{decide, Placement};
pub use queue::dependency_order;
pub use transformer::SchemaTransformer;
