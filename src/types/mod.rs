//! Core types for the graph kernel.

pub mod entity;
pub mod edge;
pub mod record;

pub use entity::{EntityId, PeriodKey, SourceTag};
pub use edge::Edge;
pub use record::{DependencyPair, EntityRecord, PeriodRecordSet, SchemaVariant};
