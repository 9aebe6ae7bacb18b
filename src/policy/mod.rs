//! Source precedence and analysis policy definitions.

pub mod source;
pub mod v1;

pub use source::{SourcePrecedence, SourceSelection, DEFAULT_AUTHORITATIVE_SOURCE, DEFAULT_LEGACY_SOURCE};
pub use v1::AnalysisPolicyV1;
