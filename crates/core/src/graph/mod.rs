//! Typed knowledge graph model and the builder that assembles it from
//! parsed PDF pages, extracted images, and detected tables/references.

mod builder;
mod model;
pub mod quality;
mod reference;

pub use builder::{build_graph, BuildInput};
pub use model::{DocumentGraph, Edge, EdgeType, GraphStats, Node, NodeId, NodeType, Position};
pub use quality::{detect_quality_flags, ContentQualityFlag, QualityFlagType};
pub use reference::{detect_references, DetectedReference, ReferenceType};
