//! Relationship graph between trainers and clients, and the scenario classifier.

pub mod graph;
pub mod model;

pub use graph::RelationshipGraph;
pub use model::{ConnectionStatus, Edge, Scenario};
