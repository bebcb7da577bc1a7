//! Reusable view components.

pub mod research_graph;
