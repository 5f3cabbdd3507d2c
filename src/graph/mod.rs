//! Dependency graph and topological planning.
//!
//! This module turns a stack's declarations into a graph of ordering edges and
//! computes a creation order from it, rejecting self references, references to
//! undeclared nodes, and cycles before anything is realized.

mod builder;
mod planner;

pub use builder::{build_graph, DependencyGraph, Edge, EdgeOrigin};
pub use planner::{plan, ExecutionOrder};
