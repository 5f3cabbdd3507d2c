//! Declarative resource model.
//!
//! This module defines what a stack is made of:
//! - Resource nodes with property bags and write-once outputs
//! - Deferred values that stand in for not-yet-known outputs
//! - Access rules between nodes
//! - The [`Stack`] context that collects declarations

mod access;
mod node;
mod stack;
mod value;

pub use access::{AccessRule, Permission, Protocol};
pub use node::{NodeHandle, NodeId, Outputs, ResourceKind, ResourceNode};
pub use stack::Stack;
pub use value::{render, Deferred, Properties, Transform, Value};
