// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # stackweave
//!
//! A declarative resource graph with deferred-value resolution for
//! multi-resource cloud stacks.
//!
//! ## Overview
//!
//! A stack is a set of resource nodes whose properties may refer to outputs
//! of other nodes that do not exist yet. stackweave:
//!
//! - Infers dependency edges from those references and from explicit ordering
//! - Rejects duplicate identities, dangling references and cycles before
//!   anything is provisioned
//! - Realizes nodes in a stable dependency order, substituting every deferred
//!   value with the concrete output it refers to
//! - Binds access rules between realized nodes into a security configuration
//! - Produces a fully concrete [`DeploymentPlan`]
//!
//! ## Architecture
//!
//! 1. **Declaration**: a [`Stack`] built in code ([`stacks`]) or from a
//!    `stackweave.yaml` file ([`config`])
//! 2. **Graph**: edge inference and topological planning ([`graph`])
//! 3. **Resolution**: realization through a [`Realizer`] ([`resolver`],
//!    [`provider`])
//! 4. **Plan**: the concrete result, persisted by a plan store ([`state`])
//!
//! ## Modules
//!
//! - [`model`]: Resource nodes, deferred values, access rules, stacks
//! - [`graph`]: Dependency graph and execution order
//! - [`resolver`]: Deferred-value resolution and access-rule binding
//! - [`provider`]: Realizers (simulated, HTTP)
//! - [`engine`]: End-to-end orchestration
//! - [`config`]: Stack files, parameters, validation, hashing
//! - [`stacks`]: Built-in stack definitions
//! - [`state`]: Deployment record storage
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! stack:
//!   name: my-app
//!
//! resources:
//!   - name: vpc
//!     kind: network
//!   - name: database
//!     kind: database-cluster
//!     properties:
//!       vpc_id: ${vpc.vpc_id}
//!   - name: service
//!     kind: container-service
//!     properties:
//!       DATABASE_URL: postgres://${database.socket_address}/app
//!
//! access_rules:
//!   - target: database
//!     source: service
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod plan;
pub mod provider;
pub mod resolver;
pub mod stacks;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, Parameters, StackConfig};
pub use engine::{Engine, PreparedStack};
pub use error::{Result, StackError};
pub use graph::{DependencyGraph, ExecutionOrder, build_graph};
pub use model::{AccessRule, Deferred, NodeHandle, NodeId, Permission, ResourceKind, ResourceNode, Stack, Value};
pub use plan::{DeploymentPlan, ResolvedNode};
pub use provider::{HttpRealizer, Realizer, SimulatedRealizer};
pub use resolver::{AccessRuleBinder, Resolver, SecurityConfig};
pub use state::{DeploymentRecord, LocalPlanStore, PlanStore};
