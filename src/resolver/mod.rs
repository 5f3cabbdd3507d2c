//! Resolution of deferred values and binding of access rules.
//!
//! [`Resolver`] realizes nodes in dependency order and substitutes every
//! deferred value once its source has published. [`AccessRuleBinder`] runs
//! afterwards and turns access rules into a [`SecurityConfig`].

mod binder;
mod engine;

pub use binder::{AccessRuleBinder, GroupRules, IngressRule, SecurityConfig, SECURITY_GROUP_OUTPUT};
pub use engine::{resolve_properties, Resolver, Sources, DEFAULT_PARALLELISM};
