//! Configuration module for stackweave.
//!
//! This module handles all configuration-related functionality:
//! - External parameters and their validation
//! - Parsing `stackweave.yaml` stack files and their `${...}` references
//! - Building a [`crate::model::Stack`] from a stack file
//! - Computing declaration hashes for change detection

mod builder;
mod hash;
mod parameters;
mod parser;
mod spec;
mod template;
mod validator;

pub use builder::build_stack;
pub use hash::ConfigHasher;
pub use parameters::Parameters;
pub use parser::{find_config_file, ConfigParser, DEFAULT_CONFIG_FILES};
pub use spec::{
    AccessRuleConfig, ParameterSpec, ProviderConfig, ProviderKind, ResourceConfig, StackConfig,
    StackSection, StateConfig,
};
pub use template::{parse_property, parse_template, JSON_KEY};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
