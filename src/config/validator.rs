//! Stack file validation.
//!
//! This module checks a parsed stack file for problems that can be reported
//! without building the graph: naming, duplicate resources, dangling
//! `depends_on` and access-rule names, provider settings, and required
//! parameters.

use crate::error::{ConfigError, Result, StackError};
use std::collections::HashSet;
use tracing::debug;

use super::parameters::Parameters;
use super::spec::{ProviderConfig, ProviderKind, ResourceConfig, StackConfig};

/// Concurrency above which a warning is emitted.
const HIGH_PARALLELISM: usize = 16;

/// Validator for stack files.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a stack file against its parameters.
    ///
    /// A missing required parameter is reported as `MissingConfiguration`
    /// before any other problem.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &StackConfig, parameters: &Parameters) -> Result<ValidationResult> {
        parameters.require(config.parameters.required.iter().map(String::as_str))?;

        let result = self.check(config);
        if result.errors.is_empty() {
            debug!("Stack validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StackError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Collects every problem without failing.
    #[must_use]
    pub fn check(&self, config: &StackConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_stack(config, &mut result);
        Self::validate_provider(&config.provider, &mut result);
        Self::validate_resources(&config.resources, &mut result);
        Self::validate_access_rules(config, &mut result);

        result
    }

    /// Validates stack-level settings.
    fn validate_stack(config: &StackConfig, result: &mut ValidationResult) {
        let name = &config.stack.name;
        if name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("stack.name"),
                message: String::from("Stack name cannot be empty"),
            });
        } else if !is_valid_name(name) {
            result.errors.push(ValidationError {
                field: String::from("stack.name"),
                message: format!("Stack name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."),
            });
        }

        if config.stack.environment.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("stack.environment"),
                message: String::from("Environment cannot be empty"),
            });
        }
    }

    /// Validates provider settings.
    fn validate_provider(provider: &ProviderConfig, result: &mut ValidationResult) {
        if provider.kind == ProviderKind::Http && provider.endpoint.as_ref().is_none_or(String::is_empty) {
            result.errors.push(ValidationError {
                field: String::from("provider.endpoint"),
                message: String::from("An endpoint is required when using the http provider"),
            });
        }

        if provider.parallelism == 0 {
            result.errors.push(ValidationError {
                field: String::from("provider.parallelism"),
                message: String::from("Parallelism must be at least 1"),
            });
        } else if provider.parallelism > HIGH_PARALLELISM {
            result.warnings.push(format!(
                "provider.parallelism: {} concurrent realizations may exceed backend rate limits",
                provider.parallelism
            ));
        }

        if provider.kind == ProviderKind::Simulated && provider.endpoint.is_some() {
            result
                .warnings
                .push(String::from("provider.endpoint: Ignored by the simulated provider"));
        }
    }

    /// Validates resource declarations.
    fn validate_resources(resources: &[ResourceConfig], result: &mut ValidationResult) {
        if resources.is_empty() {
            result.warnings.push(String::from("No resources defined in stack"));
            return;
        }

        let declared: HashSet<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        let mut seen_names = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if !seen_names.insert(resource.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate resource name: {}", resource.name),
                });
            }

            if !is_valid_name(&resource.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        resource.name
                    ),
                });
            }

            for (j, dependency) in resource.depends_on.iter().enumerate() {
                if dependency == &resource.name {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.depends_on[{j}]"),
                        message: format!("Resource '{}' depends on itself", resource.name),
                    });
                } else if !declared.contains(dependency.as_str()) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.depends_on[{j}]"),
                        message: format!("Unknown resource '{dependency}'"),
                    });
                }
            }
        }
    }

    /// Validates access rules.
    fn validate_access_rules(config: &StackConfig, result: &mut ValidationResult) {
        for (i, rule) in config.access_rules.iter().enumerate() {
            let prefix = format!("access_rules[{i}]");

            for (field, name) in [("target", &rule.target), ("source", &rule.source)] {
                if config.find_resource(name).is_none() {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.{field}"),
                        message: format!("Unknown resource '{name}'"),
                    });
                }
            }

            if rule.target == rule.source {
                result.errors.push(ValidationError {
                    field: prefix.clone(),
                    message: format!("Resource '{}' cannot grant access to itself", rule.target),
                });
            }

            if let (Some(from), Some(to)) = (rule.from_port, rule.to_port)
                && from > to
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.to_port"),
                    message: format!("Port range {from}-{to} is inverted"),
                });
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    let mut chars = name.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    if chars.any(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
