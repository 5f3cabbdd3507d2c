//! Stack file types.
//!
//! This module defines the structs that map to a `stackweave.yaml` file.
//! Resource properties are kept as raw YAML here; `${node.output}` references
//! inside them are parsed when the stack is built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Permission, Protocol, ResourceKind};

/// The root structure of a stack file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackConfig {
    /// Stack-level settings.
    pub stack: StackSection,
    /// External parameters the stack reads.
    #[serde(default)]
    pub parameters: ParameterSpec,
    /// Realization backend.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Where plans are persisted.
    #[serde(default)]
    pub state: StateConfig,
    /// Declared resources, in declaration order.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// Access rules between resources.
    #[serde(default)]
    pub access_rules: Vec<AccessRuleConfig>,
}

/// Stack-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackSection {
    /// Stack name.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// External parameter declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterSpec {
    /// Names that must be set before anything is declared.
    #[serde(default)]
    pub required: Vec<String>,
    /// Values used when the environment does not set a name.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// Realization backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Backend type.
    #[serde(default)]
    pub kind: ProviderKind,
    /// Base URL of the provisioning service (http backend).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token (http backend).
    #[serde(default)]
    pub token_env: Option<String>,
    /// Request timeout in seconds (http backend).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Maximum number of concurrent realizations.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

/// Realization backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Deterministic in-process simulation.
    #[default]
    Simulated,
    /// Remote provisioning service over HTTP.
    Http,
}

/// Plan persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Directory holding the plan store (defaults to `.stackweave`).
    #[serde(default)]
    pub path: Option<String>,
}

/// A single declared resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// Unique identity within the stack.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Property bag; strings may contain `${node.output}` references.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_yaml::Value>,
    /// Explicit ordering dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A declared access rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessRuleConfig {
    /// Resource whose boundary is opened.
    pub target: String,
    /// Resource allowed in.
    pub source: String,
    /// Protocol (defaults to all traffic).
    #[serde(default)]
    pub protocol: Protocol,
    /// First port of the range.
    #[serde(default)]
    pub from_port: Option<u16>,
    /// Last port of the range; defaults to `from_port`.
    #[serde(default)]
    pub to_port: Option<u16>,
}

impl AccessRuleConfig {
    /// Returns the permission this rule grants.
    #[must_use]
    pub fn permission(&self) -> Permission {
        Permission {
            protocol: self.protocol,
            from_port: self.from_port,
            to_port: self.to_port.or(self.from_port),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            endpoint: None,
            token_env: None,
            timeout_secs: None,
            parallelism: default_parallelism(),
        }
    }
}

impl StackConfig {
    /// Finds a resource by name.
    #[must_use]
    pub fn find_resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Returns every parameter name the stack mentions, required first.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parameters.required.iter().map(String::as_str).collect();
        for name in self.parameters.defaults.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

const fn default_parallelism() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_rule_single_port() {
        let rule = AccessRuleConfig {
            target: String::from("database"),
            source: String::from("service"),
            protocol: Protocol::Tcp,
            from_port: Some(5432),
            to_port: None,
        };
        assert_eq!(rule.permission(), Permission::tcp(5432));
    }

    #[test]
    fn test_parameter_names_deduplicated() {
        let config = StackConfig {
            stack: StackSection {
                name: String::from("test"),
                environment: default_environment(),
            },
            parameters: ParameterSpec {
                required: vec![String::from("DOMAIN_NAME")],
                defaults: [
                    (String::from("DOMAIN_NAME"), String::from("localhost")),
                    (String::from("REGION"), String::from("us-east-1")),
                ]
                .into_iter()
                .collect(),
            },
            provider: ProviderConfig::default(),
            state: StateConfig::default(),
            resources: vec![],
            access_rules: vec![],
        };
        assert_eq!(config.parameter_names(), vec!["DOMAIN_NAME", "REGION"]);
        assert_eq!(config.provider.parallelism, 1);
    }
}
