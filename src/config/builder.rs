//! Turns a parsed stack file into a [`Stack`].

use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::model::{NodeHandle, Properties, Stack};

use super::parameters::Parameters;
use super::spec::StackConfig;
use super::template::parse_property;

/// Declares every resource, edge and access rule of a stack file.
///
/// Required parameters are checked before anything is declared. Explicit
/// dependencies and access rules may name resources declared later in the file.
///
/// # Errors
///
/// Returns `MissingConfiguration` for the first absent required parameter,
/// reference parse errors, `DuplicateIdentity` for repeated names, and
/// `UnknownNode` when `depends_on` or an access rule names an undeclared
/// resource.
pub fn build_stack(config: &StackConfig, parameters: Parameters) -> Result<Stack> {
    parameters.require(config.parameters.required.iter().map(String::as_str))?;

    let mut declarations = Vec::with_capacity(config.resources.len());
    for resource in &config.resources {
        let properties = resource
            .properties
            .iter()
            .map(|(key, raw)| Ok((key.clone(), parse_property(&resource.name, raw, &parameters)?)))
            .collect::<Result<Properties>>()?;
        declarations.push((resource, properties));
    }

    let mut stack = Stack::new(&config.stack.name, parameters).with_environment(&config.stack.environment);
    let mut handles: HashMap<&str, NodeHandle> = HashMap::new();

    for (resource, properties) in declarations {
        let handle = stack.declare(resource.kind, &resource.name, properties)?;
        handles.insert(resource.name.as_str(), handle);
    }

    let lookup = |referrer: &str, name: &str| -> Result<NodeHandle> {
        handles.get(name).cloned().ok_or_else(|| {
            GraphError::UnknownNode {
                node: referrer.into(),
                missing: name.into(),
            }
            .into()
        })
    };

    for resource in &config.resources {
        for dependency in &resource.depends_on {
            let dependent = lookup(&resource.name, &resource.name)?;
            let dependency = lookup(&resource.name, dependency)?;
            debug!("Explicit edge {} -> {}", dependent.id(), dependency.id());
            stack.depends_on(&dependent, &dependency);
        }
    }

    for rule in &config.access_rules {
        let target = lookup(&rule.source, &rule.target)?;
        let source = lookup(&rule.target, &rule.source)?;
        stack.allow_from(&target, &source, rule.permission());
    }

    info!(
        "Declared stack '{}' ({}): {} resources, {} access rules",
        stack.name(),
        stack.environment(),
        stack.len(),
        stack.access_rules().len()
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::{ConfigError, StackError};
    use crate::graph::{build_graph, plan};
    use crate::model::{NodeId, Value};

    const YAML: &str = r#"
stack:
  name: demo
  environment: staging
parameters:
  required: [DOMAIN_NAME]
resources:
  - name: service
    kind: container-service
    depends_on: [cluster]
    properties:
      url: "https://${param:DOMAIN_NAME}"
      database: "${database.endpoint}:${database.port}"
  - name: database
    kind: database-cluster
    properties:
      vpc_id: ${vpc.vpc_id}
  - name: vpc
    kind: network
  - name: cluster
    kind: container-cluster
access_rules:
  - target: database
    source: service
"#;

    fn config() -> StackConfig {
        ConfigParser::new().parse_yaml(YAML, None).unwrap()
    }

    #[test]
    fn test_builds_declarations_in_file_order() {
        let stack = build_stack(&config(), Parameters::new().with("DOMAIN_NAME", "bot.example.com")).unwrap();

        assert_eq!(stack.name(), "demo");
        assert_eq!(stack.environment(), "staging");
        let names: Vec<&str> = stack.nodes().iter().map(|n| n.id().as_str()).collect();
        assert_eq!(names, vec!["service", "database", "vpc", "cluster"]);

        let service = stack.node(&NodeId::from("service")).unwrap();
        assert_eq!(service.properties()["url"], Value::from("https://bot.example.com"));
        assert_eq!(stack.explicit_edges().len(), 1);
        assert_eq!(stack.access_rules().len(), 1);
    }

    #[test]
    fn test_yaml_references_drive_order() {
        let stack = build_stack(&config(), Parameters::new().with("DOMAIN_NAME", "x")).unwrap();
        let order = plan(&build_graph(&stack).unwrap()).unwrap();
        let names: Vec<&str> = order.nodes().iter().map(NodeId::as_str).collect();
        assert_eq!(names, vec!["vpc", "database", "cluster", "service"]);
    }

    #[test]
    fn test_missing_parameter_aborts_before_declaring() {
        let err = build_stack(&config(), Parameters::new()).unwrap_err();
        assert!(matches!(
            err,
            StackError::Config(ConfigError::MissingConfiguration { ref name }) if name == "DOMAIN_NAME"
        ));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut config = config();
        config.resources[0].depends_on.push(String::from("ghost"));
        let err = build_stack(&config, Parameters::new().with("DOMAIN_NAME", "x")).unwrap_err();
        assert!(matches!(err, StackError::Graph(GraphError::UnknownNode { .. })));
    }
}
