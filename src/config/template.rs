//! Reference syntax inside stack file properties.
//!
//! String properties may embed:
//! - `${node.output}`: another node's output
//! - `${node.output|json:key}`: one field of a JSON output
//! - `${node.output|string}`: an output rendered as text
//! - `${param:NAME}`: a configuration parameter, substituted immediately
//!
//! `$${` produces a literal `${`. A string that is exactly one reference keeps
//! the output's type; anything else becomes an interpolated string. A mapping
//! whose only key is `$json` embeds its value as JSON text.

use crate::error::{ConfigError, Result};
use crate::model::{Deferred, NodeId, Value};

use super::parameters::Parameters;

/// Mapping key that embeds its value as JSON text.
pub const JSON_KEY: &str = "$json";

enum Part {
    Text(String),
    Reference(Deferred),
}

/// Converts a raw YAML property into a property value.
///
/// # Errors
///
/// Returns `InvalidReference` for malformed references, `ParseError` for
/// YAML that has no property equivalent, and `MissingConfiguration` for an
/// unset `${param:NAME}`.
pub fn parse_property(node: &str, raw: &serde_yaml::Value, params: &Parameters) -> Result<Value> {
    match raw {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => number(node, n),
        serde_yaml::Value::String(s) => parse_template(node, s, params),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(|item| parse_property(node, item, params))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        serde_yaml::Value::Mapping(map) => {
            if map.len() == 1
                && let Some(inner) = map.get(JSON_KEY)
            {
                return Ok(Value::json(parse_property(node, inner, params)?));
            }

            let mut object = std::collections::BTreeMap::new();
            for (key, value) in map {
                let serde_yaml::Value::String(key) = key else {
                    return Err(parse_error(node, format!("non-string key {key:?}")));
                };
                object.insert(key.clone(), parse_property(node, value, params)?);
            }
            Ok(Value::Object(object))
        }
        serde_yaml::Value::Tagged(tagged) => Err(parse_error(
            node,
            format!("unsupported YAML tag {}", tagged.tag),
        )),
    }
}

/// Parses one string property into a literal, a reference, or an interpolation.
///
/// # Errors
///
/// See [`parse_property`].
pub fn parse_template(node: &str, text: &str, params: &Parameters) -> Result<Value> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(start) = rest.find('$') {
        literal.push_str(&rest[..start]);
        let tail = &rest[start..];

        if let Some(after) = tail.strip_prefix("$${") {
            literal.push_str("${");
            rest = after;
            continue;
        }
        let Some(body_start) = tail.strip_prefix("${") else {
            literal.push('$');
            rest = &tail[1..];
            continue;
        };
        let Some(end) = body_start.find('}') else {
            return Err(invalid(node, tail, "unterminated reference"));
        };
        let body = &body_start[..end];
        rest = &body_start[end + 1..];

        if let Some(name) = body.strip_prefix("param:") {
            literal.push_str(params.get_required(name.trim())?);
            continue;
        }

        if !literal.is_empty() {
            parts.push(Part::Text(std::mem::take(&mut literal)));
        }
        parts.push(Part::Reference(parse_reference(node, body)?));
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(Part::Text(literal));
    }

    Ok(match parts.len() {
        0 => Value::String(String::new()),
        1 => match parts.pop() {
            Some(Part::Reference(deferred)) => Value::Deferred(deferred),
            Some(Part::Text(text)) => Value::String(text),
            None => Value::String(String::new()),
        },
        _ => Value::Interpolate(
            parts
                .into_iter()
                .map(|part| match part {
                    Part::Text(text) => Value::String(text),
                    Part::Reference(deferred) => Value::Deferred(deferred),
                })
                .collect(),
        ),
    })
}

fn parse_reference(node: &str, body: &str) -> Result<Deferred> {
    let (target, transform) = match body.split_once('|') {
        Some((target, transform)) => (target.trim(), Some(transform.trim())),
        None => (body.trim(), None),
    };

    let Some((source, output)) = target.split_once('.') else {
        return Err(invalid(node, body, "expected 'node.output'"));
    };
    if source.is_empty() || output.is_empty() {
        return Err(invalid(node, body, "node and output must not be empty"));
    }

    let deferred = Deferred::new(NodeId::from(source), output);
    match transform {
        None => Ok(deferred),
        Some("string") => Ok(deferred.stringify()),
        Some(other) => match other.strip_prefix("json:") {
            Some(key) if !key.is_empty() => Ok(deferred.json_field(key)),
            _ => Err(invalid(node, body, "unknown transform, expected 'json:KEY' or 'string'")),
        },
    }
}

fn number(node: &str, n: &serde_yaml::Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        return Ok(Value::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Value::from(u));
    }
    n.as_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| parse_error(node, format!("number {n} is not representable")))
}

fn invalid(node: &str, reference: &str, message: &str) -> crate::error::StackError {
    ConfigError::InvalidReference {
        node: node.to_string(),
        reference: reference.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn parse_error(node: &str, message: String) -> crate::error::StackError {
    ConfigError::ParseError {
        message,
        location: Some(format!("resources.{node}.properties")),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use crate::model::Transform;

    fn parse(text: &str) -> Result<Value> {
        parse_template("service", text, &Parameters::new().with("DOMAIN_NAME", "bot.example.com"))
    }

    #[test]
    fn test_plain_string_is_literal() {
        assert_eq!(parse("botpress/server:v12_2_3").unwrap(), Value::from("botpress/server:v12_2_3"));
        assert_eq!(parse("costs $5").unwrap(), Value::from("costs $5"));
    }

    #[test]
    fn test_lone_reference_keeps_type() {
        let value = parse("${database.port}").unwrap();
        assert_eq!(value, Value::Deferred(Deferred::new(NodeId::from("database"), "port")));
    }

    #[test]
    fn test_interpolation_with_transform() {
        let value = parse("postgres://admin:${secret.secret_string|json:password}@${database.endpoint}/db").unwrap();
        let Value::Interpolate(parts) = value else {
            panic!("expected interpolation");
        };
        assert_eq!(parts.len(), 5);
        assert_eq!(
            parts[1],
            Value::Deferred(Deferred::new(NodeId::from("secret"), "secret_string").json_field("password"))
        );
        assert_eq!(parts[4], Value::from("/db"));
    }

    #[test]
    fn test_parameter_substituted_as_text() {
        assert_eq!(parse("https://${param:DOMAIN_NAME}").unwrap(), Value::from("https://bot.example.com"));

        let err = parse("${param:BP_LICENSE_KEY}").unwrap_err();
        assert!(matches!(err, StackError::Config(ConfigError::MissingConfiguration { .. })));
    }

    #[test]
    fn test_escape_produces_literal() {
        assert_eq!(parse("$${HOME}/bin").unwrap(), Value::from("${HOME}/bin"));
    }

    #[test]
    fn test_malformed_references_rejected() {
        for text in ["${database}", "${database.port", "${.port}", "${db.port|base64}"] {
            let err = parse(text).unwrap_err();
            assert!(
                matches!(err, StackError::Config(ConfigError::InvalidReference { .. })),
                "{text} gave {err}"
            );
        }
    }

    #[test]
    fn test_json_mapping_and_stringify() {
        let raw: serde_yaml::Value = serde_yaml::from_str(
            r#"
$json:
  - endpoint: "http://localhost:3100"
    port: ${database.port|string}
"#,
        )
        .unwrap();
        let value = parse_property("service", &raw, &Parameters::new()).unwrap();
        let Value::Json(inner) = value else {
            panic!("expected json embedding");
        };
        let mut refs = Vec::new();
        inner.collect_references(&mut refs);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].transform, Transform::Stringify);
    }
}
