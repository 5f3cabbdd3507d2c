//! Built-in stack definitions.

pub mod botpress;

use crate::config::Parameters;
use crate::error::{ConfigError, Result};
use crate::model::Stack;

/// Names accepted by [`builtin`].
pub const BUILTIN_STACKS: &[&str] = &[botpress::NAME];

/// Returns the parameters a built-in stack requires.
#[must_use]
pub fn required_parameters(name: &str) -> &'static [&'static str] {
    match name {
        botpress::NAME => &botpress::REQUIRED_PARAMETERS,
        _ => &[],
    }
}

/// Declares a built-in stack by name.
///
/// # Errors
///
/// Returns a validation error for an unknown name, and the stack's own
/// errors otherwise.
pub fn builtin(name: &str, parameters: &Parameters) -> Result<Stack> {
    match name {
        botpress::NAME => botpress::define(parameters),
        other => Err(ConfigError::validation(
            format!("Unknown built-in stack '{other}' (available: {})", BUILTIN_STACKS.join(", ")),
            "builtin",
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin("wordpress", &Parameters::new()).is_err());
        assert!(required_parameters("wordpress").is_empty());
        assert_eq!(required_parameters("botpress"), ["DOMAIN_NAME", "BP_LICENSE_KEY"]);
    }
}
