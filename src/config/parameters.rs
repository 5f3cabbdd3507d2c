//! External configuration parameters.
//!
//! Parameters are a flat name/value mapping (a public domain name, a license
//! key, ...) that stack definitions read while declaring resources. Required
//! names are validated up front so a missing value aborts before any graph is
//! built or any resource is touched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Flat mapping of external parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, String>,
}

impl Parameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the named parameters from the process environment.
    ///
    /// Names that are not set are skipped; presence is checked by [`Self::require`].
    #[must_use]
    pub fn from_env<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut params = Self::new();
        for name in names {
            if let Ok(value) = std::env::var(name) {
                debug!("Read parameter {name} from environment");
                params.set(name, value);
            }
        }
        params
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns a builder-style copy with one more parameter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Layers `other` on top of these parameters; `other` wins on conflicts.
    #[must_use]
    pub fn overlay(mut self, other: Self) -> Self {
        self.values.extend(other.values);
        self
    }

    /// Returns a parameter value if it is set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns a parameter that must be present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `MissingConfiguration` naming the parameter.
    pub fn get_required(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::missing(name).into()),
        }
    }

    /// Checks that every named parameter is present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `MissingConfiguration` for the first absent name.
    pub fn require<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            self.get_required(name)?;
        }
        Ok(())
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
