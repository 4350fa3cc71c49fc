//! Reconciliation context and provider configuration

use crate::error::{Error, Result};
use crate::selector::Selectors;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Key-value configuration handed to collectors and controllers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Boolean value, accepting `true/false`, `yes/no`, `on/off` and `1/0`
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(Error::InvalidConfiguration {
                key: key.to_string(),
                reason: format!("'{value}' is not a boolean"),
            }),
        }
    }

    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|value| {
                value.parse().map_err(|e: T::Err| Error::InvalidConfiguration {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Per-run parameters of a reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconciliationContext {
    /// Only describe changes, never apply them
    pub dry_run: bool,
    /// Selectors restricting which resources take part
    pub selectors: Selectors,
    /// Provider configuration
    pub configuration: Configuration,
    /// Delete actual resources with no desired counterpart
    pub delete_orphans: bool,
    /// Worker threads for execution, `None` for the default pool
    pub jobs: Option<usize>,
}

impl ReconciliationContext {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            ..Self::default()
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_selectors(mut self, selectors: Selectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn delete_orphans(mut self, delete_orphans: bool) -> Self {
        self.delete_orphans = delete_orphans;
        self
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let config = Configuration::new()
            .with("create_parents", "yes")
            .with("mode", "0644")
            .with("retries", "three");

        assert_eq!(config.get("mode"), Some("0644"));
        assert_eq!(config.get_bool("create_parents").unwrap(), Some(true));
        assert_eq!(config.get_bool("absent").unwrap(), None);
        assert_eq!(config.get_parsed::<u32>("mode").unwrap(), Some(644));

        let err = config.get_parsed::<u32>("retries").unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { ref key, .. } if key == "retries"));
        assert!(config.get_bool("mode").is_err());
    }

    #[test]
    fn test_configuration_deserializes_from_map() {
        let config: Configuration = serde_json::from_str(r#"{"b": "2", "a": "1"}"#).unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config.iter().next(), Some(("a", "1")));
    }
}
