//! Resource selectors
//!
//! A selector is a predicate over a resource's kind, API version, name,
//! labels and annotations:
//!
//! ```text
//! metadata.labels.env = prod
//! metadata.name != scratch
//! kind in (File, Directory)
//! metadata.labels.tier notin (cache)
//! metadata.name =~ ^logs/
//! metadata.labels.owner          # label exists
//! !metadata.annotations.skip     # annotation absent
//! ```

use crate::error::{Error, Result};
use crate::resource::Resource;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static BINARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<field>[A-Za-z0-9._/-]+)\s*(?P<op>=~|!=|==|=)\s*(?P<value>.*)$")
        .expect("valid selector regex")
});

static SET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<field>[A-Za-z0-9._/-]+)\s+(?P<op>in|notin)\s*\((?P<values>[^()]*)\)$")
        .expect("valid selector regex")
});

static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<negate>!)?\s*(?P<field>[A-Za-z0-9._/-]+)$").expect("valid selector regex"));

/// Field of a resource a selector reads
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Kind,
    ApiVersion,
    Name,
    Label(String),
    Annotation(String),
}

impl Field {
    fn parse(expression: &str, field: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSelector {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };
        let field = match field {
            "kind" => Self::Kind,
            "apiVersion" => Self::ApiVersion,
            "metadata.name" | "name" => Self::Name,
            _ => {
                if let Some(key) = field.strip_prefix("metadata.labels.") {
                    Self::Label(key.to_string())
                } else if let Some(key) = field.strip_prefix("metadata.annotations.") {
                    Self::Annotation(key.to_string())
                } else {
                    return Err(invalid(&format!("unknown field '{field}'")));
                }
            }
        };
        if matches!(&field, Self::Label(k) | Self::Annotation(k) if k.is_empty()) {
            return Err(invalid("missing label or annotation key"));
        }
        Ok(field)
    }

    fn value<R: Resource + ?Sized>(&self, resource: &R) -> Option<String> {
        match self {
            Self::Kind => Some(resource.resource_type().kind),
            Self::ApiVersion => resource.resource_type().qualified_api_version(),
            Self::Name => Some(resource.name().to_string()),
            Self::Label(key) => resource.metadata().labels.get(key).cloned(),
            Self::Annotation(key) => resource.metadata().annotations.get(key).cloned(),
        }
    }
}

#[derive(Debug, Clone)]
enum Operator {
    Equals(String),
    NotEquals(String),
    In(Vec<String>),
    NotIn(Vec<String>),
    Matches(Regex),
    Exists,
    Absent,
}

/// A single parsed selector expression
#[derive(Debug, Clone)]
pub struct Selector {
    expression: String,
    field: Field,
    operator: Operator,
}

impl Selector {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let invalid = |reason: String| Error::InvalidSelector {
            expression: expression.to_string(),
            reason,
        };
        if trimmed.is_empty() {
            return Err(invalid("empty expression".to_string()));
        }

        let (field, operator) = if let Some(caps) = SET_RE.captures(trimmed) {
            let values: Vec<String> = caps["values"]
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
                .collect();
            let operator = if &caps["op"] == "in" {
                Operator::In(values)
            } else {
                Operator::NotIn(values)
            };
            (caps["field"].to_string(), operator)
        } else if let Some(caps) = BINARY_RE.captures(trimmed) {
            let value = caps["value"].trim().to_string();
            let operator = match &caps["op"] {
                "=~" => Operator::Matches(
                    Regex::new(&value).map_err(|e| invalid(format!("invalid pattern: {e}")))?,
                ),
                "!=" => Operator::NotEquals(value),
                _ => Operator::Equals(value),
            };
            (caps["field"].to_string(), operator)
        } else if let Some(caps) = FIELD_RE.captures(trimmed) {
            let operator = if caps.name("negate").is_some() {
                Operator::Absent
            } else {
                Operator::Exists
            };
            (caps["field"].to_string(), operator)
        } else {
            return Err(invalid("expected <field> <op> <value>".to_string()));
        };

        Ok(Self {
            expression: trimmed.to_string(),
            field: Field::parse(expression, &field)?,
            operator,
        })
    }

    /// Whether the resource satisfies this selector
    pub fn matches<R: Resource + ?Sized>(&self, resource: &R) -> bool {
        let value = self.field.value(resource);
        match (&self.operator, value.as_deref()) {
            (Operator::Exists, v) => v.is_some(),
            (Operator::Absent, v) => v.is_none(),
            (Operator::Equals(expected), Some(v)) => v == expected,
            (Operator::NotEquals(expected), v) => v != Some(expected.as_str()),
            (Operator::In(values), Some(v)) => values.iter().any(|x| x == v),
            (Operator::NotIn(values), v) => v.is_none_or(|v| !values.iter().any(|x| x == v)),
            (Operator::Matches(re), Some(v)) => re.is_match(v),
            (Operator::Equals(_) | Operator::In(_) | Operator::Matches(_), None) => false,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// How several selectors combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorStrategy {
    /// Every selector must match
    #[default]
    All,
    /// At least one selector must match
    Any,
}

/// A set of selectors and how they combine
///
/// An empty set selects every resource.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
    selectors: Vec<Selector>,
    strategy: SelectorStrategy,
}

impl Selectors {
    pub fn new(selectors: Vec<Selector>, strategy: SelectorStrategy) -> Self {
        Self { selectors, strategy }
    }

    /// Parse every expression, failing on the first invalid one
    pub fn parse<I, S>(expressions: I, strategy: SelectorStrategy) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selectors = expressions
            .into_iter()
            .map(|e| Selector::parse(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(selectors, strategy))
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn strategy(&self) -> SelectorStrategy {
        self.strategy
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn matches<R: Resource + ?Sized>(&self, resource: &R) -> bool {
        if self.selectors.is_empty() {
            return true;
        }
        match self.strategy {
            SelectorStrategy::All => self.selectors.iter().all(|s| s.matches(resource)),
            SelectorStrategy::Any => self.selectors.iter().any(|s| s.matches(resource)),
        }
    }
}
