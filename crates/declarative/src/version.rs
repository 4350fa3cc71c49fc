//! API versions of resource kinds
//!
//! Versions follow the `v<major>[<qualifier><number>]` convention, e.g. `v1`,
//! `v1alpha2` or `v2beta10`. Greater versions are newer: a higher major always
//! wins, a stable version outranks any pre-release of the same major, and
//! pre-releases are ordered by qualifier priority and then by number.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v(\d+)(?:([a-z]+)(\d+))?$").expect("version pattern is valid")
});

/// Qualifiers known by default, lowest priority first
pub const DEFAULT_QUALIFIERS: &[&str] = &["alpha", "beta"];

/// Pre-release part of a version, e.g. `beta2`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Qualifier {
    pub name: String,
    pub number: u32,
}

/// A parsed API version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    major: u32,
    qualifier: Option<Qualifier>,
}

impl ApiVersion {
    /// Parse a version string
    pub fn parse(version: &str) -> Result<Self> {
        let captures = VERSION_PATTERN
            .captures(version)
            .ok_or_else(|| Error::InvalidApiVersion(version.to_string()))?;

        let number = |idx: usize| -> Result<u32> {
            captures[idx]
                .parse()
                .map_err(|_| Error::InvalidApiVersion(version.to_string()))
        };

        let major = number(1)?;
        let qualifier = match captures.get(2) {
            Some(name) => Some(Qualifier {
                name: name.as_str().to_string(),
                number: number(3)?,
            }),
            None => None,
        };

        Ok(Self { major, qualifier })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// Whether this is a stable (unqualified) version
    pub fn is_stable(&self) -> bool {
        self.qualifier.is_none()
    }

    /// Return the newest version using the default qualifier priority
    pub fn latest<I>(versions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        versions.into_iter().max().ok_or(Error::EmptyVersionSet)
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.major)?;
        if let Some(q) = &self.qualifier {
            write!(f, "{}{}", q.name, q.number)?;
        }
        Ok(())
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        QualifierPriority::default().compare(self, other)
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ApiVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Ordering of pre-release qualifiers, lowest priority first
///
/// Qualifiers missing from the list rank below every listed one and compare
/// lexically among themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifierPriority {
    qualifiers: Vec<String>,
}

impl Default for QualifierPriority {
    fn default() -> Self {
        Self::new(DEFAULT_QUALIFIERS.iter().copied())
    }
}

impl QualifierPriority {
    pub fn new<I, S>(qualifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            qualifiers: qualifiers.into_iter().map(Into::into).collect(),
        }
    }

    fn rank(&self, qualifier: &str) -> Option<usize> {
        self.qualifiers.iter().position(|q| q == qualifier)
    }

    /// Compare two versions, greater meaning newer
    pub fn compare(&self, a: &ApiVersion, b: &ApiVersion) -> Ordering {
        a.major.cmp(&b.major).then_with(|| match (&a.qualifier, &b.qualifier) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(qa), Some(qb)) => {
                let by_rank = match (self.rank(&qa.name), self.rank(&qb.name)) {
                    (Some(ra), Some(rb)) => ra.cmp(&rb),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => qa.name.cmp(&qb.name),
                };
                by_rank.then_with(|| qa.number.cmp(&qb.number))
            }
        })
    }

    /// Return the newest version according to this priority
    pub fn latest<'a, I>(&self, versions: I) -> Result<&'a ApiVersion>
    where
        I: IntoIterator<Item = &'a ApiVersion>,
    {
        versions
            .into_iter()
            .max_by(|a, b| self.compare(a, b))
            .ok_or(Error::EmptyVersionSet)
    }
}
