//! Version identifiers for distro glibc builds.
//!
//! A build is named `MAJOR.MINOR-REVISION<tag>DISTRO[.PATCH]`, for example
//! `2.31-0ubuntu9.5`. Every component that handles versions (crawler,
//! registry, CLI) goes through [`VersionId::parse`], so there is exactly one
//! grammar and one ordering in the workspace.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d)\.(\d{2})-(\d+)([a-z]+)(\d+)(?:\.(\d+))?$")
        .expect("version grammar is a valid regex")
});

/// Why a string was rejected as a version identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    /// The input was empty or only whitespace.
    #[error("empty version string")]
    Empty,

    /// The input does not match `MAJOR.MINOR-REVISION<tag>DISTRO[.PATCH]`.
    #[error("invalid version format: {0}")]
    Malformed(String),

    /// A numeric component does not fit in `u32`.
    #[error("version component out of range in {0}")]
    Overflow(String),
}

/// The numeric part of a version, in comparison order.
///
/// `patch` is 0 when the identifier carries no `.PATCH` suffix, so
/// `2.31-0ubuntu9` sorts before `2.31-0ubuntu9.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey {
    /// Upstream major (`2` in `2.31`).
    pub major: u32,
    /// Upstream minor (`31` in `2.31`).
    pub minor: u32,
    /// Debian revision before the distro tag (`0` in `0ubuntu9`).
    pub revision: u32,
    /// Distro release counter after the tag (`9` in `0ubuntu9`).
    pub distro_major: u32,
    /// Optional stable-update counter (`5` in `0ubuntu9.5`).
    pub distro_patch: u32,
}

/// A validated version identifier such as `2.31-0ubuntu9.5`.
///
/// Ordering and equality use the parsed numeric key, never the raw string:
/// `2.31-0ubuntu10` sorts after `2.31-0ubuntu9`.
///
/// # Example
///
/// ```
/// use glix_schema::VersionId;
///
/// let a: VersionId = "2.31-0ubuntu9".parse().unwrap();
/// let b: VersionId = "2.31-0ubuntu10".parse().unwrap();
/// assert!(a < b);
/// assert!("2.31".parse::<VersionId>().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct VersionId {
    raw: String,
    tag: String,
    key: VersionKey,
}

impl VersionId {
    /// Parse and validate a version identifier.
    ///
    /// Surrounding whitespace is trimmed; anything else outside the grammar
    /// is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`VersionParseError`] describing why the input is not a
    /// version identifier.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| VersionParseError::Malformed(s.to_string()))?;

        let num = |idx: usize| -> Result<u32, VersionParseError> {
            caps.get(idx).map_or(Ok(0), |m| {
                m.as_str()
                    .parse::<u32>()
                    .map_err(|_| VersionParseError::Overflow(s.to_string()))
            })
        };

        let key = VersionKey {
            major: num(1)?,
            minor: num(2)?,
            revision: num(3)?,
            distro_major: num(5)?,
            distro_patch: num(6)?,
        };

        Ok(Self {
            raw: s.to_string(),
            tag: caps[4].to_string(),
            key,
        })
    }

    /// Returns true if `input` is a well-formed version identifier.
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// The identifier as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The numeric comparison key.
    pub fn key(&self) -> VersionKey {
        self.key
    }

    /// The distro tag between revision and distro counter (`ubuntu`).
    pub fn distro_tag(&self) -> &str {
        &self.tag
    }

    /// The upstream series, e.g. `2.31`.
    pub fn series(&self) -> String {
        format!("{}.{}", self.key.major, self.key.minor)
    }
}

impl PartialEq for VersionId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionId {}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Tag breaks ties so that Eq stays consistent with distinct strings.
        self.key
            .cmp(&other.key)
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl std::hash::Hash for VersionId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.tag.hash(state);
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionId {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for VersionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Sort version strings by numeric key, dropping anything that fails to parse.
pub fn sort_versions<I, S>(versions: I) -> Vec<VersionId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: Vec<VersionId> = versions
        .into_iter()
        .filter_map(|v| VersionId::parse(v.as_ref()).ok())
        .collect();
    parsed.sort();
    parsed.dedup();
    parsed
}

/// Keep the newest `per_series` builds of every `MAJOR.MINOR` series.
///
/// The result is in ascending version order.
pub fn select_latest(versions: &[VersionId], per_series: usize) -> Vec<VersionId> {
    let mut sorted = versions.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut kept = Vec::new();
    let mut current_series: Option<(u32, u32)> = None;
    let mut in_series = 0;

    for v in sorted.into_iter().rev() {
        let series = (v.key.major, v.key.minor);
        if current_series != Some(series) {
            current_series = Some(series);
            in_series = 0;
        }
        if in_series < per_series {
            kept.push(v);
            in_series += 1;
        }
    }

    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_versions() {
        for v in [
            "2.31-0ubuntu9",
            "2.31-0ubuntu9.5",
            "2.35-0ubuntu3.8",
            "2.27-3ubuntu1",
            "2.31-0r9",
        ] {
            assert!(VersionId::is_valid(v), "{v} should be valid");
        }
    }

    #[test]
    fn test_invalid_versions() {
        for v in [
            "",
            "2.31",
            "2.3-0ubuntu9",
            "12.31-0ubuntu9",
            "2.31-ubuntu9",
            "2.31-0ubuntu",
            "2.31-0ubuntu9.",
            "2.31-0ubuntu9.5.1",
            "2.31-0Ubuntu9",
            "v2.31-0ubuntu9",
            "2.31-0ubuntu9 extra",
        ] {
            assert!(!VersionId::is_valid(v), "{v:?} should be invalid");
        }
    }

    #[test]
    fn test_parse_components() {
        let v = VersionId::parse("2.31-0ubuntu9.5").unwrap();
        assert_eq!(
            v.key(),
            VersionKey {
                major: 2,
                minor: 31,
                revision: 0,
                distro_major: 9,
                distro_patch: 5,
            }
        );
        assert_eq!(v.distro_tag(), "ubuntu");
        assert_eq!(v.series(), "2.31");
    }

    #[test]
    fn test_parse_error_kinds() {
        assert_eq!(VersionId::parse("   "), Err(VersionParseError::Empty));
        assert!(matches!(
            VersionId::parse("2.31"),
            Err(VersionParseError::Malformed(_))
        ));
        assert!(matches!(
            VersionId::parse("2.31-0ubuntu99999999999"),
            Err(VersionParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_numeric_ordering() {
        let sorted = sort_versions(["2.31-0r9.5", "2.31-0r9", "2.35-0r3"]);
        let raw: Vec<&str> = sorted.iter().map(VersionId::as_str).collect();
        assert_eq!(raw, ["2.31-0r9", "2.31-0r9.5", "2.35-0r3"]);
    }

    #[test]
    fn test_ordering_is_not_lexicographic() {
        let sorted = sort_versions(["2.31-0ubuntu10", "2.31-0ubuntu9", "2.31-0ubuntu9.16"]);
        let raw: Vec<&str> = sorted.iter().map(VersionId::as_str).collect();
        assert_eq!(raw, ["2.31-0ubuntu9", "2.31-0ubuntu9.16", "2.31-0ubuntu10"]);
    }

    #[test]
    fn test_sort_dedups_and_drops_invalid() {
        let sorted = sort_versions(["2.31-0ubuntu9", "garbage", "2.31-0ubuntu9"]);
        assert_eq!(sorted.len(), 1);
    }

    #[test]
    fn test_select_latest_per_series() {
        let versions = sort_versions([
            "2.31-0ubuntu9",
            "2.31-0ubuntu9.2",
            "2.31-0ubuntu9.16",
            "2.35-0ubuntu3",
            "2.35-0ubuntu3.1",
        ]);
        let kept = select_latest(&versions, 2);
        let raw: Vec<&str> = kept.iter().map(VersionId::as_str).collect();
        assert_eq!(
            raw,
            ["2.31-0ubuntu9.2", "2.31-0ubuntu9.16", "2.35-0ubuntu3", "2.35-0ubuntu3.1"]
        );
    }

    #[test]
    fn test_serde_roundtrip_rejects_invalid() {
        let v: VersionId = serde_json::from_str("\"2.31-0ubuntu9\"").unwrap();
        assert_eq!(v.as_str(), "2.31-0ubuntu9");
        assert!(serde_json::from_str::<VersionId>("\"2.31\"").is_err());
    }
}
