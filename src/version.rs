//! Migration version identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MigrationError;

/// A dotted numeric migration version such as `1`, `2.0` or `3.1.2`.
///
/// Versions are totally ordered: components are compared pairwise
/// numerically, with the shorter sequence padded with zeros; when all padded
/// components are equal, the shorter component list orders first (`2` sorts
/// before `2.0`). Immutable once parsed; the original text is preserved for
/// display.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
    raw: String,
}

impl Version {
    /// Parse a version string.
    pub fn parse(raw: &str) -> Result<Self, MigrationError> {
        if raw.is_empty() {
            return Err(MigrationError::InvalidVersion(raw.to_string()));
        }

        let mut components = Vec::new();
        for part in raw.split('.') {
            let value: u64 = part
                .parse()
                .map_err(|_| MigrationError::InvalidVersion(raw.to_string()))?;
            components.push(value);
        }

        Ok(Self {
            components,
            raw: raw.to_string(),
        })
    }

    /// The numeric components of this version.
    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl FromStr for Version {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_components() {
        assert_eq!(v("1").components(), &[1]);
        assert_eq!(v("2.0").components(), &[2, 0]);
        assert_eq!(v("3.1.2").components(), &[3, 1, 2]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.x").is_err());
        assert!(Version::parse("a").is_err());
        assert!(Version::parse("1..2").is_err());
    }

    #[test]
    fn test_total_order() {
        assert!(v("2.0") > v("1"));
        assert!(v("3") > v("2.0"));
        assert!(v("1.2") > v("1.1"));
        assert!(v("1.5") > v("1"));
        assert!(v("1.5") < v("2"));
        assert!(v("99") > v("3.1.2"));
    }

    #[test]
    fn test_shorter_orders_first_on_padded_tie() {
        assert!(v("2") < v("2.0"));
        assert!(v("1") < v("1.0.0"));
        assert_eq!(v("2.0"), v("2.0"));
    }

    #[test]
    fn test_display_preserves_text() {
        assert_eq!(v("2.0").to_string(), "2.0");
        assert_eq!(v("3.1.2").to_string(), "3.1.2");
    }

    #[test]
    fn test_sorting() {
        let mut versions = vec![v("2.0"), v("1"), v("1.5"), v("3"), v("1.1")];
        versions.sort();
        let rendered: Vec<String> = versions.iter().map(|x| x.to_string()).collect();
        assert_eq!(rendered, vec!["1", "1.1", "1.5", "2.0", "3"]);
    }
}
