use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, WeftError};

/// A filesystem path shared between the naming server and storage servers.
///
/// A path is an immutable sequence of non-empty components. The root is the
/// empty sequence. Components may not contain the separator (`/`) or a colon
/// (`:`, reserved as an application delimiter). The string form is `/` for
/// the root and `/c1/c2/…` otherwise, and round-trips through [`parse`].
///
/// [`parse`]: WeftPath::parse
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WeftPath {
    components: Vec<String>,
}

impl WeftPath {
    /// The root path (empty component sequence).
    pub fn root() -> Self {
        Self { components: Vec::new() }
    }

    /// Parse a path from its string form.
    ///
    /// The string must begin with `/` and contain no `:`. Consecutive and
    /// trailing separators collapse, so `"//x///y/"` parses as `/x/y`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(WeftError::Argument("empty path string".to_string()));
        }
        if !s.starts_with('/') {
            return Err(WeftError::Argument(format!("path {:?} does not start with '/'", s)));
        }
        if s.contains(':') {
            return Err(WeftError::Argument(format!("path {:?} contains ':'", s)));
        }
        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self { components })
    }

    /// Extend this path by one component.
    pub fn child(&self, component: &str) -> Result<Self> {
        if component.is_empty() || component.contains('/') || component.contains(':') {
            return Err(WeftError::Argument(format!("illegal path component {:?}", component)));
        }
        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// The last component, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Iterate over the components in order. The root yields nothing.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// True iff `other` is a prefix of this path (every path is a subpath of
    /// itself). Comparison is component-wise: `/a` is not a subpath of `/ab`.
    pub fn is_subpath(&self, other: &WeftPath) -> bool {
        other.components.len() <= self.components.len()
            && other.components == self.components[..other.components.len()]
    }

    /// Resolve this path under a local root directory.
    pub fn to_local(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for component in &self.components {
            out.push(component);
        }
        out
    }
}

/// Paths order ancestors before descendants, falling back to the string form
/// otherwise. Locking walks that proceed root-to-leaf acquire in increasing
/// path order, so simultaneous multi-path lockers cannot deadlock.
impl Ord for WeftPath {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.components == other.components {
            return Ordering::Equal;
        }
        if self.is_subpath(other) {
            return Ordering::Greater;
        }
        if other.is_subpath(self) {
            return Ordering::Less;
        }
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for WeftPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for WeftPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for WeftPath {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Paths travel on the wire in their string form.
impl Serialize for WeftPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WeftPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PathVisitor;

        impl Visitor<'_> for PathVisitor {
            type Value = WeftPath;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a '/'-delimited path string")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> std::result::Result<WeftPath, E> {
                WeftPath::parse(s).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(PathVisitor)
    }
}
