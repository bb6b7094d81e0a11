//! Dotted-triple versions of the external tool.

use serde::Serialize;

/// A `MAJOR.MINOR.PATCH` version.
///
/// Ordering is lexicographic over the three numeric components. Anything
/// that is not exactly three dot-separated unsigned integers does not parse;
/// pre-release and build suffixes are not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a strict `MAJOR.MINOR.PATCH` string.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let major = parse_component(parts.next()?)?;
        let minor = parse_component(parts.next()?)?;
        let patch = parse_component(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    /// Find the version in a `--version` banner such as `cargo-codesnip 0.4.1`.
    ///
    /// The last whitespace-separated token that parses wins.
    pub fn from_banner(banner: &str) -> Option<Self> {
        banner.split_whitespace().rev().find_map(Self::parse)
    }
}

fn parse_component(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for Version {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s).ok_or_else(|| {
            crate::Error::InvalidInput(format!(
                "'{}' is not a MAJOR.MINOR.PATCH version",
                s
            ))
        })
    }
}
