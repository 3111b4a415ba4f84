//! Depth values from the `Depth` header and report bodies.

use std::fmt;

/// `WebDAV` Depth header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    /// Depth: 0 - The resource itself only.
    Zero,
    /// Depth: 1 - The resource and its immediate children.
    One,
    /// Depth: infinity - The resource and all descendants.
    #[default]
    Infinity,
}

impl Depth {
    /// Parses from header value.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "0" => Some(Self::Zero),
            "1" => Some(Self::One),
            "infinity" => Some(Self::Infinity),
            _ => None,
        }
    }

    /// Parses a body `depth` element value (`empty`/`files`/`immediates`
    /// collapse onto the header scale).
    #[must_use]
    pub fn from_element(value: &str) -> Option<Self> {
        match value.trim() {
            "empty" | "exclude" => Some(Self::Zero),
            "files" | "immediates" => Some(Self::One),
            "infinity" => Some(Self::Infinity),
            other => Self::from_header(other),
        }
    }

    /// Resolves the depth rule shared by report bodies: an explicit depth
    /// element wins outright over the legacy recursive flag; with neither
    /// present the fallback applies.
    #[must_use]
    pub fn resolve(explicit: Option<Self>, recursive: Option<bool>, fallback: Self) -> Self {
        match (explicit, recursive) {
            (Some(depth), _) => depth,
            (None, Some(true)) => Self::Infinity,
            (None, Some(false)) => Self::Zero,
            (None, None) => fallback,
        }
    }

    /// Returns the header value string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Depth {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_header(s).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_from_header() {
        assert_eq!(Depth::from_header("0"), Some(Depth::Zero));
        assert_eq!(Depth::from_header("1"), Some(Depth::One));
        assert_eq!(Depth::from_header("infinity"), Some(Depth::Infinity));
        assert_eq!(Depth::from_header("INFINITY"), Some(Depth::Infinity));
        assert_eq!(Depth::from_header("2"), None);
    }

    #[test]
    fn neither_depth_nor_recursive_defaults_to_fallback() {
        assert_eq!(Depth::resolve(None, None, Depth::Infinity), Depth::Infinity);
        assert_eq!(Depth::resolve(None, None, Depth::One), Depth::One);
    }

    #[test]
    fn recursive_no_alone_is_non_recursive() {
        assert_eq!(Depth::resolve(None, Some(false), Depth::Infinity), Depth::Zero);
    }

    #[test]
    fn explicit_depth_beats_recursive() {
        assert_eq!(
            Depth::resolve(Some(Depth::One), Some(true), Depth::Infinity),
            Depth::One
        );
        assert_eq!(
            Depth::resolve(Some(Depth::Infinity), Some(false), Depth::Zero),
            Depth::Infinity
        );
    }
}
