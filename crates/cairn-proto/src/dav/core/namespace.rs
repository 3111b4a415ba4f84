//! XML namespace and qualified name types.

use std::borrow::Cow;

/// `DAV:` namespace URI.
pub const DAV_NS: &str = "DAV:";

/// Namespace of report bodies and report item vocabularies.
pub const SVN_NS: &str = "svn:";

/// Namespace of protocol-level live properties.
pub const SVN_DAV_PROP_NS: &str = "http://subversion.tigris.org/xmlns/dav/";

/// Namespace `svn:`-prefixed node properties are mapped into.
pub const SVN_PROP_NS: &str = "http://subversion.tigris.org/xmlns/svn/";

/// Namespace of arbitrary user (dead) properties.
pub const CUSTOM_PROP_NS: &str = "http://subversion.tigris.org/xmlns/custom/";

/// An XML namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(pub Cow<'static, str>);

impl Namespace {
    /// `DAV:` namespace.
    pub const DAV: Self = Self(Cow::Borrowed(DAV_NS));

    /// Report vocabulary namespace.
    pub const SVN: Self = Self(Cow::Borrowed(SVN_NS));

    /// Protocol live-property namespace.
    pub const SVN_DAV: Self = Self(Cow::Borrowed(SVN_DAV_PROP_NS));

    /// Versioned `svn:` node-property namespace.
    pub const SVN_PROP: Self = Self(Cow::Borrowed(SVN_PROP_NS));

    /// Dead-property namespace.
    pub const CUSTOM: Self = Self(Cow::Borrowed(CUSTOM_PROP_NS));

    /// Creates a new namespace from a string.
    #[must_use]
    pub fn new(uri: impl Into<Cow<'static, str>>) -> Self {
        Self(uri.into())
    }

    /// Returns the namespace URI.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the conventional prefix for this namespace.
    #[must_use]
    pub fn default_prefix(&self) -> Option<&'static str> {
        match self.0.as_ref() {
            DAV_NS => Some("D"),
            SVN_NS => Some("S"),
            SVN_DAV_PROP_NS => Some("V"),
            SVN_PROP_NS => Some("S"),
            CUSTOM_PROP_NS => Some("C"),
            _ => None,
        }
    }
}

impl From<&'static str> for Namespace {
    fn from(s: &'static str) -> Self {
        Self(Cow::Borrowed(s))
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

/// A qualified XML name (namespace + local name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// The namespace URI.
    pub namespace: Namespace,
    /// The local name.
    pub local_name: Cow<'static, str>,
}

impl QName {
    /// Creates a new qualified name.
    #[must_use]
    pub fn new(namespace: impl Into<Namespace>, local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Creates a `DAV:` qualified name.
    #[must_use]
    pub fn dav(local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: Namespace::DAV,
            local_name: local_name.into(),
        }
    }

    /// Creates a report-vocabulary qualified name.
    #[must_use]
    pub fn svn(local_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: Namespace::SVN,
            local_name: local_name.into(),
        }
    }

    /// Returns the local name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Returns the namespace URI.
    #[must_use]
    pub fn namespace_uri(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns whether this is a DAV: element.
    #[must_use]
    pub fn is_dav(&self) -> bool {
        self.namespace == Namespace::DAV
    }

    /// Returns whether this belongs to the report vocabulary.
    #[must_use]
    pub fn is_svn(&self) -> bool {
        self.namespace == Namespace::SVN
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace.as_str(), self.local_name)
    }
}

/// Common DAV property names.
pub mod dav_props {
    use super::QName;

    pub fn resourcetype() -> QName {
        QName::dav("resourcetype")
    }
    pub fn getcontentlength() -> QName {
        QName::dav("getcontentlength")
    }
    pub fn getcontenttype() -> QName {
        QName::dav("getcontenttype")
    }
    pub fn getlastmodified() -> QName {
        QName::dav("getlastmodified")
    }
    pub fn getetag() -> QName {
        QName::dav("getetag")
    }
    pub fn creationdate() -> QName {
        QName::dav("creationdate")
    }
    pub fn version_name() -> QName {
        QName::dav("version-name")
    }
    pub fn creator_displayname() -> QName {
        QName::dav("creator-displayname")
    }
    pub fn checked_in() -> QName {
        QName::dav("checked-in")
    }
    pub fn version_controlled_configuration() -> QName {
        QName::dav("version-controlled-configuration")
    }
    pub fn baseline_collection() -> QName {
        QName::dav("baseline-collection")
    }
}

/// Protocol live-property names.
pub mod svn_props {
    use super::{Namespace, QName};

    pub fn baseline_relative_path() -> QName {
        QName::new(Namespace::SVN_DAV, "baseline-relative-path")
    }
    pub fn repository_uuid() -> QName {
        QName::new(Namespace::SVN_DAV, "repository-uuid")
    }
    pub fn md5_checksum() -> QName {
        QName::new(Namespace::SVN_DAV, "md5-checksum")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qname_display() {
        let qname = QName::svn("log-item");
        assert_eq!(qname.to_string(), "{svn:}log-item");
    }

    #[test]
    fn qname_is_dav() {
        let qname = QName::dav("version-name");
        assert!(qname.is_dav());
        assert!(!qname.is_svn());
    }

    #[test]
    fn namespace_prefix() {
        assert_eq!(Namespace::DAV.default_prefix(), Some("D"));
        assert_eq!(Namespace::SVN.default_prefix(), Some("S"));
    }
}
