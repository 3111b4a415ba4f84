//! Property name/value types shared by PROPFIND and PROPPATCH.

use super::namespace::QName;

/// A requested property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyName(QName);

impl PropertyName {
    #[must_use]
    pub fn new(qname: QName) -> Self {
        Self(qname)
    }

    #[must_use]
    pub fn qname(&self) -> QName {
        self.0.clone()
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        self.0.local_name()
    }

    #[must_use]
    pub fn namespace_uri(&self) -> &str {
        self.0.namespace_uri()
    }
}

impl From<QName> for PropertyName {
    fn from(qname: QName) -> Self {
        Self(qname)
    }
}

/// A property with an optional resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavProperty {
    /// Property name.
    pub name: QName,
    /// Resolved value; `None` renders as an empty element.
    pub value: Option<PropertyValue>,
}

impl DavProperty {
    /// Creates a text-valued property.
    #[must_use]
    pub fn text(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: Some(PropertyValue::Text(value.into())),
        }
    }

    /// Creates an href-valued property.
    #[must_use]
    pub fn href(name: QName, href: impl Into<String>) -> Self {
        Self {
            name,
            value: Some(PropertyValue::Href(href.into())),
        }
    }

    /// Creates a property carrying raw bytes; unsafe bytes serialize as
    /// base64 with an `encoding` attribute.
    #[must_use]
    pub fn binary(name: QName, bytes: Vec<u8>) -> Self {
        Self {
            name,
            value: Some(PropertyValue::Binary(bytes)),
        }
    }

    /// Creates an empty property (name only).
    #[must_use]
    pub fn empty(name: QName) -> Self {
        Self { name, value: None }
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Plain character data.
    Text(String),
    /// A single `D:href` child.
    Href(String),
    /// Raw bytes, base64-framed on output when not XML-safe.
    Binary(Vec<u8>),
    /// `D:resourcetype` markers.
    ResourceType(Vec<QName>),
    /// Explicitly empty element.
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_property() {
        let prop = DavProperty::text(QName::dav("version-name"), "42");
        assert_eq!(prop.value, Some(PropertyValue::Text("42".to_string())));
    }

    #[test]
    fn empty_property_has_no_value() {
        let prop = DavProperty::empty(QName::dav("resourcetype"));
        assert!(prop.value.is_none());
    }
}
