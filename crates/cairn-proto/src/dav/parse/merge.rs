//! MERGE request XML parsing.

use super::error::{ParseError, ParseResult};
use super::tree::{ElementNode, parse_tree};
use crate::dav::core::{PropertyName, QName};

/// One lock token supplied with a MERGE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTokenEntry {
    pub path: String,
    pub token: String,
}

/// A parsed MERGE request body.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// The source the merge commits — must address an activity.
    pub source_href: String,
    pub no_auto_merge: bool,
    pub no_checkout: bool,
    /// Properties the client wants echoed for updated resources.
    pub prop_names: Vec<PropertyName>,
    /// Lock tokens to attach to the commit.
    pub lock_tokens: Vec<LockTokenEntry>,
}

/// Parses a MERGE request body.
///
/// ## Errors
/// Returns an error when `source`/`href` are missing or a lock entry is
/// incomplete.
#[tracing::instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_merge(xml: &[u8]) -> ParseResult<MergeRequest> {
    let tree = parse_tree(xml)?;
    if tree.name() != &QName::dav("merge") {
        return Err(ParseError::unexpected_element(tree.name().local_name()));
    }

    let source = tree.child(&QName::dav("source")).ok_or_else(|| {
        ParseError::missing_element("source (the DAV:merge element must contain a DAV:source)")
    })?;
    let source_href = source
        .child(&QName::dav("href"))
        .and_then(ElementNode::first_value)
        .ok_or_else(|| {
            ParseError::missing_element("href (the DAV:source element must contain a DAV:href)")
        })?
        .to_string();

    let prop_names = match tree.child(&QName::dav("prop")) {
        Some(prop) => prop
            .children()
            .map(|child| PropertyName::new(child.name().clone()))
            .collect(),
        None => Vec::new(),
    };

    let mut lock_tokens = Vec::new();
    if let Some(list) = tree.child(&QName::svn("lock-token-list")) {
        for lock in list.children_named(&QName::svn("lock")) {
            let path = lock
                .child(&QName::svn("lock-path"))
                .and_then(ElementNode::first_value)
                .ok_or_else(|| ParseError::missing_element("lock-path"))?;
            let token = lock
                .child(&QName::svn("lock-token"))
                .and_then(ElementNode::first_value)
                .ok_or_else(|| ParseError::missing_element("lock-token"))?;
            lock_tokens.push(LockTokenEntry {
                path: path.to_string(),
                token: token.to_string(),
            });
        }
    }

    Ok(MergeRequest {
        source_href,
        no_auto_merge: tree.has_child(&QName::dav("no-auto-merge")),
        no_checkout: tree.has_child(&QName::dav("no-checkout")),
        prop_names,
        lock_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_and_flags() {
        let xml = br#"<D:merge xmlns:D="DAV:" xmlns:S="svn:">
  <D:source><D:href>/repos/!svn/act/abc-123</D:href></D:source>
  <D:no-auto-merge/>
  <D:no-checkout/>
  <D:prop><D:checked-in/><D:version-name/></D:prop>
</D:merge>"#;

        let req = parse_merge(xml).unwrap();
        assert_eq!(req.source_href, "/repos/!svn/act/abc-123");
        assert!(req.no_auto_merge);
        assert!(req.no_checkout);
        assert_eq!(req.prop_names.len(), 2);
    }

    #[test]
    fn parses_lock_token_list() {
        let xml = br#"<D:merge xmlns:D="DAV:" xmlns:S="svn:">
  <D:source><D:href>/repos/!svn/act/abc-123</D:href></D:source>
  <S:lock-token-list>
    <S:lock>
      <S:lock-path>trunk/a.txt</S:lock-path>
      <S:lock-token>opaquelocktoken:xyz</S:lock-token>
    </S:lock>
  </S:lock-token-list>
</D:merge>"#;

        let req = parse_merge(xml).unwrap();
        assert_eq!(
            req.lock_tokens,
            vec![LockTokenEntry {
                path: "trunk/a.txt".to_string(),
                token: "opaquelocktoken:xyz".to_string(),
            }]
        );
    }

    #[test]
    fn missing_source_is_rejected() {
        let xml = br#"<D:merge xmlns:D="DAV:"></D:merge>"#;
        let err = parse_merge(xml).unwrap_err();
        assert!(err.message.contains("source"));
    }
}
