//! Generic element tree shared by every request body.
//!
//! Request bodies are parsed once into a tree of named elements; the typed
//! request models in this module's siblings walk the tree and validate it.
//! No schema validation happens here: unknown elements are retained.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::error::{ParseError, ParseResult};
use crate::dav::core::{DAV_NS, Namespace, QName};

/// One node of a parsed request body.
///
/// A node carries either an ordered list of text values or an ordered list
/// of child elements, never both. Same-named siblings accumulate in
/// document order.
#[derive(Debug, Clone)]
pub struct ElementNode {
    name: QName,
    attributes: Vec<(String, String)>,
    content: NodeContent,
}

#[derive(Debug, Clone, Default)]
enum NodeContent {
    #[default]
    Empty,
    Text(Vec<String>),
    Children(Vec<ElementNode>),
}

impl ElementNode {
    fn new(name: QName, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            content: NodeContent::Empty,
        }
    }

    #[must_use]
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Returns an attribute value by local name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns all child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &ElementNode> {
        match &self.content {
            NodeContent::Children(children) => children.iter(),
            NodeContent::Empty | NodeContent::Text(_) => [].iter(),
        }
    }

    /// Returns the first child with the given name.
    #[must_use]
    pub fn child(&self, name: &QName) -> Option<&ElementNode> {
        self.children().find(|child| child.name == *name)
    }

    /// Returns every child with the given name, in document order.
    pub fn children_named<'a>(
        &'a self,
        name: &QName,
    ) -> impl Iterator<Item = &'a ElementNode> + use<'a> {
        let name = name.clone();
        self.children().filter(move |child| child.name == name)
    }

    #[must_use]
    pub fn has_child(&self, name: &QName) -> bool {
        self.child(name).is_some()
    }

    /// Returns the node's first text value.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Text(values) => values.first().map(String::as_str),
            NodeContent::Empty | NodeContent::Children(_) => None,
        }
    }

    /// Returns the node's text values, empty when the node has none.
    #[must_use]
    pub fn values(&self) -> &[String] {
        match &self.content {
            NodeContent::Text(values) => values,
            NodeContent::Empty | NodeContent::Children(_) => &[],
        }
    }

    /// Collects the first value of every same-named child.
    #[must_use]
    pub fn child_values(&self, name: &QName) -> Vec<&str> {
        self.children_named(name)
            .filter_map(ElementNode::first_value)
            .collect()
    }

    fn push_value(&mut self, text: String) -> ParseResult<()> {
        match &mut self.content {
            NodeContent::Children(_) => Err(ParseError::mixed_content(self.name.local_name())),
            NodeContent::Empty => {
                self.content = NodeContent::Text(vec![text]);
                Ok(())
            }
            NodeContent::Text(values) => {
                values.push(text);
                Ok(())
            }
        }
    }

    fn push_child(&mut self, child: ElementNode) -> ParseResult<()> {
        match &mut self.content {
            NodeContent::Text(_) => Err(ParseError::mixed_content(self.name.local_name())),
            NodeContent::Empty => {
                self.content = NodeContent::Children(vec![child]);
                Ok(())
            }
            NodeContent::Children(children) => {
                children.push(child);
                Ok(())
            }
        }
    }
}

/// An open element awaiting its end tag.
struct OpenFrame {
    node: ElementNode,
    text: String,
    declared_namespaces: usize,
}

/// Parses a request body into its element tree.
///
/// ## Summary
/// Pulls events from `quick-xml` and threads them through an explicit stack
/// of open-element frames; the element being closed receives its
/// accumulated text, then folds into its parent as a child.
///
/// ## Errors
/// Returns `ParseError` on malformed XML, on an element mixing text with
/// child elements, or on an empty body.
#[tracing::instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_tree(xml: &[u8]) -> ParseResult<ElementNode> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    // Innermost declarations last; frames record how many to drop on close.
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut open: Vec<OpenFrame> = Vec::new();
    let mut root: Option<ElementNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let frame = open_element(e, &mut namespaces)?;
                open.push(frame);
            }
            Ok(Event::Empty(ref e)) => {
                let frame = open_element(e, &mut namespaces)?;
                close_frame(frame, &mut open, &mut namespaces, &mut root)?;
            }
            Ok(Event::Text(ref e)) => {
                let decoded = reader.decoder().decode(e.as_ref())?;
                let text = quick_xml::escape::unescape(&decoded)?;
                append_text(&mut open, &text)?;
            }
            Ok(Event::GeneralRef(ref e)) => {
                let decoded = e.decode()?;
                let entity = format!("&{decoded};");
                let text = quick_xml::escape::unescape(&entity)?;
                append_text(&mut open, &text)?;
            }
            Ok(Event::CData(ref e)) => {
                let text = std::str::from_utf8(e.as_ref())?;
                append_text(&mut open, text)?;
            }
            Ok(Event::End(_)) => {
                let frame = open
                    .pop()
                    .ok_or_else(|| ParseError::xml("unbalanced end tag"))?;
                close_frame(frame, &mut open, &mut namespaces, &mut root)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ParseError::xml(e.to_string())),
        }
        buf.clear();
    }

    if !open.is_empty() {
        return Err(ParseError::xml("unclosed element at end of input"));
    }

    root.ok_or_else(|| ParseError::missing_element("request root element"))
}

fn open_element(
    e: &BytesStart<'_>,
    namespaces: &mut Vec<(String, String)>,
) -> ParseResult<OpenFrame> {
    let mut declared = 0;
    let mut attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?;
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push((prefix.to_string(), value.into_owned()));
            declared += 1;
        } else if key == "xmlns" {
            namespaces.push((String::new(), value.into_owned()));
            declared += 1;
        } else {
            let local = key.rsplit(':').next().unwrap_or(key);
            attributes.push((local.to_string(), value.into_owned()));
        }
    }

    let name = resolve_qname(e, namespaces)?;
    Ok(OpenFrame {
        node: ElementNode::new(name, attributes),
        text: String::new(),
        declared_namespaces: declared,
    })
}

fn append_text(open: &mut [OpenFrame], text: &str) -> ParseResult<()> {
    let Some(frame) = open.last_mut() else {
        return Err(ParseError::xml("text content outside of any element"));
    };
    if frame.node.children().next().is_some() {
        return Err(ParseError::mixed_content(frame.node.name().local_name()));
    }
    frame.text.push_str(text);
    Ok(())
}

fn close_frame(
    mut frame: OpenFrame,
    open: &mut Vec<OpenFrame>,
    namespaces: &mut Vec<(String, String)>,
    root: &mut Option<ElementNode>,
) -> ParseResult<()> {
    namespaces.truncate(namespaces.len() - frame.declared_namespaces);

    if !frame.text.is_empty() {
        let text = std::mem::take(&mut frame.text);
        frame.node.push_value(text)?;
    }

    match open.last_mut() {
        Some(parent) => {
            if !parent.text.trim().is_empty() {
                return Err(ParseError::mixed_content(parent.node.name().local_name()));
            }
            parent.text.clear();
            parent.node.push_child(frame.node)?;
        }
        None => {
            if root.is_some() {
                return Err(ParseError::xml("multiple root elements"));
            }
            *root = Some(frame.node);
        }
    }
    Ok(())
}

fn resolve_qname(e: &BytesStart<'_>, namespaces: &[(String, String)]) -> ParseResult<QName> {
    let name_bytes = e.name();
    let name = std::str::from_utf8(name_bytes.as_ref())?;

    let (prefix, local_name) = match name.find(':') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("", name),
    };

    // Innermost declaration wins; unprefixed elements default to DAV:.
    let namespace = namespaces
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map_or(DAV_NS, |(_, ns)| ns.as_str());

    Ok(QName::new(
        Namespace::new(namespace.to_string()),
        local_name.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dav::core::SVN_NS;
    use crate::dav::parse::error::ParseErrorKind;

    fn svn(name: &'static str) -> QName {
        QName::svn(name)
    }

    #[test]
    fn parses_values_and_flags() {
        let xml = br#"<S:log-report xmlns:S="svn:">
  <S:start-revision>1</S:start-revision>
  <S:end-revision>3</S:end-revision>
  <S:discover-changed-paths/>
  <S:path>/trunk</S:path>
  <S:path>/branches/b</S:path>
</S:log-report>"#;

        let tree = parse_tree(xml).unwrap();
        assert_eq!(tree.name().namespace_uri(), SVN_NS);
        assert_eq!(tree.name().local_name(), "log-report");
        assert_eq!(
            tree.child(&svn("start-revision")).unwrap().first_value(),
            Some("1")
        );
        assert!(tree.has_child(&svn("discover-changed-paths")));
        assert_eq!(tree.child_values(&svn("path")), vec!["/trunk", "/branches/b"]);
    }

    #[test]
    fn attributes_resolve_by_local_name() {
        let xml = br#"<S:update-report xmlns:S="svn:" send-all="true">
  <S:entry rev="7" start-empty="true"></S:entry>
</S:update-report>"#;

        let tree = parse_tree(xml).unwrap();
        assert_eq!(tree.attribute("send-all"), Some("true"));
        let entry = tree.child(&svn("entry")).unwrap();
        assert_eq!(entry.attribute("rev"), Some("7"));
        assert_eq!(entry.attribute("start-empty"), Some("true"));
    }

    #[test]
    fn text_after_child_is_mixed_content() {
        let xml = br#"<S:r xmlns:S="svn:"><S:a/>stray</S:r>"#;
        let err = parse_tree(xml).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MixedContent);
    }

    #[test]
    fn child_after_text_is_mixed_content() {
        let xml = br#"<S:r xmlns:S="svn:">stray<S:a/></S:r>"#;
        let err = parse_tree(xml).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MixedContent);
    }

    #[test]
    fn nested_text_stays_on_the_closed_child() {
        let xml = br#"<S:r xmlns:S="svn:"><S:a><S:b>inner</S:b></S:a></S:r>"#;
        let tree = parse_tree(xml).unwrap();
        let a = tree.child(&svn("a")).unwrap();
        assert!(a.first_value().is_none());
        assert_eq!(a.child(&svn("b")).unwrap().first_value(), Some("inner"));
    }

    #[test]
    fn unprefixed_elements_default_to_dav() {
        let xml = br#"<propfind><prop><getetag/></prop></propfind>"#;
        let tree = parse_tree(xml).unwrap();
        assert_eq!(tree.name().namespace_uri(), "DAV:");
    }

    #[test]
    fn entities_in_text_are_unescaped() {
        let xml = br#"<S:r xmlns:S="svn:"><S:path>/a&amp;b</S:path></S:r>"#;
        let tree = parse_tree(xml).unwrap();
        assert_eq!(tree.child(&svn("path")).unwrap().first_value(), Some("/a&b"));
    }

    #[test]
    fn empty_body_is_an_error() {
        assert!(parse_tree(b"").is_err());
    }
}
