//! Streaming XML writer for report and method responses.
//!
//! Thin layer over `quick_xml::Writer` so handlers can emit items as the
//! repository yields them, without buffering the document.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::escape::{base64_encode, is_xml_safe};

/// Result type for response writing.
pub type WriteResult<T> = Result<T, quick_xml::Error>;

/// Streaming XML writer.
pub struct XmlWriter<W: std::io::Write> {
    inner: Writer<W>,
}

impl<W: std::io::Write> XmlWriter<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            inner: Writer::new(writer),
        }
    }

    /// Writes the XML declaration.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn declaration(&mut self) -> WriteResult<()> {
        Ok(self
            .inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?)
    }

    /// Opens an element.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn open(&mut self, tag: &str) -> WriteResult<()> {
        self.open_with_attrs(tag, &[])
    }

    /// Opens an element with attributes.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn open_with_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) -> WriteResult<()> {
        let mut elem = BytesStart::new(tag);
        for (key, value) in attrs {
            elem.push_attribute((*key, *value));
        }
        Ok(self.inner.write_event(Event::Start(elem))?)
    }

    /// Closes an element.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn close(&mut self, tag: &str) -> WriteResult<()> {
        Ok(self.inner.write_event(Event::End(BytesEnd::new(tag)))?)
    }

    /// Writes a self-closing element.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn empty(&mut self, tag: &str) -> WriteResult<()> {
        self.empty_with_attrs(tag, &[])
    }

    /// Writes a self-closing element with attributes.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn empty_with_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) -> WriteResult<()> {
        let mut elem = BytesStart::new(tag);
        for (key, value) in attrs {
            elem.push_attribute((*key, *value));
        }
        Ok(self.inner.write_event(Event::Empty(elem))?)
    }

    /// Writes escaped character data.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn text(&mut self, text: &str) -> WriteResult<()> {
        Ok(self.inner.write_event(Event::Text(BytesText::new(text)))?)
    }

    /// Writes pre-encoded data without escaping (base64 payloads).
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn raw(&mut self, data: &str) -> WriteResult<()> {
        Ok(self
            .inner
            .write_event(Event::Text(BytesText::from_escaped(data)))?)
    }

    /// Writes `<tag>text</tag>`.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn text_element(&mut self, tag: &str, text: &str) -> WriteResult<()> {
        self.text_element_with_attrs(tag, &[], text)
    }

    /// Writes `<tag attrs>text</tag>`.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn text_element_with_attrs(
        &mut self,
        tag: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> WriteResult<()> {
        self.open_with_attrs(tag, attrs)?;
        self.text(text)?;
        self.close(tag)
    }

    /// Writes a value element under the uniform escaping rule: XML-safe
    /// bytes inline, anything else base64 with `encoding="base64"`.
    ///
    /// ## Errors
    /// Returns an error if the underlying writer fails.
    pub fn value_element(
        &mut self,
        tag: &str,
        attrs: &[(&str, &str)],
        value: &[u8],
    ) -> WriteResult<()> {
        if is_xml_safe(value) {
            let text = String::from_utf8_lossy(value);
            self.text_element_with_attrs(tag, attrs, &text)
        } else {
            let mut all_attrs: Vec<(&str, &str)> = attrs.to_vec();
            all_attrs.push(("encoding", "base64"));
            self.open_with_attrs(tag, &all_attrs)?;
            self.raw(&base64_encode(value))?;
            self.close(tag)
        }
    }

    /// Unwraps the underlying writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(build: impl FnOnce(&mut XmlWriter<Vec<u8>>)) -> String {
        let mut writer = XmlWriter::new(Vec::new());
        build(&mut writer);
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn safe_value_is_inline() {
        let xml = render(|w| {
            w.value_element("S:comment", &[], b"plain message").unwrap();
        });
        assert_eq!(xml, "<S:comment>plain message</S:comment>");
    }

    #[test]
    fn unsafe_value_is_base64_framed() {
        let xml = render(|w| {
            w.value_element("S:comment", &[], b"nul\x00byte").unwrap();
        });
        assert!(xml.contains("encoding=\"base64\""));
        assert!(!xml.contains('\0'));
    }

    #[test]
    fn text_is_escaped() {
        let xml = render(|w| {
            w.text_element("S:path", "/a<b>&c").unwrap();
        });
        assert!(xml.contains("&lt;b&gt;&amp;c"));
    }
}
