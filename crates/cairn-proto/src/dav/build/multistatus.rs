//! Multistatus XML serialization.

use super::escape::{base64_encode, is_xml_safe};
use super::writer::{WriteResult, XmlWriter};
use crate::dav::core::{
    CUSTOM_PROP_NS, DAV_NS, Multistatus, PropertyValue, PropstatResponse, SVN_DAV_PROP_NS,
    SVN_PROP_NS,
};

/// Serializes a multistatus response to XML.
///
/// ## Summary
/// Converts a `Multistatus` response structure into the 207 response body,
/// with the protocol's property namespaces declared on the root.
///
/// ## Errors
/// Returns an error if XML writing fails or if the generated XML is not
/// valid UTF-8 (which should never happen with well-formed input).
pub fn serialize_multistatus(multistatus: &Multistatus) -> Result<String, quick_xml::Error> {
    let mut writer = XmlWriter::new(Vec::new());

    writer.declaration()?;
    writer.open_with_attrs(
        "D:multistatus",
        &[
            ("xmlns:D", DAV_NS),
            ("xmlns:V", SVN_DAV_PROP_NS),
            ("xmlns:S", SVN_PROP_NS),
            ("xmlns:C", CUSTOM_PROP_NS),
        ],
    )?;

    for response in &multistatus.responses {
        write_response(&mut writer, response)?;
    }

    if let Some(ref desc) = multistatus.description {
        writer.text_element("D:responsedescription", desc)?;
    }

    writer.close("D:multistatus")?;

    let result = writer.into_inner();
    String::from_utf8(result).map_err(|e| {
        tracing::error!("Generated invalid UTF-8 in multistatus XML: {}", e);
        quick_xml::Error::Io(std::sync::Arc::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid UTF-8 in XML output",
        )))
    })
}

/// Writes a single response element.
fn write_response<W: std::io::Write>(
    writer: &mut XmlWriter<W>,
    response: &PropstatResponse,
) -> WriteResult<()> {
    writer.open("D:response")?;
    writer.text_element("D:href", &response.href)?;

    for propstat in &response.propstats {
        writer.open("D:propstat")?;
        writer.open("D:prop")?;
        for prop in &propstat.properties {
            write_property(writer, prop)?;
        }
        writer.close("D:prop")?;
        writer.text_element("D:status", propstat.status.status_line())?;
        if let Some(ref desc) = propstat.description {
            writer.text_element("D:responsedescription", desc)?;
        }
        writer.close("D:propstat")?;
    }

    if let Some(ref desc) = response.description {
        writer.text_element("D:responsedescription", desc)?;
    }

    writer.close("D:response")?;
    Ok(())
}

/// Writes a property element.
fn write_property<W: std::io::Write>(
    writer: &mut XmlWriter<W>,
    prop: &crate::dav::core::DavProperty,
) -> WriteResult<()> {
    let prefix = namespace_prefix(prop.name.namespace_uri());
    let elem_name = format!("{}:{}", prefix, prop.name.local_name());

    // Namespaces outside the root declarations are declared inline.
    let inline_ns = (prefix == "X").then(|| prop.name.namespace_uri().to_string());
    let mut attrs: Vec<(&str, &str)> = Vec::new();
    if let Some(uri) = inline_ns.as_deref() {
        attrs.push(("xmlns:X", uri));
    }

    match &prop.value {
        Some(PropertyValue::Text(text)) => {
            writer.text_element_with_attrs(&elem_name, &attrs, text)?;
        }
        Some(PropertyValue::Href(href)) => {
            writer.open_with_attrs(&elem_name, &attrs)?;
            writer.text_element("D:href", href)?;
            writer.close(&elem_name)?;
        }
        Some(PropertyValue::Binary(bytes)) => {
            if is_xml_safe(bytes) {
                let text = String::from_utf8_lossy(bytes);
                writer.text_element_with_attrs(&elem_name, &attrs, &text)?;
            } else {
                attrs.push(("V:encoding", "base64"));
                writer.open_with_attrs(&elem_name, &attrs)?;
                writer.raw(&base64_encode(bytes))?;
                writer.close(&elem_name)?;
            }
        }
        Some(PropertyValue::ResourceType(types)) => {
            if types.is_empty() {
                writer.empty_with_attrs(&elem_name, &attrs)?;
            } else {
                writer.open_with_attrs(&elem_name, &attrs)?;
                for rt in types {
                    let rt_prefix = namespace_prefix(rt.namespace_uri());
                    let rt_name = format!("{}:{}", rt_prefix, rt.local_name());
                    writer.empty(&rt_name)?;
                }
                writer.close(&elem_name)?;
            }
        }
        Some(PropertyValue::Empty) | None => {
            writer.empty_with_attrs(&elem_name, &attrs)?;
        }
    }

    Ok(())
}

/// Gets the namespace prefix for a given namespace URI.
fn namespace_prefix(ns: &str) -> &'static str {
    match ns {
        DAV_NS => "D",
        SVN_DAV_PROP_NS => "V",
        SVN_PROP_NS => "S",
        CUSTOM_PROP_NS => "C",
        _ => "X",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dav::core::{DavProperty, PropstatResponse, QName};

    #[test]
    fn serialize_simple_multistatus() {
        let response = PropstatResponse::ok(
            "/repos/trunk/",
            vec![DavProperty::text(QName::dav("version-name"), "42")],
        );
        let multistatus = Multistatus {
            responses: vec![response],
            description: None,
        };

        let xml = serialize_multistatus(&multistatus).unwrap();

        assert!(xml.contains("D:multistatus"));
        assert!(xml.contains("D:response"));
        assert!(xml.contains("<D:version-name>42</D:version-name>"));
        assert!(xml.contains("HTTP/1.1 200 OK"));
    }

    #[test]
    fn two_tier_response_has_both_statuses() {
        let response = PropstatResponse::two_tier(
            "/repos/trunk/file",
            vec![DavProperty::text(QName::dav("getcontentlength"), "12")],
            vec![DavProperty::empty(QName::dav("checked-out"))],
        );
        let multistatus = Multistatus {
            responses: vec![response],
            description: None,
        };

        let xml = serialize_multistatus(&multistatus).unwrap();

        assert_eq!(xml.matches("<D:propstat>").count(), 2);
        assert!(xml.contains("HTTP/1.1 200 OK"));
        assert!(xml.contains("HTTP/1.1 404 Not Found"));
    }

    #[test]
    fn binary_dead_property_is_base64() {
        let response = PropstatResponse::ok(
            "/repos/trunk/file",
            vec![DavProperty::binary(
                QName::new(crate::dav::core::Namespace::CUSTOM, "secret"),
                b"nul\x00".to_vec(),
            )],
        );
        let multistatus = Multistatus {
            responses: vec![response],
            description: None,
        };

        let xml = serialize_multistatus(&multistatus).unwrap();
        assert!(xml.contains("V:encoding=\"base64\""));
    }
}
