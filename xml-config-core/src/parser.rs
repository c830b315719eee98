use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use thiserror::Error;

use crate::tree::XmlNode;

/// Errors that can occur while parsing XML into an [`XmlNode`] tree.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input XML could not be tokenized.
    #[error("failed to parse XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Tag, attribute or CDATA bytes were not valid UTF-8.
    #[error("invalid UTF-8 while parsing XML: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// Text or attribute entity could not be unescaped.
    #[error("failed to decode XML text: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    /// Failed to read the input file.
    #[error("failed to read XML file: {0}")]
    Io(#[from] std::io::Error),
    /// Structural issue in the document.
    #[error("malformed XML: {0}")]
    Malformed(String),
}

/// Parse a single-rooted XML document into an [`XmlNode`] tree.
pub fn parse(xml: impl AsRef<[u8]>) -> Result<XmlNode, ParseError> {
    let mut roots = parse_nodes(xml.as_ref())?;
    match roots.len() {
        0 => Err(ParseError::Malformed("no root element found".to_string())),
        1 => Ok(roots.remove(0)),
        _ => Err(ParseError::Malformed(
            "multiple top-level elements found".to_string(),
        )),
    }
}

/// Parse a fragment holding zero or more sibling elements.
///
/// Management API responses often carry bare `<entry/>` lists without a
/// wrapping element; this returns them in document order.
pub fn parse_fragment(xml: impl AsRef<[u8]>) -> Result<Vec<XmlNode>, ParseError> {
    parse_nodes(xml.as_ref())
}

/// Parse an XML file into an [`XmlNode`] tree.
pub fn parse_file(path: &Path) -> Result<XmlNode, ParseError> {
    let bytes = fs::read(path)?;
    parse(&bytes)
}

fn parse_nodes(xml: &[u8]) -> Result<Vec<XmlNode>, ParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut roots: Vec<XmlNode> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => stack.push(build_node_start(&e, &reader)?),
            Event::Empty(e) => {
                let node = build_node_start(&e, &reader)?;
                attach(&mut stack, &mut roots, node);
            }
            Event::Text(e) => {
                let text = e.unescape()?.into_owned();
                append_text(&mut stack, &text)?;
            }
            Event::CData(e) => {
                let text = std::str::from_utf8(e.as_ref())?.to_string();
                append_text(&mut stack, &text)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| {
                    ParseError::Malformed("encountered closing tag without open tag".to_string())
                })?;
                attach(&mut stack, &mut roots, finish_text(node));
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ParseError::Malformed(
            "unclosed element(s) at end of document".to_string(),
        ));
    }

    Ok(roots)
}

fn attach(stack: &mut [XmlNode], roots: &mut Vec<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn append_text(stack: &mut [XmlNode], text: &str) -> Result<(), ParseError> {
    let Some(current) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(ParseError::Malformed(
            "text outside of any element".to_string(),
        ));
    };
    match &mut current.text {
        Some(existing) => existing.push_str(text),
        None => current.text = Some(text.to_string()),
    }
    Ok(())
}

/// Configuration values never carry meaningful surrounding whitespace, so
/// text is trimmed and whitespace-only text between children is dropped.
fn finish_text(mut node: XmlNode) -> XmlNode {
    node.text = node
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string);
    node
}

fn build_node_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<XmlNode, ParseError> {
    let mut node = XmlNode::new(qname_to_string(e.name())?);

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = qname_to_string(attr.key)?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())?
            .into_owned();
        node.attributes.insert(key, value);
    }

    Ok(node)
}

fn qname_to_string(name: QName<'_>) -> Result<String, ParseError> {
    Ok(std::str::from_utf8(name.as_ref())?.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse, parse_fragment, ParseError};

    #[test]
    fn trims_text_and_keeps_empty_elements() {
        let node = parse(
            br#"<entry name="a1">
                <ip-netmask>
                    10.0.0.1/32
                </ip-netmask>
                <shared/>
            </entry>"#,
        )
        .expect("parse");

        assert_eq!(node.name(), Some("a1"));
        assert_eq!(node.get_text(&["ip-netmask"]), Some("10.0.0.1/32"));
        let shared = node.get_child("shared").expect("shared");
        assert!(shared.is_empty_element());
        assert_eq!(node.text, None);
    }

    #[test]
    fn fragment_returns_sibling_entries_in_order() {
        let nodes = parse_fragment(br#"<entry name="r1"/><entry name="r2"/>"#).expect("parse");
        let names: Vec<_> = nodes.iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["r1", "r2"]);
    }

    #[test]
    fn rejects_multiple_roots_for_documents() {
        let err = parse(br#"<a/><b/>"#).expect_err("multiple roots");
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn unescapes_attribute_and_text_entities() {
        let node = parse(br#"<entry name="a&amp;b"><description>x &lt; y</description></entry>"#)
            .expect("parse");
        assert_eq!(node.name(), Some("a&b"));
        assert_eq!(node.get_text(&["description"]), Some("x < y"));
    }
}
