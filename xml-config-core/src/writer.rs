use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::tree::XmlNode;

/// Errors that can occur while writing XML from an [`XmlNode`] tree.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("failed to write XML file: {0}")]
    Io(#[from] std::io::Error),
    #[error("written XML is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Serialize an [`XmlNode`] tree into indented XML bytes.
pub fn write(node: &XmlNode) -> Result<Vec<u8>, WriteError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut writer, node)?;
    Ok(writer.into_inner())
}

/// Serialize an [`XmlNode`] on a single line.
///
/// This is the form used as an `element=` payload for edit/set requests.
pub fn write_compact(node: &XmlNode) -> Result<String, WriteError> {
    let mut writer = Writer::new(Vec::new());
    emit(&mut writer, node)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Write a whole configuration document, XML declaration included.
pub fn write_file(node: &XmlNode, path: &Path) -> Result<(), WriteError> {
    let mut writer = Writer::new_with_indent(BufWriter::new(File::create(path)?), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
    emit(&mut writer, node)?;
    let mut out = writer.into_inner();
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn emit<W: Write>(writer: &mut Writer<W>, node: &XmlNode) -> Result<(), quick_xml::Error> {
    let tag = node.tag.as_str();
    let start = node
        .attributes
        .iter()
        .fold(BytesStart::new(tag), |start, (key, value)| {
            start.with_attributes([(key.as_str(), value.as_str())])
        });

    if node.is_empty_element() {
        return writer.write_event(Event::Empty(start));
    }
    writer.write_event(Event::Start(start))?;
    if let Some(text) = &node.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        emit(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))
}

#[cfg(test)]
mod tests {
    use super::{write_compact, write_file};
    use crate::parser::parse_file;
    use crate::tree::XmlNode;

    #[test]
    fn compact_output_escapes_text_and_attributes() {
        let node = XmlNode::entry("a<b").with_child(XmlNode::with_text("description", "x & y"));
        let out = write_compact(&node).expect("write");
        assert_eq!(
            out,
            r#"<entry name="a&lt;b"><description>x &amp; y</description></entry>"#
        );
    }

    #[test]
    fn files_start_with_a_declaration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");
        let node = XmlNode::new("config").with_child(XmlNode::new("shared"));
        write_file(&node, &path).expect("write");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.starts_with("<?xml version=\"1.0\"?>"));
        assert_eq!(parse_file(&path).expect("parse"), node);
    }
}
