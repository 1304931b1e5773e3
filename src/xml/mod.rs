//! Small attributed tree used for build manifests and exports.
//!
//! Elements carry attributes, optional text and ordered children. Paths passed
//! to the query helpers are element names separated by `/`, relative to the
//! node being queried, e.g. `chunks/chunk`.

use std::fmt::Display;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlNode>,
}

fn xml_error(e: impl Display) -> Error {
    Error::InvalidData(format!("could not parse XML: {e}"))
}

/// Parses `0x`-prefixed hex or plain decimal.
pub fn parse_uint(value: &str) -> Result<u64> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|e| Error::InvalidData(format!("cannot parse {value} as integer: {e}")))
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parses a document and returns its root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => stack.push(Self::from_start(&e)?),
                Event::Empty(e) => {
                    let node = Self::from_start(&e)?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(xml_error)?;
                    if let Some(top) = stack.last_mut() {
                        top.append_text(&text);
                    }
                }
                Event::CData(c) => {
                    let raw = c.into_inner();
                    if let Some(top) = stack.last_mut() {
                        top.append_text(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| xml_error("unexpected closing element"))?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(xml_error("unterminated element"));
        }
        root.ok_or_else(|| xml_error("no root element"))
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let mut node = XmlNode::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
        for attr in e.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            node.attrs.push((key, value));
        }
        Ok(node)
    }

    fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None if root.is_none() => *root = Some(node),
            None => return Err(xml_error("multiple root elements")),
        }
        Ok(())
    }

    fn append_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_as_uint(&self, key: &str) -> Result<Option<u64>> {
        self.attr(key).map(parse_uint).transpose()
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    /// All descendants matching `path`, in document order.
    pub fn query(&self, path: &str) -> Vec<&XmlNode> {
        let mut current = vec![self];
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|n| n.children.iter().filter(move |c| c.name == segment))
                .collect();
        }
        current
    }

    pub fn query_first(&self, path: &str) -> Option<&XmlNode> {
        self.query(path).into_iter().next()
    }

    pub fn query_text(&self, path: &str) -> Option<&str> {
        self.query_first(path).and_then(XmlNode::text)
    }

    /// Integer text of the first match; `Ok(None)` if missing or empty.
    pub fn query_text_as_uint(&self, path: &str) -> Result<Option<u64>> {
        match self.query_text(path) {
            Some(text) => parse_uint(text)
                .map(Some)
                .map_err(|e| e.prefix(format!("{path}: "))),
            None => Ok(None),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>) -> &mut XmlNode {
        self.children.push(XmlNode::new(name));
        let idx = self.children.len() - 1;
        &mut self.children[idx]
    }

    pub fn insert_text(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut XmlNode {
        let child = self.insert(name);
        child.text = Some(text.into());
        child
    }

    /// Adds `<key>value</key>` unless `value` is `None`.
    pub fn insert_kv(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.insert_text(key, value);
        }
    }

    /// Adds `<key>0x..</key>` unless `value` is zero.
    pub fn insert_kx(&mut self, key: &str, value: u64) {
        if value != 0 {
            self.insert_text(key, format!("0x{value:x}"));
        }
    }

    /// Serializes as indented XML; empty elements are collapsed.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_into(&mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::Internal(format!("exported XML is not UTF-8: {e}")))
    }

    fn write_into<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.text.is_none() && self.children.is_empty() {
            writer.write_event(Event::Empty(start)).map_err(write_error)?;
            return Ok(());
        }
        writer.write_event(Event::Start(start)).map_err(write_error)?;
        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_error)?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(write_error)?;
        Ok(())
    }
}

fn write_error(e: impl Display) -> Error {
    Error::Internal(format!("could not write XML: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<firmware gtype="FuAcpiTable">
  <id>DSDT</id>
  <idx>0x2a</idx>
  <data size="0x10">aGVsbG8=</data>
  <chunks>
    <chunk><addr>0x100</addr></chunk>
    <chunk><addr>0x200</addr></chunk>
  </chunks>
  <firmware/>
</firmware>"#;

    #[test]
    fn parse_and_query() {
        let root = XmlNode::parse(DOC).unwrap();
        assert_eq!(root.name(), "firmware");
        assert_eq!(root.attr("gtype"), Some("FuAcpiTable"));
        assert_eq!(root.query_text("id"), Some("DSDT"));
        assert_eq!(root.query_text_as_uint("idx").unwrap(), Some(0x2a));
        assert_eq!(root.query_text_as_uint("missing").unwrap(), None);

        let data = root.query_first("data").unwrap();
        assert_eq!(data.attr_as_uint("size").unwrap(), Some(0x10));
        assert_eq!(data.text(), Some("aGVsbG8="));

        let chunks = root.query("chunks/chunk");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].query_text_as_uint("addr").unwrap(), Some(0x200));
        assert_eq!(root.query("firmware").len(), 1);
    }

    #[test]
    fn bad_integer_is_invalid_data() {
        let root = XmlNode::parse("<firmware><idx>twelve</idx></firmware>").unwrap();
        assert!(matches!(root.query_text_as_uint("idx"), Err(Error::InvalidData(_))));
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(XmlNode::parse("").is_err());
        assert!(XmlNode::parse("<a><b></a>").is_err());
        assert!(XmlNode::parse("<a/><b/>").is_err());
    }

    #[test]
    fn builder_suppresses_defaults() {
        let mut node = XmlNode::new("firmware");
        node.insert_kv("id", None);
        node.insert_kv("version", Some("1.2.3"));
        node.insert_kx("addr", 0);
        node.insert_kx("offset", 0x40);
        assert_eq!(node.children().len(), 2);
        assert_eq!(node.query_text("offset"), Some("0x40"));
    }

    #[test]
    fn serialize_round_trip() {
        let mut node = XmlNode::new("firmware");
        node.set_attr("gtype", "FuIhexFirmware");
        node.insert_text("id", "a<b & c");
        node.insert("chunks").insert("chunk").insert_text("addr", "0x10");
        node.insert("empty");
        let xml = node.to_xml().unwrap();
        assert!(xml.contains("<empty/>"));
        assert_eq!(XmlNode::parse(&xml).unwrap(), node);
    }

    #[test]
    fn uint_formats() {
        assert_eq!(parse_uint("0x1F").unwrap(), 31);
        assert_eq!(parse_uint(" 42 ").unwrap(), 42);
        assert!(parse_uint("0xZZ").is_err());
        assert!(parse_uint("-1").is_err());
    }
}
