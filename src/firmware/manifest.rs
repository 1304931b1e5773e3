//! Building images from XML manifests and exporting them back.
//!
//! A manifest is a `firmware` element whose children set the image fields:
//!
//! ```xml
//! <firmware gtype="FuFirmware">
//!   <id>payload</id>
//!   <addr>0x8000</addr>
//!   <data size="0x10">aGVsbG8=</data>
//!   <firmware gtype="FuAcpiTable">...</firmware>
//! </firmware>
//! ```
//!
//! Elements not listed here are left for the format's `build` hook.

use std::fmt;
use std::fs;
use std::path::Path;

use super::chunk::Chunk;
use super::format::RawFirmware;
use super::payload::Payload;
use super::types::{ExportFlags, VersionFormat, ALIGNMENT_MAX, EXPORT_DATA_PREVIEW_MAX};
use super::Firmware;
use crate::common;
use crate::error::{Error, Result, ResultExt};
use crate::source::to_usize;
use crate::xml::XmlNode;

const ELEMENT_FIRMWARE: &str = "firmware";
const ATTR_GTYPE: &str = "gtype";

fn render_data(data: &[u8], flags: ExportFlags) -> String {
    if flags.contains(ExportFlags::ASCII_DATA) {
        common::ascii_preview(data, EXPORT_DATA_PREVIEW_MAX)
    } else {
        common::base64_encode(data)
    }
}

fn root_element(xml: &str) -> Result<XmlNode> {
    let root = XmlNode::parse(xml)?;
    if root.name() != ELEMENT_FIRMWARE {
        return Err(Error::NotFound(format!(
            "no <{ELEMENT_FIRMWARE}> root element, found <{}>",
            root.name()
        )));
    }
    Ok(root)
}

impl Firmware {
    /// Creates an image from a manifest, the root `gtype` picking the format.
    pub fn from_manifest(xml: &str) -> Result<Firmware> {
        let root = root_element(xml)?;
        let mut firmware = match root.attr(ATTR_GTYPE) {
            Some(type_name) => Firmware::from_type_name(type_name)?,
            None => Firmware::new(),
        };
        firmware.build(&root)?;
        Ok(firmware)
    }

    pub fn build_from_xml(&mut self, xml: &str) -> Result<()> {
        let root = root_element(xml)?;
        self.build(&root)
    }

    pub fn build_from_filename(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .map_err(Error::from)
            .prefix_err(format!("failed to load {}: ", path.display()))?;
        self.build_from_xml(&xml)
    }

    /// Applies the fields of a `firmware` element, then builds nested images.
    pub fn build(&mut self, node: &XmlNode) -> Result<()> {
        if let Some(version) = node.query_text("version") {
            self.set_version(version);
        }
        if let Some(version_format) = node.query_text("version_format") {
            self.set_version_format(version_format.parse::<VersionFormat>()?);
        }
        if let Some(version_raw) = node.query_text_as_uint("version_raw")? {
            self.set_version_raw(version_raw);
        }
        if let Some(id) = node.query_text("id") {
            self.set_id(id);
        }
        if let Some(idx) = node.query_text_as_uint("idx")? {
            self.set_idx(idx);
        }
        if let Some(addr) = node.query_text_as_uint("addr")? {
            self.set_addr(addr);
        }
        if let Some(offset) = node.query_text_as_uint("offset")? {
            self.set_offset(offset);
        }
        if let Some(size) = node.query_text_as_uint("size")? {
            self.set_size(size);
        }
        if let Some(size_max) = node.query_text_as_uint("size_max")? {
            self.set_size_max(size_max);
        }
        if let Some(alignment) = node.query_text_as_uint("alignment")? {
            let alignment = u8::try_from(alignment)
                .ok()
                .filter(|a| *a <= ALIGNMENT_MAX)
                .ok_or_else(|| {
                    Error::InvalidData(format!(
                        "0x{alignment:x} invalid, maximum is 0x{ALIGNMENT_MAX:x}"
                    ))
                })?;
            self.set_alignment(alignment)?;
        }
        if let Some(filename) = node.query_text("filename") {
            let blob = fs::read(filename)
                .map_err(Error::from)
                .prefix_err(format!("failed to load {filename}: "))?;
            self.set_bytes(blob.into());
            self.set_filename(filename);
        }
        if let Some(data) = node.query_first("data") {
            let blob = match data.text() {
                Some(text) => common::base64_decode(text)?,
                None => Default::default(),
            };
            let blob = match data.attr_as_uint("size")? {
                Some(size) if size > 0 => common::pad(&blob, to_usize(size)?, 0xff),
                _ => blob,
            };
            self.set_bytes(blob);
        }

        for (idx, chunk) in node.query("chunks/chunk").into_iter().enumerate() {
            let chunk = Chunk::build(chunk, idx as u32)?;
            self.add_chunk(chunk);
        }

        for child in node.query(ELEMENT_FIRMWARE) {
            let mut img = match child.attr(ATTR_GTYPE) {
                Some(type_name) => Firmware::from_type_name(type_name)?,
                None => Firmware::new(),
            };
            self.base.check_child_depth(0)?;
            img.base.depth = self.depth() + 1;
            img.build(child)?;
            self.add_image(img)?;
        }

        self.format.build(&mut self.base, node)
    }

    /// Writes the non-default fields, payload, chunks and children into `node`.
    pub fn export(&self, flags: ExportFlags, node: &mut XmlNode) {
        if self.type_name() != RawFirmware::TYPE_NAME {
            node.set_attr(ATTR_GTYPE, self.type_name());
        }
        if !self.flags().is_empty() {
            node.insert_text("flags", self.flags().to_string());
        }
        node.insert_kv("id", self.id());
        node.insert_kx("idx", self.idx());
        node.insert_kv("version", self.version());
        node.insert_kx("version_raw", self.version_raw());
        if self.version_format() != VersionFormat::Unknown {
            node.insert_text("version_format", self.version_format().as_str());
        }
        node.insert_kx("addr", self.addr());
        node.insert_kx("offset", self.offset());
        node.insert_kx("alignment", u64::from(self.alignment()));
        node.insert_kx("size", self.base.size);
        node.insert_kx("size_max", self.size_max());
        node.insert_kv("filename", self.filename());

        match self.payload() {
            Payload::Stream { source, size } => {
                let text = if *size as usize <= EXPORT_DATA_PREVIEW_MAX {
                    source
                        .read_at(0, *size as usize)
                        .ok()
                        .map(|buf| render_data(&buf, flags))
                } else {
                    None
                };
                let data = node.insert("data");
                if let Some(text) = text {
                    data.set_text(text);
                }
                data.set_attr("type", "stream");
                data.set_attr("size", format!("0x{size:x}"));
            }
            Payload::Bytes(bytes) if bytes.is_empty() => {
                node.insert("data").set_attr("type", "bytes");
            }
            Payload::Bytes(bytes) => {
                let data = node.insert_text("data", render_data(bytes, flags));
                data.set_attr("type", "bytes");
                data.set_attr("size", format!("0x{:x}", bytes.len()));
            }
            Payload::Unset => {}
        }

        if let Some(chunks) = self.base.chunks.as_ref().filter(|c| !c.is_empty()) {
            let parent = node.insert("chunks");
            for chunk in chunks {
                chunk.export(flags, parent.insert("chunk"));
            }
        }

        self.format.export(&self.base, flags, node);

        for img in self.images() {
            img.export(flags, node.insert(ELEMENT_FIRMWARE));
        }
    }

    pub fn export_to_xml(&self, flags: ExportFlags) -> Result<String> {
        let mut node = XmlNode::new(ELEMENT_FIRMWARE);
        self.export(flags, &mut node);
        node.to_xml()
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let xml = self
            .export_to_xml(ExportFlags::INCLUDE_DEBUG | ExportFlags::ASCII_DATA)
            .map_err(|_| fmt::Error)?;
        f.write_str(&xml)
    }
}
