use bytes::Buf;

use crate::error::{Error, Result, ResultExt};
use crate::firmware::{
    ExportFlags, FirmwareBase, FirmwareFlags, FirmwareFormat, Hooks, ParseFlags,
};
use crate::source::{to_usize, SharedSource};
use crate::xml::XmlNode;

const HEADER_SIZE: usize = 36;

/// A single ACPI table: the common 36-byte header, the signature becoming the id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcpiTable {
    revision: u8,
    oem_id: Option<String>,
    oem_table_id: Option<String>,
    oem_revision: u32,
}

impl AcpiTable {
    pub const TYPE_NAME: &'static str = "FuAcpiTable";

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn oem_id(&self) -> Option<&str> {
        self.oem_id.as_deref()
    }

    pub fn oem_table_id(&self) -> Option<&str> {
        self.oem_table_id.as_deref()
    }

    pub fn oem_revision(&self) -> u32 {
        self.oem_revision
    }
}

/// Fixed-width header string with trailing NULs and spaces removed.
fn fixed_string(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(|c: char| c == '\0' || c == ' ');
    (!text.is_empty()).then(|| text.to_string())
}

impl FirmwareFormat for AcpiTable {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn hooks(&self) -> Hooks {
        Hooks::PARSE
    }

    fn init(&mut self, base: &mut FirmwareBase) {
        base.add_flag(FirmwareFlags::HAS_CHECKSUM);
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        source: &SharedSource,
        flags: ParseFlags,
    ) -> Result<()> {
        let source_size = source.size()?;
        let mut header = source
            .read_at(0, HEADER_SIZE)
            .prefix_err("ACPI table header: ")?;

        let signature = header.copy_to_bytes(4);
        if let Some(id) = fixed_string(&signature) {
            base.set_id(id);
        }
        let length = header.get_u32_le();
        self.revision = header.get_u8();
        let checksum = header.get_u8();
        self.oem_id = fixed_string(&header.copy_to_bytes(6));
        self.oem_table_id = fixed_string(&header.copy_to_bytes(8));
        self.oem_revision = header.get_u32_le();

        if u64::from(length) > source_size || (length as usize) < HEADER_SIZE {
            return Err(Error::InvalidData(format!(
                "table length not valid: got 0x{source_size:x} but expected 0x{length:x}"
            )));
        }
        base.set_size(u64::from(length));

        if !flags.contains(ParseFlags::IGNORE_CHECKSUM) {
            let table = source.read_at(0, to_usize(u64::from(length))?)?;
            let actual = table.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
            if actual != 0 {
                return Err(Error::Internal(format!(
                    "CRC failed, expected 0x{:02x}, got 0x{checksum:02x}",
                    checksum.wrapping_sub(actual)
                )));
            }
        }
        Ok(())
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(revision) = node.query_text_as_uint("revision")? {
            self.revision = u8::try_from(revision)
                .map_err(|_| Error::InvalidData(format!("revision 0x{revision:x} too large")))?;
        }
        if let Some(oem_id) = node.query_text("oem_id") {
            self.oem_id = Some(oem_id.to_string());
        }
        if let Some(oem_table_id) = node.query_text("oem_table_id") {
            self.oem_table_id = Some(oem_table_id.to_string());
        }
        if let Some(oem_revision) = node.query_text_as_uint("oem_revision")? {
            self.oem_revision = u32::try_from(oem_revision).map_err(|_| {
                Error::InvalidData(format!("OEM revision 0x{oem_revision:x} too large"))
            })?;
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, _flags: ExportFlags, node: &mut XmlNode) {
        node.insert_kx("revision", u64::from(self.revision));
        node.insert_kv("oem_id", self.oem_id());
        node.insert_kv("oem_table_id", self.oem_table_id());
        node.insert_kx("oem_revision", u64::from(self.oem_revision));
    }
}
