use bytes::Bytes;
use ihex::Record;
use log::debug;

use crate::error::{Error, Result};
use crate::firmware::{FirmwareBase, FirmwareFormat, Hooks, ParseFlags};
use crate::source::SharedSource;

/// Bytes per data record when writing.
const DATA_RECORD_SIZE: usize = 16;

/// Largest span a file may cover between its lowest and highest address.
const IMAGE_SIZE_MAX: u64 = 32 * 1024 * 1024;

/// Intel HEX text; the payload is the data records assembled into one image.
#[derive(Debug, Clone)]
pub struct IhexFirmware {
    records: Vec<Record>,
    padding: u8,
}

impl Default for IhexFirmware {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            padding: 0xFF,
        }
    }
}

impl IhexFirmware {
    pub const TYPE_NAME: &'static str = "FuIhexFirmware";

    pub fn new() -> Self {
        Self::default()
    }

    /// Byte used for address gaps between data records.
    pub fn with_padding(mut self, padding: u8) -> Self {
        self.padding = padding;
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl FirmwareFormat for IhexFirmware {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn hooks(&self) -> Hooks {
        Hooks::PARSE | Hooks::WRITE
    }

    fn tokenize(
        &mut self,
        _base: &mut FirmwareBase,
        source: &SharedSource,
        _flags: ParseFlags,
    ) -> Result<()> {
        let raw = source.read_all()?;
        let text = std::str::from_utf8(&raw)
            .map_err(|e| Error::InvalidFile(format!("not valid ASCII: {e}")))?;

        self.records.clear();
        for (line, record) in ihex::Reader::new(text).enumerate() {
            let record = record
                .map_err(|e| Error::InvalidFile(format!("invalid record on line {}: {e}", line + 1)))?;
            let eof = record == Record::EndOfFile;
            self.records.push(record);
            if eof {
                break;
            }
        }
        if self.records.last() != Some(&Record::EndOfFile) {
            return Err(Error::InvalidFile("no EOF record".into()));
        }
        Ok(())
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        _source: &SharedSource,
        _flags: ParseFlags,
    ) -> Result<()> {
        let mut upper = 0u64;
        let mut blocks: Vec<(u64, &[u8])> = Vec::new();
        for record in &self.records {
            match record {
                Record::Data { offset, value } => {
                    blocks.push((upper + u64::from(*offset), value.as_slice()));
                }
                Record::ExtendedSegmentAddress(segment) => upper = u64::from(*segment) << 4,
                Record::ExtendedLinearAddress(high) => upper = u64::from(*high) << 16,
                Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
                Record::EndOfFile => break,
            }
        }

        let start = blocks
            .iter()
            .map(|(addr, _)| *addr)
            .min()
            .ok_or_else(|| Error::InvalidFile("no data records".into()))?;
        let end = blocks
            .iter()
            .map(|(addr, data)| addr + data.len() as u64)
            .max()
            .unwrap_or(start);
        if end - start > IMAGE_SIZE_MAX {
            return Err(Error::InvalidFile(format!(
                "data spans 0x{:x} bytes, limit is 0x{IMAGE_SIZE_MAX:x}",
                end - start
            )));
        }

        let mut image = vec![self.padding; (end - start) as usize];
        for (addr, data) in blocks {
            let offset = (addr - start) as usize;
            image[offset..offset + data.len()].copy_from_slice(data);
        }
        debug!("assembled 0x{:x} bytes @0x{start:x}", image.len());

        base.set_addr(start);
        base.set_bytes(Bytes::from(image));
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Bytes> {
        let data = base.bytes_with_patches()?;
        let mut records = Vec::new();
        let mut upper = 0u16;
        let mut offset = 0usize;
        while offset < data.len() {
            let addr = base.addr() + offset as u64;
            let high = u16::try_from(addr >> 16).map_err(|_| {
                Error::InvalidData(format!("address 0x{addr:x} does not fit in 32 bits"))
            })?;
            if high != upper {
                records.push(Record::ExtendedLinearAddress(high));
                upper = high;
            }
            let low = (addr & 0xffff) as usize;
            let len = DATA_RECORD_SIZE
                .min(0x10000 - low)
                .min(data.len() - offset);
            records.push(Record::Data {
                offset: low as u16,
                value: data[offset..offset + len].to_vec(),
            });
            offset += len;
        }
        records.push(Record::EndOfFile);

        let text = ihex::create_object_file_representation(&records)
            .map_err(|e| Error::InvalidData(format!("failed to write Intel HEX: {e}")))?;
        Ok(Bytes::from(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::Firmware;

    const HEX: &str = ":0400000001020304F2\n\
                       :020000040001F9\n\
                       :02001000AABB89\n\
                       :00000001FF\n";

    #[test]
    fn parse_fills_gaps() {
        let mut fw = Firmware::with_format(IhexFirmware::new());
        fw.parse_bytes(Bytes::from_static(HEX.as_bytes()), 0, ParseFlags::empty())
            .unwrap();
        assert_eq!(fw.addr(), 0);
        let bytes = fw.bytes().unwrap();
        assert_eq!(bytes.len(), 0x10012);
        assert_eq!(&bytes[..5], &[1, 2, 3, 4, 0xff]);
        assert_eq!(&bytes[0x10010..], &[0xaa, 0xbb]);
        assert_eq!(fw.format::<IhexFirmware>().unwrap().records().len(), 4);
    }

    #[test]
    fn base_address_from_lowest_record() {
        let hex = ":020000040002F8\n:0400100001020304E2\n:00000001FF\n";
        let mut fw = Firmware::with_format(IhexFirmware::new().with_padding(0));
        fw.parse_bytes(Bytes::from_static(hex.as_bytes()), 0, ParseFlags::empty())
            .unwrap();
        assert_eq!(fw.addr(), 0x20010);
        assert_eq!(&fw.bytes().unwrap()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_bad_input() {
        let mut fw = Firmware::with_format(IhexFirmware::new());
        let err = fw.parse_bytes(Bytes::from_static(b":0400000001020304F2\n"), 0, ParseFlags::empty());
        assert_eq!(err.unwrap_err().to_string(), "no EOF record");

        let mut fw = Firmware::with_format(IhexFirmware::new());
        let err = fw.parse_bytes(Bytes::from_static(b"garbage\n"), 0, ParseFlags::empty());
        assert!(matches!(err, Err(Error::InvalidFile(_))));

        let mut fw = Firmware::with_format(IhexFirmware::new());
        let err = fw.parse_bytes(Bytes::from_static(b":00000001FF\n"), 0, ParseFlags::empty());
        assert!(matches!(err, Err(Error::InvalidFile(_))));
    }

    #[test]
    fn write_then_parse() {
        let mut fw = Firmware::with_format(IhexFirmware::new());
        fw.set_addr(0xfff8);
        fw.set_bytes(Bytes::from((0u8..40).collect::<Vec<_>>()));
        let text = fw.write().unwrap();
        let text = std::str::from_utf8(&text).unwrap();
        assert!(text.lines().any(|l| l == ":020000040001F9"), "{text}");
        assert_eq!(text.lines().last(), Some(":00000001FF"));

        let mut copy = Firmware::with_format(IhexFirmware::new());
        copy.parse_bytes(Bytes::from(text.to_string()), 0, ParseFlags::empty())
            .unwrap();
        assert_eq!(copy.addr(), 0xfff8);
        assert_eq!(copy.bytes().unwrap(), fw.bytes().unwrap());
    }
}
