use std::fmt;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BulkDataFlags(u32);

impl BulkDataFlags {
    pub const PAYLOAD_AT_END_OF_FILE: u32 = 1 << 0;
    pub const SERIALIZE_COMPRESSED_ZLIB: u32 = 1 << 1;
    pub const FORCE_SINGLE_ELEMENT_SERIALIZATION: u32 = 1 << 2;
    pub const SINGLE_USE: u32 = 1 << 3;
    pub const UNUSED: u32 = 1 << 5;
    pub const FORCE_INLINE_PAYLOAD: u32 = 1 << 6;
    pub const FORCE_STREAM_PAYLOAD: u32 = 1 << 7;
    pub const PAYLOAD_IN_SEPERATE_FILE: u32 = 1 << 8;
    pub const FORCE_NOT_INLINE_PAYLOAD: u32 = 1 << 10;
    pub const OPTIONAL_PAYLOAD: u32 = 1 << 11;
    pub const MEMORY_MAPPED_PAYLOAD: u32 = 1 << 12;
    pub const SIZE_64_BIT: u32 = 1 << 13;
    pub const NO_OFFSET_FIX_UP: u32 = 1 << 16;

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

/// Bulk data descriptor. The payload is either inline or lives in the `.ubulk` file.
#[derive(Serialize)]
pub struct FByteBulkData {
    flags: BulkDataFlags,
    element_count: u64,
    size_on_disk: u64,
    offset_in_file: u64,
    #[serde(skip)]
    data: Option<Vec<u8>>,
}

impl fmt::Debug for FByteBulkData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FByteBulkData {{ flags: {:#x}, element_count: {}, size_on_disk: {}, offset_in_file: {}, inline: {:?} }}",
            self.flags.bits(), self.element_count, self.size_on_disk, self.offset_in_file,
            self.data.as_ref().map(|v| v.len()))
    }
}

impl FByteBulkData {
    pub fn get_flags(&self) -> BulkDataFlags {
        self.flags
    }

    pub fn get_element_count(&self) -> u64 {
        self.element_count
    }

    pub fn get_size_on_disk(&self) -> u64 {
        self.size_on_disk
    }

    pub fn get_offset_in_file(&self) -> u64 {
        self.offset_in_file
    }

    pub fn is_inline(&self) -> bool {
        self.data.is_some()
    }

    /// Resolves the payload bytes, reading from `ubulk` when they are not inline.
    pub fn get_data<'a>(&'a self, ubulk: Option<&'a [u8]>) -> ParserResult<&'a [u8]> {
        if let Some(data) = &self.data {
            return Ok(data);
        }

        if self.flags.contains(BulkDataFlags::OPTIONAL_PAYLOAD) {
            return Err(ParserError::unsupported(format!("Optional bulk payload (flags {:#x})", self.flags.bits())));
        }
        if self.flags.contains(BulkDataFlags::MEMORY_MAPPED_PAYLOAD) {
            return Err(ParserError::unsupported(format!("Memory mapped bulk payload (flags {:#x})", self.flags.bits())));
        }
        if self.flags.contains(BulkDataFlags::PAYLOAD_AT_END_OF_FILE)
            && !self.flags.contains(BulkDataFlags::PAYLOAD_IN_SEPERATE_FILE) {
            return Err(ParserError::unsupported(format!("Bulk payload at end of export file (flags {:#x})", self.flags.bits())));
        }

        let ubulk = match ubulk {
            Some(data) => data,
            None => return Err(ParserError::format(format!("Bulk payload at {} needs a .ubulk file", self.offset_in_file))),
        };

        let start = self.offset_in_file;
        let end = start.checked_add(self.size_on_disk).unwrap_or(u64::MAX);
        if end > ubulk.len() as u64 {
            return Err(ParserError::format(format!("Bulk payload {}..{} outside .ubulk of {} bytes", start, end, ubulk.len())));
        }

        Ok(&ubulk[start as usize..end as usize])
    }
}

impl Newable for FByteBulkData {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        let flags = BulkDataFlags::from_bits(reader.read_u32::<LittleEndian>()?);
        let (element_count, size_on_disk) = if flags.contains(BulkDataFlags::SIZE_64_BIT) {
            (reader.read_u64::<LittleEndian>()?, reader.read_u64::<LittleEndian>()?)
        } else {
            (reader.read_u32::<LittleEndian>()? as u64, reader.read_u32::<LittleEndian>()? as u64)
        };
        let offset_in_file = reader.read_u64::<LittleEndian>()?;

        let data = if flags.contains(BulkDataFlags::FORCE_INLINE_PAYLOAD) {
            Some(read_bytes(reader, size_on_disk)?)
        } else {
            None
        };

        Ok(Self {
            flags, element_count, size_on_disk, offset_in_file, data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn header(flags: u32, size: u32, offset: u64) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(flags).unwrap();
        data.write_u32::<LittleEndian>(size).unwrap();
        data.write_u32::<LittleEndian>(size).unwrap();
        data.write_u64::<LittleEndian>(offset).unwrap();
        data
    }

    #[test]
    fn inline_payload_is_read_immediately() {
        let mut data = header(BulkDataFlags::FORCE_INLINE_PAYLOAD, 3, 0);
        data.extend_from_slice(&[7, 8, 9, 0xFF]);
        let mut reader = ReaderCursor::new(data);
        let bulk = FByteBulkData::new(&mut reader).unwrap();
        assert_eq!(reader.position(), 23);
        assert_eq!(bulk.get_data(None).unwrap(), &[7, 8, 9]);
    }

    #[test]
    fn size_64_bit_widens_counts() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(BulkDataFlags::SIZE_64_BIT).unwrap();
        data.write_u64::<LittleEndian>(2).unwrap();
        data.write_u64::<LittleEndian>(2).unwrap();
        data.write_u64::<LittleEndian>(1).unwrap();
        let mut reader = ReaderCursor::new(data);
        let bulk = FByteBulkData::new(&mut reader).unwrap();
        assert_eq!(bulk.get_size_on_disk(), 2);
        assert_eq!(bulk.get_data(Some(&[0u8, 5, 6, 0][..])).unwrap(), &[5, 6]);
    }

    #[test]
    fn separate_file_payload_reads_ubulk() {
        let flags = BulkDataFlags::PAYLOAD_AT_END_OF_FILE | BulkDataFlags::PAYLOAD_IN_SEPERATE_FILE
            | BulkDataFlags::FORCE_NOT_INLINE_PAYLOAD;
        let mut reader = ReaderCursor::new(header(flags, 2, 1));
        let bulk = FByteBulkData::new(&mut reader).unwrap();
        assert_eq!(bulk.get_data(Some(&[1u8, 2, 3][..])).unwrap(), &[2, 3]);
        assert_eq!(bulk.get_data(None).unwrap_err().get_kind(), ParserErrorKind::Format);
        assert_eq!(bulk.get_data(Some(&[1u8, 2][..])).unwrap_err().get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn unsupported_storage_locations() {
        for flags in &[BulkDataFlags::PAYLOAD_AT_END_OF_FILE, BulkDataFlags::OPTIONAL_PAYLOAD,
                BulkDataFlags::MEMORY_MAPPED_PAYLOAD | BulkDataFlags::PAYLOAD_IN_SEPERATE_FILE] {
            let mut reader = ReaderCursor::new(header(*flags, 1, 0));
            let bulk = FByteBulkData::new(&mut reader).unwrap();
            assert!(bulk.get_data(Some(&[0u8][..])).unwrap_err().is_unsupported());
        }
    }
}
