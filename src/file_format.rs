//! Bit-exact on-disk layout (spec.md §6). Little-endian throughout.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::EngineError;
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"MDB1";
pub const CURRENT_VERSION: i16 = 1;
pub const HEADER_SIZE: usize = 256;
pub const TABLE_META_SIZE: usize = 128;
pub const TABLE_NAME_MAX: usize = 64;

pub struct FileHeader {
    pub version: i16,
    pub table_count: i16,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        LittleEndian::write_i16(&mut buf[4..6], self.version);
        LittleEndian::write_i16(&mut buf[6..8], self.table_count);
        buf
    }

    pub fn decode(buf: &[u8], path: &Path) -> Result<Self, EngineError> {
        if &buf[0..4] != MAGIC {
            return Err(EngineError::InvalidFormat {
                path: path.to_path_buf(),
            });
        }
        let version = LittleEndian::read_i16(&buf[4..6]);
        if version != CURRENT_VERSION {
            return Err(EngineError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: version,
                expected: CURRENT_VERSION,
            });
        }
        let table_count = LittleEndian::read_i16(&buf[6..8]);
        Ok(FileHeader {
            version,
            table_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TableMetadataRecord {
    pub name: String,
    pub record_count: i32,
    pub record_width: i32,
    pub data_start_offset: i64,
}

impl TableMetadataRecord {
    pub fn encode(&self) -> Result<[u8; TABLE_META_SIZE], EngineError> {
        let name_bytes = self.name.as_bytes();
        if name_bytes.len() > TABLE_NAME_MAX {
            return Err(EngineError::Configuration(format!(
                "table name `{}` exceeds {TABLE_NAME_MAX} UTF-8 bytes",
                self.name
            )));
        }
        let mut buf = [0u8; TABLE_META_SIZE];
        buf[0..name_bytes.len()].copy_from_slice(name_bytes);
        LittleEndian::write_i32(&mut buf[64..68], self.record_count);
        LittleEndian::write_i32(&mut buf[68..72], self.record_width);
        LittleEndian::write_i64(&mut buf[72..80], self.data_start_offset);
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Self {
        let name_end = buf[0..64].iter().position(|&b| b == 0).unwrap_or(64);
        let name = String::from_utf8_lossy(&buf[0..name_end]).into_owned();
        let record_count = LittleEndian::read_i32(&buf[64..68]);
        let record_width = LittleEndian::read_i32(&buf[68..72]);
        let data_start_offset = LittleEndian::read_i64(&buf[72..80]);
        TableMetadataRecord {
            name,
            record_count,
            record_width,
            data_start_offset,
        }
    }
}
