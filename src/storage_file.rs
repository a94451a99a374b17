//! Owns the file handle and binary layout: create/open, load a whole
//! table, apply adds/updates/soft-deletes, rewrite a table's metadata
//! slot (spec.md §4.3).
//!
//! Instances live on the Write Queue's dedicated worker thread after the
//! initial open+load (see `write_queue.rs`); nothing else touches the
//! file handle while a commit can be in flight.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::file_format::{
    FileHeader, TableMetadataRecord, CURRENT_VERSION, HEADER_SIZE, TABLE_META_SIZE,
};
use crate::schema::{Entity, EntitySchema};

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub record_count: u32,
    pub record_width: usize,
    pub data_start_offset: u64,
}

/// A commit's per-table delta, already encoded to bytes so this type
/// carries no generic entity parameter (spec.md §4.6/§4.8).
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub added: Vec<(i32, Vec<u8>)>,
    pub modified: Vec<(i32, Vec<u8>)>,
    pub deleted: Vec<i32>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

pub struct StorageFileManager {
    path: PathBuf,
    /// Declaration order, which is also the on-disk metadata-slot order.
    order: Vec<String>,
    tables: HashMap<String, TableInfo>,
}

impl StorageFileManager {
    pub fn open(
        path: &Path,
        schema: &[(&str, &'static EntitySchema)],
    ) -> Result<Self, EngineError> {
        if path.exists() {
            Self::open_existing(path, schema)
        } else {
            Self::create(path, schema)
        }
    }

    fn create(path: &Path, schema: &[(&str, &'static EntitySchema)]) -> Result<Self, EngineError> {
        let mut file = File::create(path)?;
        let header = FileHeader {
            version: CURRENT_VERSION,
            table_count: schema.len() as i16,
        };
        file.write_all(&header.encode())?;

        let mut order = Vec::with_capacity(schema.len());
        let mut tables = HashMap::with_capacity(schema.len());
        let mut metas = Vec::with_capacity(schema.len());
        // At creation every table starts empty, so regions start
        // immediately back to back right after the metadata block. Each
        // table's data_start_offset is fixed for the life of the file
        // (it is a stored field, never recomputed on open) -- a table
        // that grows past a frozen neighbor's start would corrupt it;
        // see DESIGN.md.
        let offset = (HEADER_SIZE + TABLE_META_SIZE * schema.len()) as i64;
        for (name, entity_schema) in schema {
            let name = (*name).to_string();
            metas.push(TableMetadataRecord {
                name: name.clone(),
                record_count: 0,
                record_width: entity_schema.record_width as i32,
                data_start_offset: offset,
            });
            tables.insert(
                name.clone(),
                TableInfo {
                    record_count: 0,
                    record_width: entity_schema.record_width,
                    data_start_offset: offset as u64,
                },
            );
            order.push(name);
        }
        for record in &metas {
            file.write_all(&record.encode()?)?;
        }
        file.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            order,
            tables,
        })
    }

    fn open_existing(
        path: &Path,
        schema: &[(&str, &'static EntitySchema)],
    ) -> Result<Self, EngineError> {
        let mut file = File::open(path)?;
        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = FileHeader::decode(&header_buf, path)?;

        let mut order = Vec::with_capacity(header.table_count as usize);
        let mut tables = HashMap::with_capacity(header.table_count as usize);
        for _ in 0..header.table_count {
            let mut meta_buf = [0u8; TABLE_META_SIZE];
            file.read_exact(&mut meta_buf)?;
            let record = TableMetadataRecord::decode(&meta_buf);
            tables.insert(
                record.name.clone(),
                TableInfo {
                    record_count: record.record_count.max(0) as u32,
                    record_width: record.record_width as usize,
                    data_start_offset: record.data_start_offset as u64,
                },
            );
            order.push(record.name);
        }
        // Schema evolution of an existing file is a non-goal; the caller's
        // declared schema is trusted to match the file's stored layout.
        let _ = schema;
        Ok(Self {
            path: path.to_path_buf(),
            order,
            tables,
        })
    }

    pub fn table_metadata(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn table_infos(&self) -> &HashMap<String, TableInfo> {
        &self.tables
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_table<T: Entity>(&self, name: &str) -> Result<Vec<T>, EngineError> {
        let info = self
            .tables
            .get(name)
            .ok_or_else(|| EngineError::UnknownTable(name.to_string()))?;
        load_table_at(&self.path, info)
    }

    /// Appends `added`, overwrites `modified` slots in place, tombstones
    /// `deleted` slots, flushes data, then rewrites this table's metadata
    /// slot and flushes again (spec.md §4.3, data-before-header).
    pub fn apply_changes(&mut self, name: &str, changes: &ChangeSet) -> Result<(), EngineError> {
        let info = self
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTable(name.to_string()))?;
        let mut record_count = info.record_count;
        let data_start = info.data_start_offset;
        let width = info.record_width as u64;

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        for (_, bytes) in &changes.added {
            let offset = data_start + record_count as u64 * width;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
            record_count += 1;
        }
        for (id, bytes) in &changes.modified {
            // Upsert-at-Id: writing past record_count is accepted, not
            // checked (see the open question resolved in DESIGN.md).
            let offset = data_start + (*id as u64 - 1) * width;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
        }
        for id in &changes.deleted {
            let offset = data_start + (*id as u64 - 1) * width;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&[0x01])?;
        }
        file.flush()?;

        if let Some(entry) = self.tables.get_mut(name) {
            entry.record_count = record_count;
        }
        self.rewrite_table_metadata(&mut file, name)?;
        file.flush()?;
        Ok(())
    }

    fn rewrite_table_metadata(&self, file: &mut File, name: &str) -> Result<(), EngineError> {
        let index = self
            .order
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| EngineError::UnknownTable(name.to_string()))?;
        let info = self.tables.get(name).expect("looked up above");
        let record = TableMetadataRecord {
            name: name.to_string(),
            record_count: info.record_count as i32,
            record_width: info.record_width as i32,
            data_start_offset: info.data_start_offset as i64,
        };
        let offset = (HEADER_SIZE + index * TABLE_META_SIZE) as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&record.encode()?)?;
        Ok(())
    }
}

/// Reads and decodes one table's live records straight from `path`,
/// independent of any `StorageFileManager` instance. Used both by
/// `StorageFileManager::load_table` and by the Shared File Cache, which
/// needs to load every table's rows before the manager is handed off to
/// the write-queue thread.
pub fn load_table_at<T: Entity>(path: &Path, info: &TableInfo) -> Result<Vec<T>, EngineError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(info.data_start_offset))?;
    let total = info.record_count as usize * info.record_width;
    let mut raw = vec![0u8; total];
    file.read_exact(&mut raw)?;

    let mut records = Vec::with_capacity(info.record_count as usize);
    for slot in raw.chunks_exact(info.record_width) {
        if slot[0] == 0x00 {
            records.push(T::decode(slot)?);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::schema::FieldDescriptor;

    struct Row {
        id: i32,
    }

    impl Entity for Row {
        fn schema() -> &'static EntitySchema {
            static FIELDS: &[FieldDescriptor] = &[];
            static SCHEMA: EntitySchema = EntitySchema {
                fields: FIELDS,
                record_width: 5,
            };
            &SCHEMA
        }
        fn id(&self) -> i32 {
            self.id
        }
        fn set_id(&mut self, id: i32) {
            self.id = id;
        }
        fn encode(&self, buf: &mut [u8]) {
            buf[0] = 0;
            crate::codec::write_i32_le(&mut buf[1..5], &self.id);
        }
        fn decode(buf: &[u8]) -> Result<Self, CodecError> {
            Ok(Row {
                id: crate::codec::read_i32_le(&buf[1..5]),
            })
        }
    }

    /// Forces a crash between the two flushes of `apply_changes` (spec.md
    /// §4.3: data flushed, then the table's metadata slot rewritten and
    /// flushed again) by writing a record's bytes straight to the data
    /// region without ever touching `record_count`. Reopening must not
    /// crash, and the stored `record_count` -- not the bytes sitting past
    /// it -- is what decides which records are live.
    #[test]
    fn reopen_after_partial_write_does_not_crash_and_discards_unrecorded_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.mdb");
        let schema: &[(&str, &'static EntitySchema)] = &[("rows", Row::schema())];

        let manager = StorageFileManager::open(&path, schema).unwrap();
        let info = manager.table_metadata("rows").unwrap().clone();
        drop(manager);

        let mut buf = vec![0u8; info.record_width];
        Row { id: 1 }.encode(&mut buf);
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(info.data_start_offset)).unwrap();
        file.write_all(&buf).unwrap();
        file.flush().unwrap();
        drop(file);

        let reopened = StorageFileManager::open(&path, schema).unwrap();
        let rows: Vec<Row> = reopened.load_table("rows").unwrap();
        assert!(rows.is_empty());
    }
}
