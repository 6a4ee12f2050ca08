//! Columnar table storage.
//!
//! Each table lives in its own directory with one `col_<index>.bin` file per
//! column: a fixed [`ColumnFileHeader`] followed by the packed payload.
//! A table handle owns a write mutex and no row cache; scans re-read the
//! column files. Missing column files mean the table has never been written
//! and scan as empty.
//!
//! Column rewrites go through a temp file and rename so a crash mid-write
//! cannot leave a half-written column behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};

use crate::error::{DbError, DbResult};
use crate::storage::catalog::Catalog;
use crate::types::{ColumnVector, DataType, Row, TableSchema};
use crate::value::{parse_leading_f64, parse_leading_i64};

/// On-disk column file header, 28 packed little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnFileHeader {
    pub magic: u32,
    pub version: u32,
    pub data_type: u32,
    pub row_count: u64,
    pub data_offset: u64,
}

impl ColumnFileHeader {
    pub const MAGIC: u32 = 0x4D49_4E49; // "MINI"
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 28;

    pub fn new(data_type: DataType, row_count: u64) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            data_type: data_type.ordinal(),
            row_count,
            data_offset: Self::SIZE as u64,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_type.to_le_bytes());
        buf[12..20].copy_from_slice(&self.row_count.to_le_bytes());
        buf[20..28].copy_from_slice(&self.data_offset.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> DbResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(DbError::Io("Column file header truncated".to_string()));
        }
        let read_u32 = |offset: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[offset..offset + 4]);
            u32::from_le_bytes(buf)
        };
        let read_u64 = |offset: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[offset..offset + 8]);
            u64::from_le_bytes(buf)
        };
        let header = Self {
            magic: read_u32(0),
            version: read_u32(4),
            data_type: read_u32(8),
            row_count: read_u64(12),
            data_offset: read_u64(20),
        };
        if header.magic != Self::MAGIC {
            return Err(DbError::Io("Invalid column file format".to_string()));
        }
        Ok(header)
    }
}

/// Handle to one table's column files. Operations serialize on the write
/// mutex, including scans.
#[derive(Debug)]
pub struct Table {
    table_name: String,
    schema: TableSchema,
    data_directory: PathBuf,
    lock: Mutex<()>,
}

impl Table {
    pub fn new(
        table_name: impl Into<String>,
        schema: TableSchema,
        data_directory: impl AsRef<Path>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            schema,
            data_directory: data_directory.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn initialize(&self) -> DbResult<()> {
        if !self.data_directory.is_dir() {
            return Err(DbError::Io(format!(
                "Table data directory does not exist: {}",
                self.data_directory.display()
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.table_name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn insert_rows(&self, rows: &[Row]) -> DbResult<()> {
        let _guard = self.acquire()?;
        if rows.is_empty() {
            return Ok(());
        }

        for row in rows {
            if row.values.len() != self.schema.column_count() {
                return Err(DbError::InvalidArgument(
                    "Row has incorrect number of columns".to_string(),
                ));
            }
        }

        let mut columns = self.load_all_columns()?;
        let new_columns = self.rows_to_columns(rows)?;
        for (existing, new) in columns.iter_mut().zip(new_columns) {
            existing.data.extend_from_slice(&new.data);
            existing.row_count += new.row_count;
        }

        for (index, column) in columns.iter().enumerate() {
            self.save_column_data(index, column)?;
        }

        info!("{}: inserted {} rows", self.table_name, rows.len());
        Ok(())
    }

    /// Removes the rows at the given indices, preserving the order of the
    /// remaining rows.
    pub fn delete_rows(&self, row_indices: &[usize]) -> DbResult<()> {
        let _guard = self.acquire()?;
        if row_indices.is_empty() {
            return Ok(());
        }

        let columns = self.load_all_columns()?;
        let total_rows = columns.first().map(|c| c.row_count).unwrap_or(0);
        if total_rows == 0 {
            return Ok(());
        }

        for &index in row_indices {
            if index >= total_rows {
                return Err(DbError::InvalidArgument(format!(
                    "Row index out of range: {}",
                    index
                )));
            }
        }

        let mut keep = vec![true; total_rows];
        for &index in row_indices {
            keep[index] = false;
        }

        for (index, column) in columns.iter().enumerate() {
            let rebuilt = rebuild_column(column, &keep);
            self.save_column_data(index, &rebuilt)?;
        }

        info!("{}: deleted {} rows", self.table_name, row_indices.len());
        Ok(())
    }

    /// Reads every column. A table with no column files scans as empty.
    pub fn scan_all(&self) -> DbResult<Vec<ColumnVector>> {
        let _guard = self.acquire()?;
        self.load_all_columns()
    }

    /// Reads the named subset of columns, in request order.
    pub fn scan_columns(&self, column_names: &[String]) -> DbResult<Vec<ColumnVector>> {
        let _guard = self.acquire()?;

        let mut indices = Vec::with_capacity(column_names.len());
        for name in column_names {
            let index = self.schema.get_column_index(name).ok_or_else(|| {
                DbError::NotFound(format!(
                    "Column not found: {} in table {}",
                    name, self.table_name
                ))
            })?;
            indices.push(index);
        }

        let mut columns = Vec::with_capacity(indices.len());
        for &index in &indices {
            match self.load_column_data(index) {
                Ok(column) => columns.push(column),
                Err(e) if e.is_not_found() => {
                    // Never written: the whole table is empty.
                    return Ok(indices.iter().map(|&i| self.empty_column(i)).collect());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(columns)
    }

    /// Row count as recorded in the first column's header; 0 for a table
    /// that has never been written.
    pub fn row_count(&self) -> DbResult<u64> {
        let _guard = self.acquire()?;
        if self.schema.column_count() == 0 {
            return Ok(0);
        }
        let path = self.column_file_path(0);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(DbError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        Ok(ColumnFileHeader::decode(&bytes)?.row_count)
    }

    fn acquire(&self) -> DbResult<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| DbError::Internal(format!("Table lock poisoned: {}", self.table_name)))
    }

    fn column_file_path(&self, column_index: usize) -> PathBuf {
        self.data_directory.join(format!("col_{}.bin", column_index))
    }

    fn empty_column(&self, column_index: usize) -> ColumnVector {
        ColumnVector::new(
            self.schema.column_names[column_index].clone(),
            self.schema.column_types[column_index],
        )
    }

    fn load_all_columns(&self) -> DbResult<Vec<ColumnVector>> {
        let mut columns = Vec::with_capacity(self.schema.column_count());
        for index in 0..self.schema.column_count() {
            match self.load_column_data(index) {
                Ok(column) => columns.push(column),
                Err(e) if e.is_not_found() => {
                    debug!("{}: column files absent, table is empty", self.table_name);
                    return Ok((0..self.schema.column_count())
                        .map(|i| self.empty_column(i))
                        .collect());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(columns)
    }

    fn load_column_data(&self, column_index: usize) -> DbResult<ColumnVector> {
        if column_index >= self.schema.column_count() {
            return Err(DbError::InvalidArgument(
                "Column index out of range".to_string(),
            ));
        }

        let path = self.column_file_path(column_index);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DbError::NotFound(format!(
                    "Column file not found: {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(DbError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let header = ColumnFileHeader::decode(&bytes)
            .map_err(|e| DbError::Io(format!("{} ({})", e, path.display())))?;

        let data_type = self.schema.column_types[column_index];
        let payload_start = header.data_offset as usize;
        let payload = match data_type.fixed_size() {
            Some(size) => {
                let expected = header.row_count as usize * size;
                let end = payload_start + expected;
                if bytes.len() < end {
                    return Err(DbError::Io(format!(
                        "Column file truncated: {}",
                        path.display()
                    )));
                }
                bytes[payload_start..end].to_vec()
            }
            // Strings have no fixed stride; the payload is the rest of the file.
            None => bytes[payload_start.min(bytes.len())..].to_vec(),
        };

        Ok(ColumnVector {
            name: self.schema.column_names[column_index].clone(),
            data_type,
            data: payload,
            row_count: header.row_count as usize,
        })
    }

    fn save_column_data(&self, column_index: usize, column: &ColumnVector) -> DbResult<()> {
        let path = self.column_file_path(column_index);
        let tmp_path = self.data_directory.join(format!("col_{}.bin.tmp", column_index));

        let header = ColumnFileHeader::new(column.data_type, column.row_count as u64);

        let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
            DbError::Io(format!("Failed to open {}: {}", tmp_path.display(), e))
        })?;
        file.write_all(&header.encode())
            .and_then(|_| file.write_all(&column.data))
            .and_then(|_| file.sync_all())
            .map_err(|e| DbError::Io(format!("Failed to write {}: {}", tmp_path.display(), e)))?;
        drop(file);

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            DbError::Io(format!("Failed to replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    /// Converts stringified rows into typed column buffers. Values parse
    /// according to the column type; unparseable numerics become zero.
    fn rows_to_columns(&self, rows: &[Row]) -> DbResult<Vec<ColumnVector>> {
        let mut columns: Vec<ColumnVector> = (0..self.schema.column_count())
            .map(|i| {
                let mut column = self.empty_column(i);
                column.reserve(rows.len());
                column
            })
            .collect();

        for row in rows {
            for (column, value) in columns.iter_mut().zip(&row.values) {
                match column.data_type {
                    DataType::Int => column.append_int(parse_leading_i64(value) as i32),
                    DataType::String => column.append_string(value)?,
                    DataType::Bool => {
                        column.append_bool(value == "true" || value == "TRUE" || value == "1")
                    }
                    DataType::Decimal => column.append_decimal(parse_leading_f64(value)),
                }
            }
        }
        Ok(columns)
    }
}

/// Applies a keep-mask to one column, preserving record order.
fn rebuild_column(column: &ColumnVector, keep: &[bool]) -> ColumnVector {
    let mut rebuilt = ColumnVector::new(column.name.clone(), column.data_type);

    match column.data_type.fixed_size() {
        Some(size) => {
            for (row, &kept) in keep.iter().enumerate() {
                if kept {
                    let start = row * size;
                    rebuilt.data.extend_from_slice(&column.data[start..start + size]);
                    rebuilt.row_count += 1;
                }
            }
        }
        None => {
            // Walk the per-row length prefixes to find each record.
            let mut offset = 0usize;
            for &kept in keep {
                let mut len_buf = [0u8; 4];
                len_buf.copy_from_slice(&column.data[offset..offset + 4]);
                let record_len = 4 + u32::from_le_bytes(len_buf) as usize;
                if kept {
                    rebuilt
                        .data
                        .extend_from_slice(&column.data[offset..offset + record_len]);
                    rebuilt.row_count += 1;
                }
                offset += record_len;
            }
        }
    }
    rebuilt
}

/// Cache of open table handles. Repeated opens return the same shared handle;
/// dropping a cache entry leaves live references intact.
pub struct TableManager {
    catalog: Arc<Catalog>,
    open_tables: Mutex<HashMap<String, Arc<Table>>>,
}

impl TableManager {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            open_tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn open_table(&self, table_name: &str) -> DbResult<Arc<Table>> {
        let key = table_name.to_ascii_uppercase();
        let mut open_tables = self.lock_tables()?;

        if let Some(table) = open_tables.get(&key) {
            return Ok(Arc::clone(table));
        }

        let metadata = self.catalog.get_table_metadata(&key)?;

        if metadata.schema.column_count() == 0 {
            return Err(DbError::Internal(format!(
                "Invalid table metadata: empty schema for {}",
                key
            )));
        }

        let table = Arc::new(Table::new(
            metadata.table_name.clone(),
            metadata.schema,
            &metadata.data_directory,
        ));
        table.initialize()?;

        debug!("opened table {}", key);
        open_tables.insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// Drops the cache entry; the handle lives until all references release.
    pub fn close_table(&self, table_name: &str) -> DbResult<()> {
        let key = table_name.to_ascii_uppercase();
        let mut open_tables = self.lock_tables()?;
        if open_tables.remove(&key).is_some() {
            debug!("closed table {}", key);
        }
        Ok(())
    }

    pub fn get_table(&self, table_name: &str) -> Option<Arc<Table>> {
        self.open_tables
            .lock()
            .ok()?
            .get(&table_name.to_ascii_uppercase())
            .cloned()
    }

    fn lock_tables(&self) -> DbResult<MutexGuard<'_, HashMap<String, Arc<Table>>>> {
        self.open_tables
            .lock()
            .map_err(|_| DbError::Internal("TableManager lock poisoned".to_string()))
    }
}
