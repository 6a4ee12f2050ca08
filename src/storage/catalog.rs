//! Table namespace and schema registry.
//!
//! One catalog per database. The registry maps upper-cased table names to
//! metadata; names compare case-insensitively because the tokenizer folds
//! identifiers. Each table persists its schema as `schema.json` inside its
//! own directory, and the catalog keeps a best-effort `db.meta.json` summary
//! at the data root that is rewritten whole on every mutation.
//!
//! Bootstrap enumerates the data root's subdirectories and reads each
//! `schema.json`; tables with missing or corrupt schemas are skipped with a
//! warning rather than failing startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};
use crate::types::{DataType, TableSchema};

const METADATA_FILE: &str = "db.meta.json";
const SCHEMA_FILE: &str = "schema.json";

#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub table_name: String,
    pub schema: TableSchema,
    pub data_directory: PathBuf,
    pub row_count: u64,
}

pub struct Catalog {
    data_directory: PathBuf,
    tables: Mutex<HashMap<String, TableMetadata>>,
}

/// `schema.json` document.
#[derive(Serialize, Deserialize)]
struct SchemaDoc {
    table_name: String,
    columns: Vec<ColumnDoc>,
}

#[derive(Serialize, Deserialize)]
struct ColumnDoc {
    name: String,
    #[serde(rename = "type")]
    data_type: DataType,
}

/// `db.meta.json` document.
#[derive(Serialize, Deserialize, Default)]
struct MetaDoc {
    tables: Vec<MetaTableDoc>,
}

#[derive(Serialize, Deserialize)]
struct MetaTableDoc {
    name: String,
    directory: String,
    row_count: u64,
}

fn catalog_key(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl Catalog {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_directory: data_dir.as_ref().to_path_buf(),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the data directory if needed and loads every table that has a
    /// readable schema file.
    pub fn initialize(&self) -> DbResult<()> {
        std::fs::create_dir_all(&self.data_directory).map_err(|e| {
            DbError::Io(format!(
                "Failed to create data directory {}: {}",
                self.data_directory.display(),
                e
            ))
        })?;
        self.load_metadata()
    }

    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    pub fn table_directory(&self, table_name: &str) -> PathBuf {
        self.data_directory.join(catalog_key(table_name))
    }

    pub fn create_table(
        &self,
        table_name: &str,
        schema: TableSchema,
        if_not_exists: bool,
    ) -> DbResult<()> {
        let key = catalog_key(table_name);
        let mut tables = self.lock_tables()?;

        if tables.contains_key(&key) {
            if if_not_exists {
                info!("table {} already exists, skipping create", key);
                return Ok(());
            }
            return Err(DbError::AlreadyExists(format!(
                "Table already exists: {}",
                key
            )));
        }

        let table_dir = self.table_directory(&key);
        std::fs::create_dir_all(&table_dir).map_err(|e| {
            DbError::Io(format!(
                "Failed to create table directory {}: {}",
                table_dir.display(),
                e
            ))
        })?;

        self.save_table_schema(&table_dir, &schema)?;

        tables.insert(
            key.clone(),
            TableMetadata {
                table_name: key.clone(),
                schema,
                data_directory: table_dir,
                row_count: 0,
            },
        );
        self.save_metadata_locked(&tables)?;

        info!("table {} created", key);
        Ok(())
    }

    pub fn drop_table(&self, table_name: &str, if_exists: bool) -> DbResult<()> {
        let key = catalog_key(table_name);
        let mut tables = self.lock_tables()?;

        let Some(metadata) = tables.get(&key) else {
            if if_exists {
                info!("table {} does not exist, skipping drop", key);
                return Ok(());
            }
            return Err(DbError::NotFound(format!("Table not found: {}", key)));
        };

        std::fs::remove_dir_all(&metadata.data_directory).map_err(|e| {
            DbError::Io(format!(
                "Failed to remove table directory {}: {}",
                metadata.data_directory.display(),
                e
            ))
        })?;

        tables.remove(&key);
        self.save_metadata_locked(&tables)?;

        info!("table {} dropped", key);
        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> bool {
        self.tables
            .lock()
            .map(|tables| tables.contains_key(&catalog_key(table_name)))
            .unwrap_or(false)
    }

    /// Snapshots a copy of the metadata so callers hold no lock.
    pub fn get_table_metadata(&self, table_name: &str) -> DbResult<TableMetadata> {
        let tables = self.lock_tables()?;
        tables
            .get(&catalog_key(table_name))
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("Table not found: {}", catalog_key(table_name))))
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.tables
            .lock()
            .map(|tables| {
                let mut names: Vec<String> = tables.keys().cloned().collect();
                names.sort();
                names
            })
            .unwrap_or_default()
    }

    pub fn update_row_count(&self, table_name: &str, row_count: u64) -> DbResult<()> {
        let mut tables = self.lock_tables()?;
        let key = catalog_key(table_name);
        let Some(metadata) = tables.get_mut(&key) else {
            return Err(DbError::NotFound(format!("Table not found: {}", key)));
        };
        metadata.row_count = row_count;
        self.save_metadata_locked(&tables)
    }

    fn lock_tables(&self) -> DbResult<std::sync::MutexGuard<'_, HashMap<String, TableMetadata>>> {
        self.tables
            .lock()
            .map_err(|_| DbError::Internal("Catalog lock poisoned".to_string()))
    }

    fn metadata_file_path(&self) -> PathBuf {
        self.data_directory.join(METADATA_FILE)
    }

    fn save_table_schema(&self, table_dir: &Path, schema: &TableSchema) -> DbResult<()> {
        let doc = SchemaDoc {
            table_name: schema.table_name.clone(),
            columns: schema
                .column_names
                .iter()
                .zip(&schema.column_types)
                .map(|(name, data_type)| ColumnDoc {
                    name: name.clone(),
                    data_type: *data_type,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| DbError::Internal(format!("Failed to serialize schema: {}", e)))?;
        let path = table_dir.join(SCHEMA_FILE);
        std::fs::write(&path, json)
            .map_err(|e| DbError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    fn load_table_schema(&self, table_dir: &Path) -> DbResult<TableSchema> {
        let path = table_dir.join(SCHEMA_FILE);
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| DbError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let doc: SchemaDoc = serde_json::from_str(&contents)
            .map_err(|e| DbError::Io(format!("Corrupt schema file {}: {}", path.display(), e)))?;

        let mut schema = TableSchema::new(doc.table_name);
        for column in doc.columns {
            schema.add_column(column.name, column.data_type);
        }
        Ok(schema)
    }

    /// Rewrites `db.meta.json` in place. Best-effort durability: the write is
    /// not fenced, matching the summary nature of the file.
    fn save_metadata_locked(&self, tables: &HashMap<String, TableMetadata>) -> DbResult<()> {
        let mut doc = MetaDoc::default();
        for metadata in tables.values() {
            doc.tables.push(MetaTableDoc {
                name: metadata.table_name.clone(),
                directory: metadata.data_directory.display().to_string(),
                row_count: metadata.row_count,
            });
        }
        doc.tables.sort_by(|a, b| a.name.cmp(&b.name));

        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| DbError::Internal(format!("Failed to serialize metadata: {}", e)))?;
        let path = self.metadata_file_path();
        std::fs::write(&path, json)
            .map_err(|e| DbError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Scans data-root subdirectories for table schemas. Row counts are
    /// restored from `db.meta.json` when present.
    fn load_metadata(&self) -> DbResult<()> {
        let saved_counts = self.load_saved_row_counts();

        let entries = match std::fs::read_dir(&self.data_directory) {
            Ok(entries) => entries,
            Err(e) => {
                return Err(DbError::Io(format!(
                    "Failed to list data directory {}: {}",
                    self.data_directory.display(),
                    e
                )));
            }
        };

        let mut tables = self.lock_tables()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match self.load_table_schema(&path) {
                Ok(schema) => {
                    let key = catalog_key(dir_name);
                    let row_count = saved_counts.get(&key).copied().unwrap_or(0);
                    info!("loaded table {} ({} columns)", key, schema.column_count());
                    tables.insert(
                        key.clone(),
                        TableMetadata {
                            table_name: key,
                            schema,
                            data_directory: path,
                            row_count,
                        },
                    );
                }
                Err(e) => {
                    warn!("skipping table directory {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }

    fn load_saved_row_counts(&self) -> HashMap<String, u64> {
        let Ok(contents) = std::fs::read_to_string(self.metadata_file_path()) else {
            return HashMap::new();
        };
        let Ok(doc) = serde_json::from_str::<MetaDoc>(&contents) else {
            warn!("ignoring corrupt {}", METADATA_FILE);
            return HashMap::new();
        };
        doc.tables
            .into_iter()
            .map(|t| (catalog_key(&t.name), t.row_count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_schema(name: &str) -> TableSchema {
        let mut schema = TableSchema::new(name);
        schema.add_column("ID", DataType::Int);
        schema.add_column("NAME", DataType::String);
        schema
    }

    #[test]
    fn create_table_registers_and_persists() {
        let dir = tempdir().expect("tempdir");
        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("initialize");

        catalog
            .create_table("T1", sample_schema("T1"), false)
            .expect("create");

        assert!(catalog.table_exists("t1"));
        assert!(dir.path().join("T1").join("schema.json").exists());
        assert!(dir.path().join("db.meta.json").exists());

        let metadata = catalog.get_table_metadata("T1").expect("metadata");
        assert_eq!(metadata.schema.column_names, vec!["ID", "NAME"]);
        assert_eq!(metadata.row_count, 0);
    }

    #[test]
    fn duplicate_create_requires_if_not_exists() {
        let dir = tempdir().expect("tempdir");
        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("initialize");

        catalog
            .create_table("T1", sample_schema("T1"), false)
            .expect("create");
        let err = catalog
            .create_table("T1", sample_schema("T1"), false)
            .unwrap_err();
        assert!(err.is_already_exists());

        // IF NOT EXISTS turns the duplicate into a no-op.
        catalog
            .create_table("T1", sample_schema("T1"), true)
            .expect("create if not exists");
    }

    #[test]
    fn drop_table_removes_directory() {
        let dir = tempdir().expect("tempdir");
        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("initialize");

        catalog
            .create_table("T1", sample_schema("T1"), false)
            .expect("create");
        catalog.drop_table("t1", false).expect("drop");

        assert!(!catalog.table_exists("T1"));
        assert!(!dir.path().join("T1").exists());

        let err = catalog.drop_table("T1", false).unwrap_err();
        assert!(err.is_not_found());
        catalog.drop_table("T1", true).expect("drop if exists");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let dir = tempdir().expect("tempdir");
        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("initialize");
        catalog
            .create_table("users", sample_schema("USERS"), false)
            .expect("create");

        assert!(catalog.table_exists("USERS"));
        assert!(catalog.table_exists("Users"));
        assert_eq!(catalog.list_tables(), vec!["USERS"]);
    }

    #[test]
    fn bootstrap_reloads_tables_from_disk() {
        let dir = tempdir().expect("tempdir");
        {
            let catalog = Catalog::new(dir.path());
            catalog.initialize().expect("initialize");
            catalog
                .create_table("T1", sample_schema("T1"), false)
                .expect("create");
            catalog.update_row_count("T1", 42).expect("update count");
        }

        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("re-initialize");
        let metadata = catalog.get_table_metadata("T1").expect("metadata");
        assert_eq!(metadata.schema.column_names, vec!["ID", "NAME"]);
        assert_eq!(metadata.row_count, 42);
    }

    #[test]
    fn bootstrap_skips_corrupt_schema() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("BROKEN")).expect("mkdir");
        std::fs::write(dir.path().join("BROKEN").join("schema.json"), "not json")
            .expect("write corrupt schema");
        std::fs::create_dir(dir.path().join("EMPTY")).expect("mkdir");

        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("initialize despite corruption");
        assert!(!catalog.table_exists("BROKEN"));
        assert!(!catalog.table_exists("EMPTY"));
    }

    #[test]
    fn update_row_count_requires_table() {
        let dir = tempdir().expect("tempdir");
        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("initialize");
        let err = catalog.update_row_count("NOPE", 1).unwrap_err();
        assert!(err.is_not_found());
    }
}
