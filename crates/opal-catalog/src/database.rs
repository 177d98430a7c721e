//! A database: a named collection of tables and stored procedures.
//!
//! Each database lives under `<root>/databases/<name>/` with one directory
//! per table and a single `<name>.proc` file holding every stored procedure.
//! Procedure bodies are opaque bytes here; the parser collaborator owns
//! their encoding.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use opal_common::error::{Entity, OpalError, OpalResult};
use opal_common::PROC_EXTENSION;

use crate::schema::TableSchema;
use crate::table::Table;

/// A stored procedure: a name and the parser's serialized statement tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    /// Procedure name.
    pub name: String,
    /// Opaque body owned by the parser.
    pub body: Vec<u8>,
}

/// The procedures map and its backing file, guarded jointly.
struct ProcedureStore {
    file: File,
    map: HashMap<String, Procedure>,
}

/// A named database within the catalog.
pub struct Database {
    name: String,
    directory: PathBuf,
    tables: HashMap<String, Table>,
    procedures: Mutex<ProcedureStore>,
}

impl Database {
    /// Creates a new database directory and its empty procedures file.
    pub(crate) fn create(databases_dir: &Path, name: &str) -> OpalResult<Self> {
        let directory = databases_dir.join(name);
        fs::create_dir(&directory)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(directory.join(format!("{name}.{PROC_EXTENSION}")))?;

        let map = HashMap::new();
        let bytes = bincode::serialize(&map)
            .map_err(|e| OpalError::corruption("procedures", e.to_string()))?;
        file.write_all(&bytes)?;

        Ok(Self {
            name: name.to_string(),
            directory,
            tables: HashMap::new(),
            procedures: Mutex::new(ProcedureStore { file, map }),
        })
    }

    /// Reconstructs a database from its directory: the `.proc` file if
    /// present, and one table per subdirectory.
    pub(crate) fn open(databases_dir: &Path, name: &str) -> OpalResult<Self> {
        let directory = databases_dir.join(name);

        let proc_path = directory.join(format!("{name}.{PROC_EXTENSION}"));
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&proc_path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let map = if bytes.is_empty() {
            HashMap::new()
        } else {
            bincode::deserialize(&bytes)
                .map_err(|e| OpalError::corruption("procedures", e.to_string()))?
        };

        let mut tables = HashMap::new();
        for entry in fs::read_dir(&directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let table_name = entry.file_name().to_string_lossy().into_owned();
            let table = Table::open(&directory, &table_name)?;
            tables.insert(table_name, table);
        }

        Ok(Self {
            name: name.to_string(),
            directory,
            tables,
            procedures: Mutex::new(ProcedureStore { file, map }),
        })
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this database's tables.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Creates a table. The schema is validated, unique columns get their
    /// `unique_<col>` indexes, and everything is persisted before this
    /// returns. A failed create removes whatever it put on disk.
    pub fn create_table(
        &mut self,
        name: &str,
        schema: TableSchema,
        encrypt: bool,
        compress: bool,
        key: &[u8],
    ) -> OpalResult<()> {
        if self.tables.contains_key(name) {
            return Err(OpalError::already_exists(Entity::Table, name));
        }

        match Table::create(&self.directory, name, schema, encrypt, compress, key) {
            Ok(table) => {
                tracing::info!(database = %self.name, table = name, "created table");
                self.tables.insert(name.to_string(), table);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_dir_all(self.directory.join(name));
                Err(e)
            }
        }
    }

    /// Drops a table and removes its directory.
    pub fn drop_table(&mut self, name: &str) -> OpalResult<()> {
        if self.tables.remove(name).is_none() {
            return Err(OpalError::not_found(Entity::Table, name));
        }

        fs::remove_dir_all(self.directory.join(name))?;
        tracing::info!(database = %self.name, table = name, "dropped table");
        Ok(())
    }

    /// Looks up a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Looks up a table for shape mutation (alter, index DDL).
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Sorted table names.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Procedures
    // =========================================================================

    /// Adds a procedure and persists the procedures file.
    pub fn add_procedure(&self, procedure: Procedure) -> OpalResult<()> {
        let mut store = self.procedures.lock();

        if store.map.contains_key(&procedure.name) {
            return Err(OpalError::already_exists(Entity::Procedure, &procedure.name));
        }

        store.map.insert(procedure.name.clone(), procedure);
        persist_procedures(&mut store)
    }

    /// Removes a procedure and persists the procedures file.
    pub fn drop_procedure(&self, name: &str) -> OpalResult<()> {
        let mut store = self.procedures.lock();

        if store.map.remove(name).is_none() {
            return Err(OpalError::not_found(Entity::Procedure, name));
        }

        persist_procedures(&mut store)
    }

    /// Fetches a procedure by name.
    pub fn get_procedure(&self, name: &str) -> OpalResult<Procedure> {
        self.procedures
            .lock()
            .map
            .get(name)
            .cloned()
            .ok_or_else(|| OpalError::not_found(Entity::Procedure, name))
    }

    /// Sorted procedure names.
    pub fn procedures(&self) -> Vec<String> {
        let mut names: Vec<String> = self.procedures.lock().map.keys().cloned().collect();
        names.sort();
        names
    }

    /// Flushes the procedures file and closes every table. Best-effort.
    pub(crate) fn close(&self) {
        if let Err(e) = self.procedures.lock().file.sync_all() {
            tracing::warn!(database = %self.name, "failed to sync procedures file: {e}");
        }
        for table in self.tables.values() {
            table.close();
        }
    }
}

fn persist_procedures(store: &mut ProcedureStore) -> OpalResult<()> {
    let bytes = bincode::serialize(&store.map)
        .map_err(|e| OpalError::corruption("procedures", e.to_string()))?;

    store.file.set_len(0)?;
    store.file.seek(SeekFrom::Start(0))?;
    store.file.write_all(&bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDefinition, DataType};
    use tempfile::TempDir;

    fn schema() -> TableSchema {
        TableSchema::new().with_column("v", ColumnDefinition::new(DataType::Text))
    }

    #[test]
    fn test_create_and_drop_table() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(dir.path(), "shop").unwrap();

        db.create_table("items", schema(), false, false, b"").unwrap();
        assert!(db.get_table("items").is_some());
        assert!(dir.path().join("shop/items/items.schma").exists());

        let result = db.create_table("items", schema(), false, false, b"");
        assert!(matches!(result, Err(OpalError::AlreadyExists { .. })));

        db.drop_table("items").unwrap();
        assert!(db.get_table("items").is_none());
        assert!(!dir.path().join("shop/items").exists());
    }

    #[test]
    fn test_failed_create_cleans_up() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(dir.path(), "shop").unwrap();

        // CHAR without a length fails schema validation
        let bad = TableSchema::new().with_column("c", ColumnDefinition::new(DataType::Char));
        let result = db.create_table("broken", bad, false, false, b"");
        assert!(matches!(result, Err(OpalError::SchemaViolation { .. })));
        assert!(db.get_table("broken").is_none());
        assert!(!dir.path().join("shop/broken").exists());
    }

    #[test]
    fn test_procedures_roundtrip() {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path(), "shop").unwrap();

        let proc = Procedure {
            name: "restock".to_string(),
            body: vec![1, 2, 3],
        };
        db.add_procedure(proc.clone()).unwrap();

        assert_eq!(db.get_procedure("restock").unwrap(), proc);
        assert!(matches!(
            db.add_procedure(proc.clone()),
            Err(OpalError::AlreadyExists { .. })
        ));

        let reopened = Database::open(dir.path(), "shop").unwrap();
        assert_eq!(reopened.get_procedure("restock").unwrap(), proc);
        assert_eq!(reopened.procedures(), vec!["restock".to_string()]);

        reopened.drop_procedure("restock").unwrap();
        assert!(reopened.get_procedure("restock").is_err());
    }

    #[test]
    fn test_sorted_table_names() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(dir.path(), "shop").unwrap();

        db.create_table("zebra", schema(), false, false, b"").unwrap();
        db.create_table("apple", schema(), false, false, b"").unwrap();

        assert_eq!(db.tables(), vec!["apple".to_string(), "zebra".to_string()]);
    }
}
