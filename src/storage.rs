use crate::constants::STORAGE_STAGE;
use crate::error::{ImputationError, Result};
use crate::table::Table;
use crate::types::Record;
use crate::util::{parse_cell, render_cell};
use csv::ReaderBuilder;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot store the stages read from and write to.
pub trait TableStore {
    fn read_table(&self, key: &str) -> Result<Table>;
    fn write_table(&self, key: &str, table: &Table) -> Result<()>;
}

/// Snapshots as files under a root directory. Keys ending in `.csv` are
/// CSV with a header row, anything else is a JSON array of records.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

fn is_csv(key: &str) -> bool {
    Path::new(key)
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

fn read_csv(path: &Path) -> Result<Table> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: Record = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| (h.clone(), parse_cell(cell)))
            .collect();
        rows.push(row);
    }
    Ok(Table::new(rows))
}

fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let columns = table.columns();
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&columns)?;
    for row in table.iter() {
        wtr.write_record(
            columns
                .iter()
                .map(|c| row.get(c).map(render_cell).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(())
}

impl TableStore for FileStore {
    fn read_table(&self, key: &str) -> Result<Table> {
        let path = self.path_for(key);
        debug!(path = %path.display(), "reading snapshot");
        if is_csv(key) {
            read_csv(&path)
        } else {
            let content = fs::read_to_string(&path)?;
            Table::from_json_str(&content, STORAGE_STAGE)
        }
    }

    fn write_table(&self, key: &str, table: &Table) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), rows = table.len(), "writing snapshot");
        if is_csv(key) {
            write_csv(&path, table)
        } else {
            fs::write(&path, serde_json::to_string_pretty(table)?)?;
            Ok(())
        }
    }
}

/// In-memory snapshots, for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, key: &str, table: Table) -> Self {
        self.tables.borrow_mut().insert(key.to_string(), table);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tables.borrow().contains_key(key)
    }
}

impl TableStore for MemoryStore {
    fn read_table(&self, key: &str) -> Result<Table> {
        self.tables
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| {
                ImputationError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no snapshot named '{}'", key),
                ))
            })
    }

    fn write_table(&self, key: &str, table: &Table) -> Result<()> {
        self.tables.borrow_mut().insert(key.to_string(), table.clone());
        Ok(())
    }
}
