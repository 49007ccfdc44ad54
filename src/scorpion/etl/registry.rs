use std::collections::BTreeMap;

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::model::{Table, TableKey};

const KIND: &str = "table";

/// Shared store of named tables threading a pipeline run.
///
/// Keys are write-once and reads must hit: overwriting a key or reading an
/// absent one is an error, never a silent replace or a default.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: BTreeMap<TableKey, Table>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `table` under `key`, refusing to overwrite.
    pub fn set(&mut self, key: impl Into<TableKey>, table: Table) -> Result<()> {
        let key = key.into();
        if self.tables.contains_key(&key) {
            return Err(EtlError::DuplicateKey { kind: KIND, key });
        }
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&Table> {
        self.tables.get(key).ok_or_else(|| EtlError::MissingKey {
            kind: KIND,
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tables.contains_key(key)
    }

    /// Returns clones of the requested tables, failing on the first absent key.
    pub fn get_multiple(&self, keys: &[TableKey]) -> Result<BTreeMap<TableKey, Table>> {
        keys.iter()
            .map(|key| Ok((key.clone(), self.get(key)?.clone())))
            .collect()
    }

    /// Applies [`set`](Self::set) per entry. Entries inserted before a failing
    /// key stay in place.
    pub fn set_multiple(&mut self, tables: BTreeMap<TableKey, Table>) -> Result<()> {
        for (key, table) in tables {
            self.set(key, table)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables.iter().map(|(key, table)| (key.as_str(), table))
    }
}
