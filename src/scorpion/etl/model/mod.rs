use serde::{Deserialize, Serialize};

use crate::scorpion::etl::error::{EtlError, Result};

/// Key under which a table is stored in the registry.
pub type TableKey = String;

/// A rectangular table of string cells as read from a CSV file or a sheet.
///
/// The pipeline treats tables as opaque values; interpretation of the cells
/// is left to the transformers that consume them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Header row.
    pub columns: Vec<String>,
    /// Data rows. Rows may be shorter than the header; missing cells read as
    /// empty strings.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a table from a header and its rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| EtlError::MissingKey {
                kind: "column",
                key: name.to_string(),
            })
    }

    /// Returns the cell at `row`/`column`, or an empty string when the row is
    /// shorter than the header.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Projects the table onto `names`, in the order given.
    pub fn select_columns(&self, names: &[String]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>>>()?;

        let rows = (0..self.rows.len())
            .map(|row| {
                indices
                    .iter()
                    .map(|&column| self.cell(row, column).to_string())
                    .collect()
            })
            .collect();

        Ok(Table::new(names.to_vec(), rows))
    }

    /// Keeps only the first `limit` rows.
    pub fn head(mut self, limit: usize) -> Table {
        self.rows.truncate(limit);
        self
    }

    /// Replaces every blank cell with `value`, padding short rows first.
    pub fn fill_empty(mut self, value: &str) -> Table {
        let width = self.columns.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
            for cell in row.iter_mut() {
                if cell.trim().is_empty() {
                    *cell = value.to_string();
                }
            }
        }
        self
    }
}
