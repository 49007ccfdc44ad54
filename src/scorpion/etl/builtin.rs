//! Transformers shipped with the crate. A pipeline enables them by listing
//! their keys under `data_processors`.

use std::collections::HashSet;

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::model::Table;
use crate::scorpion::etl::transformer::{Transformer, TransformerFactory, TransformerIo};

pub const COPY: &str = "copy";
pub const CONCAT: &str = "concat";
pub const DEDUPE: &str = "dedupe";

/// Keys of every built-in transformer.
pub const KEYS: &[&str] = &[COPY, CONCAT, DEDUPE];

/// Returns the factory of the built-in transformer named `key`.
pub fn factory(key: &str) -> Result<TransformerFactory> {
    match key {
        COPY => TransformerFactory::new(COPY, || CopyTables),
        CONCAT => TransformerFactory::new(CONCAT, || ConcatTables),
        DEDUPE => TransformerFactory::new(DEDUPE, || DedupeRows),
        other => Err(EtlError::MissingKey {
            kind: "built-in transformer",
            key: other.to_string(),
        }),
    }
}

/// Factories for `keys`, in the given order. Duplicates are passed through
/// so the registry can report them.
pub fn factories<S: AsRef<str>>(keys: &[S]) -> Result<Vec<TransformerFactory>> {
    keys.iter().map(|key| factory(key.as_ref())).collect()
}

fn paired_outputs(io: &TransformerIo) -> Result<Vec<(String, Table)>> {
    let inputs = io.ordered_inputs()?;
    let outputs = io.expected_outputs()?;
    if inputs.len() != outputs.len() {
        return Err(EtlError::Transformer {
            key: io.key().to_string(),
            message: format!(
                "expects as many outputs as inputs, got {} inputs and {} outputs",
                inputs.len(),
                outputs.len()
            ),
        });
    }
    Ok(outputs
        .iter()
        .zip(inputs)
        .map(|(output, (_, table))| (output.clone(), table.clone()))
        .collect())
}

/// Passes input `i` through as output `i`.
#[derive(Debug, Default)]
pub struct CopyTables;

impl Transformer for CopyTables {
    fn process(&mut self, io: &mut TransformerIo) -> Result<()> {
        for (key, table) in paired_outputs(io)? {
            io.add_output(key, table)?;
        }
        Ok(())
    }
}

/// Stacks every input into the single declared output. Columns are the
/// ordered union of the inputs' columns.
#[derive(Debug, Default)]
pub struct ConcatTables;

impl Transformer for ConcatTables {
    fn process(&mut self, io: &mut TransformerIo) -> Result<()> {
        let output = match io.expected_outputs()? {
            [output] => output.clone(),
            other => {
                return Err(EtlError::Transformer {
                    key: io.key().to_string(),
                    message: format!("expects exactly one output, got {}", other.len()),
                });
            }
        };

        let inputs = io.ordered_inputs()?;
        let mut columns: Vec<String> = Vec::new();
        for (_, table) in &inputs {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for (_, table) in &inputs {
            let positions: Vec<Option<usize>> = columns
                .iter()
                .map(|column| table.column_index(column).ok())
                .collect();
            for row in 0..table.len() {
                rows.push(
                    positions
                        .iter()
                        .map(|position| match position {
                            Some(index) => table.cell(row, *index).to_string(),
                            None => String::new(),
                        })
                        .collect(),
                );
            }
        }

        io.add_output(output, Table::new(columns, rows))
    }
}

/// Drops repeated rows from input `i` and emits the result as output `i`.
#[derive(Debug, Default)]
pub struct DedupeRows;

impl Transformer for DedupeRows {
    fn process(&mut self, io: &mut TransformerIo) -> Result<()> {
        for (key, table) in paired_outputs(io)? {
            let mut seen = HashSet::new();
            let rows = table
                .rows
                .into_iter()
                .filter(|row| seen.insert(row.clone()))
                .collect();
            io.add_output(key, Table::new(table.columns, rows))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn run(key: &str, inputs: Vec<(&str, Table)>, outputs: &[&str]) -> Result<BTreeMap<String, Table>> {
        let mut io = TransformerIo::new(key);
        let keys = inputs.iter().map(|(k, _)| k.to_string()).collect();
        let tables = inputs
            .into_iter()
            .map(|(k, t)| (k.to_string(), t))
            .collect();
        io.set_inputs(keys, tables)?;
        io.set_expected_outputs(outputs.iter().map(|o| o.to_string()).collect())?;
        factory(key)?.build().process(&mut io)?;
        io.into_output()
    }

    #[test]
    fn copy_pairs_inputs_with_outputs_positionally() {
        let a = table(&["x"], &[&["1"]]);
        let b = table(&["y"], &[&["2"]]);
        let out = run(COPY, vec![("b", b.clone()), ("a", a.clone())], &["b2", "a2"]).unwrap();
        assert_eq!(out["b2"], b);
        assert_eq!(out["a2"], a);
    }

    #[test]
    fn copy_rejects_mismatched_arity() {
        let err = run(COPY, vec![("a", table(&["x"], &[]))], &["b", "c"]).unwrap_err();
        assert!(matches!(err, EtlError::Transformer { ref key, .. } if key == COPY));
    }

    #[test]
    fn concat_unions_columns() {
        let first = table(&["id", "name"], &[&["1", "Ann"]]);
        let second = table(&["id", "city"], &[&["2", "Oslo"]]);
        let out = run(CONCAT, vec![("first", first), ("second", second)], &["all"]).unwrap();
        assert_eq!(
            out["all"],
            table(
                &["id", "name", "city"],
                &[&["1", "Ann", ""], &["2", "", "Oslo"]]
            )
        );
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let input = table(&["id"], &[&["1"], &["2"], &["1"]]);
        let out = run(DEDUPE, vec![("a", input)], &["b"]).unwrap();
        assert_eq!(out["b"], table(&["id"], &[&["1"], &["2"]]));
    }

    #[test]
    fn unknown_builtin_is_missing() {
        assert!(factory("pivot").is_err());
        assert_eq!(factories(KEYS).unwrap().len(), 3);
    }
}
