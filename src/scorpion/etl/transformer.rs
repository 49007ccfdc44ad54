use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::model::{Table, TableKey};
use crate::scorpion::etl::once::SetOnce;

/// A unit of computation that consumes named tables and produces named
/// tables.
///
/// Implementations read their inputs from and write their outputs to the
/// [`TransformerIo`] handed to [`process`](Transformer::process). Errors are
/// returned to the caller unchanged.
pub trait Transformer {
    fn process(&mut self, io: &mut TransformerIo) -> Result<()>;
}

/// Per-run input and output state of one transformer invocation.
#[derive(Debug)]
pub struct TransformerIo {
    key: String,
    input_keys: SetOnce<Vec<TableKey>>,
    inputs: SetOnce<BTreeMap<TableKey, Table>>,
    expected_outputs: SetOnce<Vec<TableKey>>,
    outputs: BTreeMap<TableKey, Table>,
}

impl TransformerIo {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            input_keys: SetOnce::new("input data frame keys"),
            inputs: SetOnce::new("input data frames"),
            expected_outputs: SetOnce::new("expected output data frames"),
            outputs: BTreeMap::new(),
        }
    }

    /// Key of the transformer this state belongs to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Assigns the input tables together with the order the instruction
    /// declared them in.
    pub fn set_inputs(
        &mut self,
        keys: Vec<TableKey>,
        inputs: BTreeMap<TableKey, Table>,
    ) -> Result<()> {
        self.input_keys.set(keys)?;
        self.inputs.set(inputs)
    }

    pub fn set_expected_outputs(&mut self, keys: Vec<TableKey>) -> Result<()> {
        self.expected_outputs.set(keys)
    }

    /// Returns the input table stored under `key`.
    pub fn input(&self, key: &str) -> Result<&Table> {
        self.inputs.get()?.get(key).ok_or_else(|| EtlError::Transformer {
            key: self.key.clone(),
            message: format!("input data frame \"{key}\" is not available"),
        })
    }

    /// Input tables in declaration order.
    pub fn ordered_inputs(&self) -> Result<Vec<(&str, &Table)>> {
        self.input_keys
            .get()?
            .iter()
            .map(|key| Ok((key.as_str(), self.input(key)?)))
            .collect()
    }

    pub fn expected_outputs(&self) -> Result<&[TableKey]> {
        Ok(self.expected_outputs.get()?.as_slice())
    }

    /// Adds one output table; each key may be written once per run.
    pub fn add_output(&mut self, key: impl Into<TableKey>, table: Table) -> Result<()> {
        let key = key.into();
        if self.outputs.contains_key(&key) {
            return Err(EtlError::DuplicateKey {
                kind: "transformer output",
                key,
            });
        }
        self.outputs.insert(key, table);
        Ok(())
    }

    /// Harvests the outputs, failing if any declared key was not produced.
    pub fn into_output(self) -> Result<BTreeMap<TableKey, Table>> {
        let expected = self.expected_outputs.into_inner()?;
        let missing = expected
            .iter()
            .any(|key| !self.outputs.contains_key(key));
        if missing {
            return Err(EtlError::MissingOutput {
                transformer: self.key,
                expected,
                actual: self.outputs.into_keys().collect(),
            });
        }
        Ok(self.outputs)
    }
}

type Builder = Box<dyn Fn() -> Box<dyn Transformer>>;

/// Named constructor of fresh transformer instances.
pub struct TransformerFactory {
    key: String,
    build: Builder,
}

impl TransformerFactory {
    /// Fails when `key` is empty.
    pub fn new<F, T>(key: impl Into<String>, build: F) -> Result<Self>
    where
        F: Fn() -> T + 'static,
        T: Transformer + 'static,
    {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(EtlError::MissingTransformerKey);
        }
        Ok(Self {
            key,
            build: Box::new(move || Box::new(build()) as Box<dyn Transformer>),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn build(&self) -> Box<dyn Transformer> {
        (self.build)()
    }
}

impl fmt::Debug for TransformerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerFactory")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Transformer factories by key; keys are unique.
#[derive(Debug, Default)]
pub struct TransformerRegistry {
    factories: BTreeMap<String, TransformerFactory>,
}

impl TransformerRegistry {
    /// Fails on the first factory whose key was already seen.
    pub fn new(factories: Vec<TransformerFactory>) -> Result<Self> {
        let mut registry = BTreeMap::new();
        for factory in factories {
            if registry.contains_key(factory.key()) {
                return Err(EtlError::DuplicateTransformerKey {
                    key: factory.key().to_string(),
                    known: registry.keys().cloned().collect(),
                });
            }
            registry.insert(factory.key().to_string(), factory);
        }
        Ok(Self {
            factories: registry,
        })
    }

    pub fn get(&self, key: &str) -> Result<&TransformerFactory> {
        self.factories.get(key).ok_or_else(|| EtlError::MissingKey {
            kind: "transformer",
            key: key.to_string(),
        })
    }

    pub fn available(&self) -> BTreeSet<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Transformer for Noop {
        fn process(&mut self, _io: &mut TransformerIo) -> Result<()> {
            Ok(())
        }
    }

    fn table() -> Table {
        Table::new(vec!["a".into()], vec![vec!["1".into()]])
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = TransformerFactory::new("  ", || Noop).unwrap_err();
        assert!(matches!(err, EtlError::MissingTransformerKey));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = TransformerRegistry::new(vec![
            TransformerFactory::new("a", || Noop).unwrap(),
            TransformerFactory::new("b", || Noop).unwrap(),
            TransformerFactory::new("a", || Noop).unwrap(),
        ])
        .unwrap_err();
        match err {
            EtlError::DuplicateTransformerKey { key, known } => {
                assert_eq!(key, "a");
                assert_eq!(known, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn empty_registry_is_valid() {
        let registry = TransformerRegistry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.get("copy").is_err());
    }

    #[test]
    fn inputs_can_only_be_assigned_once() {
        let mut io = TransformerIo::new("t");
        io.set_inputs(Vec::new(), BTreeMap::new()).unwrap();
        assert!(matches!(
            io.set_inputs(Vec::new(), BTreeMap::new()),
            Err(EtlError::AlreadySet { .. })
        ));
    }

    #[test]
    fn output_key_cannot_be_written_twice() {
        let mut io = TransformerIo::new("t");
        io.add_output("b", table()).unwrap();
        let err = io.add_output("b", table()).unwrap_err();
        assert!(matches!(err, EtlError::DuplicateKey { ref key, .. } if key == "b"));
    }

    #[test]
    fn harvest_lists_declared_and_actual_keys() {
        let mut io = TransformerIo::new("t");
        io.set_expected_outputs(vec!["b".into(), "c".into()]).unwrap();
        io.add_output("b", table()).unwrap();
        match io.into_output().unwrap_err() {
            EtlError::MissingOutput {
                transformer,
                expected,
                actual,
            } => {
                assert_eq!(transformer, "t");
                assert_eq!(expected, vec!["b".to_string(), "c".to_string()]);
                assert_eq!(actual, vec!["b".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_input_names_the_transformer() {
        let mut io = TransformerIo::new("t");
        io.set_inputs(Vec::new(), BTreeMap::new()).unwrap();
        let err = io.input("x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "transformer \"t\" failed: input data frame \"x\" is not available"
        );
    }
}
