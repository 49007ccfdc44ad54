use std::collections::{BTreeSet, HashSet};

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::Table as ReadoutTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::model::TableKey;

/// One declared step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessInstruction {
    /// Key of the transformer to run.
    pub uses_data_processor: String,
    /// Position in the total order; unique within a set.
    pub step: i64,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uses_data_frames_for_input: Vec<TableKey>,
    #[serde(default)]
    pub expected_output_data_frames: Vec<TableKey>,
}

/// Validated instructions, sorted by ascending step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessInstructionSet {
    instructions: Vec<ProcessInstruction>,
}

impl ProcessInstructionSet {
    /// Validates raw instruction records and sorts them by step.
    ///
    /// Every `step` must be an integer and unique; the first offending record
    /// is named in the error. An empty slice yields an empty set.
    pub fn from_records(records: &[Value]) -> Result<Self> {
        if records.is_empty() {
            return Ok(Self::default());
        }

        check_steps(records)?;

        let mut instructions = records
            .iter()
            .map(|record| {
                serde_json::from_value::<ProcessInstruction>(record.clone()).map_err(|err| {
                    EtlError::InvalidInstruction {
                        record: record.to_string(),
                        message: err.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        instructions.sort_by_key(|instruction| instruction.step);
        Ok(Self { instructions })
    }

    /// Builds a set from already typed instructions, applying the same step
    /// checks as [`from_records`](Self::from_records).
    pub fn new(instructions: Vec<ProcessInstruction>) -> Result<Self> {
        let records = instructions
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        check_steps(&records)?;

        let mut instructions = instructions;
        instructions.sort_by_key(|instruction| instruction.step);
        Ok(Self { instructions })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// All instructions in step order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessInstruction> {
        self.instructions.iter()
    }

    /// Instructions that will run, in step order.
    pub fn not_skipped(&self) -> impl Iterator<Item = &ProcessInstruction> {
        self.instructions
            .iter()
            .filter(|instruction| !instruction.skip)
    }

    /// Transformer keys referenced by instructions that will run.
    pub fn required_transformers(&self) -> BTreeSet<&str> {
        self.not_skipped()
            .map(|instruction| instruction.uses_data_processor.as_str())
            .collect()
    }

    /// Renders the instructions as a text table for operators.
    pub fn readout(&self) -> String {
        let mut table = ReadoutTable::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_header(vec![
                "step",
                "skip",
                "description",
                "uses_data_processor",
                "uses_data_frames_for_input",
                "expected_output_data_frames",
            ]);

        for instruction in &self.instructions {
            table.add_row(vec![
                instruction.step.to_string(),
                instruction.skip.to_string(),
                instruction.description.clone(),
                instruction.uses_data_processor.clone(),
                instruction.uses_data_frames_for_input.join(", "),
                instruction.expected_output_data_frames.join(", "),
            ]);
        }

        table.to_string()
    }
}

fn check_steps(records: &[Value]) -> Result<()> {
    let mut steps = HashSet::new();
    for record in records {
        let step = match record.get("step") {
            Some(Value::Number(number)) => number.as_i64(),
            _ => None,
        };
        let Some(step) = step else {
            return Err(EtlError::InvalidInstruction {
                record: record.to_string(),
                message: format!(
                    "step must be an integer, got {}",
                    record.get("step").unwrap_or(&Value::Null)
                ),
            });
        };
        if !steps.insert(step) {
            return Err(EtlError::InvalidInstruction {
                record: record.to_string(),
                message: format!("step {step} is not unique"),
            });
        }
    }
    Ok(())
}
