use tracing::{debug, info, instrument, warn};

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::instruction::{ProcessInstruction, ProcessInstructionSet};
use crate::scorpion::etl::once::SetOnce;
use crate::scorpion::etl::registry::TableRegistry;
use crate::scorpion::etl::transformer::{TransformerIo, TransformerRegistry};

/// Runs the declared process instructions against a table registry.
///
/// The instruction set and the transformer registry are assigned once each.
/// A run first checks that every transformer referenced by a non-skipped
/// instruction is registered, then executes the instructions in step order.
/// Any failure aborts the whole run.
#[derive(Debug)]
pub struct ProcessManager {
    instructions: SetOnce<ProcessInstructionSet>,
    transformers: SetOnce<TransformerRegistry>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            instructions: SetOnce::new("process instructions"),
            transformers: SetOnce::new("transformers"),
        }
    }

    pub fn set_instructions(&self, instructions: ProcessInstructionSet) -> Result<()> {
        self.instructions.set(instructions)
    }

    pub fn set_transformers(&self, transformers: TransformerRegistry) -> Result<()> {
        self.transformers.set(transformers)
    }

    pub fn instructions(&self) -> Result<&ProcessInstructionSet> {
        self.instructions.get()
    }

    /// Fails with the full list of referenced but unregistered transformers.
    pub fn check_readiness(&self) -> Result<()> {
        let required = self.instructions.get()?.required_transformers();
        let available = self.transformers.get()?.available();
        debug!(?required, ?available, "checking transformer availability");

        let missing: Vec<String> = required
            .difference(&available)
            .map(|key| key.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::ProcessingUnavailable { missing })
        }
    }

    /// Executes every non-skipped instruction unless `skip` is set.
    #[instrument(level = "info", skip_all, fields(skip = skip))]
    pub fn process(&self, tables: &mut TableRegistry, skip: bool) -> Result<()> {
        if skip {
            info!("data processing is skipped");
            return Ok(());
        }

        self.check_readiness()?;

        let instructions = self.instructions.get()?;
        info!(
            "these process instructions will be applied:\n{}",
            instructions.readout()
        );

        for instruction in instructions.iter() {
            if instruction.skip {
                warn!(step = instruction.step, "instruction is skipped");
                continue;
            }
            self.execute(instruction, tables)?;
        }
        Ok(())
    }

    #[instrument(
        level = "info",
        skip_all,
        fields(step = instruction.step, transformer = %instruction.uses_data_processor)
    )]
    fn execute(&self, instruction: &ProcessInstruction, tables: &mut TableRegistry) -> Result<()> {
        let factory = self
            .transformers
            .get()?
            .get(&instruction.uses_data_processor)?;
        let mut transformer = factory.build();

        let inputs = tables.get_multiple(&instruction.uses_data_frames_for_input)?;
        let mut io = TransformerIo::new(factory.key());
        io.set_inputs(instruction.uses_data_frames_for_input.clone(), inputs)?;
        io.set_expected_outputs(instruction.expected_output_data_frames.clone())?;

        transformer.process(&mut io)?;

        let outputs = io.into_output()?;
        let produced: Vec<&str> = outputs.keys().map(String::as_str).collect();
        info!(outputs = ?produced, "step finished");
        tables.set_multiple(outputs)
    }
}
