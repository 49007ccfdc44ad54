use std::path::Path;

use tracing::{info, instrument};

use crate::scorpion::etl::builtin;
use crate::scorpion::etl::config::PipelineConfig;
use crate::scorpion::etl::error::Result;
use crate::scorpion::etl::instruction::ProcessInstructionSet;
use crate::scorpion::etl::loader::SourceManager;
use crate::scorpion::etl::manager::ProcessManager;
use crate::scorpion::etl::output::OutputWriter;
use crate::scorpion::etl::registry::TableRegistry;
use crate::scorpion::etl::transformer::{TransformerFactory, TransformerRegistry};

/// Switches for the stages that can be bypassed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub skip_processing: bool,
    pub skip_output: bool,
}

/// Registers the built-in transformers listed under `data_processors`.
pub fn builtin_transformers(config: &PipelineConfig) -> Result<TransformerRegistry> {
    TransformerRegistry::new(builtin::factories(&config.data_processors)?)
}

fn prepare(
    config: &PipelineConfig,
    extra: Vec<TransformerFactory>,
) -> Result<(ProcessManager, Option<OutputWriter>)> {
    let mut factories = builtin::factories(&config.data_processors)?;
    factories.extend(extra);

    let manager = ProcessManager::new();
    manager.set_instructions(ProcessInstructionSet::from_records(
        &config.process_instructions,
    )?)?;
    manager.set_transformers(TransformerRegistry::new(factories)?)?;

    let writer = match &config.output {
        Some(output) => {
            let writer = OutputWriter::new(config.global.date_format.clone());
            writer.set_config(output.clone())?;
            Some(writer)
        }
        None => None,
    };
    Ok((manager, writer))
}

/// Checks everything that can be checked without reading or writing files:
/// source layering and load options, instruction validity, transformer
/// registration, and transformer availability.
#[instrument(level = "info", skip_all)]
pub fn validate(config: &PipelineConfig, base_dir: &Path) -> Result<()> {
    let sources = SourceManager::new(&config.sources, base_dir).load_options()?;
    let (manager, _) = prepare(config, Vec::new())?;
    manager.check_readiness()?;
    info!(
        sources = sources.len(),
        instructions = manager.instructions()?.len(),
        "configuration is valid"
    );
    Ok(())
}

/// Runs the pipeline with the built-in transformers only.
pub fn run(config: &PipelineConfig, base_dir: &Path, options: RunOptions) -> Result<TableRegistry> {
    run_with(config, base_dir, options, Vec::new())
}

/// Loads sources, applies the process instructions, and writes the output.
/// `extra` factories are registered next to the built-ins named in the
/// config; a key clash between the two is an error.
#[instrument(level = "info", skip_all, fields(base_dir = %base_dir.display()))]
pub fn run_with(
    config: &PipelineConfig,
    base_dir: &Path,
    options: RunOptions,
    extra: Vec<TransformerFactory>,
) -> Result<TableRegistry> {
    let (manager, writer) = prepare(config, extra)?;

    let mut tables = TableRegistry::new();
    SourceManager::new(&config.sources, base_dir).prepare_sources(&mut tables)?;
    info!(tables = tables.len(), "sources prepared");

    manager.process(&mut tables, options.skip_processing)?;

    match &writer {
        Some(writer) => {
            writer.write(&tables, base_dir, options.skip_output)?;
        }
        None => info!("no output configured"),
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorpion::etl::config::{parse, ConfigFormat};
    use crate::scorpion::etl::error::EtlError;

    #[test]
    fn validate_reports_unregistered_transformers() {
        let config = parse(
            r#"{
                "data_processors": ["copy"],
                "process_instructions": [
                    {"step": 1, "uses_data_processor": "pivot"}
                ]
            }"#,
            ConfigFormat::Json,
        )
        .unwrap();
        let err = validate(&config, Path::new(".")).unwrap_err();
        assert!(matches!(err, EtlError::ProcessingUnavailable { ref missing } if missing == &["pivot".to_string()]));
    }

    #[test]
    fn unknown_builtin_is_rejected() {
        let config = parse(r#"{"data_processors": ["pivot"]}"#, ConfigFormat::Json).unwrap();
        assert!(matches!(
            builtin_transformers(&config),
            Err(EtlError::MissingKey { kind: "built-in transformer", .. })
        ));
    }

    #[test]
    fn duplicated_data_processor_is_rejected() {
        let config = parse(r#"{"data_processors": ["copy", "copy"]}"#, ConfigFormat::Json).unwrap();
        assert!(matches!(
            validate(&config, Path::new(".")),
            Err(EtlError::DuplicateTransformerKey { .. })
        ));
    }

    #[test]
    fn empty_document_runs_to_an_empty_registry() {
        let config = PipelineConfig::default();
        let tables = run(&config, Path::new("."), RunOptions::default()).unwrap();
        assert!(tables.is_empty());
    }
}
