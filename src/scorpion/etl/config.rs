use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::output::OutputConfig;
use crate::scorpion::etl::source::{OptionMap, Priority, SourceConfig};

/// Key some documents nest the whole configuration under.
const WRAPPER_KEY: &str = "config";

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_priority() -> Priority {
    Priority::Source
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// strftime pattern for date suffixes.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
        }
    }
}

/// Declared sources and their two configuration layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    /// Folder source file names are relative to; itself relative to the
    /// config file.
    #[serde(default)]
    pub folder: PathBuf,
    /// Caller-side stance on which layer wins ties.
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub required_config_items_in_source: Vec<String>,
    #[serde(default)]
    pub defaults: OptionMap,
    #[serde(default)]
    pub data: BTreeMap<String, OptionMap>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::new(),
            priority: default_priority(),
            required_config_items_in_source: Vec::new(),
            defaults: OptionMap::new(),
            data: BTreeMap::new(),
        }
    }
}

impl SourcesConfig {
    /// Layered view of every declared source, in name order.
    pub fn source_configs(&self) -> impl Iterator<Item = SourceConfig<'_>> {
        self.data.iter().map(|(name, layer)| {
            SourceConfig::new(
                name,
                self.priority,
                &self.defaults,
                layer,
                &self.required_config_items_in_source,
            )
        })
    }
}

/// Whole pipeline document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Keys of the transformers to register.
    #[serde(default)]
    pub data_processors: Vec<String>,
    /// Raw instruction records, validated when the instruction set is built.
    #[serde(default)]
    pub process_instructions: Vec<Value>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

/// Document syntaxes accepted by [`load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Picks the syntax from the file extension.
    pub fn detect(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            other => Err(EtlError::UnsupportedFormat {
                context: format!("config file {}", path.display()),
                format: other.unwrap_or_default().to_string(),
            }),
        }
    }
}

/// Reads and parses the pipeline document at `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        return Err(EtlError::MissingInput(path.to_path_buf()));
    }
    let format = ConfigFormat::detect(path)?;
    let text = fs::read_to_string(path)?;
    let config = parse(&text, format)?;
    debug!(
        sources = config.sources.data.len(),
        instructions = config.process_instructions.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Parses a pipeline document, unwrapping a top-level `config` key.
pub fn parse(text: &str, format: ConfigFormat) -> Result<PipelineConfig> {
    let document: Value = match format {
        ConfigFormat::Json => serde_json::from_str(text)?,
        ConfigFormat::Yaml => serde_yaml::from_str(text)?,
    };
    let document = match document {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(WRAPPER_KEY) => {
            map.remove(WRAPPER_KEY).unwrap_or(Value::Null)
        }
        Value::Null => Value::Object(OptionMap::new()),
        other => other,
    };
    serde_json::from_value(document)
        .map_err(|err| EtlError::InvalidConfig(format!("pipeline document: {err}")))
}
