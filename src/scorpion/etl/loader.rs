use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::scorpion::etl::config::SourcesConfig;
use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::io::csv_read::{self, CsvReadOptions};
use crate::scorpion::etl::io::excel_read;
use crate::scorpion::etl::model::Table;
use crate::scorpion::etl::registry::TableRegistry;
use crate::scorpion::etl::source::OptionMap;

/// File formats a source can be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Excel,
}

impl SourceFormat {
    pub const SUPPORTED: &'static [&'static str] = &["csv", "excel"];

    fn parse(source_name: &str, value: Option<&Value>) -> Result<Self> {
        match value.and_then(Value::as_str) {
            Some("csv") => Ok(SourceFormat::Csv),
            Some("excel") => Ok(SourceFormat::Excel),
            Some(other) => Err(EtlError::UnsupportedFormat {
                context: format!("source \"{source_name}\""),
                format: other.to_string(),
            }),
            None => Err(EtlError::InvalidConfig(format!(
                "source \"{source_name}\" does not declare a format; supported: {}",
                Self::SUPPORTED.join(", ")
            ))),
        }
    }

    /// Options that only make sense for the other format.
    fn foreign_options(self) -> &'static [&'static str] {
        match self {
            SourceFormat::Csv => &["sheet_name"],
            SourceFormat::Excel => &["encoding", "delimiter"],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLoadOptions {
    file_name: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    delimiter: Option<String>,
    #[serde(default)]
    sheet_name: Option<String>,
    #[serde(default)]
    nrows: Option<usize>,
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    fillna: Option<String>,
    #[serde(default)]
    skip: bool,
}

/// Typed load parameters of one source, built from its resolved options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub source_name: String,
    pub format: SourceFormat,
    pub file_name: PathBuf,
    pub encoding: Option<String>,
    pub delimiter: Option<u8>,
    pub sheet_name: Option<String>,
    pub nrows: Option<usize>,
    pub columns: Option<Vec<String>>,
    pub fillna: Option<String>,
    pub skip: bool,
}

impl LoadOptions {
    /// Checks the format, drops options belonging to the other format, and
    /// rejects any option name the loader does not understand.
    pub fn from_resolved(source_name: &str, resolved: &OptionMap) -> Result<Self> {
        let format = SourceFormat::parse(source_name, resolved.get("format"))?;

        let mut filtered = resolved.clone();
        filtered.remove("format");
        for key in format.foreign_options() {
            filtered.remove(*key);
        }

        let raw: RawLoadOptions =
            serde_json::from_value(Value::Object(filtered)).map_err(|err| {
                EtlError::InvalidConfig(format!("source \"{source_name}\": {err}"))
            })?;

        let delimiter = raw
            .delimiter
            .as_deref()
            .map(|delimiter| parse_delimiter(source_name, delimiter))
            .transpose()?;

        Ok(Self {
            source_name: source_name.to_string(),
            format,
            file_name: PathBuf::from(raw.file_name),
            encoding: raw.encoding,
            delimiter,
            sheet_name: raw.sheet_name,
            nrows: raw.nrows,
            columns: raw.columns,
            fillna: raw.fillna,
            skip: raw.skip,
        })
    }
}

fn parse_delimiter(source_name: &str, delimiter: &str) -> Result<u8> {
    match delimiter.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(EtlError::InvalidConfig(format!(
            "source \"{source_name}\" delimiter must be a single ASCII character, got \"{delimiter}\""
        ))),
    }
}

/// Loads source files into tables.
#[derive(Debug, Clone)]
pub struct SourceFileLoader {
    folder: PathBuf,
}

impl SourceFileLoader {
    /// `folder` is prefixed to every relative `file_name`.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn path_for(&self, options: &LoadOptions) -> PathBuf {
        self.folder.join(&options.file_name)
    }

    /// Reads the file described by `options`, then applies the column
    /// subset and the empty-cell replacement.
    #[instrument(level = "debug", skip_all, fields(source = %options.source_name))]
    pub fn load(&self, options: &LoadOptions) -> Result<Table> {
        let path = self.path_for(options);
        if !path.exists() {
            return Err(EtlError::MissingInput(path));
        }

        let table = match options.format {
            SourceFormat::Csv => {
                let defaults = CsvReadOptions::default();
                let csv_options = CsvReadOptions {
                    encoding: options.encoding.clone().unwrap_or(defaults.encoding),
                    delimiter: options.delimiter.unwrap_or(defaults.delimiter),
                    nrows: options.nrows,
                };
                csv_read::read_table(&options.source_name, &path, &csv_options)?
            }
            SourceFormat::Excel => {
                excel_read::read_table(&path, options.sheet_name.as_deref(), options.nrows)?
            }
        };
        debug!(path = %path.display(), rows = table.len(), "source file read");

        finish(table, options)
    }
}

/// Turns the `sources` section into registry tables.
#[derive(Debug)]
pub struct SourceManager<'a> {
    config: &'a SourcesConfig,
    loader: SourceFileLoader,
}

impl<'a> SourceManager<'a> {
    /// Source files are looked up below `base_dir` joined with the
    /// configured folder.
    pub fn new(config: &'a SourcesConfig, base_dir: &Path) -> Self {
        Self {
            config,
            loader: SourceFileLoader::new(base_dir.join(&config.folder)),
        }
    }

    /// Resolves every source without touching the filesystem.
    pub fn load_options(&self) -> Result<Vec<LoadOptions>> {
        self.config
            .source_configs()
            .map(|source| {
                let resolved = source.resolve()?;
                debug!(source = source.source_name(), ?resolved, "source configuration resolved");
                LoadOptions::from_resolved(source.source_name(), &resolved)
            })
            .collect()
    }

    /// Loads every non-skipped source into `tables` under its source name.
    /// All configurations are resolved before the first file is read.
    #[instrument(level = "info", skip_all, fields(sources = self.config.data.len()))]
    pub fn prepare_sources(&self, tables: &mut TableRegistry) -> Result<()> {
        for options in self.load_options()? {
            if options.skip {
                warn!(source = %options.source_name, "source is skipped");
                continue;
            }
            let table = self.loader.load(&options)?;
            info!(
                source = %options.source_name,
                rows = table.len(),
                columns = table.columns.len(),
                "source loaded"
            );
            tables.set(options.source_name, table)?;
        }
        Ok(())
    }
}

fn finish(table: Table, options: &LoadOptions) -> Result<Table> {
    let table = match &options.columns {
        Some(columns) => table.select_columns(columns)?,
        None => table,
    };
    Ok(match &options.fillna {
        Some(value) => table.fill_empty(value),
        None => table,
    })
}
