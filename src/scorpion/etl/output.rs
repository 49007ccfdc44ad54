use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::io::{csv_write, excel_write};
use crate::scorpion::etl::model::{Table, TableKey};
use crate::scorpion::etl::once::SetOnce;
use crate::scorpion::etl::registry::TableRegistry;

/// File formats the writer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Excel,
    Csv,
}

impl OutputFormat {
    pub const SUPPORTED: &'static [&'static str] = &["excel", "csv"];

    fn parse(value: &str) -> Result<Self> {
        match value {
            "excel" => Ok(OutputFormat::Excel),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(EtlError::UnsupportedFormat {
                context: "output".to_string(),
                format: other.to_string(),
            }),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Excel => "xlsx",
            OutputFormat::Csv => "csv",
        }
    }
}

/// One table written to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputTable {
    /// Sheet name for excel, file name part for csv.
    pub output_table_name: String,
    /// Registry key of the table to write.
    pub output_table_data_frame: TableKey,
    /// Columns to write; empty means all.
    #[serde(default)]
    pub output_table_columns: Vec<String>,
    #[serde(default)]
    pub skip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub skip: bool,
    pub target_format: String,
    pub target_folder: PathBuf,
    pub target_file_name: String,
    #[serde(default)]
    pub current_date_suffix_to_target_file_name: bool,
    #[serde(default)]
    pub output_tables: Vec<OutputTable>,
}

impl OutputConfig {
    pub fn format(&self) -> Result<OutputFormat> {
        OutputFormat::parse(&self.target_format)
    }

    /// Checks the target format and that table names are unique. For excel
    /// output the names must also be valid sheet names.
    pub fn validate(&self) -> Result<()> {
        let format = self.format()?;
        let mut names = HashSet::new();
        for table in &self.output_tables {
            if !names.insert(table.output_table_name.as_str()) {
                return Err(EtlError::DuplicateKey {
                    kind: "output table",
                    key: table.output_table_name.clone(),
                });
            }
            if format == OutputFormat::Excel {
                check_sheet_name(&table.output_table_name)?;
            }
        }
        Ok(())
    }

    fn active_tables(&self) -> impl Iterator<Item = &OutputTable> {
        self.output_tables.iter().filter(|table| !table.skip)
    }

    /// Target file name with everything from the first `.` removed.
    fn file_stem(&self) -> &str {
        match self.target_file_name.split_once('.') {
            Some((stem, _)) => stem,
            None => &self.target_file_name,
        }
    }

    /// Folder the files land in, relative to `base_dir`.
    pub fn target_folder(&self, base_dir: &Path, date: Option<&str>) -> PathBuf {
        let folder = base_dir.join(&self.target_folder);
        match date {
            Some(date) => {
                let mut name = folder.into_os_string();
                name.push(format!("__{date}"));
                PathBuf::from(name)
            }
            None => folder,
        }
    }

    /// File name for the workbook, or for the csv file of `table_name`.
    pub fn file_name(&self, table_name: Option<&str>, date: Option<&str>) -> Result<String> {
        let mut name = self.file_stem().to_string();
        if let Some(table_name) = table_name {
            name.push_str("__");
            name.push_str(table_name);
        }
        if let Some(date) = date {
            name.push_str("__");
            name.push_str(date);
        }
        Ok(format!("{name}.{}", self.format()?.extension()))
    }
}

const MAX_SHEET_NAME_CHARS: usize = 31;
const SHEET_NAME_FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

fn check_sheet_name(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("is empty".to_string())
    } else if name.chars().count() > MAX_SHEET_NAME_CHARS {
        Some(format!("is longer than {MAX_SHEET_NAME_CHARS} characters"))
    } else if name.contains(SHEET_NAME_FORBIDDEN) {
        Some("contains one of []:*?/\\".to_string())
    } else if name.starts_with('\'') || name.ends_with('\'') {
        Some("starts or ends with an apostrophe".to_string())
    } else if name.eq_ignore_ascii_case("history") {
        Some("is reserved by excel".to_string())
    } else {
        None
    };
    match problem {
        Some(problem) => Err(EtlError::InvalidConfig(format!(
            "output table name \"{name}\" {problem}, so it cannot be an excel sheet name"
        ))),
        None => Ok(()),
    }
}

/// Checks a strftime pattern so formatting it cannot fail later.
pub fn validate_date_format(date_format: &str) -> Result<()> {
    if StrftimeItems::new(date_format).any(|item| matches!(item, Item::Error)) {
        return Err(EtlError::InvalidConfig(format!(
            "date_format \"{date_format}\" is not a valid strftime pattern"
        )));
    }
    Ok(())
}

/// Today's date rendered with `date_format`.
pub fn current_date(date_format: &str) -> Result<String> {
    validate_date_format(date_format)?;
    Ok(Local::now().format(date_format).to_string())
}

/// Writes registry tables to excel or csv files.
#[derive(Debug)]
pub struct OutputWriter {
    config: SetOnce<OutputConfig>,
    date_format: String,
}

impl OutputWriter {
    pub fn new(date_format: impl Into<String>) -> Self {
        Self {
            config: SetOnce::new("output configuration"),
            date_format: date_format.into(),
        }
    }

    /// Validates and stores the configuration; can only happen once.
    pub fn set_config(&self, config: OutputConfig) -> Result<()> {
        config.validate()?;
        if config.current_date_suffix_to_target_file_name {
            validate_date_format(&self.date_format)?;
        }
        self.config.set(config)
    }

    pub fn config(&self) -> Result<&OutputConfig> {
        self.config.get()
    }

    /// Fails on the first active output table whose data frame is missing.
    pub fn check_readiness(&self, tables: &TableRegistry) -> Result<()> {
        for table in self.config.get()?.active_tables() {
            if !tables.contains(&table.output_table_data_frame) {
                return Err(EtlError::OutputNotReady {
                    table: table.output_table_name.clone(),
                    data_frame: table.output_table_data_frame.clone(),
                });
            }
        }
        Ok(())
    }

    /// Writes every active output table below `base_dir` and returns the
    /// written file paths.
    #[instrument(level = "info", skip_all, fields(base_dir = %base_dir.display(), skip = skip))]
    pub fn write(&self, tables: &TableRegistry, base_dir: &Path, skip: bool) -> Result<Vec<PathBuf>> {
        let config = self.config.get()?;
        if skip || config.skip {
            info!("production of output is skipped");
            return Ok(Vec::new());
        }
        self.check_readiness(tables)?;

        let date = if config.current_date_suffix_to_target_file_name {
            Some(current_date(&self.date_format)?)
        } else {
            None
        };
        self.write_dated(tables, base_dir, date.as_deref())
    }

    fn write_dated(
        &self,
        tables: &TableRegistry,
        base_dir: &Path,
        date: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let config = self.config.get()?;
        for table in config.output_tables.iter().filter(|table| table.skip) {
            warn!(table = %table.output_table_name, "output table is skipped");
        }

        let folder = config.target_folder(base_dir, date);

        let written = match config.format()? {
            OutputFormat::Excel => {
                let sheets = config
                    .active_tables()
                    .map(|table| Ok((table.output_table_name.as_str(), selected(tables, table)?)))
                    .collect::<Result<Vec<_>>>()?;
                fs::create_dir_all(&folder)?;
                let path = folder.join(config.file_name(None, date)?);
                excel_write::write_workbook(&path, &sheets)?;
                vec![path]
            }
            OutputFormat::Csv => {
                let files = config
                    .active_tables()
                    .map(|table| {
                        let path =
                            folder.join(config.file_name(Some(&table.output_table_name), date)?);
                        Ok((path, selected(tables, table)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                fs::create_dir_all(&folder)?;
                for (path, table) in &files {
                    csv_write::write_table(path, table)?;
                }
                files.into_iter().map(|(path, _)| path).collect()
            }
        };

        for path in &written {
            info!(path = %path.display(), "output file written");
        }
        Ok(written)
    }
}

fn selected(tables: &TableRegistry, output: &OutputTable) -> Result<Table> {
    let table = tables.get(&output.output_table_data_frame)?;
    if output.output_table_columns.is_empty() {
        Ok(table.clone())
    } else {
        table.select_columns(&output.output_table_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(format: &str, tables: Vec<OutputTable>) -> OutputConfig {
        OutputConfig {
            skip: false,
            target_format: format.into(),
            target_folder: PathBuf::from("out"),
            target_file_name: "report.xlsx".into(),
            current_date_suffix_to_target_file_name: false,
            output_tables: tables,
        }
    }

    fn output_table(name: &str, data_frame: &str) -> OutputTable {
        OutputTable {
            output_table_name: name.into(),
            output_table_data_frame: data_frame.into(),
            output_table_columns: Vec::new(),
            skip: false,
        }
    }

    fn registry() -> TableRegistry {
        let mut tables = TableRegistry::new();
        tables
            .set(
                "books",
                Table::new(
                    vec!["id".into(), "title".into()],
                    vec![vec!["1".into(), "Dune".into()]],
                ),
            )
            .unwrap();
        tables
    }

    #[test]
    fn file_names_follow_the_naming_rules() {
        let config = config("csv", Vec::new());
        assert_eq!(config.file_name(Some("books"), None).unwrap(), "report__books.csv");
        assert_eq!(
            config.file_name(Some("books"), Some("2024-01-31")).unwrap(),
            "report__books__2024-01-31.csv"
        );
        assert_eq!(
            config.target_folder(Path::new("/base"), Some("2024-01-31")),
            PathBuf::from("/base/out__2024-01-31")
        );

        let excel = OutputConfig {
            target_format: "excel".into(),
            ..config
        };
        assert_eq!(excel.file_name(None, None).unwrap(), "report.xlsx");
    }

    #[test]
    fn unsupported_format_is_rejected_on_assignment() {
        let writer = OutputWriter::new("%Y-%m-%d");
        let err = writer.set_config(config("parquet", Vec::new())).unwrap_err();
        assert_eq!(err.to_string(), "output does not support format \"parquet\"");
        assert!(writer.config().is_err());
    }

    #[test]
    fn duplicate_output_table_names_are_rejected() {
        let writer = OutputWriter::new("%Y-%m-%d");
        let err = writer
            .set_config(config(
                "csv",
                vec![output_table("a", "books"), output_table("a", "books")],
            ))
            .unwrap_err();
        assert!(matches!(err, EtlError::DuplicateKey { ref key, .. } if key == "a"));
    }

    #[test]
    fn invalid_date_format_is_rejected_when_suffix_enabled() {
        let writer = OutputWriter::new("%Q");
        let mut dated = config("csv", Vec::new());
        dated.current_date_suffix_to_target_file_name = true;
        assert!(matches!(
            writer.set_config(dated),
            Err(EtlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_data_frame_fails_before_any_folder_is_created() {
        let dir = tempdir().expect("tempdir");
        let writer = OutputWriter::new("%Y-%m-%d");
        writer
            .set_config(config("csv", vec![output_table("summary", "missing")]))
            .unwrap();

        let err = writer.write(&registry(), dir.path(), false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "output table \"summary\" requires data frame \"missing\", which is not available"
        );
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn skipped_tables_are_not_required() {
        let writer = OutputWriter::new("%Y-%m-%d");
        let mut skipped = output_table("summary", "missing");
        skipped.skip = true;
        writer
            .set_config(config("csv", vec![output_table("books", "books"), skipped]))
            .unwrap();
        writer.check_readiness(&registry()).unwrap();
    }

    #[test]
    fn csv_output_uses_semicolons_and_column_subset() {
        let dir = tempdir().expect("tempdir");
        let writer = OutputWriter::new("%Y-%m-%d");
        let mut books = output_table("books", "books");
        books.output_table_columns = vec!["title".into()];
        writer.set_config(config("csv", vec![books])).unwrap();

        let written = writer.write(&registry(), dir.path(), false).unwrap();
        assert_eq!(written, vec![dir.path().join("out").join("report__books.csv")]);
        let content = fs::read_to_string(&written[0]).expect("read csv");
        assert_eq!(content, "title\nDune\n");
    }

    #[test]
    fn global_skip_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        let writer = OutputWriter::new("%Y-%m-%d");
        writer
            .set_config(config("csv", vec![output_table("summary", "missing")]))
            .unwrap();

        let written = writer.write(&registry(), dir.path(), true).unwrap();
        assert!(written.is_empty());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn dated_output_suffixes_folder_and_file() {
        let dir = tempdir().expect("tempdir");
        let writer = OutputWriter::new("%Y%m%d");
        let mut dated = config("excel", vec![output_table("books", "books")]);
        dated.current_date_suffix_to_target_file_name = true;
        writer.set_config(dated).unwrap();

        let written = writer.write(&registry(), dir.path(), false).unwrap();
        let date = current_date("%Y%m%d").unwrap();
        assert_eq!(
            written,
            vec![dir
                .path()
                .join(format!("out__{date}"))
                .join(format!("report__{date}.xlsx"))]
        );
        assert!(written[0].exists());
    }

    #[test]
    fn missing_column_in_later_csv_table_writes_no_file() {
        let dir = tempdir().expect("tempdir");
        let writer = OutputWriter::new("%Y-%m-%d");
        let mut isbn = output_table("isbn", "books");
        isbn.output_table_columns = vec!["isbn".into()];
        writer
            .set_config(config("csv", vec![output_table("books", "books"), isbn]))
            .unwrap();

        let err = writer.write(&registry(), dir.path(), false).unwrap_err();
        assert!(matches!(err, EtlError::MissingKey { kind: "column", ref key } if key == "isbn"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn excel_sheet_names_are_checked_on_assignment() {
        for name in [
            "a name that is far too long for a sheet",
            "q1/q2",
            "[draft]",
            "'quoted'",
            "History",
            "",
        ] {
            let writer = OutputWriter::new("%Y-%m-%d");
            let err = writer
                .set_config(config("excel", vec![output_table(name, "books")]))
                .unwrap_err();
            assert!(matches!(err, EtlError::InvalidConfig(_)), "name {name:?}");
        }
    }

    #[test]
    fn csv_output_accepts_names_excel_would_refuse() {
        let writer = OutputWriter::new("%Y-%m-%d");
        writer
            .set_config(config("csv", vec![output_table("books:2024", "books")]))
            .unwrap();
    }
}
