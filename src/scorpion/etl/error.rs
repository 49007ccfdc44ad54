use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Error type covering configuration, registry, and execution failures of a
/// pipeline run. None of these are recovered locally: every variant aborts
/// the run and names the source, step, or key that caused it.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a YAML document cannot be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Errors bubbled up from the CSV reader or writer.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a source override layer lacks required config items.
    #[error(
        "source \"{source_name}\" does not contain all required config items; \
         present: [{}]; required: [{}]; missing: [{}]",
        .present.join(", "),
        .required.join(", "),
        .missing.join(", ")
    )]
    SourceConfiguration {
        source_name: String,
        present: Vec<String>,
        required: Vec<String>,
        missing: Vec<String>,
    },

    /// Raised when a process instruction record fails validation.
    #[error("invalid process instruction {record}: {message}")]
    InvalidInstruction { record: String, message: String },

    /// Raised when two transformer factories share a key.
    #[error("transformer key \"{key}\" is not unique; known keys: [{}]", .known.join(", "))]
    DuplicateTransformerKey { key: String, known: Vec<String> },

    /// Raised when a transformer factory is declared without a key.
    #[error("transformer factory must declare a non-empty key")]
    MissingTransformerKey,

    /// Raised when a source, output, or config document names a format the
    /// crate cannot handle.
    #[error("{context} does not support format \"{format}\"")]
    UnsupportedFormat { context: String, format: String },

    /// Raised when a CSV source declares an encoding we cannot decode.
    #[error("source \"{source_name}\" declares unsupported encoding \"{encoding}\"")]
    UnsupportedEncoding {
        source_name: String,
        encoding: String,
    },

    /// Catch-all for malformed declarative input.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when a read-must-exist lookup fails.
    #[error("{kind} \"{key}\" is not found")]
    MissingKey { kind: &'static str, key: String },

    /// Raised when a write-once collection already holds the key.
    #[error("{kind} \"{key}\" is already set and cannot be reset")]
    DuplicateKey { kind: &'static str, key: String },

    /// Raised when a set-once cell is assigned twice.
    #[error("\"{name}\" can only be set once")]
    AlreadySet { name: &'static str },

    /// Raised when a set-once cell is read before assignment.
    #[error("\"{name}\" has not been set")]
    NotSet { name: &'static str },

    /// Raised when instructions reference transformers nobody registered.
    #[error("transformers not available: {}", .missing.join(", "))]
    ProcessingUnavailable { missing: Vec<String> },

    /// Raised at harvest time when a transformer skipped a declared output.
    #[error(
        "transformer \"{transformer}\" did not produce all expected outputs; \
         expected: [{}]; produced: [{}]",
        .expected.join(", "),
        .actual.join(", ")
    )]
    MissingOutput {
        transformer: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Domain failure reported by a transformer's own processing.
    #[error("transformer \"{key}\" failed: {message}")]
    Transformer { key: String, message: String },

    /// Raised when an output table refers to a data frame that was never
    /// produced.
    #[error(
        "output table \"{table}\" requires data frame \"{data_frame}\", \
         which is not available"
    )]
    OutputNotReady { table: String, data_frame: String },

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
