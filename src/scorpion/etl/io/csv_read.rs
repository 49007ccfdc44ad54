use std::path::Path;

use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::model::Table;

/// Parameters of a delimited text source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReadOptions {
    /// Encoding label such as `utf-8`, `utf-8-sig`, `latin-1`, or `windows-1252`.
    pub encoding: String,
    pub delimiter: u8,
    pub nrows: Option<usize>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            delimiter: b',',
            nrows: None,
        }
    }
}

/// Reads a delimited file with a header row into a [`Table`].
pub fn read_table(source_name: &str, path: &Path, options: &CsvReadOptions) -> Result<Table> {
    let bytes = std::fs::read(path)?;
    let text = decode(source_name, &bytes, &options.encoding)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

    let limit = options.nrows.unwrap_or(usize::MAX);
    let mut rows = Vec::new();
    for record in reader.records() {
        if rows.len() >= limit {
            break;
        }
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table::new(columns, rows))
}

/// Resolves an encoding label and decodes `bytes`, dropping a leading BOM.
pub fn decode(source_name: &str, bytes: &[u8], label: &str) -> Result<String> {
    let normalized = label.trim().to_ascii_lowercase();
    let encoding = match normalized.as_str() {
        "utf-8-sig" | "utf_8_sig" | "utf8" | "utf_8" => UTF_8,
        // WHATWG maps every latin-1 label onto windows-1252.
        "latin-1" | "latin_1" | "iso_8859_1" | "iso8859_1" | "cp1252" => WINDOWS_1252,
        other => Encoding::for_label(other.as_bytes()).ok_or_else(|| {
            EtlError::UnsupportedEncoding {
                source_name: source_name.to_string(),
                encoding: label.to_string(),
            }
        })?,
    };

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(EtlError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("source \"{source_name}\" is not valid {}", encoding.name()),
        )));
    }
    Ok(text.into_owned())
}

fn normalize_header(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_latin1() {
        let text = decode("s", &[0x63, 0x61, 0x66, 0xe9], "latin-1").unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn accepts_underscore_spellings() {
        for label in ["latin_1", "iso_8859_1", "iso-8859-1", "latin1", "Latin-1"] {
            let text = decode("s", b"caf\xe9", label).unwrap();
            assert_eq!(text, "caf\u{e9}", "label {label}");
        }
        assert_eq!(decode("s", b"id", "utf_8").unwrap(), "id");
    }

    #[test]
    fn strips_utf8_bom() {
        let text = decode("s", b"\xef\xbb\xbfid,name", "utf-8-sig").unwrap();
        assert_eq!(text, "id,name");
    }

    #[test]
    fn rejects_unknown_label() {
        let err = decode("books", b"x", "klingon").unwrap_err();
        assert!(matches!(err, EtlError::UnsupportedEncoding { ref encoding, .. } if encoding == "klingon"));
    }

    #[test]
    fn rejects_malformed_utf8() {
        assert!(decode("s", &[0xff, 0xfe, 0xfd], "utf-8").is_err());
    }
}
