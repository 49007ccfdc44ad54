use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};

use crate::scorpion::etl::error::{EtlError, Result};
use crate::scorpion::etl::model::Table;

/// Reads one sheet of an xlsx workbook into a [`Table`], using the first row
/// as the header. Without `sheet_name` the first sheet of the workbook is
/// read. Blank rows between data rows are kept as rows of empty cells and
/// count towards `nrows`; blank rows after the last data row are dropped.
pub fn read_table(path: &Path, sheet_name: Option<&str>, nrows: Option<usize>) -> Result<Table> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook.sheet_names().first().cloned().ok_or_else(|| {
            EtlError::InvalidConfig(format!("workbook {} has no sheets", path.display()))
        })?,
    };

    let range = read_required_sheet(&mut workbook, &sheet)?;
    let mut rows = range.rows();

    let columns: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|cell| cell_to_string(Some(cell))).collect(),
        None => return Ok(Table::default()),
    };

    let mut rows: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(|cell| cell_to_string(Some(cell))).collect())
        .collect();
    // Formatting alone can stretch the used range below the data.
    while rows
        .last()
        .is_some_and(|row| row.iter().all(String::is_empty))
    {
        rows.pop();
    }
    if let Some(limit) = nrows {
        rows.truncate(limit);
    }

    Ok(Table::new(columns, rows))
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| EtlError::MissingKey {
            kind: "sheet",
            key: name.to_string(),
        })?;
    let range = range_result.map_err(EtlError::from)?;
    Ok(range)
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{Format, Workbook};
    use tempfile::tempdir;

    fn workbook_with_gap(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "id").expect("header");
        sheet.write_string(1, 0, "1").expect("cell");
        sheet.write_string(3, 0, "3").expect("cell");
        sheet
            .write_blank(6, 0, &Format::new().set_bold())
            .expect("formatted blank");
        workbook.save(path).expect("workbook saved");
    }

    #[test]
    fn interior_blank_rows_are_kept_and_trailing_ones_dropped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("gap.xlsx");
        workbook_with_gap(&path);

        let table = read_table(&path, None, None).expect("sheet read");
        assert_eq!(
            table.rows,
            vec![vec!["1".to_string()], vec![String::new()], vec!["3".to_string()]]
        );
    }

    #[test]
    fn nrows_counts_blank_rows() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("gap.xlsx");
        workbook_with_gap(&path);

        let table = read_table(&path, None, Some(2)).expect("sheet read");
        assert_eq!(table.rows, vec![vec!["1".to_string()], vec![String::new()]]);
    }

    #[test]
    fn unknown_sheet_is_missing() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("gap.xlsx");
        workbook_with_gap(&path);

        let err = read_table(&path, Some("Nope"), None).unwrap_err();
        assert!(matches!(err, EtlError::MissingKey { kind: "sheet", ref key } if key == "Nope"));
    }
}
