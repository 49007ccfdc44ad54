use std::collections::HashSet;
use std::path::Path;

use rust_xlsxwriter::{ColNum, RowNum, Workbook, Worksheet};

use crate::scorpion::etl::error::Result;
use crate::scorpion::etl::model::Table;

/// Writes each `(sheet_name, table)` pair as its own sheet of one workbook.
///
/// The header row is frozen and filterable. Sheets whose headers are
/// non-empty and unique become excel tables; others get a plain autofilter,
/// because excel tables refuse blank and repeated column names.
pub fn write_workbook(path: &Path, sheets: &[(&str, Table)]) -> Result<()> {
    let mut workbook = Workbook::new();

    for (sheet_name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*sheet_name)?;
        write_cells(worksheet, table)?;

        if table.columns.is_empty() {
            continue;
        }
        worksheet.set_freeze_panes(1, 0)?;

        let last_row = table.rows.len() as RowNum;
        let last_col = (table.columns.len() - 1) as ColNum;
        if table.rows.is_empty() || !has_table_headers(table) {
            worksheet.autofilter(0, 0, last_row, last_col)?;
        } else {
            let mut excel_table = rust_xlsxwriter::Table::new();
            excel_table.set_autofilter(true);
            worksheet.add_table(0, 0, last_row, last_col, &excel_table)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn write_cells(worksheet: &mut Worksheet, table: &Table) -> Result<()> {
    for (col, header) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col as ColNum, header)?;
    }
    for (row, cells) in table.rows.iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            if !cell.is_empty() {
                worksheet.write_string((row + 1) as RowNum, col as ColNum, cell)?;
            }
        }
    }
    Ok(())
}

/// Excel compares table column names case-insensitively.
fn has_table_headers(table: &Table) -> bool {
    let mut seen = HashSet::new();
    table
        .columns
        .iter()
        .all(|column| !column.trim().is_empty() && seen.insert(column.to_lowercase()))
}
