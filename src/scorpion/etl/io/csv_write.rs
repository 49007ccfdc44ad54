use std::path::Path;

use csv::WriterBuilder;

use crate::scorpion::etl::error::Result;
use crate::scorpion::etl::model::Table;

/// Delimiter used for every CSV file the pipeline writes.
pub const OUTPUT_DELIMITER: u8 = b';';

/// Writes `table` as a `;`-delimited UTF-8 file with a header row.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .flexible(true)
        .from_path(path)?;

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
