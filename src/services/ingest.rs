//! CSV ingestion: turns an uploaded delimited file into a [`RawUpload`].
//!
//! Header names are kept exactly as written; normalization happens in the
//! risk classifier so that every ingestion path shares one set of rules.

use crate::errors::ServiceError;
use crate::models::{RawRecord, RawUpload};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Parse a header-first CSV document.
///
/// Lines with no content at all are skipped. A line of delimiters only
/// (`,,`) is a record whose cells are all empty and is kept, so it still
/// counts toward the batch size.
pub fn read_upload<R: Read>(reader: R) -> Result<RawUpload, ServiceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    if headers.iter().all(|h| h.is_empty()) {
        debug!("upload has no header row");
        return Ok(RawUpload::default());
    }

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let row = result?;
        // Whitespace-only line: a single empty cell after trimming
        if row.len() == 1 && row.get(0) == Some("") {
            continue;
        }
        records.push(RawRecord::from_pairs(
            headers
                .iter()
                .enumerate()
                .map(|(idx, name)| (name, row.get(idx).unwrap_or_default())),
        ));
    }

    debug!(
        columns = headers.len(),
        records = records.len(),
        "parsed inventory upload"
    );
    Ok(RawUpload {
        columns: headers.iter().map(str::to_string).collect(),
        records,
    })
}

/// Records only, for callers that do not need the header.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecord>, ServiceError> {
    read_upload(reader).map(|upload| upload.records)
}

/// Parse a CSV file on disk.
pub fn read_upload_from_path(path: &Path) -> Result<RawUpload, ServiceError> {
    let file = File::open(path).map_err(|e| {
        ServiceError::InvalidInput(format!("failed to open '{}': {}", path.display(), e))
    })?;
    read_upload(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_header_and_rows_in_order() {
        let data = "Product,Quantity,Days_Left\nMilk,10,2\nButter,4,8\n";
        let records = read_records(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].fields(),
            &[
                ("Product".to_string(), "Milk".to_string()),
                ("Quantity".to_string(), "10".to_string()),
                ("Days_Left".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(records[1].fields()[0].1, "Butter");
    }

    #[test]
    fn short_rows_are_padded_and_cells_trimmed() {
        let data = "product, quantity ,price\n  Cheese , 3\n";
        let records = read_records(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].fields(),
            &[
                ("product".to_string(), "Cheese".to_string()),
                ("quantity".to_string(), "3".to_string()),
                ("price".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn empty_upload_yields_no_records() {
        assert!(read_records("".as_bytes()).unwrap().is_empty());
        assert!(read_records("product,quantity\n".as_bytes())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn blank_lines_are_skipped_but_empty_cell_rows_are_kept() {
        let data = "product,days_remaining\nMilk,1\n\n   \n,\nKefir,6\n";
        let records = read_records(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records[1].fields(),
            &[
                ("product".to_string(), String::new()),
                ("days_remaining".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn header_only_upload_keeps_its_columns() {
        let upload = read_upload("Product,Quantity,Price,Days_Remaining\n".as_bytes()).unwrap();
        assert!(upload.is_empty());
        assert_eq!(
            upload.columns,
            vec!["Product", "Quantity", "Price", "Days_Remaining"]
        );
    }

    #[test]
    fn invalid_utf8_is_a_csv_error() {
        let data: &[u8] = b"product,days_remaining\n\xff\xfe,1\n";
        let err = read_records(data).unwrap_err();
        assert!(matches!(err, ServiceError::CsvError(_)));
    }

    #[test]
    fn reads_from_path_and_reports_missing_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "product,expiry_date").unwrap();
        writeln!(file, "Cream,2099-01-01").unwrap();

        let upload = read_upload_from_path(file.path()).unwrap();
        assert_eq!(upload.columns, vec!["product", "expiry_date"]);
        assert_eq!(upload.len(), 1);

        let missing = read_upload_from_path(Path::new("/nonexistent/inventory.csv"));
        assert!(matches!(missing, Err(ServiceError::InvalidInput(_))));
    }
}
