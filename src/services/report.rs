//! Risky-subset report: the downloadable CSV artifact of an assessment.

use crate::errors::ServiceError;
use crate::models::inventory::DAYS_REMAINING_COLUMN;
use crate::models::{InventoryBatch, InventoryRow, RiskAssessment};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const DEFAULT_REPORT_FILE: &str = "expiry_report.csv";

/// Report header: the upload's normalized columns, with `days_remaining`
/// appended when the upload only carried an expiry date.
pub fn report_columns(batch: &InventoryBatch) -> Vec<String> {
    let mut columns = batch.columns.clone();
    if !batch.has_column(DAYS_REMAINING_COLUMN) {
        columns.push(DAYS_REMAINING_COLUMN.to_string());
    }
    columns
}

fn report_cells(columns: &[String], row: &InventoryRow) -> Vec<String> {
    columns
        .iter()
        .map(|column| {
            if column == DAYS_REMAINING_COLUMN {
                row.days_remaining.to_string()
            } else {
                row.field(column).unwrap_or_default().to_string()
            }
        })
        .collect()
}

/// Write the header and every risky row, in batch order.
pub fn write_risky_report<W: Write>(
    columns: &[String],
    assessment: &RiskAssessment,
    writer: W,
) -> Result<(), ServiceError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns)?;
    for row in &assessment.risky_rows {
        csv_writer.write_record(report_cells(columns, row))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// The report as an in-memory CSV document.
pub fn risky_report_csv(
    batch: &InventoryBatch,
    assessment: &RiskAssessment,
) -> Result<String, ServiceError> {
    let mut buffer = Vec::new();
    write_risky_report(&report_columns(batch), assessment, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ServiceError::InternalError(e.to_string()))
}

/// Write the report to `path`, replacing any existing file.
pub fn save_risky_report(
    path: &Path,
    batch: &InventoryBatch,
    assessment: &RiskAssessment,
) -> Result<(), ServiceError> {
    let file = File::create(path)?;
    write_risky_report(&report_columns(batch), assessment, file)?;
    info!(
        path = %path.display(),
        rows = assessment.risky_count(),
        "risky-subset report written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use crate::services::ingest::read_upload;
    use crate::services::risk_classifier::{assess, normalize_at, normalize_upload_at};
    use chrono::NaiveDate;

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn report_appends_derived_days_for_date_uploads() {
        let raw = vec![
            RawRecord::from_pairs([
                ("Product", "Milk"),
                ("Quantity", "10"),
                ("Price", "1.10"),
                ("Expiry_Date", "2024-05-03"),
            ]),
            RawRecord::from_pairs([
                ("Product", "Cheddar"),
                ("Quantity", "2"),
                ("Price", "7.00"),
                ("Expiry_Date", "2024-09-01"),
            ]),
        ];
        let batch = normalize_at(&raw, now());
        let assessment = assess(&batch);

        let csv = risky_report_csv(&batch, &assessment).unwrap();
        assert_eq!(
            csv,
            "product,quantity,price,expiry_date,days_remaining\n\
             Milk,10,1.10,2024-05-03,1\n"
        );
    }

    #[test]
    fn report_overwrites_days_cell_with_derived_value() {
        let raw = vec![RawRecord::from_pairs([
            ("product", "Kefir"),
            ("days_left", "2.0"),
            ("note", "shelf, back"),
        ])];
        let batch = normalize_at(&raw, now());
        let csv = risky_report_csv(&batch, &assess(&batch)).unwrap();

        assert_eq!(csv, "product,days_remaining,note\nKefir,2,\"shelf, back\"\n");
    }

    #[test]
    fn report_without_risky_rows_has_only_header() {
        let raw = vec![RawRecord::from_pairs([("product", "Ghee"), ("days_remaining", "40")])];
        let batch = normalize_at(&raw, now());
        let csv = risky_report_csv(&batch, &assess(&batch)).unwrap();
        assert_eq!(csv, "product,days_remaining\n");
    }

    #[test]
    fn header_only_upload_reports_input_columns() {
        let upload = read_upload("Product,Quantity,Price,Expiry_Date\n".as_bytes()).unwrap();
        let batch = normalize_upload_at(&upload, now());
        let csv = risky_report_csv(&batch, &assess(&batch)).unwrap();

        assert_eq!(csv, "product,quantity,price,expiry_date,days_remaining\n");
    }

    #[test]
    fn save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_REPORT_FILE);
        let raw = vec![RawRecord::from_pairs([("product", "Cream"), ("days_remaining", "0")])];
        let batch = normalize_at(&raw, now());

        save_risky_report(&path, &batch, &assess(&batch)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.ends_with("Cream,0\n"));
    }
}
