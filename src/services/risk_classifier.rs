//! Expiry-risk classification.
//!
//! [`normalize`] turns raw upload records into an [`InventoryBatch`] with a
//! derived `days_remaining` for every row; it is the only time-dependent
//! step. [`assess`] is a pure function of the batch.

use crate::models::inventory::{
    DAYS_LEFT_COLUMN, DAYS_REMAINING_COLUMN, EXPIRY_DATE_COLUMN, PRICE_COLUMN, PRODUCT_COLUMN,
    QUANTITY_COLUMN,
};
use crate::models::{
    InventoryBatch, InventoryRow, NormalizationWarning, RawRecord, RawUpload, RiskAssessment,
    UNKNOWN_DAYS_SENTINEL,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

const SECONDS_PER_DAY: i64 = 86_400;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Normalize raw records using the current UTC time for date derivation.
pub fn normalize(raw: &[RawRecord]) -> InventoryBatch {
    normalize_at(raw, Utc::now().naive_utc())
}

/// Normalize raw records, deriving remaining shelf life relative to `now`.
///
/// Never fails: unparseable values fall back to the sentinel (shelf life) or
/// are dropped (quantity, price), each with a [`NormalizationWarning`].
pub fn normalize_at(raw: &[RawRecord], now: NaiveDateTime) -> InventoryBatch {
    normalize_with_header(&[], raw, now)
}

/// Normalize a parsed upload using the current UTC time.
pub fn normalize_upload(upload: &RawUpload) -> InventoryBatch {
    normalize_upload_at(upload, Utc::now().naive_utc())
}

/// Like [`normalize_at`], with the batch columns taken from the upload's
/// header row, so they survive even when there are no data rows.
pub fn normalize_upload_at(upload: &RawUpload, now: NaiveDateTime) -> InventoryBatch {
    normalize_with_header(&upload.columns, &upload.records, now)
}

#[instrument(skip(header, raw), fields(columns = header.len(), records = raw.len()))]
fn normalize_with_header(
    header: &[String],
    raw: &[RawRecord],
    now: NaiveDateTime,
) -> InventoryBatch {
    let mut columns: Vec<String> = Vec::new();
    let record_names = raw
        .iter()
        .flat_map(|record| record.fields().iter().map(|(name, _)| name));
    for name in header.iter().chain(record_names) {
        let name = normalize_column_name(name);
        if !columns.contains(&name) {
            columns.push(name);
        }
    }

    let rename_days_left = !columns.iter().any(|c| c == DAYS_REMAINING_COLUMN)
        && columns.iter().any(|c| c == DAYS_LEFT_COLUMN);
    if rename_days_left {
        for column in columns.iter_mut().filter(|c| *c == DAYS_LEFT_COLUMN) {
            *column = DAYS_REMAINING_COLUMN.to_string();
        }
    }
    let canonical = |name: &str| -> String {
        let name = normalize_column_name(name);
        if rename_days_left && name == DAYS_LEFT_COLUMN {
            DAYS_REMAINING_COLUMN.to_string()
        } else {
            name
        }
    };

    let mut warnings = Vec::new();
    if !raw.is_empty() {
        if !columns.iter().any(|c| c == PRODUCT_COLUMN) {
            warnings.push(NormalizationWarning::MissingProductColumn);
        }
        if !columns
            .iter()
            .any(|c| c == EXPIRY_DATE_COLUMN || c == DAYS_REMAINING_COLUMN)
        {
            warnings.push(NormalizationWarning::MissingShelfLifeColumns);
        }
    }

    let rows = raw
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let mut fields: Vec<(String, String)> = Vec::with_capacity(record.fields().len());
            for (name, value) in record.fields() {
                let name = canonical(name);
                if !fields.iter().any(|(existing, _)| *existing == name) {
                    fields.push((name, value.trim().to_string()));
                }
            }
            normalize_row(idx + 1, fields, now, &mut warnings)
        })
        .collect::<Vec<_>>();

    let mut batch = InventoryBatch::new(rows);
    batch.columns = columns;
    batch.warnings = warnings;

    if !batch.warnings.is_empty() {
        warn!(
            batch_id = %batch.id,
            warnings = batch.warnings.len(),
            "inventory upload normalized with warnings"
        );
    }
    debug!(batch_id = %batch.id, rows = batch.len(), "inventory upload normalized");
    batch
}

fn normalize_row(
    row_number: usize,
    fields: Vec<(String, String)>,
    now: NaiveDateTime,
    warnings: &mut Vec<NormalizationWarning>,
) -> InventoryRow {
    let cell = |column: &'static str| non_empty_cell(&fields, column);

    let product = cell(PRODUCT_COLUMN).map(str::to_string);

    let quantity = cell(QUANTITY_COLUMN).and_then(|value| {
        let parsed = parse_quantity(value);
        if parsed.is_none() {
            warnings.push(NormalizationWarning::InvalidQuantity {
                row: row_number,
                value: value.to_string(),
            });
        }
        parsed
    });

    let price = cell(PRICE_COLUMN).and_then(|value| {
        let parsed = parse_price(value);
        if parsed.is_none() {
            warnings.push(NormalizationWarning::InvalidPrice {
                row: row_number,
                value: value.to_string(),
            });
        }
        parsed
    });

    let expiry_date = cell(EXPIRY_DATE_COLUMN).and_then(|value| {
        let parsed = parse_expiry_date(value);
        if parsed.is_none() {
            warnings.push(NormalizationWarning::UnparseableExpiryDate {
                row: row_number,
                value: value.to_string(),
            });
        }
        parsed
    });

    let days_remaining = match expiry_date {
        Some(expiry) => days_between(now, expiry),
        None => cell(DAYS_REMAINING_COLUMN)
            .map(|value| {
                parse_days_remaining(value).unwrap_or_else(|| {
                    warnings.push(NormalizationWarning::UnparseableDaysRemaining {
                        row: row_number,
                        value: value.to_string(),
                    });
                    UNKNOWN_DAYS_SENTINEL
                })
            })
            .unwrap_or(UNKNOWN_DAYS_SENTINEL),
    };

    InventoryRow {
        product,
        quantity,
        price,
        expiry_date,
        days_remaining,
        fields,
    }
}

fn non_empty_cell<'a>(fields: &'a [(String, String)], column: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(name, _)| name == column)
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

/// Classify a normalized batch. Pure: no clock, no I/O.
pub fn assess(batch: &InventoryBatch) -> RiskAssessment {
    let risky_rows: Vec<InventoryRow> = batch
        .iter()
        .filter(|row| row.is_risky())
        .cloned()
        .collect();
    let risk_score = risk_score(risky_rows.len(), batch.len());

    RiskAssessment {
        total_count: batch.len(),
        risky_rows,
        risk_score,
    }
}

/// `round(max(0, 100 - 100 * risky / total))`, 100 for an empty batch.
/// Halves round away from zero, so 3 risky rows out of 8 score 63.
pub fn risk_score(risky_count: usize, total_count: usize) -> u8 {
    if total_count == 0 {
        return 100;
    }
    let risky_fraction = risky_count.min(total_count) as f64 / total_count as f64;
    (100.0 - 100.0 * risky_fraction).max(0.0).round() as u8
}

pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Whole days from `now` until `expiry`, floored (an item that expired an
/// hour ago has -1 days left).
pub fn days_between(now: NaiveDateTime, expiry: NaiveDateTime) -> i64 {
    (expiry - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Parse an expiry value as a calendar date or date-time. Date-only values
/// are taken as midnight.
pub fn parse_expiry_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Integer day count; finite decimals are truncated toward zero.
pub fn parse_days_remaining(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(days) = value.parse::<i64>() {
        return Some(days);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|days| days.is_finite() && days.abs() < i64::MAX as f64)
        .map(|days| days.trunc() as i64)
}

fn parse_quantity(value: &str) -> Option<u64> {
    if let Ok(quantity) = value.parse::<u64>() {
        return Some(quantity);
    }
    // Spreadsheets often export whole counts as "12.0"
    value
        .parse::<f64>()
        .ok()
        .filter(|q| q.is_finite() && *q >= 0.0 && q.fract() == 0.0 && *q < u64::MAX as f64)
        .map(|q| q as u64)
}

fn parse_price(value: &str) -> Option<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
        .filter(|price| !price.is_sign_negative())
}
