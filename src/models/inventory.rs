use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;
use uuid::Uuid;

/// Rows with this many days of shelf life or fewer are risky (inclusive).
pub const RISK_THRESHOLD_DAYS: i64 = 3;

/// Placeholder shelf life for rows whose remaining days cannot be determined.
pub const UNKNOWN_DAYS_SENTINEL: i64 = 9999;

pub const PRODUCT_COLUMN: &str = "product";
pub const QUANTITY_COLUMN: &str = "quantity";
pub const PRICE_COLUMN: &str = "price";
pub const EXPIRY_DATE_COLUMN: &str = "expiry_date";
pub const DAYS_REMAINING_COLUMN: &str = "days_remaining";
pub const DAYS_LEFT_COLUMN: &str = "days_left";

/// One uploaded record before normalization: header/value pairs in file order,
/// header names exactly as the uploader wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A parsed upload: the header row as written plus one [`RawRecord`] per
/// data line. The header is kept separately so an upload with no data rows
/// still knows its columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawUpload {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl RawUpload {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One entry of an inventory batch after normalization.
///
/// `fields` keeps every uploaded cell under its normalized column name so the
/// risky-subset report and alert payload can echo the original columns.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
    pub product: Option<String>,
    pub quantity: Option<u64>,
    pub price: Option<Decimal>,
    pub expiry_date: Option<NaiveDateTime>,
    pub days_remaining: i64,
    pub fields: Vec<(String, String)>,
}

impl InventoryRow {
    /// Row with only a shelf-life value; handy for callers that already hold
    /// computed day counts.
    pub fn with_days_remaining(days_remaining: i64) -> Self {
        Self {
            product: None,
            quantity: None,
            price: None,
            expiry_date: None,
            days_remaining,
            fields: Vec::new(),
        }
    }

    pub fn is_risky(&self) -> bool {
        self.days_remaining <= RISK_THRESHOLD_DAYS
    }

    /// Original cell text for a normalized column name
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// JSON object with every uploaded column plus the typed fields.
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();

        record.insert(
            PRODUCT_COLUMN.to_string(),
            self.product.clone().map(Value::String).unwrap_or(Value::Null),
        );
        record.insert(
            QUANTITY_COLUMN.to_string(),
            self.quantity.map(Value::from).unwrap_or(Value::Null),
        );
        record.insert(PRICE_COLUMN.to_string(), price_value(self.price));
        record.insert(
            DAYS_REMAINING_COLUMN.to_string(),
            Value::from(self.days_remaining),
        );
        record
    }
}

fn price_value(price: Option<Decimal>) -> Value {
    match price {
        Some(price) => price
            .to_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(price.to_string())),
        None => Value::Null,
    }
}

impl Serialize for InventoryRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_record().serialize(serializer)
    }
}

/// Data problems found while normalizing an upload. None of them reject the
/// batch; affected rows fall back to the sentinel or lose the bad value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationWarning {
    MissingProductColumn,
    MissingShelfLifeColumns,
    /// `row` is the 1-based data row number in the upload
    UnparseableExpiryDate { row: usize, value: String },
    UnparseableDaysRemaining { row: usize, value: String },
    InvalidQuantity { row: usize, value: String },
    InvalidPrice { row: usize, value: String },
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingProductColumn => {
                write!(f, "upload has no '{}' column", PRODUCT_COLUMN)
            }
            Self::MissingShelfLifeColumns => write!(
                f,
                "upload has neither '{}' nor '{}'/'{}'; every row is treated as not at risk",
                EXPIRY_DATE_COLUMN, DAYS_REMAINING_COLUMN, DAYS_LEFT_COLUMN
            ),
            Self::UnparseableExpiryDate { row, value } => {
                write!(f, "row {}: cannot parse expiry date '{}'", row, value)
            }
            Self::UnparseableDaysRemaining { row, value } => {
                write!(f, "row {}: cannot parse days remaining '{}'", row, value)
            }
            Self::InvalidQuantity { row, value } => {
                write!(f, "row {}: invalid quantity '{}'", row, value)
            }
            Self::InvalidPrice { row, value } => {
                write!(f, "row {}: invalid price '{}'", row, value)
            }
        }
    }
}

/// One uploaded inventory snapshot, rows in upload order.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryBatch {
    pub id: Uuid,
    /// Normalized column names in first-seen order
    pub columns: Vec<String>,
    pub rows: Vec<InventoryRow>,
    pub warnings: Vec<NormalizationWarning>,
}

impl InventoryBatch {
    pub fn new(rows: Vec<InventoryRow>) -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: Vec::new(),
            rows,
            warnings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InventoryRow> {
        self.rows.iter()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Result of classifying one batch.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RiskAssessment {
    pub total_count: usize,
    pub risky_rows: Vec<InventoryRow>,
    /// 0-100, 100 means nothing is close to expiry
    pub risk_score: u8,
}

impl RiskAssessment {
    pub fn risky_count(&self) -> usize {
        self.risky_rows.len()
    }

    pub fn has_risk(&self) -> bool {
        !self.risky_rows.is_empty()
    }
}
