pub mod alert;
pub mod inventory;

pub use alert::{AlertPayload, DeliveryReport};
pub use inventory::{
    InventoryBatch, InventoryRow, NormalizationWarning, RawRecord, RawUpload, RiskAssessment,
    RISK_THRESHOLD_DAYS, UNKNOWN_DAYS_SENTINEL,
};
