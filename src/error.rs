use thiserror::Error;

use crate::model::PaymentMonth;
use crate::store::StoreError;

/// Every operation failure is scoped to the one request that caused
/// it; nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("SPP for {student} is already paid for {month}")]
    DuplicatePayment {
        student: String,
        month: PaymentMonth,
    },
    #[error("{missing} roster members still have no status")]
    IncompleteSubmission { missing: usize },
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn missing_fields(fields: &[&str]) -> Self {
        CoreError::Validation(format!("missing required fields: {}", fields.join(", ")))
    }
}
