//! Non-fatal data quality findings collected during a reduction run.

use std::fmt;

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// A `calendar_dates` row whose `exception_type` is not `1`. The row is
    /// still considered by date.
    ExceptionType {
        service_id: String,
        date: String,
        exception_type: String,
    },
    /// A `calendar_dates` row whose date is not `YYYYMMDD`. The row is dropped.
    UnparseableDate { service_id: String, date: String },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::ExceptionType {
                service_id,
                date,
                exception_type,
            } => write!(
                f,
                "calendar_dates service {service_id} on {date} has exception_type {exception_type:?}, expected 1"
            ),
            DataQualityWarning::UnparseableDate { service_id, date } => {
                write!(f, "calendar_dates service {service_id} has unparseable date {date:?}")
            }
        }
    }
}

/// Side-channel collector: warnings are logged as they are recorded and kept
/// for the run summary.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<DataQualityWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, warning: DataQualityWarning) {
        warn!(%warning, "Data quality issue");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[DataQualityWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
