pub mod report_data;
pub mod report_query;

// Re-export models for easy access
pub use report_data::{
    EnvelopeMetadata, FailureEnvelope, NormalizedRows, ReportEnvelope, ReportRow, ResponseStatus,
    SuccessEnvelope,
};
pub use report_query::{DateRange, Dimension, Metric, QueryParameters, ReportType};
