//! # Reporting Backend Boundary
//!
//! The remote reporting API is a black box reached through [`ReportingBackend`].
//! Requests are built here from [`QueryParameters`]; responses come back as
//! tabular [`RawReport`]s or a typed [`BackendError`].

use crate::error::BackendError;
use crate::models::{DateRange, Dimension, Metric, QueryParameters, ReportType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Request sent over the RPC boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Target resource, e.g. `properties/123456`
    pub property: String,
    pub date_ranges: Vec<DateRange>,
    pub dimensions: Vec<Dimension>,
    pub metrics: Vec<Metric>,
    /// Free-form options merged into the request (limit, offset, filters...)
    pub options: BTreeMap<String, Value>,
}

impl ReportRequest {
    /// Build the request for a query; which fields are sent depends on the
    /// report shape.
    pub fn for_query(property: &str, params: &QueryParameters) -> Self {
        let (date_ranges, metrics) = match params.report_type() {
            ReportType::Report => (params.date_ranges().to_vec(), params.metrics().to_vec()),
            ReportType::Realtime => (Vec::new(), params.metrics().to_vec()),
            ReportType::Dimension => (params.date_ranges().to_vec(), Vec::new()),
        };

        Self {
            property: property.to_string(),
            date_ranges,
            dimensions: params.dimensions().to_vec(),
            metrics,
            options: params.options().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
}

impl Header {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub dimension_values: Vec<String>,
    #[serde(default)]
    pub metric_values: Vec<String>,
}

/// Tabular response with positional header metadata.
///
/// A header slot may be missing (shorter list) or explicitly null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReport {
    #[serde(default)]
    pub dimension_headers: Vec<Option<Header>>,
    #[serde(default)]
    pub metric_headers: Vec<Option<Header>>,
    #[serde(default)]
    pub rows: Vec<RawRow>,
}

/// Remote reporting API.
///
/// `timeout` is the budget for this single attempt; implementations should
/// pass it on to their transport.
#[async_trait]
pub trait ReportingBackend: Send + Sync {
    async fn run_report(
        &self,
        request: &ReportRequest,
        timeout: Duration,
    ) -> Result<RawReport, BackendError>;

    async fn run_realtime_report(
        &self,
        request: &ReportRequest,
        timeout: Duration,
    ) -> Result<RawReport, BackendError>;
}

/// Route a request to the backend call that serves its report type
pub async fn dispatch(
    backend: &dyn ReportingBackend,
    report_type: ReportType,
    request: &ReportRequest,
    timeout: Duration,
) -> Result<RawReport, BackendError> {
    match report_type {
        ReportType::Report | ReportType::Dimension => backend.run_report(request, timeout).await,
        ReportType::Realtime => backend.run_realtime_report(request, timeout).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shapes_per_report_type() {
        let range = DateRange::new("30daysAgo", "today");

        let report = ReportRequest::for_query(
            "properties/1",
            &QueryParameters::report(range.clone(), ["country"], ["sessions"]).with_option("limit", 5),
        );
        assert_eq!(report.date_ranges.len(), 1);
        assert_eq!(report.metrics.len(), 1);
        assert_eq!(report.options["limit"], serde_json::json!(5));

        let realtime = ReportRequest::for_query(
            "properties/1",
            &QueryParameters::realtime(["country"], ["activeUsers"]),
        );
        assert!(realtime.date_ranges.is_empty());
        assert_eq!(realtime.metrics[0].name, "activeUsers");

        let dimension =
            ReportRequest::for_query("properties/1", &QueryParameters::dimension_report(range, "city"));
        assert!(dimension.metrics.is_empty());
        assert_eq!(dimension.dimensions[0].name, "city");
        assert_eq!(dimension.property, "properties/1");
    }

    #[test]
    fn test_raw_report_accepts_null_headers() {
        let raw: RawReport = serde_json::from_value(serde_json::json!({
            "dimension_headers": [{"name": "country"}, null],
            "rows": [{"dimension_values": ["NZ", "AKL"]}]
        }))
        .unwrap();

        assert_eq!(raw.dimension_headers[1], None);
        assert!(raw.metric_headers.is_empty());
        assert!(raw.rows[0].metric_values.is_empty());
    }
}
