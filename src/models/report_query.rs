//! Report Query Model
//!
//! `QueryParameters` is the immutable description of one report request. It is
//! owned by the call that built it and cloned into any background job it spawns.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of report shapes the pipeline can fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Date-bounded report over dimensions and metrics
    Report,
    /// Live report over the last minutes of activity, no date range
    Realtime,
    /// Date-bounded breakdown of one or more dimensions, no metrics
    Dimension,
}

impl ReportType {
    pub const ALL: [ReportType; 3] = [ReportType::Report, ReportType::Realtime, ReportType::Dimension];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Report => "report",
            ReportType::Realtime => "realtime",
            ReportType::Dimension => "dimension",
        }
    }

    pub fn is_realtime(&self) -> bool {
        matches!(self, ReportType::Realtime)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "report" => Ok(ReportType::Report),
            "realtime" => Ok(ReportType::Realtime),
            "dimension" => Ok(ReportType::Dimension),
            other => Err(FetchError::InvalidReportType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DateRange {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
}

impl From<&str> for Dimension {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    /// Derived-metric expression, e.g. `sessions/activeUsers`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl From<&str> for Metric {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            expression: None,
        }
    }
}

/// Parameters of a single report request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    report_type: ReportType,
    #[serde(default)]
    date_ranges: Vec<DateRange>,
    #[serde(default)]
    dimensions: Vec<Dimension>,
    #[serde(default)]
    metrics: Vec<Metric>,
    #[serde(default)]
    options: BTreeMap<String, Value>,
}

impl QueryParameters {
    /// Standard report over a date range
    pub fn report<D, M>(date_range: DateRange, dimensions: D, metrics: M) -> Self
    where
        D: IntoIterator,
        D::Item: Into<Dimension>,
        M: IntoIterator,
        M::Item: Into<Metric>,
    {
        Self {
            report_type: ReportType::Report,
            date_ranges: vec![date_range],
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metrics: metrics.into_iter().map(Into::into).collect(),
            options: BTreeMap::new(),
        }
    }

    /// Realtime report; realtime requests never carry date ranges
    pub fn realtime<D, M>(dimensions: D, metrics: M) -> Self
    where
        D: IntoIterator,
        D::Item: Into<Dimension>,
        M: IntoIterator,
        M::Item: Into<Metric>,
    {
        Self {
            report_type: ReportType::Realtime,
            date_ranges: Vec::new(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metrics: metrics.into_iter().map(Into::into).collect(),
            options: BTreeMap::new(),
        }
    }

    /// Breakdown of a single dimension over a date range
    pub fn dimension_report(date_range: DateRange, dimension: impl Into<Dimension>) -> Self {
        Self::dimensions_report(date_range, [dimension])
    }

    pub fn dimensions_report<D>(date_range: DateRange, dimensions: D) -> Self
    where
        D: IntoIterator,
        D::Item: Into<Dimension>,
    {
        Self {
            report_type: ReportType::Dimension,
            date_ranges: vec![date_range],
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metrics: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    /// Add another date range (comparison reports). Ignored for realtime reports.
    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        if !self.report_type.is_realtime() {
            self.date_ranges.push(date_range);
        }
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_options<I, K>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.options
            .extend(options.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn date_ranges(&self) -> &[DateRange] {
        &self.date_ranges
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    /// The parameter bag that identifies this request for caching.
    ///
    /// Only the fields meaningful to the report shape are included, so a
    /// realtime request never hashes a date range and a dimension report never
    /// hashes metrics.
    pub fn parameter_bag(&self) -> Value {
        match self.report_type {
            ReportType::Report => json!({
                "dateRange": self.date_ranges,
                "dimensions": self.dimensions,
                "metrics": self.metrics,
                "options": self.options,
            }),
            ReportType::Realtime => json!({
                "dimensions": self.dimensions,
                "metrics": self.metrics,
                "options": self.options,
            }),
            ReportType::Dimension => json!({
                "dateRange": self.date_ranges,
                "dimension": self.dimensions,
                "options": self.options,
            }),
        }
    }
}
