//! Raw tabular responses to normalized rows, and rows to caller envelopes.
//!
//! Everything here is pure.

use crate::backend::{Header, RawReport};
use crate::constants::{DIMENSION_PLACEHOLDER_PREFIX, METRIC_PLACEHOLDER_PREFIX};
use crate::models::{EnvelopeMetadata, NormalizedRows, ReportEnvelope, ReportRow, ResponseStatus, SuccessEnvelope};
use chrono::Utc;
use std::collections::BTreeMap;

/// Map a raw response into normalized rows.
///
/// Each positional value is named after the header at the same index. A
/// missing, null or blank header falls back to `dimension_<i>` / `metric_<i>`.
pub fn transform_report(response: &RawReport) -> NormalizedRows {
    response
        .rows
        .iter()
        .map(|row| ReportRow {
            dimensions: name_values(
                &row.dimension_values,
                &response.dimension_headers,
                DIMENSION_PLACEHOLDER_PREFIX,
            ),
            metrics: name_values(
                &row.metric_values,
                &response.metric_headers,
                METRIC_PLACEHOLDER_PREFIX,
            ),
        })
        .collect()
}

fn name_values(
    values: &[String],
    headers: &[Option<Header>],
    placeholder_prefix: &str,
) -> BTreeMap<String, String> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let name = match headers.get(index) {
                Some(Some(header)) if !header.name.is_empty() => header.name.clone(),
                _ => format!("{placeholder_prefix}_{index}"),
            };
            (name, value.clone())
        })
        .collect()
}

/// Wrap rows in the success envelope with count/timestamp metadata
pub fn to_envelope(data: NormalizedRows, status: Option<ResponseStatus>) -> ReportEnvelope {
    let metadata = EnvelopeMetadata {
        count: data.len(),
        timestamp: Utc::now(),
        status,
    };

    ReportEnvelope::Success(SuccessEnvelope {
        data,
        metadata: Some(metadata),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawRow;
    use proptest::prelude::*;

    fn raw(dimension_headers: Vec<Option<Header>>, metric_headers: Vec<Option<Header>>, rows: Vec<RawRow>) -> RawReport {
        RawReport {
            dimension_headers,
            metric_headers,
            rows,
        }
    }

    fn row(dims: &[&str], metrics: &[&str]) -> RawRow {
        RawRow {
            dimension_values: dims.iter().map(|s| s.to_string()).collect(),
            metric_values: metrics.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_transform_names_values_from_headers() {
        let response = raw(
            vec![Some(Header::new("country")), Some(Header::new("city"))],
            vec![Some(Header::new("sessions"))],
            vec![row(&["NZ", "Auckland"], &["120"]), row(&["AU", "Sydney"], &["87"])],
        );

        let rows = transform_report(&response);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dimensions["country"], "NZ");
        assert_eq!(rows[0].dimensions["city"], "Auckland");
        assert_eq!(rows[1].metrics["sessions"], "87");
    }

    #[test]
    fn test_missing_headers_fall_back_to_placeholders() {
        let response = raw(
            vec![Some(Header::new("country")), None],
            vec![],
            vec![row(&["NZ", "Auckland", "extra"], &["1", "2"])],
        );

        let rows = transform_report(&response);

        assert_eq!(rows[0].dimensions["country"], "NZ");
        assert_eq!(rows[0].dimensions["dimension_1"], "Auckland");
        assert_eq!(rows[0].dimensions["dimension_2"], "extra");
        assert_eq!(rows[0].metrics["metric_0"], "1");
        assert_eq!(rows[0].metrics["metric_1"], "2");
    }

    #[test]
    fn test_blank_header_name_uses_placeholder() {
        let response = raw(vec![Some(Header::new(""))], vec![], vec![row(&["x"], &[])]);
        assert_eq!(transform_report(&response)[0].dimensions["dimension_0"], "x");
    }

    #[test]
    fn test_empty_rows_map_to_empty_sequence() {
        let response = raw(vec![Some(Header::new("country"))], vec![], vec![]);
        assert!(transform_report(&response).is_empty());
    }

    #[test]
    fn test_envelope_metadata() {
        let envelope = to_envelope(vec![ReportRow::default(), ReportRow::default()], Some(ResponseStatus::Refreshing));

        let metadata = envelope.metadata().unwrap();
        assert_eq!(metadata.count, 2);
        assert!(envelope.is_refreshing());
    }

    fn arb_raw_report() -> impl Strategy<Value = RawReport> {
        let header = proptest::option::of("[a-zA-Z]{0,6}".prop_map(Header::new));
        (
            proptest::collection::vec(header.clone(), 0..4),
            proptest::collection::vec(header, 0..4),
            proptest::collection::vec(
                (
                    proptest::collection::vec("[a-z0-9]{0,5}", 0..5),
                    proptest::collection::vec("[0-9]{1,4}", 0..5),
                )
                    .prop_map(|(d, m)| RawRow {
                        dimension_values: d,
                        metric_values: m,
                    }),
                0..6,
            ),
        )
            .prop_map(|(dimension_headers, metric_headers, rows)| RawReport {
                dimension_headers,
                metric_headers,
                rows,
            })
    }

    proptest! {
        #[test]
        fn prop_transform_is_idempotent(response in arb_raw_report()) {
            let first = transform_report(&response);
            let second = transform_report(&response);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.len(), response.rows.len());
        }
    }
}
