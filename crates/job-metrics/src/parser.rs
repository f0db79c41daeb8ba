// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns metric log lines into a [`MetricsTable`].
//!
//! Jobs report metrics by logging lines such as
//!
//! ```text
//! [node0] Metrics - timestamp=1700000000; iteration_number=3; loss=0.25;
//! ```
//!
//! Each line becomes one observation row. When the table is built, rows are grouped by a
//! pivot column (the timestamp or the iteration number) together with the optional node
//! tag, and values reported more than once for the same group are reduced with the
//! requested [`MetricStatistic`].

use std::cmp::Ordering;
use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::constants::METRICS_MARKER;
use crate::definitions::{MetricStatistic, MetricType, MetricValue, MetricsTable};

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const NODE_ID_COLUMN: &str = "node_id";

lazy_static! {
    /// `name=value` pairs separated by `;`. The final `;` may be omitted.
    #[allow(clippy::expect_used)]
    static ref METRIC_DEFINITION: Regex =
        Regex::new(r"(\w+)\s*=\s*([^;]+?)\s*(?:;|$)").expect("failed creating regex");

    /// Node tag prefixed by multi-node jobs, e.g. `[node0]`.
    #[allow(clippy::expect_used)]
    static ref NODE_TAG: Regex = Regex::new(r"^\[([^\]]*)\]").expect("failed creating regex");
}

/// Line-level metrics extraction used by the fetcher.
///
/// A parser is fed every matched record in order with [`ingest`](MetricsParser::ingest) and
/// consumed once with [`finalize`](MetricsParser::finalize).
pub trait MetricsParser {
    fn ingest(&mut self, timestamp: Option<&str>, message: &str);

    fn finalize(self, metric_type: MetricType, statistic: MetricStatistic) -> MetricsTable;
}

/// Metrics reported by a single log line, in the order they were written.
#[derive(Debug, Clone, Default, PartialEq)]
struct MetricRow {
    values: Vec<(String, MetricValue)>,
}

impl MetricRow {
    fn insert(&mut self, name: &str, value: MetricValue) {
        match self.values.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Hashable identity of a cell value, used to group rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Number(u64),
    Text(String),
}

impl From<&MetricValue> for CellKey {
    fn from(value: &MetricValue) -> Self {
        match value {
            // -0.0 and 0.0 name the same row
            MetricValue::Number(number) if *number == 0.0 => Self::Number(0f64.to_bits()),
            MetricValue::Number(number) => Self::Number(number.to_bits()),
            MetricValue::Text(text) => Self::Text(text.clone()),
        }
    }
}

type RowKey = (CellKey, Option<CellKey>);

/// Default [`MetricsParser`] for `Metrics - name=value;` lines.
#[derive(Debug, Clone, Default)]
pub struct LogMetricsParser {
    rows: Vec<MetricRow>,
}

impl LogMetricsParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines that carried at least one metric.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records the metrics found in `message`.
    ///
    /// Lines without the metrics marker, or without any numeric metric, are ignored. The
    /// record timestamp fills the `timestamp` column unless the line sets it itself.
    pub fn parse_log_message(&mut self, timestamp: Option<&str>, message: &str) {
        let Some(marker_at) = message.find(METRICS_MARKER) else {
            return;
        };
        let definitions = &message[marker_at + METRICS_MARKER.len()..];

        let mut row = MetricRow::default();
        for captures in METRIC_DEFINITION.captures_iter(definitions) {
            let (name, raw_value) = (&captures[1], &captures[2]);
            match raw_value.parse::<f64>() {
                Ok(value) => row.insert(name, MetricValue::Number(value)),
                Err(_) => warn!("Unable to convert value {raw_value} to a float."),
            }
        }
        if row.is_empty() {
            return;
        }

        if let Some(timestamp) = timestamp.filter(|t| !t.is_empty()) {
            if row.get(TIMESTAMP_COLUMN).is_none() {
                row.insert(TIMESTAMP_COLUMN, MetricValue::parse(timestamp));
            }
        }
        if let Some(node) = NODE_TAG.captures(message) {
            row.insert(NODE_ID_COLUMN, MetricValue::Text(node[1].to_string()));
        }

        self.rows.push(row);
    }

    /// Builds the table pivoted on the metric type's column.
    pub fn get_parsed_metrics(
        &self,
        metric_type: MetricType,
        statistic: MetricStatistic,
    ) -> MetricsTable {
        self.get_metric_data_with_pivot(metric_type.as_str(), statistic)
    }

    fn get_metric_data_with_pivot(&self, pivot: &str, statistic: MetricStatistic) -> MetricsTable {
        let mut row_indices: HashMap<RowKey, usize> = HashMap::new();
        let mut placement: Vec<Option<usize>> = Vec::with_capacity(self.rows.len());
        let mut columns: Vec<&str> = Vec::new();

        for row in &self.rows {
            let index = row.get(pivot).map(|pivot_value| {
                let key = (
                    CellKey::from(pivot_value),
                    row.get(NODE_ID_COLUMN).map(CellKey::from),
                );
                let next = row_indices.len();
                *row_indices.entry(key).or_insert(next)
            });
            placement.push(index);

            // Every metric gets a column, even if it never shares a line with the pivot.
            for (name, _) in &row.values {
                if !columns.contains(&name.as_str()) {
                    columns.push(name);
                }
            }
        }

        let row_count = row_indices.len();
        let mut table: MetricsTable = columns
            .into_iter()
            .map(|name| (name.to_string(), vec![None; row_count]))
            .collect();

        for (row, index) in self.rows.iter().zip(placement) {
            let Some(index) = index else {
                continue;
            };
            for (name, value) in &row.values {
                if let Some(cell) = table.get_mut(name).and_then(|column| column.get_mut(index)) {
                    *cell = Some(match cell.take() {
                        None => value.clone(),
                        Some(current) => select(statistic, current, value),
                    });
                }
            }
        }

        table
    }
}

impl MetricsParser for LogMetricsParser {
    fn ingest(&mut self, timestamp: Option<&str>, message: &str) {
        self.parse_log_message(timestamp, message);
    }

    fn finalize(self, metric_type: MetricType, statistic: MetricStatistic) -> MetricsTable {
        self.get_parsed_metrics(metric_type, statistic)
    }
}

/// Keeps `current` unless `candidate` wins under `statistic`. Numbers and text are never
/// compared with each other.
fn select(
    statistic: MetricStatistic,
    current: MetricValue,
    candidate: &MetricValue,
) -> MetricValue {
    let ordering = match (&current, candidate) {
        (MetricValue::Number(current), MetricValue::Number(candidate)) => {
            candidate.partial_cmp(current)
        }
        (MetricValue::Text(current), MetricValue::Text(candidate)) => Some(candidate.cmp(current)),
        _ => None,
    };

    match (statistic, ordering) {
        (MetricStatistic::Max, Some(Ordering::Greater))
        | (MetricStatistic::Min, Some(Ordering::Less)) => candidate.clone(),
        _ => current,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    fn number(value: f64) -> Option<MetricValue> {
        Some(MetricValue::Number(value))
    }

    fn text(value: &str) -> Option<MetricValue> {
        Some(MetricValue::Text(value.to_string()))
    }

    fn parse_lines(lines: &[(Option<&str>, &str)]) -> LogMetricsParser {
        let mut parser = LogMetricsParser::new();
        for (timestamp, message) in lines {
            parser.ingest(*timestamp, message);
        }
        parser
    }

    #[test]
    fn test_one_row_per_timestamp() {
        let parser = parse_lines(&[
            (Some("1000"), "Metrics - energy=0.1"),
            (Some("1500"), "Metrics - energy=0.2"),
        ]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert_eq!(table.len(), 2);
        assert_eq!(table["timestamp"], vec![number(1000.0), number(1500.0)]);
        assert_eq!(table["energy"], vec![number(0.1), number(0.2)]);
    }

    #[test]
    fn test_rows_follow_arrival_order() {
        let parser = parse_lines(&[
            (Some("3"), "Metrics - loss=3;"),
            (Some("1"), "Metrics - loss=1;"),
            (Some("2"), "Metrics - loss=2;"),
        ]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert_eq!(table["timestamp"], vec![number(3.0), number(1.0), number(2.0)]);
        assert_eq!(table["loss"], vec![number(3.0), number(1.0), number(2.0)]);
    }

    #[test]
    fn test_conflicts_resolved_by_statistic() {
        let lines = [
            (Some("1000"), "Metrics - energy=0.1;"),
            (Some("1000"), "Metrics - energy=0.7;"),
            (Some("1000"), "Metrics - energy=0.4;"),
        ];

        let max = parse_lines(&lines).finalize(MetricType::Timestamp, MetricStatistic::Max);
        assert_eq!(max["energy"], vec![number(0.7)]);

        let min = parse_lines(&lines).finalize(MetricType::Timestamp, MetricStatistic::Min);
        assert_eq!(min["energy"], vec![number(0.1)]);
    }

    #[test]
    fn test_missing_metric_is_none() {
        let parser = parse_lines(&[
            (Some("1"), "Metrics - loss=0.5; accuracy=0.1;"),
            (Some("2"), "Metrics - loss=0.4;"),
        ]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert_eq!(table["accuracy"], vec![number(0.1), None]);
        assert_eq!(table["loss"], vec![number(0.5), number(0.4)]);
    }

    #[test]
    fn test_lines_without_marker_or_metrics_are_ignored() {
        let mut parser = LogMetricsParser::new();
        parser.ingest(Some("1"), "loss=0.5;");
        parser.ingest(Some("2"), "Metrics - nothing to see here");
        parser.ingest(Some("3"), "Metrics - ");

        assert!(parser.is_empty());
        assert!(parser
            .finalize(MetricType::Timestamp, MetricStatistic::Max)
            .is_empty());
    }

    #[test]
    fn test_only_text_after_marker_is_parsed() {
        let parser = parse_lines(&[(Some("1"), "step=9; Metrics - loss=0.5;")]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert!(!table.contains_key("step"));
        assert_eq!(table["loss"], vec![number(0.5)]);
    }

    #[test]
    #[traced_test]
    fn test_unparseable_value_is_dropped() {
        let parser = parse_lines(&[(Some("1"), "Metrics - loss=high; accuracy=0.9;")]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert!(!table.contains_key("loss"));
        assert_eq!(table["accuracy"], vec![number(0.9)]);
        assert!(logs_contain("Unable to convert value high to a float."));
    }

    #[test]
    fn test_timestamp_in_line_wins_over_record_timestamp() {
        let parser = parse_lines(&[(
            Some("2024-05-01 10:00:00.000"),
            "Metrics - timestamp=42; loss=1;",
        )]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert_eq!(table["timestamp"], vec![number(42.0)]);
    }

    #[test]
    fn test_text_timestamp_is_kept_verbatim() {
        let parser = parse_lines(&[(Some("2024-05-01 10:00:00.000"), "Metrics - loss=1;")]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert_eq!(table["timestamp"], vec![text("2024-05-01 10:00:00.000")]);
    }

    #[test]
    fn test_lines_without_timestamp_only_add_columns() {
        let parser = parse_lines(&[
            (Some("1"), "Metrics - loss=0.5;"),
            (None, "Metrics - accuracy=0.9;"),
        ]);
        assert_eq!(parser.len(), 2);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert_eq!(table["timestamp"], vec![number(1.0)]);
        assert_eq!(table["loss"], vec![number(0.5)]);
        assert_eq!(table["accuracy"], vec![None]);
    }

    #[test]
    fn test_node_tag_splits_rows() {
        let parser = parse_lines(&[
            (Some("1"), "[node0] Metrics - loss=0.5;"),
            (Some("1"), "[node1] Metrics - loss=0.7;"),
            (Some("1"), "[node0] Metrics - loss=0.6;"),
        ]);

        let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);

        assert_eq!(table["node_id"], vec![text("node0"), text("node1")]);
        assert_eq!(table["loss"], vec![number(0.6), number(0.7)]);
        assert_eq!(table["timestamp"], vec![number(1.0), number(1.0)]);
    }

    #[test]
    fn test_iteration_number_pivot() {
        let parser = parse_lines(&[
            (Some("10"), "Metrics - iteration_number=0; cost=5;"),
            (Some("11"), "Metrics - iteration_number=1; cost=4;"),
            (Some("12"), "Metrics - iteration_number=1; cost=3;"),
            (Some("13"), "Metrics - cost=1;"),
        ]);

        let table = parser.finalize(MetricType::IterationNumber, MetricStatistic::Min);

        assert_eq!(table["iteration_number"], vec![number(0.0), number(1.0)]);
        assert_eq!(table["cost"], vec![number(5.0), number(3.0)]);
        assert_eq!(table["timestamp"], vec![number(10.0), number(11.0)]);
    }

    #[test]
    fn test_select_never_mixes_numbers_and_text() {
        let current = MetricValue::Number(1.0);
        let candidate = MetricValue::Text("z".to_string());
        assert_eq!(
            select(MetricStatistic::Max, current.clone(), &candidate),
            current
        );

        let current = MetricValue::Text("b".to_string());
        assert_eq!(
            select(MetricStatistic::Max, current.clone(), &"c".into()),
            MetricValue::Text("c".to_string())
        );
        assert_eq!(select(MetricStatistic::Min, current.clone(), &"c".into()), current);
    }

    proptest! {
        #[test]
        fn prop_columns_have_one_cell_per_timestamp(
            observations in prop::collection::vec((0u8..6, 0usize..3, -1000i32..1000), 1..40)
        ) {
            let names = ["loss", "accuracy", "energy"];
            let mut parser = LogMetricsParser::new();
            let mut expected: BTreeMap<(u8, usize), i32> = BTreeMap::new();
            for (timestamp, metric, value) in &observations {
                parser.ingest(
                    Some(timestamp.to_string().as_str()),
                    &format!("Metrics - {}={};", names[*metric], value),
                );
                let best = expected.entry((*timestamp, *metric)).or_insert(*value);
                *best = (*best).max(*value);
            }

            let distinct: Vec<u8> = observations.iter().fold(Vec::new(), |mut seen, (t, _, _)| {
                if !seen.contains(t) {
                    seen.push(*t);
                }
                seen
            });

            let table = parser.finalize(MetricType::Timestamp, MetricStatistic::Max);
            for column in table.values() {
                prop_assert_eq!(column.len(), distinct.len());
            }
            for ((timestamp, metric), value) in expected {
                let row = distinct.iter().position(|t| *t == timestamp).unwrap();
                prop_assert_eq!(
                    &table[names[metric]][row],
                    &Some(MetricValue::Number(f64::from(value)))
                );
            }
        }
    }
}
