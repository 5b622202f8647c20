use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::{Metric, ReadingRecord};

const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRow {
    pub timestamp: DateTime<Utc>,
    /// True when the device sent no usable timestamp and one was invented.
    pub synthesized: bool,
    pub record: ReadingRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<Metric, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricCard {
    pub metric: Metric,
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingTable {
    rows: Vec<ReadingRow>,
}

impl ReadingTable {
    pub fn rows(&self) -> &[ReadingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest(&self) -> Option<&ReadingRow> {
        self.rows.last()
    }

    pub fn has_synthesized_timestamps(&self) -> bool {
        self.rows.iter().any(|row| row.synthesized)
    }

    /// Numeric series for charting. Rows with none of `metrics` present are dropped.
    pub fn chart_view(&self, metrics: &[Metric]) -> Vec<ChartPoint> {
        self.rows
            .iter()
            .filter_map(|row| {
                let values: BTreeMap<Metric, Option<f64>> = metrics
                    .iter()
                    .map(|metric| (*metric, row.record.measurement(*metric).value()))
                    .collect();

                if values.values().all(Option::is_none) {
                    return None;
                }

                Some(ChartPoint {
                    timestamp: row.timestamp,
                    values,
                })
            })
            .collect()
    }

    pub fn latest_cards(&self) -> Vec<MetricCard> {
        let Some(latest) = self.latest() else {
            return Vec::new();
        };

        Metric::ALL
            .into_iter()
            .map(|metric| MetricCard {
                metric,
                label: metric.label(),
                value: latest.record.measurement(metric).card_text(),
            })
            .collect()
    }
}

/// Builds the reading table for a query that started at `from`.
///
/// A record without a parsable `timestamp`/`time` gets `from` midnight plus one
/// minute per position in the response. Rows are then stably sorted by time.
pub fn normalize(records: Vec<ReadingRecord>, from: NaiveDate) -> ReadingTable {
    let origin = Utc.from_utc_datetime(&from.and_time(chrono::NaiveTime::MIN));

    let mut rows: Vec<ReadingRow> = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let parsed = record.raw_timestamp().and_then(parse_timestamp);
            let (timestamp, synthesized) = match parsed {
                Some(timestamp) => (timestamp, false),
                None => (origin + Duration::minutes(index as i64), true),
            };
            ReadingRow {
                timestamp,
                synthesized,
                record,
            }
        })
        .collect();

    rows.sort_by_key(|row| row.timestamp);
    ReadingTable { rows }
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp_str(text.trim()),
        Value::Number(number) => {
            let raw = number.as_i64()?;
            // Epoch milliseconds are eleven-plus digits for any date after 1973.
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.with_timezone(&Utc));
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|date| Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn records(value: Value) -> Vec<ReadingRecord> {
        serde_json::from_value(value).unwrap()
    }

    fn from_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn synthesizes_minute_spaced_timestamps() {
        let table = normalize(
            records(json!([{"EC": 1.0}, {"EC": 2.0}, {"EC": 3.0}])),
            from_date(),
        );

        let stamps: Vec<_> = table.rows().iter().map(|row| row.timestamp).collect();
        assert_eq!(stamps, vec![at(0, 0), at(0, 1), at(0, 2)]);
        assert!(table.rows().iter().all(|row| row.synthesized));
        assert!(table.has_synthesized_timestamps());
    }

    #[test]
    fn sorts_by_parsed_timestamp() {
        let table = normalize(
            records(json!([
                {"timestamp": "2023-01-01T10:00:00Z", "EC": 2.0},
                {"timestamp": "2023-01-01T09:00:00+00:00", "EC": 1.0},
                {"time": "2023-01-01 11:30:00", "EC": 3.0},
            ])),
            from_date(),
        );

        let ec: Vec<_> = table
            .rows()
            .iter()
            .map(|row| row.record.measurement(Metric::Ec).value())
            .collect();
        assert_eq!(ec, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(table.latest().unwrap().timestamp, at(11, 30));
        assert!(!table.has_synthesized_timestamps());
    }

    #[test]
    fn equal_timestamps_keep_response_order() {
        let table = normalize(
            records(json!([
                {"timestamp": "2023-01-01T08:00:00Z", "EC": 1.0},
                {"timestamp": "2023-01-01T07:00:00Z", "EC": 0.5},
                {"timestamp": "2023-01-01T08:00:00Z", "EC": 2.0},
                {"timestamp": "2023-01-01T08:00:00Z", "EC": 3.0},
            ])),
            from_date(),
        );

        let ec: Vec<_> = table
            .rows()
            .iter()
            .map(|row| row.record.measurement(Metric::Ec).value())
            .collect();
        assert_eq!(ec, vec![Some(0.5), Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn parses_epoch_seconds_and_millis() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        assert_eq!(parse_timestamp(&json!(1_709_294_400)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_709_294_400_000_i64)), Some(expected));
        assert_eq!(parse_timestamp(&json!("not a date")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn chart_view_drops_rows_without_any_metric() {
        let table = normalize(
            records(json!([
                {"EC": 1.0, "pH": "bad"},
                {"EC": "n/a", "pH": null, "waterTemp": 22.0},
                {"airHum": 55},
            ])),
            from_date(),
        );

        let chart = table.chart_view(&Metric::CHART);

        assert_eq!(table.len(), 3);
        assert_eq!(chart.len(), 2);
        assert_eq!(chart[0].values[&Metric::Ec], Some(1.0));
        assert_eq!(chart[0].values[&Metric::Ph], None);
        assert_eq!(chart[1].values[&Metric::AirHum], Some(55.0));
        assert_eq!(chart[1].timestamp, at(0, 2));
    }

    #[test]
    fn latest_cards_fall_back_to_marker() {
        let table = normalize(
            records(json!([{"EC": 1.0}, {"EC": 1.234, "pH": 6.5}])),
            from_date(),
        );

        let cards: Vec<_> = table
            .latest_cards()
            .into_iter()
            .map(|card| (card.label, card.value))
            .collect();

        assert_eq!(
            cards,
            vec![
                ("EC (mS/cm)", "1.23".to_string()),
                ("pH", "6.50".to_string()),
                ("Water Temp (°C)", "N/A".to_string()),
                ("Air Temp (°C)", "N/A".to_string()),
                ("Air Humidity (%)", "N/A".to_string()),
            ]
        );
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let table = normalize(Vec::new(), from_date());

        assert!(table.is_empty());
        assert!(table.latest_cards().is_empty());
        assert!(table.chart_view(&Metric::CHART).is_empty());
    }

    #[test]
    fn single_untimed_record_lands_on_from_date() {
        let table = normalize(
            records(json!([{"EC": 1.2, "pH": 6.5, "airTemp": 29.1, "airHum": 70, "waterTemp": 24.0}])),
            from_date(),
        );

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].timestamp, at(0, 0));
        let chart = table.chart_view(&Metric::CHART);
        assert_eq!(chart.len(), 1);
        assert!(chart[0].values.values().all(Option::is_some));
    }
}
