//! Column type inference for JSON row batches.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use datafusion::arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch,
    RecordBatchOptions, StringArray, TimestampMicrosecondArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use uploader_core::UploadError;

/// Days from the common era to the Unix epoch (1970-01-01).
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});

/// Shape of a timestamp string. A column only commits to the timestamp type
/// when every value shares one shape: fractional seconds all present or all
/// absent, and values either all zone-aware (`Z` or a numeric offset) or all
/// naive (taken as UTC). Anything else stays a string column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimestampShape {
    fractional: bool,
    aware: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
    Date,
    Timestamp(TimestampShape),
    Mixed,
    AllNull,
}

fn timestamp_shape(value: &str) -> Option<TimestampShape> {
    let captures = TIMESTAMP_RE.captures(value)?;
    Some(TimestampShape {
        fractional: captures.get(1).is_some(),
        aware: captures.get(2).is_some(),
    })
}

fn parse_timestamp_micros(value: &str, shape: TimestampShape) -> Option<i64> {
    if shape.aware {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.timestamp_micros())
    } else {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| dt.and_utc().timestamp_micros())
    }
}

/// Inspect an all-string column for date/timestamp patterns.
fn classify_text(values: &[&Value]) -> ColumnKind {
    let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();

    if strings.iter().all(|s| DATE_RE.is_match(s)) {
        if strings
            .iter()
            .all(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
        {
            return ColumnKind::Date;
        }
        return ColumnKind::Text;
    }

    let mut shape = None;
    for s in &strings {
        match (timestamp_shape(s), shape) {
            (None, _) => return ColumnKind::Text,
            (Some(found), None) => shape = Some(found),
            // Mixed timestamp shapes stay strings.
            (Some(found), Some(expected)) if found != expected => return ColumnKind::Text,
            _ => {}
        }
    }
    match shape {
        Some(shape)
            if strings
                .iter()
                .all(|s| parse_timestamp_micros(s, shape).is_some()) =>
        {
            ColumnKind::Timestamp(shape)
        }
        _ => ColumnKind::Text,
    }
}

fn classify(values: &[&Value]) -> ColumnKind {
    let mut ints = 0usize;
    let mut floats = 0usize;
    let mut bools = 0usize;
    let mut texts = 0usize;
    let mut non_null = 0usize;

    for value in values {
        match value {
            Value::Null => continue,
            Value::Bool(_) => bools += 1,
            Value::Number(n) if n.is_i64() => ints += 1,
            Value::Number(_) => floats += 1,
            Value::String(_) => texts += 1,
            // Nested objects and arrays are not scalars.
            _ => return ColumnKind::Mixed,
        }
        non_null += 1;
    }

    if non_null == 0 {
        ColumnKind::AllNull
    } else if bools == non_null {
        ColumnKind::Bool
    } else if ints == non_null {
        ColumnKind::Int
    } else if ints + floats == non_null {
        // Mixed int/float widens to float.
        ColumnKind::Float
    } else if texts == non_null {
        classify_text(values)
    } else {
        ColumnKind::Mixed
    }
}

fn build_column(values: &[&Value], kind: ColumnKind) -> (DataType, ArrayRef) {
    match kind {
        ColumnKind::Int => {
            let array: Int64Array = values.iter().map(|v| v.as_i64()).collect();
            (DataType::Int64, Arc::new(array))
        }
        ColumnKind::Float => {
            let array: Float64Array = values.iter().map(|v| v.as_f64()).collect();
            (DataType::Float64, Arc::new(array))
        }
        ColumnKind::Bool => {
            let array: BooleanArray = values.iter().map(|v| v.as_bool()).collect();
            (DataType::Boolean, Arc::new(array))
        }
        ColumnKind::Date => {
            let days: Vec<Option<i32>> = values
                .iter()
                .map(|v| {
                    v.as_str()
                        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                        .map(|d| d.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
                })
                .collect();
            (DataType::Date32, Arc::new(Date32Array::from(days)))
        }
        ColumnKind::Timestamp(shape) => {
            let micros: Vec<Option<i64>> = values
                .iter()
                .map(|v| v.as_str().and_then(|s| parse_timestamp_micros(s, shape)))
                .collect();
            let array = TimestampMicrosecondArray::from(micros).with_timezone("UTC");
            (
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                Arc::new(array),
            )
        }
        _ => {
            let array: StringArray = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>()
                .into();
            (DataType::Utf8, Arc::new(array))
        }
    }
}

/// Build a typed frame from a batch of JSON rows.
///
/// Columns keep their first-seen order. All-null columns are dropped. Rows
/// missing a key contribute a null. Returns `None` for an empty batch, and
/// `InvalidType` naming every column whose values mix types.
pub fn frame_from_rows(rows: &[Map<String, Value>]) -> Result<Option<RecordBatch>, UploadError> {
    if rows.is_empty() {
        return Ok(None);
    }

    static NULL: Value = Value::Null;
    let mut columns: IndexMap<&str, Vec<&Value>> = IndexMap::new();
    for row in rows {
        for key in row.keys() {
            columns.entry(key.as_str()).or_default();
        }
    }
    for (name, values) in columns.iter_mut() {
        for row in rows {
            values.push(row.get(*name).unwrap_or(&NULL));
        }
    }

    let mut fields = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();
    let mut mixed = Vec::new();

    for (name, values) in &columns {
        match classify(values) {
            ColumnKind::AllNull => continue,
            ColumnKind::Mixed => mixed.push((*name).to_string()),
            kind => {
                let (data_type, array) = build_column(values, kind);
                fields.push(Field::new(*name, data_type, true));
                arrays.push(array);
            }
        }
    }

    if !mixed.is_empty() {
        return Err(UploadError::InvalidType { columns: mixed });
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    let batch = RecordBatch::try_new_with_options(schema, arrays, &options)
        .map_err(UploadError::internal)?;
    Ok(Some(batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Array;

    fn rows(json: &str) -> Vec<Map<String, Value>> {
        serde_json::from_str(json).unwrap()
    }

    fn frame(json: &str) -> RecordBatch {
        frame_from_rows(&rows(json)).unwrap().unwrap()
    }

    fn column_type(batch: &RecordBatch, name: &str) -> DataType {
        batch
            .schema()
            .field_with_name(name)
            .unwrap()
            .data_type()
            .clone()
    }

    #[test]
    fn empty_batch_yields_no_frame() {
        assert!(frame_from_rows(&[]).unwrap().is_none());
    }

    #[test]
    fn all_null_columns_are_dropped() {
        let batch = frame(r#"[{"a": 2, "b": "bar", "c": null}]"#);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(column_type(&batch, "a"), DataType::Int64);
        assert_eq!(column_type(&batch, "b"), DataType::Utf8);
    }

    #[test]
    fn partially_null_columns_keep_their_type() {
        let batch = frame(r#"[{"a": 2, "b": "bar", "c": "baz"}, {"a": 2, "b": "bar", "c": null}]"#);
        assert_eq!(column_type(&batch, "c"), DataType::Utf8);
        assert_eq!(batch.column(2).null_count(), 1);
    }

    #[test]
    fn large_integers_stay_integers() {
        let batch = frame(r#"[{"a": 0}, {"a": 5000000000000}]"#);
        assert_eq!(column_type(&batch, "a"), DataType::Int64);
    }

    #[test]
    fn mixed_int_and_float_widens_to_float() {
        let batch = frame(r#"[{"a": 1}, {"a": 1.123}]"#);
        assert_eq!(column_type(&batch, "a"), DataType::Float64);
        let values = batch
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(values.value(0), 1.0);
        assert_eq!(values.value(1), 1.123);
    }

    #[test]
    fn booleans_with_nulls() {
        let batch = frame(r#"[{"a": true}, {"a": false}, {"a": null}]"#);
        assert_eq!(column_type(&batch, "a"), DataType::Boolean);
        assert_eq!(batch.column(0).null_count(), 1);
    }

    #[test]
    fn missing_keys_become_nulls() {
        let batch = frame(r#"[{"a": 1, "b": "x"}, {"a": 2}]"#);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column(1).null_count(), 1);
    }

    #[test]
    fn date_columns() {
        let batch = frame(r#"[{"a": "2024-10-01"}, {"a": "1999-10-01"}]"#);
        assert_eq!(column_type(&batch, "a"), DataType::Date32);
        let days = batch
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        // 2024-10-01 is 19_997 days after the epoch.
        assert_eq!(days.value(0), 19_997);
    }

    #[test]
    fn dates_mixed_with_text_stay_text() {
        let batch = frame(r#"[{"a": "2024-10-01"}, {"a": "foo"}]"#);
        assert_eq!(column_type(&batch, "a"), DataType::Utf8);
    }

    #[test]
    fn partial_dates_stay_text() {
        for json in [r#"[{"a": "2024"}]"#, r#"[{"a": "2024-10"}]"#] {
            assert_eq!(column_type(&frame(json), "a"), DataType::Utf8, "{json}");
        }
    }

    #[test]
    fn naive_timestamps_normalize_to_utc_micros() {
        let batch = frame(r#"[{"a": "2024-01-01T00:00:00"}, {"a": "2024-01-01T00:00:01"}]"#);
        assert_eq!(
            column_type(&batch, "a"),
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
        let micros = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(micros.value(0), 1_704_067_200_000_000);
        assert_eq!(micros.value(1), 1_704_067_201_000_000);
    }

    #[test]
    fn zone_aware_timestamps_may_mix_zulu_and_offsets() {
        let batch = frame(
            r#"[{"a": "2024-01-01T00:00:00Z"}, {"a": "2024-01-01T01:00:00+01:00"}]"#,
        );
        let micros = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        // Both are the same instant once normalized.
        assert_eq!(micros.value(0), micros.value(1));
    }

    #[test]
    fn fractional_seconds() {
        let batch = frame(r#"[{"a": "2024-01-01T00:00:00.250Z"}]"#);
        let micros = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(micros.value(0), 1_704_067_200_250_000);
    }

    #[test]
    fn mixed_timestamp_shapes_stay_text() {
        // Naive and zone-aware values in one column.
        let batch = frame(
            r#"[{"a": "2024-01-01T00:00:00"}, {"a": "2024-01-01T00:00:00+01:00"}]"#,
        );
        assert_eq!(column_type(&batch, "a"), DataType::Utf8);
        // Fractional and non-fractional values in one column.
        let batch = frame(
            r#"[{"a": "2024-01-01T00:00:00.5"}, {"a": "2024-01-01T00:00:00"}]"#,
        );
        assert_eq!(column_type(&batch, "a"), DataType::Utf8);
    }

    #[test]
    fn dates_mixed_with_timestamps_stay_text() {
        let batch = frame(r#"[{"a": "2024-10-01"}, {"a": "2024-10-01T00:00:00"}]"#);
        assert_eq!(column_type(&batch, "a"), DataType::Utf8);
    }

    #[test]
    fn out_of_range_dates_stay_text() {
        // Matches the pattern but is not a calendar date.
        let batch = frame(r#"[{"a": "2024-13-45"}]"#);
        assert_eq!(column_type(&batch, "a"), DataType::Utf8);
    }

    #[test]
    fn mixed_scalar_types_are_rejected() {
        let err = frame_from_rows(&rows(r#"[{"a": 1}, {"a": "2"}]"#)).unwrap_err();
        match err {
            UploadError::InvalidType { columns } => assert_eq!(columns, vec!["a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = frame_from_rows(&rows(r#"[{"a": {"nested": 1}}]"#)).unwrap_err();
        assert!(matches!(err, UploadError::InvalidType { .. }));
    }

    #[test]
    fn all_offending_columns_are_named() {
        let err =
            frame_from_rows(&rows(r#"[{"a": 1, "b": true}, {"a": "x", "b": 2}]"#)).unwrap_err();
        match err {
            UploadError::InvalidType { columns } => assert_eq!(columns, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn inference_is_deterministic() {
        let json = r#"[{"b": 1, "a": "x"}, {"a": "y", "b": 2, "c": 1.5}]"#;
        let first = frame(json);
        let second = frame(json);
        assert_eq!(first, second);
        // First-seen column order is preserved.
        let schema = first.schema();
        let names: Vec<&str> = schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
