//! Dashboard Frame Codec
//!
//! Decodes WebSocket text frames into typed [`InboundMessage`]s. Decoding is
//! two steps: JSON parsing, then structural validation of the decoded value.
//! Neither step has side effects.
//!
//! # Envelopes
//!
//! ```json
//! {"type":"initial","data":{"timeSeries":[...],"barData":[...],"heatmapData":[...]}}
//! {"type":"update","data":{"timeSeries":[{"date":"2023-01-05","revenue":1200}]}}
//! ```
//!
//! An object without `type` is a legacy frame and must be a full snapshot.
//!
//! # Errors
//!
//! Validation failures name the first offending field as a path rooted at the
//! frame, e.g. `data.timeSeries[2].revenue: expected number, found string`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::error::{AppError, ErrorCode};
use crate::domain::snapshot::{
    BarEntry, BarValue, HeatmapCell, InboundMessage, KNOWN_METRICS, PartialSnapshot, Snapshot,
    TimeSeriesPoint,
};

// =============================================================================
// Error Type
// =============================================================================

/// Structural validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Required field is absent.
    #[error("{path}: required field is missing")]
    Missing {
        /// Field path.
        path: String,
    },

    /// Field has the wrong JSON type.
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Field path.
        path: String,
        /// Expected JSON type.
        expected: &'static str,
        /// Actual JSON type.
        found: &'static str,
    },

    /// Required string holds the literal text `"null"`.
    #[error("{path}: string must not be \"null\"")]
    NullString {
        /// Field path.
        path: String,
    },

    /// Envelope `type` is not a known message kind.
    #[error("{path}: unknown message type \"{value}\"")]
    UnknownType {
        /// Field path.
        path: String,
        /// Received type.
        value: String,
    },

    /// `update` carries none of the snapshot collections.
    #[error("{path}: update carries no timeSeries, barData or heatmapData")]
    EmptyUpdate {
        /// Field path.
        path: String,
    },
}

impl ValidationError {
    /// Path of the offending field.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Missing { path }
            | Self::TypeMismatch { path, .. }
            | Self::NullString { path }
            | Self::UnknownType { path, .. }
            | Self::EmptyUpdate { path } => path,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err.to_string()).with_source(err)
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Parse and validate one text frame.
///
/// # Errors
///
/// `WS_PARSE_ERROR` (WebSocket kind) when the text is not JSON, with the
/// parser error chained; `VALIDATION_ERROR` when the shape is wrong.
pub fn decode_text(text: &str) -> Result<InboundMessage, AppError> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        AppError::websocket("Error parsing received data")
            .with_code(ErrorCode::WsParse)
            .with_source(e)
    })?;

    Ok(decode_message(&value)?)
}

/// Validate an already-parsed frame.
///
/// # Errors
///
/// Returns the first structural violation found.
pub fn decode_message(value: &Value) -> Result<InboundMessage, ValidationError> {
    let root = Path::root();
    let frame = expect_object(value, &root)?;

    let Some(kind) = frame.get("type") else {
        return decode_snapshot(frame, &root).map(InboundMessage::Legacy);
    };

    let type_path = root.field("type");
    let kind = kind.as_str().ok_or_else(|| mismatch(&type_path, "string", kind))?;

    let data_path = root.field("data");
    let data = frame
        .get("data")
        .ok_or_else(|| data_path.missing())
        .and_then(|data| expect_object(data, &data_path))?;

    match kind {
        "initial" => decode_snapshot(data, &data_path).map(InboundMessage::Initial),
        "update" => decode_partial(data, &data_path).map(InboundMessage::Update),
        other => Err(ValidationError::UnknownType {
            path: type_path.to_string(),
            value: other.to_string(),
        }),
    }
}

fn decode_snapshot(data: &Map<String, Value>, path: &Path) -> Result<Snapshot, ValidationError> {
    Ok(Snapshot {
        time_series: required_array(data, path, "timeSeries", decode_point)?,
        bar_data: required_array(data, path, "barData", decode_bar)?,
        heatmap_data: required_array(data, path, "heatmapData", decode_cell)?,
    })
}

fn decode_partial(
    data: &Map<String, Value>,
    path: &Path,
) -> Result<PartialSnapshot, ValidationError> {
    let partial = PartialSnapshot {
        time_series: optional_array(data, path, "timeSeries", decode_point)?,
        bar_data: optional_array(data, path, "barData", decode_bar)?,
        heatmap_data: optional_array(data, path, "heatmapData", decode_cell)?,
    };

    if partial.is_empty() {
        return Err(ValidationError::EmptyUpdate {
            path: path.to_string(),
        });
    }
    Ok(partial)
}

// =============================================================================
// Element Validators
// =============================================================================

fn decode_point(value: &Value, path: &Path) -> Result<TimeSeriesPoint, ValidationError> {
    let obj = expect_object(value, path)?;
    let date = required_string(obj, path, "date")?;

    let mut values = BTreeMap::new();
    for (key, field) in obj {
        if key == "date" {
            continue;
        }
        match field {
            Value::Number(_) => {
                values.insert(key.clone(), field.as_f64());
            }
            Value::Null => {
                values.insert(key.clone(), None);
            }
            _ if KNOWN_METRICS.contains(&key.as_str()) => {
                return Err(mismatch(&path.field(key), "number", field));
            }
            // Unknown non-numeric fields are ignored.
            _ => {}
        }
    }

    Ok(TimeSeriesPoint { date, values })
}

fn decode_bar(value: &Value, path: &Path) -> Result<BarEntry, ValidationError> {
    let obj = expect_object(value, path)?;
    let name = required_string(obj, path, "name")?;

    let mut values = BTreeMap::new();
    for (key, field) in obj {
        if key == "name" {
            continue;
        }
        let field_path = path.field(key);
        match field {
            Value::Number(n) => {
                if let Some(v) = n.as_f64() {
                    values.insert(key.clone(), BarValue::Number(v));
                }
            }
            Value::Null => {}
            Value::String(_) if KNOWN_METRICS.contains(&key.as_str()) => {
                return Err(mismatch(&field_path, "number", field));
            }
            Value::String(s) if s == "null" => {
                return Err(ValidationError::NullString {
                    path: field_path.to_string(),
                });
            }
            Value::String(s) => {
                values.insert(key.clone(), BarValue::Label(s.clone()));
            }
            _ => return Err(mismatch(&field_path, "number or string", field)),
        }
    }

    Ok(BarEntry { name, values })
}

fn decode_cell(value: &Value, path: &Path) -> Result<HeatmapCell, ValidationError> {
    let obj = expect_object(value, path)?;
    let x = required_string(obj, path, "x")?;
    let y = required_string(obj, path, "y")?;

    let value_path = path.field("value");
    let value = match obj.get("value") {
        None => return Err(value_path.missing()),
        Some(v) => v.as_f64().ok_or_else(|| mismatch(&value_path, "number", v))?,
    };

    Ok(HeatmapCell { x, y, value })
}

// =============================================================================
// Helpers
// =============================================================================

fn required_array<T>(
    obj: &Map<String, Value>,
    parent: &Path,
    key: &str,
    decode: fn(&Value, &Path) -> Result<T, ValidationError>,
) -> Result<Vec<T>, ValidationError> {
    let path = parent.field(key);
    obj.get(key)
        .ok_or_else(|| path.missing())
        .and_then(|v| decode_array(v, &path, decode))
}

fn optional_array<T>(
    obj: &Map<String, Value>,
    parent: &Path,
    key: &str,
    decode: fn(&Value, &Path) -> Result<T, ValidationError>,
) -> Result<Option<Vec<T>>, ValidationError> {
    obj.get(key)
        .map(|v| decode_array(v, &parent.field(key), decode))
        .transpose()
}

fn decode_array<T>(
    value: &Value,
    path: &Path,
    decode: fn(&Value, &Path) -> Result<T, ValidationError>,
) -> Result<Vec<T>, ValidationError> {
    let items = value.as_array().ok_or_else(|| mismatch(path, "array", value))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| decode(item, &path.index(i)))
        .collect()
}

fn required_string(
    obj: &Map<String, Value>,
    parent: &Path,
    key: &str,
) -> Result<String, ValidationError> {
    let path = parent.field(key);
    match obj.get(key) {
        None => Err(path.missing()),
        Some(Value::String(s)) if s == "null" => Err(ValidationError::NullString {
            path: path.to_string(),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(mismatch(&path, "string", other)),
    }
}

fn expect_object<'a>(
    value: &'a Value,
    path: &Path,
) -> Result<&'a Map<String, Value>, ValidationError> {
    value.as_object().ok_or_else(|| mismatch(path, "object", value))
}

fn mismatch(path: &Path, expected: &'static str, found: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: json_type(found),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Dotted field path; empty renders as `$`.
#[derive(Debug, Clone, Default)]
struct Path(String);

impl Path {
    const fn root() -> Self {
        Self(String::new())
    }

    fn field(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self(key.to_string())
        } else {
            Self(format!("{}.{key}", self.0))
        }
    }

    fn index(&self, i: usize) -> Self {
        Self(format!("{}[{i}]", self.0))
    }

    fn missing(&self) -> ValidationError {
        ValidationError::Missing {
            path: self.to_string(),
        }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("$")
        } else {
            f.write_str(&self.0)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::error::Error as _;
    use test_case::test_case;

    fn full_data() -> Value {
        json!({
            "timeSeries": [
                {"date": "2023-01-01", "revenue": 1000, "users": 50, "conversion": 2.5},
                {"date": "2023-01-02", "revenue": null}
            ],
            "barData": [{"name": "Ene", "revenue": 4000, "users": 2400}],
            "heatmapData": [{"x": "00-04", "y": "Producto A", "value": 12}]
        })
    }

    #[test]
    fn initial_envelope_decodes() {
        let frame = json!({"type": "initial", "data": full_data()});
        let InboundMessage::Initial(snapshot) = decode_message(&frame).unwrap() else {
            panic!("expected initial");
        };

        assert_eq!(snapshot.time_series.len(), 2);
        assert_eq!(snapshot.time_series[0].value("conversion"), Some(2.5));
        assert_eq!(snapshot.time_series[1].values.get("revenue"), Some(&None));
        assert_eq!(snapshot.bar_data[0].value("users"), Some(2400.0));
        assert!((snapshot.heatmap_data[0].value - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn legacy_frame_is_full_snapshot() {
        let msg = decode_message(&full_data()).unwrap();
        assert_eq!(msg.kind(), "legacy");
    }

    #[test]
    fn legacy_frame_requires_all_collections() {
        let err = decode_message(&json!({"timeSeries": []})).unwrap_err();
        assert_eq!(err, ValidationError::Missing { path: "barData".into() });
    }

    #[test]
    fn update_with_time_series_only() {
        let frame = json!({
            "type": "update",
            "data": {"timeSeries": [{"date": "2023-01-05", "revenue": 1200}]}
        });
        let InboundMessage::Update(partial) = decode_message(&frame).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(partial.time_series.map(|p| p.len()), Some(1));
        assert!(partial.bar_data.is_none());
    }

    #[test]
    fn update_without_collections_is_rejected() {
        let err = decode_message(&json!({"type": "update", "data": {}})).unwrap_err();
        assert_eq!(err, ValidationError::EmptyUpdate { path: "data".into() });
    }

    #[test]
    fn reports_first_failing_element_with_index() {
        let frame = json!({
            "type": "update",
            "data": {"timeSeries": [
                {"date": "2023-01-01"},
                {"date": "2023-01-02"},
                {"date": "2023-01-03", "revenue": "lots"},
                {"date": 4}
            ]}
        });
        let err = decode_message(&frame).unwrap_err();
        assert_eq!(
            err.to_string(),
            "data.timeSeries[2].revenue: expected number, found string"
        );
    }

    #[test]
    fn unknown_time_series_fields() {
        let frame = json!({
            "type": "update",
            "data": {"timeSeries": [{"date": "d", "sessions": 7, "note": "x", "flag": true}]}
        });
        let InboundMessage::Update(partial) = decode_message(&frame).unwrap() else {
            panic!("expected update");
        };
        let point = &partial.time_series.unwrap()[0];
        assert_eq!(point.value("sessions"), Some(7.0));
        assert!(!point.values.contains_key("note"));
        assert!(!point.values.contains_key("flag"));
    }

    #[test]
    fn bar_values_accept_labels_and_drop_nulls() {
        let frame = json!({
            "type": "update",
            "data": {"barData": [{"name": "Q1", "label": "peak", "revenue": null}]}
        });
        let InboundMessage::Update(partial) = decode_message(&frame).unwrap() else {
            panic!("expected update");
        };
        let bar = &partial.bar_data.unwrap()[0];
        assert_eq!(bar.values.get("label"), Some(&BarValue::Label("peak".into())));
        assert!(!bar.values.contains_key("revenue"));
    }

    #[test_case(json!({"type": "initial", "data": {"timeSeries": [{}], "barData": [], "heatmapData": []}}), "data.timeSeries[0].date" ; "missing date")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [{"name": 3}], "heatmapData": []}}), "data.barData[0].name" ; "numeric bar name")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [{"name": "a", "users": "many"}], "heatmapData": []}}), "data.barData[0].users" ; "string known bar metric")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [], "heatmapData": [{"x": "a", "y": "b"}]}}), "data.heatmapData[0].value" ; "missing heatmap value")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [], "heatmapData": [{"x": "a", "y": "b", "value": null}]}}), "data.heatmapData[0].value" ; "null heatmap value")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": {}, "barData": [], "heatmapData": []}}), "data.timeSeries" ; "object instead of array")]
    #[test_case(json!({"type": "initial", "data": []}), "data" ; "array data")]
    #[test_case(json!({"type": "initial"}), "data" ; "missing data")]
    #[test_case(json!({"type": 1, "data": {}}), "type" ; "numeric type")]
    #[test_case(json!({"type": "snapshot", "data": {}}), "type" ; "unknown type")]
    #[test_case(json!([1, 2]), "$" ; "non object frame")]
    fn rejects_with_path(frame: Value, path: &str) {
        let err = decode_message(&frame).unwrap_err();
        assert_eq!(err.path(), path, "{err}");
    }

    #[test_case(json!({"type": "initial", "data": {"timeSeries": [{"date": "null"}], "barData": [], "heatmapData": []}}), "data.timeSeries[0].date" ; "time series date")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [{"name": "null"}], "heatmapData": []}}), "data.barData[0].name" ; "bar name")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [{"name": "a", "label": "null"}], "heatmapData": []}}), "data.barData[0].label" ; "bar label")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [], "heatmapData": [{"x": "null", "y": "b", "value": 1}]}}), "data.heatmapData[0].x" ; "heatmap x")]
    #[test_case(json!({"type": "initial", "data": {"timeSeries": [], "barData": [], "heatmapData": [{"x": "a", "y": "null", "value": 1}]}}), "data.heatmapData[0].y" ; "heatmap y")]
    fn rejects_literal_null_string(frame: Value, path: &str) {
        let err = decode_message(&frame).unwrap_err();
        assert!(matches!(err, ValidationError::NullString { .. }), "{err}");
        assert_eq!(err.path(), path);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = decode_text("{not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::WsParse);
        assert!(err.is_websocket());
        assert!(err.source().is_some());
    }

    #[test]
    fn shape_error_is_validation_error() {
        let err = decode_text(r#"{"type":"update","data":{}}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(err.is_validation());
        assert!(err.message().contains("update carries no"));
    }
}
