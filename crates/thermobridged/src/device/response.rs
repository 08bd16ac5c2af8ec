//! Tolerant parsing of device responses.
//!
//! The remote API's response shape is not fixed by contract, so temperature
//! extraction is a prioritized rule list over the parsed body rather than a
//! typed deserialization. An unrecognized shape yields a sentinel reading of
//! zero instead of a failure.

use serde_json::Value;

use super::transport::Payload;

/// Sentinel for "the exchange succeeded but the reading is unknown".
const UNKNOWN_READING: f64 = 0.0;

/// Extract a temperature from a response payload.
///
/// Rules, in order:
/// 1. an object with a `data` array: find the element whose `name` is
///    `"temp"` and parse its `value` field (number or numeric string),
/// 2. an object with a direct `temperature` number,
/// 3. anything else: the zero sentinel.
pub fn extract_temperature(payload: &Payload) -> f64 {
    let Payload::Json(body) = payload else {
        return UNKNOWN_READING;
    };

    if let Some(data) = body.get("data").and_then(Value::as_array) {
        return data
            .iter()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some("temp"))
            .and_then(|entry| entry.get("value"))
            .map(parse_reading)
            .unwrap_or(UNKNOWN_READING);
    }

    body.get("temperature")
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .unwrap_or(UNKNOWN_READING)
}

/// Detect an in-band device error.
///
/// Any response carrying a non-empty `error` field means the exchange failed
/// on the device side, regardless of HTTP status. Raw text payloads carry no
/// error indicator.
pub fn error_message(payload: &Payload) -> Option<String> {
    let Payload::Json(body) = payload else {
        return None;
    };

    match body.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) => (!message.is_empty()).then(|| message.clone()),
        Some(Value::Bool(flag)) => flag.then(|| "true".to_string()),
        Some(other) => Some(other.to_string()),
    }
}

fn parse_reading(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|reading| reading.is_finite())
        .unwrap_or(UNKNOWN_READING)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_data_array_with_numeric_value() {
        let payload = Payload::Json(json!({
            "data": [
                { "name": "hum", "value": 40 },
                { "name": "temp", "value": 21.5 },
            ]
        }));
        assert_eq!(extract_temperature(&payload), 21.5);
    }

    #[test]
    fn test_data_array_with_string_value() {
        let payload = Payload::Json(json!({ "data": [{ "name": "temp", "value": "19.5" }] }));
        assert_eq!(extract_temperature(&payload), 19.5);
    }

    #[test]
    fn test_data_array_without_temp_entry_yields_sentinel() {
        let payload = Payload::Json(json!({ "data": [{ "name": "hum", "value": 40 }] }));
        assert_eq!(extract_temperature(&payload), 0.0);
    }

    #[test]
    fn test_data_array_with_unparseable_value_yields_sentinel() {
        let payload = Payload::Json(json!({ "data": [{ "name": "temp", "value": "warm" }] }));
        assert_eq!(extract_temperature(&payload), 0.0);
    }

    #[test]
    fn test_flat_temperature_field() {
        let payload = Payload::Json(json!({ "temperature": 18.0 }));
        assert_eq!(extract_temperature(&payload), 18.0);
    }

    #[test]
    fn test_data_array_takes_priority_over_flat_field() {
        let payload = Payload::Json(json!({
            "data": [{ "name": "temp", "value": 21.0 }],
            "temperature": 99.0,
        }));
        assert_eq!(extract_temperature(&payload), 21.0);
    }

    #[test]
    fn test_unrecognized_shape_yields_sentinel() {
        assert_eq!(extract_temperature(&Payload::Json(json!({ "ok": true }))), 0.0);
        assert_eq!(extract_temperature(&Payload::Json(json!([1, 2, 3]))), 0.0);
    }

    #[test]
    fn test_text_payload_yields_sentinel() {
        assert_eq!(extract_temperature(&Payload::Text("21.5".to_string())), 0.0);
    }

    #[test]
    fn test_error_field_detected() {
        let payload = Payload::Json(json!({ "error": "offline" }));
        assert_eq!(error_message(&payload), Some("offline".to_string()));
    }

    #[test]
    fn test_empty_error_field_ignored() {
        let payload = Payload::Json(json!({ "error": "" }));
        assert_eq!(error_message(&payload), None);
    }

    #[test]
    fn test_absent_or_null_error_ignored() {
        assert_eq!(error_message(&Payload::Json(json!({ "status": "ok" }))), None);
        assert_eq!(error_message(&Payload::Json(json!({ "error": null }))), None);
    }

    #[test]
    fn test_text_payload_carries_no_error() {
        assert_eq!(error_message(&Payload::Text("error".to_string())), None);
    }
}
