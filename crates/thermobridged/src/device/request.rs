//! Request construction for the remote device.
//!
//! A [`DeviceRequest`] is a plain descriptor of one HTTP exchange. Building it
//! is pure: every endpoint/value combination yields a request, and the
//! encoding strategy is selected by the endpoint's [`ContentType`].

use reqwest::Method;

use super::endpoint::{ContentType, Endpoint};

/// Fallback key for json/form bodies when the endpoint has no `body_key`.
const DEFAULT_BODY_KEY: &str = "value";

/// A fully described HTTP request, ready for a transport to execute.
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl DeviceRequest {
    /// Build a request for `endpoint`, optionally carrying a numeric value.
    ///
    /// GET requests never carry a body; the value, if any, goes into the
    /// query string instead.
    pub fn build(endpoint: &Endpoint, value: Option<f64>) -> Self {
        let key = endpoint.body_key.as_deref().unwrap_or(DEFAULT_BODY_KEY);

        let mut url = endpoint.url.clone();
        let mut body = None;

        match value {
            Some(value) if endpoint.method == Method::GET => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair(key, &format_number(value))
                    .finish();
                let separator = if url.contains('?') { '&' } else { '?' };
                url.push(separator);
                url.push_str(&query);
            }
            Some(value) => {
                body = Some(encode_body(endpoint.content_type, key, value));
            }
            None => {}
        }

        let mut headers = vec![("Content-Type", endpoint.content_type.to_string())];
        if let Some(token) = &endpoint.token {
            headers.push(("Authorization", format!("Bearer {token}")));
        }

        Self {
            url,
            method: endpoint.method.clone(),
            headers,
            body,
        }
    }
}

fn encode_body(content_type: ContentType, key: &str, value: f64) -> String {
    match content_type {
        ContentType::Json => {
            let mut object = serde_json::Map::new();
            object.insert(key.to_string(), json_number(value));
            serde_json::Value::Object(object).to_string()
        }
        ContentType::FormUrlencoded => url::form_urlencoded::Serializer::new(String::new())
            .append_pair(key, &format_number(value))
            .finish(),
        ContentType::Plain => format_number(value),
    }
}

/// Whole-valued temperatures encode without a decimal point, matching the
/// dynamically typed encoding the device expects (`21`, not `21.0`).
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

fn json_number(value: f64) -> serde_json::Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Value::from(value)
    }
}
