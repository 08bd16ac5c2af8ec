use reqwest::Method;
use serde::Deserialize;
use strum::Display;

/// Body encoding for an outbound device request.
///
/// The remote API is not consistent about what it accepts, so the encoding is
/// part of the endpoint descriptor. Configuration accepts both the short form
/// (`"json"`) and the full MIME type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display)]
pub enum ContentType {
    #[default]
    #[serde(rename = "json", alias = "application/json")]
    #[strum(serialize = "application/json")]
    Json,

    #[serde(
        rename = "form-urlencoded",
        alias = "form",
        alias = "application/x-www-form-urlencoded"
    )]
    #[strum(serialize = "application/x-www-form-urlencoded")]
    FormUrlencoded,

    #[serde(rename = "plain", alias = "text/plain")]
    #[strum(serialize = "text/plain")]
    Plain,
}

/// Descriptor for one remote device operation.
///
/// Built once from configuration and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub method: Method,

    /// Bearer token, passed through verbatim.
    pub token: Option<String>,

    pub content_type: ContentType,

    /// Key wrapping the value in json/form bodies. Defaults to `"value"`.
    pub body_key: Option<String>,
}

/// The set of device operations an accessory may have configured.
///
/// Any of these can be absent; the engine reports an unconfigured-endpoint
/// error when an operation needing one is invoked.
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub get_temperature: Option<Endpoint>,
    pub set_temperature: Option<Endpoint>,
    pub set_off: Option<Endpoint>,
}
