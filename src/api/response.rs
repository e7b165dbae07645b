use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Application-level status codes known to be returned inside an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ResponseCode {
    Success = 0,
    /// API credit limit reached, try again later
    RateLimited = 424,
    /// Resource is not accessible, e.g. history before the system was installed
    AccessRestricted = 1201,
}

/// Outer object every server response is wrapped in.
///
/// Non-zero `code` is not an error on its own: callers that care about it (rate limiting,
/// restricted history ranges) inspect it through [`Envelope::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: i64,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Known classification of `code`, `None` for codes not listed in [`ResponseCode`].
    pub fn status(&self) -> Option<ResponseCode> {
        num::FromPrimitive::from_i64(self.code)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(ResponseCode::Success)
    }

    /// Decoded `data`, see [`unwrap_data`].
    pub fn data(&self) -> Value {
        unwrap_data(self.data.clone())
    }

    pub fn into_data(self) -> Value {
        unwrap_data(self.data)
    }

    /// Short `code: msg` description used in error reports.
    pub fn describe(&self) -> String {
        format!(
            "code {}: {}",
            self.code,
            self.msg.as_deref().unwrap_or("(no message received)")
        )
    }
}

/// `data` is often a JSON document encoded as a string. Textual values are decoded once more,
/// falling back to the raw text if it is not JSON. Anything else is returned as-is.
pub fn unwrap_data(data: Value) -> Value {
    match data {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
