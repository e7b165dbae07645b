use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

type Watts = f64;

/// Provider-defined realtime fields, passed through unchanged.
pub type Telemetry = Map<String, Value>;

/// Client session for a single account.
///
/// The session moves from [`SessionState::Unauthenticated`] to [`SessionState::Authenticated`]
/// on a successful `login()` and never goes back; dropping the value ends the session.
/// Enumeration calls cache context for later calls:
///
/// - `list_systems()` caches the first system's id whenever it returns a non-empty list.
/// - `list_devices()` caches the first inverter's serial number, only if none is cached yet.
///
/// Neither cache is ever cleared by an empty or failed response.
pub struct Api {
    pub(crate) base_url: String,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) access_token: Option<String>,
    pub(crate) system_id: Option<String>,
    pub(crate) inverter_serial_number: Option<String>,
    pub(crate) client: reqwest::Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

impl Api {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn inverter_serial_number(&self) -> Option<&str> {
        self.inverter_serial_number.as_deref()
    }

    pub fn state(&self) -> SessionState {
        match self.access_token {
            Some(_) => SessionState::Authenticated,
            None => SessionState::Unauthenticated,
        }
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"********")
            .field("access_token", &self.access_token.as_ref().map(|_| "********"))
            .field("system_id", &self.system_id)
            .field("inverter_serial_number", &self.inverter_serial_number)
            .finish()
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth_status = match self.state() {
            SessionState::Authenticated => "authenticated",
            SessionState::Unauthenticated => "not authenticated",
        };
        match &self.system_id {
            Some(system_id) => write!(
                f,
                "SigenApi(base_url={}, {}, system_id={})",
                self.base_url, auth_status, system_id
            ),
            None => write!(
                f,
                "SigenApi(base_url={}, {}, no system)",
                self.base_url, auth_status
            ),
        }
    }
}

/// Monitored installation. Fields not listed here are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Physical component of a system. Fields not listed here are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    pub fn is_inverter(&self) -> bool {
        self.device_type
            .as_deref()
            .map_or(false, |t| t.eq_ignore_ascii_case("Inverter"))
    }
}

/// Historical data: depending on the query the server returns either a bare list of points
/// or a report object carrying them in `itemList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum History {
    Series(Vec<Value>),
    Report(Telemetry),
}

impl History {
    pub fn points(&self) -> &[Value] {
        match self {
            History::Series(points) => points,
            History::Report(report) => report
                .get("itemList")
                .and_then(Value::as_array)
                .map_or(&[][..], Vec::as_slice),
        }
    }
}

/// Identifiers are documented as strings but some accounts return plain numbers.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number identifier, got {}",
            other
        ))),
    }
}

fn as_watts(value: &Value) -> Option<Watts> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Keep only power-related fields of `flow` (key contains "power" or "watt", any case),
/// converting numeric-looking values (and booleans) to floats. Other values stay unchanged.
pub fn power_flow(flow: &Telemetry) -> Telemetry {
    flow.iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            key.contains("power") || key.contains("watt")
        })
        .map(|(key, value)| {
            let value = as_watts(value)
                .and_then(Number::from_f64)
                .map_or_else(|| value.clone(), Value::Number);
            (key.clone(), value)
        })
        .collect()
}

/// Some inverters report `pvPower` as zero while actually producing. In that case solar
/// production is reconstructed from the other flows (grid export, battery charge and
/// consumers are positive). Returns `None` when `pvPower` is non-zero, the sum is not positive,
/// or any of the flows is not numeric.
pub fn calculated_solar_power(flow: &Telemetry) -> Option<Watts> {
    let field = |key: &str| flow.get(key).map_or(Some(0.0), as_watts);

    if field("pvPower")? != 0.0 {
        return None;
    }

    let total = [
        "gridPower",
        "batteryPower",
        "loadPower",
        "evPower",
        "heatPumpPower",
    ]
    .iter()
    .map(|key| field(key))
    .sum::<Option<Watts>>()?;

    if total > 0.0 {
        Some(total)
    } else {
        None
    }
}
