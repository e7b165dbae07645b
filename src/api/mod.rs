pub mod endpoint;
pub mod error;
pub mod response;

use crate::model::{self, Device, History, System, Telemetry};
use chrono::{DateTime, FixedOffset};
pub use error::{Context, Error};
use reqwest::Method;
use response::Envelope;
use serde::de::DeserializeOwned;
use serde_json::Value;

use std::collections::HashMap;
use std::time::Duration;

/// Optional parameters of the history endpoint. Only parameters that are set are sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    /// e.g. `5min`, `hour`, `day`
    pub interval: Option<String>,
    /// Single day, `YYYY-MM-DD`
    pub date: Option<String>,
    pub level: Option<String>,
}

impl HistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_time(mut self, start_time: DateTime<FixedOffset>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn end_time(mut self, end_time: DateTime<FixedOffset>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Query string pairs, in a stable order. Unset parameters are omitted rather than
    /// sent empty.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start_time) = &self.start_time {
            pairs.push(("startTime", start_time.to_rfc3339()));
        }
        if let Some(end_time) = &self.end_time {
            pairs.push(("endTime", end_time.to_rfc3339()));
        }
        for (name, value) in [
            ("interval", &self.interval),
            ("date", &self.date),
            ("level", &self.level),
        ]
        .iter()
        {
            if let Some(value) = value {
                pairs.push((*name, value.clone()));
            }
        }
        pairs
    }
}

/// Explicit value wins over cached one; empty strings count as absent.
fn resolve<'a>(
    explicit: Option<&'a str>,
    cached: Option<&'a str>,
    context: Context,
) -> Result<&'a str, Error> {
    explicit
        .filter(|s| !s.is_empty())
        .or_else(|| cached.filter(|s| !s.is_empty()))
        .ok_or(Error::MissingContext(context))
}

/// Envelopes with a non-zero application code are handed back whole as `Error::Status`.
fn successful(envelope: Envelope) -> Result<Envelope, Error> {
    if envelope.is_success() {
        Ok(envelope)
    } else {
        log::debug!("API returned {}", envelope.describe());
        Err(Error::Status(envelope))
    }
}

/// Unwrap `envelope.data` of a successful envelope and deserialize it as `T`.
fn decode<T: DeserializeOwned>(endpoint: &str, envelope: Envelope) -> Result<T, Error> {
    let envelope = successful(envelope)?;
    serde_json::from_value(envelope.into_data()).map_err(|e| Error::malformed(endpoint, e))
}

fn decode_device(endpoint: &str, element: Value) -> Result<Device, Error> {
    match element {
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    }
    .map_err(|e| Error::malformed(endpoint, format!("invalid device: {}", e)))
}

impl model::Api {
    /// Build a client talking to `base_url`. `timeout` bounds every request.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InternalError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url, username, password))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            access_token: None,
            system_id: None,
            inverter_serial_number: None,
            client,
        }
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&HashMap<&str, &str>>,
    ) -> Result<Envelope, Error> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = self.client.request(method, url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response_text = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(error::map_api_err)?
            .text()
            .await
            .map_err(error::map_api_err)?;

        log::trace!(
            "endpoint: {}, query: {:?}, response_text: {}",
            endpoint,
            query,
            response_text
        );

        serde_json::from_str(&response_text).map_err(|e| Error::malformed(endpoint, e))
    }

    /// Issue a GET request and return the full envelope, without unwrapping `data` or
    /// interpreting `code`.
    pub async fn request(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope, Error> {
        self.send(Method::GET, endpoint, query, None).await
    }

    /// Authenticate with username and password, store and return the access token.
    pub async fn login(&mut self) -> Result<String, Error> {
        let request_body = HashMap::from([
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ]);

        let envelope = self
            .send(Method::POST, endpoint::LOGIN, &[], Some(&request_body))
            .await
            .map_err(|e| match e {
                Error::Transport { message, .. } => Error::Authentication(message),
                other => other,
            })?;

        let description = envelope.describe();
        let token = envelope
            .into_data()
            .get("accessToken")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                Error::Authentication(format!("no access token received ({})", description))
            })?;

        log::debug!("logged in as {}", self.username);
        self.access_token = Some(token.clone());
        Ok(token)
    }

    /// List all systems of the account. The first system's id is cached for later calls.
    /// `data: null` counts as an empty list.
    pub async fn list_systems(&mut self) -> Result<Vec<System>, Error> {
        let envelope = self.request(endpoint::SYSTEMS, &[]).await?;
        let systems = decode::<Option<Vec<System>>>(endpoint::SYSTEMS, envelope)?
            .unwrap_or_default();

        if let Some(first) = systems.first() {
            match &first.system_id {
                Some(system_id) => {
                    log::debug!("caching system id {}", system_id);
                    self.system_id = Some(system_id.clone());
                }
                None => log::warn!("first system has no `systemId`, keeping cached value"),
            }
        }

        Ok(systems)
    }

    /// List devices of `system_id` (or the cached system). Devices may arrive JSON-encoded
    /// one by one; each is decoded separately. The first inverter's serial number is cached
    /// unless one is cached already.
    pub async fn list_devices(&mut self, system_id: Option<&str>) -> Result<Vec<Device>, Error> {
        let system_id = resolve(system_id, self.system_id.as_deref(), Context::SystemId)?;
        let endpoint = endpoint::devices(system_id);

        let envelope = successful(self.request(&endpoint, &[]).await?)?;
        let elements = match envelope.data {
            Value::Array(elements) => elements,
            Value::Null => Vec::new(),
            other => {
                return Err(Error::malformed(
                    &endpoint,
                    format!("expected a list of devices, got {}", other),
                ))
            }
        };

        let devices = elements
            .into_iter()
            .map(|element| decode_device(&endpoint, element))
            .collect::<Result<Vec<Device>, Error>>()?;

        if self.inverter_serial_number.is_none() {
            if let Some(serial_number) = devices
                .iter()
                .filter(|device| device.is_inverter())
                .find_map(|device| device.serial_number.clone())
            {
                log::debug!("caching inverter serial number {}", serial_number);
                self.inverter_serial_number = Some(serial_number);
            }
        }

        Ok(devices)
    }

    async fn telemetry(&self, endpoint: &str) -> Result<Telemetry, Error> {
        let envelope = self.request(endpoint, &[]).await?;
        decode(endpoint, envelope)
    }

    /// Realtime summary of `system_id` (or the cached system).
    pub async fn get_system_summary(&self, system_id: Option<&str>) -> Result<Telemetry, Error> {
        let system_id = resolve(system_id, self.system_id.as_deref(), Context::SystemId)?;
        self.telemetry(&endpoint::summary(system_id)).await
    }

    /// Realtime energy flow of `system_id` (or the cached system).
    pub async fn get_energy_flow(&self, system_id: Option<&str>) -> Result<Telemetry, Error> {
        let system_id = resolve(system_id, self.system_id.as_deref(), Context::SystemId)?;
        self.telemetry(&endpoint::energy_flow(system_id)).await
    }

    /// Realtime info of a device, defaulting to the cached inverter of the cached system.
    pub async fn get_device_realtime_info(
        &self,
        serial_number: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Telemetry, Error> {
        let system_id = resolve(system_id, self.system_id.as_deref(), Context::SystemId)?;
        let serial_number = resolve(
            serial_number,
            self.inverter_serial_number.as_deref(),
            Context::DeviceSerial,
        )?;
        self.telemetry(&endpoint::device_realtime_info(system_id, serial_number))
            .await
    }

    pub async fn get_system_history(
        &self,
        system_id: Option<&str>,
        start_time: Option<DateTime<FixedOffset>>,
        end_time: Option<DateTime<FixedOffset>>,
        interval: Option<&str>,
    ) -> Result<History, Error> {
        let query = HistoryQuery {
            start_time,
            end_time,
            interval: interval.map(String::from),
            ..HistoryQuery::default()
        };
        self.get_system_history_query(system_id, &query).await
    }

    /// Historical data of `system_id` (or the cached system) for an arbitrary query.
    pub async fn get_system_history_query(
        &self,
        system_id: Option<&str>,
        query: &HistoryQuery,
    ) -> Result<History, Error> {
        let system_id = resolve(system_id, self.system_id.as_deref(), Context::SystemId)?;
        let endpoint = endpoint::history(system_id);
        let envelope = self.request(&endpoint, &query.to_pairs()).await?;
        decode(&endpoint, envelope)
    }

    /// Raw history envelope, for callers that need to tell rate limiting
    /// ([`response::ResponseCode::RateLimited`]) from restricted ranges.
    pub async fn history_envelope(
        &self,
        system_id: Option<&str>,
        query: &HistoryQuery,
    ) -> Result<Envelope, Error> {
        let system_id = resolve(system_id, self.system_id.as_deref(), Context::SystemId)?;
        self.request(&endpoint::history(system_id), &query.to_pairs())
            .await
    }

    /// Log in, list systems and, once a system is known, its devices.
    pub async fn initialize(&mut self) -> Result<&mut Self, Error> {
        self.login().await?;
        self.list_systems().await?;
        if self.system_id.is_some() {
            self.list_devices(None).await?;
        }
        Ok(self)
    }

    /// Power-related fields of the current energy flow, see [`model::power_flow`].
    pub async fn get_current_power_flow(
        &self,
        system_id: Option<&str>,
    ) -> Result<Telemetry, Error> {
        let flow = self.get_energy_flow(system_id).await?;
        Ok(model::power_flow(&flow))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Api;

    #[test]
    fn history_query_omits_unset_parameters() {
        let start = DateTime::parse_from_rfc3339("2025-10-31T00:00:00+11:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2025-11-01T00:00:00+11:00").unwrap();

        let pairs = HistoryQuery::new().start_time(start).end_time(end).to_pairs();

        assert_eq!(
            vec![
                ("startTime", String::from("2025-10-31T00:00:00+11:00")),
                ("endTime", String::from("2025-11-01T00:00:00+11:00")),
            ],
            pairs
        );
    }

    #[test]
    fn history_query_day_level() {
        let pairs = HistoryQuery::new().date("2025-10-31").level("day").to_pairs();
        assert_eq!(
            vec![
                ("date", String::from("2025-10-31")),
                ("level", String::from("day")),
            ],
            pairs
        );
        assert!(HistoryQuery::new().to_pairs().is_empty());
    }

    #[test]
    fn explicit_context_wins() {
        assert_eq!(
            "S2",
            resolve(Some("S2"), Some("S1"), Context::SystemId).unwrap()
        );
        assert_eq!("S1", resolve(None, Some("S1"), Context::SystemId).unwrap());
        assert_eq!("S1", resolve(Some(""), Some("S1"), Context::SystemId).unwrap());
        assert!(matches!(
            resolve(None, None, Context::DeviceSerial),
            Err(Error::MissingContext(Context::DeviceSerial))
        ));
    }

    #[test]
    fn device_elements_decode_transparently() {
        let encoded = decode_device(
            "devices",
            Value::String(String::from(
                r#"{"deviceType":"Inverter","serialNumber":"INV001"}"#,
            )),
        )
        .unwrap();
        let native = decode_device(
            "devices",
            serde_json::json!({"deviceType": "Inverter", "serialNumber": "INV001"}),
        )
        .unwrap();
        assert_eq!(encoded, native);

        assert!(matches!(
            decode_device("devices", Value::String(String::from("garbage"))),
            Err(Error::MalformedResponse { .. })
        ));
    }

    fn read_envelope(filename: &str) -> Envelope {
        let mut d = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push(format!("resources/test/{}", filename));
        serde_json::from_str(&std::fs::read_to_string(d).unwrap()).unwrap()
    }

    #[test]
    fn mixed_device_list() {
        let devices = match read_envelope("devices.json").data {
            Value::Array(elements) => elements
                .into_iter()
                .map(|element| decode_device("devices", element))
                .collect::<Result<Vec<_>, _>>()
                .unwrap(),
            other => panic!("unexpected data: {}", other),
        };

        assert_eq!(3, devices.len());
        assert!(devices[0].is_inverter());
        assert_eq!(Some("INV001"), devices[0].serial_number.as_deref());
        assert_eq!(serde_json::json!(5.0), devices[0].extra["ratedPower"]);
        assert_eq!(Some("BAT001"), devices[1].serial_number.as_deref());
    }

    #[test]
    fn energy_flow_telemetry() {
        let flow: Telemetry = decode("energyFlow", read_envelope("energy_flow.json")).unwrap();
        assert_eq!(9, flow.len());

        let power = model::power_flow(&flow);
        assert_eq!(7, power.len());
        assert_eq!(serde_json::json!(3.25), power["pvPower"]);
        assert!(!power.contains_key("batterySoc"));
        assert_eq!(None, model::calculated_solar_power(&flow));
    }

    #[test]
    fn telemetry_must_be_an_object() {
        let envelope: Envelope =
            serde_json::from_value(serde_json::json!({"code": 0, "data": [1, 2]})).unwrap();
        match decode::<Telemetry>("summary", envelope) {
            Err(Error::MalformedResponse { endpoint, .. }) => assert_eq!("summary", endpoint),
            other => panic!("expected MalformedResponse, got: {:?}", other),
        }
    }

    #[test]
    fn failing_code_returns_envelope() {
        let envelope: Envelope = serde_json::from_value(
            serde_json::json!({"code": 1201, "msg": "no access", "data": "{}"}),
        )
        .unwrap();
        match decode::<Telemetry>("energyFlow", envelope.clone()) {
            Err(Error::Status(returned)) => assert_eq!(envelope, returned),
            other => panic!("expected Status, got: {:?}", other),
        }
    }

    #[test]
    fn null_list_is_empty() {
        let envelope: Envelope =
            serde_json::from_value(serde_json::json!({"code": 0, "data": null})).unwrap();
        let systems = decode::<Option<Vec<System>>>("systems", envelope).unwrap();
        assert_eq!(None, systems);
    }

    #[test]
    fn debug_hides_credentials() {
        let mut api = Api::with_client(
            reqwest::Client::new(),
            "https://api-aus.sigencloud.com",
            "user",
            "hunter2",
        );
        api.access_token = Some(String::from("secret-token"));

        let debug = format!("{:?}", api);
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let api = Api::with_client(
            reqwest::Client::new(),
            "https://api-aus.sigencloud.com//",
            "user",
            "pass",
        );
        assert_eq!("https://api-aus.sigencloud.com", api.base_url());
        assert_eq!(model::SessionState::Unauthenticated, api.state());
        assert_eq!(
            "SigenApi(base_url=https://api-aus.sigencloud.com, not authenticated, no system)",
            api.to_string()
        );
    }
}
