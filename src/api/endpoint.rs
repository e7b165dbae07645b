pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/openapi/auth/login/password";
pub const SYSTEMS: &Endpoint = "/openapi/system";

pub fn devices(system_id: &str) -> String {
    format!("/openapi/system/{}/devices", system_id)
}

pub fn summary(system_id: &str) -> String {
    format!("/openapi/systems/{}/summary", system_id)
}

pub fn energy_flow(system_id: &str) -> String {
    format!("/openapi/systems/{}/energyFlow", system_id)
}

pub fn device_realtime_info(system_id: &str, serial_number: &str) -> String {
    format!(
        "/openapi/systems/{}/devices/{}/realtimeInfo",
        system_id, serial_number
    )
}

pub fn history(system_id: &str) -> String {
    format!("/openapi/systems/{}/history", system_id)
}
