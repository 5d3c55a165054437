use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Logical channel names. Every channel of the mission is opened under one of these.
pub const OPERATOR_CHANNEL: &str = "operator";
pub const FLIGHT_CHANNEL: &str = "flight";
pub const GUIDANCE_CHANNEL: &str = "guidance";
pub const PERCEPTION_CHANNEL: &str = "perception";

const DEFAULT_OPERATOR_ENDPOINT: &str = "listen://0.0.0.0:1337";
const DEFAULT_FLIGHT_ENDPOINT: &str = "unix:///tmp/mission/flight.sock";
const DEFAULT_GUIDANCE_ENDPOINT: &str = "unix:///tmp/mission/guidance.sock";
const DEFAULT_PERCEPTION_ENDPOINT: &str = "unix:///tmp/mission/perception.sock";
const DEFAULT_DATA_DIR: &str = "./mission-data";
const DEFAULT_RETRY_MS: u64 = 500;

/// Host-supplied settings of the mission: where each channel points, where persistent state
/// lives and how often links retry.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    pub operator_endpoint: String,
    pub flight_endpoint: String,
    pub guidance_endpoint: String,
    pub perception_endpoint: String,
    pub data_dir: PathBuf,
    pub retry_interval: Duration,
}

impl MissionConfig {
    /// Reads the configuration from `MISSION_*` environment variables, falling back to the
    /// defaults for unset ones. An unparsable `MISSION_RETRY_MS` falls back too.
    pub fn from_env() -> Self {
        let var = |key: &str, default: &str| env::var(key).unwrap_or_else(|_| default.to_string());
        let retry_ms = env::var("MISSION_RETRY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_MS);
        Self {
            operator_endpoint: var("MISSION_OPERATOR_ENDPOINT", DEFAULT_OPERATOR_ENDPOINT),
            flight_endpoint: var("MISSION_FLIGHT_ENDPOINT", DEFAULT_FLIGHT_ENDPOINT),
            guidance_endpoint: var("MISSION_GUIDANCE_ENDPOINT", DEFAULT_GUIDANCE_ENDPOINT),
            perception_endpoint: var("MISSION_PERCEPTION_ENDPOINT", DEFAULT_PERCEPTION_ENDPOINT),
            data_dir: PathBuf::from(var("MISSION_DATA_DIR", DEFAULT_DATA_DIR)),
            retry_interval: Duration::from_millis(retry_ms),
        }
    }

    /// Endpoint configured for the channel `name`.
    pub fn endpoint(&self, name: &str) -> Option<&str> {
        match name {
            OPERATOR_CHANNEL => Some(&self.operator_endpoint),
            FLIGHT_CHANNEL => Some(&self.flight_endpoint),
            GUIDANCE_CHANNEL => Some(&self.guidance_endpoint),
            PERCEPTION_CHANNEL => Some(&self.perception_endpoint),
            _ => None,
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            operator_endpoint: DEFAULT_OPERATOR_ENDPOINT.to_string(),
            flight_endpoint: DEFAULT_FLIGHT_ENDPOINT.to_string(),
            guidance_endpoint: DEFAULT_GUIDANCE_ENDPOINT.to_string(),
            perception_endpoint: DEFAULT_PERCEPTION_ENDPOINT.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_MS),
        }
    }
}
