use serde::{Deserialize, Serialize};

/// Broker connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// How long start-up waits for the first ConnAck.
    pub connect_timeout_secs: u64,
    /// Pause between reconnect attempts after a transport error.
    pub reconnect_delay_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "selfmon-bridge".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 5,
            reconnect_delay_ms: 1000,
        }
    }
}
