//! Deserializable server/client configuration (§6, ambient).

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    pub location: PathBuf,
    pub alias: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub connect: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    pub inbox: PathBuf,
    #[serde(default)]
    pub subscriptions: Vec<String>,
}
