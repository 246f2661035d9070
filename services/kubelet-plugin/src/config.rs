use std::path::PathBuf;

use anyhow::{Context, Result};
use fakedra_proto::DEFAULT_MAX_MESSAGE_SIZE;

use crate::emulator::DEFAULT_DEVICE_COUNT;

#[derive(Debug, Clone)]
pub struct Config {
    /// Name of this node. Seeds the device inventory.
    pub node_name: String,
    pub namespace: String,
    pub state_db: PathBuf,
    pub cdi_root: PathBuf,
    pub socket_path: PathBuf,
    pub device_count: usize,
    pub retry_attempts: u32,
    /// Largest request the socket accepts, in bytes.
    pub max_message_size: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let node_name = std::env::var("NODE_NAME").context("NODE_NAME must be set")?;

        let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string());

        let state_db = std::env::var("FAKEDRA_STATE_DB")
            .unwrap_or_else(|_| "/var/lib/fake-dra/nodestate.db".to_string())
            .into();

        let cdi_root = std::env::var("FAKEDRA_CDI_ROOT")
            .unwrap_or_else(|_| "/etc/cdi".to_string())
            .into();

        let socket_path = std::env::var("FAKEDRA_PLUGIN_SOCKET")
            .unwrap_or_else(|_| {
                "/var/lib/kubelet/plugins/fake.resource.3-shake.com/plugin.sock".to_string()
            })
            .into();

        let device_count = std::env::var("FAKEDRA_DEVICE_COUNT")
            .unwrap_or_else(|_| DEFAULT_DEVICE_COUNT.to_string())
            .parse()?;

        let retry_attempts = std::env::var("FAKEDRA_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        let max_message_size = std::env::var("FAKEDRA_MAX_MESSAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_MAX_MESSAGE_SIZE.to_string())
            .parse()?;

        let log_level = std::env::var("FAKEDRA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            node_name,
            namespace,
            state_db,
            cdi_root,
            socket_path,
            device_count,
            retry_attempts,
            max_message_size,
            log_level,
        })
    }
}
