use std::path::PathBuf;

use anyhow::Result;
use fakedra_proto::DEFAULT_MAX_MESSAGE_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub namespace: String,
    /// SQLite file holding NodeAllocationState records, shared with the
    /// kubelet plugins.
    pub state_db: PathBuf,
    /// Optional JSON document of parameter objects.
    pub parameters_file: Option<PathBuf>,
    pub socket_path: PathBuf,
    pub workers: usize,
    pub retry_attempts: u32,
    /// Largest request the socket accepts, in bytes.
    pub max_message_size: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string());

        let state_db = std::env::var("FAKEDRA_STATE_DB")
            .unwrap_or_else(|_| "/var/lib/fake-dra/nodestate.db".to_string())
            .into();

        let parameters_file = std::env::var("FAKEDRA_PARAMETERS_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let socket_path = std::env::var("FAKEDRA_CONTROLLER_SOCKET")
            .unwrap_or_else(|_| "/run/fake-dra/controller.sock".to_string())
            .into();

        let workers = std::env::var("FAKEDRA_WORKERS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;

        let retry_attempts = std::env::var("FAKEDRA_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        let max_message_size = std::env::var("FAKEDRA_MAX_MESSAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_MAX_MESSAGE_SIZE.to_string())
            .parse()?;

        let log_level = std::env::var("FAKEDRA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            namespace,
            state_db,
            parameters_file,
            socket_path,
            workers,
            retry_attempts,
            max_message_size,
            log_level,
        })
    }
}
