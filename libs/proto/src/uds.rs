//! gRPC over Unix domain sockets.

use std::io;
use std::path::{Path, PathBuf};

use hyper_util::rt::TokioIo;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tonic::transport::{Channel, Endpoint, Uri};

/// Placeholder authority; the connector ignores it and dials the socket.
const UDS_ENDPOINT: &str = "http://[::]:50051";

/// Bind `path`, creating its directory and replacing a stale socket file
/// left by a previous run.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}

/// Resolves once `shutdown` flips to true or its sender is dropped.
pub async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Open a channel to the server listening on `path`.
pub async fn connect(path: impl AsRef<Path>) -> Result<Channel, tonic::transport::Error> {
    let path: PathBuf = path.as_ref().to_path_buf();
    Endpoint::from_static(UDS_ENDPOINT)
        .connect_with_connector(tower::service_fn(move |_: Uri| {
            let path = path.clone();
            async move { Ok::<_, io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
        }))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("plugin.sock");

        drop(bind(&path).unwrap());
        assert!(path.exists());
        // The file outlives the listener; binding again must not fail
        let _listener = bind(&path).unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(shutdown_signal(rx));
        tx.send(true).unwrap();
        waiter.await.unwrap();

        // Already flipped before anyone waits
        let (tx, rx) = watch::channel(true);
        shutdown_signal(rx).await;
        drop(tx);

        // Sender gone
        let (tx, rx) = watch::channel(false);
        drop(tx);
        shutdown_signal(rx).await;
    }
}
