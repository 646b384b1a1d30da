//! Local socket transport between the CLI and the native-messaging host.
//!
//! The host side binds a filesystem unix socket; each CLI invocation connects,
//! issues its requests and disconnects. The browser side of the host always
//! uses stdin/stdout and needs no transport of its own.

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

/// Socket path used when nothing is configured.
///
/// `$XDG_RUNTIME_DIR/tabbridge.sock` when available (per-user, cleaned at logout),
/// otherwise `{temp_dir}/tabbridge-{user}.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join("tabbridge.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
    std::env::temp_dir().join(format!("tabbridge-{user}.sock"))
}

/// Listening socket owned by the host. Removes its socket file on drop.
pub struct SocketListener {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketListener {
    /// Bind at `path`, replacing a stale socket file left by a previous host.
    pub fn bind(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            tracing::debug!(path = %path.display(), "Removing stale socket");
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        tracing::debug!(path = %path.display(), "Bound socket");

        Ok(Self { path, listener })
    }

    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cleanup(&self) -> io::Result<()> {
        if self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Cleaning up socket");
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(error = %e, "Failed to cleanup socket");
        }
    }
}

/// Connect from the CLI side.
pub async fn connect(path: &Path) -> io::Result<UnixStream> {
    tracing::trace!(path = %path.display(), "Connecting to host socket");
    UnixStream::connect(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn listener_accepts_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");

        let listener = SocketListener::bind(&path).unwrap();
        assert!(path.exists());

        let accept = tokio::spawn(async move {
            let mut stream = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            listener
        });

        let mut client = connect(&path).await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let listener = accept.await.unwrap();
        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        std::fs::write(&path, b"stale").unwrap();

        let listener = SocketListener::bind(&path).unwrap();
        assert_eq!(listener.path(), path.as_path());
    }

    #[tokio::test]
    async fn connect_without_host_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = connect(&dir.path().join("missing.sock")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
