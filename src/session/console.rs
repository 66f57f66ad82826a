// The receiver's standard session handler
// (c) 2024 sendplz contributors

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use human_repr::HumanCount as _;
use tokio::io::{AsyncWriteExt as _, BufWriter};
use tracing::{debug, info, warn};
use wildmatch::WildMatch;

use super::{FileSink, ProtocolViolation, SessionHandler};
use crate::clipboard::Clipboard;
use crate::util::io::create_new_file;

/// Receiver settings shared by every session
pub struct ReceiverSettings {
    directory: PathBuf,
    allow: Vec<WildMatch>,
    clipboard: Arc<dyn Clipboard>,
}

impl std::fmt::Debug for ReceiverSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverSettings")
            .field("directory", &self.directory)
            .field("allow", &self.allow)
            .finish_non_exhaustive()
    }
}

impl ReceiverSettings {
    /// Constructor.
    ///
    /// `allow` are wildcard patterns (`*` and `?`) matched against the remote IP address.
    pub fn new<S: AsRef<str>>(
        directory: &Path,
        allow: &[S],
        clipboard: Arc<dyn Clipboard>,
    ) -> Self {
        Self {
            directory: directory.to_path_buf(),
            allow: allow.iter().map(|p| WildMatch::new(p.as_ref())).collect(),
            clipboard,
        }
    }

    fn allows(&self, remote: &SocketAddr) -> bool {
        let ip = remote.ip().to_string();
        self.allow.iter().any(|pattern| pattern.matches(&ip))
    }
}

/// Logs what happens, writes clipboard text to the local clipboard and files
/// into the destination directory.
#[derive(Debug)]
pub struct ConsoleHandler {
    settings: Arc<ReceiverSettings>,
    /// Set once authenticated
    remote: Option<SocketAddr>,
}

impl ConsoleHandler {
    /// Creates a handler for one session
    #[must_use]
    pub fn new(settings: Arc<ReceiverSettings>) -> Self {
        Self {
            settings,
            remote: None,
        }
    }

    fn peer(&self) -> String {
        self.remote
            .map_or_else(|| "<unauthenticated>".into(), |a| a.to_string())
    }
}

impl SessionHandler for ConsoleHandler {
    type Sink = LocalFileSink;

    fn authenticate(&mut self, remote: SocketAddr) -> bool {
        if self.settings.allows(&remote) {
            info!("Accepted connection from {remote}");
            self.remote = Some(remote);
            true
        } else {
            warn!("Refused connection from {remote}");
            false
        }
    }

    async fn write_clipboard(&mut self, text: String) -> anyhow::Result<()> {
        let clipboard = self.settings.clipboard.clone();
        let len = text.len();
        debug!("clipboard content: {text:?}");
        tokio::task::spawn_blocking(move || clipboard.write(&text))
            .await
            .context("clipboard task failed")??;
        info!(
            "Clipboard set by {} ({})",
            self.peer(),
            len.human_count_bytes()
        );
        Ok(())
    }

    async fn open_file_sink(
        &mut self,
        filename: &str,
        estimated_size: Option<u64>,
    ) -> anyhow::Result<Self::Sink> {
        info!("{} is sending file {filename:?}", self.peer());
        if let Some(size) = estimated_size {
            debug!("expecting {}", size.human_count_bytes());
        }
        let path = self.settings.directory.join(filename);
        let file = create_new_file(&path).await?;
        Ok(LocalFileSink {
            writer: BufWriter::new(file),
            path,
            written: 0,
        })
    }

    fn on_fatal(&mut self, reason: &ProtocolViolation) {
        warn!("Dropping session with {}: {reason}", self.peer());
    }
}

impl Drop for ConsoleHandler {
    fn drop(&mut self) {
        if let Some(remote) = self.remote {
            info!("Session closed for {remote}");
        }
    }
}

/// A destination file on the local filesystem
#[derive(Debug)]
pub struct LocalFileSink {
    writer: BufWriter<tokio::fs::File>,
    path: PathBuf,
    written: u64,
}

impl FileSink for LocalFileSink {
    async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        self.writer
            .write_all(chunk)
            .await
            .with_context(|| format!("failed writing to {}", self.path.display()))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn close(mut self) -> anyhow::Result<()> {
        self.writer
            .flush()
            .await
            .with_context(|| format!("failed writing to {}", self.path.display()))?;
        info!(
            "Wrote {} to {}",
            self.written.human_count_bytes(),
            self.path.display()
        );
        Ok(())
    }
}
