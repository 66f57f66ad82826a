// Session collaborator interfaces
// (c) 2024 sendplz contributors

use std::{future::Future, net::SocketAddr};

use super::ProtocolViolation;

/// The receiver's collaborators for one session.
///
/// A fresh handler is created for every accepted connection.
pub trait SessionHandler: Send {
    /// The file writer type handed out by [`open_file_sink`](Self::open_file_sink)
    type Sink: FileSink;

    /// Decides whether to accept a connection from this address.
    /// Nothing further is read from a rejected connection.
    fn authenticate(&mut self, remote: SocketAddr) -> bool;

    /// Delivers received clipboard text
    fn write_clipboard(&mut self, text: String) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Opens a destination for an incoming file.
    ///
    /// `filename` has already been reduced to a bare file name.
    /// Implementations should refuse (return an error) rather than overwrite an existing file.
    fn open_file_sink(
        &mut self,
        filename: &str,
        estimated_size: Option<u64>,
    ) -> impl Future<Output = anyhow::Result<Self::Sink>> + Send;

    /// Notification that the remote sent something the protocol does not allow.
    /// The session is abandoned after this; it is not an error for the process.
    fn on_fatal(&mut self, reason: &ProtocolViolation);
}

/// A scoped file writer.
///
/// The session guarantees to call [`close`](Self::close) exactly once after a successful open,
/// whichever way the transfer ends.
pub trait FileSink: Send + Sized {
    /// Appends a chunk
    fn write(&mut self, chunk: &[u8]) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Releases the sink
    fn close(self) -> impl Future<Output = anyhow::Result<()>> + Send;
}
