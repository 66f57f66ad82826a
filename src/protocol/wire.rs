// (c) 2024 sendplz contributors
//! Message sequencing for the two transfer kinds (outbound direction)
//!
//! The inbound direction is driven by the receiver's [session](crate::session) state machine.

use anyhow::Context as _;
use futures_util::{Stream, StreamExt as _};
use tracing::trace;

use super::Message;
use crate::transport::MessageChannel;

/// Default maximum size of a single file chunk (8 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// The terminal message we send at the end of a file stream.
///
/// Receivers must not rely on its content; any text message terminates the stream.
pub const END_OF_STREAM: &str = "";

/// Sends the clipboard sequence: exactly one text message.
pub async fn send_clipboard<C: MessageChannel>(channel: &mut C, text: String) -> anyhow::Result<()> {
    trace!("sending clipboard ({} bytes)", text.len());
    channel.send(Message::Text(text)).await
}

/// Sends the file sequence: filename, chunks, terminator.
///
/// The chunk stream is read to exhaustion. Each chunk is forwarded as one binary message
/// in order; an error from the stream aborts the sequence without sending the terminator.
///
/// `on_chunk` is called with the size of each chunk after it has been sent.
///
/// Returns the number of payload bytes sent.
pub async fn send_file<C, S, F>(
    channel: &mut C,
    filename: &str,
    mut chunks: S,
    mut on_chunk: F,
) -> anyhow::Result<u64>
where
    C: MessageChannel,
    S: Stream<Item = std::io::Result<Vec<u8>>> + Unpin + Send,
    F: FnMut(usize) + Send,
{
    trace!("sending filename {filename}");
    channel.send(Message::Text(filename.to_owned())).await?;

    let mut total = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.context("failed to read file data")?;
        let len = chunk.len();
        channel.send(Message::Binary(chunk)).await?;
        total += len as u64;
        on_chunk(len);
    }

    trace!("sending end of stream after {total} bytes");
    channel.send(Message::Text(END_OF_STREAM.into())).await?;
    Ok(total)
}
