// (c) 2024 sendplz contributors
//! The sending side
//!
//! Each call opens exactly one connection, sends one [message sequence](crate::protocol::wire),
//! closes the connection and returns. There is no retry.

use std::time::Instant;

use indicatif::MultiProgress;
use tracing::{debug, info, info_span, Instrument as _};

use crate::protocol::{wire, Endpoint, Selector};
use crate::transport::{self, MessageChannel as _};
use crate::util::stats;

mod progress;
pub(crate) use progress::MAX_UPDATE_FPS;

mod provider;
pub use provider::{FileProvider, FileSource, LocalFile};

/// Sends clipboard text to the receiver at `endpoint`
pub async fn send_clipboard(endpoint: &Endpoint, text: &str) -> anyhow::Result<()> {
    async {
        let mut channel = transport::connect(endpoint, Selector::Clipboard).await?;
        wire::send_clipboard(&mut channel, text.to_owned()).await?;
        channel.close().await?;
        info!("Sent clipboard ({} characters)", text.chars().count());
        Ok::<_, anyhow::Error>(())
    }
    .instrument(info_span!("send", selector = %Selector::Clipboard))
    .await
}

/// Sends a file to the receiver at `endpoint`.
///
/// The provider is opened before connecting, so a local failure does not reach the network.
/// If `display` is given, progress is shown on it.
///
/// Returns the number of payload bytes sent.
pub async fn send_file<P: FileProvider>(
    endpoint: &Endpoint,
    provider: P,
    display: Option<&MultiProgress>,
) -> anyhow::Result<u64> {
    async {
        let source = provider.provide().await?;
        debug!("sending {:?}", source.name);
        let mut channel = transport::connect(endpoint, Selector::File).await?;

        let bar = progress::progress_bar_for(display, &source.name, source.size)?;
        let start = Instant::now();
        let sent = wire::send_file(&mut channel, &source.name, source.chunks, |n| {
            bar.inc(n as u64);
        })
        .await?;
        channel.close().await?;
        bar.finish_and_clear();

        info!(
            "Sent {}: {}",
            source.name,
            stats::summary(sent, start.elapsed())
        );
        Ok::<_, anyhow::Error>(sent)
    }
    .instrument(info_span!("send", selector = %Selector::File))
    .await
}

#[cfg(test)]
mod tests {
    use crate::protocol::{Endpoint, Scheme};

    use super::{send_clipboard, send_file, LocalFile};

    /// An endpoint with (almost certainly) nothing listening
    async fn dead_endpoint() -> Endpoint {
        let socket = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        drop(socket);
        Endpoint::new(Scheme::Ws, "127.0.0.1", port).unwrap()
    }

    #[tokio::test]
    async fn connection_refused_is_an_error() {
        let ep = dead_endpoint().await;
        let err = send_clipboard(&ep, "hi").await.unwrap_err();
        assert!(err.to_string().contains("failed to connect"), "{err}");
    }

    #[tokio::test]
    async fn missing_file_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let ep = dead_endpoint().await;
        let err = send_file(&ep, LocalFile::new(dir.path().join("absent"), 16), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not open"), "{err}");
    }
}
