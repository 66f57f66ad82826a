// IO helpers
// (c) 2024 sendplz contributors

use std::{fs::Metadata, io::ErrorKind, path::Path};

use anyhow::Context as _;
use futures_util::{stream, Stream};
use tokio::io::{AsyncRead, AsyncReadExt as _};

/// Reduces a wire filename to its final path component.
///
/// Both `/` and `\` count as separators, whatever platform we are on.
/// Returns `None` if nothing usable remains (empty, `.` or `..`).
#[must_use]
pub fn sanitise_filename(filename: &str) -> Option<&str> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    match base {
        "" | "." | ".." => None,
        b => Some(b),
    }
}

/// Opens a local file for reading, returning a filehandle and metadata.
pub async fn open_file(path: &Path) -> anyhow::Result<(tokio::fs::File, Metadata)> {
    let fh = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("could not open {}", path.display()))?;
    let meta = fh
        .metadata()
        .await
        .with_context(|| format!("unable to determine size of {}", path.display()))?;
    anyhow::ensure!(!meta.is_dir(), "{} is a directory", path.display());
    Ok((fh, meta))
}

/// Creates a new file for writing. This fails if the destination already exists.
pub async fn create_new_file(path: &Path) -> anyhow::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                anyhow::anyhow!("destination {} already exists", path.display())
            }
            _ => anyhow::Error::new(e).context(format!("could not create {}", path.display())),
        })
}

/// Reads as much as possible into `buf`, up to its capacity. Returns the number of bytes read;
/// a short count means end of file.
async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut total = 0;
    while buf.len() < buf.capacity() {
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Turns a reader into a lazy stream of chunks of (at most) `chunk_size` bytes.
///
/// Every chunk but the last is exactly `chunk_size` bytes. An empty input produces no chunks.
pub fn chunk_stream<R>(
    reader: R,
    chunk_size: usize,
) -> impl Stream<Item = std::io::Result<Vec<u8>>> + Send + Unpin
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    Box::pin(stream::try_unfold(reader, move |mut reader| async move {
        let mut buf = Vec::with_capacity(chunk_size);
        let _ = fill(&mut reader, &mut buf).await?;
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some((buf, reader)))
        }
    }))
}
