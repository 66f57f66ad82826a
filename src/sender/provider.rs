// File sources for the sender
// (c) 2024 sendplz contributors

use std::future::Future;
use std::path::PathBuf;

use anyhow::Context as _;
use futures_util::stream::{BoxStream, StreamExt as _};

use crate::util::io::{chunk_stream, open_file, sanitise_filename};

/// A file ready to be sent: its name, and its content as a lazy sequence of chunks
pub struct FileSource {
    /// Base name to announce to the receiver
    pub name: String,
    /// Size in bytes, if known. This is for local display only; it is not sent.
    pub size: Option<u64>,
    /// File content
    pub chunks: BoxStream<'static, std::io::Result<Vec<u8>>>,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Something that can produce a [`FileSource`].
///
/// Implementations must not read the whole file into memory.
pub trait FileProvider: Send + Sized {
    /// Opens the file
    fn provide(self) -> impl Future<Output = anyhow::Result<FileSource>> + Send;
}

impl FileProvider for FileSource {
    async fn provide(self) -> anyhow::Result<FileSource> {
        Ok(self)
    }
}

/// A file on the local filesystem, read in chunks of a given size
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    chunk_size: u64,
}

impl LocalFile {
    /// Constructor
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P, chunk_size: u64) -> Self {
        Self {
            path: path.into(),
            chunk_size,
        }
    }
}

impl FileProvider for LocalFile {
    async fn provide(self) -> anyhow::Result<FileSource> {
        anyhow::ensure!(self.chunk_size > 0, "chunk size must be at least 1 byte");
        let chunk_size = usize::try_from(self.chunk_size).context("chunk size is too large")?;
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .as_deref()
            .and_then(sanitise_filename)
            .map(str::to_owned)
            .with_context(|| format!("{} does not name a file", self.path.display()))?;
        let (file, meta) = open_file(&self.path).await?;
        Ok(FileSource {
            name,
            size: Some(meta.len()),
            chunks: chunk_stream(file, chunk_size).boxed(),
        })
    }
}
