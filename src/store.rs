use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// The single file the server appends to and clears.
///
/// Every operation reopens the file by path so that external rotation or
/// inspection between requests is observed. All mutations go through one
/// lock, so concurrent appends never interleave and a clear never lands in
/// the middle of an append.
#[derive(Debug)]
pub struct BackingFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl BackingFile {
    /// Wraps an existing file. Creation is the caller's job (see `preflight`).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `bytes` to the end of the file. Does not create the file.
    pub async fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.lock.lock().await;

        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(bytes).await?;
        // tokio::fs::File completes writes in the background until flushed
        file.flush().await?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Appended to backing file");
        Ok(())
    }

    /// Truncate the file to zero length, keeping the file and its permissions.
    pub async fn clear(&self) -> io::Result<()> {
        let _guard = self.lock.lock().await;

        let file = OpenOptions::new().write(true).open(&self.path).await?;
        file.set_len(0).await?;

        debug!(path = %self.path.display(), "Cleared backing file");
        Ok(())
    }
}
