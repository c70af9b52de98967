//! Temporary on-disk staging for an incoming payload.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A payload being streamed to disk.
///
/// The file name is unique per transfer so concurrent sessions never share a
/// staging file. [`PendingPayload::remove`] deletes it without blocking; if
/// the session ends another way, `Drop` deletes it instead.
#[derive(Debug)]
pub struct PendingPayload {
    path: PathBuf,
    file: Option<File>,
    declared: u64,
    received: u64,
    removed: bool,
}

impl PendingPayload {
    /// Create an empty staging file in `dir` for a payload of `declared` bytes.
    pub async fn create(dir: &Path, declared: u64) -> io::Result<Self> {
        let path = dir.join(format!("qr-{}.img", Uuid::new_v4()));
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file: Some(file),
            declared,
            received: 0,
            removed: false,
        })
    }

    /// Append a chunk. Writing past the declared size is refused.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let len = chunk.len() as u64;
        if self.received + len > self.declared {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "chunk of {} bytes overflows declared size {} at offset {}",
                    len, self.declared, self.received
                ),
            ));
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "staging file already finished"))?;
        file.write_all(chunk).await?;
        self.received += len;
        Ok(())
    }

    /// Flush and close the file so the decoder sees every byte.
    pub async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_data().await?;
        }
        Ok(())
    }

    /// Close and delete the staging file.
    pub async fn remove(mut self) -> io::Result<()> {
        self.file.take();
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Bytes still expected from the peer.
    pub fn remaining(&self) -> u64 {
        self.declared - self.received
    }
}

impl Drop for PendingPayload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
}
