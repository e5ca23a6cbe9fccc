//! Emulated device flash backed by a regular file.

use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use fpvgate_config::ChipFamily;
use sha2::{Digest, Sha256};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::mpsc,
};

use super::{FlashDriver, chan_send};

const CHUNK_SIZE: usize = 64 * 1024;
const ERASED: u8 = 0xFF;

/// Writes flash images to a file of fixed size. Useful for inspecting what would be written to a
/// device and for testing.
#[derive(Debug)]
pub struct FileDriver {
    path: PathBuf,
    size: u64,
    file: Option<File>,
}

impl FileDriver {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device not connected"))
    }

    fn check_bounds(&self, offset: u32, len: usize) -> io::Result<()> {
        let end = u64::from(offset) + len as u64;
        if end > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{len} bytes at {offset:#x} exceed flash size {:#x}", self.size),
            ));
        }
        Ok(())
    }
}

async fn fill(file: &mut File, mut len: u64) -> io::Result<()> {
    let chunk = vec![ERASED; CHUNK_SIZE];

    while len > 0 {
        let n = len.min(CHUNK_SIZE as u64) as usize;
        file.write_all(&chunk[..n]).await?;
        len -= n as u64;
    }

    Ok(())
}

impl FlashDriver for FileDriver {
    async fn connect(&mut self, chip: ChipFamily) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        let len = file.metadata().await?.len();
        if len < self.size {
            file.seek(SeekFrom::End(0)).await?;
            fill(&mut file, self.size - len).await?;
            file.flush().await?;
        }

        tracing::info!("Emulating {chip} flash in {}", self.path.display());
        self.file = Some(file);
        Ok(())
    }

    async fn erase(&mut self) -> io::Result<()> {
        let size = self.size;
        let file = self.file()?;

        file.seek(SeekFrom::Start(0)).await?;
        fill(file, size).await?;
        file.flush().await
    }

    async fn write_segment(
        &mut self,
        offset: u32,
        data: &[u8],
        mut chan: Option<mpsc::Sender<f32>>,
    ) -> io::Result<()> {
        self.check_bounds(offset, data.len())?;
        let file = self.file()?;

        file.seek(SeekFrom::Start(offset.into())).await?;

        let mut written = 0;
        for chunk in data.chunks(CHUNK_SIZE) {
            file.write_all(chunk).await?;
            written += chunk.len();
            chan_send(chan.as_mut(), written as f32 / data.len() as f32);
        }

        file.flush().await
    }

    async fn flash_digest(&mut self, offset: u32, len: usize) -> io::Result<[u8; 32]> {
        self.check_bounds(offset, len)?;
        let file = self.file()?;

        file.seek(SeekFrom::Start(offset.into())).await?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut remaining = len;

        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE);
            file.read_exact(&mut buf[..n]).await?;
            hasher.update(&buf[..n]);
            remaining -= n;
        }

        Ok(hasher.finalize().into())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.sync_all().await,
            None => Ok(()),
        }
    }
}
