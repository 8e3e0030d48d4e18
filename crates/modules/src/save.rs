use std::{fs::OpenOptions, path::Path};

use easyerr::{Error, ResultExt};
use memmap2::{MmapMut, MmapOptions};
use umbra::modules::save::SaveModule;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save region must not be empty")]
    Empty,
    #[error(transparent)]
    Io { source: std::io::Error },
}

/// An implementation of [`SaveModule`] backed by a memory mapped file.
///
/// A missing file is created. A file shorter than the save region is extended, and the new part
/// reads as erased memory.
pub struct FileSave {
    map: MmapMut,
}

impl FileSave {
    pub fn open(path: impl AsRef<Path>, size: usize) -> Result<Self, SaveError> {
        if size == 0 {
            return Err(SaveError::Empty);
        }

        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .context(SaveCtx::Io)?;

        let len = file.metadata().context(SaveCtx::Io)?.len() as usize;

        if len < size {
            file.set_len(size as u64).context(SaveCtx::Io)?;
        }

        // SAFETY: the save file belongs to this emulator instance while it runs
        let mut map =
            unsafe { MmapOptions::new().len(size).map_mut(&file) }.context(SaveCtx::Io)?;

        if len < size {
            tracing::info!(?path, len, size, "initializing fresh save region");
            map[len..].fill(0xFF);
        }

        Ok(Self { map })
    }
}

impl SaveModule for FileSave {
    fn read(&mut self, offset: usize, out: &mut [u8]) {
        let available = self.map.len().saturating_sub(offset).min(out.len());
        out[..available].copy_from_slice(&self.map[offset..][..available]);
        out[available..].fill(0xFF);
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        let available = self.map.len().saturating_sub(offset).min(data.len());
        self.map[offset..][..available].copy_from_slice(&data[..available]);
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn flush(&mut self) {
        if let Err(e) = self.map.flush() {
            tracing::error!("failed to flush save file: {e}");
        }
    }
}

impl Drop for FileSave {
    fn drop(&mut self) {
        self.flush();
    }
}
