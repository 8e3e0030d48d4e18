/// Trait for save modules, which persist cartridge save memory.
///
/// Offsets are relative to the start of the save region, whose size depends on the save type of
/// the cartridge. Reads past the end of the backing storage must produce `0xFF`.
pub trait SaveModule: Send {
    fn read(&mut self, offset: usize, out: &mut [u8]);
    fn write(&mut self, offset: usize, data: &[u8]);

    /// Size of the backing storage.
    fn size(&self) -> usize;

    /// Makes sure every write so far is persisted.
    fn flush(&mut self) {}
}

/// An implementation of [`SaveModule`] which keeps the save in memory and never persists it.
#[derive(Debug, Clone, Default)]
pub struct MemorySave {
    data: Vec<u8>,
}

impl MemorySave {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl SaveModule for MemorySave {
    fn read(&mut self, offset: usize, out: &mut [u8]) {
        let available = self.data.len().saturating_sub(offset).min(out.len());
        out[..available].copy_from_slice(&self.data[offset..][..available]);
        out[available..].fill(0xFF);
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        let available = self.data.len().saturating_sub(offset).min(data.len());
        self.data[offset..][..available].copy_from_slice(&data[..available]);
    }

    fn size(&self) -> usize {
        self.data.len()
    }
}

/// An implementation of [`SaveModule`] which does nothing: reads produce erased memory and writes
/// are discarded.
#[derive(Debug, Clone, Copy)]
pub struct NopSaveModule;

impl SaveModule for NopSaveModule {
    fn read(&mut self, _: usize, out: &mut [u8]) {
        out.fill(0xFF);
    }

    fn write(&mut self, _: usize, _: &[u8]) {}

    fn size(&self) -> usize {
        0
    }
}
