//! Cartridge: ROM and save memories.

use carts::rom::Rom;

use crate::modules::save::SaveModule;

/// Base of the cartridge ROM in the physical address space.
pub const ROM_BASE: u32 = 0x1000_0000;
/// Base of cartridge domain 2, where SRAM and Flash live.
pub const SAVE_BASE: u32 = 0x0800_0000;

const FLASH_PAGE_LEN: usize = 128;
const FLASH_SECTOR_LEN: u32 = 0x4000;
const FLASH_SILICON_ID: u64 = 0x1111_8001_00C2_001E;
const FLASH_STATUS_HI: u32 = 0x1111_8000;

/// Kind of save memory in a cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveType {
    #[default]
    None,
    Eeprom4K,
    Eeprom16K,
    Sram256K,
    Flash1M,
}

impl SaveType {
    /// Size of the save memory, in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Eeprom4K => 0x200,
            Self::Eeprom16K => 0x800,
            Self::Sram256K => 0x8000,
            Self::Flash1M => 0x2_0000,
        }
    }

    pub fn is_eeprom(self) -> bool {
        matches!(self, Self::Eeprom4K | Self::Eeprom16K)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashMode {
    #[default]
    Read,
    Status,
    SiliconId,
    Erase,
    Write,
}

/// Flash command state machine.
#[derive(Debug, Clone)]
pub struct Flash {
    pub mode: FlashMode,
    /// Low byte of the status register.
    pub status: u8,
    erase_offset: u32,
    erase_len: u32,
    page: [u8; FLASH_PAGE_LEN],
}

impl Default for Flash {
    fn default() -> Self {
        Self {
            mode: FlashMode::default(),
            status: 0,
            erase_offset: 0,
            erase_len: 0,
            page: [0xFF; FLASH_PAGE_LEN],
        }
    }
}

impl Flash {
    pub fn command(&mut self, value: u32, save: &mut dyn SaveModule) {
        let page_offset = (value & 0xFFFF) * FLASH_PAGE_LEN as u32;
        match value >> 24 {
            0x4B => {
                self.erase_offset = page_offset & !(FLASH_SECTOR_LEN - 1);
                self.erase_len = FLASH_SECTOR_LEN;
                self.mode = FlashMode::Erase;
            }
            0x3C => {
                self.erase_offset = 0;
                self.erase_len = SaveType::Flash1M.size() as u32;
                self.mode = FlashMode::Erase;
            }
            0x78 => {
                if self.mode == FlashMode::Erase {
                    tracing::debug!(
                        offset = self.erase_offset,
                        len = self.erase_len,
                        "erasing flash"
                    );

                    let erased = vec![0xFF; self.erase_len as usize];
                    save.write(self.erase_offset as usize, &erased);
                    self.status = 0x08;
                }

                self.mode = FlashMode::Status;
            }
            0xB4 => self.mode = FlashMode::Write,
            0xA5 => {
                tracing::debug!(offset = page_offset, "programming flash page");
                save.write(page_offset as usize, &self.page);
                self.status = 0x04;
                self.mode = FlashMode::Status;
            }
            0xD2 => self.mode = FlashMode::Status,
            0xE1 => self.mode = FlashMode::SiliconId,
            0xF0 => {
                self.mode = FlashMode::Read;
                self.status = 0;
            }
            _ => tracing::warn!("unknown flash command {value:08X}"),
        }
    }

    fn status_word(&self) -> u64 {
        match self.mode {
            FlashMode::SiliconId => FLASH_SILICON_ID,
            _ => ((FLASH_STATUS_HI | self.status as u32) as u64) << 32,
        }
    }

    /// Reads from the flash chip. `offset` is relative to the start of domain 2.
    pub fn read(&mut self, offset: u32, out: &mut [u8], save: &mut dyn SaveModule) {
        match self.mode {
            FlashMode::Read => {
                // the array is addressed in half-words
                let offset = (offset & 0xFFFF) as usize * 2;
                save.read(offset, out);
            }
            _ => {
                let bytes = self.status_word().to_be_bytes();
                for (i, byte) in out.iter_mut().enumerate() {
                    *byte = bytes[i % 8];
                }
            }
        }
    }

    /// Writes to the flash chip page buffer.
    pub fn write(&mut self, data: &[u8]) {
        if self.mode != FlashMode::Write {
            tracing::warn!(mode = ?self.mode, "write to flash outside of write mode");
            return;
        }

        let len = data.len().min(FLASH_PAGE_LEN);
        self.page[..len].copy_from_slice(&data[..len]);
    }
}

/// A cartridge.
pub struct Cartridge {
    /// ROM padded to a power of two.
    rom: Box<[u8]>,
    rom_len: usize,
    pub save_type: SaveType,
    pub flash: Flash,
}

impl Cartridge {
    pub fn new(rom: Option<&Rom>, save_type: SaveType) -> Self {
        let data = rom.map(Rom::data).unwrap_or_default();
        let len = data.len().max(4).next_power_of_two();
        let mut padded = util::boxed_bytes(len);
        padded[..data.len()].copy_from_slice(data);

        Self {
            rom: padded,
            rom_len: data.len(),
            save_type,
            flash: Flash::default(),
        }
    }

    /// The ROM, padded to a power of two.
    #[inline(always)]
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// Actual length of the ROM image.
    #[inline(always)]
    pub fn rom_len(&self) -> usize {
        self.rom_len
    }

    /// Offset into the ROM buffer for the given offset from the ROM base.
    #[inline(always)]
    pub fn rom_offset(&self, offset: u32) -> usize {
        offset as usize & (self.rom.len() - 1)
    }

    /// Reads from the cartridge bus, as done by PI DMA.
    pub fn read(&mut self, addr: u32, out: &mut [u8], save: &mut dyn SaveModule) {
        if addr >= ROM_BASE {
            for (i, byte) in out.iter_mut().enumerate() {
                let offset = self.rom_offset(addr.wrapping_sub(ROM_BASE).wrapping_add(i as u32));
                *byte = self.rom[offset];
            }

            return;
        }

        let offset = addr.wrapping_sub(SAVE_BASE);
        match self.save_type {
            SaveType::Sram256K => save.read(offset as usize & 0x7FFF, out),
            SaveType::Flash1M => self.flash.read(offset, out, save),
            _ => out.fill(0),
        }
    }

    /// Writes to the cartridge bus, as done by PI DMA. Writes to ROM are ignored.
    pub fn write(&mut self, addr: u32, data: &[u8], save: &mut dyn SaveModule) {
        if addr >= ROM_BASE {
            tracing::debug!("ignoring write to cartridge ROM at {addr:08X}");
            return;
        }

        let offset = addr.wrapping_sub(SAVE_BASE);
        match self.save_type {
            SaveType::Sram256K => save.write(offset as usize & 0x7FFF, data),
            SaveType::Flash1M => self.flash.write(data),
            _ => (),
        }
    }

    /// Reads a word through PI I/O from domain 2.
    pub fn read_io(&mut self, addr: u32, save: &mut dyn SaveModule) -> u32 {
        let offset = addr.wrapping_sub(SAVE_BASE);
        match self.save_type {
            SaveType::Flash1M => (self.flash.status_word() >> 32) as u32,
            SaveType::Sram256K => {
                let mut bytes = [0; 4];
                save.read(offset as usize & 0x7FFC, &mut bytes);
                u32::from_be_bytes(bytes)
            }
            _ => 0,
        }
    }

    /// Writes a word through PI I/O to domain 2.
    pub fn write_io(&mut self, addr: u32, value: u32, save: &mut dyn SaveModule) {
        let offset = addr.wrapping_sub(SAVE_BASE);
        match self.save_type {
            SaveType::Flash1M if offset >= 0x1_0000 => self.flash.command(value, save),
            SaveType::Sram256K => save.write(offset as usize & 0x7FFC, &value.to_be_bytes()),
            _ => tracing::debug!("ignoring write {value:08X} to cartridge at {addr:08X}"),
        }
    }
}
