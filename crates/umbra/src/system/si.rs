//! Serial interface: DMA between RDRAM and PIF RAM.

use crate::system::{Event, System, mi::Interrupt, pif::RAM_LEN};

/// CPU cycles a 64 byte SI DMA takes.
pub const DMA_CYCLES: u64 = 0x900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// PIF RAM to RDRAM.
    ToRdram,
    /// RDRAM to PIF RAM.
    ToPif,
}

#[derive(Debug, Default)]
pub struct SerialInterface {
    pub dram_addr: u32,
    pub pif_addr: u32,
    pub dma_busy: bool,
}

impl SerialInterface {
    pub fn status(&self, interrupt: bool) -> u32 {
        (self.dma_busy as u32) | (interrupt as u32) << 12
    }
}

impl System {
    fn si_dma(&mut self, direction: Direction, pif_offset: usize, len: usize) {
        if self.bus.si.dma_busy {
            tracing::warn!("SI DMA started while another one is in progress");
            return;
        }

        let dram_addr = self.bus.si.dram_addr;
        let pif_offset = pif_offset.min(RAM_LEN - len);

        match direction {
            Direction::ToPif => {
                let mut data = [0; RAM_LEN];
                self.bus.mem.read_rdram(dram_addr, &mut data[..len]);
                self.bus.pif.ram[pif_offset..][..len].copy_from_slice(&data[..len]);
                self.pif_written();
            }
            Direction::ToRdram => {
                self.pif_before_read();
                let data = self.bus.pif.ram;
                self.bus
                    .mem
                    .write_rdram(dram_addr, &data[pif_offset..][..len]);
            }
        }

        tracing::debug!(
            ?direction,
            dram = format_args!("{dram_addr:08X}"),
            len,
            "started SI DMA"
        );

        self.bus.si.dma_busy = true;
        self.scheduler.schedule(Event::SiDma, DMA_CYCLES);
    }

    pub(crate) fn si_dma_complete(&mut self) {
        self.bus.si.dma_busy = false;
        self.raise_interrupt(Interrupt::Si);
    }

    pub(crate) fn si_read(&mut self, offset: u32) -> u32 {
        let si = &self.bus.si;
        match offset {
            0x00 => si.dram_addr,
            0x04 | 0x08 | 0x10 | 0x14 => si.pif_addr,
            0x18 => si.status(self.bus.mi.interrupts & Interrupt::Si.mask() != 0),
            _ => {
                tracing::warn!("read from unknown SI register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn si_write(&mut self, offset: u32, value: u32) {
        let pif_offset = (value & 0x7FC) as usize % RAM_LEN;
        match offset {
            0x00 => self.bus.si.dram_addr = value & 0x00FF_FFF8,
            0x04 => {
                self.bus.si.pif_addr = value;
                self.si_dma(Direction::ToRdram, 0, RAM_LEN);
            }
            0x08 => {
                self.bus.si.pif_addr = value;
                self.si_dma(Direction::ToPif, pif_offset, 4);
            }
            0x10 => {
                self.bus.si.pif_addr = value;
                self.si_dma(Direction::ToPif, 0, RAM_LEN);
            }
            0x14 => {
                self.bus.si.pif_addr = value;
                self.si_dma(Direction::ToRdram, pif_offset, 4);
            }
            0x18 => self.lower_interrupt(Interrupt::Si),
            _ => tracing::warn!("write {value:08X} to unknown SI register {offset:02X}"),
        }
    }
}
