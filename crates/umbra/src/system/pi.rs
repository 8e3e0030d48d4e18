//! Peripheral interface: cartridge bus and its DMA engine.

use bitos::{
    bitos,
    integer::{u2, u4},
};

use crate::system::{Event, System, mi::Interrupt};

/// Timing configuration of a PI domain.
#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainTiming {
    #[bits(0..8)]
    pub latency: u8,
    #[bits(8..16)]
    pub pulse_width: u8,
    #[bits(16..20)]
    pub page_size: u4,
    #[bits(20..22)]
    pub release: u2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// RDRAM to cartridge.
    ToCart,
    /// Cartridge to RDRAM.
    ToRdram,
}

#[derive(Debug, Default)]
pub struct PeripheralInterface {
    pub dram_addr: u32,
    pub cart_addr: u32,
    pub dma_busy: bool,
    pub error: bool,
    pub domains: [DomainTiming; 2],
}

impl PeripheralInterface {
    pub fn status(&self, interrupt: bool) -> u32 {
        (self.dma_busy as u32) | (self.error as u32) << 2 | (interrupt as u32) << 3
    }

    /// The domain a cartridge address belongs to.
    pub fn domain(cart_addr: u32) -> usize {
        match cart_addr {
            0x0500_0000..0x0600_0000 | 0x0800_0000..0x1000_0000 => 1,
            _ => 0,
        }
    }

    /// CPU cycles a DMA of `len` bytes takes.
    pub fn dma_cycles(&self, cart_addr: u32, len: u32) -> u64 {
        let timing = self.domains[Self::domain(cart_addr)];
        let page_len = 1u64 << (timing.page_size().value() + 2);
        let pages = (len as u64).div_ceil(page_len);

        let per_half_word = timing.pulse_width() as u64 + 1 + timing.release().value() as u64 + 1;
        let per_page = timing.latency() as u64 + 1 + per_half_word * page_len / 2;

        // RCP cycles to CPU cycles
        (pages * per_page * 3 / 2).max(1)
    }

    fn read_domain(&self, index: usize, reg: u32) -> u32 {
        let timing = self.domains[index];
        match reg {
            0 => timing.latency() as u32,
            1 => timing.pulse_width() as u32,
            2 => timing.page_size().value() as u32,
            _ => timing.release().value() as u32,
        }
    }

    fn write_domain(&mut self, index: usize, reg: u32, value: u32) {
        let timing = &mut self.domains[index];
        match reg {
            0 => timing.set_latency(value as u8),
            1 => timing.set_pulse_width(value as u8),
            2 => timing.set_page_size(u4::new(value as u8 & 0xF)),
            _ => timing.set_release(u2::new(value as u8 & 0x3)),
        }
    }
}

impl System {
    fn pi_dma(&mut self, direction: Direction, len: u32) {
        let pi = &mut self.bus.pi;
        let dram_addr = pi.dram_addr;
        let cart_addr = pi.cart_addr;

        let mut buffer = vec![0; len as usize];
        match direction {
            Direction::ToRdram => {
                self.bus
                    .cart
                    .read(cart_addr, &mut buffer, self.modules.save.as_mut());
                self.bus.mem.write_rdram(dram_addr, &buffer);
            }
            Direction::ToCart => {
                self.bus.mem.read_rdram(dram_addr, &mut buffer);
                self.bus
                    .cart
                    .write(cart_addr, &buffer, self.modules.save.as_mut());
            }
        }

        let pi = &mut self.bus.pi;
        pi.dram_addr = (dram_addr + len).next_multiple_of(8) & 0x00FF_FFFF;
        pi.cart_addr = cart_addr.wrapping_add(len).wrapping_add(1) & !1;
        pi.dma_busy = true;

        let cycles = pi.dma_cycles(cart_addr, len);
        tracing::debug!(
            ?direction,
            dram = format_args!("{dram_addr:08X}"),
            cart = format_args!("{cart_addr:08X}"),
            len,
            cycles,
            "started PI DMA"
        );

        self.scheduler.schedule(Event::PiDma, cycles);
    }

    pub(crate) fn pi_dma_complete(&mut self) {
        self.bus.pi.dma_busy = false;
        self.raise_interrupt(Interrupt::Pi);
    }

    pub(crate) fn pi_read(&mut self, offset: u32) -> u32 {
        let pi = &self.bus.pi;
        match offset {
            0x00 => pi.dram_addr,
            0x04 => pi.cart_addr,
            0x08 | 0x0C => 0x7F,
            0x10 => pi.status(self.bus.mi.interrupts & Interrupt::Pi.mask() != 0),
            0x14..=0x30 => {
                let index = (offset - 0x14) / 4;
                pi.read_domain(index as usize / 4, index % 4)
            }
            _ => {
                tracing::warn!("read from unknown PI register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn pi_write(&mut self, offset: u32, value: u32) {
        match offset {
            0x00 => self.bus.pi.dram_addr = value & 0x00FF_FFFE,
            0x04 => self.bus.pi.cart_addr = value & 0xFFFF_FFFE,
            0x08 | 0x0C => {
                if self.bus.pi.dma_busy {
                    tracing::warn!("PI DMA started while another one is in progress");
                    self.bus.pi.error = true;
                    return;
                }

                let direction = if offset == 0x08 {
                    Direction::ToCart
                } else {
                    Direction::ToRdram
                };

                self.pi_dma(direction, (value & 0x00FF_FFFF) + 1);
            }
            0x10 => {
                if value & 1 != 0 {
                    self.scheduler.cancel(Event::PiDma);
                    self.bus.pi.dma_busy = false;
                    self.bus.pi.error = false;
                }

                if value & 2 != 0 {
                    self.lower_interrupt(Interrupt::Pi);
                }
            }
            0x14..=0x30 => {
                let index = (offset - 0x14) / 4;
                self.bus.pi.write_domain(index as usize / 4, index % 4, value);
            }
            _ => tracing::warn!("write {value:08X} to unknown PI register {offset:02X}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn domains() {
        assert_eq!(PeripheralInterface::domain(0x1000_0000), 0);
        assert_eq!(PeripheralInterface::domain(0x0800_0000), 1);
        assert_eq!(PeripheralInterface::domain(0x0600_0000), 0);
    }

    #[test]
    fn dma_timing_scales_with_length() {
        let mut pi = PeripheralInterface::default();
        pi.write_domain(0, 0, 0x40);
        pi.write_domain(0, 1, 0x12);
        pi.write_domain(0, 2, 0x07);
        pi.write_domain(0, 3, 0x03);

        let short = pi.dma_cycles(0x1000_0000, 0x200);
        let long = pi.dma_cycles(0x1000_0000, 0x400);
        assert_eq!(long, 2 * short);
        assert_eq!(pi.read_domain(0, 1), 0x12);
    }
}
