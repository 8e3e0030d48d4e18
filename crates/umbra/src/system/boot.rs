//! High level emulation of the PIF boot sequence.
//!
//! Instead of running the PIF ROM, the state it leaves behind before jumping into the cartridge
//! boot code (IPL3) is set up directly.

use bitos::integer::{u2, u4};
use vr4300::{SignExtend, cop0::Reg};

use crate::system::{System, mem::SP_MEM_LEN};

/// Address IPL3 starts executing at, in SP DMEM.
pub const IPL3_ENTRY: u32 = 0xA400_0040;

/// Lockout chip variants. The chip determines the seed PIF hands to IPL3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cic {
    Nus6101,
    #[default]
    Nus6102,
    Nus6103,
    Nus6105,
    Nus6106,
}

impl Cic {
    pub fn seed(self) -> u8 {
        match self {
            Self::Nus6101 | Self::Nus6102 => 0x3F,
            Self::Nus6103 => 0x78,
            Self::Nus6105 => 0x91,
            Self::Nus6106 => 0x85,
        }
    }

    /// Where IPL3 expects the RDRAM size to be stored.
    pub fn rdram_size_addr(self) -> u32 {
        match self {
            Self::Nus6105 => 0x3F0,
            _ => 0x318,
        }
    }
}

impl System {
    /// Leaves the system as the PIF would right before running IPL3.
    pub(crate) fn boot(&mut self) {
        let cic = self.config.cic;
        let tv = self.tv();
        tracing::info!(?cic, ?tv, "booting with HLE PIF");

        if let Some(rom) = &self.config.rom {
            let boot = rom.boot();
            let len = boot.len().min(SP_MEM_LEN);
            self.bus.mem.dmem[..len].copy_from_slice(&boot[..len]);

            // PI domain 1 timings come from the first header word
            let [_, pages_release, pulse_width, latency] = rom.header.pi_config.to_be_bytes();
            let domain = &mut self.bus.pi.domains[0];
            domain.set_latency(latency);
            domain.set_pulse_width(pulse_width);
            domain.set_page_size(u4::new(pages_release & 0xF));
            domain.set_release(u2::new((pages_release >> 4) & 0x3));
        } else {
            tracing::warn!("booting without a cartridge");
        }

        let rdram_len = self.bus.mem.rdram.len() as u32;
        let size_addr = cic.rdram_size_addr();
        self.bus
            .mem
            .write_rdram(size_addr, &rdram_len.to_be_bytes());

        let cpu = &mut self.cpu;
        cpu.set_gpr(11, IPL3_ENTRY.sext());
        cpu.set_gpr(19, 0);
        cpu.set_gpr(20, tv as u64);
        cpu.set_gpr(22, cic.seed() as u64);
        cpu.set_gpr(23, 0);
        cpu.set_gpr(29, 0xA400_1FF0u32.sext());
        cpu.set_gpr(31, 0xA400_1550u32.sext());

        // CU0 | CU1 | FR
        cpu.cop0.write(Reg::Status as u8, 0x3400_0000);
        cpu.cop0.write(Reg::Config as u8, 0x7006_E463);
        cpu.cop0.write(Reg::Wired as u8, 0);

        cpu.jump_to(IPL3_ENTRY.sext());
    }
}
