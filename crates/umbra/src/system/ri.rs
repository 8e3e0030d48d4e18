//! RDRAM interface. Only the register file is emulated, RDRAM itself is always initialized.

use crate::system::System;

#[derive(Debug)]
pub struct RdramInterface {
    pub regs: [u32; 8],
}

impl Default for RdramInterface {
    fn default() -> Self {
        // state left behind by the IPL
        Self {
            regs: [0x0E, 0x40, 0, 0x14, 0x0006_3634, 0, 0, 0],
        }
    }
}

impl System {
    pub(crate) fn ri_read(&mut self, offset: u32) -> u32 {
        match self.bus.ri.regs.get(offset as usize / 4) {
            Some(&value) => value,
            None => {
                tracing::warn!("read from unknown RI register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn ri_write(&mut self, offset: u32, value: u32) {
        match self.bus.ri.regs.get_mut(offset as usize / 4) {
            // error registers are read only
            Some(_) if offset >= 0x18 => (),
            Some(reg) => *reg = value,
            None => tracing::warn!("write {value:08X} to unknown RI register {offset:02X}"),
        }
    }

    /// RDRAM configuration registers. Reads return zero, writes are ignored.
    pub(crate) fn rdram_regs_read(&mut self, offset: u32) -> u32 {
        tracing::trace!("read from RDRAM register {offset:05X}");
        0
    }
}
