//! Signal processor interface: RSP DMA, status and task dispatch.

use bitos::{bitos, integer::u12};

use crate::{
    modules::rsp::RspMemory,
    system::{Event, System, mem::SP_MEM_LEN, mi::Interrupt, mi::apply_pair},
};

/// Base of the SP registers in the physical address space.
pub const REGS_BASE: u32 = 0x0404_0000;
/// Address of SP_PC in the physical address space.
pub const PC_ADDR: u32 = 0x0408_0000;

#[bitos(32)]
#[derive(Debug, Clone, Copy)]
pub struct Status {
    #[bits(0)]
    pub halt: bool,
    #[bits(1)]
    pub broke: bool,
    #[bits(2)]
    pub dma_busy: bool,
    #[bits(3)]
    pub dma_full: bool,
    #[bits(4)]
    pub io_full: bool,
    #[bits(5)]
    pub single_step: bool,
    #[bits(6)]
    pub interrupt_on_break: bool,
    #[bits(7..15)]
    pub signals: u8,
}

impl Default for Status {
    fn default() -> Self {
        Self::from_bits(0).with_halt(true)
    }
}

/// Length register of an SP DMA.
#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DmaLength {
    #[bits(0..12)]
    pub len: u12,
    #[bits(12..20)]
    pub count: u8,
    #[bits(20..32)]
    pub skip: u12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// RDRAM to SP memory.
    ToSp,
    /// SP memory to RDRAM.
    ToRdram,
}

#[derive(Debug, Default)]
pub struct SignalProcessor {
    pub mem_addr: u32,
    pub dram_addr: u32,
    pub last_length: DmaLength,
    pub status: Status,
    pub semaphore: bool,
    pub pc: u32,
}

impl SignalProcessor {
    /// Applies a write to SP_STATUS. Returns `(clear interrupt, set interrupt)`.
    pub fn write_status(&mut self, value: u32) -> (bool, bool) {
        let mut status = self.status;
        status.set_halt(apply_pair(value, 0, status.halt()));
        if value & (1 << 2) != 0 {
            status.set_broke(false);
        }

        status.set_single_step(apply_pair(value, 5, status.single_step()));
        status.set_interrupt_on_break(apply_pair(value, 7, status.interrupt_on_break()));

        let mut signals = status.signals();
        for signal in 0..8 {
            let bit = 1 << signal;
            let set = apply_pair(value, 9 + 2 * signal, signals & bit != 0);
            signals = (signals & !bit) | if set { bit } else { 0 };
        }

        status.set_signals(signals);
        self.status = status;

        (value & (1 << 3) != 0, value & (1 << 4) != 0)
    }
}

impl System {
    fn sp_dma(&mut self, direction: Direction, length: DmaLength) {
        let sp = &mut self.bus.sp;
        let len = (length.len().value() as u32 | 7) + 1;
        let count = length.count() as u32 + 1;
        let skip = length.skip().value() as u32;

        let imem = sp.mem_addr & 0x1000 != 0;
        let mut mem_offset = sp.mem_addr & 0xFF8;
        let mut dram_addr = sp.dram_addr & 0x00FF_FFF8;

        tracing::debug!(
            ?direction,
            imem,
            mem = format_args!("{mem_offset:03X}"),
            dram = format_args!("{dram_addr:08X}"),
            len,
            count,
            skip,
            "SP DMA"
        );

        let mut chunk = vec![0; len as usize];
        for _ in 0..count {
            if direction == Direction::ToSp {
                self.bus.mem.read_rdram(dram_addr, &mut chunk);
            }

            let mem = &mut self.bus.mem;
            let sp_mem = if imem { &mut mem.imem } else { &mut mem.dmem };
            for (i, byte) in chunk.iter_mut().enumerate() {
                let slot = &mut sp_mem[(mem_offset as usize + i) % SP_MEM_LEN];
                match direction {
                    Direction::ToSp => *slot = *byte,
                    Direction::ToRdram => *byte = *slot,
                }
            }

            if direction == Direction::ToRdram {
                self.bus.mem.write_rdram(dram_addr, &chunk);
            }

            mem_offset = (mem_offset + len) & 0xFF8;
            dram_addr = (dram_addr + len + skip) & 0x00FF_FFF8;
        }

        if direction == Direction::ToSp {
            let page = if imem { 0x4001 } else { 0x4000 };
            self.bus.mem.code.written(page);
        }

        let sp = &mut self.bus.sp;
        sp.mem_addr = (sp.mem_addr & 0x1000) | mem_offset;
        sp.dram_addr = dram_addr;
        sp.last_length = length.with_len(u12::new(0xFF8)).with_count(0);
    }

    /// Runs the task loaded in the RSP memories.
    fn sp_start(&mut self) {
        let memory = RspMemory {
            dmem: &mut self.bus.mem.dmem,
            imem: &mut self.bus.mem.imem,
            rdram: &mut self.bus.mem.rdram,
            pc: self.bus.sp.pc,
        };

        let task = self.modules.rsp.run(memory);
        tracing::debug!(cycles = task.cycles, "RSP task started");

        if let Some((start, end)) = task.dp_commands {
            self.dp_run_dmem(start, end);
        }

        self.scheduler.schedule(Event::SpTask, task.cycles.max(1));
    }

    pub(crate) fn sp_task_complete(&mut self) {
        let status = &mut self.bus.sp.status;
        status.set_halt(true);
        status.set_broke(true);

        if status.interrupt_on_break() {
            self.raise_interrupt(Interrupt::Sp);
        }
    }

    pub(crate) fn sp_read(&mut self, offset: u32) -> u32 {
        let sp = &mut self.bus.sp;
        match offset {
            0x00 => sp.mem_addr,
            0x04 => sp.dram_addr,
            0x08 | 0x0C => sp.last_length.to_bits(),
            0x10 => sp.status.to_bits(),
            0x14 => sp.status.dma_full() as u32,
            0x18 => sp.status.dma_busy() as u32,
            0x1C => {
                let value = sp.semaphore as u32;
                sp.semaphore = true;
                value
            }
            _ => {
                tracing::warn!("read from unknown SP register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn sp_write(&mut self, offset: u32, value: u32) {
        let sp = &mut self.bus.sp;
        match offset {
            0x00 => sp.mem_addr = value & 0x1FF8,
            0x04 => sp.dram_addr = value & 0x00FF_FFF8,
            0x08 => self.sp_dma(Direction::ToSp, DmaLength::from_bits(value)),
            0x0C => self.sp_dma(Direction::ToRdram, DmaLength::from_bits(value)),
            0x10 => {
                let was_halted = sp.status.halt();
                let (clear, set) = sp.write_status(value);
                let halted = sp.status.halt();

                match (clear, set) {
                    (true, false) => self.lower_interrupt(Interrupt::Sp),
                    (false, true) => self.raise_interrupt(Interrupt::Sp),
                    _ => (),
                }

                if was_halted && !halted {
                    self.sp_start();
                } else if !was_halted && halted {
                    self.scheduler.cancel(Event::SpTask);
                }
            }
            0x14 | 0x18 => (),
            0x1C => sp.semaphore = false,
            _ => tracing::warn!("write {value:08X} to unknown SP register {offset:02X}"),
        }
    }

    pub(crate) fn sp_pc_read(&mut self) -> u32 {
        self.bus.sp.pc
    }

    pub(crate) fn sp_pc_write(&mut self, value: u32) {
        self.bus.sp.pc = value & 0xFFC;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_pairs() {
        let mut sp = SignalProcessor::default();
        assert!(sp.status.halt());

        // clear halt, set interrupt on break, set signal 2
        let (clear, set) = sp.write_status(1 | (1 << 8) | (1 << 14));
        assert!(!clear && !set);
        assert!(!sp.status.halt());
        assert!(sp.status.interrupt_on_break());
        assert_eq!(sp.status.signals(), 0b100);

        // clear signal 2, set interrupt
        let (clear, set) = sp.write_status((1 << 13) | (1 << 4));
        assert!(!clear && set);
        assert_eq!(sp.status.signals(), 0);
    }

    #[test]
    fn dma_length_fields() {
        let length = DmaLength::from_bits(0x0080_1007);
        assert_eq!(length.len().value(), 7);
        assert_eq!(length.count(), 1);
        assert_eq!(length.skip().value(), 8);
    }
}
