//! Display processor command interface.

use bitos::bitos;

use crate::system::{Event, System, mem::SP_MEM_LEN, mi::Interrupt, mi::apply_pair};

/// CPU cycles between a full sync reaching the RDP and its interrupt.
pub const SYNC_CYCLES: u64 = 0x400;

/// Opcode of the "sync full" command.
const SYNC_FULL: u8 = 0x29;

/// Length, in 64-bit words, of each RDP command.
const COMMAND_LENGTHS: [u8; 64] = {
    let mut table = [1; 64];
    table[0x08] = 4;
    table[0x09] = 6;
    table[0x0A] = 12;
    table[0x0B] = 14;
    table[0x0C] = 12;
    table[0x0D] = 14;
    table[0x0E] = 20;
    table[0x0F] = 22;
    table[0x24] = 2;
    table[0x25] = 2;
    table
};

/// Opcode of the command starting with `word`.
#[inline(always)]
pub fn opcode(word: u32) -> u8 {
    (word >> 24) as u8 & 0x3F
}

/// Length in 32-bit words of the command starting with `word`.
#[inline(always)]
pub fn command_len(word: u32) -> usize {
    COMMAND_LENGTHS[opcode(word) as usize] as usize * 2
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    #[bits(0)]
    pub xbus: bool,
    #[bits(1)]
    pub freeze: bool,
    #[bits(2)]
    pub flush: bool,
    #[bits(3)]
    pub start_gclk: bool,
    #[bits(4)]
    pub tmem_busy: bool,
    #[bits(5)]
    pub pipe_busy: bool,
    #[bits(6)]
    pub cmd_busy: bool,
    #[bits(7)]
    pub cbuf_ready: bool,
    #[bits(8)]
    pub dma_busy: bool,
    #[bits(9)]
    pub end_valid: bool,
    #[bits(10)]
    pub start_valid: bool,
}

#[derive(Debug, Default)]
pub struct DisplayProcessor {
    pub start: u32,
    pub end: u32,
    pub current: u32,
    pub status: Status,
    pub clock: u32,
    pub buf_busy: u32,
    pub pipe_busy: u32,
    pub tmem: u32,
    /// Words of a command which is not complete yet.
    partial: Vec<u32>,
}

impl DisplayProcessor {
    pub fn write_status(&mut self, value: u32) {
        let mut status = self.status;
        status.set_xbus(apply_pair(value, 0, status.xbus()));
        status.set_freeze(apply_pair(value, 2, status.freeze()));
        status.set_flush(apply_pair(value, 4, status.flush()));

        if value & (1 << 6) != 0 {
            self.tmem = 0;
        }

        if value & (1 << 7) != 0 {
            self.pipe_busy = 0;
        }

        if value & (1 << 8) != 0 {
            self.buf_busy = 0;
        }

        if value & (1 << 9) != 0 {
            self.clock = 0;
        }

        self.status = status;
    }

    /// Splits the words received so far into complete commands, calling `f` for each of them.
    /// Incomplete trailing commands are kept for the next batch.
    pub fn split_commands(&mut self, words: &[u32], mut f: impl FnMut(&[u32])) {
        self.partial.extend_from_slice(words);

        let mut consumed = 0;
        while let Some(&first) = self.partial.get(consumed) {
            let len = command_len(first);
            let Some(command) = self.partial.get(consumed..consumed + len) else {
                break;
            };

            f(command);
            consumed += len;
        }

        self.partial.drain(..consumed);
    }
}

impl System {
    /// Processes commands in `[current, end)`.
    fn dp_process(&mut self) {
        let dp = &mut self.bus.dp;
        if dp.status.freeze() || dp.current >= dp.end {
            return;
        }

        let start = dp.current;
        let end = dp.end;
        let xbus = dp.status.xbus();
        let mut bytes = vec![0; (end - start) as usize];
        if xbus {
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = self.bus.mem.dmem[(start as usize + i) % SP_MEM_LEN];
            }
        } else {
            self.bus.mem.read_rdram(start, &mut bytes);
        }

        let words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect::<Vec<_>>();

        tracing::trace!(
            start = format_args!("{start:08X}"),
            end = format_args!("{end:08X}"),
            xbus,
            "processing RDP commands"
        );

        let mut sync = false;
        let render = &mut self.modules.render;
        let rdram = &mut self.bus.mem.rdram;
        self.bus.dp.split_commands(&words, |command| {
            sync |= opcode(command[0]) == SYNC_FULL;
            render.command(command, &mut rdram[..]);
        });

        let dp = &mut self.bus.dp;
        dp.current = end;
        dp.status.set_start_valid(false);
        dp.status.set_cbuf_ready(true);

        if sync {
            self.scheduler.schedule(Event::DpSync, SYNC_CYCLES);
        }
    }

    /// Runs the commands an RSP task left in DMEM.
    pub(crate) fn dp_run_dmem(&mut self, start: u32, end: u32) {
        let dp = &mut self.bus.dp;
        dp.status.set_xbus(true);
        dp.start = start & 0xFF8;
        dp.current = dp.start;
        dp.end = end & 0xFF8;
        self.dp_process();
    }

    pub(crate) fn dp_sync_complete(&mut self) {
        self.raise_interrupt(Interrupt::Dp);
    }

    pub(crate) fn dp_read(&mut self, offset: u32) -> u32 {
        let dp = &self.bus.dp;
        match offset {
            0x00 => dp.start,
            0x04 => dp.end,
            0x08 => dp.current,
            0x0C => dp.status.to_bits(),
            0x10 => dp.clock,
            0x14 => dp.buf_busy,
            0x18 => dp.pipe_busy,
            0x1C => dp.tmem,
            _ => {
                tracing::warn!("read from unknown DP register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn dp_write(&mut self, offset: u32, value: u32) {
        let dp = &mut self.bus.dp;
        match offset {
            0x00 => {
                if !dp.status.start_valid() {
                    dp.start = value & 0x00FF_FFF8;
                    dp.status.set_start_valid(true);
                }
            }
            0x04 => {
                dp.end = value & 0x00FF_FFF8;
                if dp.status.start_valid() {
                    dp.current = dp.start;
                }

                self.dp_process();
            }
            0x0C => {
                let was_frozen = dp.status.freeze();
                dp.write_status(value);
                if was_frozen && !self.bus.dp.status.freeze() {
                    self.dp_process();
                }
            }
            0x08 | 0x10..=0x1C => (),
            _ => tracing::warn!("write {value:08X} to unknown DP register {offset:02X}"),
        }
    }
}
