//! Audio interface: DMA of PCM samples to the DAC.

use std::collections::VecDeque;

use vr4300::FREQUENCY;

use crate::system::{Event, System, mi::Interrupt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    pub addr: u32,
    pub len: u32,
}

#[derive(Debug, Default)]
pub struct AudioInterface {
    pub dram_addr: u32,
    pub dma_enabled: bool,
    pub dac_rate: u32,
    pub bit_rate: u32,
    /// Buffers queued for playback. The front one is playing.
    pub fifo: VecDeque<Buffer>,
}

impl AudioInterface {
    pub fn full(&self) -> bool {
        self.fifo.len() >= 2
    }

    pub fn busy(&self) -> bool {
        !self.fifo.is_empty()
    }

    pub fn status(&self) -> u32 {
        let full = self.full() as u32;
        let busy = self.busy() as u32;
        (full << 31) | (busy << 30) | (self.dma_enabled as u32) << 25 | (1 << 24) | (1 << 20) | full
    }

    /// Output sample rate for the given VI clock.
    pub fn sample_rate(&self, vi_clock: u64) -> u64 {
        vi_clock / (self.dac_rate as u64 + 1)
    }

    /// CPU cycles needed to play `len` bytes of stereo 16-bit samples.
    pub fn duration(&self, vi_clock: u64, len: u32) -> u64 {
        let samples = (len / 4) as u64;
        let rate = self.sample_rate(vi_clock).max(1);
        (samples * FREQUENCY / rate).max(1)
    }
}

impl System {
    fn ai_vi_clock(&self) -> u64 {
        self.tv().clock()
    }

    /// Starts playing the buffer at the front of the FIFO.
    fn ai_start(&mut self) {
        let Some(&buffer) = self.bus.ai.fifo.front() else {
            return;
        };

        let mut bytes = vec![0; buffer.len as usize];
        self.bus.mem.read_rdram(buffer.addr, &mut bytes);
        let samples = bytes
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect::<Vec<_>>();

        self.modules.audio.play(&samples);

        let cycles = self.bus.ai.duration(self.ai_vi_clock(), buffer.len);
        tracing::debug!(?buffer, cycles, "started AI DMA");
        self.scheduler.schedule(Event::AiDma, cycles);
    }

    pub(crate) fn ai_dma_complete(&mut self) {
        self.bus.ai.fifo.pop_front();
        self.raise_interrupt(Interrupt::Ai);
        self.ai_start();
    }

    /// Bytes left to play of the current buffer.
    fn ai_remaining(&self) -> u32 {
        let Some(buffer) = self.bus.ai.fifo.front() else {
            return 0;
        };

        let Some(cycles) = self.scheduler.remaining(Event::AiDma) else {
            return 0;
        };

        let total = self.bus.ai.duration(self.ai_vi_clock(), buffer.len);
        let remaining = buffer.len as u64 * cycles / total.max(1);
        (remaining as u32).min(buffer.len) & !7
    }

    pub(crate) fn ai_read(&mut self, offset: u32) -> u32 {
        match offset {
            0x04 => self.ai_remaining(),
            0x0C => self.bus.ai.status(),
            // write only registers mirror AI_LEN
            0x00 | 0x08 | 0x10 | 0x14 => self.ai_remaining(),
            _ => {
                tracing::warn!("read from unknown AI register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn ai_write(&mut self, offset: u32, value: u32) {
        let ai = &mut self.bus.ai;
        match offset {
            0x00 => ai.dram_addr = value & 0x00FF_FFF8,
            0x04 => {
                let len = value & 0x0003_FFF8;
                if len == 0 || ai.full() {
                    tracing::debug!(len, "dropping AI buffer");
                    return;
                }

                ai.fifo.push_back(Buffer {
                    addr: ai.dram_addr,
                    len,
                });

                if ai.fifo.len() == 1 {
                    self.ai_start();
                }
            }
            0x08 => ai.dma_enabled = value & 1 != 0,
            0x0C => self.lower_interrupt(Interrupt::Ai),
            0x10 => {
                ai.dac_rate = value & 0x3FFF;
                let rate = self.bus.ai.sample_rate(self.tv().clock());
                tracing::debug!(rate, "AI sample rate changed");
                self.modules.audio.set_sample_rate(rate as u32);
            }
            0x14 => ai.bit_rate = value & 0xF,
            _ => tracing::warn!("write {value:08X} to unknown AI register {offset:02X}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_bits() {
        let mut ai = AudioInterface::default();
        assert_eq!(ai.status() >> 30, 0);

        ai.fifo.push_back(Buffer { addr: 0, len: 8 });
        assert_eq!(ai.status() >> 30, 0b01);

        ai.fifo.push_back(Buffer { addr: 8, len: 8 });
        assert_eq!(ai.status() >> 30, 0b11);
        assert_eq!(ai.status() & 1, 1);
    }

    #[test]
    fn duration_follows_dac_rate() {
        let ai = AudioInterface {
            dac_rate: 48_681_812 / 32_000 - 1,
            ..Default::default()
        };

        let rate = ai.sample_rate(48_681_812);
        assert!(rate.abs_diff(32_000) < 30);

        // one second worth of samples
        let cycles = ai.duration(48_681_812, rate as u32 * 4);
        assert!(cycles.abs_diff(FREQUENCY) < 10);
    }
}
