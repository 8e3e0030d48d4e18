//! Video interface: scan out timing and frame presentation.

use bitos::{
    bitos,
    integer::{u2, u4},
};
use vr4300::FREQUENCY;

use crate::{
    modules::render::{Frame, PixelFormat},
    system::{Event, System, mi::Interrupt},
};

/// Half-lines per field used while V_SYNC is not programmed.
const DEFAULT_V_SYNC: u32 = 0x20D;

/// Television standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TvType {
    Pal = 0,
    #[default]
    Ntsc = 1,
    Mpal = 2,
}

impl TvType {
    /// Guesses the standard from the region byte of a game code.
    pub fn from_region(region: u8) -> Self {
        match region {
            b'D' | b'F' | b'H' | b'I' | b'P' | b'S' | b'U' | b'W' | b'X' | b'Y' => Self::Pal,
            b'B' => Self::Mpal,
            _ => Self::Ntsc,
        }
    }

    /// Fields per second.
    pub fn refresh_rate(self) -> u64 {
        match self {
            Self::Pal => 50,
            Self::Ntsc | Self::Mpal => 60,
        }
    }

    /// Frequency of the VI clock, in Hz.
    pub fn clock(self) -> u64 {
        match self {
            Self::Pal => 49_656_530,
            Self::Ntsc => 48_681_812,
            Self::Mpal => 48_628_316,
        }
    }
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PixelType {
    #[default]
    Blank = 0,
    Reserved = 1,
    Rgba5551 = 2,
    Rgba8888 = 3,
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Control {
    #[bits(0..2)]
    pub pixel_type: PixelType,
    #[bits(2)]
    pub gamma_dither: bool,
    #[bits(3)]
    pub gamma: bool,
    #[bits(4)]
    pub divot: bool,
    #[bits(5)]
    pub vbus_clock: bool,
    /// Interlaced output.
    #[bits(6)]
    pub serrate: bool,
    #[bits(8..10)]
    pub aa_mode: u2,
    #[bits(12..16)]
    pub pixel_advance: u4,
    #[bits(16)]
    pub dither_filter: bool,
}

#[derive(Debug, Default)]
pub struct VideoInterface {
    pub control: Control,
    pub origin: u32,
    pub width: u32,
    pub v_intr: u32,
    /// Current half-line. The lowest bit is the field when interlaced.
    pub v_current: u32,
    pub burst: u32,
    pub v_sync: u32,
    pub h_sync: u32,
    pub h_sync_leap: u32,
    pub h_video: u32,
    pub v_video: u32,
    pub v_burst: u32,
    pub x_scale: u32,
    pub y_scale: u32,
    /// Fields presented so far.
    pub fields: u64,
}

impl VideoInterface {
    /// Half-lines per field.
    pub fn half_lines(&self) -> u32 {
        match self.v_sync {
            0..2 => DEFAULT_V_SYNC,
            v => v,
        }
    }

    /// CPU cycles per scan line.
    pub fn cycles_per_line(&self, tv: TvType) -> u64 {
        let lines = (self.half_lines() as u64).div_ceil(2);
        FREQUENCY / tv.refresh_rate() / lines
    }

    /// Advances to the next line. Returns whether a new field started.
    pub fn advance_line(&mut self) -> bool {
        self.v_current += 2;
        if self.v_current < self.half_lines() {
            return false;
        }

        let field = self.control.serrate() && self.v_current & 1 == 0;
        self.v_current = field as u32;
        self.fields += 1;
        true
    }

    /// Whether the current line matches V_INTR.
    pub fn at_interrupt_line(&self) -> bool {
        (self.v_current & !1) == (self.v_intr & 0x3FE)
    }

    /// The framebuffer being scanned out.
    pub fn frame(&self) -> Frame {
        let format = match self.control.pixel_type() {
            PixelType::Blank | PixelType::Reserved => PixelFormat::Blank,
            PixelType::Rgba5551 => PixelFormat::Rgba5551,
            PixelType::Rgba8888 => PixelFormat::Rgba8888,
        };

        let v_start = (self.v_video >> 16) & 0x3FF;
        let v_end = self.v_video & 0x3FF;
        let y_scale = self.y_scale & 0xFFF;
        let height = (v_end.saturating_sub(v_start) / 2 * y_scale) >> 10;

        Frame {
            origin: self.origin,
            width: self.width,
            height,
            format,
        }
    }
}

impl System {
    pub(crate) fn vi_line(&mut self) {
        let vi = &mut self.bus.vi;
        if vi.advance_line() {
            let frame = vi.frame();
            tracing::trace!(?frame, field = vi.fields, "presenting field");
            self.modules.render.frame(frame, &self.bus.mem.rdram);
            self.modules.input.frame();
        }

        if self.bus.vi.at_interrupt_line() {
            self.raise_interrupt(Interrupt::Vi);
        }

        let cycles = self.bus.vi.cycles_per_line(self.tv());
        self.scheduler.schedule(Event::ViLine, cycles);
    }

    pub(crate) fn vi_read(&mut self, offset: u32) -> u32 {
        let vi = &self.bus.vi;
        match offset {
            0x00 => vi.control.to_bits(),
            0x04 => vi.origin,
            0x08 => vi.width,
            0x0C => vi.v_intr,
            0x10 => vi.v_current,
            0x14 => vi.burst,
            0x18 => vi.v_sync,
            0x1C => vi.h_sync,
            0x20 => vi.h_sync_leap,
            0x24 => vi.h_video,
            0x28 => vi.v_video,
            0x2C => vi.v_burst,
            0x30 => vi.x_scale,
            0x34 => vi.y_scale,
            _ => {
                tracing::warn!("read from unknown VI register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn vi_write(&mut self, offset: u32, value: u32) {
        let vi = &mut self.bus.vi;
        match offset {
            0x00 => vi.control = Control::from_bits(value & 0x0001_FB7F),
            0x04 => vi.origin = value & 0x00FF_FFFF,
            0x08 => vi.width = value & 0xFFF,
            0x0C => vi.v_intr = value & 0x3FF,
            0x10 => self.lower_interrupt(Interrupt::Vi),
            0x14 => vi.burst = value & 0x3FFF_FFFF,
            0x18 => vi.v_sync = value & 0x3FF,
            0x1C => vi.h_sync = value & 0x001F_0FFF,
            0x20 => vi.h_sync_leap = value & 0x0FFF_0FFF,
            0x24 => vi.h_video = value & 0x03FF_03FF,
            0x28 => vi.v_video = value & 0x03FF_03FF,
            0x2C => vi.v_burst = value & 0x03FF_03FF,
            0x30 => vi.x_scale = value & 0x0FFF_0FFF,
            0x34 => vi.y_scale = value & 0x0FFF_0FFF,
            _ => tracing::warn!("write {value:08X} to unknown VI register {offset:02X}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn progressive_fields() {
        let mut vi = VideoInterface {
            v_sync: 10,
            ..Default::default()
        };

        let wraps = (0..10).filter(|_| vi.advance_line()).count();
        assert_eq!(wraps, 2);
        assert_eq!(vi.fields, 2);
        assert_eq!(vi.v_current, 0);
    }

    #[test]
    fn interlaced_fields_alternate() {
        let mut vi = VideoInterface {
            v_sync: 10,
            control: Control::default().with_serrate(true),
            ..Default::default()
        };

        while !vi.advance_line() {}
        assert_eq!(vi.v_current, 1);
        while !vi.advance_line() {}
        assert_eq!(vi.v_current, 0);
    }

    #[test]
    fn frame_description() {
        let vi = VideoInterface {
            control: Control::default().with_pixel_type(PixelType::Rgba5551),
            origin: 0x10_0000,
            width: 320,
            v_video: (0x25 << 16) | 0x1FF,
            y_scale: 0x400,
            ..Default::default()
        };

        let frame = vi.frame();
        assert_eq!(frame.format, PixelFormat::Rgba5551);
        assert_eq!(frame.height, 237);
        assert_eq!(frame.width, 320);
    }

    #[test]
    fn line_timing() {
        let vi = VideoInterface::default();
        let line = vi.cycles_per_line(TvType::Ntsc);
        let field = line * (DEFAULT_V_SYNC as u64).div_ceil(2);
        assert!(field.abs_diff(FREQUENCY / 60) < 263);
    }
}
