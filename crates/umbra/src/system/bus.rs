//! Physical memory router.

use strum::IntoStaticStr;
use vr4300::Address;

use crate::{
    Primitive,
    system::{
        System,
        ai::AudioInterface,
        cart::{self, Cartridge},
        dp::DisplayProcessor,
        mem::{CODE_PAGES, Memory},
        mi::MipsInterface,
        pi::PeripheralInterface,
        pif::{self, Pif},
        ri::RdramInterface,
        si::SerialInterface,
        sp::{self, SignalProcessor},
        vi::VideoInterface,
    },
};

/// Size of the window RDRAM is mapped into.
pub const RDRAM_WINDOW: u32 = 0x03F0_0000;

/// The bus of the system. Contains every memory mapped peripheral.
pub struct Bus {
    pub mem: Memory,
    pub mi: MipsInterface,
    pub vi: VideoInterface,
    pub ai: AudioInterface,
    pub pi: PeripheralInterface,
    pub ri: RdramInterface,
    pub si: SerialInterface,
    pub pif: Pif,
    pub sp: SignalProcessor,
    pub dp: DisplayProcessor,
    pub cart: Cartridge,
}

/// Devices with 32-bit register files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Device {
    RdramRegs,
    Sp,
    SpPc,
    Dp,
    Mi,
    Vi,
    Ai,
    Pi,
    Ri,
    Si,
    /// Cartridge domain 2 (SRAM and Flash).
    CartIo,
}

/// Allows the usage of const values in patterns. It's a neat trick!
struct ConstTrick<const N: u32>;
impl<const N: u32> ConstTrick<N> {
    const OUTPUT: u32 = N;
}

macro_rules! map {
    ($offset:ident, $match_addr:expr; $($addr:expr, $size:expr => $block:expr,)* @default => $default:expr $(,)?) => {
        match $match_addr.value() {
            $(
                $addr..=ConstTrick::<{ $addr + ($size - 1) }>::OUTPUT => {
                    #[allow(unused_assignments)]
                    {
                        $offset = $match_addr.value() - $addr;
                    }
                    $block
                }
            )*
            _ => $default
        }
    };
}

impl System {
    fn reg_read(&mut self, device: Device, offset: u32) -> u32 {
        let value = match device {
            Device::RdramRegs => self.rdram_regs_read(offset),
            Device::Sp => self.sp_read(offset),
            Device::SpPc => {
                if offset == 0 {
                    self.sp_pc_read()
                } else {
                    0
                }
            }
            Device::Dp => self.dp_read(offset),
            Device::Mi => self.mi_read(offset),
            Device::Vi => self.vi_read(offset),
            Device::Ai => self.ai_read(offset),
            Device::Pi => self.pi_read(offset),
            Device::Ri => self.ri_read(offset),
            Device::Si => self.si_read(offset),
            Device::CartIo => self.bus.cart.read_io(
                cart::SAVE_BASE + offset,
                self.modules.save.as_mut(),
            ),
        };

        tracing::trace!(
            device = <&str>::from(device),
            "read {value:08X} from register {offset:02X}"
        );

        value
    }

    fn reg_write(&mut self, device: Device, offset: u32, value: u32) {
        tracing::trace!(
            device = <&str>::from(device),
            "write {value:08X} to register {offset:02X}"
        );

        match device {
            Device::RdramRegs => (),
            Device::Sp => self.sp_write(offset, value),
            Device::SpPc => {
                if offset == 0 {
                    self.sp_pc_write(value);
                }
            }
            Device::Dp => self.dp_write(offset, value),
            Device::Mi => self.mi_write(offset, value),
            Device::Vi => self.vi_write(offset, value),
            Device::Ai => self.ai_write(offset, value),
            Device::Pi => self.pi_write(offset, value),
            Device::Ri => self.ri_write(offset, value),
            Device::Si => self.si_write(offset, value),
            Device::CartIo => self.bus.cart.write_io(
                cart::SAVE_BASE + offset,
                value,
                self.modules.save.as_mut(),
            ),
        }

        // a write might have scheduled an event or raised an interrupt
        self.exit_requested = true;
    }

    /// Reads a primitive from a register file. Registers are 32 bits wide: narrower reads extract
    /// bytes from the word and 64-bit reads access two consecutive registers.
    fn read_regs<P: Primitive>(&mut self, device: Device, offset: u32) -> P {
        let base = offset & !3;
        let words = size_of::<P>().div_ceil(4) as u32;

        let mut bytes = [0; 8];
        for i in 0..words {
            let word = self.reg_read(device, base + 4 * i);
            bytes[4 * i as usize..][..4].copy_from_slice(&word.to_be_bytes());
        }

        P::read_be_bytes(&bytes[(offset & 3) as usize..])
    }

    /// Writes a primitive to a register file. Narrower writes place their bytes inside an
    /// otherwise zero word.
    fn write_regs<P: Primitive>(&mut self, device: Device, offset: u32, value: P) {
        let base = offset & !3;
        let words = size_of::<P>().div_ceil(4) as u32;

        let mut bytes = [0; 8];
        value.write_be_bytes(&mut bytes[(offset & 3) as usize..]);
        for i in 0..words {
            let word = u32::read_be_bytes(&bytes[4 * i as usize..]);
            self.reg_write(device, base + 4 * i, word);
        }
    }

    /// Reads a primitive from the given physical address. Unmapped addresses read as zero.
    pub fn read<P: Primitive>(&mut self, addr: Address) -> P {
        let offset: u32;
        map! {
            offset, addr;
            0x0000_0000, RDRAM_WINDOW => P::read_be_bytes(self.bus.mem.rdram.get(offset as usize..).unwrap_or_default()),
            0x03F0_0000, 0x0010_0000 => self.read_regs(Device::RdramRegs, offset),
            0x0400_0000, 0x0004_0000 => {
                let (mem, offset) = self.bus.mem.sp_mem(addr);
                P::read_be_bytes(&mem[offset..])
            },
            0x0404_0000, 0x0004_0000 => self.read_regs(Device::Sp, offset),
            0x0408_0000, 0x0008_0000 => self.read_regs(Device::SpPc, offset),
            0x0410_0000, 0x0010_0000 => self.read_regs(Device::Dp, offset),
            0x0430_0000, 0x0010_0000 => self.read_regs(Device::Mi, offset),
            0x0440_0000, 0x0010_0000 => self.read_regs(Device::Vi, offset),
            0x0450_0000, 0x0010_0000 => self.read_regs(Device::Ai, offset),
            0x0460_0000, 0x0010_0000 => self.read_regs(Device::Pi, offset),
            0x0470_0000, 0x0010_0000 => self.read_regs(Device::Ri, offset),
            0x0480_0000, 0x0010_0000 => self.read_regs(Device::Si, offset),
            0x0800_0000, 0x0800_0000 => self.read_regs(Device::CartIo, offset),
            0x1000_0000, 0x0FC0_0000 => {
                let cart = &self.bus.cart;
                P::read_be_bytes(&cart.rom()[cart.rom_offset(offset)..])
            },
            0x1FC0_0000, 0x0000_07C0 => P::default(),
            0x1FC0_07C0, 0x0000_0040 => P::read_be_bytes(&self.bus.pif.ram[offset as usize..]),
            @default => {
                tracing::debug!("reading from {addr} (unmapped)");
                P::default()
            },
        }
    }

    /// Writes a primitive to the given physical address. Writes to unmapped addresses are
    /// discarded.
    pub fn write<P: Primitive>(&mut self, addr: Address, value: P) {
        let offset: u32;
        map! {
            offset, addr;
            0x0000_0000, RDRAM_WINDOW => {
                let Some(slice) = self.bus.mem.rdram.get_mut(offset as usize..) else {
                    return;
                };

                value.write_be_bytes(slice);
                if self.bus.mem.code.written(addr.page()) {
                    self.exit_requested = true;
                }
            },
            0x03F0_0000, 0x0010_0000 => self.write_regs(Device::RdramRegs, offset, value),
            0x0400_0000, 0x0004_0000 => {
                let (mem, offset) = self.bus.mem.sp_mem_mut(addr);
                value.write_be_bytes(&mut mem[offset..]);
                if self.bus.mem.code.written(addr.page()) {
                    self.exit_requested = true;
                }
            },
            0x0404_0000, 0x0004_0000 => self.write_regs(Device::Sp, offset, value),
            0x0408_0000, 0x0008_0000 => self.write_regs(Device::SpPc, offset, value),
            0x0410_0000, 0x0010_0000 => self.write_regs(Device::Dp, offset, value),
            0x0430_0000, 0x0010_0000 => self.write_regs(Device::Mi, offset, value),
            0x0440_0000, 0x0010_0000 => self.write_regs(Device::Vi, offset, value),
            0x0450_0000, 0x0010_0000 => self.write_regs(Device::Ai, offset, value),
            0x0460_0000, 0x0010_0000 => self.write_regs(Device::Pi, offset, value),
            0x0470_0000, 0x0010_0000 => self.write_regs(Device::Ri, offset, value),
            0x0480_0000, 0x0010_0000 => self.write_regs(Device::Si, offset, value),
            0x0800_0000, 0x0800_0000 => self.write_regs(Device::CartIo, offset, value),
            0x1000_0000, 0x0FC0_0000 => {
                tracing::debug!("ignoring write {value:08X} to cartridge ROM at {addr}");
            },
            0x1FC0_07C0, 0x0000_0040 => {
                value.write_be_bytes(&mut self.bus.pif.ram[offset as usize..]);
                self.pif_written();
                self.exit_requested = true;
            },
            @default => {
                tracing::debug!("writing {value:08X} to {addr} (unmapped)");
            },
        }
    }
}

/// Whether `addr` can hold code a core may cache.
#[inline(always)]
pub fn is_cacheable_code(addr: Address) -> bool {
    (addr.page() as usize) < CODE_PAGES
        && (addr.value() < RDRAM_WINDOW
            || (cart::ROM_BASE..pif::ROM_BASE).contains(&addr.value())
            || (0x0400_0000..sp::REGS_BASE).contains(&addr.value()))
}
