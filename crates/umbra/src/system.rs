//! State of the emulator.

pub mod ai;
pub mod boot;
pub mod bus;
pub mod cart;
pub mod dp;
pub mod mem;
pub mod mi;
pub mod mmu;
pub mod pi;
pub mod pif;
pub mod ri;
pub mod scheduler;
pub mod si;
pub mod sp;
pub mod vi;

use carts::rom::Rom;
use vr4300::Cpu;

use crate::{
    modules::{
        audio::{AudioModule, NopAudioModule},
        input::{InputModule, NopInputModule},
        render::{NopRenderModule, RenderModule},
        rsp::{NopRspModule, RspModule},
        save::{NopSaveModule, SaveModule},
    },
    system::{
        ai::AudioInterface,
        boot::Cic,
        bus::Bus,
        cart::{Cartridge, SaveType},
        dp::DisplayProcessor,
        mem::{Memory, RdramSize},
        mi::MipsInterface,
        pi::PeripheralInterface,
        pif::Pif,
        ri::RdramInterface,
        scheduler::Scheduler,
        si::SerialInterface,
        sp::SignalProcessor,
        vi::{TvType, VideoInterface},
    },
};

/// System configuration.
#[derive(Default)]
pub struct Config {
    /// The cartridge ROM. The system boots without a cartridge if `None`.
    pub rom: Option<Rom>,
    pub save: SaveType,
    pub cic: Cic,
    pub rdram: RdramSize,
    /// Television standard. Derived from the ROM region when `None`.
    pub tv: Option<TvType>,
}

impl Config {
    /// The television standard in effect.
    pub fn tv(&self) -> TvType {
        self.tv.unwrap_or_else(|| {
            self.rom
                .as_ref()
                .map_or(TvType::default(), |rom| {
                    TvType::from_region(rom.header.game_code[3])
                })
        })
    }
}

/// Modules the system uses to interact with the outside world.
pub struct Modules {
    pub audio: Box<dyn AudioModule>,
    pub input: Box<dyn InputModule>,
    pub render: Box<dyn RenderModule>,
    pub rsp: Box<dyn RspModule>,
    pub save: Box<dyn SaveModule>,
}

impl Default for Modules {
    fn default() -> Self {
        Self {
            audio: Box::new(NopAudioModule),
            input: Box::new(NopInputModule),
            render: Box::new(NopRenderModule),
            rsp: Box::new(NopRspModule),
            save: Box::new(NopSaveModule),
        }
    }
}

/// An event which can be scheduled to happen at a specific time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Sentinel which is always scheduled last. Firing it is a bug.
    Never,
    /// The VI reached the next scan line.
    ViLine,
    /// The AI finished playing the current buffer.
    AiDma,
    /// A PI DMA has completed.
    PiDma,
    /// An SI DMA has completed.
    SiDma,
    /// The RSP finished its task.
    SpTask,
    /// The RDP reached a full sync.
    DpSync,
}

/// System state.
pub struct System {
    /// System configuration.
    pub config: Config,
    /// Scheduler for events.
    pub scheduler: Scheduler,
    /// The CPU state.
    pub cpu: Cpu,
    /// The system bus. Contains all other peripherals.
    pub bus: Bus,
    /// Modules of the system.
    pub modules: Modules,
    /// Set whenever something happened which might require a core to stop executing and give
    /// control back to the run loop: a device register was written, an interrupt line changed or
    /// cached code was invalidated.
    pub exit_requested: bool,
}

impl System {
    pub fn new(modules: Modules, mut config: Config) -> Self {
        config.tv = Some(config.tv());

        if let Some(rom) = &config.rom {
            tracing::info!(
                title = %rom.header.title(),
                id = %rom.header.game_id(),
                order = ?rom.order,
                "loaded cartridge"
            );
        }

        let cart = Cartridge::new(config.rom.as_ref(), config.save);
        let mut system = System {
            scheduler: Scheduler::default(),
            cpu: Cpu::default(),
            bus: Bus {
                mem: Memory::new(config.rdram),
                mi: MipsInterface::default(),
                vi: VideoInterface::default(),
                ai: AudioInterface::default(),
                pi: PeripheralInterface::default(),
                ri: RdramInterface::default(),
                si: SerialInterface::default(),
                pif: Pif::default(),
                sp: SignalProcessor::default(),
                dp: DisplayProcessor::default(),
                cart,
            },
            config,
            modules,
            exit_requested: false,
        };

        system.boot();

        let cycles = system.bus.vi.cycles_per_line(system.tv());
        system.scheduler.schedule(Event::ViLine, cycles);

        system
    }

    /// The television standard in effect.
    #[inline(always)]
    pub fn tv(&self) -> TvType {
        self.config.tv.unwrap_or_default()
    }

    /// Advances time by `cycles` CPU cycles: Count/Compare and the scheduler clock. Events are not
    /// processed.
    #[inline(always)]
    pub fn tick(&mut self, cycles: u64) {
        self.cpu.tick(cycles);
        self.scheduler.advance(cycles);
    }

    /// Processes the given event.
    pub fn process(&mut self, event: Event) {
        tracing::trace!(?event, cycle = self.scheduler.elapsed(), "processing event");
        match event {
            Event::Never => panic!("the never event fired at cycle {}", self.scheduler.elapsed()),
            Event::ViLine => self.vi_line(),
            Event::AiDma => self.ai_dma_complete(),
            Event::PiDma => self.pi_dma_complete(),
            Event::SiDma => self.si_dma_complete(),
            Event::SpTask => self.sp_task_complete(),
            Event::DpSync => self.dp_sync_complete(),
        }
    }

    /// Processes every due event, in order.
    pub fn process_events(&mut self) {
        while let Some(event) = self.scheduler.pop() {
            self.process(event);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::system::mi::Interrupt;

    fn system() -> System {
        let mut sys = System::new(Modules::default(), Config::default());
        // enable every RCP interrupt
        sys.bus.mi.write_mask(0xAAA);
        sys
    }

    fn run(sys: &mut System, cycles: u64) {
        sys.tick(cycles);
        sys.process_events();
    }

    #[test]
    fn boot_state() {
        let sys = system();
        assert_eq!(sys.cpu.pc, 0xFFFF_FFFF_A400_0040);
        assert_eq!(sys.cpu.gpr[29], 0xFFFF_FFFF_A400_1FF0);
        assert_eq!(sys.cpu.gpr[22], 0x3F);
        assert!(!sys.cpu.cop0.status.erl());

        let len = sys.bus.mem.rdram.len() as u32;
        assert_eq!(sys.bus.mem.rdram[0x318..0x31C], len.to_be_bytes());
        assert!(sys.scheduler.is_scheduled(Event::ViLine));
    }

    #[test]
    fn pi_dma_completes_after_delay() {
        let mut sys = system();
        sys.write(vr4300::Address(0x0460_0000), 0x0000_1000u32);
        sys.write(vr4300::Address(0x0460_0004), 0x1000_0000u32);
        sys.write(vr4300::Address(0x0460_000C), 0x0000_00FFu32);

        assert!(sys.bus.pi.dma_busy);
        assert_eq!(sys.read::<u32>(vr4300::Address(0x0460_0010)) & 1, 1);
        assert_eq!(sys.bus.pi.dram_addr, 0x1100);

        let remaining = sys.scheduler.remaining(Event::PiDma).unwrap();
        run(&mut sys, remaining - 1);
        assert!(sys.bus.pi.dma_busy);

        run(&mut sys, 1);
        assert!(!sys.bus.pi.dma_busy);
        assert_ne!(sys.bus.mi.interrupts & Interrupt::Pi.mask(), 0);

        // clearing the interrupt lowers the CPU line
        sys.write(vr4300::Address(0x0460_0010), 2u32);
        assert_eq!(sys.bus.mi.interrupts & Interrupt::Pi.mask(), 0);
        assert_eq!(sys.cpu.cop0.cause.ip() & (1 << 2), 0);
    }

    #[test]
    fn si_dma_round_trip_through_pif() {
        let mut sys = system();
        sys.bus.mem.rdram[0x2000..0x2004].copy_from_slice(&[0xFE, 0, 0, 0]);

        sys.write(vr4300::Address(0x0480_0000), 0x2000u32);
        sys.write(vr4300::Address(0x0480_0010), 0x1FC0_07C0u32);
        assert_eq!(sys.bus.pif.ram[0], 0xFE);
        assert_eq!(sys.read::<u32>(vr4300::Address(0x0480_0018)) & 1, 1);

        run(&mut sys, si::DMA_CYCLES);
        assert_ne!(sys.bus.mi.interrupts & Interrupt::Si.mask(), 0);
        assert_ne!(sys.cpu.cop0.cause.ip() & (1 << 2), 0);

        sys.write(vr4300::Address(0x0480_0018), 0u32);
        sys.write(vr4300::Address(0x0480_0000), 0x3000u32);
        sys.write(vr4300::Address(0x0480_0004), 0x1FC0_07C0u32);
        run(&mut sys, si::DMA_CYCLES);
        assert_eq!(sys.bus.mem.rdram[0x3000], 0xFE);
    }

    #[test]
    fn unmapped_accesses() {
        let mut sys = system();
        sys.write(vr4300::Address(0x0500_0000), 0xFFu8);
        assert_eq!(sys.read::<u32>(vr4300::Address(0x0500_0000)), 0);
        assert_eq!(sys.read::<u64>(vr4300::Address(0x1FC0_0000)), 0);
    }

    #[test]
    fn narrow_register_reads() {
        let mut sys = system();
        assert_eq!(sys.read::<u32>(vr4300::Address(0x0430_0004)), mi::VERSION);
        assert_eq!(sys.read::<u8>(vr4300::Address(0x0430_0005)), 0x02);
        assert_eq!(sys.read::<u16>(vr4300::Address(0x0430_0006)), 0x0102);
    }

    #[test]
    #[should_panic]
    fn never_event_panics() {
        let mut sys = system();
        sys.process(Event::Never);
    }
}
