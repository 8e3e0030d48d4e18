use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;
use umbra::system::{boot::Cic, cart::SaveType, mem::RdramSize, vi::TvType};

#[derive(Args, Debug)]
pub struct JitConfig {
    /// Maximum number of instructions per block
    #[arg(visible_alias("ipb"), long, default_value_t = 128)]
    pub instr_per_block: u32,
    /// Capacity of the executable arena, in MiB
    #[arg(long, default_value_t = 32)]
    pub arena_mib: u64,
}

impl JitConfig {
    pub fn settings(&self) -> cores::r4kjit::Settings {
        cores::r4kjit::Settings {
            instr_per_block: self.instr_per_block,
            arena_capacity: (self.arena_mib * bytesize::MIB) as usize,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreKind {
    /// Decodes every instruction as it runs it
    Interpreter,
    /// Keeps decoded instructions until their page is written to
    Cached,
    /// Compiles blocks to native code
    Jit,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    None,
    Eeprom4k,
    Eeprom16k,
    Sram,
    Flash,
}

impl From<SaveKind> for SaveType {
    fn from(value: SaveKind) -> Self {
        match value {
            SaveKind::None => Self::None,
            SaveKind::Eeprom4k => Self::Eeprom4K,
            SaveKind::Eeprom16k => Self::Eeprom16K,
            SaveKind::Sram => Self::Sram256K,
            SaveKind::Flash => Self::Flash1M,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CicKind {
    #[value(name = "6101")]
    Nus6101,
    #[value(name = "6102")]
    Nus6102,
    #[value(name = "6103")]
    Nus6103,
    #[value(name = "6105")]
    Nus6105,
    #[value(name = "6106")]
    Nus6106,
}

impl From<CicKind> for Cic {
    fn from(value: CicKind) -> Self {
        match value {
            CicKind::Nus6101 => Self::Nus6101,
            CicKind::Nus6102 => Self::Nus6102,
            CicKind::Nus6103 => Self::Nus6103,
            CicKind::Nus6105 => Self::Nus6105,
            CicKind::Nus6106 => Self::Nus6106,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvKind {
    Ntsc,
    Pal,
    Mpal,
}

impl From<TvKind> for TvType {
    fn from(value: TvKind) -> Self {
        match value {
            TvKind::Ntsc => Self::Ntsc,
            TvKind::Pal => Self::Pal,
            TvKind::Mpal => Self::Mpal,
        }
    }
}

/// Umbra: headless Nintendo 64 emulator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub jit: JitConfig,
    /// Path to the ROM to load and execute.
    ///
    /// Supported formats are .z64, .v64 and .n64.
    pub rom: PathBuf,
    /// CPU core to run the game with
    #[arg(short, long, value_enum, default_value_t = CoreKind::Jit)]
    pub core: CoreKind,
    /// Number of frames to run. Runs until the movie ends if one is given, or forever otherwise.
    #[arg(short, long)]
    pub frames: Option<u64>,
    /// Save memory of the cartridge
    #[arg(long, value_enum, default_value_t = SaveKind::None)]
    pub save_type: SaveKind,
    /// Path to the save file. Defaults to the ROM path with a .sav extension.
    #[arg(long)]
    pub save: Option<PathBuf>,
    /// Lockout chip of the cartridge
    #[arg(long, value_enum, default_value_t = CicKind::Nus6102)]
    pub cic: CicKind,
    /// Television standard. Guessed from the ROM region when absent.
    #[arg(long, value_enum)]
    pub tv: Option<TvKind>,
    /// Whether to run without the expansion pak
    #[arg(long, default_value_t = false)]
    pub no_expansion: bool,
    /// Path to a .m64 movie to play back on the first controller
    #[arg(short, long)]
    pub movie: Option<PathBuf>,
}

impl Config {
    pub fn rdram(&self) -> RdramSize {
        if self.no_expansion {
            RdramSize::Base
        } else {
            RdramSize::Expanded
        }
    }
}
