mod cli;

use std::{io::BufReader, time::Instant};

use clap::Parser;
use cores::{cached::CachedInterpreter, interpreter::Interpreter, jit};
use eyre_pretty::{Context, Result};
use modules::{audio::SharedAudio, movie::MoviePlayback, save::FileSave};
use umbra::{
    Cycles, Umbra,
    carts::{m64::Movie, rom::Rom},
    cores::CpuCore,
    system::{self, Modules},
};

use crate::cli::CoreKind;

/// Samples kept around for a host audio backend, about a second of stereo audio.
const AUDIO_CAPACITY: usize = 2 * 48_000;

fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();
}

struct Frames {
    limit: Option<u64>,
    audio: modules::audio::AudioReceiver,
}

fn run<C: CpuCore>(mut umbra: Umbra<C>, frames: Frames) {
    let start = Instant::now();
    let mut total = Cycles(0);
    let mut samples = vec![0; AUDIO_CAPACITY];

    let mut frame = 0u64;
    while frames.limit.is_none_or(|limit| frame < limit) {
        let executed = umbra.run_frame();
        total += executed.cycles;

        let played = frames.audio.drain(&mut samples);
        tracing::trace!(frame, cycles = executed.cycles.0, played, "frame done");

        frame += 1;
        if frame % 60 == 0 {
            tracing::debug!(frame, pc = format!("{:016X}", umbra.system.cpu.pc), "still running");
        }
    }

    let elapsed = start.elapsed();
    tracing::info!(
        frames = frame,
        cycles = total.0,
        dropped_samples = frames.audio.dropped(),
        "finished in {elapsed:.2?} ({:.1} fps)",
        frame as f64 / elapsed.as_secs_f64()
    );

    umbra.system.modules.save.flush();
}

fn main() -> Result<()> {
    eyre_pretty::install()?;
    setup_tracing();

    let config = cli::Config::parse();

    let rom = Rom::open(&config.rom).context("loading rom")?;

    let (audio, receiver) = SharedAudio::new(AUDIO_CAPACITY);
    let mut modules = Modules {
        audio: Box::new(audio),
        ..Default::default()
    };

    let save_type = system::cart::SaveType::from(config.save_type);
    if save_type.size() > 0 {
        let path = config
            .save
            .clone()
            .unwrap_or_else(|| config.rom.with_extension("sav"));

        let save = FileSave::open(&path, save_type.size()).context("opening save file")?;
        modules.save = Box::new(save);
    }

    let mut limit = config.frames;
    if let Some(path) = &config.movie {
        let file = std::fs::File::open(path).context("opening movie")?;
        let movie = Movie::read(BufReader::new(file)).context("reading movie")?;

        limit = limit.or(Some(movie.samples.len() as u64));
        modules.input = Box::new(MoviePlayback::new(movie));
    }

    let system_config = system::Config {
        rom: Some(rom),
        save: save_type,
        cic: config.cic.into(),
        rdram: config.rdram(),
        tv: config.tv.map(Into::into),
    };

    let frames = Frames {
        limit,
        audio: receiver,
    };

    tracing::info!(core = ?config.core, "starting");
    match config.core {
        CoreKind::Interpreter => run(Umbra::new(Interpreter, modules, system_config), frames),
        CoreKind::Cached => run(
            Umbra::new(CachedInterpreter::new(), modules, system_config),
            frames,
        ),
        CoreKind::Jit => {
            let core = jit::Core::new(jit::Config {
                jit_settings: config.jit.settings(),
            })
            .context("reserving jit arena")?;

            run(Umbra::new(core, modules, system_config), frames);
        }
    }

    Ok(())
}
