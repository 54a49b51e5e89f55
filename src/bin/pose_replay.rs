//! pose_replay - run a mode over recorded frames
//!
//! Reads one JSON `Person` per line, runs the mode's poses on each frame and
//! prints every device event the poses issue as a JSON line on stdout.
//! Inputs still held when the input ends (or on Ctrl-C) are released by the
//! mode teardown and printed too.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gesture_kernel::{
    Clock, DeviceLog, Devices, KernelSettings, ManualClock, Mode, MonotonicClock, NullView, Person,
    Runtime,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay recorded frames through a gesture mode")]
struct Args {
    /// Mode file (JSON or TOML). Falls back to GESTURE_MODE.
    #[arg(long)]
    mode: Option<PathBuf>,

    /// Frames as JSON lines; `-` reads stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Frame rate of the recording. Falls back to GESTURE_FPS.
    #[arg(long)]
    fps: Option<u32>,

    /// Pace frames against the wall clock instead of a simulated one
    #[arg(long)]
    realtime: bool,

    /// Write recalibrated settings back to the settings file on exit
    #[arg(long)]
    save_settings: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let kernel = KernelSettings::load()?;
    let mode_path = args
        .mode
        .or(kernel.mode_path.clone())
        .ok_or_else(|| anyhow!("no mode file given (use --mode or GESTURE_MODE)"))?;
    let fps = args.fps.unwrap_or(kernel.fps);
    if fps == 0 {
        return Err(anyhow!("fps must be positive"));
    }
    let frame_period = Duration::from_secs_f64(1.0 / fps as f64);

    let (devices, log) = Devices::recording(kernel.display);
    let settings = kernel.open_settings()?;
    let manual = ManualClock::new();
    let clock: Arc<dyn Clock> = if args.realtime {
        Arc::new(MonotonicClock)
    } else {
        Arc::new(manual.clone())
    };
    let runtime = Runtime::new(devices, settings).with_clock(clock);

    let mut mode = Mode::load(&mode_path, &runtime)?;
    log::info!(
        "replaying {} at {} fps ({})",
        mode.name(),
        fps,
        if args.realtime { "realtime" } else { "simulated clock" }
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("error setting Ctrl-C handler")?;
    }

    let reader: Box<dyn BufRead> = if args.input == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(&args.input)
            .with_context(|| format!("failed to open frames file {}", args.input))?;
        Box::new(BufReader::new(file))
    };

    let mut out = std::io::stdout().lock();
    let mut view = NullView::default();
    let mut frames = 0u64;
    let mut fired = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        if stop.load(Ordering::SeqCst) {
            log::info!("interrupted, stopping replay");
            break;
        }
        let line = line.context("failed to read frame")?;
        if line.trim().is_empty() {
            continue;
        }
        let person: Person = serde_json::from_str(&line)
            .with_context(|| format!("invalid frame on line {}", lineno + 1))?;

        let started = Instant::now();
        fired += mode.tick(&person, &mut view);
        frames += 1;
        emit(&mut out, &log)?;

        if args.realtime {
            if let Some(rest) = frame_period.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        } else {
            manual.advance(frame_period);
        }
    }

    mode.teardown();
    emit(&mut out, &log)?;
    if args.save_settings {
        runtime.settings.save()?;
    }
    log::info!("{} frames replayed, {} pose firings", frames, fired);
    Ok(())
}

fn emit(out: &mut impl Write, log: &DeviceLog) -> Result<()> {
    for event in log.drain() {
        writeln!(out, "{}", event)?;
    }
    Ok(())
}
