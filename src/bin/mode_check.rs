//! mode_check - validate mode files without running them
//!
//! Builds every pose of each file against recording devices, so option
//! errors surface exactly as they would at load time. Exits non-zero if any
//! file is invalid.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use gesture_kernel::{Mode, PoseFactory, Runtime};

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate gesture mode files")]
struct Args {
    /// Mode files (JSON or TOML)
    #[arg(required_unless_present = "kinds")]
    files: Vec<PathBuf>,

    /// List the pose kinds this build understands
    #[arg(long)]
    kinds: bool,

    /// Print each pose of a valid mode
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if args.kinds {
        for kind in PoseFactory::standard().kinds() {
            println!("{}", kind);
        }
    }

    let mut failures = 0;
    for path in &args.files {
        let (runtime, _, _) = Runtime::recording(Default::default());
        match Mode::load(path, &runtime) {
            Ok(mode) => {
                println!("ok   {} ({}: {} poses)", path.display(), mode.name(), mode.len());
                if args.verbose {
                    for (i, kind) in mode.kinds().iter().enumerate() {
                        println!("     #{} {}", i + 1, kind);
                    }
                }
            }
            Err(err) => {
                failures += 1;
                println!("FAIL {}: {:#}", path.display(), err);
            }
        }
    }

    if failures > 0 {
        eprintln!("{} of {} mode files invalid", failures, args.files.len());
        std::process::exit(1);
    }
    Ok(())
}
