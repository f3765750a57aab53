use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use svj_core::prelude::*;

#[derive(Parser)]
#[command(name = "svj-core")]
#[command(about = "Preselection and classifier-feature extraction for boosted SVJ event trees")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process signal files into one truth-matched feature artifact
    Signal {
        /// Input event files (JSONL)
        inputs: Vec<PathBuf>,

        /// Output artifact
        #[arg(short, long, default_value = "data/signal.npz")]
        outfile: PathBuf,
    },

    /// Process signal files found in a local directory
    SignalLocal {
        /// Directory holding the raw signal event files
        #[arg(default_value = "raw_signal")]
        dir: PathBuf,

        /// Output artifact
        #[arg(short, long, default_value = "data/signal.npz")]
        outfile: PathBuf,
    },

    /// Process background files into one feature artifact per input unit
    Bkg {
        /// Input event files (JSONL)
        inputs: Vec<PathBuf>,

        /// Directory receiving the per-unit artifacts
        #[arg(short, long, default_value = "data/bkg")]
        outdir: PathBuf,

        /// Stage each input to this scratch directory before reading
        #[arg(long)]
        stage_dir: Option<PathBuf>,

        /// Process independent units in parallel
        #[arg(long)]
        parallel: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Signal { inputs, outfile } => {
            run_signal(inputs.into_iter().map(JsonlUnit::new).collect(), &outfile)
        }
        Commands::SignalLocal { dir, outfile } => {
            run_signal(local_units(&dir)?, &outfile)
        }
        Commands::Bkg {
            inputs,
            outdir,
            stage_dir,
            parallel,
        } => {
            let units: Vec<JsonlUnit> = inputs
                .into_iter()
                .map(|path| match &stage_dir {
                    Some(stage_dir) => JsonlUnit::staged(path, stage_dir),
                    None => JsonlUnit::new(path),
                })
                .collect();
            if units.is_empty() {
                bail!("no input files given");
            }
            let (summary, cut_flow) = if parallel {
                process_background_par(units, &outdir)
            } else {
                let mut cut_flow = CutFlow::new();
                let summary = process_background(units, &outdir, &mut cut_flow);
                (summary, cut_flow)
            };
            println!("{summary}");
            print!("{cut_flow}");
            Ok(())
        }
    }
}

fn run_signal(units: Vec<JsonlUnit>, outfile: &Path) -> Result<()> {
    if units.is_empty() {
        bail!("no input files given");
    }
    let mut streams = Vec::with_capacity(units.len());
    for unit in &units {
        streams.push(
            unit.events()
                .with_context(|| format!("could not open {}", unit.id()))?,
        );
    }
    let mut cut_flow = CutFlow::new();
    let (buffer, summary) = process_signal(streams.into_iter().flatten(), &mut cut_flow)?;
    println!("{summary}");
    print!("{cut_flow}");
    write_features(outfile, &buffer)?;
    Ok(())
}

fn local_units(dir: &Path) -> Result<Vec<JsonlUnit>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("could not list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort();
    Ok(paths.into_iter().map(JsonlUnit::new).collect())
}
