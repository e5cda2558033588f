// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod script;

use clap::{Parser, Subcommand};
use serde::Serialize;
use socfab_config::{SocDescriptor, TransactionScript};
use socfab_core::system::{basic_soc, Soc, SocBuilder};
use socfab_core::BusTarget;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const DEFAULT_ROM_SIZE: u64 = 0x4000;
const DEFAULT_RAM_SIZE: u64 = 0x1000;

#[derive(Parser, Debug)]
#[command(author, version, about = "SocFab bus fabric simulator", long_about = None)]
struct Cli {
    /// Path to the SoC descriptor (YAML). Without it the built-in reference system is used.
    #[arg(short, long, global = true)]
    soc: Option<PathBuf>,

    /// Enable debug logging of elaboration
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the memory map of the system.
    Map(MapArgs),

    /// Run a transaction script (YAML) against the system.
    Exec(ExecArgs),
}

#[derive(Parser, Debug)]
struct MapArgs {
    /// Print the map as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ExecArgs {
    /// Path to the transaction script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Print the step results as JSON
    #[arg(long)]
    json: bool,

    /// Write a JSON snapshot of every peripheral after the run
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

/// One populated window, in bytes.
#[derive(Debug, Serialize)]
struct MapLine {
    name: String,
    start: u64,
    end: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    let soc = match build_soc(cli.soc.as_deref()) {
        Ok(soc) => soc,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match cli.command {
        Commands::Map(args) => run_map(&soc, &args),
        Commands::Exec(args) => run_exec(soc, &args),
    }
}

fn build_soc(path: Option<&Path>) -> anyhow::Result<Soc> {
    let Some(path) = path else {
        info!("Using the built-in reference system");
        return Ok(basic_soc(DEFAULT_ROM_SIZE, DEFAULT_RAM_SIZE)?);
    };
    info!("Loading SoC descriptor: {:?}", path);
    let desc = SocDescriptor::from_file(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    SocBuilder::from_descriptor(&desc, base_dir)
}

fn map_lines(soc: &Soc) -> Vec<MapLine> {
    let gran = u64::from(soc.interface().granularity());
    soc.memory_map()
        .into_iter()
        .map(|e| MapLine {
            name: e.name,
            start: e.start * gran / 8,
            end: e.end * gran / 8,
        })
        .collect()
}

fn run_map(soc: &Soc, args: &MapArgs) -> ExitCode {
    let lines = map_lines(soc);
    if args.json {
        match serde_json::to_string_pretty(&lines) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize memory map: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        println!("{}", soc.name());
        for line in &lines {
            println!("  {:#010x}..{:#010x}  {}", line.start, line.end, line.name);
        }
    }
    ExitCode::from(EXIT_PASS)
}

fn run_exec(mut soc: Soc, args: &ExecArgs) -> ExitCode {
    let script = match TransactionScript::from_file(&args.script) {
        Ok(script) => script,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let plan = match script::plan(&script, &soc.interface()) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let report = script::run(&mut soc, &plan, script.max_cycles);

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        for step in &report.steps {
            println!("{}", step);
        }
    }

    if let Some(path) = &args.snapshot {
        let written = serde_json::to_string_pretty(&soc.snapshot())
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = written {
            error!("Failed to write snapshot {:?}: {:#}", path, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    if let Some(e) = &report.error {
        error!("{}", e);
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }
    if report.steps.iter().any(|s| !s.passed) {
        error!("Expectation failed");
        return ExitCode::from(EXIT_ASSERT_FAIL);
    }
    info!("{} steps passed in {} cycles", report.steps.len(), report.cycles);
    ExitCode::from(EXIT_PASS)
}
