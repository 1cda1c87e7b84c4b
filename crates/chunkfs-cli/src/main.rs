// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod script;

use anyhow::{bail, Context, Result};
use chunkfs_core::{FsConfig, FsCore};
use chunkfs_logging::CliLoggingArgs;
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::script::{parse_script, ScriptRunner};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Drive an in-memory chunked filesystem from a script"
)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chunk length, overriding the configuration file
    #[arg(long, global = true, env = "CHUNKFS_BLOCK_SIZE")]
    block_size: Option<usize>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a script of filesystem operations (use '-' for stdin)
    Run {
        script: PathBuf,
        /// Report engine errors and continue instead of aborting
        #[arg(long)]
        keep_going: bool,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn load_config(config_path: Option<&Path>, block_size: Option<usize>) -> Result<FsConfig> {
    let mut config = match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            FsConfig::from_json_str(&content)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => FsConfig::default(),
    };
    if let Some(block_size) = block_size {
        config.block_size = block_size;
    }
    if config.validate().is_err() {
        bail!("block size must be greater than zero");
    }
    Ok(config)
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn run_script(config: FsConfig, script: &Path, keep_going: bool) -> Result<()> {
    let source = read_input(script)?;
    let ops = parse_script(&source)?;
    let fs = FsCore::new(config)?;
    info!(ops = ops.len(), "running script");

    let stdout = io::stdout();
    let failures = ScriptRunner::new(&fs, stdout.lock(), keep_going).run(&ops)?;
    if failures > 0 {
        info!(failures, "script finished with errors");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.init("chunkfs-cli")?;

    let config = load_config(cli.config.as_deref(), cli.block_size)?;
    info!(?config, "configuration loaded");

    match cli.command {
        Command::Run { script, keep_going } => run_script(config, &script, keep_going),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
