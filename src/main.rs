//! `unibridge` command line.
//!
//! ```text
//! unibridge run --module target/debug/libunibridge_demo.so --frames 600
//! unibridge run --watch
//! unibridge inspect --module target/debug/libunibridge_demo.so
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use unibridge::{RunOptions, inspect, run};
use unibridge_host::{BridgeConfig, init_logging};

#[derive(Parser)]
#[command(name = "unibridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Host native bridge modules with hot reload", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a module and drive it from the frame loop
    Run(RunArgs),

    /// Print a module's ABI version and entry points
    Inspect {
        /// Module image to inspect
        #[arg(long)]
        module: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Module image (overrides UNIBRIDGE_MODULE and the config file)
    #[arg(long)]
    module: Option<PathBuf>,

    /// Frames to run; 0 runs until the module halts
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Target frame time in milliseconds; 0 runs unpaced with a fixed step
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Reload the module whenever its image changes
    #[arg(long)]
    watch: bool,

    /// TOML config file (needs the toml-config feature)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<BridgeConfig> {
    match path {
        Some(path) => Ok(BridgeConfig::from_file(path)?.merge_with_env()),
        None => Ok(BridgeConfig::from_env()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let mut config = load_config(args.config.as_ref())?;
            if let Some(module) = args.module {
                config.module_path = Some(module);
            }
            init_logging(config.log_filter.as_deref());

            let options = RunOptions {
                frames: args.frames,
                frame_ms: args.frame_ms,
                watch: args.watch,
            };
            let summary = run(config, &options)?;
            println!(
                "{} frames, {} reloads, rotation {:.1}°, label {:?}",
                summary.frames, summary.reloads, summary.rotation, summary.label
            );
            if summary.leaked > 0 {
                println!("{} host handles leaked by the module", summary.leaked);
            }
        }
        Commands::Inspect { module } => {
            let config = BridgeConfig::from_env();
            init_logging(config.log_filter.as_deref());

            let inspection = inspect(&module, &config)?;
            println!("module:      {}", module.display());
            println!("staged as:   {}", inspection.image);
            println!("glue abi:    v{}", inspection.abi_version);
            for symbol in inspection.symbols {
                println!("  {symbol}");
            }
        }
    }

    Ok(())
}
