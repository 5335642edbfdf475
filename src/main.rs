use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use paintfe_engine::cli::{self, CliArgs};
use paintfe_engine::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = match cli::load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize session log (overwrites previous session log)
    let (level, stderr) = if args.verbose {
        (LevelFilter::Debug, true)
    } else {
        (config.log.level_filter(), config.log.stderr)
    };
    logger::init(level, config.log.file.as_deref(), stderr);

    cli::run(args, config)
}
