use clap::Parser;

use mark_scanner::cli::{self, Args, CliError, Command, ModeArg, Resolved};
use mark_scanner::remote::TOKEN_ENV;

fn load_env() {
    // Load .env file, don't override existing env vars
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

fn init_logging() {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn run(args: Args) -> Result<(), CliError> {
    if std::env::var(TOKEN_ENV).is_err() {
        log::debug!("{} not set; scans are sent without a token", TOKEN_ENV);
    }

    match args.command {
        Some(Command::ListDevices) => {
            cli::list_devices();
            Ok(())
        }
        Some(Command::Config { ref action }) => {
            cli::handle_config_action(action.clone(), args.config.as_deref())
        }
        Some(Command::ScanGrid {
            rows,
            cols,
            ref artifact,
            ref out,
        }) => {
            let resolved = Resolved::from_args(&args)?;
            cli::scan_grid(&resolved, rows, cols, artifact.as_deref(), out.as_deref())
        }
        Some(Command::ScanCrop {
            rect,
            display,
            ref artifact,
            ref out,
        }) => {
            let resolved = Resolved::from_args(&args)?;
            cli::scan_crop(&resolved, rect, display, artifact.as_deref(), out.as_deref())
        }
        Some(Command::Session { mode, ref artifact }) => {
            let resolved = Resolved::from_args(&args)?;
            cli::run_session(&resolved, mode.into(), artifact.as_deref())
        }
        None => {
            let resolved = Resolved::from_args(&args)?;
            cli::run_session(&resolved, ModeArg::default().into(), None)
        }
    }
}

fn main() {
    // Load .env file before anything else
    load_env();
    init_logging();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
