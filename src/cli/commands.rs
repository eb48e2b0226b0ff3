//! Subcommand handlers.

use std::path::{Path, PathBuf};

use super::args::{Args, ConfigAction};
use crate::artifact::{ArtifactError, SpreadsheetArtifact};
use crate::camera::{self, Camera, CameraError, FfmpegCamera, StillCamera};
use crate::config::{default_path as get_config_path, Config, ConfigError};
use crate::crop::{DisplayRect, DisplaySize};
use crate::orchestrator::{ScanError, ScanOrchestrator};
use crate::remote::{GridParams, RemoteError, ScanClient, ScanContext, ScanMode};
use crate::session::{self, CameraFactory, Session};

/// Errors that end a CLI command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create scan client: {0}")]
    Client(#[from] RemoteError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("{0}")]
    Scan(ScanError),

    #[error("{0}")]
    Usage(String),

    #[error("Failed to create async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to set up Ctrl+C handler: {0}")]
    Interrupt(#[from] ctrlc::Error),
}

/// Configuration with command-line overrides applied.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub config: Config,
    pub image: Option<PathBuf>,
    pub context: Option<ScanContext>,
    /// Either identity flag was given, so both are needed
    pub require_context: bool,
}

impl Resolved {
    /// Load the config file and apply the global flags on top.
    pub fn from_args(args: &Args) -> Result<Self, CliError> {
        let mut config = Config::load(args.config.as_deref())?;
        if let Some(server) = &args.server {
            config.server.base_url = server.clone();
        }
        if let Some(device) = &args.device {
            config.camera.device = device.clone();
        }

        let context = match (&args.exam, &args.student) {
            (Some(exam_id), Some(student_id)) => Some(ScanContext {
                exam_id: exam_id.clone(),
                student_id: student_id.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            config,
            image: args.image.clone(),
            context,
            require_context: args.exam.is_some() || args.student.is_some(),
        })
    }

    /// Camera constructor honoring `--image`.
    pub fn camera_factory(&self) -> CameraFactory {
        match self.image.clone() {
            Some(path) => Box::new(move || -> Result<Box<dyn Camera>, CameraError> {
                Ok(Box::new(StillCamera::from_path(&path)?))
            }),
            None => Box::new(|| -> Result<Box<dyn Camera>, CameraError> {
                Ok(Box::new(FfmpegCamera::new()))
            }),
        }
    }

    /// Orchestrator with the artifact seeded from `upload`, camera not yet
    /// acquired.
    pub fn orchestrator(&self, upload: Option<&Path>) -> Result<ScanOrchestrator, CliError> {
        let mut artifact = SpreadsheetArtifact::new(
            self.config.artifact.handle_dir.clone(),
            self.config.artifact.default_filename.clone(),
        );
        if let Some(path) = upload {
            artifact.load_upload(path)?;
            println!(
                "Loaded custom spreadsheet {}.",
                artifact.filename()
            );
        }
        let grid = self.config.grid_params().map_err(CliError::Usage)?;

        Ok(ScanOrchestrator::new(artifact, grid)
            .with_context(self.context.clone())
            .require_context(self.require_context))
    }
}

/// List available capture devices and print them to stdout.
pub fn list_devices() {
    match camera::list_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No cameras found.");
                println!();
                println!("Make sure your camera is connected and permissions are granted.");
                println!(
                    "On macOS, grant access in System Settings > Privacy & Security > Camera."
                );
            } else {
                println!("Available cameras:");
                for device in devices {
                    println!("  {}", device);
                }
                println!();
                println!("Use --device <id> to select a camera.");
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, explicit: Option<&Path>) -> Result<(), CliError> {
    let config_path = explicit.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    match action {
        ConfigAction::Show => {
            let config = Config::load(explicit)?;
            let rendered = config
                .to_toml()
                .map_err(|e| CliError::Usage(format!("Failed to render config: {}", e)))?;
            println!("Current configuration:");
            println!();
            println!("{}", rendered);
            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found, using defaults)", config_path.display());
            }
        }
        ConfigAction::Init => {
            Config::default().write_new(&config_path)?;
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}

/// One-shot auto-mode scan.
pub fn scan_grid(
    resolved: &Resolved,
    rows: Option<u32>,
    cols: Option<u32>,
    upload: Option<&Path>,
    out: Option<&Path>,
) -> Result<(), CliError> {
    let mut orch = resolved.orchestrator(upload)?;
    let grid = orch.grid();
    let grid = GridParams::new(rows.unwrap_or(grid.rows()), cols.unwrap_or(grid.cols()))
        .map_err(CliError::Usage)?;
    orch.set_grid(grid.rows(), grid.cols());

    run_one_shot(resolved, &mut orch, out, |_| {})
}

/// One-shot manual-mode scan of a single region.
pub fn scan_crop(
    resolved: &Resolved,
    rect: DisplayRect,
    display: DisplaySize,
    upload: Option<&Path>,
    out: Option<&Path>,
) -> Result<(), CliError> {
    let mut orch = resolved.orchestrator(upload)?;
    orch.set_mode(ScanMode::Manual);

    run_one_shot(resolved, &mut orch, out, move |orch| {
        orch.capture();
        orch.set_display_size(display);
        orch.set_selection(rect);
    })
}

fn run_one_shot(
    resolved: &Resolved,
    orch: &mut ScanOrchestrator,
    out: Option<&Path>,
    prepare: impl FnOnce(&mut ScanOrchestrator),
) -> Result<(), CliError> {
    let client = ScanClient::from_config(&resolved.config.server)?;
    let mut cameras = resolved.camera_factory();
    let settings = resolved.config.camera.to_settings();

    session::connect_camera(orch, &mut cameras, &settings);
    fail_on_error(orch)?;
    prepare(orch);
    fail_on_error(orch)?;

    let rt = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    println!("Scanning ({} mode)...", orch.mode());
    rt.block_on(orch.submit(&client));
    fail_on_error(orch)?;
    orch.exit();

    if let Some(summary) = orch.last_summary() {
        println!("{}", summary);
    }

    let target = output_path(out, orch.artifact());
    let saved = orch.artifact().save_to(&target)?;
    println!("Saved spreadsheet to {}", saved.display());
    Ok(())
}

/// Where a one-shot scan writes its spreadsheet.
///
/// Without `--out` this is `./<filename>` in the working directory, never
/// the uploaded input file.
fn output_path(out: Option<&Path>, artifact: &SpreadsheetArtifact) -> PathBuf {
    match out {
        Some(out) => out.to_path_buf(),
        None => PathBuf::from(artifact.filename()),
    }
}

fn fail_on_error(orch: &ScanOrchestrator) -> Result<(), CliError> {
    match orch.error() {
        Some(error) => Err(CliError::Scan(error.clone())),
        None => Ok(()),
    }
}

/// Interactive session on stdin/stdout.
pub fn run_session(
    resolved: &Resolved,
    mode: ScanMode,
    upload: Option<&Path>,
) -> Result<(), CliError> {
    let mut orch = resolved.orchestrator(upload)?;
    orch.set_mode(mode);

    let rt = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    let outcome = rt.block_on(async {
        let interrupt = session::setup_ctrlc_handler()?;
        let client = ScanClient::from_config(&resolved.config.server)?;
        let mut session = Session::new(
            client,
            resolved.camera_factory(),
            resolved.config.camera.to_settings(),
        );
        session.connect(&mut orch);

        println!("Type 'help' for commands.");
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut stdout = std::io::stdout();
        session
            .run(&mut orch, stdin, &mut stdout, Some(interrupt))
            .await?;
        Ok::<(), CliError>(())
    });
    // The stdin reader blocks a pool thread until the next line arrives.
    rt.shutdown_background();
    outcome?;
    if session::ctrlc_received() {
        log::info!("Session ended by Ctrl-C");
    }

    if let Some(handle) = orch.artifact().download_handle() {
        println!("Last spreadsheet: {}", handle.path().display());
        println!("Use 'save PATH' in a session to keep a copy; handles are removed on exit.");
    }
    Ok(())
}
