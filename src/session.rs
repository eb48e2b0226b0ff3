//! Interactive operator loop.
//!
//! Reads one command per line and drives a [`ScanOrchestrator`]. Scans run
//! as a spawned task so commands keep being accepted while a request is in
//! flight; the orchestrator turns a second `scan` into a no-op until the
//! first completes.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::{JoinError, JoinHandle};

use crate::camera::{Camera, CameraError, CameraSettings};
use crate::crop::{DisplayRect, DisplaySize};
use crate::orchestrator::{PendingScan, ScanOrchestrator};
use crate::remote::{RemoteError, ScanMode, ScanResult, ScanService};

pub const HELP: &str = "\
Commands:
  mode auto|manual     switch scan mode (keeps the spreadsheet)
  grid ROWS COLS       expected grid size for auto mode
  capture              take a still (manual mode)
  retake               discard the still
  display W H          rendered size of the still preview
  rect X Y W H         select a region on the preview
  scan                 send the current scan
  upload PATH          use an existing .xlsx/.xls spreadsheet
  save PATH            write the current spreadsheet to PATH
  status               show the workflow state
  retry-camera         reopen the camera
  help                 show this help
  quit                 leave the session";

/// A parsed session command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Mode(ScanMode),
    Grid { rows: u32, cols: u32 },
    Capture,
    Retake,
    Display(DisplaySize),
    Rect(DisplayRect),
    Scan,
    Upload(PathBuf),
    Save(PathBuf),
    Status,
    RetryCamera,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match word.to_lowercase().as_str() {
        "mode" => match args.as_slice() {
            ["auto"] => Command::Mode(ScanMode::Auto),
            ["manual"] => Command::Mode(ScanMode::Manual),
            _ => return Err("Usage: mode auto|manual".to_string()),
        },
        "grid" => {
            let [rows, cols] = parse_numbers::<u32, 2>(&args, "Usage: grid ROWS COLS")?;
            Command::Grid { rows, cols }
        }
        "capture" => Command::Capture,
        "retake" => Command::Retake,
        "display" => {
            let [w, h] = parse_numbers::<f64, 2>(&args, "Usage: display WIDTH HEIGHT")?;
            Command::Display(DisplaySize::new(w, h))
        }
        "rect" => {
            let [x, y, w, h] = parse_numbers::<f64, 4>(&args, "Usage: rect X Y WIDTH HEIGHT")?;
            Command::Rect(DisplayRect::new(x, y, w, h))
        }
        "scan" => Command::Scan,
        "upload" if !rest.is_empty() => Command::Upload(PathBuf::from(rest)),
        "upload" => return Err("Usage: upload PATH".to_string()),
        "save" if !rest.is_empty() => Command::Save(PathBuf::from(rest)),
        "save" => return Err("Usage: save PATH".to_string()),
        "status" => Command::Status,
        "retry-camera" => Command::RetryCamera,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("Unknown command '{}'. Type 'help' for a list", other)),
    };
    Ok(Some(command))
}

fn parse_numbers<T: std::str::FromStr, const N: usize>(
    args: &[&str],
    usage: &str,
) -> Result<[T; N], String> {
    if args.len() != N {
        return Err(usage.to_string());
    }
    let parsed: Vec<T> = args
        .iter()
        .map(|a| a.parse::<T>().map_err(|_| format!("'{}' is not a number. {}", a, usage)))
        .collect::<Result<_, _>>()?;
    parsed.try_into().map_err(|_| usage.to_string())
}

/// Multi-line status report.
pub fn render_status(orch: &ScanOrchestrator) -> String {
    let mut lines = vec![
        format!("Mode:        {}", orch.mode()),
        format!("State:       {}", orch.state()),
        format!("Camera:      {}", if orch.has_camera() { "ready" } else { "unavailable" }),
        format!("Grid:        {}x{}", orch.grid().rows(), orch.grid().cols()),
    ];
    if let Some(frame) = orch.captured_frame() {
        lines.push(format!("Captured:    {}x{}", frame.width, frame.height));
    }
    if let Some(display) = orch.display_size() {
        lines.push(format!("Display:     {}x{}", display.width, display.height));
    }
    if let Some(rect) = orch.selection() {
        lines.push(format!(
            "Selection:   {} {} {} {}",
            rect.x, rect.y, rect.width, rect.height
        ));
    }
    let artifact = orch.artifact();
    lines.push(format!("Spreadsheet: {}", artifact.display_name()));
    if let Some(handle) = artifact.download_handle() {
        lines.push(format!("Download:    {}", handle.path().display()));
    }
    if let Some(context) = orch.context() {
        lines.push(format!(
            "Context:     exam {} / student {}",
            context.exam_id, context.student_id
        ));
    }
    if let Some(summary) = orch.last_summary() {
        lines.push(format!("Last scan:   {}", summary));
    }
    if let Some(error) = orch.error() {
        lines.push(format!("Error:       {}", error));
    }
    lines.join("\n")
}

/// Builds a fresh camera for `retry-camera`.
pub type CameraFactory = Box<dyn FnMut() -> Result<Box<dyn Camera>, CameraError> + Send>;

/// Open a camera from `factory` and hand it to the orchestrator.
pub fn connect_camera(
    orch: &mut ScanOrchestrator,
    factory: &mut CameraFactory,
    settings: &CameraSettings,
) {
    match factory() {
        Ok(camera) => orch.acquire(camera, settings),
        Err(e) => orch.camera_failed(e),
    }
}

type InFlight = (PendingScan, JoinHandle<Result<ScanResult, RemoteError>>);

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler, returning a channel that fires on each press.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler() -> Result<UnboundedReceiver<()>, ctrlc::Error> {
    let (tx, rx) = unbounded_channel();
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        let _ = tx.send(());
    })?;
    Ok(rx)
}

/// Everything the loop needs besides the orchestrator and the terminal.
pub struct Session<S> {
    service: S,
    cameras: CameraFactory,
    settings: CameraSettings,
}

impl<S> Session<S>
where
    S: ScanService + Clone + Send + Sync + 'static,
{
    pub fn new(service: S, cameras: CameraFactory, settings: CameraSettings) -> Self {
        Self {
            service,
            cameras,
            settings,
        }
    }

    /// Acquire the camera for `orch` from this session's factory.
    pub fn connect(&mut self, orch: &mut ScanOrchestrator) {
        connect_camera(orch, &mut self.cameras, &self.settings);
    }

    /// Run until `quit`, end of input, or an interrupt.
    ///
    /// A scan still in flight at `quit` or end of input is awaited so its
    /// spreadsheet is not lost. An interrupt leaves immediately. The camera
    /// is released on every path.
    pub async fn run<R, W>(
        &mut self,
        orch: &mut ScanOrchestrator,
        input: R,
        out: &mut W,
        mut interrupt: Option<UnboundedReceiver<()>>,
    ) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        let mut in_flight: Option<InFlight> = None;
        let mut interrupted = false;

        writeln!(out, "{}", render_status(orch))?;
        let result = loop {
            tokio::select! {
                outcome = join_in_flight(&mut in_flight), if in_flight.is_some() => {
                    if let Some((pending, _)) = in_flight.take() {
                        self.finish(orch, pending, outcome, out)?;
                    }
                }
                _ = recv_interrupt(&mut interrupt) => {
                    if in_flight.is_some() {
                        log::warn!("Interrupted with a scan in flight; its result is discarded");
                    }
                    writeln!(out, "Interrupted, shutting down...")?;
                    interrupted = true;
                    break Ok(());
                }
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break Ok(()),
                        Err(e) => break Err(e),
                    };
                    match parse_command(&line) {
                        Ok(None) => {}
                        Ok(Some(Command::Quit)) => break Ok(()),
                        Ok(Some(command)) => {
                            if let Some(started) = self.execute(orch, command, out)? {
                                in_flight = Some(started);
                            }
                        }
                        Err(message) => writeln!(out, "{}", message)?,
                    }
                }
            }
        };

        if result.is_ok() && !interrupted {
            if let Some((pending, handle)) = in_flight.take() {
                writeln!(out, "Waiting for the scan in flight to finish...")?;
                let outcome = joined_outcome(handle.await);
                self.finish(orch, pending, outcome, out)?;
            }
        }

        orch.exit();
        result
    }

    fn execute<W: Write>(
        &mut self,
        orch: &mut ScanOrchestrator,
        command: Command,
        out: &mut W,
    ) -> std::io::Result<Option<InFlight>> {
        match command {
            Command::Mode(mode) => orch.set_mode(mode),
            Command::Grid { rows, cols } => orch.set_grid(rows, cols),
            Command::Capture => orch.capture(),
            Command::Retake => orch.retake(),
            Command::Display(size) => orch.set_display_size(size),
            Command::Rect(rect) => orch.set_selection(rect),
            Command::Upload(path) => orch.upload_artifact(&path),
            Command::Save(path) => {
                orch.save_artifact(&path);
            }
            Command::Status => writeln!(out, "{}", render_status(orch))?,
            Command::RetryCamera => {
                self.connect(orch);
                if orch.has_camera() {
                    writeln!(out, "Camera ready")?;
                }
            }
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Scan => {
                if orch.is_submitting() {
                    writeln!(out, "A scan is already in flight")?;
                    return Ok(None);
                }
                if let Some(pending) = orch.begin_submit() {
                    writeln!(out, "Scanning...")?;
                    let service = self.service.clone();
                    let request = pending.request().clone();
                    let handle = tokio::spawn(async move { service.scan(&request).await });
                    return Ok(Some((pending, handle)));
                }
            }
            Command::Quit => {}
        }

        if let Some(info) = orch.take_info() {
            writeln!(out, "{}", info)?;
        }
        if let Some(error) = orch.error() {
            writeln!(out, "Error: {}", error)?;
        }
        Ok(None)
    }

    fn finish<W: Write>(
        &mut self,
        orch: &mut ScanOrchestrator,
        pending: PendingScan,
        outcome: Result<ScanResult, RemoteError>,
        out: &mut W,
    ) -> std::io::Result<()> {
        orch.complete(pending, outcome);
        match orch.error() {
            Some(error) => writeln!(out, "Error: {}", error)?,
            None => {
                if let Some(summary) = orch.last_summary() {
                    writeln!(out, "{}", summary)?;
                }
            }
        }
        Ok(())
    }
}

/// Await the in-flight scan's outcome. Pending forever when there is none.
async fn join_in_flight(in_flight: &mut Option<InFlight>) -> Result<ScanResult, RemoteError> {
    match in_flight {
        Some((_, handle)) => joined_outcome(handle.await),
        None => std::future::pending().await,
    }
}

fn joined_outcome(
    joined: Result<Result<ScanResult, RemoteError>, JoinError>,
) -> Result<ScanResult, RemoteError> {
    joined.unwrap_or_else(|e| Err(RemoteError::Aborted(e.to_string())))
}

async fn recv_interrupt(interrupt: &mut Option<UnboundedReceiver<()>>) {
    match interrupt {
        Some(rx) => {
            if rx.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}
