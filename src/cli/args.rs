//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::ModeArg;
use crate::crop::{DisplayRect, DisplaySize};
use crate::remote::{MAX_COLS, MAX_ROWS};

/// Scan handwritten mark grids with a camera into a running spreadsheet
#[derive(Parser, Debug)]
#[command(name = "mark-scanner")]
#[command(version, about = "Camera mark-grid scanner", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Scan service base URL (overrides [server] base_url)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Camera device index or name (from list-devices)
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Use a still image instead of a camera
    #[arg(long, global = true)]
    pub image: Option<PathBuf>,

    /// Exam identifier sent with each scan
    #[arg(long, global = true)]
    pub exam: Option<String>,

    /// Student identifier sent with each scan
    #[arg(long, global = true)]
    pub student: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the whole frame as a grid of marks
    ScanGrid {
        /// Grid rows (1-10)
        #[arg(long, value_parser = parse_rows)]
        rows: Option<u32>,

        /// Grid columns (1-6)
        #[arg(long, value_parser = parse_cols)]
        cols: Option<u32>,

        /// Existing spreadsheet to append to (.xlsx/.xls)
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Where to write the updated spreadsheet
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Scan one selected region of a captured still
    ScanCrop {
        /// Selection on the preview as X,Y,W,H
        #[arg(long, value_parser = parse_rect)]
        rect: DisplayRect,

        /// Rendered preview size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_display)]
        display: DisplaySize,

        /// Existing spreadsheet to append to (.xlsx/.xls)
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Where to write the updated spreadsheet
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Interactive scanning session (default)
    Session {
        /// Mode to start in
        #[arg(long, default_value = "auto")]
        mode: ModeArg,

        /// Existing spreadsheet to start from (.xlsx/.xls)
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// List available capture devices
    ListDevices,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

/// Parse and validate grid rows (1-10)
fn parse_rows(s: &str) -> Result<u32, String> {
    let rows: u32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(1..=MAX_ROWS).contains(&rows) {
        return Err(format!("Rows must be between 1 and {}, got {}", MAX_ROWS, rows));
    }
    Ok(rows)
}

/// Parse and validate grid columns (1-6)
fn parse_cols(s: &str) -> Result<u32, String> {
    let cols: u32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(1..=MAX_COLS).contains(&cols) {
        return Err(format!("Cols must be between 1 and {}, got {}", MAX_COLS, cols));
    }
    Ok(cols)
}

/// Parse a selection rectangle (X,Y,W,H format)
///
/// Zero width or height is accepted here and rejected by the scan itself.
fn parse_rect(s: &str) -> Result<DisplayRect, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!(
            "Invalid rectangle '{}'. Use X,Y,W,H (e.g., 10,20,300,150)",
            s
        ));
    }
    let mut values = [0.0f64; 4];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part
            .parse()
            .map_err(|_| format!("Invalid number '{}' in rectangle", part))?;
        if !value.is_finite() || *value < 0.0 {
            return Err(format!("Rectangle values must be non-negative, got '{}'", part));
        }
    }
    Ok(DisplayRect::new(values[0], values[1], values[2], values[3]))
}

/// Parse and validate a display size (WIDTHxHEIGHT format)
fn parse_display(s: &str) -> Result<DisplaySize, String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid display size '{}'. Use WIDTHxHEIGHT (e.g., 960x540)",
            s
        ));
    }
    let width: f64 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid width '{}' in display size", parts[0]))?;
    let height: f64 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid height '{}' in display size", parts[1]))?;
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err("Display width and height must be greater than 0".to_string());
    }
    Ok(DisplaySize::new(width, height))
}
