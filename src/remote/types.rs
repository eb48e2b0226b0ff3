//! Request/response types for the remote scan service.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encode::{from_base64, to_base64, EncodeError};

/// Largest grid the service accepts, in rows.
pub const MAX_ROWS: u32 = 10;

/// Largest grid the service accepts, in columns.
pub const MAX_COLS: u32 = 6;

/// Which capture path produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Whole frame plus expected grid dimensions.
    #[default]
    Auto,
    /// A single operator-selected region.
    Manual,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Auto => write!(f, "auto"),
            ScanMode::Manual => write!(f, "manual"),
        }
    }
}

/// Expected layout of the mark grid in auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridParams {
    rows: u32,
    cols: u32,
}

impl GridParams {
    /// # Errors
    /// Returns a message when either dimension is outside 1..=MAX.
    pub fn new(rows: u32, cols: u32) -> Result<Self, String> {
        if !(1..=MAX_ROWS).contains(&rows) {
            return Err(format!("Rows must be between 1 and {}, got {}", MAX_ROWS, rows));
        }
        if !(1..=MAX_COLS).contains(&cols) {
            return Err(format!("Cols must be between 1 and {}, got {}", MAX_COLS, cols));
        }
        Ok(Self { rows, cols })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self { rows: 4, cols: 2 }
    }
}

/// Exam and student the scanned marks belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanContext {
    pub exam_id: String,
    pub student_id: String,
}

/// A packaged scan, ready to send.
///
/// `grid` is present exactly for auto-mode requests.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// PNG-encoded frame (whole frame in auto mode, the crop in manual mode)
    pub image_png: Vec<u8>,
    /// Current spreadsheet bytes, absent when the server should start a new one
    pub artifact: Option<Vec<u8>>,
    pub grid: Option<GridParams>,
    pub context: Option<ScanContext>,
}

impl ScanRequest {
    pub fn auto(image_png: Vec<u8>, artifact: Option<Vec<u8>>, grid: GridParams) -> Self {
        Self {
            image_png,
            artifact,
            grid: Some(grid),
            context: None,
        }
    }

    pub fn manual(image_png: Vec<u8>, artifact: Option<Vec<u8>>) -> Self {
        Self {
            image_png,
            artifact,
            grid: None,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<ScanContext>) -> Self {
        self.context = context;
        self
    }

    pub fn mode(&self) -> ScanMode {
        if self.grid.is_some() {
            ScanMode::Auto
        } else {
            ScanMode::Manual
        }
    }

    /// JSON body in the service's wire format.
    pub(crate) fn to_body(&self) -> ScanRequestBody<'_> {
        ScanRequestBody {
            image: to_base64(&self.image_png),
            artifact: self.artifact.as_deref().map(to_base64),
            rows: self.grid.map(|g| g.rows),
            cols: self.grid.map(|g| g.cols),
            exam_id: self.context.as_ref().map(|c| c.exam_id.as_str()),
            student_id: self.context.as_ref().map(|c| c.student_id.as_str()),
        }
    }
}

/// Request body for both scan endpoints.
#[derive(Debug, Serialize)]
pub(crate) struct ScanRequestBody<'a> {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cols: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exam_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_id: Option<&'a str>,
}

/// Response body shared by both scan endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ScanResponseBody {
    marks: Vec<f64>,
    total: f64,
    artifact: String,
}

impl ScanResponseBody {
    pub(crate) fn into_result(self) -> Result<ScanResult, EncodeError> {
        Ok(ScanResult {
            marks: self.marks,
            total: self.total,
            artifact: from_base64(&self.artifact)?,
        })
    }
}

/// Error body as produced by the service (`{"detail": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Pull a human-readable detail out of an error response body.
///
/// Accepts a plain string detail or a list of validation entries with a
/// `msg` field. Returns `None` for any other body.
pub fn parse_error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join("; "))
            }
        }
        _ => None,
    }
}

/// Outcome of a successful scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    /// Recognized marks in reading order
    pub marks: Vec<f64>,
    pub total: f64,
    /// Complete updated spreadsheet
    pub artifact: Vec<u8>,
}

impl ScanResult {
    /// Operator-facing summary, e.g. `Added row. Marks: [1, 2], Total: 3`.
    pub fn summary(&self) -> String {
        let marks: Vec<String> = self.marks.iter().map(|m| m.to_string()).collect();
        format!(
            "Added row. Marks: [{}], Total: {}",
            marks.join(", "),
            self.total
        )
    }
}
