//! Remote recognition service: request packaging, HTTP client, retry.

mod client;
pub mod retry;
mod types;

pub use client::{
    RemoteError, ScanClient, ScanService, DEFAULT_BASE_URL, DEFAULT_CROP_PATH, DEFAULT_GRID_PATH,
    DEFAULT_TIMEOUT, TOKEN_ENV,
};
pub use retry::RetryPolicy;
pub use types::{
    parse_error_detail, GridParams, ScanContext, ScanMode, ScanRequest, ScanResult, MAX_COLS,
    MAX_ROWS,
};
