//! Wire types for the agent's scan / get / teardown calls

use crate::types::{FileRecord, Rule, ScanMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SCAN_PATH: &str = "/scan";
pub const GET_PATH: &str = "/get";
pub const TEARDOWN_PATH: &str = "/teardown";

fn default_mode() -> ScanMode {
    ScanMode::Target
}

/// Ask the agent to scan one of its local folders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub root_folder: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub rule: Rule,
    #[serde(default)]
    pub limits: Vec<String>,
    #[serde(default = "default_mode")]
    pub mode: ScanMode,
    #[serde(default)]
    pub use_journal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub file_count: u64,
    /// Identifies this scan in later get / teardown calls
    pub session: Uuid,
}

/// Fetch one page (`offset = page * size`) of the scanned set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub session: Uuid,
    pub page: u64,
    pub size: u32,
    #[serde(default = "default_mode")]
    pub mode: ScanMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownRequest {
    pub session: Uuid,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownResponse {
    pub released: bool,
}

/// Body of every non-success response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
