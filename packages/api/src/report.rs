//! Reference to a crash report, carried in `x-error-report`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReportState {
    Incomplete,
    Loading,
    Done,
    ErrorGenerating,
    ErrorLoading,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReportKind {
    BlockProbeFail,
    DiskProbeFail,
    InstallFail,
    Ui,
    NetworkFail,
    NetworkClientFail,
    ServerRequestFail,
    Unknown,
}

impl ErrorReportKind {
    /// Title shown to the user.
    pub fn title(self) -> &'static str {
        match self {
            ErrorReportKind::BlockProbeFail => "Block device probe failure",
            ErrorReportKind::DiskProbeFail => "Disk probe failure",
            ErrorReportKind::InstallFail => "Install failure",
            ErrorReportKind::Ui => "Installer crash",
            ErrorReportKind::NetworkFail => "Network error",
            ErrorReportKind::NetworkClientFail => "Network client error",
            ErrorReportKind::ServerRequestFail => "Server request failure",
            ErrorReportKind::Unknown => "Unknown error",
        }
    }
}

/// Enough to locate a report on disk and show its status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReportRef {
    pub state: ErrorReportState,
    /// Report file name without extension.
    pub base: String,
    pub kind: ErrorReportKind,
    pub seen: bool,
    pub oops_id: Option<String>,
}
