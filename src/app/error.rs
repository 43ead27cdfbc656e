use serde::Serialize;
use std::fmt;

/// Stable machine-readable failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The bridge binary could not be spawned at all.
    ToolUnavailable,
    /// The bridge server itself is in a broken state; a restart is needed.
    ToolUnhealthy,
    /// Client/server version skew; the tool auto-restarted mid-command.
    VersionMismatch,
    /// The target was reported missing, unauthorized, or offline.
    DeviceUnreachable,
    Timeout,
    CommandFailed,
    TransferFailed,
    InstallFailed,
    UninstallFailed,
    /// Both escalation paths (in-shell su and bridge root) failed.
    PermissionDenied,
    InvalidInput,
    Io,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ToolUnavailable => "tool_unavailable",
            ErrorCode::ToolUnhealthy => "tool_unhealthy",
            ErrorCode::VersionMismatch => "version_mismatch",
            ErrorCode::DeviceUnreachable => "device_unreachable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::CommandFailed => "command_failed",
            ErrorCode::TransferFailed => "transfer_failed",
            ErrorCode::InstallFailed => "install_failed",
            ErrorCode::UninstallFailed => "uninstall_failed",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::Io => "io",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Structured remediation advice, carried as data rather than prose so the
/// consuming shell can render or act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    RestartServer,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeError {
    pub code: ErrorCode,
    pub message: String,
    /// Normalized raw tool output, when one exists, for operator diagnosis.
    pub output: Option<String>,
    pub remediation: Option<Remediation>,
    pub trace_id: String,
}

impl BridgeError {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            output: None,
            remediation: None,
            trace_id: trace_id.into(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.trim().is_empty() {
            self.output = Some(output);
        }
        self
    }

    pub fn with_remediation(mut self, remediation: Remediation) -> Self {
        self.remediation = Some(remediation);
        self
    }

    pub fn tool_unavailable(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::ToolUnavailable, message, trace_id)
    }

    pub fn tool_unhealthy(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::ToolUnhealthy, message, trace_id)
            .with_remediation(Remediation::RestartServer)
    }

    pub fn version_mismatch(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::VersionMismatch, message, trace_id)
            .with_remediation(Remediation::RestartServer)
    }

    pub fn timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message, trace_id)
    }

    pub fn invalid_input(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message, trace_id)
    }

    pub fn io(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Io, message, trace_id)
    }

    pub fn internal(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, trace_id)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code.as_str())
    }
}

impl std::error::Error for BridgeError {}
