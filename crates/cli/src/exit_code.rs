// Consistent exit codes for the pathways CLI.
//
//   0 = success
//   1 = general error
//   2 = usage error or action not allowed in the current state
//   3 = record or catalog node not found
//   4 = storage failure

use std::process;

use pathways_engine::RestoreError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    NotFound = 3,
    Storage = 4,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(restore_err) = cause.downcast_ref::<RestoreError>() {
                return Self::from_restore_code(restore_err.code());
            }
        }
        Self::Error
    }

    /// Map a `RestoreError::code()` value to an exit code.
    pub fn from_restore_code(code: &str) -> Self {
        match code {
            "NOT_FOUND" => Self::NotFound,
            "INVALID_ACTION" | "NOT_LOGGABLE" | "CATALOG_INVALID" => Self::Usage,
            "STORAGE_FAILED" => Self::Storage,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
