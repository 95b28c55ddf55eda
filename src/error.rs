//! Error types for job-object operations

use crate::sys::{OsCode, Pid};

/// Error type for job-object operations
///
/// OS error codes are carried verbatim and never interpreted here; they are
/// diagnostic data for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// A malformed job name or an option value of the wrong shape
    InvalidArgument(String),
    /// An option key outside the recognized set; the whole call is rejected
    InvalidOption(String),
    /// Could not open a handle to the admission target
    ProcessOpenFailed(OsCode),
    /// The target process already belongs to some job
    AlreadyGrouped(Pid),
    /// An OS capability call (create, assign, set-limits, terminate) failed
    SystemCallFailed(OsCode),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            JobError::InvalidOption(key) => write!(f, "invalid option '{}'", key),
            JobError::ProcessOpenFailed(code) => {
                write!(f, "failed to open process (os error {})", code)
            }
            JobError::AlreadyGrouped(pid) => write!(f, "pid {} is already part of a job", pid),
            JobError::SystemCallFailed(code) => write!(f, "system call failed (os error {})", code),
        }
    }
}

impl std::error::Error for JobError {}
