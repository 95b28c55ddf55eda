//! jobgroup - process-group resource control over kernel job objects
//!
//! This library wraps one OS grouping object per [`ProcessGroup`]: admit
//! running processes into the group, apply CPU-time, memory, scheduling,
//! affinity, and process-count limits as one fixed-layout record, and
//! terminate every member atomically.
//!
//! # Modules
//!
//! - `group` - group lifecycle: create, admit, configure, terminate, release
//! - `limits` - the limit-configuration state machine and its wire record
//! - `sys` - the opaque OS capability seam (native and in-memory backends)
//! - `error` - the typed error surface
//!
//! # Quick Start
//!
//! ```ignore
//! use jobgroup::{JobLimits, ProcessGroup};
//!
//! // Create a named group, admit a running process, cap its CPU time.
//! let mut group = ProcessGroup::create(Some("batch"))?;
//! group.admit(pid)?;
//! group.configure([("process_time", 10_000_000u64.into())])?;
//!
//! // Later: end every member and give the handle back.
//! group.terminate()?;
//! group.release();
//! ```

pub mod error;
pub mod group;
pub mod limits;
pub mod sys;

// Re-export commonly used types at crate root for convenience
pub use error::JobError;
pub use group::ProcessGroup;
pub use limits::{
    JobLimits, LimitFlags, LimitOption, LimitRecord, LimitValue, PriorityClass, WorkingSet,
};
#[cfg(windows)]
pub use sys::NativeJobApi;
pub use sys::{JobApi, MemoryJobApi, OsCode, Pid, RawHandle};
