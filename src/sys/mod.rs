//! OS capability surface for job objects
//!
//! The core never talks to the kernel directly. Everything it needs is the
//! seven operations of [`JobApi`]: allocate a grouping object, open a process,
//! ask whether a process already belongs to a job, assign a process, submit a
//! limit record, terminate the group, and close a handle.
//!
//! Two implementations ship with the crate:
//!
//! - [`NativeJobApi`] (`cfg(windows)`) - the real job-object calls via
//!   `windows-sys`.
//! - [`MemoryJobApi`] - an in-process model of the same contract, used by the
//!   test suite on every platform and by the demo on non-Windows hosts.

pub mod memory;
#[cfg(windows)]
pub mod windows;

pub use memory::MemoryJobApi;
#[cfg(windows)]
pub use windows::NativeJobApi;

use crate::limits::LimitRecord;

/// Process identifier.
pub type Pid = u32;

/// Raw kernel object handle. Zero is never a valid handle.
pub type RawHandle = isize;

/// OS-reported last-error code, carried verbatim and never interpreted.
pub type OsCode = u32;

/// The not-a-handle sentinel; a released group holds this.
pub const NULL_HANDLE: RawHandle = 0;

// Well-known error codes, exposed so callers and tests can match on the
// common failures without pulling in platform bindings.
pub const ERROR_ACCESS_DENIED: OsCode = 5;
pub const ERROR_INVALID_HANDLE: OsCode = 6;
pub const ERROR_INVALID_PARAMETER: OsCode = 87;
pub const ERROR_ALREADY_EXISTS: OsCode = 183;

/// The opaque kernel call surface the group lifecycle runs against.
///
/// Every method is a single blocking call. Failures surface the OS last-error
/// code; no method retries. Handles returned by `create_job` and
/// `open_process` are owned by the caller and must be returned through
/// `close_handle`.
pub trait JobApi {
    /// Allocate a new grouping object, optionally named.
    fn create_job(&self, name: Option<&str>) -> Result<RawHandle, OsCode>;

    /// Open a handle to a running process with full access rights.
    fn open_process(&self, pid: Pid) -> Result<RawHandle, OsCode>;

    /// Authoritative membership query: does the process belong to *any* job?
    fn process_in_job(&self, process: RawHandle) -> Result<bool, OsCode>;

    /// Associate a process with a grouping object. Limits apply immediately.
    fn assign_process(&self, job: RawHandle, process: RawHandle) -> Result<(), OsCode>;

    /// Submit a limit-configuration record for the group.
    fn set_limits(&self, job: RawHandle, record: &LimitRecord) -> Result<(), OsCode>;

    /// End every process associated with the grouping object, passing
    /// `exit_code` to each.
    fn terminate(&self, job: RawHandle, exit_code: u32) -> Result<(), OsCode>;

    /// Return a handle to the OS.
    fn close_handle(&self, handle: RawHandle) -> Result<(), OsCode>;
}
