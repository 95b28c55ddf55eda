//! Process group lifecycle
//!
//! A [`ProcessGroup`] owns one grouping-object handle for its whole life:
//! created with the group, closed by [`ProcessGroup::release`] or on drop,
//! never duplicated. Running processes are admitted into the group, a limit
//! set can be applied, and every member can be terminated in one call.
//!
//! # Example
//!
//! ```ignore
//! use jobgroup::{JobLimits, ProcessGroup};
//!
//! let mut group = ProcessGroup::create(Some("worker-pool"))?;
//!
//! // Admit an already-running process by pid.
//! group.admit(worker_pid)?;
//!
//! // Cap aggregate CPU time and end members when the handle closes.
//! group.apply_limits(&JobLimits {
//!     job_time: Some(JobLimits::ticks(std::time::Duration::from_secs(30))),
//!     kill_on_job_close: Some(true),
//!     ..Default::default()
//! })?;
//!
//! // End every member, then give the handle back.
//! group.terminate()?;
//! group.release();
//! ```

use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::limits::{JobLimits, LimitRecord, LimitValue};
use crate::sys::{JobApi, Pid, RawHandle, NULL_HANDLE};

/// Exit status handed to members terminated via [`ProcessGroup::terminate`].
pub const DEFAULT_EXIT_CODE: u32 = 1;

/// One kernel grouping object, its identity, and the roster of admitted
/// process identifiers.
///
/// The handle is exclusively owned: the type is neither `Clone` nor `Copy`,
/// and nothing hands the raw value out. Sharing a group means sharing a
/// reference to the owning instance.
pub struct ProcessGroup<A: JobApi> {
    api: A,
    name: Option<String>,
    handle: RawHandle,
    members: Vec<Pid>,
    limits: Option<LimitRecord>,
}

impl<A: JobApi> ProcessGroup<A> {
    /// Allocate a new grouping object over the given capability surface.
    ///
    /// `None` creates an anonymous group. A name with an interior NUL cannot
    /// cross the OS boundary and fails with [`JobError::InvalidArgument`];
    /// any allocation failure surfaces as [`JobError::SystemCallFailed`].
    pub fn create_with(api: A, name: Option<&str>) -> Result<Self, JobError> {
        if let Some(name) = name {
            if name.contains('\0') {
                return Err(JobError::InvalidArgument(
                    "job name contains a NUL byte".to_string(),
                ));
            }
        }

        let handle = api.create_job(name).map_err(JobError::SystemCallFailed)?;
        debug!(name, handle, "job object created");

        Ok(Self {
            api,
            name: name.map(str::to_string),
            handle,
            members: Vec::new(),
            limits: None,
        })
    }

    /// Run `work` against a freshly created group, releasing the handle after
    /// the work completes or fails.
    pub fn scoped<R>(
        api: A,
        name: Option<&str>,
        work: impl FnOnce(&mut Self) -> Result<R, JobError>,
    ) -> Result<R, JobError> {
        let mut group = Self::create_with(api, name)?;
        let result = work(&mut group);
        group.release();
        result
    }

    /// The group's name, if it was created with one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Admitted process identifiers, in admission order.
    pub fn members(&self) -> &[Pid] {
        &self.members
    }

    /// Admit a running process into the group.
    ///
    /// The target is opened with full access rights, checked for membership
    /// in *any* job, and only then associated with this group. On success the
    /// pid is appended to [`ProcessGroup::members`] and returned; on any
    /// failure the roster is left untouched. Admitting a pid that is already
    /// grouped - including one this group admitted earlier - fails with
    /// [`JobError::AlreadyGrouped`].
    pub fn admit(&mut self, pid: Pid) -> Result<Pid, JobError> {
        let process = self
            .api
            .open_process(pid)
            .map_err(JobError::ProcessOpenFailed)?;

        let outcome = self.admit_opened(pid, process);
        if let Err(code) = self.api.close_handle(process) {
            warn!(pid, code, "failed to close process handle");
        }
        outcome?;

        self.members.push(pid);
        debug!(pid, handle = self.handle, "process admitted");
        Ok(pid)
    }

    fn admit_opened(&self, pid: Pid, process: RawHandle) -> Result<(), JobError> {
        // The membership answer must come from the OS at call time: another
        // actor may have grouped this process, and local bookkeeping cannot
        // see that.
        let grouped = self
            .api
            .process_in_job(process)
            .map_err(JobError::SystemCallFailed)?;
        if grouped {
            return Err(JobError::AlreadyGrouped(pid));
        }

        self.api
            .assign_process(self.handle, process)
            .map_err(JobError::SystemCallFailed)
    }

    /// Configure limits from `(key, value)` pairs.
    ///
    /// Keys are case-insensitive and validated against the recognized option
    /// set before anything is applied; an unknown key fails the whole call
    /// with [`JobError::InvalidOption`] and previously applied limits stay in
    /// force.
    pub fn configure<I, K, V>(&mut self, options: I) -> Result<(), JobError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LimitValue>,
    {
        let limits = JobLimits::from_options(options)?;
        self.apply_limits(&limits)
    }

    /// Translate a limit set into its fixed-layout record and submit it.
    ///
    /// An empty set only stages the record locally; once any option is
    /// present the record goes to the OS, and the staged copy is replaced
    /// only when that submission succeeds.
    pub fn apply_limits(&mut self, limits: &JobLimits) -> Result<(), JobError> {
        let record = limits.to_record();

        if !record.is_empty() {
            self.api
                .set_limits(self.handle, &record)
                .map_err(JobError::SystemCallFailed)?;
            debug!(
                handle = self.handle,
                flags = record.flags.bits(),
                "limit record submitted"
            );
        }

        self.limits = Some(record);
        Ok(())
    }

    /// End every process associated with the grouping object.
    ///
    /// Termination is delegated to the OS object, so processes grouped
    /// transitively (e.g. children that never appeared in the roster) are
    /// included. The handle stays open and the roster stays as-is.
    pub fn terminate(&self) -> Result<(), JobError> {
        self.terminate_with(DEFAULT_EXIT_CODE)
    }

    /// [`ProcessGroup::terminate`] with an explicit exit status for members.
    pub fn terminate_with(&self, exit_code: u32) -> Result<(), JobError> {
        self.api
            .terminate(self.handle, exit_code)
            .map_err(JobError::SystemCallFailed)?;
        info!(
            handle = self.handle,
            exit_code,
            members = self.members.len(),
            "job terminated"
        );
        Ok(())
    }

    /// Give the handle back to the OS. Best-effort: safe to call repeatedly,
    /// never fails, logs instead of raising. Runs on drop as well.
    pub fn release(&mut self) {
        if self.handle == NULL_HANDLE {
            return;
        }
        if let Err(code) = self.api.close_handle(self.handle) {
            warn!(handle = self.handle, code, "failed to close job handle");
        } else {
            debug!(handle = self.handle, "job handle released");
        }
        self.handle = NULL_HANDLE;
    }
}

#[cfg(windows)]
impl ProcessGroup<crate::sys::NativeJobApi> {
    /// Create a group over the native OS capability.
    pub fn create(name: Option<&str>) -> Result<Self, JobError> {
        Self::create_with(crate::sys::NativeJobApi::new(), name)
    }
}

impl<A: JobApi> Drop for ProcessGroup<A> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<A: JobApi> std::fmt::Debug for ProcessGroup<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("members", &self.members)
            .field("limits", &self.limits)
            .finish()
    }
}
