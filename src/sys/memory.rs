//! In-memory job capability
//!
//! [`MemoryJobApi`] models the kernel side of the [`JobApi`] contract inside
//! the process: grouping objects with name uniqueness, process handles,
//! authoritative membership, limit submission, and atomic termination. The
//! test suite runs the whole group lifecycle against it on every platform,
//! and the demo uses it where the native backend is unavailable.
//!
//! Semantics mirror the real facility where the core depends on them:
//!
//! - creating a second group with a taken name fails with
//!   `ERROR_ALREADY_EXISTS`,
//! - a process belongs to at most one group, and membership survives the
//!   closing of the group's handles,
//! - terminate marks every member dead but leaves the grouping object and
//!   its handles intact,
//! - any operation on an unknown handle fails with `ERROR_INVALID_HANDLE`.
//!
//! Clones share one underlying state, so a test can keep a clone for
//! inspection while the group owns the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::limits::LimitRecord;
use crate::sys::{
    JobApi, OsCode, Pid, RawHandle, ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS,
    ERROR_INVALID_HANDLE, ERROR_INVALID_PARAMETER,
};

/// Handles start above the reserved low values and step by four, like the
/// real handle table.
const HANDLE_BASE: RawHandle = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Job(u64),
    Process(Pid),
}

#[derive(Debug, Default)]
struct JobObject {
    name: Option<String>,
    limits: Option<LimitRecord>,
}

#[derive(Debug, Default)]
struct ProcessState {
    alive: bool,
    job: Option<u64>,
}

#[derive(Debug, Default)]
struct State {
    handle_counter: isize,
    job_counter: u64,
    handles: HashMap<RawHandle, Target>,
    jobs: HashMap<u64, JobObject>,
    names: HashMap<String, u64>,
    processes: HashMap<Pid, ProcessState>,
}

impl State {
    fn alloc_handle(&mut self, target: Target) -> RawHandle {
        let handle = HANDLE_BASE + self.handle_counter * 4;
        self.handle_counter += 1;
        self.handles.insert(handle, target);
        handle
    }

    fn job_of(&self, handle: RawHandle) -> Result<u64, OsCode> {
        match self.handles.get(&handle) {
            Some(Target::Job(id)) => Ok(*id),
            _ => Err(ERROR_INVALID_HANDLE),
        }
    }

    fn pid_of(&self, handle: RawHandle) -> Result<Pid, OsCode> {
        match self.handles.get(&handle) {
            Some(Target::Process(pid)) => Ok(*pid),
            _ => Err(ERROR_INVALID_HANDLE),
        }
    }
}

/// In-process implementation of the job capability surface.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobApi {
    state: Arc<Mutex<State>>,
}

impl MemoryJobApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a running process that admission can open.
    pub fn register_process(&self, pid: Pid) {
        self.lock().processes.insert(
            pid,
            ProcessState {
                alive: true,
                job: None,
            },
        );
    }

    /// Whether a registered process is still running.
    pub fn is_alive(&self, pid: Pid) -> bool {
        self.lock()
            .processes
            .get(&pid)
            .map(|p| p.alive)
            .unwrap_or(false)
    }

    /// The last limit record submitted for the job behind `handle`.
    pub fn job_limits(&self, handle: RawHandle) -> Option<LimitRecord> {
        let state = self.lock();
        let id = state.job_of(handle).ok()?;
        state.jobs.get(&id).and_then(|job| job.limits)
    }

    /// The last limit record submitted for the named job, if any.
    pub fn job_limits_named(&self, name: &str) -> Option<LimitRecord> {
        let state = self.lock();
        let id = *state.names.get(name)?;
        state.jobs.get(&id).and_then(|job| job.limits)
    }

    /// Number of handles currently open. Useful for leak assertions.
    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }
}

impl JobApi for MemoryJobApi {
    fn create_job(&self, name: Option<&str>) -> Result<RawHandle, OsCode> {
        let mut state = self.lock();

        if let Some(name) = name {
            if state.names.contains_key(name) {
                return Err(ERROR_ALREADY_EXISTS);
            }
        }

        let id = state.job_counter;
        state.job_counter += 1;
        state.jobs.insert(
            id,
            JobObject {
                name: name.map(str::to_string),
                limits: None,
            },
        );
        if let Some(name) = name {
            state.names.insert(name.to_string(), id);
        }

        Ok(state.alloc_handle(Target::Job(id)))
    }

    fn open_process(&self, pid: Pid) -> Result<RawHandle, OsCode> {
        let mut state = self.lock();
        let alive = state.processes.get(&pid).map(|p| p.alive).unwrap_or(false);
        if !alive {
            return Err(ERROR_INVALID_PARAMETER);
        }
        Ok(state.alloc_handle(Target::Process(pid)))
    }

    fn process_in_job(&self, process: RawHandle) -> Result<bool, OsCode> {
        let state = self.lock();
        let pid = state.pid_of(process)?;
        let proc = state.processes.get(&pid).ok_or(ERROR_INVALID_HANDLE)?;
        Ok(proc.job.is_some())
    }

    fn assign_process(&self, job: RawHandle, process: RawHandle) -> Result<(), OsCode> {
        let mut state = self.lock();
        let id = state.job_of(job)?;
        let pid = state.pid_of(process)?;
        let proc = state.processes.get_mut(&pid).ok_or(ERROR_INVALID_HANDLE)?;
        if proc.job.is_some() {
            return Err(ERROR_ACCESS_DENIED);
        }
        proc.job = Some(id);
        Ok(())
    }

    fn set_limits(&self, job: RawHandle, record: &LimitRecord) -> Result<(), OsCode> {
        let mut state = self.lock();
        let id = state.job_of(job)?;
        let job = state.jobs.get_mut(&id).ok_or(ERROR_INVALID_HANDLE)?;
        job.limits = Some(*record);
        Ok(())
    }

    fn terminate(&self, job: RawHandle, _exit_code: u32) -> Result<(), OsCode> {
        let mut state = self.lock();
        let id = state.job_of(job)?;
        for proc in state.processes.values_mut() {
            if proc.job == Some(id) {
                proc.alive = false;
            }
        }
        Ok(())
    }

    fn close_handle(&self, handle: RawHandle) -> Result<(), OsCode> {
        let mut state = self.lock();
        match state.handles.remove(&handle) {
            Some(Target::Job(id)) => {
                // Drop the object and free its name once the last handle is
                // gone. Membership is untouched: a process stays in its job
                // for life even after every handle is closed.
                let still_referenced = state
                    .handles
                    .values()
                    .any(|t| matches!(t, Target::Job(other) if *other == id));
                if !still_referenced {
                    if let Some(job) = state.jobs.remove(&id) {
                        if let Some(name) = job.name {
                            state.names.remove(&name);
                        }
                    }
                }
                Ok(())
            }
            Some(Target::Process(_)) => Ok(()),
            None => Err(ERROR_INVALID_HANDLE),
        }
    }
}
