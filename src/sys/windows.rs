//! Native job-object capability
//!
//! Maps the [`JobApi`] contract one-to-one onto the Windows job-object calls.
//! Handles cross the trait boundary as `isize` so the core stays free of
//! platform types; zero stands for the null handle on both sides.
//!
//! Two OS behaviors worth knowing at this layer:
//!
//! - `CreateJobObjectW` with a name that is already in use returns a handle
//!   to the existing object (last error `ERROR_ALREADY_EXISTS`). Name
//!   uniqueness is a property of the host, not of this call.
//! - A limit record carrying a memory cap must go through the extended
//!   information class; the basic class has no slot for it.

use std::mem;

use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, FALSE, HANDLE};
use windows_sys::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, IsProcessInJob, JobObjectBasicLimitInformation,
    JobObjectExtendedLimitInformation, SetInformationJobObject, TerminateJobObject,
    JOBOBJECT_BASIC_LIMIT_INFORMATION, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
};
use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_ALL_ACCESS};

use crate::limits::LimitRecord;
use crate::sys::{JobApi, OsCode, Pid, RawHandle};

/// The real Windows capability surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeJobApi;

impl NativeJobApi {
    pub fn new() -> Self {
        Self
    }
}

fn last_error() -> OsCode {
    unsafe { GetLastError() }
}

/// NUL-terminated UTF-16 for the W-suffixed calls. Interior NULs are rejected
/// before a name ever reaches this module.
fn wide(name: &str) -> Vec<u16> {
    name.encode_utf16().chain(std::iter::once(0)).collect()
}

fn basic_info(record: &LimitRecord) -> JOBOBJECT_BASIC_LIMIT_INFORMATION {
    JOBOBJECT_BASIC_LIMIT_INFORMATION {
        PerProcessUserTimeLimit: record.per_process_time as i64,
        PerJobUserTimeLimit: record.per_job_time as i64,
        LimitFlags: record.flags.bits(),
        MinimumWorkingSetSize: record.min_working_set as usize,
        MaximumWorkingSetSize: record.max_working_set as usize,
        ActiveProcessLimit: record.active_process_limit,
        Affinity: record.affinity as usize,
        PriorityClass: record.priority_class,
        SchedulingClass: record.scheduling_class,
    }
}

impl JobApi for NativeJobApi {
    fn create_job(&self, name: Option<&str>) -> Result<RawHandle, OsCode> {
        let wide_name = name.map(wide);
        let name_ptr = wide_name
            .as_ref()
            .map(|w| w.as_ptr())
            .unwrap_or(std::ptr::null());

        let handle = unsafe { CreateJobObjectW(std::ptr::null(), name_ptr) };
        if handle.is_null() {
            return Err(last_error());
        }
        Ok(handle as RawHandle)
    }

    fn open_process(&self, pid: Pid) -> Result<RawHandle, OsCode> {
        let handle = unsafe { OpenProcess(PROCESS_ALL_ACCESS, FALSE, pid) };
        if handle.is_null() {
            return Err(last_error());
        }
        Ok(handle as RawHandle)
    }

    fn process_in_job(&self, process: RawHandle) -> Result<bool, OsCode> {
        let mut in_job = FALSE;
        // A null job handle asks about membership in *any* job.
        let ok = unsafe { IsProcessInJob(process as HANDLE, std::ptr::null_mut(), &mut in_job) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(in_job != FALSE)
    }

    fn assign_process(&self, job: RawHandle, process: RawHandle) -> Result<(), OsCode> {
        let ok = unsafe { AssignProcessToJobObject(job as HANDLE, process as HANDLE) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn set_limits(&self, job: RawHandle, record: &LimitRecord) -> Result<(), OsCode> {
        let basic = basic_info(record);

        let ok = if record.has_extended_section() {
            let extended = JOBOBJECT_EXTENDED_LIMIT_INFORMATION {
                BasicLimitInformation: basic,
                IoInfo: unsafe { mem::zeroed() },
                ProcessMemoryLimit: record.process_memory as usize,
                JobMemoryLimit: record.job_memory as usize,
                PeakProcessMemoryUsed: 0,
                PeakJobMemoryUsed: 0,
            };
            unsafe {
                SetInformationJobObject(
                    job as HANDLE,
                    JobObjectExtendedLimitInformation,
                    &extended as *const _ as *const core::ffi::c_void,
                    mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
                )
            }
        } else {
            unsafe {
                SetInformationJobObject(
                    job as HANDLE,
                    JobObjectBasicLimitInformation,
                    &basic as *const _ as *const core::ffi::c_void,
                    mem::size_of::<JOBOBJECT_BASIC_LIMIT_INFORMATION>() as u32,
                )
            }
        };

        if ok == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn terminate(&self, job: RawHandle, exit_code: u32) -> Result<(), OsCode> {
        let ok = unsafe { TerminateJobObject(job as HANDLE, exit_code) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn close_handle(&self, handle: RawHandle) -> Result<(), OsCode> {
        let ok = unsafe { CloseHandle(handle as HANDLE) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(())
    }
}
