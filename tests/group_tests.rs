//! Integration tests for the group lifecycle
//!
//! These run the whole create / admit / configure / terminate / release flow
//! against the in-memory capability on every platform. The native tests at
//! the bottom talk to the real OS and are marked #[ignore]: they need a host
//! where the test process is not already inside a job object.

use std::time::Duration;

use jobgroup::{JobError, JobLimits, LimitFlags, LimitValue, MemoryJobApi, ProcessGroup};

/// End-to-end: anonymous group, admit this process's pid, release.
#[test]
fn end_to_end_admit_and_release() {
    let api = MemoryJobApi::new();
    let pid = std::process::id();
    api.register_process(pid);

    let mut group = ProcessGroup::create_with(api.clone(), None).unwrap();
    assert_eq!(group.name(), None);

    group.admit(pid).unwrap();
    assert_eq!(group.members(), &[pid]);

    group.release();
    group.release();
    assert_eq!(api.open_handles(), 0);
}

/// Full lifecycle: configure a mixed limit set, admit, terminate, release.
#[test]
fn full_lifecycle_with_limits() {
    let api = MemoryJobApi::new();
    api.register_process(100);
    api.register_process(101);

    let mut group = ProcessGroup::create_with(api.clone(), Some("workers")).unwrap();

    group
        .configure([
            ("process_time", LimitValue::from(Duration::from_secs(2))),
            ("affinity", LimitValue::from(0b0011u32)),
            ("workingset", LimitValue::from((4096u32, 1 << 20))),
            ("kill_on_job_close", LimitValue::from(true)),
        ])
        .unwrap();

    let record = api.job_limits_named("workers").unwrap();
    assert_eq!(record.per_process_time, 20_000_000);
    assert_eq!(record.affinity, 0b0011);
    assert_eq!(record.min_working_set, 4096);
    assert_eq!(record.max_working_set, 1 << 20);
    assert!(record.flags.contains(
        LimitFlags::PROCESS_TIME
            | LimitFlags::AFFINITY
            | LimitFlags::WORKINGSET
            | LimitFlags::KILL_ON_JOB_CLOSE
    ));

    group.admit(100).unwrap();
    group.admit(101).unwrap();
    group.terminate().unwrap();

    assert!(!api.is_alive(100));
    assert!(!api.is_alive(101));

    group.release();
    assert_eq!(api.open_handles(), 0);
}

/// A limit set read from JSON configuration applies like a hand-built one.
#[test]
fn limits_load_from_json_config() {
    let api = MemoryJobApi::new();
    let mut group = ProcessGroup::create_with(api.clone(), Some("from-config")).unwrap();

    let limits: JobLimits = serde_json::from_str(
        r#"{
            "job_time": 50000000,
            "active_process": 8,
            "priority_class": "idle"
        }"#,
    )
    .unwrap();
    group.apply_limits(&limits).unwrap();

    let record = api.job_limits_named("from-config").unwrap();
    assert_eq!(record.per_job_time, 50_000_000);
    assert_eq!(record.active_process_limit, 8);
    assert_eq!(record.priority_class, 0x0040);
    assert!(record.flags.contains(
        LimitFlags::JOB_TIME | LimitFlags::ACTIVE_PROCESS | LimitFlags::PRIORITY_CLASS
    ));
}

/// Scoped acquisition releases the handle whether the work succeeds or not.
#[test]
fn scoped_work_never_leaks_the_handle() {
    let api = MemoryJobApi::new();
    api.register_process(55);

    let pid = ProcessGroup::scoped(api.clone(), Some("scoped"), |group| group.admit(55)).unwrap();
    assert_eq!(pid, 55);
    assert_eq!(api.open_handles(), 0);

    let err = ProcessGroup::scoped(api.clone(), Some("scoped"), |group| {
        group.configure([("bogus_limit", LimitValue::Amount(1))])
    })
    .unwrap_err();
    assert_eq!(err, JobError::InvalidOption("bogus_limit".to_string()));
    assert_eq!(api.open_handles(), 0);
}

#[cfg(windows)]
mod native {
    use jobgroup::{JobError, LimitValue, ProcessGroup};

    /// End-to-end against the real OS: anonymous job, admit this process.
    ///
    /// Ignored by default: admission fails with AlreadyGrouped on hosts that
    /// pre-assign processes to a job (most CI runners do).
    #[test]
    #[ignore]
    fn admit_current_process() {
        let pid = std::process::id();
        let mut group = ProcessGroup::create(None).unwrap();
        group.admit(pid).unwrap();
        assert_eq!(group.members(), &[pid]);
        group.release();
        group.release();
    }

    /// Spawn a child, admit it, terminate the job, observe the child gone.
    ///
    /// Ignored by default for the same reason as above: a child inherits the
    /// runner's job and then cannot be admitted here.
    #[test]
    #[ignore]
    fn terminate_ends_a_spawned_child() {
        let mut child = std::process::Command::new("cmd")
            .args(["/C", "ping -n 30 127.0.0.1 > NUL"])
            .spawn()
            .unwrap();

        let mut group = ProcessGroup::create(Some("jobgroup-test")).unwrap();
        match group.admit(child.id()) {
            Ok(_) => {}
            Err(JobError::AlreadyGrouped(_)) => {
                // Host pre-grouped the child; nothing to observe here.
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
            Err(e) => panic!("admit failed: {}", e),
        }

        group
            .configure([("kill_on_job_close", LimitValue::Flag(true))])
            .unwrap();
        group.terminate().unwrap();

        let status = child.wait().unwrap();
        assert!(!status.success());

        group.release();
    }
}
