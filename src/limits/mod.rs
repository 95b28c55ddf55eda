//! Limit-configuration state machine
//!
//! A limit set starts life as a [`JobLimits`] value: a sparse, serializable
//! struct with one optional field per recognized option. Callers either fill
//! the fields directly, or go through the string-keyed boundary
//! ([`JobLimits::from_options`]) which normalizes keys to lower case,
//! validates every key against the closed [`LimitOption`] set, and rejects
//! the whole call on the first unknown key.
//!
//! `JobLimits::to_record` translates the sparse set into the fixed-layout
//! [`LimitRecord`] submitted to the OS: each populated field lands in its own
//! slot and raises its own presence bit. Per-process CPU time and aggregate
//! job CPU time are distinct limits and populate distinct slots.

pub mod record;

pub use record::{LimitFlags, LimitRecord};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// The closed set of recognized option keys.
///
/// Unknown keys never reach this enum; the boundary parser rejects them with
/// [`JobError::InvalidOption`] before any field is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOption {
    ActiveProcess,
    Affinity,
    BreakawayOk,
    DieOnUnhandledException,
    JobMemory,
    JobTime,
    KillOnJobClose,
    PreserveJobTime,
    PriorityClass,
    ProcessMemory,
    ProcessTime,
    SchedulingClass,
    SilentBreakawayOk,
    Workingset,
}

impl LimitOption {
    /// Parse an option key. Matching is case-insensitive; the canonical form
    /// is lower case.
    pub fn from_key(key: &str) -> Result<Self, JobError> {
        match key.to_ascii_lowercase().as_str() {
            "active_process" => Ok(Self::ActiveProcess),
            "affinity" => Ok(Self::Affinity),
            "breakaway_ok" => Ok(Self::BreakawayOk),
            "die_on_unhandled_exception" => Ok(Self::DieOnUnhandledException),
            "job_memory" => Ok(Self::JobMemory),
            "job_time" => Ok(Self::JobTime),
            "kill_on_job_close" => Ok(Self::KillOnJobClose),
            "preserve_job_time" => Ok(Self::PreserveJobTime),
            "priority_class" => Ok(Self::PriorityClass),
            "process_memory" => Ok(Self::ProcessMemory),
            "process_time" => Ok(Self::ProcessTime),
            "scheduling_class" => Ok(Self::SchedulingClass),
            "silent_breakaway_ok" => Ok(Self::SilentBreakawayOk),
            "workingset" => Ok(Self::Workingset),
            _ => Err(JobError::InvalidOption(key.to_string())),
        }
    }

    /// Canonical key for this option.
    pub const fn key(self) -> &'static str {
        match self {
            Self::ActiveProcess => "active_process",
            Self::Affinity => "affinity",
            Self::BreakawayOk => "breakaway_ok",
            Self::DieOnUnhandledException => "die_on_unhandled_exception",
            Self::JobMemory => "job_memory",
            Self::JobTime => "job_time",
            Self::KillOnJobClose => "kill_on_job_close",
            Self::PreserveJobTime => "preserve_job_time",
            Self::PriorityClass => "priority_class",
            Self::ProcessMemory => "process_memory",
            Self::ProcessTime => "process_time",
            Self::SchedulingClass => "scheduling_class",
            Self::SilentBreakawayOk => "silent_breakaway_ok",
            Self::Workingset => "workingset",
        }
    }
}

impl std::str::FromStr for LimitOption {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
    }
}

/// A value supplied for one option at the string-keyed boundary.
///
/// Behavior switches take a `Flag`, numeric caps an `Amount`, and the
/// working-set bound a `Range`. Supplying the wrong shape for an option fails
/// the whole call with [`JobError::InvalidArgument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitValue {
    Flag(bool),
    Amount(u64),
    Range { min: u32, max: u32 },
}

impl From<bool> for LimitValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<u64> for LimitValue {
    fn from(v: u64) -> Self {
        Self::Amount(v)
    }
}

impl From<u32> for LimitValue {
    fn from(v: u32) -> Self {
        Self::Amount(v as u64)
    }
}

impl From<Duration> for LimitValue {
    fn from(v: Duration) -> Self {
        Self::Amount(JobLimits::ticks(v))
    }
}

impl From<(u32, u32)> for LimitValue {
    fn from((min, max): (u32, u32)) -> Self {
        Self::Range { min, max }
    }
}

/// Scheduling priority class for member processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    Realtime,
}

impl PriorityClass {
    /// The OS constant for this class.
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Idle => 0x0040,
            Self::BelowNormal => 0x4000,
            Self::Normal => 0x0020,
            Self::AboveNormal => 0x8000,
            Self::High => 0x0080,
            Self::Realtime => 0x0100,
        }
    }

    /// Map an OS constant back to a class.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x0040 => Some(Self::Idle),
            0x4000 => Some(Self::BelowNormal),
            0x0020 => Some(Self::Normal),
            0x8000 => Some(Self::AboveNormal),
            0x0080 => Some(Self::High),
            0x0100 => Some(Self::Realtime),
            _ => None,
        }
    }
}

/// Working-set (resident memory) bound, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSet {
    pub min: u32,
    pub max: u32,
}

/// One sparse limit set for a group.
///
/// `None` means "not supplied": the corresponding record slot stays zero and
/// its presence bit unset, so the OS keeps its default. CPU time caps are in
/// 100-nanosecond units (see [`JobLimits::ticks`]).
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobLimits {
    pub active_process: Option<u32>,
    pub affinity: Option<u32>,
    pub breakaway_ok: Option<bool>,
    pub die_on_unhandled_exception: Option<bool>,
    pub job_memory: Option<u64>,
    pub job_time: Option<u64>,
    pub kill_on_job_close: Option<bool>,
    pub preserve_job_time: Option<bool>,
    pub priority_class: Option<PriorityClass>,
    pub process_memory: Option<u64>,
    pub process_time: Option<u64>,
    pub scheduling_class: Option<u32>,
    pub silent_breakaway_ok: Option<bool>,
    pub workingset: Option<WorkingSet>,
}

impl JobLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a duration into the 100-nanosecond units of the time caps.
    pub fn ticks(d: Duration) -> u64 {
        (d.as_nanos() / 100) as u64
    }

    /// Build a limit set from `(key, value)` pairs.
    ///
    /// Every key is validated against the recognized set before any field is
    /// populated; an unknown key or a wrong-shaped value rejects the whole
    /// call, leaving nothing applied.
    pub fn from_options<I, K, V>(options: I) -> Result<Self, JobError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LimitValue>,
    {
        let mut limits = Self::new();
        for (key, value) in options {
            let option = LimitOption::from_key(key.as_ref())?;
            limits.set(option, value.into())?;
        }
        Ok(limits)
    }

    /// Set one option from a boundary value.
    pub fn set(&mut self, option: LimitOption, value: LimitValue) -> Result<(), JobError> {
        match option {
            LimitOption::ActiveProcess => self.active_process = Some(amount_u32(option, value)?),
            LimitOption::Affinity => self.affinity = Some(amount_u32(option, value)?),
            LimitOption::BreakawayOk => self.breakaway_ok = Some(flag(option, value)?),
            LimitOption::DieOnUnhandledException => {
                self.die_on_unhandled_exception = Some(flag(option, value)?)
            }
            LimitOption::JobMemory => self.job_memory = Some(amount(option, value)?),
            LimitOption::JobTime => self.job_time = Some(amount(option, value)?),
            LimitOption::KillOnJobClose => self.kill_on_job_close = Some(flag(option, value)?),
            LimitOption::PreserveJobTime => self.preserve_job_time = Some(flag(option, value)?),
            LimitOption::PriorityClass => {
                let raw = amount_u32(option, value)?;
                let class = PriorityClass::from_raw(raw).ok_or_else(|| {
                    JobError::InvalidArgument(format!(
                        "'{}' is not a priority class: {:#x}",
                        option.key(),
                        raw
                    ))
                })?;
                self.priority_class = Some(class);
            }
            LimitOption::ProcessMemory => self.process_memory = Some(amount(option, value)?),
            LimitOption::ProcessTime => self.process_time = Some(amount(option, value)?),
            LimitOption::SchedulingClass => {
                self.scheduling_class = Some(amount_u32(option, value)?)
            }
            LimitOption::SilentBreakawayOk => {
                self.silent_breakaway_ok = Some(flag(option, value)?)
            }
            LimitOption::Workingset => match value {
                LimitValue::Range { min, max } if min <= max => {
                    self.workingset = Some(WorkingSet { min, max })
                }
                LimitValue::Range { .. } => {
                    return Err(JobError::InvalidArgument(
                        "'workingset' minimum exceeds maximum".to_string(),
                    ))
                }
                _ => {
                    return Err(JobError::InvalidArgument(
                        "'workingset' expects a {min, max} range".to_string(),
                    ))
                }
            },
        }
        Ok(())
    }

    /// True when no option is supplied.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Translate the sparse set into the fixed-layout record. Each populated
    /// field fills its slot and raises its presence bit.
    pub fn to_record(&self) -> LimitRecord {
        let mut record = LimitRecord::default();

        if let Some(ticks) = self.process_time {
            record.per_process_time = ticks;
            record.flags |= LimitFlags::PROCESS_TIME;
        }
        if let Some(ticks) = self.job_time {
            record.per_job_time = ticks;
            record.flags |= LimitFlags::JOB_TIME;
        }
        if let Some(ws) = self.workingset {
            record.min_working_set = ws.min;
            record.max_working_set = ws.max;
            record.flags |= LimitFlags::WORKINGSET;
        }
        if let Some(count) = self.active_process {
            record.active_process_limit = count;
            record.flags |= LimitFlags::ACTIVE_PROCESS;
        }
        if let Some(mask) = self.affinity {
            record.affinity = mask;
            record.flags |= LimitFlags::AFFINITY;
        }
        if let Some(class) = self.priority_class {
            record.priority_class = class.as_u32();
            record.flags |= LimitFlags::PRIORITY_CLASS;
        }
        if let Some(weight) = self.scheduling_class {
            record.scheduling_class = weight;
            record.flags |= LimitFlags::SCHEDULING_CLASS;
        }
        if let Some(bytes) = self.process_memory {
            record.process_memory = bytes;
            record.flags |= LimitFlags::PROCESS_MEMORY;
        }
        if let Some(bytes) = self.job_memory {
            record.job_memory = bytes;
            record.flags |= LimitFlags::JOB_MEMORY;
        }
        if self.breakaway_ok == Some(true) {
            record.flags |= LimitFlags::BREAKAWAY_OK;
        }
        if self.silent_breakaway_ok == Some(true) {
            record.flags |= LimitFlags::SILENT_BREAKAWAY_OK;
        }
        if self.die_on_unhandled_exception == Some(true) {
            record.flags |= LimitFlags::DIE_ON_UNHANDLED_EXCEPTION;
        }
        if self.kill_on_job_close == Some(true) {
            record.flags |= LimitFlags::KILL_ON_JOB_CLOSE;
        }
        if self.preserve_job_time == Some(true) {
            record.flags |= LimitFlags::PRESERVE_JOB_TIME;
        }

        record
    }
}

fn flag(option: LimitOption, value: LimitValue) -> Result<bool, JobError> {
    match value {
        LimitValue::Flag(v) => Ok(v),
        _ => Err(JobError::InvalidArgument(format!(
            "'{}' expects a boolean",
            option.key()
        ))),
    }
}

fn amount(option: LimitOption, value: LimitValue) -> Result<u64, JobError> {
    match value {
        LimitValue::Amount(v) => Ok(v),
        _ => Err(JobError::InvalidArgument(format!(
            "'{}' expects a numeric value",
            option.key()
        ))),
    }
}

fn amount_u32(option: LimitOption, value: LimitValue) -> Result<u32, JobError> {
    let v = amount(option, value)?;
    u32::try_from(v).map_err(|_| {
        JobError::InvalidArgument(format!("'{}' is out of range: {}", option.key(), v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let limits = JobLimits::from_options([
            ("Process_Time", LimitValue::Amount(5_000)),
            ("KILL_ON_JOB_CLOSE", LimitValue::Flag(true)),
        ])
        .unwrap();

        assert_eq!(limits.process_time, Some(5_000));
        assert_eq!(limits.kill_on_job_close, Some(true));
    }

    #[test]
    fn unknown_key_rejects_the_whole_call() {
        let err = JobLimits::from_options([
            ("process_time", LimitValue::Amount(5_000)),
            ("bogus_limit", LimitValue::Amount(1)),
        ])
        .unwrap_err();

        assert_eq!(err, JobError::InvalidOption("bogus_limit".to_string()));
    }

    #[test]
    fn wrong_value_shape_is_invalid_argument() {
        let err = JobLimits::from_options([("process_time", LimitValue::Flag(true))]).unwrap_err();
        assert!(matches!(err, JobError::InvalidArgument(_)));

        let err =
            JobLimits::from_options([("breakaway_ok", LimitValue::Amount(1))]).unwrap_err();
        assert!(matches!(err, JobError::InvalidArgument(_)));
    }

    #[test]
    fn time_caps_fill_distinct_record_slots() {
        let process = JobLimits::from_options([("process_time", LimitValue::Amount(9_999))])
            .unwrap()
            .to_record();
        let job = JobLimits::from_options([("job_time", LimitValue::Amount(9_999))])
            .unwrap()
            .to_record();

        assert_eq!(process.per_process_time, 9_999);
        assert_eq!(process.per_job_time, 0);
        assert_eq!(process.flags, LimitFlags::PROCESS_TIME);

        assert_eq!(job.per_job_time, 9_999);
        assert_eq!(job.per_process_time, 0);
        assert_eq!(job.flags, LimitFlags::JOB_TIME);
    }

    #[test]
    fn workingset_takes_a_range() {
        let limits =
            JobLimits::from_options([("workingset", LimitValue::Range { min: 4096, max: 65536 })])
                .unwrap();
        let record = limits.to_record();

        assert_eq!(record.min_working_set, 4096);
        assert_eq!(record.max_working_set, 65536);
        assert!(record.flags.contains(LimitFlags::WORKINGSET));

        let err = JobLimits::from_options([(
            "workingset",
            LimitValue::Range { min: 100, max: 1 },
        )])
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidArgument(_)));
    }

    #[test]
    fn false_switch_does_not_raise_its_bit() {
        let limits = JobLimits {
            breakaway_ok: Some(false),
            ..Default::default()
        };
        assert!(limits.to_record().flags.is_empty());
    }

    #[test]
    fn priority_class_parses_from_raw_constant() {
        let limits =
            JobLimits::from_options([("priority_class", LimitValue::Amount(0x0080))]).unwrap();
        assert_eq!(limits.priority_class, Some(PriorityClass::High));

        let err =
            JobLimits::from_options([("priority_class", LimitValue::Amount(3))]).unwrap_err();
        assert!(matches!(err, JobError::InvalidArgument(_)));
    }

    #[test]
    fn ticks_convert_from_durations() {
        assert_eq!(JobLimits::ticks(Duration::from_secs(1)), 10_000_000);
        assert_eq!(JobLimits::ticks(Duration::from_millis(1)), 10_000);
    }

    #[test]
    fn limit_set_deserializes_from_json() {
        let limits: JobLimits = serde_json::from_str(
            r#"{
                "process_time": 20000000,
                "priority_class": "below_normal",
                "kill_on_job_close": true,
                "workingset": {"min": 4096, "max": 1048576}
            }"#,
        )
        .unwrap();

        assert_eq!(limits.process_time, Some(20_000_000));
        assert_eq!(limits.priority_class, Some(PriorityClass::BelowNormal));
        assert_eq!(limits.kill_on_job_close, Some(true));
        assert_eq!(
            limits.workingset,
            Some(WorkingSet { min: 4096, max: 1_048_576 })
        );
        assert_eq!(limits.job_time, None);
    }
}
