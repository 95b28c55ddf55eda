//! Fixed-layout limit-configuration record
//!
//! The grouping object is configured by submitting one binary record. The
//! basic section is 44 bytes, little-endian, with one slot per limit field:
//!
//! ```text
//! offset  width  field
//!      0      8  per-process CPU time cap (100 ns units)
//!      8      8  aggregate job CPU time cap (100 ns units)
//!     16      4  limit flags (which slots are populated + behavior bits)
//!     20      4  minimum working-set size
//!     24      4  maximum working-set size
//!     28      4  active-process cap
//!     32      4  CPU affinity mask
//!     36      4  scheduling priority class
//!     40      4  relative scheduling weight
//! ```
//!
//! A slot is only honored by the OS when its flag bit is set; an unset slot
//! stays zero and is ignored. Presence is therefore tracked in [`LimitFlags`],
//! never inferred from a zero value.
//!
//! The two memory caps have no slot in the basic section. They ride in an
//! extended section, and the backend submits the extended information class
//! whenever either is populated.

use bitflags::bitflags;

bitflags! {
    /// Which limit slots are populated, plus the pure behavior switches.
    ///
    /// Values match the limit-flag constants of the job-object information
    /// record and are submitted to the OS verbatim.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LimitFlags: u32 {
        const WORKINGSET                  = 0x0000_0001;
        const PROCESS_TIME                = 0x0000_0002;
        const JOB_TIME                    = 0x0000_0004;
        const ACTIVE_PROCESS              = 0x0000_0008;
        const AFFINITY                    = 0x0000_0010;
        const PRIORITY_CLASS              = 0x0000_0020;
        const PRESERVE_JOB_TIME           = 0x0000_0040;
        const SCHEDULING_CLASS            = 0x0000_0080;
        const PROCESS_MEMORY              = 0x0000_0100;
        const JOB_MEMORY                  = 0x0000_0200;
        const DIE_ON_UNHANDLED_EXCEPTION  = 0x0000_0400;
        const BREAKAWAY_OK                = 0x0000_0800;
        const SILENT_BREAKAWAY_OK         = 0x0000_1000;
        const KILL_ON_JOB_CLOSE           = 0x0000_2000;
    }
}

/// One staged limit configuration for a grouping object.
///
/// Unpopulated fields are zero and their flag bit is unset. `per_process_time`
/// and `per_job_time` occupy distinct slots; the same input value supplied for
/// both limits lands at two different offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitRecord {
    pub per_process_time: u64,
    pub per_job_time: u64,
    pub flags: LimitFlags,
    pub min_working_set: u32,
    pub max_working_set: u32,
    pub active_process_limit: u32,
    pub affinity: u32,
    pub priority_class: u32,
    pub scheduling_class: u32,
    /// Extended section: committed-memory cap per member process, in bytes.
    pub process_memory: u64,
    /// Extended section: aggregate committed-memory cap, in bytes.
    pub job_memory: u64,
}

impl LimitRecord {
    /// Size of the basic section in bytes.
    pub const BASIC_LEN: usize = 44;

    pub const OFF_PROCESS_TIME: usize = 0;
    pub const OFF_JOB_TIME: usize = 8;
    pub const OFF_FLAGS: usize = 16;
    pub const OFF_MIN_WORKING_SET: usize = 20;
    pub const OFF_MAX_WORKING_SET: usize = 24;
    pub const OFF_ACTIVE_PROCESS: usize = 28;
    pub const OFF_AFFINITY: usize = 32;
    pub const OFF_PRIORITY_CLASS: usize = 36;
    pub const OFF_SCHEDULING_CLASS: usize = 40;

    /// True when no slot is populated and no behavior bit is set.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// True when the record carries a memory cap and must be submitted via
    /// the extended information class.
    pub fn has_extended_section(&self) -> bool {
        self.flags
            .intersects(LimitFlags::PROCESS_MEMORY | LimitFlags::JOB_MEMORY)
    }

    /// Pack the basic section into its 44-byte wire form.
    pub fn basic_bytes(&self) -> [u8; Self::BASIC_LEN] {
        let mut buf = [0u8; Self::BASIC_LEN];
        buf[Self::OFF_PROCESS_TIME..Self::OFF_PROCESS_TIME + 8]
            .copy_from_slice(&self.per_process_time.to_le_bytes());
        buf[Self::OFF_JOB_TIME..Self::OFF_JOB_TIME + 8]
            .copy_from_slice(&self.per_job_time.to_le_bytes());
        buf[Self::OFF_FLAGS..Self::OFF_FLAGS + 4]
            .copy_from_slice(&self.flags.bits().to_le_bytes());
        buf[Self::OFF_MIN_WORKING_SET..Self::OFF_MIN_WORKING_SET + 4]
            .copy_from_slice(&self.min_working_set.to_le_bytes());
        buf[Self::OFF_MAX_WORKING_SET..Self::OFF_MAX_WORKING_SET + 4]
            .copy_from_slice(&self.max_working_set.to_le_bytes());
        buf[Self::OFF_ACTIVE_PROCESS..Self::OFF_ACTIVE_PROCESS + 4]
            .copy_from_slice(&self.active_process_limit.to_le_bytes());
        buf[Self::OFF_AFFINITY..Self::OFF_AFFINITY + 4]
            .copy_from_slice(&self.affinity.to_le_bytes());
        buf[Self::OFF_PRIORITY_CLASS..Self::OFF_PRIORITY_CLASS + 4]
            .copy_from_slice(&self.priority_class.to_le_bytes());
        buf[Self::OFF_SCHEDULING_CLASS..Self::OFF_SCHEDULING_CLASS + 4]
            .copy_from_slice(&self.scheduling_class.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_has_no_flags() {
        let record = LimitRecord::default();
        assert!(record.is_empty());
        assert!(!record.has_extended_section());
        assert_eq!(record.basic_bytes(), [0u8; LimitRecord::BASIC_LEN]);
    }

    #[test]
    fn basic_section_is_44_bytes() {
        assert_eq!(LimitRecord::BASIC_LEN, 44);
        assert_eq!(LimitRecord::default().basic_bytes().len(), 44);
    }

    #[test]
    fn process_time_and_job_time_occupy_distinct_slots() {
        let process = LimitRecord {
            per_process_time: 0x1122_3344_5566_7788,
            flags: LimitFlags::PROCESS_TIME,
            ..Default::default()
        };
        let job = LimitRecord {
            per_job_time: 0x1122_3344_5566_7788,
            flags: LimitFlags::JOB_TIME,
            ..Default::default()
        };

        let pb = process.basic_bytes();
        let jb = job.basic_bytes();

        // Same input value, two different offsets.
        assert_eq!(&pb[0..8], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&pb[8..16], &[0u8; 8]);
        assert_eq!(&jb[8..16], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&jb[0..8], &[0u8; 8]);
        assert_ne!(pb, jb);
    }

    #[test]
    fn flag_word_lands_at_offset_16() {
        let record = LimitRecord {
            flags: LimitFlags::KILL_ON_JOB_CLOSE | LimitFlags::BREAKAWAY_OK,
            ..Default::default()
        };
        let bytes = record.basic_bytes();
        let word = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        assert_eq!(word, 0x2000 | 0x0800);
    }

    #[test]
    fn scalar_slots_land_at_named_offsets() {
        let record = LimitRecord {
            flags: LimitFlags::WORKINGSET
                | LimitFlags::ACTIVE_PROCESS
                | LimitFlags::AFFINITY
                | LimitFlags::PRIORITY_CLASS
                | LimitFlags::SCHEDULING_CLASS,
            min_working_set: 0x1000,
            max_working_set: 0x8000,
            active_process_limit: 12,
            affinity: 0b1010,
            priority_class: 0x20,
            scheduling_class: 5,
            ..Default::default()
        };
        let bytes = record.basic_bytes();
        let read = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());

        assert_eq!(read(LimitRecord::OFF_MIN_WORKING_SET), 0x1000);
        assert_eq!(read(LimitRecord::OFF_MAX_WORKING_SET), 0x8000);
        assert_eq!(read(LimitRecord::OFF_ACTIVE_PROCESS), 12);
        assert_eq!(read(LimitRecord::OFF_AFFINITY), 0b1010);
        assert_eq!(read(LimitRecord::OFF_PRIORITY_CLASS), 0x20);
        assert_eq!(read(LimitRecord::OFF_SCHEDULING_CLASS), 5);
    }

    #[test]
    fn memory_caps_require_extended_submission() {
        let record = LimitRecord {
            flags: LimitFlags::JOB_MEMORY,
            job_memory: 64 * 1024 * 1024,
            ..Default::default()
        };
        assert!(record.has_extended_section());
        // The basic section has no slot for memory caps.
        let bytes = record.basic_bytes();
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 0x200);
        assert!(bytes[20..].iter().all(|&b| b == 0));
    }
}
