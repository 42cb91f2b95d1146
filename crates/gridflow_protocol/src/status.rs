//! Job, submission and CE status enums.
//!
//! Three layers of status exist in the system and must not be conflated:
//!
//! - [`JobStatus`]: coarse per-job lifecycle stored on the `job` row.
//! - [`SubmitStatus`]: fine-grained per-submission code stored on the
//!   `job_submit` row. The numeric projection is stable and used by
//!   external reporting; never renumber.
//! - [`CeStatus`]: the normalized view of what a CE reports for a running
//!   submission. Every native lexeme maps to exactly one value; anything
//!   unrecognized maps to [`CeStatus::Undef`].

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Coarse job status
// ============================================================================

/// Coarse lifecycle of a job. Created jobs are submittable, Active jobs have
/// a live submission, Successful/Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Created,
    Active,
    Successful,
    Failed,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Created,
        JobStatus::Active,
        JobStatus::Successful,
        JobStatus::Failed,
    ];

    pub fn code(self) -> i64 {
        match self {
            JobStatus::Created => 0,
            JobStatus::Active => 1,
            JobStatus::Successful => 2,
            JobStatus::Failed => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(JobStatus::Created),
            1 => Some(JobStatus::Active),
            2 => Some(JobStatus::Successful),
            3 => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Active => "ACTIVE",
            JobStatus::Successful => "SUCCESSFUL",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Fine-grained submission status
// ============================================================================

/// Status of a single submission attempt. Codes 0-15 track the CE lifecycle,
/// 100 marks a rejected submit, 10x mark completion with a finalization
/// problem and 207 marks completion with a non-zero payload exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitStatus {
    #[default]
    Unsubmitted,
    Registered,
    Pending,
    Idle,
    Running,
    ReallyRunning,
    Held,
    DoneOk,
    DoneFailed,
    Cancelled,
    Aborted,
    Unknown,
    Undef,
    Removing,
    TransferringOutput,
    Suspended,
    SubmitFailed,
    DoneOkOutputProblem,
    DoneFailedOutputProblem,
    CancelledOutputProblem,
    DoneOkNonZeroRc,
}

impl SubmitStatus {
    /// Every status a closed submission may carry.
    pub const TERMINAL: &'static [SubmitStatus] = &[
        SubmitStatus::DoneOk,
        SubmitStatus::DoneFailed,
        SubmitStatus::Cancelled,
        SubmitStatus::Aborted,
        SubmitStatus::SubmitFailed,
        SubmitStatus::DoneOkOutputProblem,
        SubmitStatus::DoneFailedOutputProblem,
        SubmitStatus::CancelledOutputProblem,
        SubmitStatus::DoneOkNonZeroRc,
    ];

    /// Stable numeric projection written to the catalog.
    pub fn code(self) -> i64 {
        match self {
            SubmitStatus::Unsubmitted => 0,
            SubmitStatus::Registered => 1,
            SubmitStatus::Pending => 2,
            SubmitStatus::Idle => 3,
            SubmitStatus::Running => 4,
            SubmitStatus::ReallyRunning => 5,
            SubmitStatus::Held => 6,
            SubmitStatus::DoneOk => 7,
            SubmitStatus::DoneFailed => 8,
            SubmitStatus::Cancelled => 9,
            SubmitStatus::Aborted => 10,
            SubmitStatus::Unknown => 11,
            SubmitStatus::Undef => 12,
            SubmitStatus::Removing => 13,
            SubmitStatus::TransferringOutput => 14,
            SubmitStatus::Suspended => 15,
            SubmitStatus::SubmitFailed => 100,
            SubmitStatus::DoneOkOutputProblem => 107,
            SubmitStatus::DoneFailedOutputProblem => 108,
            SubmitStatus::CancelledOutputProblem => 109,
            SubmitStatus::DoneOkNonZeroRc => 207,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        let status = match code {
            0 => SubmitStatus::Unsubmitted,
            1 => SubmitStatus::Registered,
            2 => SubmitStatus::Pending,
            3 => SubmitStatus::Idle,
            4 => SubmitStatus::Running,
            5 => SubmitStatus::ReallyRunning,
            6 => SubmitStatus::Held,
            7 => SubmitStatus::DoneOk,
            8 => SubmitStatus::DoneFailed,
            9 => SubmitStatus::Cancelled,
            10 => SubmitStatus::Aborted,
            11 => SubmitStatus::Unknown,
            12 => SubmitStatus::Undef,
            13 => SubmitStatus::Removing,
            14 => SubmitStatus::TransferringOutput,
            15 => SubmitStatus::Suspended,
            100 => SubmitStatus::SubmitFailed,
            107 => SubmitStatus::DoneOkOutputProblem,
            108 => SubmitStatus::DoneFailedOutputProblem,
            109 => SubmitStatus::CancelledOutputProblem,
            207 => SubmitStatus::DoneOkNonZeroRc,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubmitStatus::Unsubmitted => "UNSUBMITTED",
            SubmitStatus::Registered => "REGISTERED",
            SubmitStatus::Pending => "PENDING",
            SubmitStatus::Idle => "IDLE",
            SubmitStatus::Running => "RUNNING",
            SubmitStatus::ReallyRunning => "REALLY-RUNNING",
            SubmitStatus::Held => "HELD",
            SubmitStatus::DoneOk => "DONE-OK",
            SubmitStatus::DoneFailed => "DONE-FAILED",
            SubmitStatus::Cancelled => "CANCELLED",
            SubmitStatus::Aborted => "ABORTED",
            SubmitStatus::Unknown => "UNKNOWN",
            SubmitStatus::Undef => "UNDEF",
            SubmitStatus::Removing => "REMOVING",
            SubmitStatus::TransferringOutput => "TRANSFERRING",
            SubmitStatus::Suspended => "SUSPENDED",
            SubmitStatus::SubmitFailed => "SUBMIT-FAILED",
            SubmitStatus::DoneOkOutputProblem => "DONE-OK, output problem",
            SubmitStatus::DoneFailedOutputProblem => "DONE-FAILED, output problem",
            SubmitStatus::CancelledOutputProblem => "CANCELLED, output problem",
            SubmitStatus::DoneOkNonZeroRc => "DONE-OK, RC!=0",
        }
    }
}

impl fmt::Display for SubmitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Normalized CE status
// ============================================================================

/// What a CE reports for a submission, normalized across CE flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CeStatus {
    Registered,
    Pending,
    Idle,
    Running,
    ReallyRunning,
    Held,
    DoneOk,
    DoneFailed,
    Cancelled,
    Aborted,
    Removing,
    TransferringOutput,
    Suspended,
    Unknown,
    #[default]
    Undef,
}

impl CeStatus {
    pub const ALL: &'static [CeStatus] = &[
        CeStatus::Registered,
        CeStatus::Pending,
        CeStatus::Idle,
        CeStatus::Running,
        CeStatus::ReallyRunning,
        CeStatus::Held,
        CeStatus::DoneOk,
        CeStatus::DoneFailed,
        CeStatus::Cancelled,
        CeStatus::Aborted,
        CeStatus::Removing,
        CeStatus::TransferringOutput,
        CeStatus::Suspended,
        CeStatus::Unknown,
        CeStatus::Undef,
    ];

    /// Map a CREAM `Current Status = [...]` lexeme. Total: unrecognized
    /// lexemes are Undef, never an error.
    pub fn from_cream_lexeme(lexeme: &str) -> Self {
        match lexeme.trim() {
            "REGISTERED" => CeStatus::Registered,
            "PENDING" => CeStatus::Pending,
            "IDLE" => CeStatus::Idle,
            "RUNNING" => CeStatus::Running,
            "REALLY-RUNNING" => CeStatus::ReallyRunning,
            "HELD" => CeStatus::Held,
            "DONE-OK" => CeStatus::DoneOk,
            "DONE-FAILED" => CeStatus::DoneFailed,
            "CANCELLED" => CeStatus::Cancelled,
            "ABORTED" => CeStatus::Aborted,
            "UNKNOWN" => CeStatus::Unknown,
            _ => CeStatus::Undef,
        }
    }

    /// Map a Condor numeric `JobStatus` value. Condor reports COMPLETED as a
    /// single state; the exit code decides DoneOk vs the 207 path later.
    pub fn from_condor_code(code: &str) -> Self {
        match code.trim() {
            "1" => CeStatus::Idle,
            "2" => CeStatus::Running,
            "3" => CeStatus::Removing,
            "4" => CeStatus::DoneOk,
            "5" => CeStatus::Held,
            "6" => CeStatus::TransferringOutput,
            "7" => CeStatus::Suspended,
            _ => CeStatus::Undef,
        }
    }

    /// The fine-grained code to record while the submission is being
    /// tracked. Completion states return None: their final code depends on
    /// the finalization outcome and is chosen by the state machine.
    pub fn tracking_status(self) -> Option<SubmitStatus> {
        match self {
            CeStatus::Registered => Some(SubmitStatus::Registered),
            CeStatus::Pending => Some(SubmitStatus::Pending),
            CeStatus::Idle => Some(SubmitStatus::Idle),
            CeStatus::Running => Some(SubmitStatus::Running),
            CeStatus::ReallyRunning => Some(SubmitStatus::ReallyRunning),
            CeStatus::Held => Some(SubmitStatus::Held),
            CeStatus::Removing => Some(SubmitStatus::Removing),
            CeStatus::TransferringOutput => Some(SubmitStatus::TransferringOutput),
            CeStatus::Suspended => Some(SubmitStatus::Suspended),
            CeStatus::Unknown => Some(SubmitStatus::Unknown),
            CeStatus::Undef => Some(SubmitStatus::Undef),
            CeStatus::DoneOk
            | CeStatus::DoneFailed
            | CeStatus::Cancelled
            | CeStatus::Aborted => None,
        }
    }

    /// True when the CE considers the submission over.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            CeStatus::DoneOk | CeStatus::DoneFailed | CeStatus::Cancelled | CeStatus::Aborted
        )
    }

    /// True when a worker node is expected to be attached.
    pub fn is_running(self) -> bool {
        matches!(self, CeStatus::Running | CeStatus::ReallyRunning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CeStatus::Registered => "REGISTERED",
            CeStatus::Pending => "PENDING",
            CeStatus::Idle => "IDLE",
            CeStatus::Running => "RUNNING",
            CeStatus::ReallyRunning => "REALLY-RUNNING",
            CeStatus::Held => "HELD",
            CeStatus::DoneOk => "DONE-OK",
            CeStatus::DoneFailed => "DONE-FAILED",
            CeStatus::Cancelled => "CANCELLED",
            CeStatus::Aborted => "ABORTED",
            CeStatus::Removing => "REMOVING",
            CeStatus::TransferringOutput => "TRANSFERRING OUTPUT",
            CeStatus::Suspended => "SUSPENDED",
            CeStatus::Unknown => "UNKNOWN",
            CeStatus::Undef => "UNDEF",
        }
    }
}

impl fmt::Display for CeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_status_codes_round_trip() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 100, 107, 108, 109, 207]
        {
            let status = SubmitStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(SubmitStatus::from_code(16), None);
        assert_eq!(SubmitStatus::from_code(206), None);
    }

    #[test]
    fn terminal_set_matches_codes() {
        let codes: Vec<i64> = SubmitStatus::TERMINAL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![7, 8, 9, 10, 100, 107, 108, 109, 207]);
        for status in SubmitStatus::TERMINAL {
            assert!(status.is_terminal());
        }
        assert!(!SubmitStatus::Running.is_terminal());
    }

    #[test]
    fn job_status_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_code(status.code()), Some(*status));
        }
        assert_eq!(JobStatus::from_code(4), None);
    }

    #[test]
    fn cream_mapping_is_total() {
        assert_eq!(CeStatus::from_cream_lexeme("REALLY-RUNNING"), CeStatus::ReallyRunning);
        assert_eq!(CeStatus::from_cream_lexeme("DONE-OK"), CeStatus::DoneOk);
        // Whatever the CE invents tomorrow maps to Undef
        assert_eq!(CeStatus::from_cream_lexeme("PURGING"), CeStatus::Undef);
        assert_eq!(CeStatus::from_cream_lexeme(""), CeStatus::Undef);
    }

    #[test]
    fn condor_mapping_is_total() {
        assert_eq!(CeStatus::from_condor_code("1"), CeStatus::Idle);
        assert_eq!(CeStatus::from_condor_code("4"), CeStatus::DoneOk);
        assert_eq!(CeStatus::from_condor_code("6"), CeStatus::TransferringOutput);
        assert_eq!(CeStatus::from_condor_code("8"), CeStatus::Undef);
        assert_eq!(CeStatus::from_condor_code("x"), CeStatus::Undef);
    }

    #[test]
    fn tracking_status_covers_non_final_states() {
        for status in CeStatus::ALL {
            if status.is_final() {
                assert_eq!(status.tracking_status(), None);
            } else {
                assert!(status.tracking_status().is_some());
            }
        }
    }
}
