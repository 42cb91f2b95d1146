//! Sandbox log parsing.
//!
//! A finished job leaves a stdout file written by the job wrapper and the
//! payload program. The wrapper brackets its work with well-known lines and
//! reports every artifact it copied to storage; the payload prints a final
//! summary block. The parser extracts whatever is present and never fails
//! on unexpected content.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

static NODE_LINE: OnceLock<Regex> = OnceLock::new();
static JOB_START: OnceLock<Regex> = OnceLock::new();
static JOB_END: OnceLock<Regex> = OnceLock::new();
static PROG_START: OnceLock<Regex> = OnceLock::new();
static PROG_END: OnceLock<Regex> = OnceLock::new();
static RECO_EVENTS: OnceLock<Regex> = OnceLock::new();
static MC_EVENTS: OnceLock<Regex> = OnceLock::new();
static FILE_LINE: OnceLock<Regex> = OnceLock::new();
static COPY_ERROR: OnceLock<Regex> = OnceLock::new();
static RUNTIME_ERROR: OnceLock<Regex> = OnceLock::new();

/// One artifact reported by the job wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub file_type: String,
    pub name: String,
    pub size: i64,
    pub adler32: String,
}

/// Everything extractable from a job's stdout. All fields optional: a job
/// killed mid-flight reports only what it got to print.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedStdout {
    pub worker_node: Option<String>,
    pub wn_user: Option<String>,
    pub wn_dir: Option<String>,
    /// Job wrapper wall-clock bracket, UTC.
    pub time_start: Option<String>,
    pub time_end: Option<String>,
    /// Payload program bracket, UTC.
    pub prog_start: Option<String>,
    pub prog_end: Option<String>,
    /// Event count from a reconstruction summary block.
    pub reco_events: Option<i64>,
    /// Event count from a simulation summary block.
    pub mc_events: Option<i64>,
    pub files: Vec<FileRecord>,
}

impl ParsedStdout {
    /// The event count to record on the job, whichever payload ran.
    pub fn events(&self) -> Option<i64> {
        self.reco_events.or(self.mc_events)
    }
}

/// Scan a job's stdout.
pub fn parse_stdout(text: &str) -> ParsedStdout {
    let node_re = regex(
        &NODE_LINE,
        r"^Job running on node (\S*) as user (\S*) in dir (\S*)\s*$",
    );
    let job_start_re = regex(&JOB_START, r"^Job starting at (.*) \(UTC\)$");
    let job_end_re = regex(&JOB_END, r"^Job ending at (.*) \(UTC\)$");
    let prog_start_re = regex(&PROG_START, r"^Program starting at (.*) \(UTC\)$");
    let prog_end_re = regex(&PROG_END, r"^Program ending at (.*) \(UTC\)$");
    let reco_re = regex(&RECO_EVENTS, r"^RecoInfo - .*Processed Events\s+(\d+)\s*$");
    let mc_re = regex(&MC_EVENTS, r"^PadmeMCInfo - .*Total Events\s+(\d+)\s*$");
    let file_re = regex(
        &FILE_LINE,
        r"^(.*) file (.*) with size (.*) and adler32 (.*) copied.*$",
    );

    let mut parsed = ParsedStdout::default();
    for line in text.lines() {
        if let Some(caps) = node_re.captures(line) {
            parsed.worker_node = Some(caps[1].to_string());
            parsed.wn_user = Some(caps[2].to_string());
            parsed.wn_dir = Some(caps[3].to_string());
        } else if let Some(caps) = job_start_re.captures(line) {
            parsed.time_start = Some(caps[1].to_string());
        } else if let Some(caps) = job_end_re.captures(line) {
            parsed.time_end = Some(caps[1].to_string());
        } else if let Some(caps) = prog_start_re.captures(line) {
            parsed.prog_start = Some(caps[1].to_string());
        } else if let Some(caps) = prog_end_re.captures(line) {
            parsed.prog_end = Some(caps[1].to_string());
        } else if let Some(caps) = reco_re.captures(line) {
            parsed.reco_events = caps[1].parse().ok();
        } else if let Some(caps) = mc_re.captures(line) {
            parsed.mc_events = caps[1].parse().ok();
        } else if let Some(caps) = file_re.captures(line) {
            // A non-numeric size means the line only looked like a file
            // report; skip it rather than guessing
            if let Ok(size) = caps[3].trim().parse::<i64>() {
                parsed.files.push(FileRecord {
                    file_type: caps[1].to_string(),
                    name: caps[2].to_string(),
                    size,
                    adler32: caps[4].to_string(),
                });
            }
        }
    }
    parsed
}

/// Problems found in a job's stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StderrReport {
    /// Failed storage copies reported by the wrapper.
    pub copy_errors: u32,
    /// Payload hit a remote-file open error even if it exited 0.
    pub runtime_problem: bool,
}

impl StderrReport {
    pub fn is_clean(&self) -> bool {
        self.copy_errors == 0 && !self.runtime_problem
    }
}

/// Scan a job's stderr.
pub fn parse_stderr(text: &str) -> StderrReport {
    let copy_re = regex(
        &COPY_ERROR,
        r"^gfal-copy error:\s+(\d+)\s+\(.*\)\s+-\s+(.*)$",
    );
    let runtime_re = regex(&RUNTIME_ERROR, r"Error in <TNetXNGFile::Open>: \[ERROR\]");

    let mut report = StderrReport::default();
    for line in text.lines() {
        if copy_re.is_match(line) {
            report.copy_errors += 1;
        }
        if runtime_re.is_match(line) {
            report.runtime_problem = true;
        }
    }
    report
}
