//! Production controller for GridFlow.
//!
//! The long-running supervisor that drives a population of per-job state
//! machines against remote CEs: submit, observe, finalize, resubmit within
//! budgets, and record every transition in the catalog. Also home to the
//! job factories that lay a new production out on disk and the stdout/stderr
//! parser that turns a finished job's sandbox into catalog rows.

pub mod controller;
pub mod factory;
pub mod fsm;
pub mod lockfile;
pub mod output_parser;

pub use controller::{Controller, ControllerConfig, ControllerReport, SweepCounters};
pub use factory::{FactoryContext, JobFactory, JobSpec, McFactory, RecoFactory, SeedList};
pub use fsm::{FsmError, JobFsm, SweepToken};
pub use lockfile::{LockError, PidLock};
pub use output_parser::{parse_stderr, parse_stdout, FileRecord, ParsedStdout, StderrReport};
