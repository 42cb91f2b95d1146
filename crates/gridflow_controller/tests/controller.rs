//! End-to-end controller scenarios against a scripted CE and an in-memory
//! catalog.

use async_trait::async_trait;
use gridflow_controller::{Controller, ControllerConfig};
use gridflow_db::{Catalog, McProductionSpec};
use gridflow_grid::{AdapterError, CeJobInfo, ComputeElement, CredentialManager};
use gridflow_protocol::paths;
use gridflow_protocol::{CeStatus, CredentialConfig, FsmConfig, SubmitStatus, SweepConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ----------------------------------------------------------------------
// Scripted CE
// ----------------------------------------------------------------------

/// What the mock leaves in the job directory on fetch_output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sandbox {
    /// All five sandbox files, with a parseable stdout.
    Complete,
    /// job.err missing: finalization must fail.
    MissingErr,
}

struct MockState {
    next_cluster: u32,
    /// Reject this many submit calls before accepting again.
    submit_fail_next: u32,
    /// Status sequence served to each new job; the last entry repeats.
    script: Vec<CeJobInfo>,
    per_job: HashMap<String, Vec<CeJobInfo>>,
    cancelled: HashMap<String, bool>,
}

struct MockCe {
    endpoint: String,
    sandbox: Sandbox,
    state: Mutex<MockState>,
    cancels: AtomicU32,
    purges: AtomicU32,
    submissions: AtomicU32,
}

fn info(status: CeStatus) -> CeJobInfo {
    CeJobInfo {
        status,
        exit_code: None,
        worker_node: None,
        local_user: None,
        description: None,
    }
}

fn done_ok(exit_code: &str) -> CeJobInfo {
    CeJobInfo {
        status: CeStatus::DoneOk,
        exit_code: Some(exit_code.to_string()),
        worker_node: Some("wn042.example.org".to_string()),
        local_user: Some("pool017".to_string()),
        description: None,
    }
}

impl MockCe {
    fn new(endpoint: &str, script: Vec<CeJobInfo>, sandbox: Sandbox) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            sandbox,
            state: Mutex::new(MockState {
                next_cluster: 1000,
                submit_fail_next: 0,
                script,
                per_job: HashMap::new(),
                cancelled: HashMap::new(),
            }),
            cancels: AtomicU32::new(0),
            purges: AtomicU32::new(0),
            submissions: AtomicU32::new(0),
        })
    }

    fn fail_next_submits(&self, n: u32) {
        self.state.lock().unwrap().submit_fail_next = n;
    }

    /// Register a job the CE already knows about, as if submitted by an
    /// earlier controller run.
    fn preload(&self, ce_job_id: &str) {
        let mut state = self.state.lock().unwrap();
        let script = state.script.clone();
        state.per_job.insert(ce_job_id.to_string(), script);
        state.cancelled.insert(ce_job_id.to_string(), false);
    }

    fn write_sandbox(&self, dest_dir: &Path, ce_job_id: &str) {
        let tag = ce_job_id.rsplit('/').next().unwrap_or("x");
        let stdout = format!(
            "Job starting at 2019-04-15 10:00:00 (UTC)\n\
             Job running on node wn042.example.org as user pool017 in dir /scratch/d{tag}\n\
             Program starting at 2019-04-15 10:00:05 (UTC)\n\
             PadmeMCInfo - Total Events 1000\n\
             Program ending at 2019-04-15 11:00:00 (UTC)\n\
             MCDATA file out_{tag}_data.root with size 4096 and adler32 1a2b3c4d copied\n\
             Job ending at 2019-04-15 11:01:00 (UTC)\n"
        );
        std::fs::write(dest_dir.join(paths::JOB_OUT), stdout).unwrap();
        if self.sandbox == Sandbox::Complete {
            std::fs::write(dest_dir.join(paths::JOB_ERR), "").unwrap();
        }
        std::fs::write(dest_dir.join(paths::JOB_SH), "#!/bin/sh\n").unwrap();
        std::fs::write(dest_dir.join(paths::JOB_LOG), "").unwrap();
        std::fs::write(dest_dir.join(paths::JOB_STATUS), "JobStatus = 4\n").unwrap();
    }
}

#[async_trait]
impl ComputeElement for MockCe {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit(&self, _job_dir: &Path) -> Result<String, AdapterError> {
        let mut state = self.state.lock().unwrap();
        if state.submit_fail_next > 0 {
            state.submit_fail_next -= 1;
            return Err(AdapterError::Transient("submission rejected".into()));
        }
        state.next_cluster += 1;
        let id = format!("{}/{}", self.endpoint, state.next_cluster);
        let script = state.script.clone();
        state.per_job.insert(id.clone(), script);
        state.cancelled.insert(id.clone(), false);
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn status(&self, ce_job_id: &str) -> CeJobInfo {
        let mut state = self.state.lock().unwrap();
        if state.cancelled.get(ce_job_id).copied().unwrap_or(false) {
            return info(CeStatus::Cancelled);
        }
        match state.per_job.get_mut(ce_job_id) {
            Some(steps) if steps.len() > 1 => steps.remove(0),
            Some(steps) => steps.first().cloned().unwrap_or_default(),
            None => CeJobInfo::default(),
        }
    }

    async fn fetch_output(&self, ce_job_id: &str, dest_dir: &Path) -> Result<(), AdapterError> {
        self.write_sandbox(dest_dir, ce_job_id);
        Ok(())
    }

    async fn purge(&self, _ce_job_id: &str) {
        self.purges.fetch_add(1, Ordering::SeqCst);
    }

    async fn cancel(&self, ce_job_id: &str) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .cancelled
            .insert(ce_job_id.to_string(), true);
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

struct Fixture {
    catalog: Catalog,
    prod_dir: PathBuf,
    _tmp: TempDir,
}

async fn make_production(name: &str, n_jobs: u32) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let prod_dir = tmp.path().join(name);
    std::fs::create_dir_all(&prod_dir).unwrap();

    let catalog = Catalog::open_memory().await.unwrap();
    let spec = McProductionSpec {
        name: name.to_string(),
        description: "test".to_string(),
        user_req: "tester".to_string(),
        n_events_req: 0,
        mc_version: "v1.0.0".to_string(),
        ce_list: vec!["mock.example.org:9619".to_string()],
        prod_dir: prod_dir.to_string_lossy().into_owned(),
        storage_uri: "root://storage.example.org//data".to_string(),
        storage_dir: format!("/mc/v1.0.0/{name}/sim"),
        proxy_info: "myproxy.example.org:7512 tester secret".to_string(),
        n_jobs,
    };
    let prod_id = catalog.create_mc_production(&spec).await.unwrap();

    for index in 0..n_jobs {
        let job_name = paths::job_dir_name(index);
        std::fs::create_dir_all(prod_dir.join(&job_name)).unwrap();
        catalog
            .create_job(prod_id, &job_name, &job_name, "macro", None, Some("1,2"))
            .await
            .unwrap();
    }

    Fixture {
        catalog,
        prod_dir,
        _tmp: tmp,
    }
}

fn fast_config(resubmit_max: u32) -> ControllerConfig {
    ControllerConfig {
        sweep: SweepConfig {
            delay: Duration::from_millis(20),
            jitter: Duration::ZERO,
            quit_delay: Duration::from_millis(10),
        },
        fsm: FsmConfig {
            resubmit_max,
            cancelled_resubmit: true,
        },
    }
}

fn credential() -> CredentialManager {
    CredentialManager::new(CredentialConfig::default())
}

async fn run_to_completion(
    fixture: &Fixture,
    name: &str,
    ce: Arc<MockCe>,
    config: ControllerConfig,
) -> gridflow_controller::ControllerReport {
    let mut controller = Controller::new(
        fixture.catalog.clone(),
        credential(),
        name,
        vec![ce as Arc<dyn ComputeElement>],
        config,
    )
    .await
    .unwrap();
    tokio::time::timeout(Duration::from_secs(30), controller.run())
        .await
        .expect("controller did not drain in time")
        .unwrap()
}

// ----------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------

#[tokio::test]
async fn happy_path_three_jobs() {
    let fixture = make_production("prod_happy", 3).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![
            info(CeStatus::Idle),
            info(CeStatus::Running),
            done_ok("0"),
        ],
        Sandbox::Complete,
    );

    let report = run_to_completion(&fixture, "prod_happy", Arc::clone(&ce), fast_config(1000)).await;
    assert_eq!(report.n_jobs, 3);
    assert_eq!(report.jobs_ok, 3);
    assert_eq!(report.jobs_fail, 0);
    assert_eq!(report.n_events, 3000);

    // One submission per job, each closed DONE-OK and purged
    let prod_id = fixture.catalog.get_prod_id("prod_happy").await.unwrap().unwrap();
    for job_id in fixture.catalog.list_job_ids(prod_id).await.unwrap() {
        let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].submit_status(), Some(SubmitStatus::DoneOk));
        assert!(subs[0].time_complete.is_some());
        assert_eq!(subs[0].worker_node.as_deref(), Some("wn042.example.org"));
    }
    assert_eq!(ce.purges.load(Ordering::SeqCst), 3);

    let prod = fixture.catalog.get_prod_info(prod_id).await.unwrap();
    assert!(prod.time_complete.is_some());
    assert_eq!((prod.n_jobs_ok, prod.n_jobs_fail), (3, 0));

    // submit_NNN directories hold the retrieved sandboxes
    assert!(fixture
        .prod_dir
        .join("job00000")
        .join("submit_000")
        .join(paths::JOB_OUT)
        .exists());

    // Artifacts reached the catalog
    let files = fixture.catalog.get_prod_file_list("prod_happy").await.unwrap();
    assert_eq!(files.len(), 3);
}

#[tokio::test]
async fn submit_failure_keeps_job_created_then_recovers() {
    let fixture = make_production("prod_retry", 1).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![done_ok("0")],
        Sandbox::Complete,
    );
    // First submit call is rejected; the sweep after that succeeds
    ce.fail_next_submits(1);

    let report = run_to_completion(&fixture, "prod_retry", Arc::clone(&ce), fast_config(1000)).await;
    assert_eq!(report.jobs_ok, 1);

    let prod_id = fixture.catalog.get_prod_id("prod_retry").await.unwrap().unwrap();
    let job_id = fixture.catalog.list_job_ids(prod_id).await.unwrap()[0];
    let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].submit_status(), Some(SubmitStatus::SubmitFailed));
    assert_eq!(subs[1].submit_status(), Some(SubmitStatus::DoneOk));
    // Indices stay contiguous from 0
    assert_eq!(
        subs.iter().map(|s| s.submit_index).collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[tokio::test]
async fn finalize_problem_closes_with_output_problem_and_budget_applies() {
    let fixture = make_production("prod_badout", 1).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![done_ok("0")],
        Sandbox::MissingErr,
    );

    let report = run_to_completion(&fixture, "prod_badout", Arc::clone(&ce), fast_config(1)).await;
    assert_eq!(report.jobs_ok, 0);
    assert_eq!(report.jobs_fail, 1);

    let prod_id = fixture.catalog.get_prod_id("prod_badout").await.unwrap().unwrap();
    let job_id = fixture.catalog.list_job_ids(prod_id).await.unwrap()[0];
    let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(
        subs[0].submit_status(),
        Some(SubmitStatus::DoneOkOutputProblem)
    );
    // Incomplete sandbox: the CE-side job is kept for inspection
    assert_eq!(ce.purges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn finalize_problem_with_budget_left_resubmits() {
    let fixture = make_production("prod_badout2", 1).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![done_ok("0")],
        Sandbox::MissingErr,
    );

    let report = run_to_completion(&fixture, "prod_badout2", Arc::clone(&ce), fast_config(2)).await;
    assert_eq!(report.jobs_fail, 1);

    let prod_id = fixture.catalog.get_prod_id("prod_badout2").await.unwrap().unwrap();
    let job_id = fixture.catalog.list_job_ids(prod_id).await.unwrap()[0];
    let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
    // A second submission was attempted before the budget closed the job
    assert_eq!(subs.len(), 2);
    assert_eq!(
        subs.iter().map(|s| s.submit_index).collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[tokio::test]
async fn nonzero_exit_code_closes_with_rc_status() {
    let fixture = make_production("prod_rc", 1).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![done_ok("137")],
        Sandbox::Complete,
    );

    let report = run_to_completion(&fixture, "prod_rc", Arc::clone(&ce), fast_config(1)).await;
    assert_eq!(report.jobs_fail, 1);

    let prod_id = fixture.catalog.get_prod_id("prod_rc").await.unwrap().unwrap();
    let job_id = fixture.catalog.list_job_ids(prod_id).await.unwrap()[0];
    let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
    assert_eq!(subs[0].submit_status(), Some(SubmitStatus::DoneOkNonZeroRc));
    assert_eq!(subs[0].exit_code.as_deref(), Some("137"));
}

#[tokio::test]
async fn quit_sentinel_cancels_active_jobs_and_blocks_new_submissions() {
    let fixture = make_production("prod_quit", 3).await;
    // Jobs run forever until cancelled
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![info(CeStatus::Running)],
        Sandbox::Complete,
    );

    let catalog = fixture.catalog.clone();
    let mut controller = Controller::new(
        catalog,
        credential(),
        "prod_quit",
        vec![Arc::clone(&ce) as Arc<dyn ComputeElement>],
        fast_config(1000),
    )
    .await
    .unwrap();

    let prod_dir = fixture.prod_dir.clone();
    let handle = tokio::spawn(async move { controller.run().await });

    // Let a couple of sweeps pass with everything Running, then ask to quit
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(paths::quit_file(&prod_dir), "").unwrap();

    let report = tokio::time::timeout(Duration::from_secs(30), handle)
        .await
        .expect("controller did not quit in time")
        .unwrap()
        .unwrap();

    assert_eq!(report.jobs_ok, 0);
    assert_eq!(report.jobs_fail, 3);
    assert!(ce.cancels.load(Ordering::SeqCst) >= 3);
    // No resubmissions after the sentinel appeared
    assert_eq!(ce.submissions.load(Ordering::SeqCst), 3);

    let prod_id = fixture.catalog.get_prod_id("prod_quit").await.unwrap().unwrap();
    for job_id in fixture.catalog.list_job_ids(prod_id).await.unwrap() {
        let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].submit_status(), Some(SubmitStatus::Cancelled));
    }
}

#[tokio::test]
async fn undef_escalator_quits_the_production() {
    let fixture = make_production("prod_undef", 1).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![info(CeStatus::Undef)],
        Sandbox::Complete,
    );

    let report = run_to_completion(&fixture, "prod_undef", Arc::clone(&ce), fast_config(1000)).await;

    // The escalator tripped, the job was cancelled and closed
    assert_eq!(report.jobs_fail, 1);
    assert!(ce.cancels.load(Ordering::SeqCst) >= 1);

    let prod_id = fixture.catalog.get_prod_id("prod_undef").await.unwrap().unwrap();
    let job_id = fixture.catalog.list_job_ids(prod_id).await.unwrap()[0];
    let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].submit_status(), Some(SubmitStatus::Cancelled));
}

#[tokio::test]
async fn per_job_quit_sentinel_fails_only_that_job() {
    let fixture = make_production("prod_jobquit", 2).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![
            info(CeStatus::Running),
            info(CeStatus::Running),
            done_ok("0"),
        ],
        Sandbox::Complete,
    );

    // job00001 is told to quit before anything is submitted
    std::fs::write(
        paths::quit_file(&fixture.prod_dir.join("job00001")),
        "",
    )
    .unwrap();

    let report =
        run_to_completion(&fixture, "prod_jobquit", Arc::clone(&ce), fast_config(1000)).await;
    assert_eq!(report.jobs_ok, 1);
    assert_eq!(report.jobs_fail, 1);
    // Only the surviving job ever reached the CE
    assert_eq!(ce.submissions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn restart_resumes_the_active_submission() {
    let fixture = make_production("prod_resume", 1).await;
    let prod_id = fixture.catalog.get_prod_id("prod_resume").await.unwrap().unwrap();
    let job_id = fixture.catalog.list_job_ids(prod_id).await.unwrap()[0];

    // State left behind by a previous controller: one submission accepted by
    // the CE, job Active
    let sub = fixture.catalog.create_job_submission(job_id, 0).await.unwrap();
    fixture
        .catalog
        .set_job_submitted(sub, "mock.example.org:9619/5005")
        .await
        .unwrap();
    fixture
        .catalog
        .set_job_status(job_id, gridflow_protocol::JobStatus::Active)
        .await
        .unwrap();

    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![done_ok("0")],
        Sandbox::Complete,
    );
    ce.preload("mock.example.org:9619/5005");

    let report =
        run_to_completion(&fixture, "prod_resume", Arc::clone(&ce), fast_config(1000)).await;
    assert_eq!(report.jobs_ok, 1);

    // The restarted controller tracked the existing submission instead of
    // opening a new one
    assert_eq!(ce.submissions.load(Ordering::SeqCst), 0);
    let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].submit_status(), Some(SubmitStatus::DoneOk));
}

#[tokio::test]
async fn aborted_submission_is_resubmitted_within_budget() {
    let fixture = make_production("prod_abort", 1).await;
    let ce = MockCe::new(
        "mock.example.org:9619",
        vec![info(CeStatus::Aborted)],
        Sandbox::Complete,
    );

    let report = run_to_completion(&fixture, "prod_abort", Arc::clone(&ce), fast_config(3)).await;
    assert_eq!(report.jobs_fail, 1);

    let prod_id = fixture.catalog.get_prod_id("prod_abort").await.unwrap().unwrap();
    let job_id = fixture.catalog.list_job_ids(prod_id).await.unwrap()[0];
    let subs = fixture.catalog.list_job_submissions(job_id).await.unwrap();
    // Budget of 3: three submissions, all Aborted, indices contiguous
    assert_eq!(subs.len(), 3);
    for sub in &subs {
        assert_eq!(sub.submit_status(), Some(SubmitStatus::Aborted));
    }
    assert_eq!(
        subs.iter().map(|s| s.submit_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}
