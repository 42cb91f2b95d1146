//! Catalog behavior against an in-memory store.

use gridflow_db::{Catalog, CatalogError, McProductionSpec, ProdKind, RecoProductionSpec};
use gridflow_protocol::{JobStatus, SubmitStatus};

fn mc_spec(name: &str, n_jobs: u32) -> McProductionSpec {
    McProductionSpec {
        name: name.to_string(),
        description: "test production".to_string(),
        user_req: "tester".to_string(),
        n_events_req: 100_000,
        mc_version: "v1.0.0".to_string(),
        ce_list: vec!["ce01.example.org:9619".to_string(), "ce02.example.org:9619".to_string()],
        prod_dir: format!("prod/v1.0.0/{name}"),
        storage_uri: "root://storage.example.org//data".to_string(),
        storage_dir: format!("/mc/v1.0.0/{name}/sim"),
        proxy_info: "myproxy.example.org:7512 tester secret".to_string(),
        n_jobs,
    }
}

#[tokio::test]
async fn create_then_exists_then_conflict() {
    let catalog = Catalog::open_memory().await.unwrap();
    assert!(!catalog.production_exists("prod_a").await.unwrap());

    let prod_id = catalog.create_mc_production(&mc_spec("prod_a", 3)).await.unwrap();
    assert!(catalog.production_exists("prod_a").await.unwrap());
    assert_eq!(catalog.get_prod_id("prod_a").await.unwrap(), Some(prod_id));
    assert_eq!(catalog.get_prod_type(prod_id).await.unwrap(), ProdKind::Mc);

    let err = catalog
        .create_mc_production(&mc_spec("prod_a", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn reco_production_kind() {
    let catalog = Catalog::open_memory().await.unwrap();
    let spec = RecoProductionSpec {
        name: "run_0042_v1".to_string(),
        description: "reco".to_string(),
        run: "run_0042".to_string(),
        reco_version: "v1.0.0".to_string(),
        ce_list: vec!["ce01.example.org:9619".to_string()],
        prod_dir: "prod/v1.0.0/run_0042_v1".to_string(),
        storage_uri: "root://storage.example.org//data".to_string(),
        storage_dir: "/reco/v1.0.0/run_0042".to_string(),
        proxy_info: "myproxy.example.org:7512 tester secret".to_string(),
        n_jobs: 2,
    };
    let prod_id = catalog.create_reco_production(&spec).await.unwrap();
    assert_eq!(catalog.get_prod_type(prod_id).await.unwrap(), ProdKind::Reco);

    let info = catalog.get_prod_info(prod_id).await.unwrap();
    assert_eq!(info.name, "run_0042_v1");
    assert_eq!(info.ce_list(), vec!["ce01.example.org:9619"]);
    assert_eq!(info.n_jobs, 2);
}

#[tokio::test]
async fn job_lifecycle_and_rollups() {
    let catalog = Catalog::open_memory().await.unwrap();
    let prod_id = catalog.create_mc_production(&mc_spec("prod_b", 2)).await.unwrap();

    let job0 = catalog
        .create_job(prod_id, "job00000", "job00000", "macro text", None, Some("12,34"))
        .await
        .unwrap();
    let job1 = catalog
        .create_job(prod_id, "job00001", "job00001", "macro text", None, Some("56,78"))
        .await
        .unwrap();
    assert_eq!(catalog.list_job_ids(prod_id).await.unwrap(), vec![job0, job1]);

    let row = catalog.get_job(job0).await.unwrap();
    assert_eq!(row.job_status(), Some(JobStatus::Created));
    assert_eq!(row.random.as_deref(), Some("12,34"));

    catalog.set_job_n_events(job0, 500).await.unwrap();
    catalog.set_job_n_events(job1, 250).await.unwrap();
    assert_eq!(catalog.get_prod_total_events(prod_id).await.unwrap(), 750);

    catalog.close_job(job0, JobStatus::Successful).await.unwrap();
    let row = catalog.get_job(job0).await.unwrap();
    assert_eq!(row.job_status(), Some(JobStatus::Successful));
    assert!(row.time_complete.is_some());

    catalog.set_prod_job_numbers(prod_id, 1, 0).await.unwrap();
    catalog.close_prod(prod_id, 1, 1, 750).await.unwrap();
    let info = catalog.get_prod_info(prod_id).await.unwrap();
    assert_eq!((info.n_jobs_ok, info.n_jobs_fail, info.n_events), (1, 1, 750));
    assert!(info.time_complete.is_some());
}

#[tokio::test]
async fn submissions_are_contiguous_per_job() {
    let catalog = Catalog::open_memory().await.unwrap();
    let prod_id = catalog.create_mc_production(&mc_spec("prod_c", 1)).await.unwrap();
    let job = catalog
        .create_job(prod_id, "job00000", "job00000", "cfg", None, None)
        .await
        .unwrap();

    let sub0 = catalog.create_job_submission(job, 0).await.unwrap();
    let sub1 = catalog.create_job_submission(job, 1).await.unwrap();

    // Duplicate index is rejected by the schema
    let err = catalog.create_job_submission(job, 1).await.unwrap_err();
    assert!(matches!(err, CatalogError::Conflict(_) | CatalogError::Sqlx(_)));

    let subs = catalog.list_job_submissions(job).await.unwrap();
    let indices: Vec<i64> = subs.iter().map(|s| s.submit_index).collect();
    assert_eq!(indices, vec![0, 1]);

    assert_eq!(catalog.get_job_submit_index(sub0).await.unwrap(), 0);
    assert_eq!(catalog.get_job_submit_index(sub1).await.unwrap(), 1);
}

#[tokio::test]
async fn submission_status_updates() {
    let catalog = Catalog::open_memory().await.unwrap();
    let prod_id = catalog.create_mc_production(&mc_spec("prod_d", 1)).await.unwrap();
    let job = catalog
        .create_job(prod_id, "job00000", "job00000", "cfg", None, None)
        .await
        .unwrap();
    let sub = catalog.create_job_submission(job, 0).await.unwrap();

    let row = catalog.get_job_submit_info(sub).await.unwrap();
    assert_eq!(row.submit_status(), Some(SubmitStatus::Unsubmitted));
    assert!(row.time_submit.is_some());

    catalog
        .set_job_submitted(sub, "ce01.example.org:9619/1234")
        .await
        .unwrap();
    let row = catalog.get_job_submit_info(sub).await.unwrap();
    assert_eq!(row.submit_status(), Some(SubmitStatus::Registered));
    assert_eq!(row.ce_job_id.as_deref(), Some("ce01.example.org:9619/1234"));

    catalog
        .set_job_submit_status(sub, SubmitStatus::Running)
        .await
        .unwrap();
    catalog.set_job_worker_node(sub, "wn042.example.org").await.unwrap();
    catalog.set_job_wn_user(sub, "pool017").await.unwrap();
    catalog.set_job_time_start(sub, "2019-04-15 10:00:00").await.unwrap();

    catalog
        .close_job_submission(sub, SubmitStatus::DoneOk, Some("done"), Some("0"))
        .await
        .unwrap();
    let row = catalog.get_job_submit_info(sub).await.unwrap();
    assert_eq!(row.submit_status(), Some(SubmitStatus::DoneOk));
    assert_eq!(row.worker_node.as_deref(), Some("wn042.example.org"));
    assert_eq!(row.exit_code.as_deref(), Some("0"));
    assert!(row.time_complete.is_some());

    assert_eq!(
        catalog
            .find_prod_by_ce_job_id("ce01.example.org:9619/1234")
            .await
            .unwrap()
            .as_deref(),
        Some("prod_d")
    );
}

#[tokio::test]
async fn artifact_rows_unique_per_job() {
    let catalog = Catalog::open_memory().await.unwrap();
    let prod_id = catalog.create_mc_production(&mc_spec("prod_e", 1)).await.unwrap();
    let job = catalog
        .create_job(prod_id, "job00000", "job00000", "cfg", None, None)
        .await
        .unwrap();

    catalog
        .create_job_file(job, "prod_e_job00000_data.root", "MCDATA", 0, 0, 123_456, "1a2b3c4d")
        .await
        .unwrap();
    catalog
        .create_job_file(job, "prod_e_job00000_hsto.root", "MCHSTO", 0, 0, 654, "deadbeef")
        .await
        .unwrap();

    let err = catalog
        .create_job_file(job, "prod_e_job00000_data.root", "MCDATA", 0, 0, 1, "ffffffff")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Conflict(_)));

    let names = catalog.get_prod_file_list("prod_e").await.unwrap();
    assert_eq!(
        names,
        vec!["prod_e_job00000_data.root", "prod_e_job00000_hsto.root"]
    );

    let attrs = catalog.get_prod_files_attr("prod_e").await.unwrap();
    assert_eq!(attrs.len(), 2);
    assert_eq!(attrs[0].size, 123_456);
    assert_eq!(attrs[0].adler32.as_deref(), Some("1a2b3c4d"));
}

#[tokio::test]
async fn rename_production_for_deletion() {
    let catalog = Catalog::open_memory().await.unwrap();
    let prod_id = catalog.create_mc_production(&mc_spec("prod_f", 1)).await.unwrap();

    catalog.rename_production(prod_id, "prod_f_deleted_00").await.unwrap();
    assert!(!catalog.production_exists("prod_f").await.unwrap());
    assert!(catalog.production_exists("prod_f_deleted_00").await.unwrap());
}
