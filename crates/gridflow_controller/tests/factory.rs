//! Production layout tests for both factory flavors.

use async_trait::async_trait;
use gridflow_controller::{FactoryContext, JobFactory, McFactory, RecoFactory, SeedList};
use gridflow_grid::{AdapterError, Storage};
use gridflow_protocol::MyProxyConfig;
use std::path::PathBuf;
use tempfile::TempDir;

struct ListingStorage {
    entries: Vec<String>,
}

#[async_trait]
impl Storage for ListingStorage {
    async fn mkdir(&self, _uri: &str) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn exists(&self, _uri: &str) -> Result<bool, AdapterError> {
        Ok(false)
    }
    async fn rename(&self, _src: &str, _dst: &str) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn copy(&self, _src: &str, _dst: &str) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn list(&self, _uri: &str) -> Result<Vec<String>, AdapterError> {
        Ok(self.entries.clone())
    }
}

struct Scaffold {
    _tmp: TempDir,
    prod_dir: PathBuf,
    script: PathBuf,
    proxy: PathBuf,
    macro_file: PathBuf,
    myproxy: MyProxyConfig,
}

fn scaffold() -> Scaffold {
    let tmp = TempDir::new().unwrap();
    let prod_dir = tmp.path().join("prod_x");
    std::fs::create_dir_all(&prod_dir).unwrap();
    let script = tmp.path().join("payload.py");
    std::fs::write(&script, "print('payload')\n").unwrap();
    let proxy = tmp.path().join("local.proxy");
    std::fs::write(&proxy, "CREDENTIAL").unwrap();
    let macro_file = tmp.path().join("prod_x.mac");
    std::fs::write(&macro_file, "/run/beamOn 1000\n").unwrap();
    Scaffold {
        _tmp: tmp,
        prod_dir,
        script,
        proxy,
        macro_file,
        myproxy: MyProxyConfig {
            server: "myproxy.example.org".to_string(),
            port: 7512,
            name: "prod_x".to_string(),
            passwd: "secret".to_string(),
        },
    }
}

impl Scaffold {
    fn context<'a>(&'a self, storage: &'a dyn Storage) -> FactoryContext<'a> {
        FactoryContext {
            prod_name: "prod_x",
            prod_dir: &self.prod_dir,
            version: "v1.0.0",
            storage_uri: "root://storage.example.org//data",
            storage_dir: "/mc/v1.0.0/prod_x/sim",
            script_path: &self.script,
            proxy_local: &self.proxy,
            myproxy: &self.myproxy,
            storage,
        }
    }
}

#[tokio::test]
async fn mc_factory_lays_out_one_dir_per_seed_pair() {
    let scaffold = scaffold();
    let storage = ListingStorage { entries: vec![] };
    let factory = McFactory {
        n_jobs: 3,
        macro_path: scaffold.macro_file.clone(),
        seeds: SeedList::generate(3),
    };

    let specs = factory.layout_jobs(&scaffold.context(&storage)).await.unwrap();
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[0].name, "job00000");
    assert_eq!(specs[2].name, "job00002");

    for spec in &specs {
        assert_eq!(spec.configuration, "/run/beamOn 1000\n");
        assert!(spec.input_list.is_none());
        let seeds = spec.random.as_deref().unwrap();
        assert!(seeds.contains(','), "seed pair expected, got {seeds:?}");

        let job_dir = scaffold.prod_dir.join(&spec.job_dir);
        assert!(job_dir.join("job.py").exists());
        assert!(job_dir.join("job.mac").exists());
        assert!(job_dir.join("job.proxy").exists());

        let descriptor = std::fs::read_to_string(job_dir.join("job.sub")).unwrap();
        assert!(descriptor.contains("universe = vanilla"));
        assert!(descriptor.contains(&format!(
            "arguments = -u job.py job.mac prod_x {} v1.0.0 /mc/v1.0.0/prod_x/sim root://storage.example.org//data {seeds}",
            spec.name
        )));
        assert!(descriptor.contains("transfer_input_files = job.py,job.mac,job.proxy"));
        assert!(descriptor.contains("MyProxyHost = myproxy.example.org:7512"));
    }

    // Credential copies are private to the job
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(scaffold.prod_dir.join("job00000/job.proxy"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn mc_factory_requires_enough_seeds() {
    let scaffold = scaffold();
    let storage = ListingStorage { entries: vec![] };
    let factory = McFactory {
        n_jobs: 5,
        macro_path: scaffold.macro_file.clone(),
        seeds: SeedList::generate(2),
    };
    assert!(factory.layout_jobs(&scaffold.context(&storage)).await.is_err());
}

#[tokio::test]
async fn reco_factory_chunks_sorted_raw_files() {
    let scaffold = scaffold();
    // 25 files, deliberately shuffled: 10 + 10 + 5 jobs expected
    let mut entries: Vec<String> = (0..25u32)
        .map(|i| format!("run_0042_{:02}_{:03}.root", i % 2, i / 2))
        .collect();
    entries.reverse();
    entries.push("not-a-rawfile.txt".to_string());
    let storage = ListingStorage { entries };

    let factory = RecoFactory {
        run: "run_0042".to_string(),
        year: "2019".to_string(),
        files_per_job: 10,
        source_uri: "root://daqstore.example.org//raw".to_string(),
    };

    let specs = factory.layout_jobs(&scaffold.context(&storage)).await.unwrap();
    assert_eq!(specs.len(), 3);

    let first_list = std::fs::read_to_string(scaffold.prod_dir.join("job00000/job.list")).unwrap();
    let lines: Vec<&str> = first_list.lines().collect();
    assert_eq!(lines.len(), 10);
    assert_eq!(
        lines[0],
        "root://daqstore.example.org//raw/daq/2019/rawdata/run_0042/run_0042_00_000.root"
    );

    let last = specs.last().unwrap();
    assert_eq!(last.name, "job00002");
    assert_eq!(last.input_list.as_deref().unwrap().split(' ').count(), 5);

    let descriptor =
        std::fs::read_to_string(scaffold.prod_dir.join("job00002/job.sub")).unwrap();
    assert!(descriptor.contains("arguments = -u job.py job.list prod_x job00002"));
    assert!(descriptor.contains("transfer_input_files = job.py,job.list,job.proxy"));
}

#[tokio::test]
async fn reco_factory_fails_on_empty_run() {
    let scaffold = scaffold();
    let storage = ListingStorage { entries: vec![] };
    let factory = RecoFactory {
        run: "run_9999".to_string(),
        year: "2019".to_string(),
        files_per_job: 10,
        source_uri: "root://daqstore.example.org//raw".to_string(),
    };
    assert!(factory.layout_jobs(&scaffold.context(&storage)).await.is_err());
}
