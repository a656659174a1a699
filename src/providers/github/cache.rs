use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{GhaperfError, Result};

use super::types::{GitHubJob, GitHubWorkflowRun, RunLogFile};

const STATUS_COMPLETED: &str = "completed";

/// On-disk cache of immutable GitHub data.
///
/// Only completed jobs and runs are stored, since nothing about them changes
/// afterwards. Layout under the platform cache directory:
/// - `ghaperf/github/{owner}/{repo}/jobs/{job_id}/job.json`
/// - `ghaperf/github/{owner}/{repo}/jobs/{job_id}/log.txt`
/// - `ghaperf/github/{owner}/{repo}/runs/{run_id}/{attempt}/run.json`
/// - `ghaperf/github/{owner}/{repo}/runs/{run_id}/{attempt}/job_ids.json`
/// - `ghaperf/github/{owner}/{repo}/runs/{run_id}/{attempt}/logs/{file}`
/// - `ghaperf/github/{owner}/{repo}/runs/{run_id}/{attempt}/logs.json`
///
/// Reads and writes are best effort: a corrupt or unwritable entry is logged
/// and treated as a miss.
pub struct JobCache {
    root: PathBuf,
    enabled: bool,
}

impl JobCache {
    /// Creates a cache for one repository.
    ///
    /// # Arguments
    ///
    /// * `repository` - Repository in `owner/repo` form
    /// * `enabled` - Whether caching is enabled
    ///
    /// # Errors
    ///
    /// Returns error if the platform cache directory cannot be determined.
    pub fn new(repository: &str, enabled: bool) -> Result<Self> {
        if !enabled {
            debug!("Cache disabled");
            return Ok(Self::disabled());
        }

        let root = repository_dir(repository)?;
        info!("Cache enabled at: {}", root.display());

        Ok(Self::with_root(root))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            enabled: false,
        }
    }

    fn job_dir(&self, job_id: u64) -> PathBuf {
        self.root.join("jobs").join(job_id.to_string())
    }

    fn run_dir(&self, run_id: u64, attempt: u32) -> PathBuf {
        self.root
            .join("runs")
            .join(run_id.to_string())
            .join(attempt.to_string())
    }

    pub fn get_job(&self, job_id: u64) -> Option<GitHubJob> {
        self.read_json(&self.job_dir(job_id).join("job.json"))
    }

    pub fn save_job(&self, job: &GitHubJob) {
        if job.status == STATUS_COMPLETED {
            self.write_json(&self.job_dir(job.id).join("job.json"), job);
        }
    }

    pub fn get_job_log(&self, job_id: u64) -> Option<String> {
        self.read(&self.job_dir(job_id).join("log.txt"))
    }

    /// Stores a job log. Callers only pass logs of completed jobs.
    pub fn save_job_log(&self, job_id: u64, log: &str) {
        self.write(&self.job_dir(job_id).join("log.txt"), log.as_bytes());
    }

    pub fn get_run(&self, run_id: u64, attempt: u32) -> Option<GitHubWorkflowRun> {
        self.read_json(&self.run_dir(run_id, attempt).join("run.json"))
    }

    pub fn save_run(&self, run: &GitHubWorkflowRun) {
        let (Some(STATUS_COMPLETED), Some(attempt)) = (run.status.as_deref(), run.run_attempt)
        else {
            return;
        };
        self.write_json(&self.run_dir(run.id, attempt).join("run.json"), run);
    }

    /// Ids of the jobs that ran in one attempt of a run.
    pub fn get_job_ids(&self, run_id: u64, attempt: u32) -> Option<Vec<u64>> {
        self.read_json(&self.run_dir(run_id, attempt).join("job_ids.json"))
    }

    pub fn save_job_ids(&self, run: &GitHubWorkflowRun, job_ids: &[u64]) {
        let (Some(STATUS_COMPLETED), Some(attempt)) = (run.status.as_deref(), run.run_attempt)
        else {
            return;
        };
        self.write_json(&self.run_dir(run.id, attempt).join("job_ids.json"), job_ids);
    }

    /// Files of a run attempt's log archive. A partially written archive is
    /// a miss, since `logs.json` is written last.
    pub fn get_run_logs(&self, run_id: u64, attempt: u32) -> Option<Vec<RunLogFile>> {
        let dir = self.run_dir(run_id, attempt);
        let names: Vec<String> = self.read_json(&dir.join("logs.json"))?;

        names
            .into_iter()
            .map(|name| {
                let content = self.read(&dir.join("logs").join(&name))?;
                Some(RunLogFile { name, content })
            })
            .collect()
    }

    pub fn save_run_logs(&self, run: &GitHubWorkflowRun, files: &[RunLogFile]) {
        let (Some(STATUS_COMPLETED), Some(attempt)) = (run.status.as_deref(), run.run_attempt)
        else {
            return;
        };

        let dir = self.run_dir(run.id, attempt);
        for file in files {
            self.write(&dir.join("logs").join(&file.name), file.content.as_bytes());
        }
        let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
        self.write_json(&dir.join("logs.json"), &names);
    }

    fn read(&self, path: &Path) -> Option<String> {
        if !self.enabled {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => {
                debug!("Cache hit: {}", path.display());
                Some(content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read cache entry {}: {e}", path.display());
                None
            }
        }
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let content = self.read(path)?;
        serde_json::from_str(&content)
            .inspect_err(|e| warn!("Ignoring corrupt cache entry {}: {e}", path.display()))
            .ok()
    }

    fn write(&self, path: &Path, content: &[u8]) {
        if !self.enabled {
            return;
        }

        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(path, content));

        match result {
            Ok(()) => debug!("Cached: {}", path.display()),
            Err(e) => warn!("Failed to write cache entry {}: {e}", path.display()),
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) {
        match serde_json::to_vec(value) {
            Ok(content) => self.write(path, &content),
            Err(e) => warn!("Failed to serialize cache entry {}: {e}", path.display()),
        }
    }

    /// Clears cached data for a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be removed.
    pub fn clear_repository_cache(repository: &str) -> Result<()> {
        let dir = repository_dir(repository)?;

        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            info!("Cache cleared: {}", dir.display());
        } else {
            info!("No cache found for repository: {repository}");
        }

        Ok(())
    }
}

fn repository_dir(repository: &str) -> Result<PathBuf> {
    let (owner, repo) = super::split_repository(repository)?;

    Ok(dirs::cache_dir()
        .ok_or_else(|| GhaperfError::Cache("No cache directory found".into()))?
        .join("ghaperf")
        .join("github")
        .join(owner)
        .join(repo))
}
