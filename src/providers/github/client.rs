use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use url::Url;
use zip::ZipArchive;

use crate::auth::Token;
use crate::error::{GhaperfError, Result};

use super::types::{
    GitHubJob, GitHubWorkflowRun, RunLogFile, WorkflowJobsResponse, WorkflowRunFilter,
    WorkflowRunsResponse,
};

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY_SECONDS: u64 = 10;
const MAX_CONCURRENT_REQUESTS: usize = 20;
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 10;
const API_VERSION: &str = "2022-11-28";

/// GitHub REST API client for workflow runs, jobs and job logs.
pub struct GitHubClient {
    client: Client,
    repo_url: Url,
    token: Option<Token>,
    semaphore: Arc<Semaphore>,
    retry_delay: Duration,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., "https://api.github.com")
    /// * `owner` - Repository owner/organization
    /// * `repo` - Repository name
    /// * `token` - Optional GitHub access token
    pub fn new(base_url: &str, owner: &str, repo: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ghaperf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GhaperfError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base = Url::parse(base_url)
            .map_err(|e| GhaperfError::Config(format!("Invalid base URL: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let repo_url = base
            .join(&format!("repos/{owner}/{repo}/"))
            .map_err(|e| GhaperfError::Config(format!("Invalid repository URL: {e}")))?;

        Ok(Self {
            client,
            repo_url,
            token,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
        })
    }

    #[cfg(test)]
    pub(super) fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.repo_url
            .join(path)
            .map_err(|e| GhaperfError::Config(format!("Invalid API path '{path}': {e}")))
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);

        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Send a GET request with automatic retry on network errors, rate limits
    /// and server errors. Returns the successful response.
    async fn get(&self, url: Url) -> Result<Response> {
        // Permits are never closed, so a failed acquire just means no limit.
        let _permit = self.semaphore.acquire().await.ok();

        let mut retry_count = 0;
        loop {
            debug!("GET {url}");

            let response = match self.request(url.clone()).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    if retry_count >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {}s ({}/{})...",
                        e,
                        self.retry_delay.as_secs(),
                        retry_count + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(GhaperfError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: MAX_RETRIES,
                    });
                }

                warn!(
                    "GitHub API error (status {status}). Waiting {}s before retry {}/{}...",
                    self.retry_delay.as_secs(),
                    retry_count + 1,
                    MAX_RETRIES
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if status == StatusCode::GONE {
                return Err(GhaperfError::LogGone);
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(GhaperfError::Api {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(response);
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = self.get(url).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn get_job(&self, job_id: u64) -> Result<GitHubJob> {
        self.get_json(self.url(&format!("actions/jobs/{job_id}"))?)
            .await
    }

    /// Downloads the plain-text log of a job.
    ///
    /// # Errors
    ///
    /// Returns [`GhaperfError::LogGone`] when GitHub no longer has the log.
    pub async fn get_job_log(&self, job_id: u64) -> Result<String> {
        let response = self
            .get(self.url(&format!("actions/jobs/{job_id}/logs"))?)
            .await?;
        Ok(response.text().await?)
    }

    /// Downloads the log archive of a run attempt: one file per job.
    ///
    /// # Errors
    ///
    /// Returns [`GhaperfError::LogGone`] when GitHub no longer has the logs.
    pub async fn get_run_logs(&self, run_id: u64, attempt: u32) -> Result<Vec<RunLogFile>> {
        let response = self
            .get(self.url(&format!("actions/runs/{run_id}/attempts/{attempt}/logs"))?)
            .await?;
        let files = read_log_archive(&response.bytes().await?)?;

        debug!("Fetched {} log files for run {run_id}", files.len());
        Ok(files)
    }

    /// Fetches a workflow run, or one specific attempt of it.
    pub async fn get_workflow_run(
        &self,
        run_id: u64,
        attempt: Option<u32>,
    ) -> Result<GitHubWorkflowRun> {
        let path = match attempt {
            Some(attempt) => format!("actions/runs/{run_id}/attempts/{attempt}"),
            None => format!("actions/runs/{run_id}"),
        };
        self.get_json(self.url(&path)?).await
    }

    /// Lists the jobs of a run attempt, following pagination.
    pub async fn list_jobs(&self, run_id: u64, attempt: Option<u32>) -> Result<Vec<GitHubJob>> {
        let path = match attempt {
            Some(attempt) => format!("actions/runs/{run_id}/attempts/{attempt}/jobs"),
            None => format!("actions/runs/{run_id}/jobs"),
        };

        let mut jobs = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut url = self.url(&path)?;
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let response: WorkflowJobsResponse = self.get_json(url).await?;
            let page_len = response.jobs.len();
            jobs.extend(response.jobs);

            if page_len < PER_PAGE {
                break;
            }
        }

        debug!("Fetched {} jobs for run {run_id}", jobs.len());
        Ok(jobs)
    }

    /// Lists the most recent runs of a workflow, newest first.
    ///
    /// # Arguments
    ///
    /// * `workflow` - Workflow file name (e.g. `ci.yaml`) or numeric id
    /// * `count` - Maximum number of runs to return
    /// * `filter` - Query filters forwarded to the API
    pub async fn list_workflow_runs(
        &self,
        workflow: &str,
        count: usize,
        filter: &WorkflowRunFilter,
    ) -> Result<Vec<GitHubWorkflowRun>> {
        let per_page = PER_PAGE.min(count.max(1));
        let path = format!("actions/workflows/{workflow}/runs");

        let mut runs = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut url = self.url(&path)?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("per_page", &per_page.to_string())
                    .append_pair("page", &page.to_string());
                for (key, value) in filter.query_pairs() {
                    query.append_pair(key, value);
                }
            }

            let response: WorkflowRunsResponse = self.get_json(url).await?;
            let page_len = response.workflow_runs.len();
            runs.extend(response.workflow_runs);

            if page_len < per_page || runs.len() >= count {
                break;
            }
        }

        runs.truncate(count);
        debug!("Fetched {} runs of workflow {workflow}", runs.len());
        Ok(runs)
    }
}

/// Reads the top-level files of a log archive. Directories hold per-step
/// copies of the same lines and are skipped.
fn read_log_archive(bytes: &[u8]) -> Result<Vec<RunLogFile>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut files = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let top_level = entry
            .enclosed_name()
            .is_some_and(|path| path.components().count() == 1);
        if entry.is_dir() || !top_level {
            continue;
        }

        let name = entry.name().to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        files.push(RunLogFile {
            name,
            content: String::from_utf8_lossy(&content).into_owned(),
        });
    }

    Ok(files)
}

/// Builds an uncompressed log archive from `(name, content)` pairs. Names
/// ending in `/` become directories.
#[cfg(test)]
pub(super) fn log_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    let options = || SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        if let Some(dir) = name.strip_suffix('/') {
            writer.add_directory(dir, options()).unwrap();
        } else {
            writer.start_file(*name, options()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &Server) -> GitHubClient {
        GitHubClient::new(&server.url(), "octo", "repo", Some(Token::from("secret")))
            .unwrap()
            .with_retry_delay(Duration::ZERO)
    }

    fn job_json(id: u64) -> serde_json::Value {
        json!({
            "id": id,
            "run_id": 1,
            "name": format!("job {id}"),
            "status": "completed",
            "conclusion": "success",
            "started_at": "2025-01-01T00:00:00Z",
            "completed_at": "2025-01-01T00:01:00Z",
            "html_url": format!("https://github.com/octo/repo/actions/runs/1/job/{id}"),
            "steps": [{
                "name": "Set up job",
                "status": "completed",
                "conclusion": "success",
                "number": 1,
                "started_at": "2025-01-01T00:00:00Z",
                "completed_at": "2025-01-01T00:00:02Z"
            }]
        })
    }

    #[tokio::test]
    async fn test_get_job() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/octo/repo/actions/jobs/42")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(job_json(42).to_string())
            .create_async()
            .await;

        let job = client(&server).get_job(42).await.unwrap();

        mock.assert_async().await;
        assert_eq!(job.name, "job 42");
        assert_eq!(job.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_get_job_log() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/octo/repo/actions/jobs/42/logs")
            .with_status(200)
            .with_body("2025-01-01T00:00:00.0000000Z hello\n")
            .create_async()
            .await;

        let log = client(&server).get_job_log(42).await.unwrap();
        assert_eq!(log, "2025-01-01T00:00:00.0000000Z hello\n");
    }

    #[tokio::test]
    async fn test_expired_log_is_gone() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/octo/repo/actions/jobs/42/logs")
            .with_status(410)
            .create_async()
            .await;

        let result = client(&server).get_job_log(42).await;
        assert!(matches!(result, Err(GhaperfError::LogGone)));
    }

    #[tokio::test]
    async fn test_not_found_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/octo/repo/actions/jobs/1")
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        match client(&server).get_job(1).await {
            Err(GhaperfError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/octo/repo/actions/jobs/1")
            .with_status(502)
            .expect(MAX_RETRIES as usize + 1)
            .create_async()
            .await;

        let result = client(&server).get_job(1).await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(GhaperfError::ApiErrorAfterRetries {
                status: 502,
                retries: MAX_RETRIES
            })
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_follows_pages() {
        let mut server = Server::new_async().await;
        let first: Vec<_> = (1..=PER_PAGE as u64).map(job_json).collect();
        let second = vec![job_json(1000)];

        server
            .mock("GET", "/repos/octo/repo/actions/runs/7/attempts/2/jobs")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(json!({ "total_count": 101, "jobs": first }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/octo/repo/actions/runs/7/attempts/2/jobs")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(json!({ "total_count": 101, "jobs": second }).to_string())
            .create_async()
            .await;

        let jobs = client(&server).list_jobs(7, Some(2)).await.unwrap();

        assert_eq!(jobs.len(), PER_PAGE + 1);
        assert_eq!(jobs.last().map(|j| j.id), Some(1000));
    }

    #[tokio::test]
    async fn test_list_workflow_runs_applies_filters_and_count() {
        let mut server = Server::new_async().await;
        let runs: Vec<_> = (1..=5)
            .map(|id| json!({ "id": id, "status": "completed", "run_attempt": 1 }))
            .collect();

        let mock = server
            .mock("GET", "/repos/octo/repo/actions/workflows/ci.yaml/runs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "3".into()),
                Matcher::UrlEncoded("branch".into(), "main".into()),
                Matcher::UrlEncoded("status".into(), "success".into()),
            ]))
            .with_status(200)
            .with_body(json!({ "total_count": 5, "workflow_runs": runs }).to_string())
            .create_async()
            .await;

        let filter = WorkflowRunFilter {
            branch: Some("main".to_string()),
            status: Some("success".to_string()),
            ..Default::default()
        };
        let runs = client(&server)
            .list_workflow_runs("ci.yaml", 3, &filter)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(runs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_get_run_logs_reads_top_level_files() {
        let mut server = Server::new_async().await;
        let archive = log_archive(&[
            ("0_build.txt", "2025-01-01T00:00:00.0000000Z build\n"),
            ("build/", ""),
            ("build/1_Set up job.txt", "2025-01-01T00:00:00.0000000Z step\n"),
            ("1_lint.txt", "2025-01-01T00:00:00.0000000Z lint\n"),
        ]);
        server
            .mock("GET", "/repos/octo/repo/actions/runs/7/attempts/2/logs")
            .with_status(200)
            .with_header("content-type", "application/zip")
            .with_body(archive)
            .create_async()
            .await;

        let files = client(&server).get_run_logs(7, 2).await.unwrap();

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["0_build.txt", "1_lint.txt"]);
        assert_eq!(files[1].content, "2025-01-01T00:00:00.0000000Z lint\n");
    }

    #[tokio::test]
    async fn test_expired_run_logs_are_gone() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/octo/repo/actions/runs/7/attempts/1/logs")
            .with_status(410)
            .create_async()
            .await;

        let result = client(&server).get_run_logs(7, 1).await;
        assert!(matches!(result, Err(GhaperfError::LogGone)));
    }

    #[test]
    fn test_invalid_archive_is_an_error() {
        let result = read_log_archive(b"not a zip file");
        assert!(matches!(result, Err(GhaperfError::Archive(_))));
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let client = GitHubClient::new("https://ghe.example.com/api/v3", "o", "r", None).unwrap();
        assert_eq!(
            client.url("actions/jobs/1").unwrap().as_str(),
            "https://ghe.example.com/api/v3/repos/o/r/actions/jobs/1"
        );
    }
}
