use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::config::{Config, OutputFormat};
use crate::insights::{LogGroupsReport, PerfInsights, Report, ReportHeader};
use crate::output::export_insights;
use crate::providers::github::{log_parser, JobCache, WorkflowRunFilter};
use crate::providers::GitHubProvider;

#[derive(Parser)]
#[command(name = "ghaperf")]
#[command(author, version, about = "GitHub Actions Performance Analyzer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Jobs, steps and log groups at least this long are reported as slow
    #[arg(
        long,
        global = true,
        env = "GHAPERF_THRESHOLD",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    threshold: Duration,

    /// Config file (defaults to ghaperf.yaml, .yml, .toml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format, overriding the config file
    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// Do not read or write the local cache
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    #[arg(long, global = true, env = "GHAPERF_LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,

    /// GitHub access token (falls back to GITHUB_TOKEN)
    #[arg(long, global = true, env = "GHAPERF_GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(
        long,
        global = true,
        env = "GITHUB_API_URL",
        default_value = "https://api.github.com"
    )]
    api_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a local job log and list its slow groups
    LogFile { path: PathBuf },

    /// Analyze one job
    Job {
        #[command(flatten)]
        repo: RepoArgs,

        #[arg(long)]
        job_id: u64,
    },

    /// Analyze the jobs of one workflow run
    Run {
        #[command(flatten)]
        repo: RepoArgs,

        #[arg(long)]
        run_id: u64,

        /// Run attempt (defaults to the latest)
        #[arg(long)]
        attempt: Option<u32>,
    },

    /// Aggregate the most recent runs of a workflow
    Workflow {
        #[command(flatten)]
        repo: RepoArgs,

        /// Workflow file name (e.g. ci.yaml) or id
        #[arg(short, long)]
        workflow: String,

        /// Number of runs to analyze
        #[arg(short = 'n', long, default_value_t = 100)]
        count: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write a template config file
    Init { path: Option<PathBuf> },

    /// Manage the local cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove everything cached for a repository
    Clear {
        #[command(flatten)]
        repo: RepoArgs,
    },
}

#[derive(Args)]
struct RepoArgs {
    /// Repository in owner/repo format
    #[arg(short = 'R', long, env = "GITHUB_REPOSITORY")]
    repo: String,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    actor: Option<String>,

    #[arg(long)]
    branch: Option<String>,

    #[arg(long)]
    event: Option<String>,

    /// Creation date range, e.g. ">=2025-01-01"
    #[arg(long)]
    created: Option<String>,

    #[arg(long)]
    status: Option<String>,
}

impl From<&FilterArgs> for WorkflowRunFilter {
    fn from(args: &FilterArgs) -> Self {
        Self {
            actor: args.actor.clone(),
            branch: args.branch.clone(),
            event: args.event.clone(),
            created: args.created.clone(),
            status: args.status.clone(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

impl Cli {
    /// Log level requested on the command line, if any.
    pub fn log_level(&self) -> Option<LevelFilter> {
        self.log_level.map(LevelFilter::from)
    }

    fn token(&self) -> Option<Token> {
        self.token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
            .map(|token| Token::from(token.as_str()))
    }

    fn provider(&self, repository: &str) -> Result<GitHubProvider> {
        let cache = JobCache::new(repository, !self.no_cache)?;
        Ok(GitHubProvider::new(
            &self.api_url,
            repository,
            self.token(),
            cache,
        )?)
    }

    fn header(&self, config: &Config, repository: Option<&str>) -> ReportHeader {
        let mut header = ReportHeader::new(self.threshold);
        header.repository = repository.map(str::to_string);
        header.job_names.clone_from(&config.job_names);
        header.excluded_job_names.clone_from(&config.excluded_job_names);
        header.job_name_mappings.clone_from(&config.job_name_mappings);
        header
    }

    fn execute_log_file(&self, path: &Path) -> Result<Report> {
        info!("Parsing log file: {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        let parsed = log_parser::parse(BufReader::new(file))
            .with_context(|| format!("Failed to read log file: {}", path.display()))?;

        Ok(Report::LogGroups(LogGroupsReport::new(
            &parsed,
            self.threshold,
        )))
    }

    fn emit(&self, config: &Config, insights: &PerfInsights) -> Result<()> {
        let format = self.format.unwrap_or(config.output.format);
        let pretty = self.pretty || config.output.pretty;

        if let Some(output_path) = &self.output {
            console::set_colors_enabled(false);
            let file = File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            let mut writer = BufWriter::new(file);
            export_insights(insights, format, pretty, &mut writer)?;
            info!("Report written to: {}", output_path.display());
        } else {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            export_insights(insights, format, pretty, &mut writer)?;
            writer.flush()?;
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let (config, header, report) = match &self.command {
            Commands::Init { path } => {
                let path = Config::write_template(path.as_deref())?;
                eprintln!("Wrote {}", path.display());
                return Ok(());
            }
            Commands::Cache {
                command: CacheCommands::Clear { repo },
            } => {
                JobCache::clear_repository_cache(&repo.repo)?;
                return Ok(());
            }
            Commands::LogFile { path } => {
                let config = Config::load(self.config.as_deref())?;
                let header = self.header(&config, None);
                (config, header, self.execute_log_file(path)?)
            }
            Commands::Job { repo, job_id } => {
                let config = Config::load(self.config.as_deref())?;
                let header = self.header(&config, Some(&repo.repo));
                let report = self
                    .provider(&repo.repo)?
                    .job_report(*job_id, self.threshold)
                    .await?;
                (config, header, report)
            }
            Commands::Run {
                repo,
                run_id,
                attempt,
            } => {
                let config = Config::load(self.config.as_deref())?;
                let header = self.header(&config, Some(&repo.repo));
                let report = self
                    .provider(&repo.repo)?
                    .run_report(*run_id, *attempt, &config, self.threshold)
                    .await?;
                (config, header, report)
            }
            Commands::Workflow {
                repo,
                workflow,
                count,
                filter,
            } => {
                let config = Config::load(self.config.as_deref())?;
                let filter = WorkflowRunFilter::from(filter);
                let mut header = self.header(&config, Some(&repo.repo));
                header.workflow = Some(workflow.clone());
                header.filter = Some(filter.clone());
                let report = self
                    .provider(&repo.repo)?
                    .workflow_report(workflow, *count, &filter, &config, self.threshold)
                    .await?;
                (config, header, report)
            }
        };

        self.emit(&config, &PerfInsights { header, report })
    }
}
