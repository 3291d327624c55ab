// ABOUTME: Job configuration - TOML file describing one incremental extraction job
// ABOUTME: Validates the single-worker rule and builds the rewriter and watermark store

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::daemon::DaemonConfig;
use crate::query::{Constraint, QueryRewriter};
use crate::watermark::{
    DocumentBackend, FsDocumentBackend, Permission, StateLocation, WatermarkStore,
};

/// Top-level job configuration.
///
/// ```toml
/// [job]
/// name = "authors"
///
/// [query]
/// dsl = "op.fromView('demo', 'authors')"
/// constraint_column = "ID"
/// row_limit = 1000
///
/// [engine]
/// url = "http://localhost:8000"
///
/// [state]
/// uri = "/highwater/authors.json"
/// permissions = "rest-reader,read,rest-writer,update"
/// collections = ["highwater"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub job: JobSection,
    pub query: QuerySection,
    pub engine: EngineSection,
    /// Durable watermark location; absent means the watermark lives in memory
    #[serde(default)]
    pub state: Option<StateSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSection {
    #[serde(default = "default_job_name")]
    pub name: String,
    /// Number of workers; anything other than 1 is rejected
    #[serde(default = "default_tasks")]
    pub tasks: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            tasks: default_tasks(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySection {
    /// Pipeline query text
    #[serde(default)]
    pub dsl: Option<String>,
    /// Serialized plan as a JSON string
    #[serde(default)]
    pub serialized: Option<String>,
    #[serde(default)]
    pub constraint_column: Option<String>,
    #[serde(default)]
    pub row_limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSection {
    pub uri: String,
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub collections: Vec<String>,
    /// Keep the document on the local filesystem instead of the query service
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_job_name() -> String {
    "highwater".to_string()
}

fn default_tasks() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_timeout_secs() -> u64 {
    30
}

impl JobConfig {
    /// Load and validate a job configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job config from {:?}", path))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to load job config from {:?}", path))?;
        Ok(config)
    }

    /// Parse and validate a job configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: JobConfig = toml::from_str(contents).context("Failed to parse job config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the extraction core cannot run with
    pub fn validate(&self) -> Result<()> {
        // Two workers sharing one watermark would deliver duplicates or skip rows
        if self.job.tasks != 1 {
            bail!(
                "job.tasks must be 1 (got {}); a watermark can only be advanced by a single worker",
                self.job.tasks
            );
        }
        if self.job.poll_interval_ms == 0 {
            bail!("job.poll_interval_ms must be greater than 0");
        }

        match (&self.query.dsl, &self.query.serialized) {
            (Some(_), Some(_)) => bail!("Cannot use both query.dsl and query.serialized"),
            (None, None) => bail!("One of query.dsl or query.serialized is required"),
            (Some(dsl), None) if dsl.trim().is_empty() => bail!("query.dsl is empty"),
            (None, Some(serialized)) if serialized.trim().is_empty() => {
                bail!("query.serialized is empty")
            }
            _ => {}
        }

        url::Url::parse(&self.engine.url)
            .with_context(|| format!("engine.url is not a valid URL: {}", self.engine.url))?;
        if self.engine.timeout_secs == 0 {
            bail!("engine.timeout_secs must be greater than 0");
        }

        if let Some(state) = &self.state {
            if state.uri.trim().is_empty() {
                bail!("state.uri must not be empty");
            }
            if let Err(e) = Permission::parse_list(&state.permissions) {
                bail!("state.permissions is invalid: {}", e);
            }
        }

        Ok(())
    }

    /// The watermark constraint, or `None` when no column is configured.
    /// An empty column name counts as not configured.
    pub fn constraint(&self) -> Option<Constraint> {
        let column = self.query.constraint_column.as_deref()?;
        Constraint::new(column, self.query.row_limit)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.job.poll_interval_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.timeout_secs)
    }

    pub fn daemon_config(&self) -> DaemonConfig {
        DaemonConfig {
            poll_interval: self.poll_interval(),
        }
    }

    /// Build the query rewriter for the configured query representation
    pub fn rewriter(&self) -> Result<QueryRewriter> {
        let constraint = self.constraint();
        match (&self.query.dsl, &self.query.serialized) {
            (Some(dsl), _) => Ok(QueryRewriter::textual(dsl.clone(), constraint)),
            (None, Some(serialized)) => {
                let plan: serde_json::Value = serde_json::from_str(serialized)
                    .context("query.serialized is not valid JSON")?;
                Ok(QueryRewriter::structured(plan, constraint)?)
            }
            (None, None) => bail!("One of query.dsl or query.serialized is required"),
        }
    }

    /// Build the watermark store.
    ///
    /// `remote` is used as the document backend when state is configured
    /// without a local directory.
    pub fn watermark_store(&self, remote: Arc<dyn DocumentBackend>) -> WatermarkStore {
        let column = self
            .constraint()
            .map(|c| c.column().to_string())
            .unwrap_or_default();

        let Some(state) = &self.state else {
            return WatermarkStore::in_memory(&column);
        };

        let backend: Arc<dyn DocumentBackend> = match &state.directory {
            Some(directory) => Arc::new(FsDocumentBackend::new(directory)),
            None => remote,
        };
        let location = StateLocation::new(state.uri.clone())
            .with_permissions(state.permissions.clone())
            .with_collections(state.collections.clone());
        WatermarkStore::durable(&column, backend, location)
    }
}
