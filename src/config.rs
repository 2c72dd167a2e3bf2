use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SourcedexError};
use crate::segment::MergePolicyConfig;

/// Index settings configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub analyzer: AnalyzerConfig,
    pub scheduler: SchedulerConfig,
    pub merge: MergePolicyConfig,
    pub similarity: Similarity,
    pub suggester: SuggesterConfig,
    pub query: QueryConfig,
    /// Run the segment invariant checks on every commit
    pub verify_segments_on_commit: bool,
}

impl IndexSettings {
    /// Load settings from a JSON file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let settings: IndexSettings = serde_json::from_slice(&bytes)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.worker_threads == 0 {
            return Err(SourcedexError::Config(
                "scheduler.worker_threads must be at least 1".to_string(),
            ));
        }
        if self.analyzer.min_token_length == 0
            || self.analyzer.min_token_length > self.analyzer.max_token_length
        {
            return Err(SourcedexError::Config(format!(
                "invalid token length bounds {}..={}",
                self.analyzer.min_token_length, self.analyzer.max_token_length
            )));
        }
        if self.query.max_page_size == 0 {
            return Err(SourcedexError::Config(
                "query.max_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_profile(mut self, profile: IndexingProfile) -> Self {
        profile.apply_to(&mut self.scheduler);
        self
    }

    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }
}

/// Analyzer configuration shared by all language analyzers
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub min_token_length: usize,
    pub max_token_length: usize,
    /// Files larger than this are indexed metadata-only
    pub max_file_bytes: u64,
    /// Leading bytes inspected when sniffing binary content
    pub sniff_bytes: usize,
    pub prose: ProseConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 1,
            max_token_length: 128,
            max_file_bytes: 8 * 1024 * 1024,
            sniff_bytes: 8 * 1024,
            prose: ProseConfig::default(),
        }
    }
}

/// Configuration for the prose analyzer used on history messages
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProseConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
}

impl Default for ProseConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: true,
            stem: true,
            min_token_length: 2,
            max_token_length: 50,
        }
    }
}

/// Indexing scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub worker_threads: usize,
    /// Bound on queued file jobs per worker
    pub queue_depth_per_worker: usize,
    pub retry: RetryPolicy,
    /// Seconds between background compaction passes
    pub compaction_interval_secs: u64,
    /// Read per-file history messages from version control
    pub history_enabled: bool,
    pub history_max_commits: usize,
    /// Walk hidden files and directories
    pub include_hidden: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            queue_depth_per_worker: 4,
            retry: RetryPolicy::default(),
            compaction_interval_secs: 60,
            history_enabled: true,
            history_max_commits: 1_000,
            include_hidden: false,
        }
    }
}

impl SchedulerConfig {
    /// Set the number of worker threads
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }

    pub fn queue_capacity(&self) -> usize {
        self.worker_threads.max(1) * self.queue_depth_per_worker.max(1)
    }
}

/// Exponential backoff for transient I/O failures
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given (1-based) retry attempt
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        self.initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

/// Relevance model used to rank hits
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Similarity {
    #[default]
    TfIdf,
    Bm25 {
        k1: f32,
        b: f32,
    },
}

impl Similarity {
    pub fn bm25() -> Self {
        Similarity::Bm25 { k1: 1.2, b: 0.75 }
    }
}

/// Query execution limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Default wall-clock budget per search, in milliseconds
    pub timeout_ms: u64,
    /// Cap on terms a prefix or wildcard leaf may expand to
    pub max_expansions: usize,
    /// Matched lines quoted per returned hit; 0 turns snippets off
    pub snippet_lines: usize,
    /// Longest snippet text, in characters
    pub snippet_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 1_000,
            timeout_ms: 10_000,
            max_expansions: 1_024,
            snippet_lines: 10,
            snippet_chars: 200,
        }
    }
}

/// Autocomplete configuration exposed to the web layer
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggesterConfig {
    pub enabled: bool,
    pub max_results: usize,
    pub min_chars: usize,
    pub allowed_fields: Vec<String>,
    pub allow_complex_queries: bool,
    pub show_scores: bool,
    pub show_projects: bool,
    pub show_time: bool,
    /// Wall-clock budget for one suggestion request, in milliseconds
    pub time_threshold_ms: u64,
    /// Maximum projects a single suggestion request may span
    pub max_projects: usize,
}

impl Default for SuggesterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 10,
            min_chars: 0,
            allowed_fields: ["full", "defs", "refs", "path", "hist", "type"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allow_complex_queries: true,
            show_scores: false,
            show_projects: true,
            show_time: false,
            time_threshold_ms: 2_000,
            max_projects: 50,
        }
    }
}

impl SuggesterConfig {
    pub fn is_field_allowed(&self, field: &str) -> bool {
        self.allowed_fields.iter().any(|f| f == field)
    }
}

/// Projects and groups served by one instance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory holding one index directory per project
    pub data_dir: PathBuf,
    pub projects: Vec<ProjectConfig>,
    pub groups: Vec<GroupConfig>,
    pub settings: IndexSettings,
}

impl CatalogConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config: CatalogConfig = serde_json::from_slice(&bytes)?;
        config.settings.validate()?;
        Ok(config)
    }

    /// Index directory for a project
    pub fn index_dir(&self, project: &str) -> PathBuf {
        self.data_dir.join(project)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub source_root: PathBuf,
    #[serde(default)]
    pub description: Option<String>,
}

/// A named group of projects selected by a regex over project names
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub parent: Option<String>,
}

/// Scheduler presets for different workloads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexingProfile {
    /// Leave cores for concurrent queries
    Interactive,
    Balanced,
    /// Initial bulk index of a large tree
    Bulk,
}

impl IndexingProfile {
    pub fn worker_threads(&self) -> usize {
        let cores = num_cpus::get().max(1);
        match self {
            IndexingProfile::Interactive => (cores / 2).max(1),
            IndexingProfile::Balanced => cores,
            IndexingProfile::Bulk => cores * 2,
        }
    }

    pub fn queue_depth_per_worker(&self) -> usize {
        match self {
            IndexingProfile::Interactive => 2,
            IndexingProfile::Balanced => 4,
            IndexingProfile::Bulk => 16,
        }
    }

    /// Apply this profile to a scheduler configuration
    pub fn apply_to(&self, config: &mut SchedulerConfig) {
        config.worker_threads = self.worker_threads();
        config.queue_depth_per_worker = self.queue_depth_per_worker();
    }
}

impl std::str::FromStr for IndexingProfile {
    type Err = SourcedexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "interactive" => Ok(IndexingProfile::Interactive),
            "balanced" => Ok(IndexingProfile::Balanced),
            "bulk" => Ok(IndexingProfile::Bulk),
            other => Err(SourcedexError::Config(format!(
                "unknown indexing profile '{}'",
                other
            ))),
        }
    }
}
