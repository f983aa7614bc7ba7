//! Configuration for indexing and validation

use serde::{Deserialize, Serialize};

/// Default file name of the cached master index
pub const DEFAULT_MASTER_INDEX_NAME: &str = "_index.json";

/// Default file name of the cached current index
pub const DEFAULT_CURRENT_INDEX_NAME: &str = "index.json";

/// Default number of benchmark passes
pub const DEFAULT_BENCHMARK_RUNS: usize = 10;

/// Default progress reporting interval in milliseconds
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Configuration for a single file index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of fingerprinting threads
    /// 0 means rayon's default (one per logical CPU)
    pub num_threads: usize,

    /// Whether to follow symbolic links while walking
    pub follow_links: bool,

    /// Whether to emit JSON progress lines on stderr
    pub show_progress: bool,

    /// Minimum interval between progress lines
    pub progress_interval_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            follow_links: false,
            show_progress: false,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl IndexConfig {
    /// Create a config builder
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::new()
    }

    /// Build the rayon pool used for per-file work
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("fingerprint-{}", i))
            .build()
    }
}

/// Builder for IndexConfig
#[derive(Debug, Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of threads
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    /// Enable or disable following symbolic links
    pub fn follow_links(mut self, enabled: bool) -> Self {
        self.config.follow_links = enabled;
        self
    }

    /// Enable or disable progress output
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.config.show_progress = enabled;
        self
    }

    /// Set the progress interval
    pub fn progress_interval_ms(mut self, interval: u64) -> Self {
        self.config.progress_interval_ms = interval;
        self
    }

    /// Build the config
    pub fn build(self) -> IndexConfig {
        self.config
    }
}

/// Configuration for a master/current validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Settings shared by both indexes
    pub index: IndexConfig,

    /// Cache file name for the master index, placed beside the master tree
    pub master_index_name: String,

    /// Cache file name for the current index, placed beside the current tree
    pub current_index_name: String,

    /// Whether to read and write cached indexes
    pub use_cache: bool,

    /// Whether to overwrite mismatching current files with master copies
    pub repair: bool,

    /// Number of passes in benchmark mode
    pub benchmark_runs: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            master_index_name: DEFAULT_MASTER_INDEX_NAME.to_string(),
            current_index_name: DEFAULT_CURRENT_INDEX_NAME.to_string(),
            use_cache: true,
            repair: false,
            benchmark_runs: DEFAULT_BENCHMARK_RUNS,
        }
    }
}

impl ValidatorConfig {
    /// Create a config builder
    pub fn builder() -> ValidatorConfigBuilder {
        ValidatorConfigBuilder::new()
    }
}

/// Builder for ValidatorConfig
#[derive(Debug, Default)]
pub struct ValidatorConfigBuilder {
    config: ValidatorConfig,
}

impl ValidatorConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the index settings
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.config.index = index;
        self
    }

    /// Set the master cache file name
    pub fn master_index_name(mut self, name: impl Into<String>) -> Self {
        self.config.master_index_name = name.into();
        self
    }

    /// Set the current cache file name
    pub fn current_index_name(mut self, name: impl Into<String>) -> Self {
        self.config.current_index_name = name.into();
        self
    }

    /// Enable or disable the index cache
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.config.use_cache = enabled;
        self
    }

    /// Enable or disable repair
    pub fn repair(mut self, enabled: bool) -> Self {
        self.config.repair = enabled;
        self
    }

    /// Set the number of benchmark passes
    pub fn benchmark_runs(mut self, runs: usize) -> Self {
        self.config.benchmark_runs = runs;
        self
    }

    /// Build the config
    pub fn build(self) -> ValidatorConfig {
        self.config
    }
}
