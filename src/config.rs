use std::env;
use std::path::PathBuf;

/// Operating mode for the search server.
/// Controls pool_size, permits, and intra_threads settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// One embedding session using every thread; lowest single-query latency.
    /// pool_size=1, permits=1, intra_threads=8
    Single,
    /// Several small sessions for many simultaneous queries.
    /// pool_size=8, permits=8, intra_threads=1
    Concurrent,
    /// Use individual environment variable settings.
    Custom,
}

impl OperatingMode {
    pub fn from_env() -> Self {
        Self::parse(&env::var("AIXPLORE_MODE").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "single" | "low-latency" => Self::Single,
            "concurrent" | "high-throughput" | "multi" => Self::Concurrent,
            _ => Self::Custom,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// SQLite catalog holding the `ai_tools` table.
    pub catalog_db_path: PathBuf,
    /// Corpus + embeddings snapshot, restored on startup when present.
    pub snapshot_path: PathBuf,
    /// Sentence-embedding ONNX model.
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub max_sequence_length: usize,
    /// Texts per forward pass when embedding the corpus.
    pub batch_size: usize,
    /// Optional override for embedding session pool size. If None, uses available cores.
    pub pool_size: Option<usize>,
    /// Threads per ONNX session.
    pub intra_threads: usize,
    /// Optional override for concurrent query permits. If None, equals the pool size.
    pub permits: Option<usize>,
    /// Upper bound on a single query embedding, in seconds.
    pub query_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub default_top_k: usize,
    pub popular_limit: usize,
    pub random_count: usize,
    pub category_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            catalog_db_path: PathBuf::from("ai_tools_full.db"),
            snapshot_path: PathBuf::from("search_index.bin"),
            model_path: PathBuf::from("./models/model.onnx"),
            tokenizer_path: PathBuf::from("./models/tokenizer.json"),
            max_sequence_length: 256,
            batch_size: 32,
            pool_size: None,
            intra_threads: 2,
            permits: None,
            query_timeout_secs: 10,
            shutdown_timeout_secs: 30,
            default_top_k: 15,
            popular_limit: 20,
            random_count: 10,
            category_limit: 20,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// The `AIXPLORE_MODE` environment variable controls preset configurations:
    /// - `single` / `low-latency`: one session, all threads (pool=1, permits=1, intra_threads=8)
    /// - `concurrent` / `high-throughput`: many sessions (pool=8, permits=8, intra_threads=1)
    /// - Unset or other: Uses individual env vars or defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let (pool_size, permits, intra_threads) = match OperatingMode::from_env() {
            OperatingMode::Single => (Some(1), Some(1), 8),
            OperatingMode::Concurrent => (Some(8), Some(8), 1),
            OperatingMode::Custom => {
                let pool = env::var("POOL_SIZE").ok().and_then(|s| s.parse().ok());
                let perm = env::var("PERMITS").ok().and_then(|s| s.parse().ok());
                let threads = env::var("INTRA_THREADS")
                    .unwrap_or_else(|_| defaults.intra_threads.to_string())
                    .parse()?;
                (pool, perm, threads)
            }
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()?,
            catalog_db_path: env::var("CATALOG_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_db_path),
            snapshot_path: env::var("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            model_path: env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            tokenizer_path: env::var("TOKENIZER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.tokenizer_path),
            max_sequence_length: env::var("MAX_SEQ_LENGTH")
                .unwrap_or_else(|_| defaults.max_sequence_length.to_string())
                .parse()?,
            batch_size: env::var("BATCH_SIZE")
                .unwrap_or_else(|_| defaults.batch_size.to_string())
                .parse()?,
            pool_size,
            intra_threads,
            permits,
            query_timeout_secs: env::var("QUERY_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.query_timeout_secs.to_string())
                .parse()?,
            shutdown_timeout_secs: env::var("SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| defaults.shutdown_timeout_secs.to_string())
                .parse()?,
            default_top_k: env::var("DEFAULT_TOP_K")
                .unwrap_or_else(|_| defaults.default_top_k.to_string())
                .parse()?,
            popular_limit: env::var("POPULAR_LIMIT")
                .unwrap_or_else(|_| defaults.popular_limit.to_string())
                .parse()?,
            random_count: env::var("RANDOM_COUNT")
                .unwrap_or_else(|_| defaults.random_count.to_string())
                .parse()?,
            category_limit: env::var("CATEGORY_LIMIT")
                .unwrap_or_else(|_| defaults.category_limit.to_string())
                .parse()?,
        })
    }

    /// Session pool size, falling back to the number of available cores.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Concurrent query permits; never more than the session pool can serve.
    pub fn effective_permits(&self) -> usize {
        let pool = self.effective_pool_size();
        self.permits.unwrap_or(pool).clamp(1, pool.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_aliases() {
        assert_eq!(OperatingMode::parse("single"), OperatingMode::Single);
        assert_eq!(OperatingMode::parse("High-Throughput"), OperatingMode::Concurrent);
        assert_eq!(OperatingMode::parse(""), OperatingMode::Custom);
    }

    #[test]
    fn test_permits_capped_by_pool() {
        let config = Config {
            pool_size: Some(2),
            permits: Some(16),
            ..Config::default()
        };
        assert_eq!(config.effective_permits(), 2);

        let config = Config {
            pool_size: Some(4),
            permits: None,
            ..Config::default()
        };
        assert_eq!(config.effective_permits(), 4);
    }
}
