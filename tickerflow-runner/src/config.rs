//! Pipeline configuration.
//!
//! Built once at startup from an optional TOML file, then overridden by
//! environment variables (a `.env` file in the working directory is
//! honoured). Every section has defaults, so an empty or missing file is a
//! valid configuration.
//!
//! ```toml
//! [paths]
//! root = "/srv/tickerflow"
//! tickers_file = "/srv/tickerflow/output/Static Data/Tickers.csv"
//!
//! [provider]
//! timeout_secs = 30
//!
//! [batching.pricing]
//! batch_size = 5
//! pause_ms = 2000
//!
//! [merge]
//! reporting_currency = "USD"
//!
//! [store]
//! backend = "postgres"
//!
//! [store.postgres]
//! host = "db.internal"
//! port = 5432
//! user = "etl"
//! dbname = "equities"
//! ```
//!
//! The PostgreSQL connection also reads `DB_HOST`, `DB_PORT`, `DB_NAME`,
//! `DB_USER` and `DB_PASSWORD`. Without an explicit backend, setting
//! `DB_HOST` selects PostgreSQL; otherwise the SQLite file under the root is
//! used.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use tickerflow_core::fetch::BatchPlan;
use tickerflow_core::provider::yahoo::DEFAULT_USER_AGENT;
use tickerflow_core::{Domain, Layout};

pub const ENV_ROOT: &str = "TICKERFLOW_ROOT";
pub const ENV_TICKERS: &str = "TICKERFLOW_TICKERS";
pub const ENV_DB_PATH: &str = "TICKERFLOW_DB_PATH";
pub const ENV_STORE: &str = "TICKERFLOW_STORE";
pub const ENV_DB_HOST: &str = "DB_HOST";
pub const ENV_DB_PORT: &str = "DB_PORT";
pub const ENV_DB_NAME: &str = "DB_NAME";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";

/// Database file name used when `[store] database_path` is not set.
pub const DEFAULT_DB_FILE: &str = "tickerflow.sqlite";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub provider: ProviderConfig,
    pub batching: BatchingConfig,
    pub merge: MergeConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the working tree (`output/`, `Archive/`).
    pub root: PathBuf,
    /// Ticker list; defaults to `output/Static Data/Tickers.csv`.
    pub tickers_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            tickers_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub pause_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pause_ms: 2000,
        }
    }
}

impl BatchConfig {
    pub fn plan(&self) -> BatchPlan {
        BatchPlan::new(self.batch_size, Duration::from_millis(self.pause_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub pricing: BatchConfig,
    pub financial_statements: BatchConfig,
    pub fundamentals: BatchConfig,
}

impl BatchingConfig {
    pub fn for_domain(&self, domain: Domain) -> &BatchConfig {
        match domain {
            Domain::Pricing => &self.pricing,
            Domain::FinancialStatements => &self.financial_statements,
            Domain::Fundamentals => &self.fundamentals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub reporting_currency: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            reporting_currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Postgres,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(StoreBackend::Sqlite),
            "postgres" | "postgresql" => Some(StoreBackend::Postgres),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Unset means SQLite.
    pub backend: Option<StoreBackend>,
    /// SQLite file; defaults to `{root}/tickerflow.sqlite`.
    pub database_path: Option<PathBuf>,
    pub postgres: PostgresConfig,
}

impl StoreConfig {
    pub fn backend(&self) -> StoreBackend {
        self.backend.unwrap_or(StoreBackend::Sqlite)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Empty means no password is sent.
    pub password: String,
    pub dbname: String,
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "tickerflow".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("dbname", &self.dbname)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// File (if any), then `.env`, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `TICKERFLOW_*` and `DB_*` overrides. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(root) = get(ENV_ROOT) {
            self.paths.root = PathBuf::from(root);
        }
        if let Some(tickers) = get(ENV_TICKERS) {
            self.paths.tickers_file = Some(PathBuf::from(tickers));
        }
        if let Some(db) = get(ENV_DB_PATH) {
            self.store.database_path = Some(PathBuf::from(db));
        }
        if let Some(raw) = get(ENV_STORE) {
            match StoreBackend::parse(&raw) {
                Some(backend) => self.store.backend = Some(backend),
                None => warn!(value = %raw, "unknown {ENV_STORE}, ignored"),
            }
        }

        let pg = &mut self.store.postgres;
        if let Some(host) = get(ENV_DB_HOST) {
            pg.host = host;
            self.store.backend.get_or_insert(StoreBackend::Postgres);
        }
        if let Some(raw) = get(ENV_DB_PORT) {
            match raw.trim().parse() {
                Ok(port) => pg.port = port,
                Err(_) => warn!(value = %raw, "invalid {ENV_DB_PORT}, ignored"),
            }
        }
        if let Some(name) = get(ENV_DB_NAME) {
            pg.dbname = name;
        }
        if let Some(user) = get(ENV_DB_USER) {
            pg.user = user;
        }
        if let Some(password) = lookup(ENV_DB_PASSWORD) {
            pg.password = password;
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.paths.root)
    }

    pub fn tickers_path(&self) -> PathBuf {
        self.paths
            .tickers_file
            .clone()
            .unwrap_or_else(|| self.layout().default_tickers_file())
    }

    pub fn db_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| self.paths.root.join(DEFAULT_DB_FILE))
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg = PipelineConfig::from_toml("", Path::new("x.toml")).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.batching.pricing.plan(), BatchPlan::standard());
        assert_eq!(cfg.tickers_path(), Path::new(".").join("output").join("Static Data").join("Tickers.csv"));
        assert_eq!(cfg.db_path(), Path::new(".").join(DEFAULT_DB_FILE));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = PipelineConfig::from_toml(
            "[paths]\nroot = \"/data\"\n\n[batching.fundamentals]\nbatch_size = 20\n",
            Path::new("x.toml"),
        )
        .unwrap();
        assert_eq!(cfg.paths.root, PathBuf::from("/data"));
        assert_eq!(cfg.batching.fundamentals.batch_size, 20);
        assert_eq!(cfg.batching.fundamentals.pause_ms, 2000);
        assert_eq!(cfg.batching.for_domain(Domain::Pricing).batch_size, 5);
        assert_eq!(cfg.merge.reporting_currency, "USD");
        assert_eq!(cfg.db_path(), PathBuf::from("/data").join(DEFAULT_DB_FILE));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let err = PipelineConfig::from_toml("[paths\nroot=", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn missing_file_is_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::from_file(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = PipelineConfig::from_toml(
            "[store]\ndatabase_path = \"file.sqlite\"\n",
            Path::new("x.toml"),
        )
        .unwrap();
        let env: HashMap<&str, &str> = [(ENV_ROOT, "/env-root"), (ENV_DB_PATH, "/env.sqlite"), (ENV_TICKERS, "  ")]
            .into_iter()
            .collect();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.paths.root, PathBuf::from("/env-root"));
        assert_eq!(cfg.db_path(), PathBuf::from("/env.sqlite"));
        assert_eq!(cfg.paths.tickers_file, None);
        assert_eq!(cfg.store.backend(), StoreBackend::Sqlite);
    }

    #[test]
    fn postgres_section_parses() {
        let cfg = PipelineConfig::from_toml(
            "[store]\nbackend = \"postgres\"\n\n[store.postgres]\nhost = \"db\"\ndbname = \"equities\"\n",
            Path::new("x.toml"),
        )
        .unwrap();
        assert_eq!(cfg.store.backend(), StoreBackend::Postgres);
        assert_eq!(cfg.store.postgres.host, "db");
        assert_eq!(cfg.store.postgres.dbname, "equities");
        assert_eq!(cfg.store.postgres.port, 5432);
        assert_eq!(cfg.store.postgres.user, "postgres");
    }

    #[test]
    fn db_env_selects_and_configures_postgres() {
        let mut cfg = PipelineConfig::default();
        let env: HashMap<&str, &str> = [
            (ENV_DB_HOST, "pg.local"),
            (ENV_DB_PORT, "6543"),
            (ENV_DB_NAME, "prices"),
            (ENV_DB_USER, "etl"),
            (ENV_DB_PASSWORD, "s3cret"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.store.backend(), StoreBackend::Postgres);
        let pg = &cfg.store.postgres;
        assert_eq!((pg.host.as_str(), pg.port), ("pg.local", 6543));
        assert_eq!((pg.dbname.as_str(), pg.user.as_str(), pg.password.as_str()), ("prices", "etl", "s3cret"));
        assert!(!format!("{pg:?}").contains("s3cret"));
    }

    #[test]
    fn explicit_backend_wins_over_db_host() {
        let mut cfg = PipelineConfig::default();
        let env: HashMap<&str, &str> = [(ENV_STORE, "sqlite"), (ENV_DB_HOST, "pg.local"), (ENV_DB_PORT, "nope")]
            .into_iter()
            .collect();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.store.backend(), StoreBackend::Sqlite);
        assert_eq!(cfg.store.postgres.host, "pg.local");
        assert_eq!(cfg.store.postgres.port, 5432);
    }
}
