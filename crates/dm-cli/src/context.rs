//! Runtime context for CLI commands

use anyhow::{Context, Result};
use dm_core::config::RelationalBackend;
use dm_core::{identity, Config};
use dm_db::{Database, DocumentStore, DuckDbBackend, MongoBackend, PostgresBackend};
use dm_engine::{DocumentEngine, ExecutionTracker, RelationalEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved configuration plus the store connections for one invocation.
///
/// Connections are opened by [`RuntimeContext::connect`] and released by
/// [`RuntimeContext::close`].
pub(crate) struct RuntimeContext {
    pub project_dir: PathBuf,
    pub config: Config,
    pub environment: String,
    pub db: Arc<dyn Database>,
    pub store: Option<Arc<dyn DocumentStore>>,
    pub tracker: Option<ExecutionTracker>,
}

impl RuntimeContext {
    /// Connect to every configured store.
    ///
    /// The document store is only contacted when `document.enabled`; the
    /// tracker exists only when `control.enabled`.
    pub async fn connect(project_dir: &Path, config: Config, environment: String) -> Result<Self> {
        let db = connect_relational(project_dir, &config).await?;

        let store: Option<Arc<dyn DocumentStore>> = if config.document.enabled {
            let mongo = MongoBackend::connect(&config.document.url, &config.document.database)
                .await
                .context("Failed to connect to MongoDB")?;
            mongo.ping().await.context("MongoDB is not reachable")?;
            log::info!(
                "Connected to MongoDB database '{}'",
                config.document.database
            );
            Some(Arc::new(mongo))
        } else {
            log::info!("Document engine disabled");
            None
        };

        let tracker = config
            .control
            .enabled
            .then(|| ExecutionTracker::new(db.clone(), config.control.table_name.clone()));

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            config,
            environment,
            db,
            store,
            tracker,
        })
    }

    /// Schema to scope table listings to; DuckDB always uses its current schema.
    pub fn schema(&self) -> Option<&str> {
        match self.config.relational.backend {
            RelationalBackend::Postgres => Some(self.config.relational.schema.as_str()),
            RelationalBackend::DuckDb => None,
        }
    }

    pub fn installed_by(&self) -> String {
        identity::installed_by(self.config.relational.username.as_deref())
    }

    pub fn relational_engine(&self) -> RelationalEngine {
        let rel = &self.config.relational;
        RelationalEngine::for_database(
            self.db.clone(),
            self.config.sql_migrations_dir(&self.project_dir),
            &rel.history_table,
            rel.transactional,
            self.installed_by(),
        )
    }

    pub fn document_engine(&self) -> Option<DocumentEngine> {
        self.store.as_ref().map(|store| {
            DocumentEngine::for_store(
                store.clone(),
                self.config.document_migrations_dir(&self.project_dir),
                &self.config.document.history_collection,
                self.installed_by(),
            )
        })
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.config.reports_dir(&self.project_dir)
    }

    /// Roll back a transaction left open by an abandoned command, so later
    /// bookkeeping is not written into it.
    pub async fn rollback_open_transaction(&self) {
        if let Err(e) = self.db.execute_batch("ROLLBACK").await {
            log::debug!("No open transaction to roll back: {}", e);
        }
    }

    /// Release connections. Close failures are logged, not returned.
    pub async fn close(&self) {
        if let Err(e) = self.db.close().await {
            log::warn!("Error closing {} connection: {}", self.db.db_type(), e);
        }
    }
}

/// Resolve a DuckDB path against the project directory.
pub(crate) fn duckdb_path(project_dir: &Path, url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url == ":memory:" || Path::new(url).is_absolute() {
        url.to_string()
    } else {
        project_dir.join(url).display().to_string()
    }
}

async fn connect_relational(project_dir: &Path, config: &Config) -> Result<Arc<dyn Database>> {
    let rel = &config.relational;
    match rel.backend {
        RelationalBackend::Postgres => {
            let pg = PostgresBackend::connect(
                &config.relational_connection_url(),
                rel.username.as_deref(),
                rel.password.as_deref(),
                Some(rel.schema.as_str()),
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            log::info!("Connected to PostgreSQL (schema '{}')", rel.schema);
            Ok(Arc::new(pg))
        }
        RelationalBackend::DuckDb => {
            let path = duckdb_path(project_dir, &rel.url);
            let duck = DuckDbBackend::new(&path).context("Failed to open DuckDB database")?;
            log::info!("Opened DuckDB database {}", path);
            Ok(Arc::new(duck))
        }
    }
}

#[cfg(test)]
impl RuntimeContext {
    /// In-memory DuckDB and document store rooted at `project_dir`, with
    /// tracking enabled.
    pub(crate) fn in_memory(project_dir: &Path) -> Self {
        let mut config = Config::default();
        config.relational.backend = RelationalBackend::DuckDb;
        config.relational.url = ":memory:".to_string();
        let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
        let store: Arc<dyn DocumentStore> = Arc::new(dm_db::MemoryDocumentStore::new());
        let tracker = ExecutionTracker::new(db.clone(), config.control.table_name.clone());
        Self {
            project_dir: project_dir.to_path_buf(),
            config,
            environment: "test".to_string(),
            db,
            store: Some(store),
            tracker: Some(tracker),
        }
    }
}
