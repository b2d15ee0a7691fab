//! Runtime context for CLI commands

use anyhow::{Context, Result};
use shale_core::{Config, MigrationGraph};
use shale_db::Database;
use shale_engine::{open_database, Executor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// A loaded `shale.yml` and the directory it belongs to
pub(crate) struct Project {
    pub config: Config,
    pub root: PathBuf,
}

impl Project {
    /// Load config from `--config` or the project directory
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let root = PathBuf::from(&args.project_dir);
        let config = if let Some(config_path) = &args.config {
            Config::load(Path::new(config_path)).context("Failed to load configuration file")?
        } else {
            Config::load_from_dir(&root).context("Failed to load project configuration")?
        };
        Ok(Self { config, root })
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.config.migrations_path_absolute(&self.root)
    }

    /// Discover and validate every migration under the migrations directory
    pub fn load_graph(&self) -> Result<MigrationGraph> {
        let dir = self.migrations_dir();
        MigrationGraph::load(&dir)
            .with_context(|| format!("Failed to load migrations from {}", dir.display()))
    }

    /// Connection string after CLI, environment and target overrides
    pub fn database_url(&self, args: &GlobalArgs) -> Result<String> {
        let target = Config::resolve_target(args.target_db.as_deref());
        let url = self.config.resolve_database_url(
            &self.root,
            args.database_url.as_deref(),
            target.as_deref(),
        )?;
        Ok(url)
    }

    /// Open the target database, waiting up to the lock timeout if another
    /// process has the file open
    pub async fn connect(&self, args: &GlobalArgs) -> Result<(Arc<dyn Database>, String)> {
        let url = self.database_url(args)?;
        log::info!("Connecting to {url}");
        let db = open_database(&url, &self.config.lock)
            .await
            .with_context(|| format!("Failed to connect to database '{url}'"))?;
        log::debug!("Connected ({})", db.db_type());
        Ok((Arc::new(db), url))
    }
}

/// Everything a migrating command needs: config, graph, connection, executor
pub(crate) struct RuntimeContext {
    pub project: Project,
    pub graph: MigrationGraph,
    pub db: Arc<dyn Database>,
    pub database_url: String,
    pub executor: Executor,
}

impl RuntimeContext {
    /// Create a new runtime context from global arguments
    pub async fn new(args: &GlobalArgs) -> Result<Self> {
        let project = Project::load(args)?;
        let graph = project.load_graph()?;
        log::info!(
            "Loaded {} migration(s) from {}",
            graph.len(),
            project.migrations_dir().display()
        );
        let (db, database_url) = project.connect(args).await?;
        let executor = Executor::from_config(&project.config);

        Ok(Self {
            project,
            graph,
            db,
            database_url,
            executor,
        })
    }

    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }
}
