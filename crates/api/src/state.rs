//! Shared application state and its wiring.

use std::sync::Arc;

use domain::{BonusActivation, InMemoryBonusStore};
use history_store::{HistoryStore, InMemoryHistoryStore, PostgresHistoryStore};
use workflow::{
    BatchCoordinator, ClaimWorkflow, FileRequestBackup, InMemoryErrorSink,
    InMemoryNotificationSender, InMemoryRequestBackup, RequestBackup, TracingTelemetry,
    WorkflowConfig,
};

use crate::config::Config;
use crate::error::SetupError;

/// Coordinator over a type-erased history store and in-process adapters.
pub type Coordinator = BatchCoordinator<
    Arc<dyn HistoryStore>,
    InMemoryBonusStore,
    InMemoryNotificationSender,
    InMemoryErrorSink,
>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub bonuses: InMemoryBonusStore,
    pub notifications: InMemoryNotificationSender,
    pub errors: InMemoryErrorSink,
}

impl AppState {
    /// Wires the coordinator over the given history store and backup.
    pub fn new(
        history: Arc<dyn HistoryStore>,
        backup: Arc<dyn RequestBackup>,
        config: WorkflowConfig,
    ) -> Self {
        let bonuses = InMemoryBonusStore::new();
        let notifications = InMemoryNotificationSender::new();
        let errors = InMemoryErrorSink::new();

        let workflow = ClaimWorkflow::new(
            history,
            bonuses.clone(),
            notifications.clone(),
            errors.clone(),
            Arc::new(TracingTelemetry),
            config,
        );

        Self {
            coordinator: Arc::new(BatchCoordinator::new(workflow, backup)),
            bonuses,
            notifications,
            errors,
        }
    }

    /// Loads bonus records into the record store.
    pub async fn seed_bonuses(&self, bonuses: Vec<BonusActivation>) {
        for bonus in bonuses {
            self.bonuses.insert(bonus).await;
        }
    }
}

/// Creates the default application state with in-memory stores.
pub fn create_default_state() -> Arc<AppState> {
    Arc::new(AppState::new(
        Arc::new(InMemoryHistoryStore::new()),
        Arc::new(InMemoryRequestBackup::new()),
        WorkflowConfig::default(),
    ))
}

/// Creates the application state described by `config`.
///
/// Connects to PostgreSQL and runs migrations when a database URL is set,
/// and loads the bonus seed file when one is given.
pub async fn create_state(config: &Config) -> Result<Arc<AppState>, SetupError> {
    let history: Arc<dyn HistoryStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresHistoryStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL history store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, history is kept in memory");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let backup: Arc<dyn RequestBackup> = match &config.backup_dir {
        Some(dir) => Arc::new(FileRequestBackup::new(dir.clone())),
        None => Arc::new(InMemoryRequestBackup::new()),
    };

    let state = AppState::new(history, backup, config.workflow.clone());

    if let Some(path) = &config.bonus_seed_file {
        let raw = tokio::fs::read(path).await?;
        let bonuses: Vec<BonusActivation> = serde_json::from_slice(&raw)?;
        tracing::info!(count = bonuses.len(), path = %path.display(), "seeding bonus records");
        state.seed_bonuses(bonuses).await;
    }

    Ok(Arc::new(state))
}
