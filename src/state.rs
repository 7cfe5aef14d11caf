use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::auth::repo::{PgSessionRepo, PgUserRepo, SessionRepo, UserRepo};
use crate::auth::services::CredentialStore;
use crate::auth::session::SessionAuthenticator;
use crate::config::AppConfig;
use crate::db;
use crate::memory::MemoryStore;
use crate::tasks::repo::{PgTaskRepo, TaskRepo};
use crate::tasks::services::TaskStore;

#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialStore,
    pub sessions: SessionAuthenticator,
    pub tasks: TaskStore,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        match &config.database {
            Some(db_cfg) => {
                let db = db::connect(db_cfg).await?;
                info!("connected to postgres");
                Ok(Self::postgres(db, &config))
            }
            None => {
                warn!("DATABASE_URL not set; using the in-memory store, data is lost on restart");
                Ok(Self::in_memory(&config))
            }
        }
    }

    pub fn postgres(db: PgPool, config: &AppConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(PgUserRepo::new(db.clone())),
            Arc::new(PgSessionRepo::new(db.clone())),
            Arc::new(PgTaskRepo::new(db)),
        )
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        Self::from_parts(config, store.clone(), store.clone(), store)
    }

    pub fn from_parts(
        config: &AppConfig,
        users: Arc<dyn UserRepo>,
        sessions: Arc<dyn SessionRepo>,
        tasks: Arc<dyn TaskRepo>,
    ) -> Self {
        Self {
            credentials: CredentialStore::new(users, config.validation),
            sessions: SessionAuthenticator::new(sessions, &config.session),
            tasks: TaskStore::new(tasks),
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::in_memory(&AppConfig::for_tests())
    }
}

impl FromRef<AppState> for SessionAuthenticator {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for TaskStore {
    fn from_ref(state: &AppState) -> Self {
        state.tasks.clone()
    }
}

impl FromRef<AppState> for CredentialStore {
    fn from_ref(state: &AppState) -> Self {
        state.credentials.clone()
    }
}
