//! API module - HTTP handlers for the triggering layer.

pub mod dto;
pub mod handlers;
pub mod openapi;
pub mod routes;

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::services::backup_service::BackupService;
use crate::services::restore_service::RestoreService;
use crate::services::scheduler_service::SchedulerService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub backup_service: Arc<BackupService>,
    pub restore_service: Arc<RestoreService>,
    pub scheduler: Arc<SchedulerService>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: PgPool,
        backup_service: Arc<BackupService>,
        restore_service: Arc<RestoreService>,
        scheduler: Arc<SchedulerService>,
    ) -> Self {
        Self {
            config,
            db,
            backup_service,
            restore_service,
            scheduler,
        }
    }
}

pub type SharedState = Arc<AppState>;
