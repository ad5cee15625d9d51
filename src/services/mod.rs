//! Business logic services.

pub mod archive_service;
pub mod backup_service;
pub mod config_extractor;
pub mod database_extractor;
pub mod file_extractor;
pub mod notification_service;
pub mod restore_service;
pub mod scheduler_service;
