//! Database entities.

pub mod backup;
pub mod restore;
pub mod schedule;

pub use backup::{Backup, BackupSource, BackupStatus, BackupTrigger, BackupType};
pub use restore::{
    RestoreDrill, RestoreLogEntry, RestoreLogLevel, RestoreRecord, RestoreScope, RestoreStatus,
    RestoreType,
};
pub use schedule::BackupSchedule;
