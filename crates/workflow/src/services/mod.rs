//! External collaborator contracts and their in-process implementations.

pub mod backup;
pub mod notification;
pub mod telemetry;

pub use backup::{BackupError, FileRequestBackup, InMemoryRequestBackup, RequestBackup};
pub use notification::{InMemoryNotificationSender, NotificationError, NotificationSender};
pub use telemetry::{
    InMemoryTelemetry, TelemetryEvent, TelemetryEventKind, TelemetrySink, TracingTelemetry,
};
