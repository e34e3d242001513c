pub mod backup;
pub mod config;
pub mod event_store;

pub use backup::{ExportData, ImportSummary};
pub use config::Config;
pub use event_store::{EventStore, StoreError};
