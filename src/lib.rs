pub mod board;
pub mod schedule;
pub mod storage;
pub mod sync;

pub use board::{BoardError, ConflictCheck, DeleteReport, SaveReport, ScheduleBoard};
pub use schedule::{EventPatch, EventType, Executive, NewEvent, ScheduleEvent};
pub use sync::{SyncFailure, SyncResult};
