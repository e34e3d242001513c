pub mod event;
pub mod executive;

pub use event::{EventPatch, EventType, NewEvent, ScheduleEvent};
pub use executive::{default_executives, Executive, ExecutiveUpdate};
