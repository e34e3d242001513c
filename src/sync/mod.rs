pub mod calendar_id;
pub mod conflict;
pub mod google_api;
pub mod google_auth;
pub mod remote_event;
pub mod sync_engine;

pub use calendar_id::{normalize_calendar_id, PRIMARY_CALENDAR};
pub use conflict::ConflictChecker;
pub use google_api::{AccountApi, ApiError, CalendarApi, GoogleCalendarClient};
pub use google_auth::{AuthError, AuthSession, AuthorizationPrompt, ConsentFlow, GoogleConsentFlow, Session, TokenStore};
pub use sync_engine::{RemoteDeletion, SyncEngine, SyncError, SyncFailure, SyncResult};
