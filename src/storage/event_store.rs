use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::schedule::{
    default_executives, EventPatch, Executive, ExecutiveUpdate, NewEvent, ScheduleEvent,
};
use crate::sync::google_auth::TokenStore;

pub const AUTH_TOKEN_KEY: &str = "exec-schedule:auth";
pub const USER_EMAIL_KEY: &str = "exec-schedule:user-email";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Failed to prepare database directory: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Unsupported backup version: {0}")]
    UnsupportedVersion(String),
}

/// Durable local store for executives, events and session keys.
///
/// Every method takes the connection lock for the duration of one statement
/// batch only, so the store can be shared behind an `Arc` across async tasks.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::new(Connection::open(path)?);
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self::new(Connection::open_in_memory()?);
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS executives (
                id TEXT PRIMARY KEY,
                display_order INTEGER NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                executive_id TEXT NOT NULL,
                data TEXT NOT NULL,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> bool {
        let result: SqliteResult<i32> = self.conn().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        );
        result.unwrap_or(0) > 0
    }

    /// All executives in display order, seeding the defaults on first use.
    pub fn executives(&self) -> Result<Vec<Executive>, StoreError> {
        let executives = self.load_executives()?;
        if executives.is_empty() {
            let defaults = default_executives();
            self.save_executives(&defaults)?;
            return Ok(defaults);
        }
        Ok(executives)
    }

    fn load_executives(&self) -> Result<Vec<Executive>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT data FROM executives ORDER BY display_order, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut executives = Vec::new();
        for data in rows {
            executives.push(serde_json::from_str(&data?)?);
        }
        Ok(executives)
    }

    pub fn save_executives(&self, executives: &[Executive]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM executives", [])?;
        for executive in executives {
            tx.execute(
                "INSERT INTO executives (id, display_order, data) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    &executive.id,
                    executive.order,
                    serde_json::to_string(executive)?
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn executive(&self, id: &str) -> Result<Option<Executive>, StoreError> {
        Ok(self.executives()?.into_iter().find(|e| e.id == id))
    }

    pub fn update_executive(
        &self,
        id: &str,
        update: ExecutiveUpdate,
    ) -> Result<Option<Executive>, StoreError> {
        let mut executives = self.executives()?;
        let Some(executive) = executives.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };

        update.apply(executive);
        let updated = executive.clone();
        self.save_executives(&executives)?;
        Ok(Some(updated))
    }

    pub fn events(&self) -> Result<Vec<ScheduleEvent>, StoreError> {
        self.query_events("SELECT data FROM events ORDER BY start_ms, id", &[])
    }

    pub fn get_event(&self, id: &str) -> Result<Option<ScheduleEvent>, StoreError> {
        let conn = self.conn();
        let data: Option<String> = conn
            .query_row("SELECT data FROM events WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn create_event(&self, new_event: NewEvent) -> Result<ScheduleEvent, StoreError> {
        let now = Utc::now();
        let event = ScheduleEvent {
            id: generate_event_id(),
            executive_id: new_event.executive_id,
            title: new_event.title,
            event_type: new_event.event_type,
            start_date: new_event.start_date,
            end_date: new_event.end_date,
            is_all_day: new_event.is_all_day,
            location: new_event.location,
            remote_event_id: None,
            created_at: now,
            updated_at: now,
        };

        ensure_valid_range(&event)?;
        self.store_event(&event)?;
        tracing::debug!("Created local event {} for {}", event.id, event.executive_id);
        Ok(event)
    }

    pub fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<Option<ScheduleEvent>, StoreError> {
        let Some(mut event) = self.get_event(id)? else {
            return Ok(None);
        };

        patch.apply(&mut event);
        event.updated_at = Utc::now();
        ensure_valid_range(&event)?;
        self.store_event(&event)?;
        Ok(Some(event))
    }

    pub fn delete_event(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.conn().execute("DELETE FROM events WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Writes the event as-is, keeping its id and timestamps.
    pub(crate) fn store_event(&self, event: &ScheduleEvent) -> Result<(), StoreError> {
        let data = serde_json::to_string(event)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO events (id, executive_id, data, start_ms, end_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                &event.id,
                &event.executive_id,
                &data,
                event.start_date.timestamp_millis(),
                event.end_date.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn event_exists(&self, id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Events overlapping the seven days that start at local midnight of `week_start`.
    pub fn events_in_week<Tz: TimeZone>(
        &self,
        week_start: NaiveDate,
        tz: &Tz,
    ) -> Result<Vec<ScheduleEvent>, StoreError> {
        let start = local_midnight(week_start, tz);
        let end = local_midnight(week_start + Duration::days(7), tz);

        self.query_events(
            "SELECT data FROM events WHERE start_ms < ?1 AND end_ms >= ?2 ORDER BY start_ms, id",
            &[&end.timestamp_millis(), &start.timestamp_millis()],
        )
    }

    pub fn events_for_executive_on<Tz: TimeZone>(
        &self,
        executive_id: &str,
        date: NaiveDate,
        tz: &Tz,
    ) -> Result<Vec<ScheduleEvent>, StoreError> {
        let start = local_midnight(date, tz);
        let end = local_midnight(date + Duration::days(1), tz);

        self.query_events(
            "SELECT data FROM events
             WHERE executive_id = ?1 AND start_ms < ?2 AND end_ms >= ?3
             ORDER BY start_ms, id",
            &[&executive_id, &end.timestamp_millis(), &start.timestamp_millis()],
        )
    }

    fn query_events(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ScheduleEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut events = Vec::new();
        for data in rows {
            events.push(serde_json::from_str(&data?)?);
        }
        Ok(events)
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn()
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }

    pub fn remove_setting(&self, key: &str) -> Result<(), StoreError> {
        self.conn().execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM executives", [])?;
        conn.execute("DELETE FROM events", [])?;
        conn.execute(
            "DELETE FROM settings WHERE key IN (?1, ?2)",
            [AUTH_TOKEN_KEY, USER_EMAIL_KEY],
        )?;
        Ok(())
    }
}

impl TokenStore for EventStore {
    fn load_token(&self) -> Result<Option<String>, StoreError> {
        self.setting(AUTH_TOKEN_KEY)
    }

    fn save_token(&self, token: &str) -> Result<(), StoreError> {
        self.set_setting(AUTH_TOKEN_KEY, token)
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        self.remove_setting(AUTH_TOKEN_KEY)
    }

    fn load_primary_identity(&self) -> Result<Option<String>, StoreError> {
        self.setting(USER_EMAIL_KEY)
    }

    fn save_primary_identity(&self, identity: &str) -> Result<(), StoreError> {
        self.set_setting(USER_EMAIL_KEY, identity)
    }

    fn clear_primary_identity(&self) -> Result<(), StoreError> {
        self.remove_setting(USER_EMAIL_KEY)
    }
}

pub(crate) fn generate_event_id() -> String {
    format!("event-{}", Uuid::new_v4())
}

fn ensure_valid_range(event: &ScheduleEvent) -> Result<(), StoreError> {
    if event.has_valid_range() {
        Ok(())
    } else {
        Err(StoreError::InvalidEvent(format!(
            "event {} ends at {} which is not after its start {}",
            event.id, event.end_date, event.start_date
        )))
    }
}

fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}
