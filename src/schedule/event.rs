use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Meeting,
    Trip,
    Outing,
    AnnualLeave,
    Other,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Meeting,
        EventType::Trip,
        EventType::Outing,
        EventType::AnnualLeave,
        EventType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EventType::Meeting => "Meeting",
            EventType::Trip => "Trip",
            EventType::Outing => "Outing",
            EventType::AnnualLeave => "Annual Leave",
            EventType::Other => "Other",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            EventType::Meeting => "#004986",
            EventType::Trip => "#00736D",
            EventType::Outing => "#F39800",
            EventType::AnnualLeave => "#A40000",
            EventType::Other => "#6b7280",
        }
    }

    /// Annual leave is an absence, so it never carries a location.
    pub fn allows_location(&self) -> bool {
        !matches!(self, EventType::AnnualLeave)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    pub id: String,
    pub executive_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleEvent {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_date - self.start_date).num_minutes()
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_date < end && start < self.end_date
    }

    /// Timed events must end after they start.
    pub fn has_valid_range(&self) -> bool {
        self.is_all_day || self.end_date > self.start_date
    }

    /// The remote id, treating an empty string (as written by older backups) as absent.
    pub fn remote_id(&self) -> Option<&str> {
        self.remote_event_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Fields supplied by the user when an event is first submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub executive_id: String,
    pub title: String,
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
}

/// Partial update applied to a stored event. `None` leaves a field untouched;
/// the doubly optional fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub executive_id: Option<String>,
    pub title: Option<String>,
    pub event_type: Option<EventType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_all_day: Option<bool>,
    pub location: Option<Option<String>>,
    pub remote_event_id: Option<Option<String>>,
}

impl EventPatch {
    pub fn remote_event_id(remote_event_id: impl Into<String>) -> Self {
        Self {
            remote_event_id: Some(Some(remote_event_id.into())),
            ..Self::default()
        }
    }

    /// Drag or resize: the event keeps its content but changes owner and/or time.
    pub fn reschedule(
        executive_id: Option<String>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            executive_id,
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Self::default()
        }
    }

    pub fn apply(self, event: &mut ScheduleEvent) {
        if let Some(executive_id) = self.executive_id {
            event.executive_id = executive_id;
        }
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(event_type) = self.event_type {
            event.event_type = event_type;
        }
        if let Some(start_date) = self.start_date {
            event.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            event.end_date = end_date;
        }
        if let Some(is_all_day) = self.is_all_day {
            event.is_all_day = is_all_day;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(remote_event_id) = self.remote_event_id {
            event.remote_event_id = remote_event_id;
        }
    }
}
