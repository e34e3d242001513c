use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::ScheduleEvent;

pub const APP_TAG: &str = "exec-schedule";

#[derive(Debug, Error, PartialEq)]
#[error("Event {event_id} cannot be sent to the calendar: {reason}")]
pub struct InvalidEvent {
    pub event_id: String,
    pub reason: String,
}

/// Body of a remote create/update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub summary: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: RemoteDateTime,
    pub end: RemoteDateTime,
    pub extended_properties: ExtendedProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedProperties {
    pub private: PrivateProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateProperties {
    pub app: String,
    pub event_id: String,
}

impl RemoteDateTime {
    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            date_time: None,
            time_zone: None,
        }
    }

    pub fn timed(date_time: DateTime<FixedOffset>, time_zone: &str) -> Self {
        Self {
            date: None,
            date_time: Some(date_time),
            time_zone: Some(time_zone.to_string()),
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.date.is_some()
    }
}

impl RemoteEvent {
    /// Builds the remote body for a local event, reading wall-clock values in `tz`.
    ///
    /// All-day bounds are the local calendar dates of the stored instants, never
    /// the UTC date. The remote end date is exclusive: an end stored as the last
    /// moment of a day (00:00 to 23:59 local) is sent as `[day, day + 1)`, while
    /// an end at local midnight is already exclusive.
    pub fn from_schedule_event(event: &ScheduleEvent, tz: Tz) -> Result<Self, InvalidEvent> {
        let (start, end) = if event.is_all_day {
            let start_date = event.start_date.with_timezone(&tz).date_naive();
            let end_local = event.end_date.with_timezone(&tz);
            let mut end_date = end_local.date_naive();
            if end_local.time() != NaiveTime::MIN {
                end_date += Duration::days(1);
            }
            if end_date <= start_date {
                end_date = start_date + Duration::days(1);
            }
            (RemoteDateTime::all_day(start_date), RemoteDateTime::all_day(end_date))
        } else {
            if event.end_date <= event.start_date {
                return Err(InvalidEvent {
                    event_id: event.id.clone(),
                    reason: format!(
                        "end {} is not after start {}",
                        event.end_date, event.start_date
                    ),
                });
            }
            (
                RemoteDateTime::timed(event.start_date.with_timezone(&tz).fixed_offset(), tz.name()),
                RemoteDateTime::timed(event.end_date.with_timezone(&tz).fixed_offset(), tz.name()),
            )
        };

        let location = event.location.clone().filter(|l| !l.is_empty());

        Ok(Self {
            summary: format!("{} [{}]", event.title, event.event_type.label()),
            description: location
                .as_ref()
                .map(|l| format!("Location: {}", l))
                .unwrap_or_default(),
            location,
            start,
            end,
            extended_properties: ExtendedProperties {
                private: PrivateProperties {
                    app: APP_TAG.to_string(),
                    event_id: event.id.clone(),
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::EventType;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Asia::Tokyo;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_event(start: DateTime<Utc>, end: DateTime<Utc>, all_day: bool) -> ScheduleEvent {
        ScheduleEvent {
            id: "event-1".to_string(),
            executive_id: "exec-1".to_string(),
            title: "Budget review".to_string(),
            event_type: EventType::Meeting,
            start_date: start,
            end_date: end,
            is_all_day: all_day,
            location: None,
            remote_event_id: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn tokyo(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Tokyo
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn all_day_uses_local_date_not_utc_date() {
        // 23:30 in UTC+9 is 14:30 UTC the same day; 00:30 local is the previous UTC day.
        let start = tokyo(2024, 3, 10, 0, 30);
        let end = tokyo(2024, 3, 10, 23, 30);
        assert_eq!(start.date_naive(), date(2024, 3, 9));

        let remote = RemoteEvent::from_schedule_event(&create_event(start, end, true), Tokyo).unwrap();

        assert_eq!(remote.start, RemoteDateTime::all_day(date(2024, 3, 10)));
    }

    #[test]
    fn all_day_start_late_in_local_day_keeps_local_date() {
        let start = tokyo(2024, 3, 10, 23, 30);
        let end = tokyo(2024, 3, 11, 23, 30);

        let remote = RemoteEvent::from_schedule_event(&create_event(start, end, true), Tokyo).unwrap();

        assert_eq!(remote.start.date, Some(date(2024, 3, 10)));
        assert_eq!(remote.end.date, Some(date(2024, 3, 12)));
    }

    #[test]
    fn single_day_all_day_event_gets_exclusive_end() {
        let start = tokyo(2024, 3, 10, 0, 0);
        let end = tokyo(2024, 3, 10, 23, 59);

        let remote = RemoteEvent::from_schedule_event(&create_event(start, end, true), Tokyo).unwrap();

        assert_eq!(remote.start.date, Some(date(2024, 3, 10)));
        assert_eq!(remote.end.date, Some(date(2024, 3, 11)));
        assert!(remote.start.date_time.is_none());
    }

    #[test]
    fn multi_day_all_day_event_includes_last_day() {
        let start = tokyo(2024, 3, 10, 0, 0);
        let end = tokyo(2024, 3, 12, 23, 59);

        let remote = RemoteEvent::from_schedule_event(&create_event(start, end, true), Tokyo).unwrap();

        assert_eq!(remote.start.date, Some(date(2024, 3, 10)));
        assert_eq!(remote.end.date, Some(date(2024, 3, 13)));
    }

    #[test]
    fn all_day_end_at_local_midnight_is_already_exclusive() {
        let start = tokyo(2024, 3, 10, 0, 0);
        let end = tokyo(2024, 3, 12, 0, 0);

        let remote = RemoteEvent::from_schedule_event(&create_event(start, end, true), Tokyo).unwrap();

        assert_eq!(remote.end.date, Some(date(2024, 3, 12)));
    }

    #[test]
    fn timed_event_carries_timestamps_and_time_zone() {
        let start = tokyo(2024, 3, 11, 9, 0);
        let end = tokyo(2024, 3, 11, 10, 0);

        let remote = RemoteEvent::from_schedule_event(&create_event(start, end, false), Tokyo).unwrap();

        assert_eq!(remote.start.date, None);
        assert_eq!(remote.start.time_zone.as_deref(), Some("Asia/Tokyo"));
        assert_eq!(
            remote.start.date_time.unwrap().to_rfc3339(),
            "2024-03-11T09:00:00+09:00"
        );
        assert_eq!(remote.end.date_time.unwrap().with_timezone(&Utc), end);
    }

    #[test]
    fn timed_event_with_inverted_range_is_rejected() {
        let start = tokyo(2024, 3, 11, 10, 0);
        let end = tokyo(2024, 3, 11, 9, 0);

        let result = RemoteEvent::from_schedule_event(&create_event(start, end, false), Tokyo);

        assert!(result.is_err());
    }

    #[test]
    fn summary_includes_type_label_and_description_carries_location() {
        let mut event = create_event(tokyo(2024, 3, 11, 9, 0), tokyo(2024, 3, 11, 10, 0), false);
        event.event_type = EventType::Outing;
        event.location = Some("City Hall".to_string());

        let remote = RemoteEvent::from_schedule_event(&event, Tokyo).unwrap();

        assert_eq!(remote.summary, "Budget review [Outing]");
        assert_eq!(remote.description, "Location: City Hall");
        assert_eq!(remote.location.as_deref(), Some("City Hall"));
    }

    #[test]
    fn description_is_empty_without_location() {
        let event = create_event(tokyo(2024, 3, 11, 9, 0), tokyo(2024, 3, 11, 10, 0), false);

        let remote = RemoteEvent::from_schedule_event(&event, Tokyo).unwrap();

        assert_eq!(remote.description, "");
        assert_eq!(remote.location, None);
    }

    #[test]
    fn private_property_records_local_event_id() {
        let event = create_event(tokyo(2024, 3, 11, 9, 0), tokyo(2024, 3, 11, 10, 0), false);

        let value =
            serde_json::to_value(RemoteEvent::from_schedule_event(&event, Tokyo).unwrap()).unwrap();

        assert_eq!(value["extendedProperties"]["private"]["eventId"], "event-1");
        assert_eq!(value["extendedProperties"]["private"]["app"], APP_TAG);
        assert_eq!(value["start"]["timeZone"], "Asia/Tokyo");
        assert!(value["start"].get("date").is_none());
    }

    #[test]
    fn all_day_json_has_only_date() {
        let event = create_event(tokyo(2024, 3, 10, 0, 0), tokyo(2024, 3, 10, 23, 59), true);

        let value =
            serde_json::to_value(RemoteEvent::from_schedule_event(&event, Tokyo).unwrap()).unwrap();

        assert_eq!(value["start"], serde_json::json!({ "date": "2024-03-10" }));
        assert_eq!(value["end"], serde_json::json!({ "date": "2024-03-11" }));
    }
}
