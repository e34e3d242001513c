use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::sync::calendar_id::normalize_calendar_id;
use crate::sync::google_api::CalendarApi;
use crate::sync::google_auth::AuthSession;

/// Advisory overlap detection against the remote free/busy view.
///
/// Fails open: a missing session, a missing calendar or any query error all
/// read as "no conflict", so the primary write path is never blocked.
pub struct ConflictChecker {
    session: Arc<AuthSession>,
    api: Arc<dyn CalendarApi>,
}

impl ConflictChecker {
    pub fn new(session: Arc<AuthSession>, api: Arc<dyn CalendarApi>) -> Self {
        Self { session, api }
    }

    pub async fn has_conflict(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        let Some(access_token) = self.session.access_token() else {
            return false;
        };
        if calendar_id.is_empty() {
            return false;
        }

        let calendar_id = normalize_calendar_id(calendar_id, self.session.primary_identity().as_deref());

        match self.api.query_free_busy(&access_token, &calendar_id, start, end).await {
            Ok(busy) => {
                if !busy.is_empty() {
                    tracing::info!(
                        "{} busy interval(s) on {} between {} and {}",
                        busy.len(),
                        calendar_id,
                        start,
                        end
                    );
                }
                !busy.is_empty()
            }
            Err(e) => {
                self.session.observe(&e, &access_token);
                tracing::warn!("Conflict check on {} failed, proceeding: {}", calendar_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::event_store::EventStore;
    use crate::sync::google_api::{ApiError, BusyInterval, MockAccountApi, MockCalendarApi};
    use crate::sync::google_auth::{MockConsentFlow, TokenStore};
    use chrono::TimeZone;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        (start, start + chrono::Duration::hours(1))
    }

    fn checker(signed_in: bool, api: MockCalendarApi) -> (ConflictChecker, Arc<AuthSession>) {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        if signed_in {
            store.save_token("token-1").unwrap();
            store.save_primary_identity("me@example.com").unwrap();
        }
        let session = Arc::new(AuthSession::new(
            store,
            Arc::new(MockAccountApi::new()),
            Arc::new(MockConsentFlow::new()),
        ));
        (ConflictChecker::new(session.clone(), Arc::new(api)), session)
    }

    #[tokio::test]
    async fn busy_interval_is_a_conflict() {
        let (start, end) = window();
        let mut api = MockCalendarApi::new();
        api.expect_query_free_busy()
            .withf(move |token, calendar_id, time_min, time_max| {
                token == "token-1" && calendar_id == "primary" && *time_min == start && *time_max == end
            })
            .returning(move |_, _, _, _| Ok(vec![BusyInterval { start, end }]));
        let (checker, _) = checker(true, api);

        assert!(checker.has_conflict("me@example.com", start, end).await);
    }

    #[tokio::test]
    async fn free_window_is_not_a_conflict() {
        let (start, end) = window();
        let mut api = MockCalendarApi::new();
        api.expect_query_free_busy().returning(|_, _, _, _| Ok(vec![]));
        let (checker, _) = checker(true, api);

        assert!(!checker.has_conflict("shared@x.com", start, end).await);
    }

    #[tokio::test]
    async fn no_session_skips_query() {
        let (start, end) = window();
        let mut api = MockCalendarApi::new();
        api.expect_query_free_busy().never();
        let (checker, _) = checker(false, api);

        assert!(!checker.has_conflict("primary", start, end).await);
    }

    #[tokio::test]
    async fn no_calendar_skips_query() {
        let (start, end) = window();
        let mut api = MockCalendarApi::new();
        api.expect_query_free_busy().never();
        let (checker, _) = checker(true, api);

        assert!(!checker.has_conflict("", start, end).await);
    }

    #[tokio::test]
    async fn query_error_fails_open() {
        let (start, end) = window();
        let mut api = MockCalendarApi::new();
        api.expect_query_free_busy()
            .returning(|_, _, _, _| Err(ApiError::RequestError("Status 500".to_string())));
        let (checker, session) = checker(true, api);

        assert!(!checker.has_conflict("primary", start, end).await);
        assert!(session.has_session());
    }

    #[tokio::test]
    async fn unauthorized_query_fails_open_and_ends_session() {
        let (start, end) = window();
        let mut api = MockCalendarApi::new();
        api.expect_query_free_busy()
            .returning(|_, _, _, _| Err(ApiError::AuthenticationFailed));
        let (checker, session) = checker(true, api);

        assert!(!checker.has_conflict("primary", start, end).await);
        assert!(!session.has_session());
    }
}
