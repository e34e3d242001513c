pub const PRIMARY_CALENDAR: &str = "primary";

/// Maps a calendar id typed into settings onto the id the remote service is
/// addressed with.
///
/// The account's own address is folded into `primary` so the same physical
/// calendar is always addressed one way. Empty input and any other address
/// (a shared or delegated calendar) pass through untouched.
pub fn normalize_calendar_id(raw_id: &str, primary_identity: Option<&str>) -> String {
    if raw_id.is_empty() {
        return String::new();
    }

    if raw_id.eq_ignore_ascii_case(PRIMARY_CALENDAR) {
        return PRIMARY_CALENDAR.to_string();
    }

    match primary_identity {
        Some(identity) if !identity.is_empty() && raw_id.eq_ignore_ascii_case(identity) => {
            PRIMARY_CALENDAR.to_string()
        }
        _ => raw_id.to_string(),
    }
}
