use chrono::{Duration, Local, NaiveDateTime};

/// Hour (local time) at which a new budget day starts.
pub const DAY_BOUNDARY_HOUR: i64 = 4;

/// Day identifier (`YYYY-MM-DD`) for `now`, where the day rolls over at 04:00
/// rather than midnight.
pub fn date_key(now: NaiveDateTime) -> String {
    (now - Duration::hours(DAY_BOUNDARY_HOUR))
        .date()
        .format("%Y-%m-%d")
        .to_string()
}

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}
