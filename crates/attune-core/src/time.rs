//! UTC timestamps as Unix seconds, rendered without a date-time dependency.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::DAY_SECS;

pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn now_iso8601() -> String {
    unix_to_iso8601(now_unix_secs())
}

/// `2026-02-21T00:00:00Z`
pub fn unix_to_iso8601(secs: u64) -> String {
    let (y, m, d) = civil_from_days((secs / DAY_SECS) as i64);
    let time_of_day = secs % DAY_SECS;
    format!(
        "{y:04}-{m:02}-{d:02}T{:02}:{:02}:{:02}Z",
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60
    )
}

/// Coarse human span for prompt text: "today", "3 days", "5 weeks", "2 years".
pub fn describe_span(secs: u64) -> String {
    let days = secs / DAY_SECS;
    let (n, unit) = match days {
        0 => return "today".to_string(),
        1..=13 => (days, "day"),
        14..=69 => (days / 7, "week"),
        70..=729 => (days / 30, "month"),
        _ => (days / 365, "year"),
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Howard Hinnant's civil_from_days: Unix epoch days → (year, month, day).
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}
