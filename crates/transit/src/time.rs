//! Clock arithmetic for feed times and 12-hour display strings.
//!
//! Feed clock values count hours from the start of the service day, so a
//! departure at `25:30` is 1:30 AM on the following day and `49:00` is two
//! days later. Display strings (`"1:30 AM"`) never carry the day; it travels
//! next to them as an explicit day offset.

use chrono::{NaiveTime, Timelike};

use crate::models::types::{Result, TransitError};

pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// A 12-hour display time plus the number of midnights crossed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayOffsetTime {
    pub time: String,
    pub day_offset: i32,
}

/// Split a feed clock value (`H:MM` or `HH:MM:SS`) into hours, minutes and
/// seconds. Hours are not bounded to a single day.
pub fn parse_clock(raw: &str) -> Result<(u32, u32, u32)> {
    let invalid = || TransitError::InvalidTime(raw.to_string());
    let mut parts = raw.trim().split(':');

    let hours = parts
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(invalid)?;
    let minutes = parts
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .filter(|m| *m < 60)
        .ok_or_else(invalid)?;
    let seconds = match parts.next() {
        Some(p) => p.parse::<u32>().ok().filter(|s| *s < 60).ok_or_else(invalid)?,
        None => 0,
    };

    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok((hours, minutes, seconds))
}

/// Seconds since the start of the service day
pub fn service_seconds(raw: &str) -> Result<u32> {
    let (hours, minutes, seconds) = parse_clock(raw)?;
    Ok(hours * 3600 + minutes * 60 + seconds)
}

/// Render minutes since midnight (`0..1440`) as `h:mm AM/PM`
fn render_twelve_hour(minute_of_day: u32) -> String {
    let hours = minute_of_day / 60;
    let minutes = minute_of_day % 60;
    let (display_hours, suffix) = match hours {
        0 => (12, "AM"),
        1..=11 => (hours, "AM"),
        12 => (12, "PM"),
        _ => (hours - 12, "PM"),
    };
    format!("{display_hours}:{minutes:02} {suffix}")
}

/// Convert a raw feed clock value into a display time and day offset.
///
/// `"25:30"` becomes `1:30 AM` on day offset 1.
pub fn format_with_day_offset(raw: &str) -> Result<DayOffsetTime> {
    let (hours, minutes, _) = parse_clock(raw)?;
    let day_offset =
        i32::try_from(hours / 24).map_err(|_| TransitError::InvalidTime(raw.to_string()))?;
    let time = render_twelve_hour((hours % 24) * 60 + minutes);
    Ok(DayOffsetTime { time, day_offset })
}

/// Minutes since midnight of a `h:mm AM/PM` display string
pub fn parse_to_minutes(display: &str) -> Result<i32> {
    let normalized = display.trim().to_ascii_uppercase();
    let time = NaiveTime::parse_from_str(&normalized, "%I:%M %p")
        .map_err(|_| TransitError::InvalidTime(display.to_string()))?;
    Ok((time.num_seconds_from_midnight() / 60) as i32)
}

/// Shift a display time by a delay, counting every midnight crossed.
///
/// Negative delays roll the day offset backwards.
pub fn add_delay_minutes(
    display: &str,
    minutes: i32,
    base_day_offset: i32,
) -> Result<DayOffsetTime> {
    let total = parse_to_minutes(display)? + minutes;
    let day_offset = base_day_offset + total.div_euclid(MINUTES_PER_DAY);
    let time = render_twelve_hour(total.rem_euclid(MINUTES_PER_DAY) as u32);
    Ok(DayOffsetTime { time, day_offset })
}

/// Minutes from `start` to `end`, both display strings.
///
/// `end` is assumed to be on the same day or the next day; spans longer than
/// a day cannot be expressed with display strings. Use [`scheduled_minutes`]
/// with raw feed values when the full span matters.
pub fn duration_between(start: &str, end: &str) -> Result<i32> {
    let diff = parse_to_minutes(end)? - parse_to_minutes(start)?;
    Ok(if diff < 0 { diff + MINUTES_PER_DAY } else { diff })
}

/// Minutes between two raw feed clock values of the same trip.
///
/// Exact across any number of midnights because both values share the
/// service-day origin. Returns 0 when `end` precedes `start`.
pub fn scheduled_minutes(start_raw: &str, end_raw: &str) -> Result<u32> {
    let start = service_seconds(start_raw)?;
    let end = service_seconds(end_raw)?;
    Ok(end.saturating_sub(start) / 60)
}

/// Human duration such as `"3h 05m"` or `"45m"`
pub fn format_duration(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m:02}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(time: &str, day_offset: i32) -> DayOffsetTime {
        DayOffsetTime {
            time: time.to_string(),
            day_offset,
        }
    }

    #[test]
    fn test_format_with_day_offset() {
        assert_eq!(format_with_day_offset("25:30").unwrap(), at("1:30 AM", 1));
        assert_eq!(format_with_day_offset("14:05").unwrap(), at("2:05 PM", 0));
        assert_eq!(format_with_day_offset("0:00").unwrap(), at("12:00 AM", 0));
        assert_eq!(format_with_day_offset("12:00:00").unwrap(), at("12:00 PM", 0));
        assert_eq!(format_with_day_offset("49:15:00").unwrap(), at("1:15 AM", 2));
    }

    #[test]
    fn test_parse_clock_rejects_garbage() {
        assert!(parse_clock("").is_err());
        assert!(parse_clock("7").is_err());
        assert!(parse_clock("07:61").is_err());
        assert!(parse_clock("07:00:00:00").is_err());
        assert_eq!(parse_clock(" 07:05:09 ").unwrap(), (7, 5, 9));
    }

    #[test]
    fn test_service_seconds_past_midnight() {
        assert_eq!(service_seconds("25:30:00").unwrap(), 91_800);
    }

    #[test]
    fn test_add_delay_rolls_day_forward() {
        assert_eq!(add_delay_minutes("11:50 PM", 20, 0).unwrap(), at("12:10 AM", 1));
        assert_eq!(add_delay_minutes("9:00 AM", 3 * 1440, 1).unwrap(), at("9:00 AM", 4));
    }

    #[test]
    fn test_add_delay_rolls_day_backward() {
        assert_eq!(add_delay_minutes("12:05 AM", -10, 1).unwrap(), at("11:55 PM", 0));
        assert_eq!(add_delay_minutes("2:00 PM", -5, 0).unwrap(), at("1:55 PM", 0));
    }

    #[test]
    fn test_parse_to_minutes() {
        assert_eq!(parse_to_minutes("12:00 AM").unwrap(), 0);
        assert_eq!(parse_to_minutes("12:30 PM").unwrap(), 750);
        assert_eq!(parse_to_minutes("11:59 pm").unwrap(), 1439);
        assert!(parse_to_minutes("25:00").is_err());
    }

    #[test]
    fn test_duration_between_wraps_once() {
        assert_eq!(duration_between("10:00 AM", "1:15 PM").unwrap(), 195);
        assert_eq!(duration_between("11:00 PM", "1:00 AM").unwrap(), 120);
    }

    #[test]
    fn test_scheduled_minutes_spans_days() {
        assert_eq!(scheduled_minutes("21:40:00", "48:10:00").unwrap(), 1590);
        assert_eq!(scheduled_minutes("10:00:00", "09:00:00").unwrap(), 0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45m");
        assert_eq!(format_duration(185), "3h 05m");
    }
}
