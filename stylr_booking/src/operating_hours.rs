use chrono::Weekday;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

lazy_static! {
    static ref TIME_REGEX: Regex = Regex::new(r"^([0-2]?\d):([0-5]\d)$").unwrap();
}

/// Opening window of a salon for one weekday, in minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOperatingHours", into = "RawOperatingHours")]
pub struct OperatingHours {
    pub day: Weekday,
    pub open_minute: u32,
    pub close_minute: u32,
}

/// Wire and storage form: `{ "day": "Monday", "open": "09:00", "close": "17:00" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOperatingHours {
    pub day: String,
    pub open: String,
    pub close: String,
}

impl TryFrom<RawOperatingHours> for OperatingHours {
    type Error = String;

    fn try_from(raw: RawOperatingHours) -> Result<Self, Self::Error> {
        let day = canonicalize_day(&raw.day).ok_or_else(|| format!("Unknown day '{}'", raw.day))?;
        let open_minute =
            parse_time(&raw.open, false).ok_or_else(|| format!("Invalid opening time '{}'", raw.open))?;
        let close_minute =
            parse_time(&raw.close, true).ok_or_else(|| format!("Invalid closing time '{}'", raw.close))?;
        if open_minute >= close_minute {
            return Err(format!(
                "Opening time {} must be before closing time {}",
                raw.open, raw.close
            ));
        }
        Ok(Self {
            day,
            open_minute,
            close_minute,
        })
    }
}

impl From<OperatingHours> for RawOperatingHours {
    fn from(hours: OperatingHours) -> Self {
        Self {
            day: day_name(hours.day).into(),
            open: format_time(hours.open_minute),
            close: format_time(hours.close_minute),
        }
    }
}

/// Parses `H:MM` or `HH:MM`. `24:00` is only accepted as a closing time.
pub fn parse_time(value: &str, allow_end_of_day: bool) -> Option<u32> {
    let trimmed = value.trim();
    if allow_end_of_day && trimmed == "24:00" {
        return Some(MINUTES_PER_DAY);
    }
    let captures = TIME_REGEX.captures(trimmed)?;
    let hours: u32 = captures[1].parse().ok()?;
    let minutes: u32 = captures[2].parse().ok()?;
    if hours > 23 {
        return None;
    }
    Some(hours * 60 + minutes)
}

fn format_time(minute_of_day: u32) -> String {
    format!("{:02}:{:02}", minute_of_day / 60, minute_of_day % 60)
}

pub fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Accepts full names, three letter abbreviations and trailing dots in any case.
pub fn canonicalize_day(input: &str) -> Option<Weekday> {
    let key: String = input
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .collect();
    let day = match key.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    let full = day_name(day).to_lowercase();
    let without_suffix = full.trim_end_matches("day");
    if key == full || key == without_suffix || key.len() == 3 {
        Some(day)
    } else {
        None
    }
}

/// One entry per weekday, Monday first. Later entries for the same day win.
pub fn normalize(entries: Vec<OperatingHours>) -> Vec<OperatingHours> {
    let by_day: BTreeMap<u32, OperatingHours> = entries
        .into_iter()
        .map(|entry| (entry.day.num_days_from_monday(), entry))
        .collect();
    by_day.into_values().collect()
}

/// Opening window for `day`. Unconfigured salons are open all day; configured
/// salons without an entry for `day` are closed.
pub fn window_for(hours: Option<&[OperatingHours]>, day: Weekday) -> Option<(u32, u32)> {
    match hours {
        None => Some((0, MINUTES_PER_DAY)),
        Some(entries) => entries
            .iter()
            .find(|entry| entry.day == day)
            .map(|entry| (entry.open_minute, entry.close_minute)),
    }
}
