//! Directory listing parsing
//!
//! Turns the raw text a server sends for LIST into structured entries.
//! Unix-style `ls -l` lines are the common case; anything that does not
//! match falls back to a bare name so front ends can still render it.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// One entry of a remote directory listing. Ephemeral: produced by one
/// list() call and not retained by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub modified: Option<NaiveDateTime>,
}

/// Parse the accumulated LIST payload into entries, skipping blank
/// lines. Lines that defeat the Unix-format parser become name-only
/// entries rather than being dropped.
pub fn parse_listing(raw: &str) -> Vec<DirectoryEntry> {
    raw.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> DirectoryEntry {
    parse_unix_line(line).unwrap_or_else(|| {
        // Minimal servers send bare names; a trailing slash marks a
        // directory.
        let trimmed = line.trim();
        let is_directory = trimmed.ends_with('/') || trimmed == "." || trimmed == "..";
        DirectoryEntry {
            name: trimmed.trim_end_matches('/').to_string(),
            is_directory,
            size: None,
            modified: None,
        }
    })
}

/// `drwxr-xr-x 2 owner group 4096 Jan 12 10:30 name` and the
/// year-bearing variant `... Mar  3  2024 name`.
fn parse_unix_line(line: &str) -> Option<DirectoryEntry> {
    let mode = line.split_whitespace().next()?;
    if mode.len() < 10 || !matches!(mode.as_bytes()[0], b'-' | b'd' | b'l') {
        return None;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 9 {
        return None;
    }

    let is_directory = mode.starts_with('d');
    let size = fields[4].parse::<u64>().ok();
    let modified = parse_timestamp(fields[5], fields[6], fields[7]);

    // Name is everything after the timestamp fields; rejoining keeps
    // names with internal spaces intact.
    let name = fields[8..].join(" ");
    let name = match name.split_once(" -> ") {
        Some((link_name, _)) if mode.starts_with('l') => link_name.to_string(),
        _ => name,
    };

    Some(DirectoryEntry {
        name,
        is_directory,
        size,
        modified,
    })
}

/// `Jan 12 10:30` (current year) or `Mar 3 2024`.
fn parse_timestamp(month: &str, day: &str, rest: &str) -> Option<NaiveDateTime> {
    let day: u32 = day.parse().ok()?;

    if let Some((hour, minute)) = rest.split_once(':') {
        let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
        let date = date_from_month_abbrev(Local::now().year(), month, day)?;
        Some(date.and_time(time))
    } else {
        let year: i32 = rest.parse().ok()?;
        let date = date_from_month_abbrev(year, month, day)?;
        Some(date.and_time(NaiveTime::MIN))
    }
}

fn date_from_month_abbrev(year: i32, month: &str, day: u32) -> Option<NaiveDate> {
    let month = match month {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
