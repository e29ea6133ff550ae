//! Unix `ls -l` style LIST parser
//!
//! One listing line looks like:
//! ```text
//! drwxr-xr-x   2 user group  4096 Jan  1 12:00 dirname
//! -rw-r--r--   1 user group  1234 Jan  1  2024 file.txt
//! ```
//! Tokens are split on runs of whitespace: `[0]` permissions, `[4]` size,
//! `[5..=7]` date, `[8]` name. Anything with fewer than nine tokens is
//! rejected rather than skipped.

use crate::error::{MirrorError, Result};
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::ops::BitOr;

/// Minimum token count of a well-formed line
pub const MIN_TOKENS: usize = 9;

/// Length of the type + permission field (`drwxr-xr-x`)
const PERMISSION_FIELD_LEN: usize = 10;

/// Read/write/execute set for one permission class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Permission(u8);

impl Permission {
    pub const NONE: Permission = Permission(0);
    pub const EXECUTE: Permission = Permission(0b001);
    pub const WRITE: Permission = Permission(0b010);
    pub const READ: Permission = Permission(0b100);

    pub fn contains(self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn can_read(self) -> bool {
        self.contains(Permission::READ)
    }

    pub fn can_write(self) -> bool {
        self.contains(Permission::WRITE)
    }

    pub fn can_execute(self) -> bool {
        self.contains(Permission::EXECUTE)
    }

    /// Parse a three character `rwx` triplet; any other character clears the bit
    fn from_triplet(triplet: &[u8]) -> Permission {
        let mut p = Permission::NONE;
        if triplet[0] == b'r' {
            p = p | Permission::READ;
        }
        if triplet[1] == b'w' {
            p = p | Permission::WRITE;
        }
        // s/t mean execute plus setuid/sticky
        if matches!(triplet[2], b'x' | b's' | b't') {
            p = p | Permission::EXECUTE;
        }
        p
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.can_read() { 'r' } else { '-' };
        let w = if self.can_write() { 'w' } else { '-' };
        let x = if self.can_execute() { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A parsed listing line
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub kind: EntryKind,
    pub owner: Permission,
    pub group: Permission,
    pub others: Permission,
    pub size: u64,
    pub modified_at: NaiveDateTime,
    pub name: String,
    /// Listing base joined with the name
    pub uri: String,
    pub raw: String,
}

impl DirectoryEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Join a listing base and a name with exactly one `/`
pub fn join_uri(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Parse one line of a LIST response
pub fn parse_line(raw: &str, base_uri: &str) -> Result<DirectoryEntry> {
    let line = raw.trim_end_matches(['\r', '\n']);
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return Err(MirrorError::malformed(
            line,
            format!("expected at least {MIN_TOKENS} fields, found {}", tokens.len()),
        ));
    }

    let perms = tokens[0].as_bytes();
    if perms.len() < PERMISSION_FIELD_LEN {
        return Err(MirrorError::malformed(line, "permission field too short"));
    }
    let kind = if perms[0] == b'd' {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    let size = tokens[4]
        .parse::<u64>()
        .map_err(|_| MirrorError::malformed(line, format!("invalid size '{}'", tokens[4])))?;

    let modified_at = parse_timestamp(tokens[5], tokens[6], tokens[7], Local::now().naive_local())
        .ok_or_else(|| {
            MirrorError::malformed(
                line,
                format!("invalid date '{} {} {}'", tokens[5], tokens[6], tokens[7]),
            )
        })?;

    let mut name = name_field(line);
    if perms[0] == b'l' {
        if let Some((link, _target)) = name.split_once(" -> ") {
            name = link;
        }
    }

    Ok(DirectoryEntry {
        kind,
        owner: Permission::from_triplet(&perms[1..4]),
        group: Permission::from_triplet(&perms[4..7]),
        others: Permission::from_triplet(&perms[7..10]),
        size,
        modified_at,
        name: name.to_string(),
        uri: join_uri(base_uri, name),
        raw: line.to_string(),
    })
}

/// Parse a whole LIST body.
///
/// Blank lines, the `total N` summary some servers prepend, and the `.`/`..`
/// entries are skipped; every other line must parse.
pub fn parse_listing(body: &str, base_uri: &str) -> Result<Vec<DirectoryEntry>> {
    let mut entries = Vec::new();
    for line in body.split(['\r', '\n']) {
        if line.trim().is_empty() || is_total_line(line) {
            continue;
        }
        let entry = parse_line(line, base_uri)?;
        if entry.name == "." || entry.name == ".." {
            continue;
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn is_total_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some("total"), Some(n), None) if n.parse::<u64>().is_ok()
    )
}

/// The name runs from the ninth token to the end of the line so that names
/// with embedded spaces survive.
fn name_field(line: &str) -> &str {
    let mut rest = line.trim_start();
    for _ in 0..8 {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest.trim_end()
}

/// `Mon DD YYYY` or `Mon DD HH:MM`. The second form has no year: assume the
/// current one unless that lands more than a day in the future.
fn parse_timestamp(month: &str, day: &str, last: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if last.contains(':') {
        let time = NaiveTime::parse_from_str(last, "%H:%M").ok()?;
        let this_year = date_in_year(month, day, now.year())?.and_time(time);
        if this_year > now + Duration::days(1) {
            Some(date_in_year(month, day, now.year() - 1)?.and_time(time))
        } else {
            Some(this_year)
        }
    } else {
        let year = last.parse::<i32>().ok()?;
        Some(date_in_year(month, day, year)?.and_time(NaiveTime::MIN))
    }
}

fn date_in_year(month: &str, day: &str, year: i32) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{month} {day} {year}"), "%b %d %Y").ok()
}
