//! Remote objects discovered while walking an FTP tree

use crate::error::{MirrorError, Result};
use crate::listing::{self, DirectoryEntry, EntryKind};
use chrono::{Local, NaiveDateTime, TimeZone};
use std::time::SystemTime;

/// A remote file and the place it was found
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub entry: DirectoryEntry,
    /// `/`-separated path below the traversal root, empty at the root
    pub relative_directory: String,
    finished: bool,
}

/// A remote directory and the place it was found
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDirectory {
    pub entry: DirectoryEntry,
    pub relative_directory: String,
    /// Full remote path, always ending in `/`
    uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteObject {
    File(RemoteFile),
    Directory(RemoteDirectory),
}

impl RemoteFile {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn uri(&self) -> &str {
        &self.entry.uri
    }

    pub fn size(&self) -> u64 {
        self.entry.size
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
    }

    /// Remote path relative to the traversal root, e.g. `d/b.txt`
    pub fn relative_path(&self) -> String {
        listing::join_uri(&self.relative_directory, self.name())
    }
}

impl RemoteDirectory {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The remote path without the trailing separator, as FTP commands want it
    pub fn path(&self) -> &str {
        self.uri.trim_end_matches('/')
    }

    /// This directory's own path below the traversal root
    pub fn relative_path(&self) -> String {
        listing::join_uri(&self.relative_directory, self.name())
    }
}

impl RemoteObject {
    /// Parse one listing line found under `base_uri`
    pub fn parse(line: &str, base_uri: &str) -> Result<Self> {
        Ok(Self::from_entry(listing::parse_line(line, base_uri)?))
    }

    pub fn from_entry(entry: DirectoryEntry) -> Self {
        match entry.kind {
            EntryKind::File => RemoteObject::File(RemoteFile {
                entry,
                relative_directory: String::new(),
                finished: false,
            }),
            EntryKind::Directory => {
                let uri = format!("{}/", entry.uri.trim_end_matches('/'));
                RemoteObject::Directory(RemoteDirectory {
                    entry,
                    relative_directory: String::new(),
                    uri,
                })
            }
        }
    }

    pub fn with_relative_directory(mut self, relative: &str) -> Self {
        match &mut self {
            RemoteObject::File(f) => f.relative_directory = relative.to_string(),
            RemoteObject::Directory(d) => d.relative_directory = relative.to_string(),
        }
        self
    }

    pub fn entry(&self) -> &DirectoryEntry {
        match self {
            RemoteObject::File(f) => &f.entry,
            RemoteObject::Directory(d) => &d.entry,
        }
    }

    pub fn name(&self) -> &str {
        &self.entry().name
    }

    pub fn uri(&self) -> &str {
        match self {
            RemoteObject::File(f) => f.uri(),
            RemoteObject::Directory(d) => d.uri(),
        }
    }

    pub fn relative_directory(&self) -> &str {
        match self {
            RemoteObject::File(f) => &f.relative_directory,
            RemoteObject::Directory(d) => &d.relative_directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, RemoteObject::Directory(_))
    }

    pub fn as_file(&self) -> Option<&RemoteFile> {
        match self {
            RemoteObject::File(f) => Some(f),
            RemoteObject::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&RemoteDirectory> {
        match self {
            RemoteObject::Directory(d) => Some(d),
            RemoteObject::File(_) => None,
        }
    }

    /// The listing timestamp as a local system time
    pub fn listed_time(&self) -> Result<SystemTime> {
        local_system_time(self.entry().modified_at)
    }
}

/// Split a listing into its files and directories, preserving order
pub fn partition(objects: Vec<RemoteObject>) -> (Vec<RemoteFile>, Vec<RemoteDirectory>) {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for object in objects {
        match object {
            RemoteObject::File(f) => files.push(f),
            RemoteObject::Directory(d) => dirs.push(d),
        }
    }
    (files, dirs)
}

/// Listing timestamps carry no zone; they are read as local time
pub fn local_system_time(naive: NaiveDateTime) -> Result<SystemTime> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(SystemTime::from)
        .ok_or_else(|| {
            MirrorError::malformed(&naive.to_string(), "timestamp does not exist in local time")
        })
}
