//! Long-form listing line parser

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{GridError, Result};

// Field grammar of one `gfls -l` line:
//   inode mode links owner group size month day HH:MM:SS year name
// The name is the remainder of the line and may contain whitespace.
static ENTRY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(\d+)\s+([-dl]\S+)\s+(\d+)\s+(\S+)\s+(\S+)\s+(\d+)\s+(\S+\s+\d+\s+\d+:\d+:\d+\s+\d+)\s+(.+)$",
    )
    .expect("listing grammar compiles")
});

/// Entry classification, determined by the first character of the mode
/// string alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Plain file (`-`)
    File,
    /// Directory (`d`)
    Directory,
    /// Symbolic link (`l`)
    Link,
}

/// One structured directory entry decoded from a listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Inode number
    pub inode: u64,
    /// Mode string, e.g. `-rw-rw-r--`
    pub mode: String,
    /// Hard link count
    pub links: u64,
    /// Owning user
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Size in bytes
    pub size: i64,
    /// Modification timestamp, kept as the raw `month day HH:MM:SS year`
    /// text (the wire format is pass-through)
    pub mtime: String,
    /// Entry name, including any embedded whitespace
    pub name: String,
}

impl ListingEntry {
    /// Classify the entry from its mode string.
    pub fn kind(&self) -> EntryKind {
        match self.mode.as_bytes().first() {
            Some(b'd') => EntryKind::Directory,
            Some(b'l') => EntryKind::Link,
            _ => EntryKind::File,
        }
    }

    /// True for plain files.
    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }
}

/// Parse one listing line.
///
/// Lines that do not match the grammar parse to `Ok(None)`; this tolerates
/// diagnostic lines mixed into the output. A line that matches the grammar
/// but carries an out-of-range numeric field fails with
/// [`GridError::MalformedListing`] for that line only.
pub fn parse_entry(line: &str) -> Result<Option<ListingEntry>> {
    let Some(caps) = ENTRY_PATTERN.captures(line) else {
        return Ok(None);
    };

    let number = |index: usize, field: &'static str| -> Result<u64> {
        caps[index].parse().map_err(|_| GridError::MalformedListing {
            field,
            line: line.to_string(),
        })
    };

    let inode = number(1, "inode")?;
    let links = number(3, "links")?;
    let size = number(6, "size")? as i64;

    Ok(Some(ListingEntry {
        inode,
        mode: caps[2].to_string(),
        links,
        owner: caps[4].to_string(),
        group: caps[5].to_string(),
        size,
        mtime: caps[7].to_string(),
        name: caps[8].to_string(),
    }))
}
