//! Parsing of `git-lfs locks` listing output.
//!
//! Two line shapes are accepted, depending on how the hosting service reports
//! lock owners:
//!
//! ```text
//! Assets/foo.png   	username                	ID:123456
//! Assets/foobar.png	Foo Bar (fbar@example.com)	ID:123456
//! ```
//!
//! Cloud services print a bare handle; self-hosted services print a display
//! name with the handle embedded in an email address, from which only the
//! part before `@` is kept. Fields are column-aligned, so each one may carry
//! trailing whitespace before its tab separator; all fields are trimmed and
//! the `ID:` prefix is stripped.
//!
//! A line matching neither shape is a parse error. The listing consumer drops
//! malformed lines and keeps the rest (partial success beats aborting a whole
//! refresh), surfacing a count of dropped lines for the host to log.

use crate::error::{LockwatchError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Self-hosted shape: `path \t Display Name (handle@domain) \t ID:123`.
///
/// Tried first because its owner field would also satisfy the plain shape's
/// separator structure in pathological backtracking cases.
static SELF_HOSTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+?)\s*\t[^\t]*\((?P<user>[^@\s)]+)@[^)]*\)\s*\tID:(?P<id>\S+)\s*$")
        .expect("self-hosted lock line regex is valid")
});

/// Cloud shape: `path \t handle \t ID:123`.
static PLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+?)\s*\t(?P<user>\S+)\s*\tID:(?P<id>\S+)\s*$")
        .expect("plain lock line regex is valid")
});

/// One lock line reduced to its canonical fields.
///
/// The asset identifier is deliberately absent: resolving a path to a stable
/// id requires the host's asset index and is done by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLock {
    /// Repository-relative asset path.
    pub path: String,

    /// Bare handle of the lock owner.
    pub holder: String,

    /// Remote lock identifier with the `ID:` prefix stripped.
    pub lock_id: String,
}

/// Parse one listing line into its canonical fields.
pub fn parse_lock_line(line: &str) -> Result<ParsedLock> {
    let captures = SELF_HOSTED
        .captures(line)
        .or_else(|| PLAIN.captures(line))
        .ok_or_else(|| LockwatchError::Parse(line.to_string()))?;

    Ok(ParsedLock {
        path: captures["path"].trim().to_string(),
        holder: captures["user"].trim().to_string(),
        lock_id: captures["id"].trim().to_string(),
    })
}

/// Parse a whole listing, dropping malformed lines.
///
/// Returns the successfully parsed locks and the number of dropped lines.
pub fn parse_listing<'a, I>(lines: I) -> (Vec<ParsedLock>, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut locks = Vec::new();
    let mut dropped = 0usize;
    for line in lines {
        match parse_lock_line(line) {
            Ok(lock) => locks.push(lock),
            Err(_) => dropped += 1,
        }
    }
    (locks, dropped)
}
