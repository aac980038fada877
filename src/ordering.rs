//! Sort criteria for the lock table.
//!
//! The table is always fully re-sorted after a refresh or an explicit sort
//! action; there is no incremental ordering. The interesting part is the path
//! comparator: plain natural ordering (case-insensitive, digit runs compared
//! by numeric value) with directory-before-file precedence injected at the
//! first divergent character. How aggressively directories are promoted is a
//! platform convention, kept as an explicit [`PathOrderingPolicy`] instead of
//! a `cfg!` branch so both conventions are testable on any host.

use crate::table::LockRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Primary sort key for the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Lock owner handle; ties break by path.
    Holder,
    /// Repository-relative asset path.
    #[default]
    Path,
    /// Remote lock identifier.
    LockId,
}

/// A sort selection: key plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Path,
            ascending: true,
        }
    }
}

/// Directory-precedence convention for path comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrderingPolicy {
    /// Directories always sort above files in the same parent directory, and
    /// between two directories a bare separator at the divergence point sorts
    /// first of all (`Foo/` < `Foo 1/` < `Foo 10/`).
    WindowsStyle,
    /// Directories sort above files only when both share an identical name up
    /// to the separator (`Foo/` < `Foo`); any other divergence falls through
    /// to plain natural order.
    PosixStyle,
}

impl PathOrderingPolicy {
    /// The convention matching the host platform.
    pub fn host_default() -> Self {
        if cfg!(windows) {
            PathOrderingPolicy::WindowsStyle
        } else {
            PathOrderingPolicy::PosixStyle
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Compare two lock records under the given spec and path policy.
///
/// Descending order compares with the operands swapped rather than negating
/// the result. The comparators below are antisymmetric, so the two approaches
/// are equivalent; swapping is used to keep the tie-break chain identical in
/// both directions.
pub fn compare_records(
    a: &LockRecord,
    b: &LockRecord,
    spec: SortSpec,
    policy: PathOrderingPolicy,
) -> Ordering {
    let (x, y) = if spec.ascending { (a, b) } else { (b, a) };
    match spec.key {
        SortKey::Holder => natural_compare(&x.holder, &y.holder)
            .then_with(|| path_compare(&x.path, &y.path, policy)),
        SortKey::Path => path_compare(&x.path, &y.path, policy),
        SortKey::LockId => natural_compare(&x.lock_id, &y.lock_id),
    }
}

/// Natural string comparison: case-insensitive, with embedded digit runs
/// compared by numeric value ("v9" < "v10").
///
/// When two strings differ only in case or in leading zeros, the plain string
/// comparison decides, which keeps the function antisymmetric and total.
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let mut i = 0;
    let mut j = 0;

    while i < a_chars.len() && j < b_chars.len() {
        let ca = a_chars[i];
        let cb = b_chars[j];

        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let a_run = digit_run(&a_chars, &mut i);
            let b_run = digit_run(&b_chars, &mut j);
            let ordering = compare_digit_runs(a_run, b_run);
            if ordering != Ordering::Equal {
                return ordering;
            }
            continue;
        }

        let la = ca.to_lowercase().next().unwrap_or(ca);
        let lb = cb.to_lowercase().next().unwrap_or(cb);
        if la != lb {
            return la.cmp(&lb);
        }
        i += 1;
        j += 1;
    }

    // One string is a (case-insensitive) prefix of the other: shorter first.
    match (a_chars.len() - i).cmp(&(b_chars.len() - j)) {
        Ordering::Equal => a.cmp(b),
        ordering => ordering,
    }
}

/// Advance past a digit run and return it.
fn digit_run<'a>(chars: &'a [char], index: &mut usize) -> &'a [char] {
    let start = *index;
    while *index < chars.len() && chars[*index].is_ascii_digit() {
        *index += 1;
    }
    &chars[start..*index]
}

/// Compare two digit runs by numeric value without overflow: strip leading
/// zeros, then longer run wins, then lexical order decides.
fn compare_digit_runs(a: &[char], b: &[char]) -> Ordering {
    let a_trimmed = trim_leading_zeros(a);
    let b_trimmed = trim_leading_zeros(b);
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
}

fn trim_leading_zeros(run: &[char]) -> &[char] {
    let first_nonzero = run.iter().position(|&c| c != '0').unwrap_or(run.len());
    &run[first_nonzero..]
}

/// Compare two repository paths under the given directory-precedence policy.
///
/// The scan walks both strings to the first differing character. At that
/// point the policy may short-circuit with directory precedence; otherwise
/// the comparison falls through to [`natural_compare`] over the full strings.
pub fn path_compare(x: &str, y: &str, policy: PathOrderingPolicy) -> Ordering {
    let x_chars: Vec<char> = x.chars().collect();
    let y_chars: Vec<char> = y.chars().collect();
    let min_len = x_chars.len().min(y_chars.len());

    for i in 0..min_len {
        let cx = x_chars[i];
        let cy = y_chars[i];
        if cx == cy {
            continue;
        }

        if policy == PathOrderingPolicy::WindowsStyle {
            let x_is_dir = is_separator(x_chars[next_separator(&x_chars, i)]);
            let y_is_dir = is_separator(y_chars[next_separator(&y_chars, i)]);

            if x_is_dir && y_is_dir {
                // Between two directories a bare separator at the divergence
                // sorts first, which puts "Foo/" above "Foo 1/" even though
                // natural order alone would not.
                if is_separator(cx) {
                    return Ordering::Less;
                }
                if is_separator(cy) {
                    return Ordering::Greater;
                }
            }
            if x_is_dir && !y_is_dir {
                return Ordering::Less;
            }
            if y_is_dir && !x_is_dir {
                return Ordering::Greater;
            }
        }
        break;
    }

    if policy == PathOrderingPolicy::PosixStyle {
        // Directory precedence only for an identical name up to the
        // separator: "Foo/..." sorts above a file named exactly "Foo".
        if x_chars.len() > min_len
            && y_chars.len() == min_len
            && is_separator(x_chars[min_len])
            && x_chars[..min_len] == y_chars[..]
        {
            return Ordering::Less;
        }
        if y_chars.len() > min_len
            && x_chars.len() == min_len
            && is_separator(y_chars[min_len])
            && y_chars[..min_len] == x_chars[..]
        {
            return Ordering::Greater;
        }
    }

    natural_compare(x, y)
}

/// Index of the next path separator at or after `start`; when the string has
/// no further separator, the last character's index is returned so the caller
/// ends up classifying the entry as a file.
fn next_separator(chars: &[char], start: usize) -> usize {
    for (offset, &c) in chars[start..].iter().enumerate() {
        if is_separator(c) {
            return start + offset;
        }
    }
    chars.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use PathOrderingPolicy::{PosixStyle, WindowsStyle};

    fn record(path: &str, holder: &str, id: &str) -> LockRecord {
        LockRecord {
            path: path.to_string(),
            asset_id: String::new(),
            holder: holder.to_string(),
            lock_id: id.to_string(),
            is_pending: false,
        }
    }

    #[test]
    fn test_natural_compare_digit_runs_by_value() {
        assert_eq!(natural_compare("v9", "v10"), Ordering::Less);
        assert_eq!(natural_compare("v10", "v9"), Ordering::Greater);
        assert_eq!(natural_compare("file2", "file2"), Ordering::Equal);
    }

    #[test]
    fn test_natural_compare_case_insensitive() {
        assert_eq!(natural_compare("alpha", "BETA"), Ordering::Less);
        assert_eq!(natural_compare("BETA", "alpha"), Ordering::Greater);
    }

    #[test]
    fn test_natural_compare_prefix_sorts_first() {
        assert_eq!(natural_compare("Foo", "Foo 1"), Ordering::Less);
        assert_eq!(natural_compare("Foo 1", "Foo 10"), Ordering::Less);
    }

    #[test]
    fn test_natural_compare_is_antisymmetric_on_case_ties() {
        // "Abc" and "abc" are equal ignoring case; plain order decides, and
        // the two directions must agree.
        let forward = natural_compare("Abc", "abc");
        let backward = natural_compare("abc", "Abc");
        assert_eq!(forward, backward.reverse());
        assert_ne!(forward, Ordering::Equal);
    }

    #[test]
    fn test_windows_directories_sort_by_separator_at_divergence() {
        let mut paths = vec!["Foo 10/c.png", "Foo 1/b.png", "Foo/a.png"];
        paths.sort_by(|x, y| path_compare(x, y, WindowsStyle));
        assert_eq!(paths, vec!["Foo/a.png", "Foo 1/b.png", "Foo 10/c.png"]);
    }

    #[test]
    fn test_plain_files_sort_in_natural_numeric_order() {
        for policy in [WindowsStyle, PosixStyle] {
            let mut paths = vec!["Foo 10", "Foo 1", "Foo"];
            paths.sort_by(|x, y| path_compare(x, y, policy));
            assert_eq!(paths, vec!["Foo", "Foo 1", "Foo 10"]);
        }
    }

    #[test]
    fn test_windows_directory_ranks_above_same_prefix_file() {
        assert_eq!(
            path_compare("Foo/", "Foo 1.png", WindowsStyle),
            Ordering::Less
        );
        assert_eq!(
            path_compare("Foo 1.png", "Foo/", WindowsStyle),
            Ordering::Greater
        );
    }

    #[test]
    fn test_posix_does_not_reorder_same_prefix_file() {
        // Natural order puts "Foo 1.png" first (' ' < '/'), and the posix
        // policy leaves that alone because the names differ.
        assert_eq!(
            path_compare("Foo/", "Foo 1.png", PosixStyle),
            Ordering::Greater
        );
        assert_eq!(
            path_compare("Foo 1.png", "Foo/", PosixStyle),
            Ordering::Less
        );
    }

    #[test]
    fn test_posix_directory_above_identically_named_file() {
        assert_eq!(path_compare("Foo/a.png", "Foo", PosixStyle), Ordering::Less);
        assert_eq!(
            path_compare("Foo", "Foo/a.png", PosixStyle),
            Ordering::Greater
        );
    }

    #[test]
    fn test_windows_directory_above_files_in_same_parent() {
        let mut paths = vec!["Assets/zebra.png", "Assets/sub/a.png", "Assets/apple.png"];
        paths.sort_by(|x, y| path_compare(x, y, WindowsStyle));
        assert_eq!(
            paths,
            vec!["Assets/sub/a.png", "Assets/apple.png", "Assets/zebra.png"]
        );
    }

    #[test]
    fn test_backslash_counts_as_separator() {
        assert_eq!(
            path_compare("Foo\\a.png", "Foo 1.png", WindowsStyle),
            Ordering::Less
        );
    }

    #[test]
    fn test_sort_by_holder_breaks_ties_by_path() {
        let a = record("Assets/b.png", "jdoe", "2");
        let b = record("Assets/a.png", "jdoe", "1");
        let spec = SortSpec {
            key: SortKey::Holder,
            ascending: true,
        };
        assert_eq!(
            compare_records(&a, &b, spec, PosixStyle),
            Ordering::Greater
        );
    }

    #[test]
    fn test_sort_by_lock_id_is_natural() {
        let a = record("x", "u", "9");
        let b = record("y", "u", "10");
        let spec = SortSpec {
            key: SortKey::LockId,
            ascending: true,
        };
        assert_eq!(compare_records(&a, &b, spec, PosixStyle), Ordering::Less);
    }

    #[test]
    fn test_descending_swaps_operands() {
        let a = record("Assets/a.png", "u", "1");
        let b = record("Assets/b.png", "u", "2");
        let ascending = SortSpec {
            key: SortKey::Path,
            ascending: true,
        };
        let descending = SortSpec {
            key: SortKey::Path,
            ascending: false,
        };
        assert_eq!(
            compare_records(&a, &b, ascending, PosixStyle),
            compare_records(&a, &b, descending, PosixStyle).reverse()
        );
    }

    #[test]
    fn test_default_sort_spec_is_path_ascending() {
        let spec = SortSpec::default();
        assert_eq!(spec.key, SortKey::Path);
        assert!(spec.ascending);
    }
}
