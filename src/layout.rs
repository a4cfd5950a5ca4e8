//! Directory scanning, filename parsing, and the segment/hint companion
//! mapping.

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::error::Result;

pub const SEG_PREFIX: &str = "seg";
pub const HINT_PREFIX: &str = "hint";
const DELIMITER: char = '_';

/// Parses a `seg_<id>` or `hint_<id>` file name, returning its numeric id.
/// Returns `None` for names that don't match the expected shape (e.g. the
/// lock file, or anything else an embedder might drop into the directory).
pub fn parse_id(file_name: &str, prefix: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix(DELIMITER)?;
    rest.parse::<u64>().ok()
}

pub fn seg_file_name(id: u64) -> String {
    format!("{SEG_PREFIX}{DELIMITER}{id}")
}

pub fn hint_file_name(id: u64) -> String {
    format!("{HINT_PREFIX}{DELIMITER}{id}")
}

/// Returns the companion hint path for a segment id.
pub fn companion_hint_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(hint_file_name(id))
}

/// Returns the segment path for an id.
pub fn seg_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(seg_file_name(id))
}

/// Lists all `seg_<id>` ids present in `dir`, sorted numerically descending
/// (newest-id-first).
pub fn list_segment_ids(dir: &Path) -> Result<Vec<u64>> {
    list_ids(dir, SEG_PREFIX)
}

/// Lists all `hint_<id>` ids present in `dir`, sorted newest-id-first.
pub fn list_hint_ids(dir: &Path) -> Result<Vec<u64>> {
    list_ids(dir, HINT_PREFIX)
}

fn list_ids(dir: &Path, prefix: &str) -> Result<Vec<u64>> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    let ids = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| parse_id(&name, prefix))
        .sorted_by(|a, b| b.cmp(a))
        .collect();
    Ok(ids)
}

/// True if a hint file exists for segment `id`.
pub fn has_hint(dir: &Path, id: u64) -> bool {
    companion_hint_path(dir, id).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids() {
        assert_eq!(parse_id("seg_42", SEG_PREFIX), Some(42));
        assert_eq!(parse_id("hint_42", HINT_PREFIX), Some(42));
        assert_eq!(parse_id("seg_42", HINT_PREFIX), None);
        assert_eq!(parse_id("LOCK", SEG_PREFIX), None);
        assert_eq!(parse_id("seg_notanumber", SEG_PREFIX), None);
    }

    #[test]
    fn lists_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for id in [5, 1, 9, 3] {
            std::fs::write(seg_path(dir.path(), id), b"").unwrap();
        }
        assert_eq!(list_segment_ids(dir.path()).unwrap(), vec![9, 5, 3, 1]);
    }

    #[test]
    fn companion_paths_round_trip() {
        let dir = PathBuf::from("/data");
        assert_eq!(companion_hint_path(&dir, 7), dir.join("hint_7"));
        assert_eq!(seg_path(&dir, 7), dir.join("seg_7"));
    }
}
