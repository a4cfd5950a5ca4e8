//! Rebuilds the in-memory index from segments and hints at open time.

use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::codec::{decode_hint, decode_record};
use crate::error::{Error, Result};
use crate::index::{Candidate, Index};
use crate::layout::{self, seg_path};

/// Scans every segment in `dir`, newest-id-first, applying hint-derived or
/// segment-derived entries to `index`. `active_id` is the id of the
/// segment currently accepting writes, if any — corruption found in its
/// final record is treated as a partial write and repaired by truncation
/// rather than failing recovery.
pub fn recover(dir: &Path, index: &Index, active_id: Option<u64>) -> Result<()> {
    let segment_ids = layout::list_segment_ids(dir)?;
    for id in segment_ids {
        let is_active = Some(id) == active_id;
        if layout::has_hint(dir, id) {
            match scan_hint(dir, id, index) {
                Ok(()) => continue,
                Err(err) => {
                    log::warn!(
                        "hint for segment {} is corrupt ({err}), falling back to segment scan",
                        layout::seg_file_name(id)
                    );
                }
            }
        }
        scan_segment(dir, id, index, is_active)?;
    }
    Ok(())
}

fn scan_hint(dir: &Path, id: u64, index: &Index) -> Result<()> {
    let path = layout::companion_hint_path(dir, id);
    let data = fs::read(&path)?;
    let mut entries = Vec::new();

    let mut pos = 0usize;
    while pos < data.len() {
        let rel = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| Error::CorruptRecord("hint has an incomplete trailing entry".into()))?;
        let line = &data[pos..pos + rel + 1];
        let entry = decode_hint(line)?;
        entries.push(entry);
        pos += rel + 1;
    }

    // Only apply once the whole hint file is known-good: partial
    // application followed by a fallback segment scan could double-apply
    // stale entries out of order.
    for entry in entries {
        index.update(&entry.key, Candidate {
            file_id: id,
            value_offset: entry.value_offset,
            value_size: entry.value_size,
            timestamp: entry.timestamp,
        });
    }
    Ok(())
}

fn scan_segment(dir: &Path, id: u64, index: &Index, is_active: bool) -> Result<()> {
    let path = seg_path(dir, id);
    let data = fs::read(&path)?;
    let mut pos = 0usize;

    while pos < data.len() {
        match data[pos..].iter().position(|&b| b == b'\n') {
            Some(rel) => {
                let line_end = pos + rel + 1;
                let line = &data[pos..line_end];
                match decode_record(line) {
                    Ok((record, value_offset_in_frame)) => {
                        let value_offset_absolute = pos as u64 + value_offset_in_frame as u64;
                        let value_size = record.value.as_ref().map_or(0, |v| v.len());
                        index.update(&record.key, Candidate {
                            file_id: id,
                            value_offset: value_offset_absolute,
                            value_size,
                            timestamp: record.timestamp,
                        });
                        pos = line_end;
                    }
                    Err(err) => {
                        // A corrupt-but-newline-terminated record with bytes
                        // still following it can't be a partial write in
                        // progress — whatever comes after it is complete
                        // data that would otherwise be silently discarded.
                        // Only forgive when nothing trails the bad record.
                        let has_trailing_data = line_end < data.len();
                        return handle_corrupt(&path, pos, id, is_active && !has_trailing_data, err);
                    }
                }
            }
            None => {
                return handle_corrupt(
                    &path,
                    pos,
                    id,
                    is_active,
                    Error::CorruptRecord("incomplete trailing record".into()),
                );
            }
        }
    }
    Ok(())
}

fn handle_corrupt(path: &Path, pos: usize, id: u64, forgivable: bool, err: Error) -> Result<()> {
    if forgivable {
        log::warn!(
            "truncating active segment {} at offset {pos} due to a partial write: {err}",
            layout::seg_file_name(id)
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(pos as u64)?;
        Ok(())
    } else {
        Err(Error::CorruptRecord(format!(
            "segment {} at offset {pos}: {err}",
            layout::seg_file_name(id)
        )))
    }
}
