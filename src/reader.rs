//! Positioned reads of a value using an index entry. The index entry
//! alone suffices: the read path never re-parses the surrounding record
//! frame.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;
use crate::index::IndexEntry;
use crate::layout::seg_path;

/// Reads exactly `entry.value_size` bytes from `entry.file_id`'s segment,
/// starting at `entry.value_offset`.
pub fn read_value(dir: &Path, entry: &IndexEntry) -> Result<Vec<u8>> {
    let mut file = File::open(seg_path(dir, entry.file_id))?;
    file.seek(SeekFrom::Start(entry.value_offset))?;
    let mut buf = vec![0u8; entry.value_size];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_record;
    use std::io::Write;

    #[test]
    fn reads_exact_value_region() {
        let dir = tempfile::tempdir().unwrap();
        let (frame, value_offset) = encode_record(1, b"k", Some(b"hello world")).unwrap();
        std::fs::write(seg_path(dir.path(), 1), &frame).unwrap();

        let entry = IndexEntry { file_id: 1, value_offset: value_offset as u64, value_size: 11, timestamp: 1 };
        assert_eq!(read_value(dir.path(), &entry).unwrap(), b"hello world");
    }

    #[test]
    fn reads_value_amid_other_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(seg_path(dir.path(), 1)).unwrap();
        let (frame1, _) = encode_record(1, b"a", Some(b"one")).unwrap();
        file.write_all(&frame1).unwrap();
        let (frame2, off2) = encode_record(2, b"b", Some(b"two")).unwrap();
        let base = frame1.len() as u64;
        file.write_all(&frame2).unwrap();
        drop(file);

        let entry = IndexEntry { file_id: 1, value_offset: base + off2 as u64, value_size: 3, timestamp: 2 };
        assert_eq!(read_value(dir.path(), &entry).unwrap(), b"two");
    }
}
