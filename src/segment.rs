//! Active segment management: append-with-roll-over.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam::channel::Sender;

use crate::error::Result;
use crate::layout::seg_path;

struct ActiveSegment {
    id: u64,
    file: File,
    len: u64,
}

/// Owns the active segment and serializes all appends to it. Rolls over to
/// a fresh segment once the active one reaches `seg_size_limit`, signaling
/// the compactor each time.
pub struct SegmentWriter {
    dir: PathBuf,
    seg_size_limit: u64,
    active: Mutex<Option<ActiveSegment>>,
    last_ingest_id: AtomicU64,
    compact_signal: Sender<()>,
}

impl SegmentWriter {
    /// `resume_id`, when given, is the id of an already-active (existing,
    /// not yet size-checked) segment found on open; appends reuse it until
    /// it saturates rather than always starting a fresh segment.
    pub fn new(
        dir: PathBuf,
        seg_size_limit: u64,
        resume_id: Option<u64>,
        compact_signal: Sender<()>,
    ) -> Result<Self> {
        let active = match resume_id {
            Some(id) => {
                let file = OpenOptions::new().append(true).read(true).open(seg_path(&dir, id))?;
                let len = file.metadata()?.len();
                Some(ActiveSegment { id, file, len })
            }
            None => None,
        };
        Ok(SegmentWriter {
            dir,
            seg_size_limit,
            active: Mutex::new(active),
            last_ingest_id: AtomicU64::new(resume_id.unwrap_or(0)),
            compact_signal,
        })
    }

    /// Allocates a strictly-increasing ingest-space segment id. Ingest ids
    /// are nanosecond timestamps, bumped by one whenever the clock doesn't
    /// advance between two calls, so concurrent roll-overs never collide.
    fn next_ingest_id(&self) -> u64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64;
        loop {
            let prev = self.last_ingest_id.load(Ordering::SeqCst);
            let next = now.max(prev + 1);
            if self
                .last_ingest_id
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Appends an encoded record frame to the active segment, rolling over
    /// first if needed. Returns `(file_id, value_offset_absolute)`, where
    /// `value_offset_absolute` is meaningless for tombstones (the caller
    /// ignores it in that case).
    pub fn append(&self, frame: &[u8], value_offset_in_frame: usize, sync_on_write: bool) -> Result<(u64, u64)> {
        let mut guard = self.active.lock().unwrap();

        let needs_roll_over = match guard.as_ref() {
            None => true,
            Some(active) => active.len >= self.seg_size_limit,
        };
        if needs_roll_over {
            let id = self.next_ingest_id();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .read(true)
                .open(seg_path(&self.dir, id))?;
            log::info!("rolled over active segment to {}", crate::layout::seg_file_name(id));
            *guard = Some(ActiveSegment { id, file, len: 0 });
            // Best-effort: if the compactor is already busy or between
            // ticks, it'll pick up frozen segments on its next signal.
            let _ = self.compact_signal.try_send(());
        }

        let active = guard.as_mut().expect("just ensured Some");
        let pos = active.len;
        use std::io::Write;
        active.file.write_all(frame)?;
        if sync_on_write {
            active.file.sync_all()?;
        }
        active.len += frame.len() as u64;

        let value_offset_absolute = pos + value_offset_in_frame as u64;
        Ok((active.id, value_offset_absolute))
    }

    /// Flushes and fsyncs the active segment, if any.
    pub fn sync(&self) -> Result<()> {
        if let Some(active) = self.active.lock().unwrap().as_ref() {
            active.file.sync_all()?;
        }
        Ok(())
    }

    /// The id of the currently active segment, if one has been created yet.
    pub fn active_id(&self) -> Option<u64> {
        self.active.lock().unwrap().as_ref().map(|a| a.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_record;

    fn signal() -> (Sender<()>, crossbeam::channel::Receiver<()>) {
        crossbeam::channel::unbounded()
    }

    #[test]
    fn appends_and_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = signal();
        let writer = SegmentWriter::new(dir.path().to_path_buf(), 32, None, tx).unwrap();

        let (frame, off) = encode_record(1, b"k1", Some(b"v1")).unwrap();
        let (id1, _) = writer.append(&frame, off, false).unwrap();

        let (frame, off) = encode_record(2, b"k2", Some(b"v2")).unwrap();
        let (id2, _) = writer.append(&frame, off, false).unwrap();

        // 32-byte limit is smaller than one record, so every append rolls over.
        assert_ne!(id1, id2);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn stays_on_active_segment_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = signal();
        let writer = SegmentWriter::new(dir.path().to_path_buf(), 1024 * 1024, None, tx).unwrap();

        let (frame, off) = encode_record(1, b"k1", Some(b"v1")).unwrap();
        let (id1, offset1) = writer.append(&frame, off, false).unwrap();
        let (frame2, off2) = encode_record(2, b"k2", Some(b"v2")).unwrap();
        let (id2, offset2) = writer.append(&frame2, off2, false).unwrap();

        assert_eq!(id1, id2);
        assert!(offset2 > offset1);
    }
}
