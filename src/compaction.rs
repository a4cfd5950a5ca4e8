//! Merges frozen segments into denser segment+hint pairs, reclaiming the
//! space held by superseded values and tombstones.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::codec::{decode_record, encode_hint, encode_record, HintEntry};
use crate::error::Result;
use crate::index::{Candidate, Index};
use crate::layout::{self, seg_path};
use crate::segment::SegmentWriter;

/// Compacted segments are given ids in this base offset plus a persisted,
/// monotonically increasing generation counter. A real clock reading for
/// "now" in nanoseconds since the epoch is on the order of 1.7e18 today and
/// only grows, while this base leaves ~10^12 generations of headroom before
/// ever approaching that range, so compacted ids never collide with
/// ingest-space ids.
const COMPACT_ID_BASE: u64 = 1_000_000_000_000;

const SEQ_FILE_NAME: &str = "compactor_seq";

/// Runs at most one compaction at a time; a concurrent attempt that finds
/// the lock held exits immediately rather than queuing.
pub struct Compactor {
    dir: PathBuf,
    seg_size_limit: u64,
    min_compact_segments: usize,
    running: Mutex<()>,
}

impl Compactor {
    pub fn new(dir: PathBuf, seg_size_limit: u64, min_compact_segments: usize) -> Self {
        Compactor { dir, seg_size_limit, min_compact_segments, running: Mutex::new(()) }
    }

    /// Attempts to run a compaction pass. Returns immediately, without
    /// error, if another compaction is already running or there aren't
    /// enough frozen segments yet.
    pub fn try_run(&self, index: &Index, writer: &SegmentWriter) -> Result<()> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(()),
        };

        let active_id = writer.active_id();
        let frozen_ids: Vec<u64> = layout::list_segment_ids(&self.dir)?
            .into_iter()
            .filter(|id| Some(*id) != active_id)
            .collect();
        if frozen_ids.len() < self.min_compact_segments {
            return Ok(());
        }

        log::info!("compaction starting over {} frozen segments", frozen_ids.len());
        let before: u64 = frozen_ids.iter().map(|id| segment_size(&self.dir, *id)).sum();

        let mut output = CompactionOutput::allocate(&self.dir, self.seg_size_limit, self.next_id()?)?;
        for seg_id in &frozen_ids {
            self.compact_segment(*seg_id, index, &mut output)?;
            remove_segment(&self.dir, *seg_id)?;
        }
        output.finish()?;

        let after: u64 = output.produced_ids.iter().map(|id| segment_size(&self.dir, *id)).sum();
        log::info!(
            "compaction done: {} segments ({before} bytes) -> {} segments ({after} bytes)",
            frozen_ids.len(),
            output.produced_ids.len()
        );
        Ok(())
    }

    fn next_id(&self) -> Result<u64> {
        let path = self.dir.join(SEQ_FILE_NAME);
        let current: u64 = fs::read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        fs::write(&path, next.to_string())?;
        Ok(COMPACT_ID_BASE + next)
    }

    /// Scans one frozen segment, copying forward only records the index
    /// still attributes to this exact `(file_id, timestamp)`. A per-record
    /// CRC failure is logged and skipped rather than aborting the whole
    /// merge — the live value, if any, is necessarily found in some other
    /// file.
    fn compact_segment(&self, seg_id: u64, index: &Index, output: &mut CompactionOutput) -> Result<()> {
        let data = fs::read(seg_path(&self.dir, seg_id))?;
        let mut pos = 0usize;
        while pos < data.len() {
            let Some(rel) = data[pos..].iter().position(|&b| b == b'\n') else { break };
            let line = &data[pos..pos + rel + 1];
            pos += rel + 1;

            let (record, _) = match decode_record(line) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::warn!("skipping corrupt record in segment {seg_id} during compaction: {err}");
                    continue;
                }
            };
            let Some(value) = record.value.as_deref() else { continue }; // tombstones never live

            let is_live = index
                .get(&record.key)
                .is_some_and(|entry| entry.file_id == seg_id && entry.timestamp == record.timestamp);
            if !is_live {
                continue;
            }

            let (new_file_id, value_offset) =
                output.append(|| self.next_id(), record.timestamp, &record.key, value)?;
            index.redirect_if_unchanged(&record.key, seg_id, record.timestamp, Candidate {
                file_id: new_file_id,
                value_offset,
                value_size: value.len(),
                timestamp: record.timestamp,
            });
        }
        Ok(())
    }
}

fn segment_size(dir: &Path, id: u64) -> u64 {
    fs::metadata(seg_path(dir, id)).map(|m| m.len()).unwrap_or(0)
}

fn remove_segment(dir: &Path, id: u64) -> Result<()> {
    let seg = seg_path(dir, id);
    if seg.is_file() {
        fs::remove_file(seg)?;
    }
    let hint = layout::companion_hint_path(dir, id);
    if hint.is_file() {
        fs::remove_file(hint)?;
    }
    Ok(())
}

/// The (segment, hint) pair(s) compaction is currently writing to. Rolls
/// over to a fresh pair mid-merge if the segment crosses the size limit.
struct CompactionOutput {
    dir: PathBuf,
    seg_size_limit: u64,
    seg_id: u64,
    seg_file: File,
    hint_file: File,
    seg_len: u64,
    produced_ids: Vec<u64>,
}

impl CompactionOutput {
    fn allocate(dir: &Path, seg_size_limit: u64, id: u64) -> Result<Self> {
        let seg_file = OpenOptions::new().create(true).write(true).truncate(true).open(seg_path(dir, id))?;
        let hint_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(layout::companion_hint_path(dir, id))?;
        log::info!("compaction writing new segment {}", layout::seg_file_name(id));
        Ok(CompactionOutput {
            dir: dir.to_path_buf(),
            seg_size_limit,
            seg_id: id,
            seg_file,
            hint_file,
            seg_len: 0,
            produced_ids: vec![id],
        })
    }

    fn roll_over(&mut self, next_id: u64) -> Result<()> {
        let seg_file = OpenOptions::new().create(true).write(true).truncate(true).open(seg_path(&self.dir, next_id))?;
        let hint_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(layout::companion_hint_path(&self.dir, next_id))?;
        log::info!("compaction rolling over to new segment {}", layout::seg_file_name(next_id));
        self.seg_id = next_id;
        self.seg_file = seg_file;
        self.hint_file = hint_file;
        self.seg_len = 0;
        self.produced_ids.push(next_id);
        Ok(())
    }

    fn append(
        &mut self,
        allocate_next_id: impl Fn() -> Result<u64>,
        timestamp: u64,
        key: &[u8],
        value: &[u8],
    ) -> Result<(u64, u64)> {
        if self.seg_len >= self.seg_size_limit {
            let next_id = allocate_next_id()?;
            self.roll_over(next_id)?;
        }

        let (frame, value_offset_in_frame) = encode_record(timestamp, key, Some(value))?;
        self.seg_file.write_all(&frame)?;
        let value_offset_absolute = self.seg_len + value_offset_in_frame as u64;
        self.seg_len += frame.len() as u64;

        let hint_entry =
            HintEntry { timestamp, key: key.to_vec(), value_size: value.len(), value_offset: value_offset_absolute };
        self.hint_file.write_all(&encode_hint(&hint_entry))?;

        Ok((self.seg_id, value_offset_absolute))
    }

    fn finish(&mut self) -> Result<()> {
        self.seg_file.sync_all()?;
        self.hint_file.sync_all()?;
        Ok(())
    }
}
