use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Segment files are rolled over once they reach this size.
pub const DEFAULT_SEG_SIZE_LIMIT: u64 = 1024 * 1024;

/// Compaction only runs once at least this many frozen segments exist.
pub const DEFAULT_MIN_COMPACT_SEGMENTS: usize = 3;

/// Tunables for an [`crate::engine::Engine`]: a plain `serde`-derived
/// struct that can either be constructed directly or loaded from a config
/// file layered with environment overrides via the `config` crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Byte size at which the active segment is rolled over into a new one.
    pub seg_size_limit: u64,
    /// Minimum number of frozen segments required before compaction runs.
    pub min_compact_segments: usize,
    /// If true, `fsync` the active segment after every append. Default is
    /// `false` (durable only at file-system append granularity), since
    /// syncing on every write trades away most of the throughput an
    /// append-only log is meant to provide.
    pub sync_on_write: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            seg_size_limit: DEFAULT_SEG_SIZE_LIMIT,
            min_compact_segments: DEFAULT_MIN_COMPACT_SEGMENTS,
            sync_on_write: false,
        }
    }
}

impl Options {
    /// Loads options from a config file (toml/yaml/json, inferred from
    /// extension), with `CASK_*` environment variables overriding any
    /// field present in the file. Unset fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Options> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .add_source(config::Environment::with_prefix("CASK"));
        let cfg = builder
            .build()
            .map_err(|err| Error::InvalidArgument(format!("loading config {}: {err}", path.display())))?;
        cfg.try_deserialize()
            .map_err(|err| Error::InvalidArgument(format!("parsing config {}: {err}", path.display())))
    }
}
