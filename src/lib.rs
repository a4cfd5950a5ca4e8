#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

//! An embeddable, log-structured, hash-indexed key-value store in the
//! style of BitCask: writes are appended to a single active segment file,
//! reads are served by an in-memory index mapping each live key to a byte
//! range inside some segment on disk, and a compactor periodically merges
//! frozen segments into denser ones with "hint" sidecars that accelerate
//! recovery.

mod codec;
mod compaction;
mod engine;
mod error;
mod index;
mod layout;
mod options;
mod reader;
mod recovery;
mod segment;

pub use engine::Engine;
pub use error::{Error, Result};
pub use options::Options;
