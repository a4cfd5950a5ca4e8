use std::fmt::{self, Display};

/// The crate's error type. Matches the error kinds surfaced to embedders:
/// bad arguments, I/O failure, and corruption discovered during recovery
/// or compaction.
#[derive(Debug)]
pub enum Error {
    /// Empty key, empty value on `put`, a key/value containing the record
    /// delimiter byte, or a key/value exceeding the codec's width limits.
    InvalidArgument(String),
    /// Internal-only: a key absent from the index. `Engine::get` turns this
    /// into `Ok(None)` rather than surfacing it to callers.
    NotFound,
    /// Underlying file-system failure.
    Io(std::io::Error),
    /// CRC mismatch or malformed header encountered during recovery or
    /// compaction.
    CorruptRecord(String),
    /// The data directory is already held open by another engine instance.
    Busy,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::NotFound => write!(f, "key not found"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::CorruptRecord(msg) => write!(f, "corrupt record: {msg}"),
            Error::Busy => write!(f, "data directory is locked by another engine instance"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl PartialEq for Error {
    /// Loose equality for tests: two errors are equal if they're the same
    /// variant, ignoring message text (Io wraps a non-comparable std error).
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Error::InvalidArgument(_), Error::InvalidArgument(_))
                | (Error::NotFound, Error::NotFound)
                | (Error::Io(_), Error::Io(_))
                | (Error::CorruptRecord(_), Error::CorruptRecord(_))
                | (Error::Busy, Error::Busy)
        )
    }
}
