use thiserror::Error;

/// The standard result type used throughout monofs.
pub type Result<T> = std::result::Result<T, FsError>;

/// All failures the storage and filesystem layers can produce.
///
/// Variants map to POSIX errno codes at the adapter boundary through
/// [`FsError::errno`]; anything without a precise counterpart becomes
/// `EIO`.
#[derive(Debug, Error)]
pub enum FsError {
    /// A key is absent from a KV store or its index.
    #[error("key not found")]
    NotFound,

    /// A directory entry or attribute row is absent from the metadata db.
    #[error("no such inode")]
    NoSuchInode,

    /// Record framing or CRC verification failed.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// A record was cut short mid-frame, typically by a crashed writer.
    #[error("truncated record at offset {0}")]
    TruncatedRecord(u64),

    /// Invalid offset/length arguments at the data-engine layer.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Underlying filesystem failure on a store file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Duplicate directory entry where uniqueness is required.
    #[error("entry already exists")]
    AlreadyExists,

    /// Directory removal attempted while children remain.
    #[error("directory not empty")]
    NotEmpty,

    /// The operation requires a non-directory.
    #[error("is a directory")]
    IsDirectory,

    /// The operation requires a directory.
    #[error("not a directory")]
    NotDirectory,

    /// An operation referenced a handle id that is not in the table.
    #[error("invalid file handle {0}")]
    InvalidHandle(u64),

    /// Missing mandatory configuration or credentials.
    #[error("config error: {0}")]
    Config(String),

    /// The external stat service failed or returned garbage.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// A stored value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Declared capability with no implementation behind it yet.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
}

impl FsError {
    /// Map this error to the errno the kernel adapter reports.
    pub fn errno(&self) -> libc::c_int {
        match self {
            FsError::NotFound | FsError::NoSuchInode => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::IsDirectory => libc::EISDIR,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::InvalidRange(_) | FsError::InvalidHandle(_) => libc::EINVAL,
            _ => libc::EIO,
        }
    }

    /// Whether this error means "the thing is simply absent" rather than
    /// a real failure. Used where a miss falls through to the next layer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound | FsError::NoSuchInode)
    }
}
