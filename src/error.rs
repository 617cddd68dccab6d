use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreemapError {
    #[error("block index {index} out of range (disk has {total} blocks)")]
    OutOfRange { index: u64, total: u64 },

    #[error("invalid length {length}: a range must cover at least one block and stay inside the disk")]
    InvalidLength { length: u64 },

    #[error("cannot allocate {length} blocks at {start}: range is not entirely free")]
    AlreadyAllocated { start: u64, length: u64 },

    #[error("cannot deallocate {length} blocks at {start}: range is not entirely allocated")]
    NotAllocated { start: u64, length: u64 },

    #[error("disk must have at least one block")]
    ZeroBlocks,

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FreemapError>;
