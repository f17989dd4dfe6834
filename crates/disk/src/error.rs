//! Disk error types.

use thiserror::Error;

/// Errors from quorum-disk I/O and codecs.
#[derive(Debug, Error)]
pub enum DiskError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block too short: expected at least {expected} bytes, got {got}")]
    ShortBlock { expected: usize, got: usize },

    #[error("bad magic: {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported on-disk version: {found:#010x}")]
    BadVersion { found: u32 },

    #[error("invalid {field} value in status block: {value}")]
    InvalidField { field: &'static str, value: u32 },

    #[error("node id {0} is outside the supported range")]
    NodeIdOutOfRange(u32),

    #[error(
        "header block size {header} does not match device sector size {device}"
    )]
    SectorMismatch { header: u32, device: u32 },

    #[error("device too small: need {needed} bytes, device has {actual}")]
    DeviceTooSmall { needed: u64, actual: u64 },

    #[error("no device found with label '{0}'")]
    LabelNotFound(String),

    #[error("label too long: {0} bytes (maximum 64)")]
    LabelTooLong(usize),
}
