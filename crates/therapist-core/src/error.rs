use thiserror::Error;

use crate::memory::Address;
use crate::model::{EntityId, FieldId, Operation};
use crate::scanner::ScanTarget;

/// Failure to attach to the foreign process.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Permission denied opening process {pid}: {message}")]
    PermissionDenied { pid: u32, message: String },

    #[error("No memory layout matches build {build_id}")]
    VersionUnsupported { build_id: String },

    #[error("Process access is not supported on this platform")]
    PlatformUnsupported,

    #[error("Failed to inspect process: {0}")]
    Memory(#[from] MemoryError),
}

/// Failure of a single read or write against the foreign process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("Address {address:#x} (+{size} bytes) is outside the mapped range")]
    AddressOutOfRange { address: Address, size: usize },

    #[error("Process access revoked")]
    AccessRevoked,

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    ReadFailed { address: Address, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    WriteFailed { address: Address, message: String },
}

impl MemoryError {
    /// The handle is gone for good; the session must reattach.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, MemoryError::AccessRevoked)
    }
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("No candidate found for {target} in {start:#x}..{end:#x}")]
    NoCandidateFound {
        target: ScanTarget,
        start: Address,
        end: Address,
    },

    #[error("Scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Corrupt record at {address:#x}: {reason}")]
    CorruptRecord { address: Address, reason: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl DecodeError {
    pub(crate) fn corrupt(address: Address, reason: impl Into<String>) -> Self {
        DecodeError::CorruptRecord {
            address,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    #[error("Entity {entity} has no field {field}")]
    UnknownField { entity: EntityId, field: FieldId },

    #[error("Value does not fit field {0}")]
    TypeMismatch(FieldId),

    #[error("Another operation is in progress: {0}")]
    Busy(Operation),
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Layout {version} is missing field '{field}'")]
    MissingField { version: String, field: String },

    #[error("Layout {version} is invalid: {message}")]
    Invalid { version: String, message: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task '{0}' panicked")]
    TaskPanicked(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Whether the session has to be torn down and re-attached.
    pub fn is_session_lost(&self) -> bool {
        match self {
            Error::Memory(e) => e.is_session_lost(),
            Error::Scan(ScanError::Memory(e)) => e.is_session_lost(),
            Error::Decode(DecodeError::Memory(e)) => e.is_session_lost(),
            _ => false,
        }
    }
}
