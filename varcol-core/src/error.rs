use std::io;

use crate::types::{ColumnId, Domain, RecordId};

#[derive(Debug, thiserror::Error)]
/// An error returned by a column accessor operation.
///
/// The three kinds let callers tell bad input apart from an unresolvable
/// record and from a failure inside the storage substrate.
pub enum ColumnError {
    #[error("Contract violation: {0}")]
    /// The input had the wrong shape for the column, nothing was written.
    ContractViolation(String),
    #[error("Record resolution failed: {0}")]
    /// The record ID or reference could not be resolved against the
    /// column's domain table. No storage access was attempted.
    IdResolution(#[from] ResolveError),
    #[error("Storage engine failure during {operation} on column {column:?}: {source}")]
    /// The storage substrate rejected a fetch, commit or defrag.
    Storage {
        /// The operation being performed when the substrate failed.
        operation: &'static str,
        /// The full name of the column.
        column: String,
        #[source]
        source: StorageError,
    },
}

impl ColumnError {
    pub(crate) fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    /// Returns `true` if the error is a [ColumnError::ContractViolation].
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation(_))
    }

    /// Returns `true` if the error is a [ColumnError::IdResolution].
    pub fn is_id_resolution(&self) -> bool {
        matches!(self, Self::IdResolution(_))
    }

    /// Returns `true` if the error is a [ColumnError::Storage].
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

#[derive(Debug, thiserror::Error)]
/// An error that can occur when resolving a record reference
/// against a table.
pub enum ResolveError {
    #[error("nil record ID is never valid")]
    NilId,
    #[error("record ID {0} is out of range")]
    /// The numeric value cannot be represented as a record ID.
    OutOfRange(String),
    #[error("table not found: {0}")]
    TableNotFound(Domain),
    #[error("record {id} does not exist in table {table}")]
    UnknownId { table: Domain, id: RecordId },
    #[error("record belongs to table {actual}, expected {expected}")]
    WrongTable { expected: Domain, actual: Domain },
    #[error("key {key} does not exist in table {table}")]
    UnknownKey { table: Domain, key: String },
    #[error("table {0} has no keys to look up")]
    KeylessTable(Domain),
}

#[derive(Debug, thiserror::Error)]
/// An error reported by the storage substrate.
pub enum StorageError {
    #[error("column not found: {0}")]
    ColumnNotFound(ColumnId),
    #[error("table not found: {0}")]
    TableNotFound(Domain),
    #[error("value rejected: {0}")]
    /// The substrate refused to store the value.
    Rejected(String),
    #[error("stored value corrupted: {0}")]
    Corrupted(#[from] CodecError),
    #[error("IO Error: {0}")]
    IoError(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
/// An error decoding the persisted layout of a value.
pub enum CodecError {
    #[error("packed value is truncated")]
    Truncated,
    #[error("packed vector body holds {actual} bytes but its sections declare {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("uvector of {len} bytes is not a multiple of its element width {width}")]
    Misaligned { len: usize, width: usize },
    #[error("domain {0} has no fixed element width")]
    NoFixedWidth(Domain),
    #[error("packed vector has {0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("vector length {0} does not fit the packed layout")]
    TooLarge(usize),
}
