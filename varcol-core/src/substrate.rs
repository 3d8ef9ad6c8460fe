use serde::{Deserialize, Serialize};

use crate::buffer::{BufferFlags, ValueBuffer};
use crate::error::{ResolveError, StorageError};
use crate::types::{ColumnFlags, ColumnId, ColumnType, CompressionType, Domain, RecordId};
use crate::value::RecordRef;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// How the records of a table are keyed.
pub enum TableKind {
    Hash,
    PatriciaTrie,
    DoubleArrayTrie,
    /// Records are addressed by ID only.
    NoKey,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::PatriciaTrie => "patricia_trie",
            Self::DoubleArrayTrie => "double_array_trie",
            Self::NoKey => "no_key",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
/// The schema of a table as reported by the substrate.
pub struct TableSchema {
    pub id: Domain,
    pub name: String,
    pub kind: TableKind,
    /// The domain of the table's keys, `None` for [TableKind::NoKey].
    pub key_domain: Option<Domain>,
}

impl TableSchema {
    /// The domain elements must be compatible with to reference a record
    /// of this table.
    ///
    /// Tables without keys are addressed by their own records.
    pub fn element_key_domain(&self) -> Domain {
        self.key_domain.unwrap_or(self.id)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
/// The schema of a column as reported by the substrate.
pub struct ColumnSchema {
    pub id: ColumnId,
    /// The full name of the column, `<table>.<column>`.
    pub name: String,
    pub flags: ColumnFlags,
    /// The table owning the column, record IDs are resolved against it.
    pub domain: Domain,
    /// The type of the values or elements held by the column.
    pub range: Domain,
}

impl ColumnSchema {
    /// The buffer flags values of this column are stored with.
    ///
    /// Unweighted vectors of table references are stored as plain runs
    /// of record IDs.
    pub fn value_flags(&self) -> BufferFlags {
        match self.flags.column_type() {
            ColumnType::Vector if self.flags.is_weighted() => BufferFlags::weighted_vector(),
            ColumnType::Vector if self.range.is_table() => BufferFlags::uvector(),
            ColumnType::Vector => BufferFlags::vector(),
            _ => BufferFlags::bulk(),
        }
    }

    #[inline]
    pub fn compression(&self) -> CompressionType {
        self.flags.compression()
    }
}

/// The storage engine a column accessor reads from and writes to.
///
/// Implementations own persistence, ID allocation, the segment layout
/// and any compression, accessors only ever see decoded [ValueBuffer]s.
pub trait StorageSubstrate: Send + Sync {
    /// Returns the schema of the given column.
    fn column_schema(&self, column: ColumnId) -> Result<ColumnSchema, StorageError>;

    /// Returns the schema of the given table.
    fn table_schema(&self, table: Domain) -> Result<TableSchema, StorageError>;

    /// Resolves a reference to the ID of an existing record of `table`.
    fn resolve_record(&self, table: Domain, record: &RecordRef) -> Result<RecordId, ResolveError>;

    /// Loads the stored value of `record` into `value`.
    ///
    /// The buffer has been reinitialized with the column's range and
    /// value flags. Records without a stored value leave it empty.
    fn fetch_value(
        &self,
        column: ColumnId,
        record: RecordId,
        value: &mut ValueBuffer,
    ) -> Result<(), StorageError>;

    /// Replaces the stored value of `record` with the content of `value`.
    fn commit_value(
        &self,
        column: ColumnId,
        record: RecordId,
        value: &ValueBuffer,
    ) -> Result<(), StorageError>;

    /// Compacts the segments of the column and returns how many segments
    /// were reclaimed.
    ///
    /// Segments whose live bytes are below `1 << (segment_width - threshold)`
    /// are eligible.
    fn defrag(&self, column: ColumnId, threshold: i32) -> Result<u32, StorageError>;

    /// Returns `true` if the substrate was built with support for the
    /// given compression scheme.
    fn supports_compression(&self, compression: CompressionType) -> bool;
}
