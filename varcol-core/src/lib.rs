mod buffer;
pub mod codec;
mod column;
mod compression;
mod defrag;
mod error;
mod substrate;
mod types;
mod value;

pub use self::buffer::{
    BufferFlags,
    BufferLayout,
    ElementClass,
    ElementRef,
    ScratchBuffer,
    ValueBuffer,
};
pub use self::column::{ColumnAccessor, ColumnKind};
pub use self::compression::compression_state;
pub use self::defrag::{
    defrag,
    DefragOptions,
    LEAST_AGGRESSIVE_THRESHOLD,
    MOST_AGGRESSIVE_THRESHOLD,
};
pub use self::error::{CodecError, ColumnError, ResolveError, StorageError};
pub use self::substrate::{ColumnSchema, StorageSubstrate, TableKind, TableSchema};
pub use self::types::{
    ColumnFlags,
    ColumnId,
    ColumnType,
    CompressionType,
    Domain,
    DomainFamily,
    RecordId,
    FIRST_TABLE_ID,
};
pub use self::value::{
    ColumnInput,
    ColumnValue,
    ElementSpec,
    RecordRef,
    ScalarValue,
    Value,
    VectorElement,
};
