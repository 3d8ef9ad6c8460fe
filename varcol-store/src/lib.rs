//! A reference storage substrate for variable-size columns.
//!
//! Column values are kept packed in append-only segments which are
//! reclaimed by defragmentation, the whole store can be snapshotted
//! to disk and reopened.

mod config;
mod segment;
mod snapshot;
mod store;
mod table;

pub use self::config::{MaybeUnset, StoreConfig};
pub use self::segment::{
    ColumnStats,
    SegmentId,
    DEFAULT_SEGMENT_WIDTH_BITS,
    MAX_SEGMENT_WIDTH_BITS,
    MIN_SEGMENT_WIDTH_BITS,
};
pub use self::store::{
    ColumnOptions,
    SegmentStore,
    SharedStore,
    StoreError,
    StoreOptions,
    TableOptions,
};
