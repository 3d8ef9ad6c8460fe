use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bon::Builder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use varcol_core::{
    codec,
    ColumnFlags,
    ColumnId,
    ColumnSchema,
    CompressionType,
    Domain,
    RecordId,
    RecordRef,
    ResolveError,
    StorageError,
    StorageSubstrate,
    TableKind,
    TableSchema,
    Value,
    ValueBuffer,
    FIRST_TABLE_ID,
};

use crate::config::{MaybeUnset, Settings, StoreConfig};
use crate::segment::{
    ColumnData,
    ColumnStats,
    DEFAULT_SEGMENT_WIDTH_BITS,
    MAX_SEGMENT_WIDTH_BITS,
    MIN_SEGMENT_WIDTH_BITS,
};
use crate::snapshot::StorePaths;
use crate::table::{validate_key_domain, Table};

/// A store that can be cheaply cloned and shared
/// by being wrapped in an [Arc].
pub type SharedStore = Arc<SegmentStore>;

#[derive(Debug, thiserror::Error)]
/// An error that can occur when managing a store or its schema.
pub enum StoreError {
    #[error("store already exists: {0}")]
    AlreadyExists(String),
    #[error("store not found: {0}")]
    NotFound(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("store corrupted: {0}")]
    /// The persisted state is inconsistent.
    ///
    /// This should never occur unless the snapshot was modified by hand.
    Corrupted(String),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("IO Error: {0}")]
    IoError(#[from] io::Error),
}

#[derive(Debug, Builder)]
/// Options that can be configured when creating a store.
pub struct StoreOptions {
    #[builder(into)]
    /// The name of the store.
    name: String,
    /// The directory the store is persisted in.
    ///
    /// Stores without a path only live in memory.
    path: Option<PathBuf>,
    /// The number of bits of the segment capacity.
    ///
    /// Defaults to [DEFAULT_SEGMENT_WIDTH_BITS].
    segment_width_bits: Option<u32>,
}

#[derive(Debug, Builder)]
/// Options for creating a table.
pub struct TableOptions {
    #[builder(into)]
    name: String,
    #[builder(default = TableKind::Hash)]
    kind: TableKind,
    /// The domain of the table's keys.
    ///
    /// Keyed tables default to `ShortText`, [TableKind::NoKey] tables
    /// must not set one.
    key_domain: Option<Domain>,
}

#[derive(Debug, Builder)]
/// Options for creating a column.
pub struct ColumnOptions {
    #[builder(into)]
    /// The name of the table owning the column.
    table: String,
    #[builder(into)]
    /// The name of the column within its table.
    name: String,
    /// The type of the column values, a built-in type or a table.
    range: Domain,
    #[builder(default)]
    /// Stores a sequence of elements per record.
    vector: bool,
    #[builder(default)]
    /// Stores a weight with every element, requires `vector`.
    weighted: bool,
    #[builder(default = CompressionType::None)]
    compression: CompressionType,
}

impl ColumnOptions {
    fn flags(&self) -> ColumnFlags {
        let mut flags = if self.vector {
            ColumnFlags::COLUMN_VECTOR
        } else {
            ColumnFlags::COLUMN_SCALAR
        };
        if self.weighted {
            flags = flags | ColumnFlags::WITH_WEIGHT;
        }
        flags | self.compression.flags()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    settings: Settings,
    tables: BTreeMap<Domain, Table>,
    columns: BTreeMap<ColumnId, Column>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Column {
    schema: ColumnSchema,
    data: ColumnData,
}

/// An in memory, segmented storage substrate for variable-size columns.
///
/// Packed column values are appended to fixed capacity segments. Overwriting
/// a value leaves its old bytes behind as garbage until the segment is freed,
/// either because nothing in it is live anymore or because it was compacted
/// by a defrag pass.
///
/// Stores created with a path can be flushed to and reopened from disk, see
/// [StoreOptions::path].
pub struct SegmentStore {
    /// The config the store was opened with.
    config: StoreConfig,
    /// The on disk location, if the store is persisted.
    paths: Option<StorePaths>,
    state: RwLock<StoreState>,
    segment_width_bits: u32,
}

impl SegmentStore {
    #[instrument(skip_all, fields(name = %options.name))]
    /// Creates a new store.
    ///
    /// If a store already exists at the target path a [StoreError::AlreadyExists]
    /// is returned.
    pub fn create(options: StoreOptions) -> Result<Self, StoreError> {
        let paths = options.path.map(StorePaths::from_base);

        if let Some(paths) = paths.as_ref() {
            if paths.snapshot_exists()? {
                return Err(StoreError::AlreadyExists(options.name));
            }
            paths.ensure_base_path_exists()?;
        }

        let mut config = StoreConfig::builder().name(options.name).build();
        if let Some(width) = options.segment_width_bits {
            config.segment_width_bits = MaybeUnset::Some(width);
        }

        let mut state = StoreState::default();
        config.store_in_settings(&mut state.settings);

        let store = Self::open_inner(config, paths, state)?;
        store.flush()?;

        info!(name = store.name(), "Created store");
        Ok(store)
    }

    /// Creates a new store which only lives in memory.
    pub fn in_memory(name: &str) -> Result<Self, StoreError> {
        Self::create(StoreOptions::builder().name(name).build())
    }

    #[instrument]
    /// Opens an existing store.
    ///
    /// If no store exists in the given folder a [StoreError::NotFound]
    /// error is returned.
    pub fn open(base_path: PathBuf) -> Result<Self, StoreError> {
        let paths = StorePaths::from_base(base_path);

        if !paths.snapshot_exists()? {
            return Err(StoreError::NotFound(paths.guess_store_name()));
        }

        let state: StoreState = paths.read_snapshot()?;

        let mut config = StoreConfig::default();
        config.load_from_settings(&state.settings)?;

        let store = Self::open_inner(config, Some(paths), state)?;
        info!(name = store.name(), "Opened store");
        Ok(store)
    }

    fn open_inner(
        config: StoreConfig,
        paths: Option<StorePaths>,
        state: StoreState,
    ) -> Result<Self, StoreError> {
        let segment_width_bits = config
            .segment_width_bits()
            .unwrap_or(DEFAULT_SEGMENT_WIDTH_BITS);
        validate_segment_width(segment_width_bits)?;

        for column in state.columns.values() {
            if !state.tables.contains_key(&column.schema.domain) {
                return Err(StoreError::Corrupted(format!(
                    "column {:?} belongs to a missing table",
                    column.schema.name
                )));
            }
        }

        Ok(Self {
            config,
            paths,
            state: RwLock::new(state),
            segment_width_bits,
        })
    }

    /// Returns the name of the store.
    pub fn name(&self) -> &str {
        self.config.name().unwrap_or_default()
    }

    /// Returns a reference to the config the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the path the store is persisted to.
    pub fn path(&self) -> Option<&Path> {
        self.paths.as_ref().map(StorePaths::base_path)
    }

    #[inline]
    pub fn segment_width_bits(&self) -> u32 {
        self.segment_width_bits
    }

    /// Writes the current state of the store to disk.
    ///
    /// Does nothing for in memory stores.
    pub fn flush(&self) -> Result<(), StoreError> {
        let Some(paths) = self.paths.as_ref() else {
            return Ok(());
        };

        let state = self.state.read();
        paths.write_snapshot(&*state)
    }

    #[instrument(skip_all)]
    /// Attempts to update the currently configured config values
    /// with the new provided set of values.
    ///
    /// The store will need to be reopened before these changes are applied.
    pub fn update_config(&self, config: StoreConfig) -> Result<(), StoreError> {
        if let MaybeUnset::Some(width) = config.segment_width_bits {
            validate_segment_width(width)?;
        }

        config.store_in_settings(&mut self.state.write().settings);
        self.flush()
    }

    #[instrument(skip_all, fields(name = %options.name))]
    /// Creates a new table.
    pub fn create_table(&self, options: TableOptions) -> Result<TableSchema, StoreError> {
        validate_name(&options.name)?;
        let key_domain = validate_key_domain(options.kind, options.key_domain)?;

        let mut state = self.state.write();
        if find_table(&state, &options.name).is_some() {
            return Err(StoreError::InvalidSchema(format!(
                "table {:?} already exists",
                options.name
            )));
        }
        if let Some(domain) = key_domain.filter(|domain| domain.is_table()) {
            if !state.tables.contains_key(&domain) {
                return Err(StoreError::InvalidSchema(format!(
                    "key type {domain} does not exist"
                )));
            }
        }

        let schema = TableSchema {
            id: Domain(FIRST_TABLE_ID + state.tables.len() as u32),
            name: options.name,
            kind: options.kind,
            key_domain,
        };
        state.tables.insert(schema.id, Table::new(schema.clone()));

        info!(table = %schema.id, kind = schema.kind.as_str(), "Created table");
        Ok(schema)
    }

    #[instrument(skip(self))]
    /// Adds a record to the table, returning its ID.
    ///
    /// Keyed tables require a key, adding an existing key returns the
    /// existing record.
    pub fn add_record(&self, table: &str, key: Option<Value>) -> Result<RecordId, StoreError> {
        let mut state = self.state.write();
        let domain = find_table(&state, table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let table = state
            .tables
            .get_mut(&domain)
            .ok_or_else(|| StoreError::TableNotFound(domain.to_string()))?;
        let (id, created) = table.add_record(key.as_ref())?;

        debug!(record = %id, created, "Added record");
        Ok(id)
    }

    #[instrument(skip_all, fields(table = %options.table, name = %options.name))]
    /// Creates a new column on an existing table.
    pub fn create_column(&self, options: ColumnOptions) -> Result<ColumnSchema, StoreError> {
        validate_name(&options.name)?;
        if options.weighted && !options.vector {
            return Err(StoreError::InvalidSchema(
                "only vector columns can be weighted".to_string(),
            ));
        }
        if options.range == Domain::VOID
            || (!options.range.is_table() && options.range.builtin_name().is_none())
        {
            return Err(StoreError::InvalidSchema(format!(
                "{} cannot be used as a column type",
                options.range
            )));
        }

        let mut state = self.state.write();
        let domain = find_table(&state, &options.table)
            .ok_or_else(|| StoreError::TableNotFound(options.table.clone()))?;
        if options.range.is_table() && !state.tables.contains_key(&options.range) {
            return Err(StoreError::TableNotFound(options.range.to_string()));
        }

        let name = format!("{}.{}", options.table, options.name);
        if find_column(&state, &name).is_some() {
            return Err(StoreError::InvalidSchema(format!("column {name:?} already exists")));
        }

        let schema = ColumnSchema {
            id: ColumnId(state.columns.len() as u32 + 1),
            name,
            flags: options.flags(),
            domain,
            range: options.range,
        };
        let column = Column {
            schema: schema.clone(),
            data: ColumnData::default(),
        };
        state.columns.insert(schema.id, column);

        info!(column = %schema.id, flags = schema.flags.bits(), "Created column");
        Ok(schema)
    }

    /// Returns the schema of the table with the given name.
    pub fn table_by_name(&self, name: &str) -> Option<TableSchema> {
        let state = self.state.read();
        let domain = find_table(&state, name)?;
        state.tables.get(&domain).map(|table| table.schema().clone())
    }

    /// Returns the schema of the column with the given full name,
    /// `<table>.<column>`.
    pub fn column_by_name(&self, name: &str) -> Option<ColumnSchema> {
        let state = self.state.read();
        let id = find_column(&state, name)?;
        state.columns.get(&id).map(|column| column.schema.clone())
    }

    /// Returns the number of records in the given table.
    pub fn record_count(&self, table: Domain) -> Option<u32> {
        self.state.read().tables.get(&table).map(Table::len)
    }

    /// Returns the schema of every table.
    pub fn list_tables(&self) -> Vec<TableSchema> {
        let state = self.state.read();
        state
            .tables
            .values()
            .map(|table| table.schema().clone())
            .collect()
    }

    /// Returns the schema of every column.
    pub fn list_columns(&self) -> Vec<ColumnSchema> {
        let state = self.state.read();
        state
            .columns
            .values()
            .map(|column| column.schema.clone())
            .collect()
    }

    /// Returns the storage usage of the given column.
    pub fn column_stats(&self, column: ColumnId) -> Result<ColumnStats, StoreError> {
        let state = self.state.read();
        state
            .columns
            .get(&column)
            .map(|column| column.data.stats())
            .ok_or_else(|| StoreError::ColumnNotFound(column.to_string()))
    }
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SegmentStore(name={})", self.name())
    }
}

impl StorageSubstrate for SegmentStore {
    fn column_schema(&self, column: ColumnId) -> Result<ColumnSchema, StorageError> {
        let state = self.state.read();
        state
            .columns
            .get(&column)
            .map(|column| column.schema.clone())
            .ok_or(StorageError::ColumnNotFound(column))
    }

    fn table_schema(&self, table: Domain) -> Result<TableSchema, StorageError> {
        let state = self.state.read();
        state
            .tables
            .get(&table)
            .map(|table| table.schema().clone())
            .ok_or(StorageError::TableNotFound(table))
    }

    fn resolve_record(&self, table: Domain, record: &RecordRef) -> Result<RecordId, ResolveError> {
        let state = self.state.read();
        state
            .tables
            .get(&table)
            .ok_or(ResolveError::TableNotFound(table))?
            .resolve(record)
    }

    fn fetch_value(
        &self,
        column: ColumnId,
        record: RecordId,
        value: &mut ValueBuffer,
    ) -> Result<(), StorageError> {
        let state = self.state.read();
        let column = state
            .columns
            .get(&column)
            .ok_or(StorageError::ColumnNotFound(column))?;

        match column.data.get(record) {
            Some(packed) => codec::unpack(packed, value)?,
            None => value.rewind(),
        }

        Ok(())
    }

    fn commit_value(
        &self,
        column: ColumnId,
        record: RecordId,
        value: &ValueBuffer,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write();
        let column = state
            .columns
            .get_mut(&column)
            .ok_or(StorageError::ColumnNotFound(column))?;

        if value.flags() != column.schema.value_flags() || value.domain() != column.schema.range {
            return Err(StorageError::Rejected(format!(
                "{:?} value of {} does not match column {:?}",
                value.flags(),
                value.domain(),
                column.schema.name
            )));
        }

        let packed = codec::pack(value).map_err(|e| StorageError::Rejected(e.to_string()))?;
        column.data.put(record, &packed, self.segment_width_bits);
        Ok(())
    }

    fn defrag(&self, column: ColumnId, threshold: i32) -> Result<u32, StorageError> {
        let mut state = self.state.write();
        let column = state
            .columns
            .get_mut(&column)
            .ok_or(StorageError::ColumnNotFound(column))?;

        let reclaimed = column.data.defrag(threshold, self.segment_width_bits);
        if reclaimed > 0 {
            info!(column = %column.schema.name, reclaimed, "Defragmented segments");
        }
        Ok(reclaimed)
    }

    fn supports_compression(&self, compression: CompressionType) -> bool {
        match compression {
            CompressionType::None => true,
            CompressionType::Zlib => self
                .config
                .zlib_supported()
                .unwrap_or(cfg!(feature = "zlib")),
            CompressionType::Lzo => self
                .config
                .lzo_supported()
                .unwrap_or(cfg!(feature = "lzo")),
        }
    }
}

fn find_table(state: &StoreState, name: &str) -> Option<Domain> {
    state
        .tables
        .values()
        .find(|table| table.schema().name == name)
        .map(|table| table.schema().id)
}

fn find_column(state: &StoreState, name: &str) -> Option<ColumnId> {
    state
        .columns
        .values()
        .find(|column| column.schema.name == name)
        .map(|column| column.schema.id)
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains('.') {
        return Err(StoreError::InvalidSchema(format!(
            "invalid name {name:?}, names must be non-empty and not contain `.`"
        )));
    }
    Ok(())
}

fn validate_segment_width(width: u32) -> Result<(), StoreError> {
    if !(MIN_SEGMENT_WIDTH_BITS..=MAX_SEGMENT_WIDTH_BITS).contains(&width) {
        return Err(StoreError::InvalidConfig(format!(
            "segment width must be between {MIN_SEGMENT_WIDTH_BITS} and \
             {MAX_SEGMENT_WIDTH_BITS} bits, got {width}"
        )));
    }
    Ok(())
}
