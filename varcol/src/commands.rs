use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use serde_json::{json, Value as JsonValue};
use tracing::info;
use varcol_core::{
    ColumnAccessor,
    ColumnInput,
    ColumnSchema,
    ColumnType,
    CompressionType,
    DefragOptions,
    Domain,
    StorageSubstrate,
    TableKind,
};
use varcol_store::{
    ColumnOptions,
    SegmentStore,
    SharedStore,
    StoreConfig,
    StoreOptions,
    TableOptions,
};

use crate::render::{parse_element, parse_record, parse_value, render_value};

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum TableKindArg {
    Hash,
    PatriciaTrie,
    DoubleArrayTrie,
    NoKey,
}

impl From<TableKindArg> for TableKind {
    fn from(kind: TableKindArg) -> Self {
        match kind {
            TableKindArg::Hash => Self::Hash,
            TableKindArg::PatriciaTrie => Self::PatriciaTrie,
            TableKindArg::DoubleArrayTrie => Self::DoubleArrayTrie,
            TableKindArg::NoKey => Self::NoKey,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new, empty store
    Init {
        #[arg(long)]
        /// The name of the store.
        ///
        /// Defaults to the name of the store directory.
        name: Option<String>,
        #[arg(long)]
        /// The number of bits of the segment capacity.
        segment_width_bits: Option<u32>,
    },
    /// Update the persisted store config, applied the next time the store is opened
    Config {
        #[arg(long)]
        segment_width_bits: Option<u32>,
        #[arg(long)]
        zlib_supported: Option<bool>,
        #[arg(long)]
        lzo_supported: Option<bool>,
    },
    /// List the tables and columns of the store
    Schema,
    /// Create a new table
    CreateTable {
        name: String,
        #[arg(long, value_enum, default_value = "hash")]
        kind: TableKindArg,
        #[arg(long)]
        /// The type of the table's keys, e.g. `ShortText` or `Int32`.
        key_type: Option<String>,
    },
    /// Add a record to a table
    AddRecord {
        table: String,
        /// The key of the record, required for keyed tables.
        key: Option<String>,
    },
    /// Create a column on an existing table
    CreateColumn {
        table: String,
        name: String,
        #[arg(long = "type")]
        /// The type of the values, a built-in type or a table name.
        range: String,
        #[arg(long)]
        /// Store a sequence of elements per record.
        vector: bool,
        #[arg(long, requires = "vector")]
        /// Store a weight with every element.
        weighted: bool,
        #[arg(long, default_value = "none")]
        compression: CompressionType,
    },
    /// Read the value of a record
    Get {
        /// The full name of the column, `<table>.<column>`.
        column: String,
        /// The record, `#<id>` or a key.
        record: String,
    },
    /// Replace the value of a record {n}
    /// {n}
    /// Vector elements are given as `value` or `value:weight` for weighted columns.
    Set {
        column: String,
        record: String,
        #[arg(allow_hyphen_values = true)]
        values: Vec<String>,
    },
    /// Report whether a column is compressed
    Compressed {
        column: String,
        #[arg(long)]
        /// Only report compression with the given scheme, `zlib` or `lzo`.
        compression: Option<String>,
    },
    /// Compact the segments of a column
    Defrag {
        column: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        /// The aggressiveness of the pass, from -4 (most) to 22 (least).
        threshold: i32,
    },
    /// Show the storage usage of a column
    Stats { column: String },
}

impl Commands {
    /// Triggers any additional startup messages which are aware
    /// of the provided subcommand.
    pub fn display_startup_message(&self, store: &Path) {
        match self {
            Commands::Init { .. } => {
                info!(store = %store.display(), "Creating store");
            },
            _ => {
                info!(store = %store.display(), "Opening store");
            },
        }
    }

    /// Executes the command, returning its output.
    pub fn execute(self, store_path: &Path) -> Result<JsonValue> {
        match self {
            Commands::Init {
                name,
                segment_width_bits,
            } => {
                let name = name.unwrap_or_else(|| default_store_name(store_path));
                let options = StoreOptions::builder()
                    .name(name)
                    .path(store_path.to_path_buf())
                    .maybe_segment_width_bits(segment_width_bits)
                    .build();
                let store = SegmentStore::create(options).context("Create store")?;
                Ok(json!({
                    "name": store.name(),
                    "segment_width_bits": store.segment_width_bits(),
                }))
            },
            command => {
                let store: SharedStore = Arc::new(
                    SegmentStore::open(store_path.to_path_buf()).context("Open store")?,
                );
                let output = command.execute_on(&store)?;
                store.flush().context("Flush store")?;
                Ok(output)
            },
        }
    }

    fn execute_on(self, store: &SharedStore) -> Result<JsonValue> {
        let output = match self {
            Commands::Init { .. } => bail!("Store is already open"),
            Commands::Config {
                segment_width_bits,
                zlib_supported,
                lzo_supported,
            } => {
                let config = StoreConfig::builder()
                    .maybe_segment_width_bits(segment_width_bits)
                    .maybe_zlib_supported(zlib_supported)
                    .maybe_lzo_supported(lzo_supported)
                    .build();
                store.update_config(config)?;
                json!({ "updated": true })
            },
            Commands::Schema => json!({
                "name": store.name(),
                "tables": store.list_tables(),
                "columns": store.list_columns(),
            }),
            Commands::CreateTable {
                name,
                kind,
                key_type,
            } => {
                let key_domain = key_type
                    .map(|name| resolve_domain(store, &name))
                    .transpose()?;
                let options = TableOptions::builder()
                    .name(name)
                    .kind(kind.into())
                    .maybe_key_domain(key_domain)
                    .build();
                json!(store.create_table(options)?)
            },
            Commands::AddRecord { table, key } => {
                let schema = store
                    .table_by_name(&table)
                    .ok_or_else(|| anyhow!("Table {table:?} does not exist"))?;
                let key = match (key, schema.key_domain) {
                    (Some(key), Some(domain)) => Some(parse_value(&**store, &key, domain)?),
                    (Some(_), None) => bail!("Table {table:?} has no keys"),
                    (None, _) => None,
                };
                let id = store.add_record(&table, key)?;
                json!({ "id": id.0 })
            },
            Commands::CreateColumn {
                table,
                name,
                range,
                vector,
                weighted,
                compression,
            } => {
                let range = resolve_domain(store, &range)?;
                let options = ColumnOptions::builder()
                    .table(table)
                    .name(name)
                    .range(range)
                    .vector(vector)
                    .weighted(weighted)
                    .compression(compression)
                    .build();
                json!(store.create_column(options)?)
            },
            Commands::Get { column, record } => {
                let mut accessor = bind(store, &column)?;
                let schema = accessor.schema().clone();
                let record = parse_record(&**store, schema.domain, &record)?;
                let value = accessor.get(record)?;
                render_value(&value, schema.flags.is_weighted())
            },
            Commands::Set {
                column,
                record,
                values,
            } => {
                let mut accessor = bind(store, &column)?;
                let schema = accessor.schema().clone();
                let record = parse_record(&**store, schema.domain, &record)?;
                let input = parse_input(store, &schema, &values)?;
                accessor.set(record.clone(), input)?;
                render_value(&accessor.get(record)?, schema.flags.is_weighted())
            },
            Commands::Compressed {
                column,
                compression,
            } => {
                let accessor = bind(store, &column)?;
                let compressed = accessor.compression_state_by_name(compression.as_deref())?;
                json!({
                    "compression": accessor.schema().compression(),
                    "compressed": compressed,
                })
            },
            Commands::Defrag { column, threshold } => {
                let accessor = bind(store, &column)?;
                let reclaimed = accessor.defrag(DefragOptions::with_threshold(threshold))?;
                json!({ "reclaimed_segments": reclaimed })
            },
            Commands::Stats { column } => {
                let schema = column_schema(store, &column)?;
                json!(store.column_stats(schema.id)?)
            },
        };

        Ok(output)
    }
}

fn default_store_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "varcol".to_string())
}

fn column_schema(store: &SharedStore, column: &str) -> Result<ColumnSchema> {
    store
        .column_by_name(column)
        .ok_or_else(|| anyhow!("Column {column:?} does not exist, expected `<table>.<column>`"))
}

fn bind(store: &SharedStore, column: &str) -> Result<ColumnAccessor<SegmentStore>> {
    let schema = column_schema(store, column)?;
    let accessor = ColumnAccessor::bind(store.clone(), schema.id)?;
    Ok(accessor)
}

/// Resolves a type argument, a built-in type name or a table name.
fn resolve_domain(store: &SharedStore, name: &str) -> Result<Domain> {
    if let Some(domain) = Domain::builtin_by_name(name) {
        return Ok(domain);
    }

    store
        .table_by_name(name)
        .map(|table| table.id)
        .ok_or_else(|| anyhow!("Unknown type {name:?}"))
}

fn parse_input(store: &SharedStore, schema: &ColumnSchema, values: &[String]) -> Result<ColumnInput> {
    if schema.flags.column_type() != ColumnType::Vector {
        let [value] = values else {
            bail!("{} is a scalar column and takes exactly one value", schema.name);
        };
        return Ok(parse_value(&**store, value, schema.range)?.into());
    }

    // Weighted vectors keep references as keys of the referenced table.
    let weighted = schema.flags.is_weighted();
    let element_domain = if weighted && schema.range.is_table() {
        store.table_schema(schema.range)?.element_key_domain()
    } else {
        schema.range
    };

    let elements = values
        .iter()
        .map(|raw| parse_element(&**store, raw, element_domain, weighted))
        .collect::<Result<Vec<_>>>()?;
    Ok(elements.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(store: &Path, command: Commands) -> JsonValue {
        command.execute(store).unwrap()
    }

    #[test]
    fn test_commands_against_persisted_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites");

        let created = run(
            &path,
            Commands::Init {
                name: None,
                segment_width_bits: Some(10),
            },
        );
        assert_eq!(created["name"], json!("sites"));

        run(
            &path,
            Commands::CreateTable {
                name: "Sites".to_string(),
                kind: TableKindArg::Hash,
                key_type: None,
            },
        );
        run(
            &path,
            Commands::AddRecord {
                table: "Sites".to_string(),
                key: Some("groonga.org".to_string()),
            },
        );
        run(
            &path,
            Commands::CreateColumn {
                table: "Sites".to_string(),
                name: "tags".to_string(),
                range: "ShortText".to_string(),
                vector: true,
                weighted: true,
                compression: CompressionType::None,
            },
        );

        let written = run(
            &path,
            Commands::Set {
                column: "Sites.tags".to_string(),
                record: "groonga.org".to_string(),
                values: vec!["ruby:100".to_string(), "groonga:10".to_string()],
            },
        );
        let expected = json!([
            { "value": "ruby", "weight": 100 },
            { "value": "groonga", "weight": 10 },
        ]);
        assert_eq!(written, expected);

        let read = run(
            &path,
            Commands::Get {
                column: "Sites.tags".to_string(),
                record: "#1".to_string(),
            },
        );
        assert_eq!(read, expected);

        let stats = run(
            &path,
            Commands::Stats {
                column: "Sites.tags".to_string(),
            },
        );
        assert_eq!(stats["records"], json!(1));

        let compressed = run(
            &path,
            Commands::Compressed {
                column: "Sites.tags".to_string(),
                compression: None,
            },
        );
        assert_eq!(compressed["compressed"], json!(false));
    }

    #[test]
    fn test_scalar_columns_take_one_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalars");
        run(
            &path,
            Commands::Init {
                name: Some("scalars".to_string()),
                segment_width_bits: None,
            },
        );
        run(
            &path,
            Commands::CreateTable {
                name: "Sites".to_string(),
                kind: TableKindArg::Hash,
                key_type: None,
            },
        );
        run(
            &path,
            Commands::CreateColumn {
                table: "Sites".to_string(),
                name: "score".to_string(),
                range: "Int32".to_string(),
                vector: false,
                weighted: false,
                compression: CompressionType::None,
            },
        );
        run(
            &path,
            Commands::AddRecord {
                table: "Sites".to_string(),
                key: Some("a".to_string()),
            },
        );

        let written = run(
            &path,
            Commands::Set {
                column: "Sites.score".to_string(),
                record: "a".to_string(),
                values: vec!["-12".to_string()],
            },
        );
        assert_eq!(written, json!(-12));

        let err = Commands::Set {
            column: "Sites.score".to_string(),
            record: "a".to_string(),
            values: vec!["1".to_string(), "2".to_string()],
        }
        .execute(&path)
        .unwrap_err();
        assert!(err.to_string().contains("exactly one value"));
    }

    #[test]
    fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let result = Commands::Schema.execute(&dir.path().join("missing"));
        assert!(result.is_err());
    }
}
